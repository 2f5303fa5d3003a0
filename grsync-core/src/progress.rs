/// Per-file result reported to [`Progress::file_finished`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FileOutcome {
    Uploaded,
    Skipped,
    Failed,
}

/// Observer for run progress. All methods default to no-ops.
pub trait Progress: Send + Sync {
    fn file_started(&self, _path: &str, _index: usize, _total: usize) {}

    /// Called after every acknowledged part with the running byte count.
    fn bytes_uploaded(&self, _path: &str, _bytes_so_far: u64) {}

    fn file_finished(&self, _path: &str, _outcome: FileOutcome) {}
}
