use grsync_core::progress::{FileOutcome, Progress};
use tracing::{debug, info};

/// Reports run progress through the log.
pub struct LogProgress;

impl Progress for LogProgress {
    fn file_started(&self, path: &str, index: usize, total: usize) {
        info!("[{}/{}] {path}", index + 1, total);
    }

    fn bytes_uploaded(&self, path: &str, bytes_so_far: u64) {
        debug!(path, bytes = bytes_so_far, "part acknowledged");
    }

    fn file_finished(&self, path: &str, outcome: FileOutcome) {
        if outcome == FileOutcome::Skipped {
            info!("{path} already archived, skipped");
        }
    }
}
