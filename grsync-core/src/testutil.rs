use std::collections::HashMap;
use std::path::Path;
use std::sync::Mutex;

use crate::error::{GrsyncError, Result};
use crate::hash::{fold_checksums, hash_part};
use crate::service::{ArchiveMeta, ArchiveService, ByteRange, IncompleteUpload};

pub const VAULT: &str = "test-vault";

/// How `upload_part` misbehaves.
#[derive(Clone, Copy, Debug)]
pub enum PartFailure {
    None,
    /// The first `n` calls fail with a transient error.
    TransientTimes(usize),
    AlwaysTransient,
    Terminal,
}

#[derive(Clone, Debug)]
pub struct CompletedUpload {
    pub upload_id: String,
    pub description: String,
    pub part_size: u64,
    pub part_ranges: Vec<ByteRange>,
    pub bytes: Vec<u8>,
    pub checksum: String,
}

struct PendingUpload {
    description: String,
    part_size: u64,
    parts: Vec<(ByteRange, Vec<u8>)>,
}

#[derive(Default)]
struct State {
    initiated: usize,
    part_calls: usize,
    failures_left: usize,
    pending: HashMap<String, PendingUpload>,
    completed: Vec<CompletedUpload>,
    aborted: Vec<String>,
}

type InitiateHook = Box<dyn Fn(usize) + Send + Sync>;

/// In-memory archive service with scriptable faults, for tests.
pub struct ScriptedService {
    part_failure: PartFailure,
    reject_complete: bool,
    on_initiate: Option<InitiateHook>,
    state: Mutex<State>,
}

impl ScriptedService {
    pub fn new() -> Self {
        Self::with_part_failure(PartFailure::None)
    }

    pub fn with_part_failure(part_failure: PartFailure) -> Self {
        let failures_left = match part_failure {
            PartFailure::TransientTimes(n) => n,
            _ => 0,
        };
        Self {
            part_failure,
            reject_complete: false,
            on_initiate: None,
            state: Mutex::new(State {
                failures_left,
                ..Default::default()
            }),
        }
    }

    pub fn rejecting_complete(mut self) -> Self {
        self.reject_complete = true;
        self
    }

    /// Called with the 1-based count of initiated uploads.
    pub fn on_initiate(mut self, hook: impl Fn(usize) + Send + Sync + 'static) -> Self {
        self.on_initiate = Some(Box::new(hook));
        self
    }

    pub fn initiated(&self) -> usize {
        self.state.lock().unwrap().initiated
    }

    pub fn part_calls(&self) -> usize {
        self.state.lock().unwrap().part_calls
    }

    pub fn aborted(&self) -> Vec<String> {
        self.state.lock().unwrap().aborted.clone()
    }

    pub fn completed(&self) -> Vec<CompletedUpload> {
        self.state.lock().unwrap().completed.clone()
    }

    pub fn completed_for(&self, path: &Path) -> Option<CompletedUpload> {
        let needle = format!("|{}|", path.display());
        self.completed()
            .into_iter()
            .find(|c| c.description.contains(&needle))
    }
}

impl ArchiveService for ScriptedService {
    fn initiate_upload(&self, vault: &str, part_size: u64, description: &str) -> Result<String> {
        if vault != VAULT {
            return Err(GrsyncError::service("initiate_upload", format!("vault {vault} does not exist")));
        }
        let (id, count) = {
            let mut st = self.state.lock().unwrap();
            st.initiated += 1;
            let id = format!("upload-{}", st.initiated);
            st.pending.insert(
                id.clone(),
                PendingUpload {
                    description: description.to_string(),
                    part_size,
                    parts: Vec::new(),
                },
            );
            (id, st.initiated)
        };
        if let Some(hook) = &self.on_initiate {
            hook(count);
        }
        Ok(id)
    }

    fn upload_part(&self, _vault: &str, upload_id: &str, range: ByteRange, body: &[u8]) -> Result<String> {
        let mut st = self.state.lock().unwrap();
        st.part_calls += 1;
        match self.part_failure {
            PartFailure::None => {}
            PartFailure::TransientTimes(_) if st.failures_left > 0 => {
                st.failures_left -= 1;
                return Err(GrsyncError::transient("upload_part", "throttled"));
            }
            PartFailure::TransientTimes(_) => {}
            PartFailure::AlwaysTransient => {
                return Err(GrsyncError::transient("upload_part", "connection reset"));
            }
            PartFailure::Terminal => {
                return Err(GrsyncError::service("upload_part", "access denied"));
            }
        }
        let upload = st
            .pending
            .get_mut(upload_id)
            .ok_or_else(|| GrsyncError::service("upload_part", format!("unknown upload {upload_id}")))?;
        upload.parts.push((range, body.to_vec()));
        Ok(hash_part(body))
    }

    fn complete_upload(
        &self,
        _vault: &str,
        upload_id: &str,
        total_size: u64,
        root_checksum: &str,
    ) -> Result<ArchiveMeta> {
        let mut st = self.state.lock().unwrap();
        if self.reject_complete {
            return Err(GrsyncError::service("complete_upload", "checksum mismatch"));
        }
        let upload = st
            .pending
            .remove(upload_id)
            .ok_or_else(|| GrsyncError::service("complete_upload", format!("unknown upload {upload_id}")))?;
        let bytes: Vec<u8> = upload.parts.iter().flat_map(|(_, b)| b.clone()).collect();
        let sums: Vec<String> = upload.parts.iter().map(|(_, b)| hash_part(b)).collect();
        let expected = fold_checksums(&sums)?;
        if bytes.len() as u64 != total_size || expected != root_checksum {
            return Err(GrsyncError::service("complete_upload", "size or tree hash mismatch"));
        }
        st.completed.push(CompletedUpload {
            upload_id: upload_id.to_string(),
            description: upload.description,
            part_size: upload.part_size,
            part_ranges: upload.parts.iter().map(|(r, _)| *r).collect(),
            bytes,
            checksum: expected.clone(),
        });
        Ok(ArchiveMeta {
            archive_id: format!("archive-{upload_id}"),
            location: format!("/{VAULT}/archives/archive-{upload_id}"),
            checksum: expected,
            timestamp: "2024-03-17T12:00:00Z".to_string(),
        })
    }

    fn abort_upload(&self, _vault: &str, upload_id: &str) -> Result<()> {
        let mut st = self.state.lock().unwrap();
        st.pending.remove(upload_id);
        st.aborted.push(upload_id.to_string());
        Ok(())
    }

    fn list_incomplete_uploads(&self, _vault: &str) -> Result<Vec<IncompleteUpload>> {
        let st = self.state.lock().unwrap();
        let mut out: Vec<IncompleteUpload> = st
            .pending
            .iter()
            .map(|(id, u)| IncompleteUpload {
                upload_id: id.clone(),
                description: u.description.clone(),
                created_at: "2024-03-17T12:00:00Z".to_string(),
                part_size: u.part_size,
            })
            .collect();
        out.sort_by(|a, b| a.upload_id.cmp(&b.upload_id));
        Ok(out)
    }
}

/// Deterministic, poorly compressible bytes.
pub fn pseudo_random(len: usize, seed: u64) -> Vec<u8> {
    let mut x = seed.wrapping_mul(0x9E37_79B9_7F4A_7C15) | 1;
    (0..len)
        .map(|_| {
            x ^= x << 13;
            x ^= x >> 7;
            x ^= x << 17;
            (x >> 24) as u8
        })
        .collect()
}
