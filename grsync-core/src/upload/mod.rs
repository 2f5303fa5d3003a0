pub mod retry;
pub mod session;

pub use retry::{RetryPolicy, retry_with_backoff};
pub use session::{SessionState, UploadSession};

/// Service-imposed ceiling on the number of parts in one upload.
pub const MAX_PARTS: u64 = 10_000;

/// Smallest `base * 2^k` (k >= 0) that splits `file_size` into at most
/// [`MAX_PARTS`] parts.
pub fn choose_part_size(file_size: u64, base: u64) -> u64 {
    let mut part_size = base.max(1);
    while file_size.div_ceil(part_size) > MAX_PARTS {
        match part_size.checked_mul(2) {
            Some(next) => part_size = next,
            None => break,
        }
    }
    part_size
}
