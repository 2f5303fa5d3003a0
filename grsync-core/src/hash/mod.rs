pub mod tree;

pub use tree::{SUB_BLOCK_LEN, fold_checksums, hash_part};
