pub mod aead;
pub mod key;
pub mod stream;

pub use key::EncryptionKey;
pub use stream::{EncryptingReader, decrypt_stream, sealed_len};
