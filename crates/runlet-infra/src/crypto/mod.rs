//! Cryptography: the AES-256-GCM vault behind the decrypt capability.

pub mod vault;

pub use vault::{VaultCipher, VaultCrypto};
