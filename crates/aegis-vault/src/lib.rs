//! aegis-vault — component C1: encrypted secrets storage.

pub mod error;
pub mod vault;

pub use error::{Result, VaultError};
pub use vault::Vault;
