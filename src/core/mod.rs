pub mod error;

pub use error::{Result, VaultError};
pub(crate) use error::panic_message;
