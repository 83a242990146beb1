//! Shared types for the OnlyFans engine workspace

mod error;
mod secret;

pub use error::{Error, Result};
pub use secret::Secret;
