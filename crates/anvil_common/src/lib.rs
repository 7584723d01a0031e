//! Shared foundational types used across the Anvil build engine.
//!
//! This crate provides core types including content hashing, stable file and
//! backend identifiers, file modification stamps, and common result types.

#![warn(missing_docs)]

pub mod hash;
pub mod id;
pub mod result;
pub mod stamp;

pub use hash::ContentHash;
pub use id::{BackendId, FileId};
pub use result::{AnvilResult, InternalError};
pub use stamp::FileStamp;
