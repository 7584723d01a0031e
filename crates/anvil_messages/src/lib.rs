//! Build message reporting and progress tracking.
//!
//! This crate provides the flat [`MessageCategory`] taxonomy shared by every
//! backend, the [`BuildMessage`] type with optional source locations for
//! navigation, the thread-safe [`MessageSink`] accumulator, and the
//! [`ProgressIndicator`] that doubles as the single cancellation signal for a
//! build session.

#![warn(missing_docs)]

pub mod category;
pub mod message;
pub mod progress;
pub mod sink;

pub use category::MessageCategory;
pub use message::{BuildMessage, SourceLocation};
pub use progress::ProgressIndicator;
pub use sink::MessageSink;
