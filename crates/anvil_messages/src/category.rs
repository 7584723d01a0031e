//! Message categories shared by all backends.

use serde::{Deserialize, Serialize};
use std::fmt;

/// The category of a build message.
///
/// A flat enum rather than a backend-specific taxonomy, so aggregation and
/// rendering stay uniform across backends. Ordered from least to most severe,
/// matching the derived `PartialOrd`/`Ord` based on declaration order.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Serialize, Deserialize)]
pub enum MessageCategory {
    /// Timing and counter output, e.g. "compiled 12 files in 300ms".
    Statistics,
    /// Informational output that is not a problem.
    Information,
    /// A potential issue that does not fail the build.
    Warning,
    /// A definite problem; a session with any errors fails.
    Error,
}

impl MessageCategory {
    /// Returns `true` if this category is [`Error`](MessageCategory::Error).
    pub fn is_error(self) -> bool {
        self == MessageCategory::Error
    }
}

impl fmt::Display for MessageCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MessageCategory::Statistics => write!(f, "statistics"),
            MessageCategory::Information => write!(f, "info"),
            MessageCategory::Warning => write!(f, "warning"),
            MessageCategory::Error => write!(f, "error"),
        }
    }
}
