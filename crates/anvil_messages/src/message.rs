//! Build messages with optional source locations.

use crate::category::MessageCategory;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// A source position attached to a message for navigation.
#[derive(Clone, PartialEq, Eq, Debug, Serialize, Deserialize)]
pub struct SourceLocation {
    /// Path of the source file the message refers to.
    pub path: PathBuf,
    /// 1-based line number, if known.
    pub line: Option<u32>,
    /// 1-based column number, if known.
    pub column: Option<u32>,
}

impl SourceLocation {
    /// A location naming only a file, without line/column.
    pub fn file(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            line: None,
            column: None,
        }
    }

    /// A full file/line/column location.
    pub fn at(path: impl Into<PathBuf>, line: u32, column: u32) -> Self {
        Self {
            path: path.into(),
            line: Some(line),
            column: Some(column),
        }
    }
}

/// A category-tagged message produced during one build session.
#[derive(Clone, PartialEq, Eq, Debug, Serialize, Deserialize)]
pub struct BuildMessage {
    /// The message category.
    pub category: MessageCategory,
    /// The message text.
    pub text: String,
    /// Optional source location for navigation.
    pub location: Option<SourceLocation>,
}

impl BuildMessage {
    /// Creates a message with the given category and no location.
    pub fn new(category: MessageCategory, text: impl Into<String>) -> Self {
        Self {
            category,
            text: text.into(),
            location: None,
        }
    }

    /// Creates an error message.
    pub fn error(text: impl Into<String>) -> Self {
        Self::new(MessageCategory::Error, text)
    }

    /// Creates a warning message.
    pub fn warning(text: impl Into<String>) -> Self {
        Self::new(MessageCategory::Warning, text)
    }

    /// Creates an informational message.
    pub fn info(text: impl Into<String>) -> Self {
        Self::new(MessageCategory::Information, text)
    }

    /// Creates a statistics message.
    pub fn statistics(text: impl Into<String>) -> Self {
        Self::new(MessageCategory::Statistics, text)
    }

    /// Attaches a source location to this message.
    pub fn with_location(mut self, location: SourceLocation) -> Self {
        self.location = Some(location);
        self
    }
}

impl fmt::Display for BuildMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.location {
            Some(loc) => {
                write!(f, "{}: {}", self.category, self.text)?;
                write!(f, " ({}", loc.path.display())?;
                if let Some(line) = loc.line {
                    write!(f, ":{line}")?;
                    if let Some(column) = loc.column {
                        write!(f, ":{column}")?;
                    }
                }
                write!(f, ")")
            }
            None => write!(f, "{}: {}", self.category, self.text),
        }
    }
}
