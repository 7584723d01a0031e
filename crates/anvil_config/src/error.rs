//! Error types for configuration loading and validation.

/// Errors that can occur while loading or validating `anvil.toml`.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The configuration file could not be read.
    #[error("failed to read configuration: {0}")]
    Io(#[from] std::io::Error),

    /// The configuration file is not valid TOML or has the wrong shape.
    #[error("failed to parse anvil.toml: {0}")]
    Parse(String),

    /// A required field is missing or empty.
    #[error("missing required field: {0}")]
    MissingField(String),

    /// Two modules share the same name.
    #[error("duplicate module name: {0}")]
    DuplicateModule(String),

    /// A module depends on a module that is not defined.
    #[error("module `{module}` depends on unknown module `{dependency}`")]
    UnknownDependency {
        /// The module declaring the dependency.
        module: String,
        /// The name that did not resolve.
        dependency: String,
    },

    /// Two backends claim the same file extension.
    ///
    /// File-to-backend classification must be unambiguous; a tie is a
    /// configuration error, never resolved silently.
    #[error("extension `.{extension}` is claimed by both `{first}` and `{second}`")]
    AmbiguousExtension {
        /// The contested extension.
        extension: String,
        /// The backend that claimed it first.
        first: String,
        /// The backend that claimed it second.
        second: String,
    },

    /// A backend consumes the intermediate output of an unknown backend.
    #[error("backend `{backend}` consumes unknown backend `{consumes}`")]
    UnknownConsumedBackend {
        /// The consuming backend.
        backend: String,
        /// The name that did not resolve.
        consumes: String,
    },
}
