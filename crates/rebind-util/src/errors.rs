use miette::Diagnostic;
use thiserror::Error;

/// Unified error type for all rebind operations.
#[derive(Debug, Error, Diagnostic)]
pub enum RebindError {
    /// I/O operation failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid or malformed input file (project assets, workspace file, redist list).
    #[error("Manifest error: {message}")]
    #[diagnostic(help("Check that the package restore completed and the file is well formed"))]
    Manifest { message: String },

    /// Dependency or redirect resolution failed.
    #[error("Resolution failed: {message}")]
    Resolution { message: String },

    /// A binary module could not be introspected.
    #[error("Invalid module {path}: {message}")]
    Metadata { path: String, message: String },

    /// No target profile could be parsed or matched.
    #[error("Target profile error: {message}")]
    Profile { message: String },

    /// Freshly computed redirects differ from the recorded ones.
    #[error("Assertion failed: {message}")]
    #[diagnostic(help("Re-run without --assert to regenerate the recorded redirects"))]
    Assertion { message: String },

    /// Catch-all for miscellaneous errors.
    #[error("{message}")]
    Generic { message: String },
}

impl RebindError {
    /// Shorthand for a [`RebindError::Resolution`] with the given message.
    pub fn resolution(message: impl Into<String>) -> Self {
        Self::Resolution {
            message: message.into(),
        }
    }

    /// Shorthand for a [`RebindError::Manifest`] with the given message.
    pub fn manifest(message: impl Into<String>) -> Self {
        Self::Manifest {
            message: message.into(),
        }
    }
}

/// Convenience alias for `miette::Result<T>`.
pub type RebindResult<T> = miette::Result<T>;
