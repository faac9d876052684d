//! Error types for the packaging pipeline.
//!
//! Provides contextual error chaining, filesystem errors with path context,
//! and typed variants for the pipeline's failure taxonomy: fatal pre-flight
//! errors, fatal stage failures, external tool failures, and notary service
//! rejections. Expected, recoverable failures (a missing optional tool, an
//! already-signed file) are downgraded to warnings at the point of
//! occurrence and never reach this type.

use std::{
    fmt::Display,
    io,
    path::{self, PathBuf},
};
use thiserror::Error as DeriveError;

/// Errors returned by the packaging pipeline.
#[derive(Debug, DeriveError)]
#[non_exhaustive]
pub enum Error {
    /// Error with context. Created by the [`Context`] trait.
    #[error("{0}: {1}")]
    Context(String, Box<Self>),

    /// File system error with path context. Created by the [`ErrorExt`]
    /// trait's `fs_context` method.
    #[error("{context} {path}: {error}")]
    Fs {
        /// Context describing the operation (e.g., "reading manifest")
        context: &'static str,
        /// Path that was being accessed
        path: PathBuf,
        /// The underlying I/O error
        error: io::Error,
    },

    /// An external tool could not be spawned at all.
    #[error("failed to run command {command}: {error}")]
    CommandFailed {
        /// Command that failed to launch
        command: String,
        /// The underlying error
        error: io::Error,
    },

    /// An external tool ran but exited with a nonzero status.
    ///
    /// The calling stage decides whether to escalate or downgrade this,
    /// so expected tool failures can be swallowed where the contract
    /// allows it.
    #[error("command {command} exited with status {code:?}: {stderr}")]
    CommandStatus {
        /// Command that failed
        command: String,
        /// Exit code, if the process was not killed by a signal
        code: Option<i32>,
        /// Trailing portion of captured stderr
        stderr: String,
    },

    /// Fatal pre-flight error: the pipeline refuses to start any work.
    #[error("pre-flight check failed: {0}")]
    Preflight(String),

    /// The build manifest failed validation.
    #[error("invalid manifest: {0}")]
    Manifest(String),

    /// A stage ran to completion but did not produce its required output.
    #[error("stage '{stage}' failed: {reason}")]
    StageFailed {
        /// Name of the failing stage
        stage: &'static str,
        /// Why its output is unusable
        reason: String,
    },

    /// The notary service returned a verdict other than acceptance.
    ///
    /// Prior artifacts are left intact; only distribution readiness is
    /// affected.
    #[error("notarization was not accepted (status: {status}): {message}")]
    NotarizationRejected {
        /// Verdict reported by the service
        status: String,
        /// Service-provided detail, if any
        message: String,
    },

    /// Generic I/O error.
    #[error("{0}")]
    Io(#[from] io::Error),

    /// Error walking a directory tree.
    #[error("{0}")]
    Walkdir(#[from] walkdir::Error),

    /// Path prefix stripping error.
    #[error("{0}")]
    Strip(#[from] path::StripPrefixError),

    /// Property list parsing/writing error.
    #[error("{0}")]
    Plist(#[from] plist::Error),

    /// Manifest TOML parsing error.
    #[error("{0}")]
    Toml(#[from] toml::de::Error),

    /// Version parsing error.
    #[error("{0}")]
    Semver(#[from] semver::Error),

    /// JSON parsing error (notary service responses).
    #[error("{0}")]
    Json(#[from] serde_json::Error),

    /// Generic error with a custom message.
    #[error("{0}")]
    Generic(String),
}

/// Convenient type alias for Result.
pub type Result<T> = std::result::Result<T, Error>;

/// Trait for adding context to errors.
///
/// Similar to `anyhow::Context` but integrated with the pipeline's Error
/// type. Works with both `Result<T, E>` and `Option<T>`.
pub trait Context<T> {
    /// Add context to an error.
    fn context<C>(self, context: C) -> Result<T>
    where
        C: Display + Send + Sync + 'static;

    /// Add context to an error using a closure (lazy evaluation).
    fn with_context<C, F>(self, f: F) -> Result<T>
    where
        C: Display + Send + Sync + 'static,
        F: FnOnce() -> C;
}

impl<T> Context<T> for Result<T> {
    fn context<C>(self, context: C) -> Result<T>
    where
        C: Display + Send + Sync + 'static,
    {
        self.map_err(|e| Error::Context(context.to_string(), Box::new(e)))
    }

    fn with_context<C, F>(self, f: F) -> Result<T>
    where
        C: Display + Send + Sync + 'static,
        F: FnOnce() -> C,
    {
        self.map_err(|e| Error::Context(f().to_string(), Box::new(e)))
    }
}

impl<T> Context<T> for Option<T> {
    fn context<C>(self, context: C) -> Result<T>
    where
        C: Display + Send + Sync + 'static,
    {
        self.ok_or_else(|| Error::Generic(context.to_string()))
    }

    fn with_context<C, F>(self, f: F) -> Result<T>
    where
        C: Display + Send + Sync + 'static,
        F: FnOnce() -> C,
    {
        self.ok_or_else(|| Error::Generic(f().to_string()))
    }
}

/// Extension trait for filesystem operations with automatic path context.
///
/// The `context` should be a present-tense verb phrase describing the
/// operation, e.g., "reading manifest", "creating staging directory".
pub trait ErrorExt<T> {
    /// Add filesystem context to an I/O error.
    fn fs_context(self, context: &'static str, path: impl Into<PathBuf>) -> Result<T>;
}

impl<T> ErrorExt<T> for std::result::Result<T, std::io::Error> {
    fn fs_context(self, context: &'static str, path: impl Into<PathBuf>) -> Result<T> {
        self.map_err(|error| Error::Fs {
            context,
            path: path.into(),
            error,
        })
    }
}
