//! The error taxonomy.
//!
//! Every component returns [`ForgecastError`] through [`Result`]. The
//! variants are grouped by failure kind, not a type per leaf error: a
//! failing subprocess is always a [`ForgecastError::Build`]
//! or [`ForgecastError::Package`] carrying the captured stderr tail,
//! never a bare `std::io::Error`.

use camino::Utf8PathBuf;
use miette::Diagnostic;
use thiserror::Error;

/// How many trailing bytes of captured stderr/stdout we keep on a failed
/// subprocess, for diagnosability without unbounded error payloads.
pub const STDERR_TAIL_BYTES: usize = 4096;

/// The common `Result` alias for this crate.
pub type Result<T> = std::result::Result<T, ForgecastError>;

/// Errors forgecast can surface, grouped by failure kind rather than by
/// the individual site that raised them.
#[derive(Debug, Error, Diagnostic)]
pub enum ForgecastError {
    /// Invalid configuration, detected before any stage runs.
    #[error("invalid configuration: {message}")]
    #[diagnostic(help("check your pipeline configuration against the documented schema"))]
    Config {
        /// What's wrong.
        message: String,
    },

    /// A user template failed to parse or render.
    #[error("failed to render template {template_name:?}: {message}")]
    Template {
        /// The name given to the template when it was registered.
        template_name: String,
        /// The underlying minijinja message.
        message: String,
    },

    /// A required external tool (compiler, cross toolchain, packager,
    /// signer) is absent and no fallback applies.
    #[error("missing toolchain for target {target_key}")]
    #[diagnostic(help("{remediation}"))]
    ToolchainMissing {
        /// The `(os, arch[, arm])` key that needed a toolchain.
        target_key: String,
        /// A human remediation hint, e.g. `"install gcc-mingw-w64-x86-64"`.
        remediation: String,
    },

    /// A user build command exited non-zero.
    #[error("build {build_id:?} failed (exit {exit_code:?})")]
    Build {
        /// The `BuildSpec::id` under execution.
        build_id: String,
        /// The process exit code, if the process actually ran to exit.
        exit_code: Option<i32>,
        /// The last [`STDERR_TAIL_BYTES`] bytes of captured stderr.
        stderr_tail: String,
    },

    /// An external packager failed.
    #[error("packager {packager:?} failed (exit {exit_code:?})")]
    Package {
        /// The packager's name (`"nfpm"`, `"wixl"`, ...).
        packager: String,
        /// The process exit code, if the process actually ran to exit.
        exit_code: Option<i32>,
        /// The last [`STDERR_TAIL_BYTES`] bytes of captured stderr.
        stderr_tail: String,
    },

    /// Filesystem I/O failure.
    #[error("i/o error at {path}")]
    Io {
        /// The path involved, when known.
        path: Utf8PathBuf,
        /// The underlying error.
        #[source]
        source: std::io::Error,
    },

    /// Transport-level failure in a publisher or announcer.
    #[error("network error talking to {destination}")]
    Network {
        /// The destination name (publisher id, webhook host, ...).
        destination: String,
        /// The underlying error.
        #[source]
        source: reqwest::Error,
    },

    /// A publish destination returned a non-2xx HTTP status.
    #[error("{destination} rejected the publish: HTTP {status}")]
    Publish {
        /// The destination name.
        destination: String,
        /// The HTTP status code returned.
        status: u16,
        /// The response body, truncated to [`STDERR_TAIL_BYTES`].
        body: String,
    },

    /// The pipeline or a sub-operation was cancelled.
    #[error("cancelled")]
    Cancelled,

    /// A required secret environment variable was not set.
    #[error("{publisher} requires the {env_var} environment variable")]
    MissingSecret {
        /// The publisher/announcer that needed it.
        publisher: String,
        /// The environment variable name.
        env_var: String,
    },
}

impl ForgecastError {
    /// Wrap a bare io error with the path that was being operated on.
    pub fn io(path: impl Into<Utf8PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Truncate a byte buffer to the last [`STDERR_TAIL_BYTES`] bytes and
    /// lossily decode it, for embedding in an error.
    pub fn tail(bytes: &[u8]) -> String {
        let start = bytes.len().saturating_sub(STDERR_TAIL_BYTES);
        String::from_utf8_lossy(&bytes[start..]).into_owned()
    }
}
