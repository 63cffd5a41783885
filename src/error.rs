//! Unified error types for hostgate.
//!
//! Defines [`HostgateError`] (the main crate error enum) and
//! [`ValidationError`] for mapping validation failures. Both use
//! `thiserror` for `Display` and `Error` derives. Error messages
//! include contextual hints to guide the user toward a fix.
//!
//! Forwarding failures have their own classified type,
//! [`ForwardError`](crate::proxy::forwarder::ForwardError), because the
//! pipeline turns them into HTTP responses instead of propagating them.

use std::path::PathBuf;

#[derive(Debug, Clone)]
pub struct ValidationError {
    pub mapping: String,
    pub field: String,
    pub message: String,
    pub suggestion: Option<String>,
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "  mapping {}: {} — {}",
            self.mapping, self.field, self.message
        )?;
        if let Some(ref suggestion) = self.suggestion {
            write!(f, " ({suggestion})")?;
        }
        Ok(())
    }
}

impl std::error::Error for ValidationError {}

fn format_errors(errors: &[ValidationError]) -> String {
    use std::fmt::Write;
    let mut buf = String::new();
    for (i, e) in errors.iter().enumerate() {
        if i > 0 {
            buf.push('\n');
        }
        // write! to String is infallible (only fails on OOM which is unrecoverable)
        let _ = write!(buf, "{e}");
    }
    buf
}

#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum HostgateError {
    #[error("No mapping source found.\n\n  {hint}")]
    NoMappingSource { hint: String },

    #[error("Mapping file not found: {}", path.display())]
    MappingFileNotFound { path: PathBuf },

    #[error("Mapping parse error in {path}:\n  {source}")]
    MappingParse {
        path: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("Mapping validation failed:\n{}", format_errors(.errors))]
    MappingValidation { errors: Vec<ValidationError> },

    #[error("No client pool for mapping '{0}'")]
    NoSuchPool(String),

    #[error("Unsupported mapping format: '{0}'")]
    UnsupportedFormat(String),

    #[error("Invalid address: {0}")]
    AddressParse(#[from] std::net::AddrParseError),

    #[error("Invalid URI: {source}")]
    UriParse {
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("HTTP request failed: {source}")]
    HttpRequest {
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("File already exists: {}", path.display())]
    FileExists { path: PathBuf },

    #[error("{0}")]
    Io(#[from] std::io::Error),

    #[error("Health check failed with status {0}")]
    HealthCheckFailed(hyper::StatusCode),

    #[error("Mapping source error ({backend}): {source}")]
    #[cfg(feature = "redis")]
    Source {
        backend: &'static str,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}
