use std::time::Duration;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ProvisionError {
    #[error("Preflight check failed: {0}")]
    Preflight(String),

    #[error("Configuration error: {0}")]
    Config(String),

    /// An external command ran to completion with a non-zero status.
    #[error("`{command}` failed{}", failure_suffix(.code, .stderr))]
    CommandFailed {
        command: String,
        code: Option<i32>,
        stderr: String,
    },

    #[error("`{command}` timed out after {elapsed:?}")]
    CommandTimeout { command: String, elapsed: Duration },

    #[error("Failed to start `{command}`: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Download of {url} failed: {message}")]
    Download { url: String, message: String },

    /// Wraps the failure of an installation so the message names what was being installed.
    #[error("Failed to install {what}: {source}")]
    Install {
        what: String,
        #[source]
        source: Box<ProvisionError>,
    },

    #[error("Interrupted by {signal}")]
    Interrupted { signal: &'static str, code: i32 },

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Dialog error: {0}")]
    Dialog(#[from] dialoguer::Error),

    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

fn failure_suffix(code: &Option<i32>, stderr: &str) -> String {
    let mut suffix = code
        .map(|c| format!(" with exit code {}", c))
        .unwrap_or_default();
    if !stderr.is_empty() {
        suffix.push_str(": ");
        suffix.push_str(stderr);
    }
    suffix
}

impl ProvisionError {
    pub fn install(what: impl Into<String>, source: ProvisionError) -> Self {
        Self::Install {
            what: what.into(),
            source: Box::new(source),
        }
    }

    pub fn download(url: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Download {
            url: url.into(),
            message: message.into(),
        }
    }

    /// Process exit status for this error.
    ///
    /// A failed external command propagates its own status; interruptions use
    /// the conventional `128 + signal`. Everything else exits with 1.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::CommandFailed { code: Some(code), .. } if *code > 0 && *code < 256 => *code,
            Self::Install { source, .. } => source.exit_code(),
            Self::Interrupted { code, .. } => *code,
            _ => 1,
        }
    }
}

pub type Result<T> = std::result::Result<T, ProvisionError>;
