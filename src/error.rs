use std::path::PathBuf;

use thiserror::Error;

/// Failures talking to the remote document store.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("failed to build HTTP client: {0}")]
    Client(#[source] reqwest::Error),

    #[error("{op}: request failed: {source}")]
    Transport {
        op: &'static str,
        #[source]
        source: reqwest::Error,
    },

    #[error("{op}: store answered with status {status}")]
    Status { op: &'static str, status: u16 },

    #[error("{op}: unreadable response: {source}")]
    Decode {
        op: &'static str,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid record id {0:?}")]
    InvalidId(String),
}

/// Failures turning an invoice into a PDF.
#[derive(Error, Debug)]
pub enum ExportError {
    #[error("'typst' is not installed (see https://github.com/typst/typst)")]
    MissingTypst,

    #[error("template error: {0}")]
    Template(#[from] tera::Error),

    #[error("invalid logo: {0}")]
    Logo(String),

    #[error("typst compile failed ({status}): {stderr}")]
    Compile { status: String, stderr: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

#[derive(Error, Debug)]
pub enum SettingsError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid settings in {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("failed to encode settings: {0}")]
    Encode(#[from] toml::ser::Error),
}

/// Anything a user-triggered session action can fail with.
#[derive(Error, Debug)]
pub enum SessionError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Export(#[from] ExportError),

    #[error("no invoice with id {0} in history")]
    UnknownRecord(String),
}
