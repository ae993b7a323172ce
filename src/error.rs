use std::path::PathBuf;

pub type DomainResult<T> = Result<T, DomainError>;

/// Failure category surfaced to callers of the merge pipeline.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    InvalidUrl,
    FetchFailed,
    UnsupportedFormat,
    SizeMismatch,
    InternalError,
}

impl ErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::InvalidUrl => "invalid_url",
            Self::FetchFailed => "fetch_failed",
            Self::UnsupportedFormat => "unsupported_format",
            Self::SizeMismatch => "size_mismatch",
            Self::InternalError => "internal_error",
        }
    }

    /// Suggested status code for a request layer sitting in front of the merger.
    pub fn http_status(self) -> u16 {
        match self {
            Self::InvalidUrl => 400,
            Self::FetchFailed => 502,
            Self::UnsupportedFormat => 415,
            Self::SizeMismatch => 422,
            Self::InternalError => 500,
        }
    }

    fn message(self) -> &'static str {
        match self {
            Self::InvalidUrl => "Not a valid image url",
            Self::FetchFailed => "Images not found. Please check image urls",
            Self::UnsupportedFormat => "Format not supported",
            Self::SizeMismatch => "Not same size images",
            Self::InternalError => "Internal Error. Please Try Again",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Caller-safe error: a kind plus a fixed message. Never carries low-level detail.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[error("{message}")]
pub struct DomainError {
    kind: ErrorKind,
    message: String,
}

impl DomainError {
    pub fn new(kind: ErrorKind) -> Self {
        Self {
            kind,
            message: kind.message().to_owned(),
        }
    }

    pub fn invalid_url() -> Self {
        Self::new(ErrorKind::InvalidUrl)
    }

    pub fn fetch_failed() -> Self {
        Self::new(ErrorKind::FetchFailed)
    }

    pub fn unsupported_format() -> Self {
        Self::new(ErrorKind::UnsupportedFormat)
    }

    pub fn size_mismatch() -> Self {
        Self::new(ErrorKind::SizeMismatch)
    }

    pub fn internal() -> Self {
        Self::new(ErrorKind::InternalError)
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

#[derive(thiserror::Error, Debug)]
pub enum FetchError {
    #[error("request timed out after {attempts} attempt(s)")]
    Timeout { attempts: u32 },

    #[error("transport error: {0}")]
    Transport(String),

    #[error("unexpected response status {0}")]
    Status(u16),

    #[error("decode error: {0}")]
    Decode(String),
}

#[derive(thiserror::Error, Debug)]
pub enum PersistError {
    #[error("create storage dir '{}': {source}", path.display())]
    CreateDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("encode image: {0}")]
    Encode(#[from] image::ImageError),

    #[error("write '{}': {source}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[derive(thiserror::Error, Debug)]
pub enum CompositeError {
    #[error("image sizes differ: {fg:?} vs {bg:?}")]
    SizeMismatch { fg: (u32, u32), bg: (u32, u32) },

    #[error("composite expects equal-length rgba8 buffers")]
    BufferLength,
}

impl From<FetchError> for DomainError {
    fn from(err: FetchError) -> Self {
        tracing::warn!(error = %err, "fetch failed");
        Self::fetch_failed()
    }
}

impl From<PersistError> for DomainError {
    fn from(err: PersistError) -> Self {
        tracing::warn!(error = %err, "persist failed");
        Self::internal()
    }
}

impl From<CompositeError> for DomainError {
    fn from(err: CompositeError) -> Self {
        tracing::warn!(error = %err, "composite failed");
        Self::internal()
    }
}
