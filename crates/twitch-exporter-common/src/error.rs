use thiserror::Error;

#[derive(Debug, Error)]
pub enum ExporterError {
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("collector already registered: {0}")]
    DuplicateCollector(String),
    #[error("prerequisite not configured: {0}")]
    PrerequisiteNotConfigured(String),
    #[error("collector returned no data")]
    NoData,
    #[error("helix request failed: {0}")]
    Transport(String),
    #[error("helix api returned status {status}: {message}")]
    Api { status: u16, message: String },
    #[error("failed to decode payload: {0}")]
    Decode(String),
    #[error("cache error: {0}")]
    Cache(String),
    #[error("signature does not match")]
    Signature,
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error("internal error: {0}")]
    InternalError(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl ExporterError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidConfig(_) => "InvalidConfig",
            Self::DuplicateCollector(_) => "DuplicateCollector",
            Self::PrerequisiteNotConfigured(_) => "PrerequisiteNotConfigured",
            Self::NoData => "NoData",
            Self::Transport(_) => "Transport",
            Self::Api { .. } => "ApiError",
            Self::Decode(_) => "Decode",
            Self::Cache(_) => "Cache",
            Self::Signature => "SignatureDoesNotMatch",
            Self::InvalidArgument(_) => "InvalidArgument",
            Self::InternalError(_) => "InternalError",
            Self::Io(_) => "InternalError",
        }
    }

    pub fn is_no_data(&self) -> bool {
        matches!(self, Self::NoData)
    }

    pub fn is_prerequisite(&self) -> bool {
        matches!(self, Self::PrerequisiteNotConfigured(_))
    }
}

pub type Result<T> = std::result::Result<T, ExporterError>;
