use thiserror::Error;

/// Every failure a bridge operation can report to its caller.
#[derive(Debug, Error)]
pub enum ApiError {
    /// The remote service answered with a 4xx/5xx status.
    #[error("Bad credentials")]
    BadCredentials,

    /// An HTTP verb outside GET/POST/PUT/DELETE was requested.
    #[error("Bad HTTP method: {0}")]
    BadMethod(String),

    /// A successful response lacked something it must carry.
    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("File upload error")]
    FileUploadError,

    #[error("Files not found")]
    FilesNotFound,

    #[error("File not found: {0}")]
    FileNotFound(i64),

    #[error("Transport error: {0}")]
    TransportError(String),

    /// The host store could not be read or written.
    #[error("Storage error: {0}")]
    Storage(String),
}

impl ApiError {
    /// Short message suitable for an end user.
    pub fn user_message(&self) -> String {
        match self {
            ApiError::BadCredentials => "Bad credentials".to_string(),
            ApiError::BadMethod(_) => "Bad HTTP method".to_string(),
            ApiError::InvalidResponse(_) => "Invalid response".to_string(),
            ApiError::FileUploadError => "File upload error".to_string(),
            ApiError::FilesNotFound => "Files not found".to_string(),
            ApiError::FileNotFound(_) => "File not found".to_string(),
            ApiError::TransportError(message) => message.clone(),
            ApiError::Storage(_) => "Storage error".to_string(),
        }
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        ApiError::Storage(format!("{:#}", err))
    }
}

impl From<reqwest::Error> for ApiError {
    fn from(err: reqwest::Error) -> Self {
        ApiError::TransportError(err.to_string())
    }
}

pub type ApiResult<T> = std::result::Result<T, ApiError>;
