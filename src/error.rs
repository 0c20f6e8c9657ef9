use thiserror::Error;

/// Crate wide error.
/// Every component returns one of these kinds; [`Error::status_code`] is the only place
/// where kinds are turned into HTTP exit codes.
#[derive(Debug, Error)]
pub enum Error {
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    InvalidState(String),
    #[error("{0}")]
    Forbidden(String),
    #[error("Authentication required")]
    Unauthorized,
    #[error("{0}")]
    Validation(String),
    /// Never carries key material or signature bytes.
    #[error("Cryptographic failure: {0}")]
    Crypto(String),
    #[error("Storage failure: {0}")]
    Storage(String),
    #[error("PDF error: {0}")]
    Pdf(lopdf::Error),
    #[error("Configuration error: {0}")]
    Config(String),
    #[error("Unexpected error: {0}")]
    Unexpected(String),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound(what.into())
    }

    pub fn invalid_state(what: impl Into<String>) -> Self {
        Self::InvalidState(what.into())
    }

    pub fn forbidden(what: impl Into<String>) -> Self {
        Self::Forbidden(what.into())
    }

    pub fn validation(what: impl Into<String>) -> Self {
        Self::Validation(what.into())
    }

    pub fn crypto(what: impl Into<String>) -> Self {
        Self::Crypto(what.into())
    }

    pub fn storage(what: impl Into<String>) -> Self {
        Self::Storage(what.into())
    }

    /// HTTP status for this kind of error.
    pub fn status_code(&self) -> u16 {
        match self {
            Error::Validation(_) | Error::InvalidState(_) => 400,
            Error::Unauthorized => 401,
            Error::Forbidden(_) => 403,
            Error::NotFound(_) => 404,
            Error::Crypto(_)
            | Error::Storage(_)
            | Error::Pdf(_)
            | Error::Config(_)
            | Error::Unexpected(_) => 500,
        }
    }

    /// Stable machine readable name of the kind.
    pub fn kind(&self) -> &'static str {
        match self {
            Error::NotFound(_) => "NOT_FOUND",
            Error::InvalidState(_) => "INVALID_STATE",
            Error::Forbidden(_) => "FORBIDDEN",
            Error::Unauthorized => "UNAUTHORIZED",
            Error::Validation(_) => "VALIDATION",
            Error::Crypto(_) => "CRYPTO_FAULT",
            Error::Storage(_) => "STORAGE_FAULT",
            Error::Pdf(_) => "PDF_FAULT",
            Error::Config(_) => "CONFIG",
            Error::Unexpected(_) => "UNEXPECTED",
        }
    }

    /// Client errors can be shown as is, everything else gets a generic message.
    pub fn is_client_error(&self) -> bool {
        self.status_code() < 500
    }
}

impl From<lopdf::Error> for Error {
    fn from(err: lopdf::Error) -> Self {
        Self::Pdf(err)
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Self::Storage(err.to_string())
    }
}

impl From<png::DecodingError> for Error {
    fn from(err: png::DecodingError) -> Self {
        Self::Validation(format!("Invalid PNG image: {}", err))
    }
}

impl From<png::EncodingError> for Error {
    fn from(err: png::EncodingError) -> Self {
        Self::Unexpected(format!("PNG encoding failed: {}", err))
    }
}

impl From<base64::DecodeError> for Error {
    fn from(err: base64::DecodeError) -> Self {
        Self::Validation(format!("Invalid base64 data: {}", err))
    }
}

impl From<std::num::TryFromIntError> for Error {
    fn from(err: std::num::TryFromIntError) -> Self {
        Self::Unexpected(err.to_string())
    }
}

impl From<toml::de::Error> for Error {
    fn from(err: toml::de::Error) -> Self {
        Self::Config(err.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Self::Unexpected(format!("JSON error: {}", err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes_follow_http_contract() {
        assert_eq!(Error::validation("x").status_code(), 400);
        assert_eq!(Error::invalid_state("x").status_code(), 400);
        assert_eq!(Error::Unauthorized.status_code(), 401);
        assert_eq!(Error::forbidden("x").status_code(), 403);
        assert_eq!(Error::not_found("x").status_code(), 404);
        assert_eq!(Error::crypto("x").status_code(), 500);
        assert_eq!(Error::storage("x").status_code(), 500);
    }

    #[test]
    fn test_missing_blob_is_a_storage_fault() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        let err = Error::from(io);
        assert!(matches!(err, Error::Storage(_)));
        assert!(!err.is_client_error());
    }
}
