use crate::provider::ProviderError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("field `{0}` is required")]
    MissingField(&'static str),
    #[error("email address already registered: {0}")]
    DuplicateEmail(String),
    #[error("face is already enrolled as {name}")]
    DuplicateFace { person_id: String, name: String },
    #[error("unsupported image extension {0:?} (expected jpg, jpeg or png)")]
    UnsupportedExtension(String),
    #[error("image could not be decoded: {0}")]
    InvalidImage(String),
    #[error("no face detected in image")]
    NoFaceDetected,
    #[error("expected exactly one face, found {0}")]
    MultipleFaces(usize),
    #[error("more than one person is named {0:?}; remove by id instead")]
    AmbiguousName(String),
    #[error("person not found: {0}")]
    PersonNotFound(String),
    #[error("no absence recorded for person: {0}")]
    AbsenceNotFound(String),
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
    #[error("json: {0}")]
    Json(#[from] serde_json::Error),
    #[error("sqlite: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("embedding provider: {0}")]
    Provider(#[from] ProviderError),
}

/// Coarse classification used when reporting errors to callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Bad input from the caller (4xx-equivalent).
    Validation,
    /// Unknown person id or name.
    NotFound,
    /// I/O, persistence or provider failure.
    Failure,
}

impl ErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::Validation => "validation",
            ErrorKind::NotFound => "not_found",
            ErrorKind::Failure => "failure",
        }
    }
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::MissingField(_)
            | Error::DuplicateEmail(_)
            | Error::DuplicateFace { .. }
            | Error::UnsupportedExtension(_)
            | Error::InvalidImage(_)
            | Error::NoFaceDetected
            | Error::MultipleFaces(_)
            | Error::AmbiguousName(_) => ErrorKind::Validation,
            Error::PersonNotFound(_) | Error::AbsenceNotFound(_) => ErrorKind::NotFound,
            Error::Io(_) | Error::Json(_) | Error::Sqlite(_) | Error::Provider(_) => {
                ErrorKind::Failure
            }
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kinds() {
        assert_eq!(Error::NoFaceDetected.kind(), ErrorKind::Validation);
        assert_eq!(Error::MissingField("email").kind(), ErrorKind::Validation);
        assert_eq!(
            Error::PersonNotFound("x".into()).kind(),
            ErrorKind::NotFound
        );
        let io = std::io::Error::new(std::io::ErrorKind::Other, "disk");
        assert_eq!(Error::from(io).kind(), ErrorKind::Failure);
    }

    #[test]
    fn test_error_kind_strings() {
        assert_eq!(ErrorKind::Validation.as_str(), "validation");
        assert_eq!(ErrorKind::NotFound.as_str(), "not_found");
        assert_eq!(ErrorKind::Failure.as_str(), "failure");
    }
}
