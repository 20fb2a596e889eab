//! Typed package errors with stable class and code.
//!
//! Every failure leaving `disseminate`, `ingest` or the probe operations is a
//! [`PackageError`]. The class decides the caller-visible policy (rollback,
//! downgrade via `unauthorized`, propagate); the code is stable for tooling.

use crate::crosswalk::CrosswalkError;
use crate::model::StoreError;
use serde::Serialize;

/// Result type for package operations.
pub type PackageResult<T> = Result<T, PackageError>;

/// Failure classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Archive malformed, wrong profile, reconciliation mismatch, missing metadata.
    Validation,
    /// A crosswalk is missing or failed.
    Translation,
    /// The policy engine denied an action.
    Authorization,
    /// I/O or entity-store failure.
    Infrastructure,
}

impl std::fmt::Display for ErrorClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// Stable error codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ErrorCode {
    // Validation
    ValidationMissingManifest,
    ValidationMalformedContainer,
    ValidationMalformedManifest,
    ValidationSchema,
    ValidationProfileMismatch,
    ValidationUnsupportedType,
    ValidationReconciliation,
    ValidationMissingParent,
    ValidationIdentifierConflict,
    ValidationChecksumMismatch,
    ValidationSizeMismatch,
    ValidationMinimumMetadata,
    ValidationDuplicateEntry,
    ValidationPathTraversal,
    ValidationLimit,
    // Translation
    TranslationMissingCrosswalk,
    TranslationFailed,
    TranslationStreamFailed,
    // Authorization
    AuthorizationDenied,
    // Infrastructure
    InfraIo,
    InfraStore,
    InfraArchive,
    InfraConfig,
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// Typed package error with stable code.
#[derive(Debug, thiserror::Error)]
#[error("{class}: {message} ({code})")]
pub struct PackageError {
    pub class: ErrorClass,
    pub code: ErrorCode,
    pub message: String,
    /// Individual discrepancies (reconciliation, schema violations).
    pub details: Vec<String>,
    #[source]
    pub source: Option<anyhow::Error>,
}

impl PackageError {
    pub fn new(class: ErrorClass, code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            class,
            code,
            message: message.into(),
            details: Vec::new(),
            source: None,
        }
    }

    pub fn validation(code: ErrorCode, message: impl Into<String>) -> Self {
        Self::new(ErrorClass::Validation, code, message)
    }

    pub fn translation(code: ErrorCode, message: impl Into<String>) -> Self {
        Self::new(ErrorClass::Translation, code, message)
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(
            ErrorClass::Authorization,
            ErrorCode::AuthorizationDenied,
            message,
        )
    }

    pub fn config(message: impl Into<String>) -> Self {
        Self::new(ErrorClass::Infrastructure, ErrorCode::InfraConfig, message)
    }

    pub fn archive(message: impl Into<String>) -> Self {
        Self::new(ErrorClass::Infrastructure, ErrorCode::InfraArchive, message)
    }

    pub fn with_details(mut self, details: Vec<String>) -> Self {
        self.details = details;
        self
    }

    pub fn with_source(mut self, source: impl Into<anyhow::Error>) -> Self {
        self.source = Some(source.into());
        self
    }

    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.message = format!("{}: {}", context.into(), self.message);
        self
    }

    pub fn class(&self) -> ErrorClass {
        self.class
    }

    pub fn is_validation(&self) -> bool {
        self.class == ErrorClass::Validation
    }

    pub fn is_authorization(&self) -> bool {
        self.class == ErrorClass::Authorization
    }
}

impl From<std::io::Error> for PackageError {
    fn from(err: std::io::Error) -> Self {
        Self {
            class: ErrorClass::Infrastructure,
            code: ErrorCode::InfraIo,
            message: err.to_string(),
            details: Vec::new(),
            source: Some(err.into()),
        }
    }
}

impl From<serde_json::Error> for PackageError {
    fn from(err: serde_json::Error) -> Self {
        Self {
            class: ErrorClass::Validation,
            code: ErrorCode::ValidationMalformedManifest,
            message: err.to_string(),
            details: Vec::new(),
            source: Some(err.into()),
        }
    }
}

impl From<StoreError> for PackageError {
    fn from(err: StoreError) -> Self {
        let (class, code) = if err.is_access_denied() {
            (ErrorClass::Authorization, ErrorCode::AuthorizationDenied)
        } else {
            (ErrorClass::Infrastructure, ErrorCode::InfraStore)
        };
        Self {
            class,
            code,
            message: err.to_string(),
            details: Vec::new(),
            source: Some(err.into()),
        }
    }
}

impl From<CrosswalkError> for PackageError {
    fn from(err: CrosswalkError) -> Self {
        let code = match &err {
            CrosswalkError::NotFound { .. } => ErrorCode::TranslationMissingCrosswalk,
            CrosswalkError::StreamFailed { .. } => ErrorCode::TranslationStreamFailed,
            _ => ErrorCode::TranslationFailed,
        };
        Self {
            class: ErrorClass::Translation,
            code,
            message: err.to_string(),
            details: Vec::new(),
            source: Some(err.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_includes_class_and_code() {
        let err = PackageError::validation(ErrorCode::ValidationProfileMismatch, "wrong profile");
        assert_eq!(
            err.to_string(),
            "Validation: wrong profile (ValidationProfileMismatch)"
        );
    }

    #[test]
    fn access_denied_store_error_is_authorization() {
        let err: PackageError = StoreError::AccessDenied {
            message: "no read".into(),
        }
        .into();
        assert!(err.is_authorization());

        let err: PackageError = StoreError::NotFound {
            entity: "payload".into(),
            id: "x".into(),
        }
        .into();
        assert_eq!(err.class, ErrorClass::Infrastructure);
        assert_eq!(err.code, ErrorCode::InfraStore);
    }

    #[test]
    fn context_prefixes_message() {
        let err = PackageError::archive("bad header").with_context("Entry #3");
        assert_eq!(err.message, "Entry #3: bad header");
    }
}
