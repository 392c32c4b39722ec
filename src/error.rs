//! Error types and handling for the MVC framework.
//!
//! This module provides structured errors with unique error codes and automatic
//! HTTP status code mapping. All errors implement `IntoResponse` and serialize
//! to JSON when they escape to the HTTP surface.
//!
//! # Design
//!
//! This module uses an opaque `Error` struct paired with an `ErrorKind` enum,
//! following the `std::io::Error` pattern. The kinds follow the framework's
//! error taxonomy:
//!
//! - **Configuration errors** (malformed route, missing database config) are
//!   raised at startup or bootstrap time and are never retried.
//! - **Resource errors** (unknown resource, unknown route name, unknown action)
//!   are raised on first access and never defaulted.
//! - **Cache I/O errors** each get their own kind so operators can tell a cold
//!   cache from a broken cache directory or lock contention.
//! - **Application errors** are raised by actions and event handlers and are
//!   converted to a 500 response by the front controller.
//!
//! Routing outcomes (no match, forbidden) are not errors; they are pipeline
//! branches with their own status codes.
//!
//! # Example
//!
//! ```rust
//! use axum_mvc::{Error, ErrorKind};
//!
//! let error = Error::resource_not_found("Mailer");
//!
//! match error.kind() {
//!     ErrorKind::ResourceNotFound => println!("wiring bug: {}", error),
//!     ErrorKind::Application => println!("action failed: {}", error),
//!     _ => println!("other error: {}", error),
//! }
//!
//! use axum::http::StatusCode;
//! assert_eq!(error.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
//! ```

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use std::fmt;
use thiserror::Error;

/// The kind of error that occurred.
///
/// This enum is marked `#[non_exhaustive]`, so new variants may be added
/// without breaking existing code. Always include a wildcard arm when matching.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum ErrorKind {
    /// Configuration error (invalid TOML, missing values, bad wiring).
    #[error("configuration error")]
    Configuration,

    /// A route declaration is missing `path`, `controller` or `action`, or its
    /// pattern does not compile.
    #[error("malformed route")]
    MalformedRoute,

    /// Reverse routing found no declared route for the given name and params.
    #[error("no route found")]
    NoRouteFound,

    /// A named resource is not registered in the container.
    #[error("resource not found")]
    ResourceNotFound,

    /// A `Database_<id>` resource names a connection that is not configured.
    #[error("dependency database not found")]
    DependencyDatabaseNotFound,

    /// Database connection settings are invalid.
    #[error("database error")]
    Database,

    /// A controller does not implement the requested action.
    #[error("action not found")]
    ActionNotFound,

    /// A cache file exists but could not be opened.
    #[error("cache file cannot be opened")]
    CacheUnableToOpen,

    /// A cache file exists but is empty.
    #[error("cache file is empty")]
    CacheEmptyFile,

    /// A cache file exists but its content cannot be decoded.
    #[error("cache file is corrupt")]
    CacheCorruptFile,

    /// A cache file could not be locked.
    #[error("cache file cannot be locked")]
    CacheUnableToLock,

    /// The cache directory is missing or not writable.
    #[error("cache directory not writable")]
    CacheDirNotWritable,

    /// Error raised by application code (actions, event handlers).
    #[error("application error")]
    Application,

    /// I/O error (file operations, network).
    #[error("I/O error")]
    Io,

    /// Invalid input (bad header, request data).
    #[error("invalid input")]
    InvalidInput,

    /// Internal/unexpected error.
    #[error("internal error")]
    Internal,
}

/// An error that can occur in the framework.
///
/// This is an opaque error type that wraps an underlying error source.
/// Use [`Error::kind()`] to determine the category of error for matching,
/// and the `Display` implementation to get a human-readable message.
///
/// # Creating Errors
///
/// ```rust
/// use axum_mvc::Error;
///
/// let err = Error::config("missing [application] section");
/// let err = Error::malformed_route("home: missing controller");
/// let err = Error::application("user 42 does not exist");
/// ```
pub struct Error {
    kind: ErrorKind,
    source: Box<dyn std::error::Error + Send + Sync + 'static>,
}

impl Error {
    /// Creates a new error with the given kind and source.
    ///
    /// ```rust
    /// use axum_mvc::{Error, ErrorKind};
    ///
    /// let err = Error::new(ErrorKind::Internal, "something went wrong");
    /// assert_eq!(err.kind(), ErrorKind::Internal);
    /// ```
    pub fn new<E>(kind: ErrorKind, error: E) -> Self
    where
        E: Into<Box<dyn std::error::Error + Send + Sync + 'static>>,
    {
        Self {
            kind,
            source: error.into(),
        }
    }

    /// Returns the kind of this error.
    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// Returns the error code string for this error.
    ///
    /// This is a stable identifier suitable for client-side error handling.
    pub fn error_code(&self) -> &'static str {
        match self.kind {
            ErrorKind::Configuration => "CONFIG_ERROR",
            ErrorKind::MalformedRoute => "MALFORMED_ROUTE",
            ErrorKind::NoRouteFound => "NO_ROUTE_FOUND",
            ErrorKind::ResourceNotFound => "RESOURCE_NOT_FOUND",
            ErrorKind::DependencyDatabaseNotFound => "DEPENDENCY_DATABASE_NOT_FOUND",
            ErrorKind::Database => "DATABASE_ERROR",
            ErrorKind::ActionNotFound => "ACTION_NOT_FOUND",
            ErrorKind::CacheUnableToOpen => "CACHE_UNABLE_TO_OPEN",
            ErrorKind::CacheEmptyFile => "CACHE_EMPTY_FILE",
            ErrorKind::CacheCorruptFile => "CACHE_CORRUPT_FILE",
            ErrorKind::CacheUnableToLock => "CACHE_UNABLE_TO_LOCK",
            ErrorKind::CacheDirNotWritable => "CACHE_DIR_NOT_WRITABLE",
            ErrorKind::Application => "APPLICATION_ERROR",
            ErrorKind::Io => "IO_ERROR",
            ErrorKind::InvalidInput => "INVALID_INPUT",
            ErrorKind::Internal => "INTERNAL_ERROR",
        }
    }

    /// Returns the HTTP status code for this error.
    pub fn status_code(&self) -> StatusCode {
        match self.kind {
            ErrorKind::InvalidInput => StatusCode::BAD_REQUEST,
            ErrorKind::Database => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Returns true for errors raised while reading or writing the page cache.
    pub fn is_cache_error(&self) -> bool {
        matches!(
            self.kind,
            ErrorKind::CacheUnableToOpen
                | ErrorKind::CacheEmptyFile
                | ErrorKind::CacheCorruptFile
                | ErrorKind::CacheUnableToLock
                | ErrorKind::CacheDirNotWritable
        )
    }

    /// Converts the error into a structured error response.
    pub fn to_error_response(&self) -> ErrorResponse {
        ErrorResponse::new(self.error_code(), self.to_string())
    }

    /// Consumes the error and returns the inner error source.
    pub fn into_inner(self) -> Box<dyn std::error::Error + Send + Sync + 'static> {
        self.source
    }
}

// ============================================================================
// Convenience constructors
// ============================================================================

impl Error {
    /// Creates a configuration error.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::new(ErrorKind::Configuration, msg.into())
    }

    /// Creates a malformed route error.
    pub fn malformed_route(msg: impl Into<String>) -> Self {
        Self::new(ErrorKind::MalformedRoute, msg.into())
    }

    /// Creates a no-route-found error for reverse routing.
    pub fn no_route_found(route: impl Into<String>) -> Self {
        Self::new(
            ErrorKind::NoRouteFound,
            format!("Route {} not found.", route.into()),
        )
    }

    /// Creates a resource-not-found error.
    pub fn resource_not_found(resource: impl Into<String>) -> Self {
        Self::new(
            ErrorKind::ResourceNotFound,
            format!(
                "Resource {} does not exist in the container",
                resource.into()
            ),
        )
    }

    /// Creates a dependency-database-not-found error.
    pub fn dependency_database_not_found(db: impl Into<String>) -> Self {
        Self::new(
            ErrorKind::DependencyDatabaseNotFound,
            format!(
                "Dependency database {} not found in [databases]",
                db.into()
            ),
        )
    }

    /// Creates a database configuration error.
    ///
    /// This creates a `Database` kind error with a
    /// "Database configuration error" prefix.
    pub fn database_config(msg: impl Into<String>) -> Self {
        Self::new(
            ErrorKind::Database,
            format!("Database configuration error: {}", msg.into()),
        )
    }

    /// Creates an action-not-found error.
    pub fn action_not_found(controller: impl AsRef<str>, action: impl AsRef<str>) -> Self {
        Self::new(
            ErrorKind::ActionNotFound,
            format!(
                "Controller {} has no action {}",
                controller.as_ref(),
                action.as_ref()
            ),
        )
    }

    /// Creates a cache error of the given kind.
    pub fn cache(kind: ErrorKind, msg: impl Into<String>) -> Self {
        Self::new(kind, msg.into())
    }

    /// Creates an application error.
    pub fn application(msg: impl Into<String>) -> Self {
        Self::new(ErrorKind::Application, msg.into())
    }

    /// Creates an I/O error from a message.
    pub fn io(msg: impl Into<String>) -> Self {
        Self::new(ErrorKind::Io, msg.into())
    }

    /// Creates an invalid input error.
    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvalidInput, msg.into())
    }

    /// Creates an internal error.
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::new(ErrorKind::Internal, msg.into())
    }
}

// ============================================================================
// Trait implementations
// ============================================================================

impl fmt::Debug for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Error")
            .field("kind", &self.kind)
            .field("source", &self.source)
            .finish()
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.source)
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&*self.source)
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let error_response = self.to_error_response();

        tracing::error!(
            error_code = %error_response.error_code,
            message = %error_response.message,
            status = %status.as_u16(),
            "Error occurred"
        );

        (status, Json(error_response)).into_response()
    }
}

// ============================================================================
// From implementations
// ============================================================================

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Self::new(ErrorKind::Io, err)
    }
}

impl From<toml::de::Error> for Error {
    fn from(err: toml::de::Error) -> Self {
        Self::new(ErrorKind::Configuration, err)
    }
}

impl From<regex::Error> for Error {
    fn from(err: regex::Error) -> Self {
        Self::new(ErrorKind::MalformedRoute, err)
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Self::new(ErrorKind::InvalidInput, err)
    }
}

impl From<std::env::VarError> for Error {
    fn from(err: std::env::VarError) -> Self {
        Self::new(ErrorKind::Configuration, err)
    }
}

impl From<http::header::InvalidHeaderValue> for Error {
    fn from(err: http::header::InvalidHeaderValue) -> Self {
        Self::new(ErrorKind::InvalidInput, err)
    }
}

impl From<http::header::InvalidHeaderName> for Error {
    fn from(err: http::header::InvalidHeaderName) -> Self {
        Self::new(ErrorKind::InvalidInput, err)
    }
}

// ============================================================================
// ErrorResponse
// ============================================================================

/// Structured error response with error code and details.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    /// Unique error code for client-side error handling.
    pub error_code: String,
    /// Human-readable error message.
    pub message: String,
    /// Optional additional details about the error.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl ErrorResponse {
    /// Creates a new error response.
    pub fn new(error_code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error_code: error_code.into(),
            message: message.into(),
            details: None,
        }
    }

    /// Adds details to the error response.
    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as StdError;

    // ========================================================================
    // ErrorKind tests
    // ========================================================================

    #[test]
    fn test_error_kind_display() {
        assert_eq!(format!("{}", ErrorKind::MalformedRoute), "malformed route");
        assert_eq!(format!("{}", ErrorKind::CacheEmptyFile), "cache file is empty");
        assert_eq!(format!("{}", ErrorKind::Internal), "internal error");
    }

    // ========================================================================
    // Error constructor tests
    // ========================================================================

    #[test]
    fn test_error_new() {
        let err = Error::new(ErrorKind::Internal, "test error");
        assert_eq!(err.kind(), ErrorKind::Internal);
        assert_eq!(format!("{}", err), "test error");
    }

    #[test]
    fn test_error_resource_not_found() {
        let err = Error::resource_not_found("Mailer");
        assert_eq!(err.kind(), ErrorKind::ResourceNotFound);
        assert_eq!(
            err.to_string(),
            "Resource Mailer does not exist in the container"
        );
    }

    #[test]
    fn test_error_no_route_found() {
        let err = Error::no_route_found("user_show");
        assert_eq!(err.kind(), ErrorKind::NoRouteFound);
        assert_eq!(err.to_string(), "Route user_show not found.");
    }

    #[test]
    fn test_error_dependency_database_not_found() {
        let err = Error::dependency_database_not_found("reporting");
        assert_eq!(err.kind(), ErrorKind::DependencyDatabaseNotFound);
        assert!(err.to_string().contains("reporting"));
    }

    #[test]
    fn test_error_database_config() {
        let err = Error::database_config("unknown driver");
        assert_eq!(err.kind(), ErrorKind::Database);
        assert!(err.to_string().contains("Database configuration error"));
    }

    #[test]
    fn test_error_action_not_found() {
        let err = Error::action_not_found("index", "missing");
        assert_eq!(err.kind(), ErrorKind::ActionNotFound);
        assert_eq!(err.to_string(), "Controller index has no action missing");
    }

    #[test]
    fn test_cache_errors_are_flagged() {
        for kind in [
            ErrorKind::CacheUnableToOpen,
            ErrorKind::CacheEmptyFile,
            ErrorKind::CacheCorruptFile,
            ErrorKind::CacheUnableToLock,
            ErrorKind::CacheDirNotWritable,
        ] {
            assert!(Error::cache(kind, "x").is_cache_error());
        }
        assert!(!Error::application("x").is_cache_error());
    }

    // ========================================================================
    // Error code and status code tests
    // ========================================================================

    #[test]
    fn test_error_codes_are_distinct_for_cache_kinds() {
        let codes: Vec<_> = [
            ErrorKind::CacheUnableToOpen,
            ErrorKind::CacheEmptyFile,
            ErrorKind::CacheCorruptFile,
            ErrorKind::CacheUnableToLock,
            ErrorKind::CacheDirNotWritable,
        ]
        .into_iter()
        .map(|kind| Error::cache(kind, "x").error_code())
        .collect();

        let mut deduped = codes.clone();
        deduped.sort();
        deduped.dedup();
        assert_eq!(codes.len(), deduped.len());
    }

    #[test]
    fn test_status_code_mapping() {
        assert_eq!(
            Error::invalid_input("x").status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            Error::database_config("x").status_code(),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            Error::application("x").status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            Error::malformed_route("x").status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    // ========================================================================
    // From trait tests
    // ========================================================================

    #[test]
    fn test_from_io_error() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file missing");
        let err: Error = io_err.into();
        assert_eq!(err.kind(), ErrorKind::Io);
    }

    #[test]
    fn test_from_toml_error() {
        let toml_err = toml::from_str::<toml::Table>("invalid").unwrap_err();
        let err: Error = toml_err.into();
        assert_eq!(err.kind(), ErrorKind::Configuration);
    }

    #[test]
    fn test_from_regex_error() {
        let regex_err = regex::Regex::new("(unclosed").unwrap_err();
        let err: Error = regex_err.into();
        assert_eq!(err.kind(), ErrorKind::MalformedRoute);
    }

    #[test]
    fn test_from_var_error() {
        let err: Error = std::env::VarError::NotPresent.into();
        assert_eq!(err.kind(), ErrorKind::Configuration);
    }

    // ========================================================================
    // ErrorResponse tests
    // ========================================================================

    #[test]
    fn test_error_response_with_details() {
        let response = ErrorResponse::new("CODE", "message").with_details("extra info");
        assert_eq!(response.error_code, "CODE");
        assert_eq!(response.message, "message");
        assert_eq!(response.details, Some("extra info".to_string()));
    }

    #[test]
    fn test_to_error_response() {
        let err = Error::no_route_found("home");
        let response = err.to_error_response();
        assert_eq!(response.error_code, "NO_ROUTE_FOUND");
        assert!(response.message.contains("home"));
    }

    #[test]
    fn test_error_debug_and_source() {
        let err = Error::internal("test");
        let debug_str = format!("{:?}", err);
        assert!(debug_str.contains("Internal"));
        assert!(StdError::source(&err).is_some());
        assert_eq!(format!("{}", err.into_inner()), "test");
    }
}
