//! crates/quizicist_core/src/ports.rs
//!
//! Defines the service contracts (traits) for the client core.
//! These traits form the boundary of the hexagonal architecture: the cache and
//! dispatcher only talk to the backend through them, so tests can swap in fakes
//! and the HTTP adapter stays outside the core.

use async_trait::async_trait;

use crate::domain::GenerationId;
use crate::message::UserMessage;
use crate::mutation::{MutationAck, MutationRequest};
use crate::resource::{CacheKey, Resource};

//=========================================================================================
// Error and Result Types
//=========================================================================================

/// Every failure the remote collaborator can surface, one variant per kind.
///
/// `Clone` so that a single deduplicated fetch can hand its outcome to every waiter.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ApiError {
    #[error("Network failure: {0}")]
    Network(String),
    #[error("Authentication required")]
    Unauthenticated,
    #[error("Access to this resource is forbidden")]
    Forbidden,
    #[error("Request rejected: {}", .message.as_deref().unwrap_or("invalid request"))]
    Validation {
        /// `None` when the request was rejected locally before being sent.
        status: Option<u16>,
        message: Option<String>,
    },
    #[error("Server error ({status})")]
    Server { status: u16, message: Option<String> },
    #[error("Unexpected response: {0}")]
    Decode(String),
}

impl ApiError {
    /// Classifies a non-2xx HTTP status.
    pub fn from_status(status: u16, message: Option<String>) -> Self {
        match status {
            401 => ApiError::Unauthenticated,
            403 => ApiError::Forbidden,
            400..=499 => ApiError::Validation {
                status: Some(status),
                message,
            },
            _ => ApiError::Server { status, message },
        }
    }

    /// A request that failed local validation and never left the process.
    pub fn invalid(message: impl Into<String>) -> Self {
        ApiError::Validation {
            status: None,
            message: Some(message.into()),
        }
    }

    /// The user-facing message carried by the error, if any.
    pub fn message(&self) -> Option<&str> {
        match self {
            ApiError::Validation { message, .. } | ApiError::Server { message, .. } => {
                message.as_deref()
            }
            _ => None,
        }
    }
}

/// A convenience type alias for `Result<T, ApiError>`.
pub type ApiResult<T> = Result<T, ApiError>;

//=========================================================================================
// Service Ports (Traits)
//=========================================================================================

/// Read side of the backend: fetches the current value of a cache key.
#[async_trait]
pub trait RemoteSource: Send + Sync {
    async fn fetch(&self, key: &CacheKey) -> ApiResult<Resource>;
}

/// Write side of the backend: performs one mutation request.
#[async_trait]
pub trait MutationTransport: Send + Sync {
    async fn send(&self, request: &MutationRequest) -> ApiResult<MutationAck>;
}

#[async_trait]
pub trait AuthService: Send + Sync {
    /// Whether the current session has accepted the consent flow.
    async fn is_authenticated(&self) -> ApiResult<bool>;

    /// Accepts the consent flow, establishing a session.
    async fn authenticate(&self) -> ApiResult<()>;

    /// Unlocks administrative resources for the current session.
    async fn authenticate_admin(&self, password: &str) -> ApiResult<()>;
}

#[async_trait]
pub trait ExportService: Send + Sync {
    /// Downloads the generation as an mdbook-quiz TOML document.
    async fn download_toml(&self, generation_id: GenerationId) -> ApiResult<String>;

    /// Creates a Google Form for the generation and shares it with `email`.
    async fn share_google_form(&self, generation_id: GenerationId, email: &str)
        -> ApiResult<String>;
}

#[async_trait]
pub trait MessageService: Send + Sync {
    /// Files a message with the maintainers. Returns the backend's confirmation.
    async fn send_message(&self, message: &UserMessage) -> ApiResult<String>;
}

/// The process-wide sink for errors the dispatcher could not resolve.
#[async_trait]
pub trait ErrorHandler: Send + Sync {
    async fn handle(&self, error: &ApiError);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn statuses_map_to_distinct_kinds() {
        assert_eq!(ApiError::from_status(401, None), ApiError::Unauthenticated);
        assert_eq!(ApiError::from_status(403, None), ApiError::Forbidden);
        assert_eq!(
            ApiError::from_status(400, Some("Invalid number of questions".into())),
            ApiError::Validation {
                status: Some(400),
                message: Some("Invalid number of questions".into())
            }
        );
        assert!(matches!(
            ApiError::from_status(404, None),
            ApiError::Validation { status: Some(404), .. }
        ));
        assert!(matches!(
            ApiError::from_status(502, None),
            ApiError::Server { status: 502, .. }
        ));
    }

    #[test]
    fn local_rejections_carry_no_status() {
        let err = ApiError::invalid("count must be between 1 and 10");
        assert_eq!(err.message(), Some("count must be between 1 and 10"));
        assert!(matches!(err, ApiError::Validation { status: None, .. }));
        assert_eq!(
            err.to_string(),
            "Request rejected: count must be between 1 and 10"
        );
    }
}
