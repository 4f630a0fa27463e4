//! crates/quizicist_core/src/policy.rs
//!
//! What the application should do about an error the dispatcher reported.

use crate::ports::ApiError;

pub const GENERIC_ERROR_MESSAGE: &str = "Something went wrong, please try again.";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ErrorAction {
    /// Run the consent/authentication flow. The failed request is not retried.
    Reauthenticate,
    /// Leave the view that needed elevated access.
    LeaveProtectedView,
    /// Show the backend's message to the user.
    Display(String),
    /// Show `GENERIC_ERROR_MESSAGE`.
    DisplayGeneric,
}

impl ErrorAction {
    pub fn for_error(error: &ApiError) -> Self {
        match error {
            ApiError::Unauthenticated => ErrorAction::Reauthenticate,
            ApiError::Forbidden => ErrorAction::LeaveProtectedView,
            other => match other.message() {
                Some(message) if !message.trim().is_empty() => {
                    ErrorAction::Display(message.to_string())
                }
                _ => ErrorAction::DisplayGeneric,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn auth_errors_map_to_flows() {
        assert_eq!(
            ErrorAction::for_error(&ApiError::Unauthenticated),
            ErrorAction::Reauthenticate
        );
        assert_eq!(
            ErrorAction::for_error(&ApiError::Forbidden),
            ErrorAction::LeaveProtectedView
        );
    }

    #[test]
    fn messages_are_shown_when_present() {
        let err = ApiError::from_status(400, Some("Invalid number of questions".into()));
        assert_eq!(
            ErrorAction::for_error(&err),
            ErrorAction::Display("Invalid number of questions".into())
        );
    }

    #[test]
    fn everything_else_gets_the_fallback() {
        for err in [
            ApiError::Network("connection refused".into()),
            ApiError::Server {
                status: 500,
                message: None,
            },
            ApiError::Decode("bad json".into()),
            ApiError::from_status(422, Some("   ".into())),
        ] {
            assert_eq!(
                ErrorAction::for_error(&err),
                ErrorAction::DisplayGeneric
            );
        }
    }
}
