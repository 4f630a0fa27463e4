//! services/client/src/handler.rs
//!
//! The process-wide error handler. It turns every error the dispatcher reports
//! into an `ErrorAction`, carries the action out and broadcasts a `Notice` for
//! whatever front end is listening.

use std::sync::Arc;

use async_trait::async_trait;
use quizicist_core::{ApiError, AuthService, ErrorAction, ErrorHandler, GENERIC_ERROR_MESSAGE};
use tokio::sync::broadcast;
use tracing::{error, info, warn};

const NOTICE_CAPACITY: usize = 64;

/// What the user should be told after an error was handled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notice {
    /// Consent was accepted automatically. The failed request was not retried.
    Reauthenticated,
    /// The session needs consent and automatic consent is off.
    ConsentRequired,
    /// Elevated access expired; leave the admin view.
    LeftProtectedView,
    Message(String),
}

impl std::fmt::Display for Notice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Notice::Reauthenticated => {
                write!(f, "Session renewed. Please repeat the last action.")
            }
            Notice::ConsentRequired => write!(
                f,
                "Authentication required. Accept the consent prompt (--accept-consent) and try again."
            ),
            Notice::LeftProtectedView => {
                write!(f, "Admin access has expired. Authenticate again to continue.")
            }
            Notice::Message(message) => write!(f, "{}", message),
        }
    }
}

pub struct NoticeHandler {
    auth: Arc<dyn AuthService>,
    auto_consent: bool,
    notices: broadcast::Sender<Notice>,
}

impl NoticeHandler {
    pub fn new(auth: Arc<dyn AuthService>, auto_consent: bool) -> Self {
        let (notices, _) = broadcast::channel(NOTICE_CAPACITY);
        Self {
            auth,
            auto_consent,
            notices,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Notice> {
        self.notices.subscribe()
    }

    fn publish(&self, notice: Notice) {
        // No listeners is fine; the notice has already been logged.
        let _ = self.notices.send(notice);
    }

    async fn reauthenticate(&self) -> Notice {
        if !self.auto_consent {
            return Notice::ConsentRequired;
        }
        match self.auth.authenticate().await {
            Ok(()) => {
                info!("consent accepted automatically");
                Notice::Reauthenticated
            }
            Err(err) => {
                error!(error = %err, "automatic consent failed");
                Notice::Message(GENERIC_ERROR_MESSAGE.to_string())
            }
        }
    }
}

#[async_trait]
impl ErrorHandler for NoticeHandler {
    async fn handle(&self, error: &ApiError) {
        let notice = match ErrorAction::for_error(error) {
            ErrorAction::Reauthenticate => {
                warn!("backend requires authentication");
                self.reauthenticate().await
            }
            ErrorAction::LeaveProtectedView => {
                warn!("admin access rejected");
                Notice::LeftProtectedView
            }
            ErrorAction::Display(message) => {
                warn!(%error, "request failed");
                Notice::Message(message)
            }
            ErrorAction::DisplayGeneric => {
                warn!(%error, "request failed without a message");
                Notice::Message(GENERIC_ERROR_MESSAGE.to_string())
            }
        };
        self.publish(notice);
    }
}
