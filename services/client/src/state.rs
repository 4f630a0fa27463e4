//! services/client/src/state.rs
//!
//! Defines the shared client state: one cache, one dispatcher and one error
//! handler per process, all talking to the same backend session.

use std::sync::Arc;

use quizicist_core::{
    AuthService, ExportService, MessageService, MutationDispatcher, MutationTransport,
    RemoteSource, ResourceCache,
};

use crate::adapters::HttpAdapter;
use crate::config::Config;
use crate::error::ClientError;
use crate::handler::NoticeHandler;

//=========================================================================================
// ClientState (Shared Across All Commands)
//=========================================================================================

/// Created once at startup and passed to everything that reads or writes remote data.
#[derive(Clone)]
pub struct ClientState {
    pub config: Arc<Config>,
    pub cache: Arc<ResourceCache>,
    pub dispatcher: Arc<MutationDispatcher>,
    pub notices: Arc<NoticeHandler>,
    pub auth: Arc<dyn AuthService>,
    pub export: Arc<dyn ExportService>,
    pub messages: Arc<dyn MessageService>,
}

impl ClientState {
    /// Wires the state against the live backend named in `config`.
    pub fn new(config: Arc<Config>) -> Result<Self, ClientError> {
        let http = Arc::new(HttpAdapter::new(&config)?);
        Ok(Self::with_backend(config, http))
    }

    /// Wires the state against any implementation of the backend ports.
    pub fn with_backend<B>(config: Arc<Config>, backend: Arc<B>) -> Self
    where
        B: RemoteSource
            + MutationTransport
            + AuthService
            + ExportService
            + MessageService
            + 'static,
    {
        let notices = Arc::new(NoticeHandler::new(backend.clone(), config.auto_consent));
        let cache = Arc::new(ResourceCache::new(backend.clone()));
        let dispatcher = Arc::new(MutationDispatcher::new(
            cache.clone(),
            backend.clone(),
            notices.clone(),
        ));
        Self {
            config,
            cache,
            dispatcher,
            notices,
            auth: backend.clone(),
            export: backend.clone(),
            messages: backend,
        }
    }
}
