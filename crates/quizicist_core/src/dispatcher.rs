//! crates/quizicist_core/src/dispatcher.rs
//!
//! Performs one logical write against the backend and keeps the cache
//! consistent with it: predict, send, then reconcile or roll back.

use std::sync::Arc;

use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::cache::ResourceCache;
use crate::mutation::{Followup, Mutation, MutationAck};
use crate::ports::{ApiResult, ErrorHandler, MutationTransport};

pub struct MutationDispatcher {
    cache: Arc<ResourceCache>,
    transport: Arc<dyn MutationTransport>,
    errors: Arc<dyn ErrorHandler>,
}

impl MutationDispatcher {
    pub fn new(
        cache: Arc<ResourceCache>,
        transport: Arc<dyn MutationTransport>,
        errors: Arc<dyn ErrorHandler>,
    ) -> Self {
        Self {
            cache,
            transport,
            errors,
        }
    }

    /// Runs `mutation` end to end.
    ///
    /// The optimistic prediction lands in the cache before the request is sent.
    /// On success the target is confirmed, and revalidated unless the backend
    /// returned a current canonical value. On failure the prediction is rolled back,
    /// the error goes to the process-wide handler once, and is returned.
    #[instrument(
        level = "info",
        skip(self, mutation),
        fields(mutation_id = %Uuid::new_v4(), kind = mutation.kind(), target = %mutation.target())
    )]
    pub async fn mutate(&self, mutation: Mutation) -> ApiResult<MutationAck> {
        if let Err(err) = mutation.validate() {
            warn!(error = %err, "mutation rejected locally");
            self.errors.handle(&err).await;
            return Err(err);
        }

        let key = mutation.target();
        let (prepared, seq) = self.cache.begin(&key, &mutation);

        match self.transport.send(&prepared.request).await {
            Ok(ack) => {
                let needs_refetch = self.cache.confirm(&key, seq, ack.canonical.clone());
                info!(
                    has_canonical = ack.canonical.is_some(),
                    message = ?ack.message,
                    "mutation confirmed"
                );

                if needs_refetch {
                    if let Err(err) = self.cache.revalidate(&key).await {
                        warn!(error = %err, "revalidation after mutation failed");
                    }
                }
                self.run_followups(&mutation).await;
                Ok(ack)
            }
            Err(err) => {
                self.cache.rollback(&key, seq);
                warn!(error = %err, "mutation failed");
                self.errors.handle(&err).await;
                Err(err)
            }
        }
    }

    async fn run_followups(&self, mutation: &Mutation) {
        for followup in mutation.followups() {
            match followup {
                Followup::Evict(key) => self.cache.evict(&key),
                Followup::RefreshIfCached(key) => {
                    if let Some(Err(err)) = self.cache.revalidate_if_cached(&key).await {
                        warn!(%key, error = %err, "refreshing related entry failed");
                    } else {
                        debug!(%key, "related entry checked");
                    }
                }
            }
        }
    }
}
