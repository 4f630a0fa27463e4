//! In-memory stand-ins for the backend ports, with gates that let a test
//! decide exactly when each request completes.

#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::oneshot;

use quizicist_core::{
    AnswerChoice, ApiError, ApiResult, CacheKey, ErrorHandler, FeedbackState, Generation,
    MutationAck, MutationDispatcher, MutationRequest, MutationTransport, Question, RemoteSource,
    Resource, ResourceCache,
};

/// How the fake backend answers one mutation path.
pub struct Script {
    gate: Option<oneshot::Receiver<()>>,
    reply: ApiResult<MutationAck>,
    /// Server-side state after the mutation succeeds.
    effect: Option<(CacheKey, Resource)>,
}

impl Script {
    pub fn ok() -> Self {
        Self {
            gate: None,
            reply: Ok(MutationAck {
                message: Some("ok".into()),
                canonical: None,
            }),
            effect: None,
        }
    }

    pub fn canonical(resource: Resource) -> Self {
        Self {
            gate: None,
            reply: Ok(MutationAck {
                message: None,
                canonical: Some(resource),
            }),
            effect: None,
        }
    }

    pub fn fail(error: ApiError) -> Self {
        Self {
            gate: None,
            reply: Err(error),
            effect: None,
        }
    }

    pub fn gated(mut self, gate: oneshot::Receiver<()>) -> Self {
        self.gate = Some(gate);
        self
    }

    pub fn with_effect(mut self, key: CacheKey, resource: Resource) -> Self {
        self.effect = Some((key, resource));
        self
    }
}

#[derive(Default)]
pub struct FakeBackend {
    server: Mutex<HashMap<CacheKey, Resource>>,
    scripts: Mutex<HashMap<String, Script>>,
    fetch_gates: Mutex<VecDeque<oneshot::Receiver<()>>>,
    sent: Mutex<Vec<MutationRequest>>,
    fetches: AtomicUsize,
}

impl FakeBackend {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn set_server(&self, key: CacheKey, resource: Resource) {
        self.server.lock().unwrap().insert(key, resource);
    }

    pub fn script(&self, path: &str, script: Script) {
        self.scripts.lock().unwrap().insert(path.to_string(), script);
    }

    /// Holds the next fetch until `gate` fires. The fetch still reads the
    /// server state as of when it was issued.
    pub fn gate_next_fetch(&self, gate: oneshot::Receiver<()>) {
        self.fetch_gates.lock().unwrap().push_back(gate);
    }

    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }

    pub fn sent(&self) -> Vec<MutationRequest> {
        self.sent.lock().unwrap().clone()
    }

    pub async fn wait_for_sends(&self, count: usize) {
        while self.sent.lock().unwrap().len() < count {
            tokio::task::yield_now().await;
        }
    }
}

#[async_trait]
impl RemoteSource for FakeBackend {
    async fn fetch(&self, key: &CacheKey) -> ApiResult<Resource> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        let snapshot = self.server.lock().unwrap().get(key).cloned();
        let gate = self.fetch_gates.lock().unwrap().pop_front();
        if let Some(gate) = gate {
            let _ = gate.await;
        }
        snapshot.ok_or_else(|| ApiError::from_status(404, None))
    }
}

#[async_trait]
impl MutationTransport for FakeBackend {
    async fn send(&self, request: &MutationRequest) -> ApiResult<MutationAck> {
        self.sent.lock().unwrap().push(request.clone());
        let script = self
            .scripts
            .lock()
            .unwrap()
            .remove(&request.path)
            .unwrap_or_else(Script::ok);

        if let Some(gate) = script.gate {
            let _ = gate.await;
        }
        if script.reply.is_ok() {
            if let Some((key, resource)) = script.effect {
                self.set_server(key, resource);
            }
        }
        script.reply
    }
}

#[derive(Default)]
pub struct RecordingHandler {
    seen: Mutex<Vec<ApiError>>,
}

impl RecordingHandler {
    pub fn seen(&self) -> Vec<ApiError> {
        self.seen.lock().unwrap().clone()
    }
}

#[async_trait]
impl ErrorHandler for RecordingHandler {
    async fn handle(&self, error: &ApiError) {
        self.seen.lock().unwrap().push(error.clone());
    }
}

pub struct Harness {
    pub backend: Arc<FakeBackend>,
    pub handler: Arc<RecordingHandler>,
    pub cache: Arc<ResourceCache>,
    pub dispatcher: Arc<MutationDispatcher>,
}

pub fn harness() -> Harness {
    let backend = FakeBackend::new();
    let handler = Arc::new(RecordingHandler::default());
    let cache = Arc::new(ResourceCache::new(backend.clone()));
    let dispatcher = Arc::new(MutationDispatcher::new(
        cache.clone(),
        backend.clone(),
        handler.clone(),
    ));
    Harness {
        backend,
        handler,
        cache,
        dispatcher,
    }
}

pub fn answer(id: i64, position: u32, feedback: FeedbackState) -> AnswerChoice {
    AnswerChoice {
        id,
        text: format!("answer {}", id),
        original_text: format!("answer {}", id),
        position,
        predicted_feedback: None,
        user_feedback: feedback,
        deleted: false,
    }
}

/// Generation 1 with questions 10 (answers 100, 101) and 11 (answer 110).
pub fn generation() -> Generation {
    Generation {
        id: 1,
        filename: "biology.md".into(),
        unique_filename: Some("abc-biology.md".into()),
        questions: vec![
            Question {
                id: 10,
                question: "What is a cell?".into(),
                original_question: "What is a cell?".into(),
                is_custom_question: false,
                position: 0,
                shard: 0,
                deleted: false,
                answers: vec![
                    answer(100, 0, FeedbackState::Unselected),
                    answer(101, 1, FeedbackState::Unselected),
                ],
            },
            Question {
                id: 11,
                question: "What is DNA?".into(),
                original_question: "What is DNA?".into(),
                is_custom_question: false,
                position: 1,
                shard: 0,
                deleted: false,
                answers: vec![answer(110, 0, FeedbackState::Unselected)],
            },
        ],
    }
}

pub fn cached_generation(cache: &ResourceCache) -> Generation {
    cache
        .get(&CacheKey::Generation(1))
        .and_then(Resource::into_generation)
        .expect("generation 1 is cached")
}
