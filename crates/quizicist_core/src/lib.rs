pub mod cache;
pub mod dispatcher;
pub mod domain;
pub mod message;
pub mod mutation;
pub mod optimistic;
pub mod policy;
pub mod ports;
pub mod resource;
pub mod views;

pub use cache::{ReadState, ResourceCache};
pub use dispatcher::MutationDispatcher;
pub use domain::{AnswerChoice, AnswerId, FeedbackState, Generation, GenerationId, Question, QuestionId};
pub use message::{MessageKind, UserMessage};
pub use mutation::{
    ContentType, Distractor, Followup, Mutation, MutationAck, MutationBody, MutationRequest,
    QuestionEdit, Upload,
};
pub use optimistic::OptimisticPatch;
pub use policy::{ErrorAction, GENERIC_ERROR_MESSAGE};
pub use ports::{
    ApiError, ApiResult, AuthService, ErrorHandler, ExportService, MessageService, MutationTransport,
    RemoteSource,
};
pub use resource::{CacheKey, Resource};
pub use views::{DiffLine, ExportOptions, GenerationDiff};
