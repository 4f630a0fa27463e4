//! services/client/src/adapters/http.rs
//!
//! This module contains the HTTP adapter, the concrete implementation of the
//! backend ports from the `core` crate. It owns the wire format: JSON records
//! are decoded here and converted into domain types, and mutation bodies are
//! serialised here.

use async_trait::async_trait;
use quizicist_core::{
    AnswerChoice, ApiError, ApiResult, AuthService, CacheKey, ExportService, FeedbackState,
    Generation, GenerationId, MessageService, MutationAck, MutationBody, MutationRequest,
    MutationTransport, Question, RemoteSource, Resource, UserMessage,
};
use reqwest::{Client, Response};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, instrument};
use url::Url;

use crate::config::Config;

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

/// A `reqwest`-backed adapter that implements every backend port.
///
/// The session cookie set by the consent flow lives in the client's cookie
/// store, so all clones of one adapter share one session.
#[derive(Clone)]
pub struct HttpAdapter {
    client: Client,
    base: Url,
}

impl HttpAdapter {
    /// Creates a new `HttpAdapter`.
    pub fn new(config: &Config) -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .cookie_store(true)
            .timeout(config.timeout)
            .user_agent(concat!("quizicist/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            client,
            base: config.server_url.clone(),
        })
    }

    fn url(&self, path: &str) -> ApiResult<Url> {
        let joined = format!("{}{}", self.base.as_str().trim_end_matches('/'), path);
        Url::parse(&joined).map_err(|e| ApiError::Network(format!("invalid url {}: {}", joined, e)))
    }

    async fn get_text(&self, path: &str) -> ApiResult<String> {
        let response = self
            .client
            .get(self.url(path)?)
            .send()
            .await
            .map_err(transport_error)?;
        read_body(response).await
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> ApiResult<T> {
        let body = self.get_text(path).await?;
        decode(&body)
    }

    async fn post(&self, path: &str, body: Option<Value>) -> ApiResult<String> {
        let mut request = self.client.post(self.url(path)?);
        if let Some(body) = body {
            request = request.json(&body);
        }
        let response = request.send().await.map_err(transport_error)?;
        read_body(response).await
    }
}

//=========================================================================================
// Response Handling
//=========================================================================================

fn transport_error(err: reqwest::Error) -> ApiError {
    if err.is_decode() {
        ApiError::Decode(err.to_string())
    } else {
        ApiError::Network(err.to_string())
    }
}

/// Reads the body and classifies non-2xx statuses.
async fn read_body(response: Response) -> ApiResult<String> {
    let status = response.status();
    let body = response.text().await.map_err(transport_error)?;
    if status.is_success() {
        Ok(body)
    } else {
        debug!(status = status.as_u16(), "backend rejected request");
        Err(ApiError::from_status(status.as_u16(), error_message(&body)))
    }
}

fn decode<T: DeserializeOwned>(body: &str) -> ApiResult<T> {
    serde_json::from_str(body).map_err(|e| ApiError::Decode(e.to_string()))
}

/// The user-facing message of a response: a JSON `message` field, or the raw
/// body when it is plain text.
fn error_message(body: &str) -> Option<String> {
    if let Ok(record) = serde_json::from_str::<MessageRecord>(body) {
        return record.message.filter(|m| !m.trim().is_empty());
    }
    let text = body.trim();
    if text.is_empty() || text.starts_with('<') {
        None
    } else {
        Some(text.to_string())
    }
}

//=========================================================================================
// "Impure" Wire Record Structs
//=========================================================================================

#[derive(Deserialize)]
struct MessageRecord {
    #[serde(default)]
    message: Option<String>,
}

#[derive(Deserialize)]
struct AuthenticatedRecord {
    authenticated: bool,
}

#[derive(Deserialize)]
struct GenerationRecord {
    id: i64,
    filename: String,
    #[serde(default)]
    unique_filename: Option<String>,
    #[serde(default)]
    questions: Vec<QuestionRecord>,
}
impl GenerationRecord {
    fn to_domain(self) -> ApiResult<Generation> {
        Ok(Generation {
            id: self.id,
            filename: self.filename,
            unique_filename: self.unique_filename,
            questions: self
                .questions
                .into_iter()
                .map(QuestionRecord::to_domain)
                .collect::<ApiResult<_>>()?,
        })
    }
}

#[derive(Deserialize)]
struct QuestionRecord {
    id: i64,
    question: String,
    #[serde(default)]
    original_question: Option<String>,
    #[serde(default)]
    is_custom_question: bool,
    #[serde(default)]
    position: Option<u32>,
    #[serde(default)]
    shard: Option<u32>,
    #[serde(default)]
    deleted: bool,
    #[serde(default)]
    answers: Vec<AnswerRecord>,
}
impl QuestionRecord {
    fn to_domain(self) -> ApiResult<Question> {
        Ok(Question {
            id: self.id,
            original_question: self.original_question.unwrap_or_else(|| self.question.clone()),
            question: self.question,
            is_custom_question: self.is_custom_question,
            position: self.position.unwrap_or_default(),
            shard: self.shard.unwrap_or_default(),
            deleted: self.deleted,
            answers: self
                .answers
                .into_iter()
                .map(AnswerRecord::to_domain)
                .collect::<ApiResult<_>>()?,
        })
    }
}

#[derive(Deserialize)]
struct AnswerRecord {
    id: i64,
    #[serde(default)]
    position: Option<u32>,
    text: String,
    #[serde(default)]
    original_text: Option<String>,
    #[serde(default)]
    predicted_feedback: Option<i64>,
    #[serde(default)]
    user_feedback: Option<i64>,
    #[serde(default)]
    deleted: bool,
}
impl AnswerRecord {
    fn to_domain(self) -> ApiResult<AnswerChoice> {
        let predicted_feedback = self.predicted_feedback.map(feedback).transpose()?;
        let user_feedback = self.user_feedback.map(feedback).transpose()?.unwrap_or_default();
        Ok(AnswerChoice {
            id: self.id,
            original_text: self.original_text.unwrap_or_else(|| self.text.clone()),
            text: self.text,
            position: self.position.unwrap_or_default(),
            predicted_feedback,
            user_feedback,
            deleted: self.deleted,
        })
    }
}

fn feedback(code: i64) -> ApiResult<FeedbackState> {
    FeedbackState::from_code(code)
        .ok_or_else(|| ApiError::Decode(format!("unknown feedback code {}", code)))
}

fn decode_resource(key: &CacheKey, body: &str) -> ApiResult<Resource> {
    match key {
        CacheKey::AllGenerations => Ok(Resource::GenerationList(decode(body)?)),
        CacheKey::Generation(_) => {
            let record: GenerationRecord = decode(body)?;
            Ok(Resource::Generation(record.to_domain()?))
        }
        CacheKey::AdminGenerations => {
            let records: Vec<GenerationRecord> = decode(body)?;
            let generations = records
                .into_iter()
                .map(GenerationRecord::to_domain)
                .collect::<ApiResult<_>>()?;
            Ok(Resource::AdminGenerations(generations))
        }
    }
}

/// The JSON body posted for a mutation, if the endpoint takes one.
fn request_body(body: &MutationBody) -> Option<Value> {
    match body {
        MutationBody::Empty => None,
        MutationBody::Upload(upload) => Some(json!({
            "title": upload.title,
            "content": upload.content,
            "content_type": upload.content_type.as_str(),
            "count": upload.count,
        })),
        MutationBody::Rename { filename } => Some(json!({ "filename": filename })),
        MutationBody::Count { count } => Some(json!({ "count": count })),
        MutationBody::CustomQuestion {
            question,
            correct_answer,
        } => Some(json!({
            "question": question,
            "correct_answer": correct_answer,
        })),
        MutationBody::QuestionEdit(edit) => {
            let mut value = json!({ "question": edit.question });
            if let Some(correct) = &edit.correct_answer {
                value["correct_answer"] = json!(correct);
            }
            if !edit.distractors.is_empty() {
                value["distractors"] = edit
                    .distractors
                    .iter()
                    .map(|d| json!({ "text": d.text, "locked": d.locked }))
                    .collect();
            }
            Some(value)
        }
        MutationBody::Answers { answers } => Some(json!({ "answers": answers })),
        MutationBody::Feedback { answer, value } => Some(json!({
            "answer": answer,
            "value": value.code(),
        })),
    }
}

/// Mutation endpoints answer with `{ "message": ... }` or plain text.
fn decode_ack(body: &str) -> MutationAck {
    let message = match serde_json::from_str::<MessageRecord>(body) {
        Ok(record) => record.message,
        Err(_) => Some(body.trim().to_string()).filter(|m| !m.is_empty()),
    };
    MutationAck {
        message,
        canonical: None,
    }
}

fn message_body(message: &UserMessage) -> Value {
    json!({
        "message": message.text,
        "message_type": message.kind.code(),
    })
}

fn looks_like_email(email: &str) -> bool {
    match email.trim().split_once('@') {
        Some((local, domain)) => {
            !local.is_empty()
                && domain.contains('.')
                && !domain.starts_with('.')
                && !domain.ends_with('.')
                && !email.contains(char::is_whitespace)
        }
        None => false,
    }
}

//=========================================================================================
// Port Implementations
//=========================================================================================

#[async_trait]
impl RemoteSource for HttpAdapter {
    #[instrument(level = "debug", skip(self), fields(%key))]
    async fn fetch(&self, key: &CacheKey) -> ApiResult<Resource> {
        let body = self.get_text(&key.path()).await?;
        decode_resource(key, &body)
    }
}

#[async_trait]
impl MutationTransport for HttpAdapter {
    #[instrument(level = "debug", skip(self, request), fields(path = %request.path))]
    async fn send(&self, request: &MutationRequest) -> ApiResult<MutationAck> {
        let body = self.post(&request.path, request_body(&request.body)).await?;
        Ok(decode_ack(&body))
    }
}

#[async_trait]
impl AuthService for HttpAdapter {
    async fn is_authenticated(&self) -> ApiResult<bool> {
        let record: AuthenticatedRecord = self.get_json("/auth/authenticated").await?;
        Ok(record.authenticated)
    }

    async fn authenticate(&self) -> ApiResult<()> {
        self.post("/auth/authenticate", None).await?;
        Ok(())
    }

    async fn authenticate_admin(&self, password: &str) -> ApiResult<()> {
        self.post("/admin/authenticate", Some(json!({ "password": password })))
            .await?;
        Ok(())
    }
}

#[async_trait]
impl ExportService for HttpAdapter {
    async fn download_toml(&self, generation_id: GenerationId) -> ApiResult<String> {
        self.get_text(&format!("/api/generated/{}/toml", generation_id))
            .await
    }

    async fn share_google_form(
        &self,
        generation_id: GenerationId,
        email: &str,
    ) -> ApiResult<String> {
        if !looks_like_email(email) {
            return Err(ApiError::invalid("Must be a valid email address"));
        }
        let body = self
            .post(
                &format!("/api/generated/{}/google_form", generation_id),
                Some(json!({ "email": email.trim() })),
            )
            .await?;
        Ok(decode_ack(&body)
            .message
            .unwrap_or_else(|| format!("Shared form with {}", email.trim())))
    }
}

#[async_trait]
impl MessageService for HttpAdapter {
    #[instrument(level = "debug", skip(self, message), fields(kind = %message.kind))]
    async fn send_message(&self, message: &UserMessage) -> ApiResult<String> {
        message.validate()?;
        let body = self
            .post("/api/message/upload", Some(message_body(message)))
            .await?;
        Ok(decode_ack(&body)
            .message
            .unwrap_or_else(|| "Uploaded message".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quizicist_core::{ContentType, Distractor, MessageKind, QuestionEdit, Upload};

    const GENERATION_JSON: &str = r#"{
        "id": 7,
        "filename": "cells.md",
        "unique_filename": "0f3a-cells.md",
        "questions": [
            {
                "id": 70,
                "question": "What is a ribosome?",
                "original_question": "What's a ribosome?",
                "is_custom_question": false,
                "position": 0,
                "shard": 1,
                "deleted": false,
                "answers": [
                    {"id": 700, "position": 0, "text": "A protein factory", "original_text": "A protein factory",
                     "predicted_feedback": 1, "user_feedback": 2, "deleted": false},
                    {"id": 701, "position": 1, "text": "A membrane"}
                ]
            },
            {"id": 71, "question": "Custom?", "is_custom_question": true, "answers": []}
        ]
    }"#;

    #[test]
    fn generation_records_decode_into_domain_types() {
        let resource = decode_resource(&CacheKey::Generation(7), GENERATION_JSON).unwrap();
        let generation = resource.into_generation().unwrap();

        assert_eq!(generation.unique_filename.as_deref(), Some("0f3a-cells.md"));
        let first = &generation.questions[0];
        assert_eq!(first.original_question, "What's a ribosome?");
        assert_eq!(first.shard, 1);
        assert_eq!(first.answers[0].predicted_feedback, Some(FeedbackState::Correct));
        assert_eq!(first.answers[0].user_feedback, FeedbackState::Incorrect);

        // Missing fields fall back to their defaults.
        assert_eq!(first.answers[1].original_text, "A membrane");
        assert_eq!(first.answers[1].user_feedback, FeedbackState::Unselected);
        assert_eq!(generation.questions[1].original_question, "Custom?");
        assert!(generation.questions[1].is_custom_question);
    }

    #[test]
    fn unknown_feedback_codes_are_decode_errors() {
        let body = r#"{"id": 1, "filename": "a.md", "questions": [
            {"id": 2, "question": "Q", "answers": [{"id": 3, "text": "A", "user_feedback": 9}]}
        ]}"#;
        assert!(matches!(
            decode_resource(&CacheKey::Generation(1), body),
            Err(ApiError::Decode(_))
        ));
    }

    #[test]
    fn listings_decode_by_key() {
        assert_eq!(
            decode_resource(&CacheKey::AllGenerations, "[9, 4, 1]").unwrap(),
            Resource::GenerationList(vec![9, 4, 1])
        );
        let admin = format!("[{}]", GENERATION_JSON);
        match decode_resource(&CacheKey::AdminGenerations, &admin).unwrap() {
            Resource::AdminGenerations(generations) => assert_eq!(generations[0].id, 7),
            other => panic!("unexpected resource {:?}", other),
        }
        assert!(decode_resource(&CacheKey::AllGenerations, "<html>").is_err());
    }

    #[test]
    fn error_messages_come_from_json_or_plain_text() {
        assert_eq!(
            error_message(r#"{"message": "Incorrect admin password"}"#).as_deref(),
            Some("Incorrect admin password")
        );
        assert_eq!(
            error_message("Invalid number of questions").as_deref(),
            Some("Invalid number of questions")
        );
        assert_eq!(error_message("<!doctype html><title>500</title>"), None);
        assert_eq!(error_message("   "), None);
    }

    #[test]
    fn feedback_body_sends_the_integer_code() {
        let body = request_body(&MutationBody::Feedback {
            answer: 12,
            value: FeedbackState::Incorrect,
        });
        assert_eq!(body, Some(json!({ "answer": 12, "value": 2 })));
    }

    #[test]
    fn upload_and_edit_bodies_match_the_backend_fields() {
        let upload = request_body(&MutationBody::Upload(Upload {
            title: "Chapter 3".into(),
            content: "# Cells".into(),
            content_type: ContentType::Markdown,
            count: 5,
        }));
        assert_eq!(
            upload,
            Some(json!({
                "title": "Chapter 3",
                "content": "# Cells",
                "content_type": "Markdown",
                "count": 5
            }))
        );

        let edit = request_body(&MutationBody::QuestionEdit(QuestionEdit {
            question: "What is ATP?".into(),
            correct_answer: None,
            distractors: vec![Distractor {
                text: "A sugar".into(),
                locked: true,
            }],
        }));
        assert_eq!(
            edit,
            Some(json!({
                "question": "What is ATP?",
                "distractors": [{ "text": "A sugar", "locked": true }]
            }))
        );
        assert_eq!(request_body(&MutationBody::Empty), None);
    }

    #[test]
    fn acks_carry_the_backend_message() {
        assert_eq!(
            decode_ack(r#"{"message": "Deleted question"}"#).message.as_deref(),
            Some("Deleted question")
        );
        assert_eq!(decode_ack("Uploaded message").message.as_deref(), Some("Uploaded message"));
        assert_eq!(decode_ack("").canonical, None);
    }

    #[test]
    fn message_body_sends_the_type_code() {
        let message = UserMessage::new(MessageKind::Suggestion, "Add a dark mode");
        assert_eq!(
            message_body(&message),
            json!({ "message": "Add a dark mode", "message_type": 1 })
        );
    }

    #[tokio::test]
    async fn invalid_messages_are_rejected_before_sending() {
        // Nothing listens on this address; a request would fail as a network error.
        let config = Config::from_lookup(|name| match name {
            "QUIZICIST_SERVER_URL" => Some("http://127.0.0.1:9".to_string()),
            _ => None,
        })
        .unwrap();
        let adapter = HttpAdapter::new(&config).unwrap();

        let result = adapter
            .send_message(&UserMessage::new(MessageKind::Error, "x".repeat(2501)))
            .await;

        assert!(matches!(
            result,
            Err(ApiError::Validation { status: None, .. })
        ));
    }

    #[test]
    fn email_shape_is_checked() {
        assert!(looks_like_email("ada@example.com"));
        assert!(!looks_like_email("ada@example"));
        assert!(!looks_like_email("@example.com"));
        assert!(!looks_like_email("ada lovelace@example.com"));
    }

    #[test]
    fn paths_are_joined_onto_the_base_url() {
        let config = Config::from_lookup(|name| match name {
            "QUIZICIST_SERVER_URL" => Some("https://quiz.example.com/".to_string()),
            _ => None,
        })
        .unwrap();
        let adapter = HttpAdapter::new(&config).unwrap();
        assert_eq!(
            adapter.url("/api/generated/3").unwrap().as_str(),
            "https://quiz.example.com/api/generated/3"
        );
    }
}
