//! services/client/src/bin/quizicist.rs

use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Parser, Subcommand, ValueEnum};
use quizicist_client::{
    config::Config, error::ClientError, handler::Notice, state::ClientState,
    telemetry::init_tracing,
};
use quizicist_core::mutation::DEFAULT_MORE_ANSWERS;
use quizicist_core::views::{all_scored, answer_letter, export_text, unscored_positions};
use quizicist_core::{
    AnswerId, ApiError, CacheKey, ContentType, Distractor, ErrorHandler, ExportOptions,
    FeedbackState, Generation, GenerationDiff, GenerationId, MessageKind, Mutation, QuestionEdit,
    QuestionId, ReadState, Resource, Upload, UserMessage,
};
use tokio::sync::broadcast;
use tracing::info;

#[derive(Parser)]
#[command(name = "quizicist", version, about = "Review and edit generated quizzes")]
struct Cli {
    /// Accept the consent prompt if the session is not authenticated yet.
    #[arg(long, global = true)]
    accept_consent: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Clone, Copy, ValueEnum)]
enum Verdict {
    Correct,
    Incorrect,
}

impl From<Verdict> for FeedbackState {
    fn from(verdict: Verdict) -> Self {
        match verdict {
            Verdict::Correct => FeedbackState::Correct,
            Verdict::Incorrect => FeedbackState::Incorrect,
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum Kind {
    Error,
    Suggestion,
    Other,
}

impl From<Kind> for MessageKind {
    fn from(kind: Kind) -> Self {
        match kind {
            Kind::Error => MessageKind::Error,
            Kind::Suggestion => MessageKind::Suggestion,
            Kind::Other => MessageKind::Other,
        }
    }
}

#[derive(Subcommand)]
enum Command {
    /// List generations, newest first.
    List,
    /// Show a generation's questions, answers and feedback.
    Show { id: GenerationId },
    /// Upload content and generate a new quiz from it.
    Upload {
        #[arg(long)]
        title: String,
        #[arg(long, value_name = "PATH")]
        file: PathBuf,
        #[arg(long, default_value_t = 5)]
        count: u32,
        /// Parse the content as Markdown (implied by a `.md` file).
        #[arg(long)]
        markdown: bool,
    },
    /// Generate more questions for a generation.
    More {
        id: GenerationId,
        #[arg(long)]
        count: u32,
    },
    /// Add a question of your own; distractors are generated for it.
    Custom {
        id: GenerationId,
        #[arg(long)]
        question: String,
        #[arg(long)]
        answer: String,
    },
    Rename { id: GenerationId, name: String },
    Delete { id: GenerationId },
    DeleteQuestion {
        generation: GenerationId,
        question: QuestionId,
    },
    DeleteAnswer {
        generation: GenerationId,
        question: QuestionId,
        answer: AnswerId,
    },
    /// Mark an answer. Marking it again with the same verdict clears the mark.
    Feedback {
        generation: GenerationId,
        question: QuestionId,
        answer: AnswerId,
        #[arg(value_enum)]
        verdict: Verdict,
    },
    /// Edit a question. Locked distractors are kept when the question is rerolled.
    Update {
        generation: GenerationId,
        question: QuestionId,
        #[arg(long)]
        text: String,
        #[arg(long)]
        answer: Option<String>,
        #[arg(long = "distractor", value_name = "TEXT")]
        distractors: Vec<String>,
        #[arg(long = "locked-distractor", value_name = "TEXT")]
        locked: Vec<String>,
    },
    /// Regenerate a question's unlocked answers.
    Reroll {
        generation: GenerationId,
        question: QuestionId,
    },
    AddAnswers {
        generation: GenerationId,
        question: QuestionId,
        #[arg(long, default_value_t = DEFAULT_MORE_ANSWERS)]
        answers: u32,
    },
    /// Print the quiz as plain text, or as mdbook-quiz TOML.
    Export {
        id: GenerationId,
        #[arg(long)]
        toml: bool,
        /// Export even if some questions have no feedback yet.
        #[arg(long)]
        force: bool,
    },
    /// Create a Google Form from the quiz and share it.
    GoogleForm { id: GenerationId, email: String },
    /// Compare a generation as first produced with its current state (admin).
    Diff { id: GenerationId },
    /// Check the admin password.
    AdminAuth,
    /// Send a message to the maintainers.
    Message {
        #[arg(long, value_enum, default_value = "error")]
        kind: Kind,
        text: String,
    },
}

#[tokio::main]
async fn main() -> Result<(), ClientError> {
    let cli = Cli::parse();

    // --- 1. Load Configuration & Set Up Logging ---
    let config = Arc::new(Config::from_env()?);
    init_tracing(&config);
    info!(server = %config.server_url, "configuration loaded");

    // --- 2. Build the Shared State ---
    let state = ClientState::new(config)?;
    let mut notices = state.notices.subscribe();

    // --- 3. Run the Command ---
    let result = run(&state, cli).await;
    print_notices(&mut notices);
    result
}

async fn run(state: &ClientState, cli: Cli) -> Result<(), ClientError> {
    ensure_session(state, cli.accept_consent).await?;

    match cli.command {
        Command::List => list(state).await,
        Command::Show { id } => {
            let generation = load_generation(state, id).await?;
            print_generation(&generation);
            Ok(())
        }
        Command::Upload {
            title,
            file,
            count,
            markdown,
        } => {
            let content = tokio::fs::read_to_string(&file).await?;
            let content_type = if markdown || is_markdown(&file) {
                ContentType::Markdown
            } else {
                ContentType::Text
            };
            mutate(
                state,
                Mutation::CreateGeneration(Upload {
                    title,
                    content,
                    content_type,
                    count,
                }),
            )
            .await
        }
        Command::More { id, count } => {
            mutate(
                state,
                Mutation::AddQuestions {
                    generation_id: id,
                    count,
                },
            )
            .await
        }
        Command::Custom {
            id,
            question,
            answer,
        } => {
            mutate(
                state,
                Mutation::CustomQuestion {
                    generation_id: id,
                    question,
                    correct_answer: answer,
                },
            )
            .await
        }
        Command::Rename { id, name } => {
            mutate(
                state,
                Mutation::RenameGeneration {
                    generation_id: id,
                    filename: name,
                },
            )
            .await
        }
        Command::Delete { id } => {
            // Load the listing so the removal can be predicted locally.
            load(state, CacheKey::AllGenerations).await?;
            mutate(state, Mutation::DeleteGeneration { generation_id: id }).await
        }
        Command::DeleteQuestion {
            generation,
            question,
        } => {
            mutate(
                state,
                Mutation::DeleteQuestion {
                    generation_id: generation,
                    question_id: question,
                },
            )
            .await
        }
        Command::DeleteAnswer {
            generation,
            question,
            answer,
        } => {
            mutate(
                state,
                Mutation::DeleteAnswer {
                    generation_id: generation,
                    question_id: question,
                    answer_id: answer,
                },
            )
            .await
        }
        Command::Feedback {
            generation,
            question,
            answer,
            verdict,
        } => {
            // The toggle is computed against the cached generation.
            load_generation(state, generation).await?;
            mutate(
                state,
                Mutation::SetFeedback {
                    generation_id: generation,
                    question_id: question,
                    answer_id: answer,
                    requested: verdict.into(),
                },
            )
            .await?;
            let marked = cached_generation(state, generation)
                .and_then(|g| g.question(question).and_then(|q| q.answer(answer)).map(|a| a.user_feedback));
            if let Some(value) = marked {
                println!("Answer {} is now {}.", answer, feedback_label(value));
            }
            Ok(())
        }
        Command::Update {
            generation,
            question,
            text,
            answer,
            distractors,
            locked,
        } => {
            let distractors = locked
                .into_iter()
                .map(|text| Distractor { text, locked: true })
                .chain(
                    distractors
                        .into_iter()
                        .map(|text| Distractor { text, locked: false }),
                )
                .collect();
            mutate(
                state,
                Mutation::UpdateQuestion {
                    generation_id: generation,
                    question_id: question,
                    edit: QuestionEdit {
                        question: text,
                        correct_answer: answer,
                        distractors,
                    },
                },
            )
            .await
        }
        Command::Reroll {
            generation,
            question,
        } => {
            mutate(
                state,
                Mutation::RerollQuestion {
                    generation_id: generation,
                    question_id: question,
                },
            )
            .await
        }
        Command::AddAnswers {
            generation,
            question,
            answers,
        } => {
            mutate(
                state,
                Mutation::AddAnswers {
                    generation_id: generation,
                    question_id: question,
                    answers,
                },
            )
            .await
        }
        Command::Export { id, toml, force } => export(state, id, toml, force).await,
        Command::GoogleForm { id, email } => {
            let message = report(state, state.export.share_google_form(id, &email).await).await?;
            println!("{}", message);
            Ok(())
        }
        Command::Diff { id } => diff(state, id).await,
        Command::AdminAuth => {
            authenticate_admin(state).await?;
            println!("Admin access granted.");
            Ok(())
        }
        Command::Message { kind, text } => {
            let message = UserMessage::new(kind.into(), text);
            let reply = report(state, state.messages.send_message(&message).await).await?;
            println!("{}", reply);
            Ok(())
        }
    }
}

//=========================================================================================
// Session and Error Helpers
//=========================================================================================

async fn ensure_session(state: &ClientState, accept_consent: bool) -> Result<(), ClientError> {
    if state.auth.is_authenticated().await? {
        return Ok(());
    }
    if !(accept_consent || state.config.auto_consent) {
        eprintln!("{}", Notice::ConsentRequired);
        return Err(ApiError::Unauthenticated.into());
    }
    state.auth.authenticate().await?;
    info!("consent accepted");
    Ok(())
}

async fn authenticate_admin(state: &ClientState) -> Result<(), ClientError> {
    let password = state.config.require_admin_password()?;
    report(state, state.auth.authenticate_admin(password).await).await
}

/// Routes a failed read through the process-wide handler, like a failed mutation.
async fn report<T>(state: &ClientState, result: Result<T, ApiError>) -> Result<T, ClientError> {
    match result {
        Ok(value) => Ok(value),
        Err(err) => {
            state.notices.handle(&err).await;
            Err(err.into())
        }
    }
}

fn print_notices(notices: &mut broadcast::Receiver<Notice>) {
    while let Ok(notice) = notices.try_recv() {
        eprintln!("{}", notice);
    }
}

//=========================================================================================
// Reads
//=========================================================================================

async fn load(state: &ClientState, key: CacheKey) -> Result<Resource, ClientError> {
    let ReadState { value, error, .. } = state.cache.read(&key).await;
    match (value, error) {
        (Some(value), _) => Ok(value),
        (None, Some(err)) => report(state, Err(err)).await,
        (None, None) => Err(ClientError::Internal(format!("{} is not available", key))),
    }
}

async fn load_generation(state: &ClientState, id: GenerationId) -> Result<Generation, ClientError> {
    load(state, CacheKey::Generation(id))
        .await?
        .into_generation()
        .ok_or_else(|| ClientError::Internal(format!("generation {} has an unexpected shape", id)))
}

fn cached_generation(state: &ClientState, id: GenerationId) -> Option<Generation> {
    state
        .cache
        .get(&CacheKey::Generation(id))
        .and_then(Resource::into_generation)
}

async fn list(state: &ClientState) -> Result<(), ClientError> {
    let ids = load(state, CacheKey::AllGenerations)
        .await?
        .as_generation_list()
        .map(<[GenerationId]>::to_vec)
        .ok_or_else(|| ClientError::Internal("unexpected generation listing".to_string()))?;
    if ids.is_empty() {
        println!("No generations yet. Upload some content to get started.");
    }
    for id in ids {
        let generation = load_generation(state, id).await?;
        let unscored = unscored_positions(&generation).len();
        println!(
            "{:>5}  {}  ({} questions, {} unscored)",
            id,
            generation.filename,
            generation.visible_questions().count(),
            unscored
        );
    }
    Ok(())
}

fn print_generation(generation: &Generation) {
    println!("{} (#{})", generation.filename, generation.id);
    for (index, question) in generation.visible_questions().enumerate() {
        let custom = if question.is_custom_question { " [custom]" } else { "" };
        println!();
        println!("{}. {}{}  #{}", index + 1, question.question, custom, question.id);
        for answer in question.visible_answers() {
            println!(
                "    {}: {}  #{} {}",
                answer_letter(answer.position),
                answer.text,
                answer.id,
                feedback_label(answer.user_feedback)
            );
        }
    }

    let positions = unscored_positions(generation);
    println!();
    if positions.is_empty() {
        println!("All questions have feedback.");
    } else {
        println!("Needs feedback: {}", join_positions(&positions));
    }
}

fn feedback_label(value: FeedbackState) -> &'static str {
    match value {
        FeedbackState::Unselected => "unmarked",
        FeedbackState::Correct => "correct",
        FeedbackState::Incorrect => "incorrect",
    }
}

fn join_positions(positions: &[usize]) -> String {
    positions
        .iter()
        .map(|p| p.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

fn is_markdown(path: &Path) -> bool {
    matches!(
        path.extension().and_then(|e| e.to_str()),
        Some("md") | Some("markdown")
    )
}

//=========================================================================================
// Writes and Exports
//=========================================================================================

async fn mutate(state: &ClientState, mutation: Mutation) -> Result<(), ClientError> {
    let ack = state.dispatcher.mutate(mutation).await?;
    println!("{}", ack.message.as_deref().unwrap_or("Done."));
    Ok(())
}

async fn export(
    state: &ClientState,
    id: GenerationId,
    toml: bool,
    force: bool,
) -> Result<(), ClientError> {
    if toml {
        let document = report(state, state.export.download_toml(id).await).await?;
        print!("{}", document);
        return Ok(());
    }

    let generation = load_generation(state, id).await?;
    if !force && !all_scored(&generation) {
        return Err(ClientError::Internal(format!(
            "questions {} still need feedback; pass --force to export anyway",
            join_positions(&unscored_positions(&generation))
        )));
    }
    print!("{}", export_text(&generation, &ExportOptions::default()));
    Ok(())
}

async fn diff(state: &ClientState, id: GenerationId) -> Result<(), ClientError> {
    authenticate_admin(state).await?;
    let generations = match load(state, CacheKey::AdminGenerations).await? {
        Resource::AdminGenerations(generations) => generations,
        _ => return Err(ClientError::Internal("unexpected admin listing".to_string())),
    };
    let generation = generations
        .iter()
        .find(|g| g.id == id)
        .ok_or_else(|| ClientError::Internal(format!("generation {} not found", id)))?;

    let diff = GenerationDiff::of(generation);
    if diff.is_unchanged() {
        println!("No changes since generation.");
        return Ok(());
    }
    for line in diff.lines() {
        println!("{}", line);
    }
    Ok(())
}
