//! Per-user chat sessions and the state machine that drives a turn.
//!
//! ```text
//!                  select_file                submit (non-empty)
//!  NoFileSelected ────────────▶ AwaitingInput ──────────────────▶ ProcessingTurn
//!        ▲                         │    ▲                               │
//!        └──────── deselect_file ──┘    └──────── reply appended ───────┘
//! ```
//!
//! A [`SessionMode::Open`] session has no file gate: it starts in
//! `AwaitingInput` and rejects file selection. Every turn goes through
//! [`SessionStore::handle`], which looks the session up by id first, so no
//! handler relies on ambient state.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::chat::{paint_history, send_message, ChatDisplay, Responder, Transcript};
use crate::error::ChatError;
use crate::ingest::IngestPipeline;
use crate::models::{FileIdentity, Role, UploadedFile};
use crate::search::Retriever;

pub type SessionId = Uuid;

/// Which page a session models.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionMode {
    /// Chat is gated on an uploaded document.
    Document,
    /// Chat is always open; no document involved.
    Open,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChatState {
    NoFileSelected,
    AwaitingInput,
    ProcessingTurn,
}

pub struct Session {
    id: SessionId,
    mode: SessionMode,
    state: ChatState,
    transcript: Transcript,
    retriever: Option<Arc<Retriever>>,
    responder: Arc<dyn Responder>,
    greeting: String,
    started_at: DateTime<Utc>,
}

impl Session {
    pub fn new(mode: SessionMode, responder: Arc<dyn Responder>, greeting: impl Into<String>) -> Self {
        let state = match mode {
            SessionMode::Document => ChatState::NoFileSelected,
            SessionMode::Open => ChatState::AwaitingInput,
        };
        Self {
            id: Uuid::new_v4(),
            mode,
            state,
            transcript: Transcript::new(),
            retriever: None,
            responder,
            greeting: greeting.into(),
            started_at: Utc::now(),
        }
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn mode(&self) -> SessionMode {
        self.mode
    }

    pub fn state(&self) -> ChatState {
        self.state
    }

    pub fn transcript(&self) -> &Transcript {
        &self.transcript
    }

    pub fn retriever(&self) -> Option<&Arc<Retriever>> {
        self.retriever.as_ref()
    }

    pub fn active_file(&self) -> Option<&FileIdentity> {
        self.retriever.as_deref().map(Retriever::file)
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    /// Wall-clock time since the session was opened.
    pub fn age(&self) -> chrono::Duration {
        Utc::now().signed_duration_since(self.started_at)
    }

    /// Ingest `file` (memoized by the pipeline), greet without saving, and
    /// repaint the history.
    ///
    /// On failure the session keeps its previous file and state.
    pub async fn select_file(
        &mut self,
        pipeline: &IngestPipeline,
        file: UploadedFile,
        display: &mut dyn ChatDisplay,
    ) -> Result<Arc<Retriever>, ChatError> {
        if self.mode == SessionMode::Open {
            return Err(ChatError::FileSelectionUnsupported);
        }

        let retriever = pipeline.ingest(file).await?;
        self.retriever = Some(retriever.clone());

        send_message(display, &mut self.transcript, &self.greeting, Role::Ai, false);
        paint_history(display, &self.transcript);
        self.state = ChatState::AwaitingInput;

        tracing::info!(session = %self.id, file = %retriever.file().name, "file selected");
        Ok(retriever)
    }

    /// Clear the file and the whole transcript.
    pub fn deselect_file(&mut self) {
        if self.mode == SessionMode::Open {
            return;
        }
        self.retriever = None;
        self.transcript.reset();
        self.state = ChatState::NoFileSelected;
        tracing::info!(session = %self.id, "file deselected, transcript cleared");
    }

    /// Handle one line of user input.
    ///
    /// Blank input is ignored and yields `Ok(None)`. Otherwise the human
    /// message is saved and rendered before the reply is computed; if the
    /// reply fails the human message stays and no AI message is added.
    pub async fn submit(
        &mut self,
        input: &str,
        display: &mut dyn ChatDisplay,
    ) -> Result<Option<String>, ChatError> {
        if input.trim().is_empty() {
            return Ok(None);
        }
        if self.state == ChatState::NoFileSelected {
            return Err(ChatError::NoFileSelected);
        }

        send_message(display, &mut self.transcript, input, Role::Human, true);
        self.state = ChatState::ProcessingTurn;

        let reply = self
            .responder
            .reply(input, self.retriever.as_deref())
            .await;
        self.state = ChatState::AwaitingInput;

        let reply = reply.map_err(ChatError::Reply)?;
        send_message(display, &mut self.transcript, &reply, Role::Ai, true);
        Ok(Some(reply))
    }

    /// Re-render the transcript without touching it.
    pub fn repaint(&self, display: &mut dyn ChatDisplay) {
        paint_history(display, &self.transcript);
    }
}

/// One user-initiated interaction.
#[derive(Debug)]
pub enum Turn {
    SelectFile(UploadedFile),
    DeselectFile,
    Submit(String),
    Repaint,
}

/// What a handled turn produced.
#[derive(Debug, Clone)]
pub enum TurnOutcome {
    FileSelected(Arc<Retriever>),
    FileDeselected,
    Replied(String),
    Ignored,
    Repainted,
}

/// Owns every live session, keyed by id.
#[derive(Default)]
pub struct SessionStore {
    sessions: HashMap<SessionId, Session>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a session and return its id.
    pub fn open(&mut self, session: Session) -> SessionId {
        let id = session.id();
        tracing::debug!(session = %id, mode = ?session.mode(), "session opened");
        self.sessions.insert(id, session);
        id
    }

    pub fn get(&self, id: SessionId) -> Option<&Session> {
        self.sessions.get(&id)
    }

    /// End a session, dropping its transcript and retriever.
    pub fn close(&mut self, id: SessionId) -> Option<Session> {
        let session = self.sessions.remove(&id)?;
        tracing::info!(
            session = %id,
            started_at = %session.started_at().to_rfc3339(),
            age_secs = session.age().num_seconds(),
            messages = session.transcript().len(),
            "session closed"
        );
        Some(session)
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Look up `id` and apply `turn` to that session.
    pub async fn handle(
        &mut self,
        id: SessionId,
        turn: Turn,
        pipeline: &IngestPipeline,
        display: &mut dyn ChatDisplay,
    ) -> Result<TurnOutcome, ChatError> {
        let session = self
            .sessions
            .get_mut(&id)
            .ok_or(ChatError::UnknownSession(id))?;

        match turn {
            Turn::SelectFile(file) => {
                let retriever = session.select_file(pipeline, file, display).await?;
                Ok(TurnOutcome::FileSelected(retriever))
            }
            Turn::DeselectFile => {
                session.deselect_file();
                Ok(TurnOutcome::FileDeselected)
            }
            Turn::Submit(text) => match session.submit(&text, display).await? {
                Some(reply) => Ok(TurnOutcome::Replied(reply)),
                None => Ok(TurnOutcome::Ignored),
            },
            Turn::Repaint => {
                session.repaint(display);
                Ok(TurnOutcome::Repainted)
            }
        }
    }
}
