//! Transcript, display surface, and reply generation for the chat loop.
//!
//! [`send_message`] is the single place a message reaches the screen: it
//! always renders, and appends to the transcript only when asked to save.
//! [`paint_history`] replays the transcript through the same path with
//! saving turned off, so a repaint can never grow the history.

use std::time::Duration;

use async_trait::async_trait;

use crate::models::{Message, Role};
use crate::search::Retriever;

/// Where rendered messages go (a terminal, a test recorder, a web page).
pub trait ChatDisplay {
    fn render(&mut self, message: &Message);
}

/// Ordered, append-only record of one session's conversation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Transcript {
    messages: Vec<Message>,
}

impl Transcript {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, message: Message) {
        self.messages.push(message);
    }

    /// Drop the whole history.
    pub fn reset(&mut self) {
        self.messages.clear();
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn last(&self) -> Option<&Message> {
        self.messages.last()
    }
}

/// Render `text` as `role`, appending it to `transcript` when `save` is set.
pub fn send_message(
    display: &mut dyn ChatDisplay,
    transcript: &mut Transcript,
    text: &str,
    role: Role,
    save: bool,
) {
    let message = Message::new(text, role);
    display.render(&message);
    if save {
        transcript.push(message);
    }
}

/// Re-render every transcript message in order. Never mutates the transcript.
pub fn paint_history(display: &mut dyn ChatDisplay, transcript: &Transcript) {
    for message in transcript.messages() {
        display.render(message);
    }
}

/// Produces the AI side of a turn.
///
/// The session's retriever is passed along when a file is selected; the
/// bundled responders ignore it.
#[async_trait]
pub trait Responder: Send + Sync {
    async fn reply(&self, input: &str, retriever: Option<&Retriever>) -> anyhow::Result<String>;
}

/// Answers every message with the same fixed text.
pub struct StubResponder {
    reply: String,
}

impl StubResponder {
    pub fn new(reply: impl Into<String>) -> Self {
        Self {
            reply: reply.into(),
        }
    }
}

#[async_trait]
impl Responder for StubResponder {
    async fn reply(&self, _input: &str, _retriever: Option<&Retriever>) -> anyhow::Result<String> {
        Ok(self.reply.clone())
    }
}

/// Repeats the user's message back after a short pause.
pub struct EchoResponder {
    delay: Duration,
}

impl EchoResponder {
    pub fn new(delay: Duration) -> Self {
        Self { delay }
    }
}

#[async_trait]
impl Responder for EchoResponder {
    async fn reply(&self, input: &str, _retriever: Option<&Retriever>) -> anyhow::Result<String> {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        Ok(format!("You said: {}", input))
    }
}
