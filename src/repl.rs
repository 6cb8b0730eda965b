//! Line-oriented terminal front end for `docgpt chat` and `docgpt echo`.
//!
//! Each stdin line is either a slash command or chat input. Messages are
//! written to stdout as `ai: <text>` / `human: <text>`; turn failures go to
//! stderr and the loop keeps reading.
//!
//! | Line | Effect |
//! |------|--------|
//! | `/open <path>` | read and ingest a file, then greet and repaint |
//! | `/close` | deselect the file and clear the transcript |
//! | `/history` | repaint the transcript |
//! | `/quit` | leave the loop |
//! | a command with wrong arguments | print its usage to stderr |
//! | anything else | submit as chat input |

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};

use crate::chat::{ChatDisplay, EchoResponder, Responder, StubResponder};
use crate::config::Config;
use crate::embedding::DisabledProvider;
use crate::error::ChatError;
use crate::ingest::IngestPipeline;
use crate::models::{Message, UploadedFile};
use crate::session::{Session, SessionId, SessionMode, SessionStore, Turn};

/// Writes each message as one `role: text` line.
pub struct TerminalDisplay<W: Write> {
    out: W,
}

impl<W: Write> TerminalDisplay<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

impl<W: Write> ChatDisplay for TerminalDisplay<W> {
    fn render(&mut self, message: &Message) {
        let written = writeln!(self.out, "{}: {}", message.role, message.text)
            .and_then(|_| self.out.flush());
        if let Err(e) = written {
            tracing::warn!(error = %e, "failed to write message");
        }
    }
}

#[derive(Debug, PartialEq, Eq)]
enum Command<'a> {
    Open(&'a str),
    Close,
    History,
    Quit,
    Say(&'a str),
    /// A known command with missing or extra arguments; holds its usage.
    Malformed(&'static str),
}

fn parse_line(line: &str) -> Command<'_> {
    let trimmed = line.trim();
    let (head, rest) = match trimmed.split_once(char::is_whitespace) {
        Some((head, rest)) => (head, rest.trim()),
        None => (trimmed, ""),
    };
    match (head, rest.is_empty()) {
        ("/open", false) => Command::Open(rest),
        ("/open", true) => Command::Malformed("/open <path>"),
        ("/close", true) => Command::Close,
        ("/history", true) => Command::History,
        ("/quit" | "/exit", true) => Command::Quit,
        ("/close", false) => Command::Malformed("/close"),
        ("/history", false) => Command::Malformed("/history"),
        ("/quit" | "/exit", false) => Command::Malformed("/quit"),
        _ => Command::Say(line),
    }
}

/// Drive one session from `input` until EOF or `/quit`.
pub async fn run_session<R>(
    store: &mut SessionStore,
    id: SessionId,
    pipeline: &IngestPipeline,
    input: R,
    display: &mut dyn ChatDisplay,
) -> Result<()>
where
    R: AsyncBufRead + Unpin,
{
    let mut lines = input.lines();
    while let Some(line) = lines.next_line().await? {
        let turn = match parse_line(&line) {
            Command::Quit => break,
            Command::Open(path) => match read_upload(store, id, Path::new(path)) {
                Ok(upload) => Turn::SelectFile(upload),
                Err(err) => {
                    report(&err);
                    continue;
                }
            },
            Command::Close => Turn::DeselectFile,
            Command::History => Turn::Repaint,
            Command::Say(text) => Turn::Submit(text.to_string()),
            Command::Malformed(usage) => {
                report(&anyhow::anyhow!("usage: {}", usage));
                continue;
            }
        };

        if let Err(err) = store.handle(id, turn, pipeline, display).await {
            report(&anyhow::Error::new(err));
        }
    }
    Ok(())
}

fn read_upload(store: &SessionStore, id: SessionId, path: &Path) -> Result<UploadedFile> {
    if store.get(id).map(Session::mode) == Some(SessionMode::Open) {
        return Err(ChatError::FileSelectionUnsupported.into());
    }
    UploadedFile::from_path(path)
        .map_err(|e| anyhow::anyhow!("failed to read {}: {}", path.display(), e))
}

fn report(err: &anyhow::Error) {
    tracing::error!(error = %format!("{:#}", err), "chat turn failed");
    eprintln!("error: {:#}", err);
}

/// `docgpt chat`: the document-gated page, optionally preloading `file`.
pub async fn run_chat(config: &Config, file: Option<PathBuf>) -> Result<()> {
    let pipeline = IngestPipeline::from_config(config)?;
    let responder: Arc<dyn Responder> = Arc::new(StubResponder::new(&config.chat.stub_reply));

    let mut store = SessionStore::new();
    let id = store.open(Session::new(
        SessionMode::Document,
        responder,
        &config.chat.greeting,
    ));
    let mut display = TerminalDisplay::new(std::io::stdout());

    if let Some(path) = file {
        let upload = UploadedFile::from_path(&path)
            .map_err(|e| anyhow::anyhow!("failed to read {}: {}", path.display(), e))?;
        store
            .handle(id, Turn::SelectFile(upload), &pipeline, &mut display)
            .await?;
    }

    let stdin = BufReader::new(tokio::io::stdin());
    run_session(&mut store, id, &pipeline, stdin, &mut display).await?;
    store.close(id);
    Ok(())
}

/// `docgpt echo`: the ungated page that repeats every message back.
pub async fn run_echo(config: &Config) -> Result<()> {
    // Echo sessions never ingest, so no provider is needed.
    let pipeline = IngestPipeline::new(config, Arc::new(DisabledProvider));
    let responder: Arc<dyn Responder> = Arc::new(EchoResponder::new(Duration::from_millis(
        config.chat.echo_delay_ms,
    )));

    let mut store = SessionStore::new();
    let id = store.open(Session::new(SessionMode::Open, responder, &config.chat.greeting));
    let mut display = TerminalDisplay::new(std::io::stdout());

    let stdin = BufReader::new(tokio::io::stdin());
    run_session(&mut store, id, &pipeline, stdin, &mut display).await?;
    store.close(id);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn parses_commands_and_plain_input() {
        assert_eq!(parse_line("/open  docs/a.txt "), Command::Open("docs/a.txt"));
        assert_eq!(parse_line("/close"), Command::Close);
        assert_eq!(parse_line(" /history "), Command::History);
        assert_eq!(parse_line("/quit"), Command::Quit);
        assert_eq!(parse_line("What is this?"), Command::Say("What is this?"));
        assert_eq!(parse_line("/quit please"), Command::Malformed("/quit"));
    }

    #[test]
    fn commands_with_wrong_arguments_are_malformed() {
        assert_eq!(parse_line("/open"), Command::Malformed("/open <path>"));
        assert_eq!(parse_line("/open   "), Command::Malformed("/open <path>"));
        assert_eq!(parse_line("/close now"), Command::Malformed("/close"));
        assert_eq!(parse_line("/history all"), Command::Malformed("/history"));
        assert_eq!(parse_line("/exit 1"), Command::Malformed("/quit"));
        assert_eq!(parse_line("/closed"), Command::Say("/closed"));
    }

    #[tokio::test]
    async fn malformed_command_is_reported_not_sent() {
        let tmp = TempDir::new().unwrap();
        let pipeline = disabled_pipeline(&tmp);

        let mut store = SessionStore::new();
        let id = store.open(Session::new(
            SessionMode::Open,
            Arc::new(EchoResponder::new(Duration::ZERO)),
            "unused",
        ));
        let mut display = TerminalDisplay::new(Vec::new());

        run_session(
            &mut store,
            id,
            &pipeline,
            &b"/quit now\n/open\nstill here\n/quit\nafter\n"[..],
            &mut display,
        )
        .await
        .unwrap();

        let out = String::from_utf8(display.into_inner()).unwrap();
        assert_eq!(out, "human: still here\nai: You said: still here\n");
        assert_eq!(store.get(id).unwrap().transcript().len(), 2);
    }

    #[test]
    fn terminal_display_prefixes_role() {
        let mut display = TerminalDisplay::new(Vec::new());
        display.render(&Message::new("hi", crate::models::Role::Human));
        display.render(&Message::new("ㅋㅋㅋ", crate::models::Role::Ai));
        let out = String::from_utf8(display.into_inner()).unwrap();
        assert_eq!(out, "human: hi\nai: ㅋㅋㅋ\n");
    }

    fn disabled_pipeline(tmp: &TempDir) -> IngestPipeline {
        let mut config = Config::default();
        config.cache.root = tmp.path().join(".cache");
        IngestPipeline::new(&config, Arc::new(DisabledProvider))
    }

    #[tokio::test]
    async fn document_loop_opens_chats_and_closes() {
        let tmp = TempDir::new().unwrap();
        let empty = tmp.path().join("empty.txt");
        std::fs::write(&empty, "").unwrap();
        let pipeline = disabled_pipeline(&tmp);

        let mut store = SessionStore::new();
        let id = store.open(Session::new(
            SessionMode::Document,
            Arc::new(StubResponder::new("ㅋㅋㅋ")),
            "I'm ready! Ask away!",
        ));
        let script = format!(
            "too early\n/open {}\nWhat is this?\n/history\n/close\n/quit\nignored\n",
            empty.display()
        );
        let mut display = TerminalDisplay::new(Vec::new());

        run_session(&mut store, id, &pipeline, script.as_bytes(), &mut display)
            .await
            .unwrap();

        let out = String::from_utf8(display.into_inner()).unwrap();
        assert_eq!(
            out,
            "ai: I'm ready! Ask away!\n\
             human: What is this?\n\
             ai: ㅋㅋㅋ\n\
             human: What is this?\n\
             ai: ㅋㅋㅋ\n"
        );
        assert!(store.get(id).unwrap().transcript().is_empty());
    }

    #[tokio::test]
    async fn echo_loop_refuses_files() {
        let tmp = TempDir::new().unwrap();
        let pipeline = disabled_pipeline(&tmp);

        let mut store = SessionStore::new();
        let id = store.open(Session::new(
            SessionMode::Open,
            Arc::new(EchoResponder::new(Duration::ZERO)),
            "unused",
        ));
        let mut display = TerminalDisplay::new(Vec::new());

        run_session(
            &mut store,
            id,
            &pipeline,
            &b"/open nothing.txt\nping\n"[..],
            &mut display,
        )
        .await
        .unwrap();

        let out = String::from_utf8(display.into_inner()).unwrap();
        assert_eq!(out, "human: ping\nai: You said: ping\n");
        assert_eq!(store.get(id).unwrap().transcript().len(), 2);
    }
}
