// Interactive chat mode

use std::borrow::Cow;
use std::future::Future;
use std::io::Write;
use std::sync::mpsc as std_mpsc;
use std::sync::Arc;

use colored::Colorize;
use ragdesk_api::{ChatTransport, Notification};
use ragdesk_input::{InputHistory, SuggestionEngine};
use ragdesk_sessions::{
    BusEvent, ChatController, ChatOptions, ChatStore, MessageEvent, MessageRole, SessionSummary,
    StreamEvent,
};
use rustyline::completion::Completer;
use rustyline::error::ReadlineError;
use rustyline::highlight::Highlighter;
use rustyline::hint::Hinter;
use rustyline::history::DefaultHistory;
use rustyline::validate::Validator;
use rustyline::{Context, Editor, Helper};
use tokio::sync::{broadcast, oneshot};
use tokio::sync::broadcast::error::{RecvError, TryRecvError};
use tracing::{debug, warn};

use super::sessions::{render_session_list, render_transcript};
use super::Command;
use crate::context::AppContext;
use crate::error::{CliError, CliResult};
use crate::output::OutputStyle;

const SLASH_COMMANDS: &[&str] = &[
    "/new",
    "/sessions",
    "/switch",
    "/rename",
    "/delete",
    "/collection",
    "/history",
    "/help",
    "/exit",
];

/// Interactive chat mode
pub struct ChatCommand {
    ctx: AppContext,
    message: Option<String>,
    session: Option<String>,
    collection: Option<String>,
    mode: Option<String>,
    react: bool,
}

impl ChatCommand {
    pub fn new(ctx: AppContext, message: Option<String>) -> Self {
        Self {
            ctx,
            message,
            session: None,
            collection: None,
            mode: None,
            react: false,
        }
    }

    /// Resume an existing session instead of starting a new one
    pub fn with_session(mut self, session: Option<String>) -> Self {
        self.session = session;
        self
    }

    pub fn with_collection(mut self, collection: Option<String>) -> Self {
        self.collection = collection;
        self
    }

    pub fn with_mode(mut self, mode: Option<String>) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_react(mut self, react: bool) -> Self {
        self.react = react;
        self
    }

    fn options(&self) -> ChatOptions {
        let mut options = self.ctx.chat_options();
        if let Some(mode) = &self.mode {
            options.mode = mode.clone();
        }
        options.use_react |= self.react;
        options.collection_id = self.collection.clone();
        options
    }

    async fn one_shot(&self, controller: &ChatController, text: &str) -> CliResult<()> {
        let mut out = std::io::stdout();
        let outcome = stream_reply(controller, text, &self.ctx.style, &mut out, ctrl_c()).await;
        flush_session(controller.store()).await;
        match outcome? {
            TurnOutcome::Failed(error) => Err(CliError::Session(error)),
            _ => Ok(()),
        }
    }

    async fn interactive(&self, controller: &ChatController) -> CliResult<()> {
        let style = &self.ctx.style;
        let store = controller.store();
        let storage = &self.ctx.storage;

        let mut history = InputHistory::load(storage, self.ctx.config.chat.history_max);
        let reader = LineReader::spawn(
            style.use_colors,
            history.entries().map(str::to_string).collect(),
        )?;

        println!("{}", style.header("ragdesk chat"));
        match self.ctx.auth.current() {
            Some(session) => println!("{}", style.dimmed(&format!("Signed in as {}", session.user.email))),
            None => println!("{}", style.dimmed("Guest mode: sessions stay on this machine")),
        }
        println!("{}", style.tip("Type /help for commands, Tab to complete, Ctrl-D to quit"));

        let prompt = "you> ";
        let mut out = std::io::stdout();
        loop {
            let line = match reader.read(prompt).await {
                Ok(line) => line,
                Err(ReadlineError::Interrupted) => continue,
                Err(ReadlineError::Eof) => break,
                Err(e) => return Err(e.into()),
            };
            let text = line.trim();
            if text.is_empty() {
                continue;
            }

            if let Some(slash) = SlashCommand::parse(text) {
                if slash == SlashCommand::Exit {
                    break;
                }
                if let Err(e) = self.run_slash(controller, &history, slash).await {
                    eprintln!("{}", style.error(&e.user_message()));
                }
                continue;
            }

            if history.add_to_history(text) {
                reader.remember(text);
                if let Err(e) = history.save(storage) {
                    warn!("Failed to save input history: {}", e);
                }
            }

            match stream_reply(controller, text, style, &mut out, ctrl_c()).await {
                Ok(_) => {}
                Err(e) => eprintln!("{}", style.error(&e.user_message())),
            }
        }

        flush_session(store).await;
        Ok(())
    }

    async fn run_slash(
        &self,
        controller: &ChatController,
        history: &InputHistory,
        slash: SlashCommand,
    ) -> CliResult<()> {
        let style = &self.ctx.style;
        let store = controller.store();
        let mut events = store.bus().subscribe();

        match slash {
            SlashCommand::New => {
                let id = store.create_new_session().await;
                println!("{}", style.success(&format!("Started new session {}", id)));
            }
            SlashCommand::Sessions => {
                let sessions = store.load_sessions().await?;
                let current = store.current_session_id();
                for line in render_session_list(style, &sessions, Some(current.as_str())) {
                    println!("{}", line);
                }
            }
            SlashCommand::Switch(target) => {
                let id = resolve_session(&store.sessions(), &target)
                    .ok_or_else(|| CliError::invalid(format!("no session matches '{}'", target)))?;
                store.set_current_session(&id).await?;
                println!("{}", style.success(&format!("Switched to {}", id)));
                for line in render_transcript(style, &store.messages()) {
                    println!("{}", line);
                }
            }
            SlashCommand::Rename(title) => {
                if !store.is_materialized() {
                    return Err(CliError::invalid("send a message before renaming this session"));
                }
                let id = store.current_session_id();
                store.update_session_title(&id, &title).await?;
                println!("{}", style.success(&format!("Renamed to '{}'", title.trim())));
            }
            SlashCommand::Delete(target) => {
                let id = match target {
                    Some(target) => resolve_session(&store.sessions(), &target).ok_or_else(|| {
                        CliError::invalid(format!("no session matches '{}'", target))
                    })?,
                    None => store.current_session_id(),
                };
                store.delete_session(&id).await?;
                println!("{}", style.success(&format!("Deleted session {}", id)));
            }
            SlashCommand::Collection(collection) => {
                let label = collection.clone().unwrap_or_else(|| "all documents".to_string());
                controller.set_collection(collection);
                println!("{}", style.success(&format!("Answering from {}", label)));
            }
            SlashCommand::History => {
                if history.is_empty() {
                    println!("{}", style.info("No input history"));
                }
                for (i, entry) in history.entries().enumerate() {
                    println!("  {:>2}. {}", i + 1, entry);
                }
            }
            SlashCommand::Help => {
                for line in help_lines(style) {
                    println!("{}", line);
                }
            }
            SlashCommand::Unknown(name) => {
                return Err(CliError::invalid(format!("unknown command {} (try /help)", name)));
            }
            SlashCommand::Exit => {}
        }
        drain_notifications(&mut events, style);
        Ok(())
    }
}

#[async_trait::async_trait]
impl Command for ChatCommand {
    async fn execute(&self) -> CliResult<()> {
        let store = self.ctx.chat_store();
        if let Err(e) = store.load_sessions().await {
            warn!("Could not load sessions: {}", e);
        }
        if let Some(id) = &self.session {
            let id = resolve_session(&store.sessions(), id).unwrap_or_else(|| id.clone());
            store.set_current_session(&id).await?;
        }

        let transport: Arc<dyn ChatTransport> = self.ctx.client.clone();
        let controller = ChatController::new(store, transport, self.options());

        match &self.message {
            Some(text) => self.one_shot(&controller, text).await,
            None => self.interactive(&controller).await,
        }
    }
}

fn ctrl_c() -> impl Future<Output = ()> + Send {
    async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Cannot listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    }
}

async fn flush_session(store: &ChatStore) {
    if let Err(e) = store.save_current_session_messages().await {
        warn!("Failed to save session: {}", e);
    }
}

/// Print notifications already queued on `events`
fn drain_notifications(events: &mut broadcast::Receiver<BusEvent>, style: &OutputStyle) {
    loop {
        match events.try_recv() {
            Ok(BusEvent::Notification(notification)) => {
                eprintln!("{}", style.notification(&notification));
            }
            Ok(_) | Err(TryRecvError::Lagged(_)) => {}
            Err(_) => break,
        }
    }
}

/// How a streamed reply ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TurnOutcome {
    Completed,
    Cancelled,
    Failed(String),
}

/// Send `text` and print the reply as it streams in
///
/// Resolving `interrupt` stops the stream. Returns once the store reports
/// the end of the stream.
pub async fn stream_reply<W, F>(
    controller: &ChatController,
    text: &str,
    style: &OutputStyle,
    out: &mut W,
    interrupt: F,
) -> CliResult<TurnOutcome>
where
    W: Write + Send,
    F: Future<Output = ()> + Send,
{
    let store = controller.store().clone();
    let mut events = store.bus().subscribe();
    controller.send_message(text)?;
    let session_id = store.current_session_id();

    write!(out, "{} ", style.speaker("assistant"))?;
    out.flush()?;

    tokio::pin!(interrupt);
    let mut interrupted = false;
    let mut printed = 0usize;
    let mut notices: Vec<Notification> = Vec::new();

    let outcome = loop {
        tokio::select! {
            _ = &mut interrupt, if !interrupted => {
                interrupted = true;
                debug!("Stopping reply on user request");
                controller.stop();
            }
            event = events.recv() => match event {
                Ok(BusEvent::Message(MessageEvent::Updated { session_id: s, index })) if s == session_id => {
                    let content = store
                        .messages()
                        .get(index)
                        .map(|m| m.content.clone())
                        .unwrap_or_default();
                    if let Some(delta) = content.get(printed..).filter(|d| !d.is_empty()) {
                        write!(out, "{}", delta)?;
                        out.flush()?;
                        printed = content.len();
                    }
                }
                Ok(BusEvent::Notification(notification)) => notices.push(notification),
                Ok(BusEvent::Stream(StreamEvent::Completed { session_id: s })) if s == session_id => {
                    break TurnOutcome::Completed;
                }
                Ok(BusEvent::Stream(StreamEvent::Cancelled { session_id: s })) if s == session_id => {
                    break TurnOutcome::Cancelled;
                }
                Ok(BusEvent::Stream(StreamEvent::Failed { session_id: s, error })) if s == session_id => {
                    break TurnOutcome::Failed(error);
                }
                Ok(_) => {}
                Err(RecvError::Lagged(skipped)) => {
                    debug!("Reply printer skipped {} events", skipped);
                    if !store.is_streaming() {
                        break TurnOutcome::Completed;
                    }
                }
                Err(RecvError::Closed) => break TurnOutcome::Cancelled,
            }
        }
    };

    writeln!(out)?;
    match &outcome {
        TurnOutcome::Completed => {
            let last = store.messages().pop().filter(|m| m.role == MessageRole::Assistant);
            match last {
                Some(message) => {
                    if let Some(tools) = message.tools_used.filter(|t| !t.is_empty()) {
                        writeln!(out, "{}", style.dimmed(&format!("tools: {}", tools.join(", "))))?;
                    }
                }
                None => writeln!(out, "{}", style.dimmed("(no response)"))?,
            }
        }
        TurnOutcome::Cancelled => writeln!(out, "{}", style.warning("Stopped"))?,
        TurnOutcome::Failed(error) => {
            if notices.is_empty() {
                writeln!(out, "{}", style.error(error))?;
            }
        }
    }
    for notice in &notices {
        writeln!(out, "{}", style.notification(notice))?;
    }
    out.flush()?;
    Ok(outcome)
}

/// Commands typed at the chat prompt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SlashCommand {
    New,
    Sessions,
    Switch(String),
    Rename(String),
    /// Delete the named session, or the current one
    Delete(Option<String>),
    /// Restrict answers to a collection; `None` searches everything
    Collection(Option<String>),
    History,
    Help,
    Exit,
    Unknown(String),
}

impl SlashCommand {
    /// `None` when `line` is an ordinary message
    pub fn parse(line: &str) -> Option<Self> {
        let line = line.trim();
        if !line.starts_with('/') {
            return None;
        }
        let (name, arg) = match line.split_once(char::is_whitespace) {
            Some((name, arg)) => (name, Some(arg.trim()).filter(|a| !a.is_empty())),
            None => (line, None),
        };
        let arg = arg.map(str::to_string);

        Some(match (name, arg) {
            ("/new", _) => SlashCommand::New,
            ("/sessions", _) => SlashCommand::Sessions,
            ("/switch", Some(target)) => SlashCommand::Switch(target),
            ("/rename", Some(title)) => SlashCommand::Rename(title),
            ("/delete", target) => SlashCommand::Delete(target),
            ("/collection", Some(id)) if id == "off" || id == "all" => SlashCommand::Collection(None),
            ("/collection", id) => SlashCommand::Collection(id),
            ("/history", _) => SlashCommand::History,
            ("/help", _) | ("/?", _) => SlashCommand::Help,
            ("/exit", _) | ("/quit", _) => SlashCommand::Exit,
            (other, _) => SlashCommand::Unknown(other.to_string()),
        })
    }
}

/// Resolve a 1-based list position, an exact id or a unique id prefix
pub fn resolve_session(sessions: &[SessionSummary], target: &str) -> Option<String> {
    let target = target.trim();
    if let Ok(position) = target.parse::<usize>() {
        if position >= 1 && position <= sessions.len() {
            return Some(sessions[position - 1].session_id.clone());
        }
    }
    if let Some(exact) = sessions.iter().find(|s| s.session_id == target) {
        return Some(exact.session_id.clone());
    }
    let mut matches = sessions.iter().filter(|s| s.session_id.starts_with(target));
    match (matches.next(), matches.next()) {
        (Some(only), None) if !target.is_empty() => Some(only.session_id.clone()),
        _ => None,
    }
}

fn help_lines(style: &OutputStyle) -> Vec<String> {
    vec![
        style.section("Commands"),
        style.key_value("/new", "start a new session"),
        style.key_value("/sessions", "list sessions"),
        style.key_value("/switch <n|id>", "switch to a session"),
        style.key_value("/rename <title>", "rename the current session"),
        style.key_value("/delete [n|id]", "delete a session (default: current)"),
        style.key_value("/collection [id|off]", "answer from one collection"),
        style.key_value("/history", "show recent inputs"),
        style.key_value("/exit", "leave chat"),
        style.tip("Ctrl-C stops a streaming reply"),
    ]
}

enum EditorRequest {
    Read {
        prompt: String,
        reply: oneshot::Sender<Result<String, ReadlineError>>,
    },
    Remember(String),
}

/// Line editor running on its own thread
///
/// The thread exits once the reader is dropped.
struct LineReader {
    requests: std_mpsc::Sender<EditorRequest>,
}

impl LineReader {
    /// Start the editor with `history` (most recent first) preloaded
    fn spawn(use_colors: bool, history: Vec<String>) -> CliResult<Self> {
        let (requests, incoming) = std_mpsc::channel();
        let (ready_tx, ready_rx) = std_mpsc::channel();

        std::thread::spawn(move || {
            let mut editor: Editor<PromptHelper, DefaultHistory> = match Editor::new() {
                Ok(editor) => editor,
                Err(e) => {
                    let _ = ready_tx.send(Err(e));
                    return;
                }
            };
            editor.set_helper(Some(PromptHelper::new(use_colors)));
            for entry in history.iter().rev() {
                let _ = editor.add_history_entry(entry.as_str());
            }
            let _ = ready_tx.send(Ok(()));

            while let Ok(request) = incoming.recv() {
                match request {
                    EditorRequest::Read { prompt, reply } => {
                        let _ = reply.send(editor.readline(&prompt));
                    }
                    EditorRequest::Remember(line) => {
                        let _ = editor.add_history_entry(line);
                    }
                }
            }
        });

        match ready_rx.recv() {
            Ok(Ok(())) => Ok(Self { requests }),
            Ok(Err(e)) => Err(e.into()),
            Err(_) => Err(CliError::Internal("line editor thread exited".to_string())),
        }
    }

    async fn read(&self, prompt: &str) -> Result<String, ReadlineError> {
        let (reply, response) = oneshot::channel();
        let request = EditorRequest::Read {
            prompt: prompt.to_string(),
            reply,
        };
        if self.requests.send(request).is_err() {
            return Err(ReadlineError::Eof);
        }
        response.await.unwrap_or(Err(ReadlineError::Eof))
    }

    fn remember(&self, line: &str) {
        let _ = self.requests.send(EditorRequest::Remember(line.to_string()));
    }
}

/// Line editor helper backed by the suggestion engine
struct PromptHelper {
    engine: SuggestionEngine,
    use_colors: bool,
}

impl PromptHelper {
    fn new(use_colors: bool) -> Self {
        Self {
            engine: SuggestionEngine::default(),
            use_colors,
        }
    }

    fn candidates(&self, line: &str) -> Vec<String> {
        if line.starts_with('/') {
            return SLASH_COMMANDS
                .iter()
                .filter(|c| c.starts_with(line) && **c != line)
                .map(|c| c.to_string())
                .collect();
        }
        self.engine.suggest(line)
    }
}

/// Text to append to `line` to reach `candidate`
fn completion_suffix(line: &str, candidate: &str) -> Option<String> {
    if line.is_empty() || !candidate.to_lowercase().starts_with(&line.to_lowercase()) {
        return None;
    }
    let suffix: String = candidate.chars().skip(line.chars().count()).collect();
    Some(suffix).filter(|s| !s.is_empty())
}

impl Completer for PromptHelper {
    type Candidate = String;

    fn complete(
        &self,
        line: &str,
        pos: usize,
        _ctx: &Context<'_>,
    ) -> rustyline::Result<(usize, Vec<String>)> {
        if pos < line.len() {
            return Ok((pos, Vec::new()));
        }
        Ok((0, self.candidates(line)))
    }
}

impl Hinter for PromptHelper {
    type Hint = String;

    fn hint(&self, line: &str, pos: usize, _ctx: &Context<'_>) -> Option<String> {
        if pos < line.len() {
            return None;
        }
        self.candidates(line)
            .first()
            .and_then(|candidate| completion_suffix(line, candidate))
    }
}

impl Highlighter for PromptHelper {
    fn highlight_prompt<'b, 's: 'b, 'p: 'b>(&'s self, prompt: &'p str, _default: bool) -> Cow<'b, str> {
        if self.use_colors {
            Cow::Owned(prompt.magenta().bold().to_string())
        } else {
            Cow::Borrowed(prompt)
        }
    }

    fn highlight_hint<'h>(&self, hint: &'h str) -> Cow<'h, str> {
        if self.use_colors {
            Cow::Owned(hint.dimmed().to_string())
        } else {
            Cow::Borrowed(hint)
        }
    }
}

impl Validator for PromptHelper {}

impl Helper for PromptHelper {}
