use std::collections::VecDeque;

use crate::catalog::SubjectCatalog;
use crate::gateway::FaultKind;
use crate::gateway::RateLimitSnapshot;
use crate::identity::is_valid_email;
use crate::identity::Identity;
use crate::identity::SessionMode;
use crate::identity::TokenContext;
use crate::ledger::ConversationLedger;
use crate::ledger::ConversationThread;

/// Identity resolution status. `Resolving` covers the token validation
/// round-trip. `Rejected` is terminal for the session: no standalone
/// fallback once an embedded token was explicitly supplied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdentityPhase {
    Resolving,
    Standalone,
    Embedded,
    Rejected,
}

impl IdentityPhase {
    pub fn label(self) -> &'static str {
        match self {
            Self::Resolving => "resolving",
            Self::Standalone => "standalone",
            Self::Embedded => "embedded",
            Self::Rejected => "rejected",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdentityState {
    pub phase: IdentityPhase,
    pub email: String,
    pub display_name: Option<String>,
    pub role: Option<String>,
    pub token: Option<TokenContext>,
    /// Message shown full-screen when the embedded launch was rejected.
    pub rejection: Option<String>,
}

impl Default for IdentityState {
    fn default() -> Self {
        Self {
            phase: IdentityPhase::Standalone,
            email: String::new(),
            display_name: None,
            role: None,
            token: None,
            rejection: None,
        }
    }
}

impl IdentityState {
    /// The settled identity, if resolution has settled.
    pub fn current(&self) -> Option<Identity> {
        let mode = match self.phase {
            IdentityPhase::Standalone => SessionMode::Standalone,
            IdentityPhase::Embedded => SessionMode::Embedded,
            IdentityPhase::Resolving | IdentityPhase::Rejected => return None,
        };
        Some(Identity {
            mode,
            email: self.email.clone(),
            display_name: self.display_name.clone(),
            role: self.role.clone(),
        })
    }

    pub fn has_valid_email(&self) -> bool {
        is_valid_email(&self.email)
    }
}

/// Subscribed subjects plus the local selection the reducer keeps consistent
/// with the server-returned set.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DirectoryState {
    pub subjects: Vec<String>,
    pub selected: String,
    pub syncing: bool,
}

impl DirectoryState {
    pub fn has_selection(&self) -> bool {
        !self.selected.is_empty()
    }
}

/// Chat turn lifecycle. A completed turn returns to `Idle`; `Failed` keeps
/// the thread intact and waits for a fresh manual submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TurnPhase {
    #[default]
    Idle,
    Sending,
    Failed,
}

impl TurnPhase {
    pub fn label(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Sending => "sending",
            Self::Failed => "failed",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TurnState {
    pub phase: TurnPhase,
    pub rate_limit: Option<RateLimitSnapshot>,
}

/// An inline, recoverable fault rendered next to the input area.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FaultMessage {
    pub kind: FaultKind,
    pub message: String,
}

impl FaultMessage {
    pub fn new(kind: FaultKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

/// Mode forwarded with every chat request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ChatMode {
    #[default]
    Rag,
    Base,
    RagLora,
}

impl ChatMode {
    pub fn label(self) -> &'static str {
        match self {
            Self::Rag => "rag",
            Self::Base => "base",
            Self::RagLora => "rag_lora",
        }
    }

    pub fn parse(input: &str) -> Option<Self> {
        match input.trim().to_ascii_lowercase().as_str() {
            "rag" => Some(Self::Rag),
            "base" => Some(Self::Base),
            "rag_lora" | "rag-lora" => Some(Self::RagLora),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
}

impl LogLevel {
    pub fn label(self) -> &'static str {
        match self {
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogSource {
    Session,
    Transport,
    Store,
}

impl LogSource {
    pub fn label(self) -> &'static str {
        match self {
            Self::Session => "session",
            Self::Transport => "transport",
            Self::Store => "store",
        }
    }
}

#[derive(Debug, Clone)]
pub struct LogEntry {
    pub seq: u64,
    pub level: LogLevel,
    pub source: LogSource,
    pub context: Option<String>,
    pub message: String,
}

/// Bounded in-state log the host can render without a logging runtime.
#[derive(Debug, Clone)]
pub struct LogBuffer {
    cap: usize,
    next_seq: u64,
    buf: VecDeque<LogEntry>,
}

impl LogBuffer {
    pub fn new(cap: usize) -> Self {
        Self {
            cap,
            next_seq: 1,
            buf: VecDeque::with_capacity(cap),
        }
    }

    pub fn append(&mut self, mut entry: LogEntry) {
        entry.seq = self.next_seq;
        self.next_seq += 1;

        if self.buf.len() == self.cap {
            self.buf.pop_front();
        }
        self.buf.push_back(entry);
    }

    pub fn iter(&self) -> impl Iterator<Item = &LogEntry> {
        self.buf.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }
}

/// Whole-client state. One instance per application run; the reducer is the
/// only writer.
#[derive(Debug, Clone)]
pub struct SessionState {
    pub identity: IdentityState,
    pub directory: DirectoryState,
    pub ledger: ConversationLedger,
    pub turn: TurnState,
    pub error: Option<FaultMessage>,
    pub chat_mode: ChatMode,
    pub catalog: SubjectCatalog,
    pub logs: LogBuffer,
    pub hydrated: bool,
}

impl SessionState {
    pub fn new(catalog: SubjectCatalog) -> Self {
        Self {
            identity: IdentityState::default(),
            directory: DirectoryState::default(),
            ledger: ConversationLedger::default(),
            turn: TurnState::default(),
            error: None,
            chat_mode: ChatMode::default(),
            catalog,
            logs: LogBuffer::new(500),
            hydrated: false,
        }
    }

    /// Thread for the current (selected subject, email) pair, if both exist.
    pub fn current_thread(&self) -> Option<&ConversationThread> {
        if !self.directory.has_selection() {
            return None;
        }
        self.ledger
            .get(&self.directory.selected, &self.identity.email)
    }

    /// Whether the host should accept a submission right now. Mirrors the
    /// turn guards: one turn at a time, resolved thread, format-valid email.
    pub fn can_submit(&self) -> bool {
        self.turn.phase != TurnPhase::Sending
            && self.identity.phase != IdentityPhase::Rejected
            && self.identity.phase != IdentityPhase::Resolving
            && self.directory.has_selection()
            && self.identity.has_valid_email()
    }
}
