use chrono::DateTime;
use chrono::Utc;
use serde::Deserialize;
use serde::Serialize;
use uuid::Uuid;

/// Threads idle longer than this are dropped at hydration.
pub const THREAD_MAX_AGE_MS: i64 = 24 * 60 * 60 * 1000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    pub fn label(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
        }
    }
}

/// Immutable once created; appended to a thread, never edited or removed
/// individually.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    pub role: Role,
    pub content: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subject: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sources: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_used: Option<String>,
}

impl Message {
    pub fn user(content: impl Into<String>, subject: &str, timestamp: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            role: Role::User,
            content: content.into(),
            timestamp,
            subject: Some(subject.to_string()),
            sources: Vec::new(),
            model_used: None,
        }
    }

    pub fn assistant(
        content: impl Into<String>,
        subject: &str,
        sources: Vec<String>,
        model_used: Option<String>,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            role: Role::Assistant,
            content: content.into(),
            timestamp,
            subject: Some(subject.to_string()),
            sources,
            model_used,
        }
    }
}

/// Full message history for one (subject, email) pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationThread {
    pub id: String,
    pub subject: String,
    pub email: String,
    pub messages: Vec<Message>,
    pub last_activity: DateTime<Utc>,
}

impl ConversationThread {
    fn new(subject: &str, email: &str, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            subject: subject.to_string(),
            email: email.to_string(),
            messages: Vec::new(),
            last_activity: now,
        }
    }
}

/// Returns a new thread value with the message appended; the input thread is
/// untouched, so a half-applied turn is never observable.
pub fn append(thread: &ConversationThread, message: Message) -> ConversationThread {
    let mut messages = thread.messages.clone();
    let last_activity = message.timestamp;
    messages.push(message);
    ConversationThread {
        id: thread.id.clone(),
        subject: thread.subject.clone(),
        email: thread.email.clone(),
        messages,
        last_activity,
    }
}

/// Owns the thread collection. At most one thread per (subject, email) pair,
/// enforced by `find_or_create`.
#[derive(Debug, Clone, Default)]
pub struct ConversationLedger {
    threads: Vec<ConversationThread>,
}

impl ConversationLedger {
    pub fn new(threads: Vec<ConversationThread>) -> Self {
        Self { threads }
    }

    pub fn threads(&self) -> &[ConversationThread] {
        &self.threads
    }

    pub fn get(&self, subject: &str, email: &str) -> Option<&ConversationThread> {
        self.threads
            .iter()
            .find(|thread| thread.subject == subject && thread.email == email)
    }

    pub fn get_by_id(&self, id: &str) -> Option<&ConversationThread> {
        self.threads.iter().find(|thread| thread.id == id)
    }

    /// Deterministic per (subject, email): an existing thread comes back with
    /// its activity bumped, otherwise a fresh thread is created and stored.
    pub fn find_or_create(
        &mut self,
        subject: &str,
        email: &str,
        now: DateTime<Utc>,
    ) -> ConversationThread {
        if let Some(thread) = self
            .threads
            .iter_mut()
            .find(|thread| thread.subject == subject && thread.email == email)
        {
            thread.last_activity = now;
            return thread.clone();
        }

        let thread = ConversationThread::new(subject, email, now);
        self.threads.push(thread.clone());
        thread
    }

    /// Replaces the stored thread with the same id, or inserts it.
    pub fn replace(&mut self, thread: ConversationThread) {
        match self.threads.iter().position(|stored| stored.id == thread.id) {
            Some(index) => self.threads[index] = thread,
            None => self.threads.push(thread),
        }
    }

    /// Drops threads idle for strictly longer than `max_age_ms`; a thread
    /// exactly at the boundary is retained. Returns how many were removed.
    pub fn prune(&mut self, max_age_ms: i64, now: DateTime<Utc>) -> usize {
        let before = self.threads.len();
        self.threads.retain(|thread| {
            now.signed_duration_since(thread.last_activity)
                .num_milliseconds()
                <= max_age_ms
        });
        before - self.threads.len()
    }
}
