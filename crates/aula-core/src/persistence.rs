use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::path::PathBuf;

use crate::ledger::ConversationThread;

pub const KEY_USER_EMAIL: &str = "chat_user_email";
pub const KEY_SELECTED_SUBJECT: &str = "chat_selected_subject";
pub const KEY_THREADS: &str = "chat_threads";
pub const KEY_SESSION_TOKEN: &str = "session_token";
pub const KEY_TOKEN_SUBJECT: &str = "lti_subject";

/// Persistence failures never reach the user as a crash; callers log them and
/// fall back to defaults.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("store io: {0}")]
    Io(#[from] std::io::Error),
    #[error("store encoding: {0}")]
    Encoding(#[from] serde_json::Error),
}

/// String-keyed durable store. Writes are full-value replacements; there are
/// no partial patches, so interrupted writers cannot interleave.
pub trait KeyValueStore {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError>;
    fn put(&mut self, key: &str, value: &str) -> Result<(), StorageError>;
    fn remove(&mut self, key: &str) -> Result<(), StorageError>;
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: BTreeMap<String, String>,
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        Ok(self.entries.get(key).cloned())
    }

    fn put(&mut self, key: &str, value: &str) -> Result<(), StorageError> {
        self.entries.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&mut self, key: &str) -> Result<(), StorageError> {
        self.entries.remove(key);
        Ok(())
    }
}

/// Single-file JSON map. A missing or corrupt file opens as an empty store;
/// every mutation rewrites the whole file.
#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,
    entries: BTreeMap<String, String>,
}

impl FileStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StorageError> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let entries = if path.exists() {
            let raw = fs::read_to_string(&path)?;
            serde_json::from_str(&raw).unwrap_or_default()
        } else {
            BTreeMap::new()
        };
        Ok(Self { path, entries })
    }

    fn flush(&self) -> Result<(), StorageError> {
        let encoded = serde_json::to_vec_pretty(&self.entries)?;
        fs::write(&self.path, encoded)?;
        Ok(())
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        Ok(self.entries.get(key).cloned())
    }

    fn put(&mut self, key: &str, value: &str) -> Result<(), StorageError> {
        self.entries.insert(key.to_string(), value.to_string());
        self.flush()
    }

    fn remove(&mut self, key: &str) -> Result<(), StorageError> {
        if self.entries.remove(key).is_some() {
            self.flush()?;
        }
        Ok(())
    }
}

/// Everything the client persists, assembled tolerantly at hydration.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PersistedSession {
    pub email: Option<String>,
    pub selected_subject: Option<String>,
    pub threads: Vec<ConversationThread>,
    pub session_token: Option<String>,
    pub token_subject: Option<String>,
}

/// Typed accessors over the raw key-value store.
#[derive(Debug)]
pub struct SessionStore<S: KeyValueStore> {
    inner: S,
}

impl<S: KeyValueStore> SessionStore<S> {
    pub fn new(inner: S) -> Self {
        Self { inner }
    }

    pub fn email(&self) -> Result<Option<String>, StorageError> {
        self.inner.get(KEY_USER_EMAIL)
    }

    pub fn set_email(&mut self, email: &str) -> Result<(), StorageError> {
        self.inner.put(KEY_USER_EMAIL, email)
    }

    pub fn selected_subject(&self) -> Result<Option<String>, StorageError> {
        self.inner.get(KEY_SELECTED_SUBJECT)
    }

    pub fn set_selected_subject(&mut self, subject: &str) -> Result<(), StorageError> {
        self.inner.put(KEY_SELECTED_SUBJECT, subject)
    }

    pub fn threads(&self) -> Result<Vec<ConversationThread>, StorageError> {
        match self.inner.get(KEY_THREADS)? {
            Some(raw) => Ok(serde_json::from_str(&raw)?),
            None => Ok(Vec::new()),
        }
    }

    pub fn set_threads(&mut self, threads: &[ConversationThread]) -> Result<(), StorageError> {
        let encoded = serde_json::to_string(threads)?;
        self.inner.put(KEY_THREADS, &encoded)
    }

    pub fn session_token(&self) -> Result<Option<String>, StorageError> {
        self.inner.get(KEY_SESSION_TOKEN)
    }

    pub fn token_subject(&self) -> Result<Option<String>, StorageError> {
        self.inner.get(KEY_TOKEN_SUBJECT)
    }

    pub fn set_embedded_session(
        &mut self,
        token: &str,
        subject: Option<&str>,
    ) -> Result<(), StorageError> {
        self.inner.put(KEY_SESSION_TOKEN, token)?;
        match subject {
            Some(subject) => self.inner.put(KEY_TOKEN_SUBJECT, subject),
            None => self.inner.remove(KEY_TOKEN_SUBJECT),
        }
    }

    /// Purges the token and its asserted subject after a rejected validation.
    pub fn clear_embedded_session(&mut self) -> Result<(), StorageError> {
        self.inner.remove(KEY_SESSION_TOKEN)?;
        self.inner.remove(KEY_TOKEN_SUBJECT)
    }

    /// Reads every key, collecting failures instead of propagating them: a
    /// corrupt value hydrates as its default and is reported for logging.
    pub fn load_session(&self) -> (PersistedSession, Vec<StorageError>) {
        let mut errors = Vec::new();
        let mut or_default = |result: Result<Option<String>, StorageError>| match result {
            Ok(value) => value,
            Err(error) => {
                errors.push(error);
                None
            }
        };

        let email = or_default(self.email());
        let selected_subject = or_default(self.selected_subject());
        let session_token = or_default(self.session_token());
        let token_subject = or_default(self.token_subject());
        let threads = match self.threads() {
            Ok(threads) => threads,
            Err(error) => {
                errors.push(error);
                Vec::new()
            }
        };

        (
            PersistedSession {
                email,
                selected_subject,
                threads,
                session_token,
                token_subject,
            },
            errors,
        )
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;
    use chrono::Utc;
    use pretty_assertions::assert_eq;
    use tempfile::tempdir;

    use crate::ledger::append;
    use crate::ledger::ConversationLedger;
    use crate::ledger::Message;

    use super::FileStore;
    use super::KeyValueStore;
    use super::MemoryStore;
    use super::PersistedSession;
    use super::SessionStore;
    use super::KEY_SESSION_TOKEN;
    use super::KEY_TOKEN_SUBJECT;

    #[test]
    fn thread_collection_round_trips_with_millisecond_timestamps() {
        let dir = tempdir().expect("tmpdir");
        let path = dir.path().join("session.json");

        let sent_at = Utc
            .timestamp_millis_opt(1_717_000_123_456)
            .single()
            .expect("timestamp");
        let mut ledger = ConversationLedger::default();
        let thread = ledger.find_or_create("calculo", "ana@correo.ugr.es", sent_at);
        let thread = append(&thread, Message::user("hola", "calculo", sent_at));
        ledger.replace(thread);

        let mut store = SessionStore::new(FileStore::open(&path).expect("open"));
        store.set_threads(ledger.threads()).expect("write");

        let reopened = SessionStore::new(FileStore::open(&path).expect("reopen"));
        let loaded = reopened.threads().expect("read");

        assert_eq!(loaded, ledger.threads().to_vec());
        assert_eq!(loaded[0].messages[0].timestamp.timestamp_millis(), 1_717_000_123_456);
    }

    #[test]
    fn corrupt_store_file_opens_empty() {
        let dir = tempdir().expect("tmpdir");
        let path = dir.path().join("session.json");
        std::fs::write(&path, "{not json").expect("write garbage");

        let store = SessionStore::new(FileStore::open(&path).expect("open"));
        let (session, errors) = store.load_session();

        assert_eq!(session, PersistedSession::default());
        assert!(errors.is_empty());
    }

    #[test]
    fn corrupt_thread_value_degrades_to_empty_and_reports() {
        let mut inner = MemoryStore::default();
        inner.put(super::KEY_THREADS, "[{broken").expect("put");
        inner.put(super::KEY_USER_EMAIL, "ana@correo.ugr.es").expect("put");

        let store = SessionStore::new(inner);
        let (session, errors) = store.load_session();

        assert_eq!(session.email.as_deref(), Some("ana@correo.ugr.es"));
        assert!(session.threads.is_empty());
        assert_eq!(errors.len(), 1);
    }

    #[test]
    fn clear_embedded_session_removes_both_keys() {
        let mut store = SessionStore::new(MemoryStore::default());
        store
            .set_embedded_session("tok-123", Some("calculo"))
            .expect("set");
        assert_eq!(
            store.session_token().expect("token").as_deref(),
            Some("tok-123")
        );
        assert_eq!(
            store.token_subject().expect("subject").as_deref(),
            Some("calculo")
        );

        store.clear_embedded_session().expect("clear");

        assert_eq!(store.inner.get(KEY_SESSION_TOKEN).expect("get"), None);
        assert_eq!(store.inner.get(KEY_TOKEN_SUBJECT).expect("get"), None);
    }

    #[test]
    fn embedded_session_without_subject_drops_stale_subject_key() {
        let mut store = SessionStore::new(MemoryStore::default());
        store
            .set_embedded_session("tok-1", Some("calculo"))
            .expect("set");
        store.set_embedded_session("tok-2", None).expect("replace");

        assert_eq!(
            store.session_token().expect("token").as_deref(),
            Some("tok-2")
        );
        assert_eq!(store.token_subject().expect("subject"), None);
    }

    #[test]
    fn writes_are_full_value_replacements() {
        let dir = tempdir().expect("tmpdir");
        let path = dir.path().join("session.json");

        let mut store = SessionStore::new(FileStore::open(&path).expect("open"));
        store.set_email("vieja@correo.ugr.es").expect("write");
        store.set_email("nueva@correo.ugr.es").expect("write");

        let raw = std::fs::read_to_string(&path).expect("read");
        assert!(raw.contains("nueva@correo.ugr.es"));
        assert!(!raw.contains("vieja@correo.ugr.es"));
    }
}
