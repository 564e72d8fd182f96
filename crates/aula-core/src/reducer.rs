use chrono::Utc;

use crate::actions::AssistantReply;
use crate::actions::DirectoryOp;
use crate::actions::RuntimeAction;
use crate::actions::SessionAction;
use crate::actions::UserAction;
use crate::gateway::rate_limit_notice;
use crate::gateway::ClassifiedError;
use crate::gateway::FaultKind;
use crate::identity::complete_email;
use crate::identity::is_valid_email;
use crate::identity::LaunchParams;
use crate::identity::TokenContext;
use crate::identity::ValidatedUser;
use crate::ledger;
use crate::ledger::ConversationLedger;
use crate::ledger::ConversationThread;
use crate::ledger::Message;
use crate::ledger::THREAD_MAX_AGE_MS;
use crate::persistence::PersistedSession;
use crate::state::ChatMode;
use crate::state::FaultMessage;
use crate::state::IdentityPhase;
use crate::state::LogEntry;
use crate::state::LogLevel;
use crate::state::LogSource;
use crate::state::SessionState;
use crate::state::TurnPhase;

/// Work the host must perform after a reduction. Network effects come back as
/// `RuntimeAction`s; persistence effects carry the full replacement value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    ValidateToken {
        token: String,
    },
    ListSubjects {
        email: String,
    },
    AddSubject {
        email: String,
        subject_id: String,
    },
    RemoveSubject {
        email: String,
        subject_id: String,
    },
    SendChat {
        thread_id: String,
        message: String,
        subject: String,
        mode: ChatMode,
        email: String,
    },
    PersistEmail(String),
    PersistSelectedSubject(String),
    PersistThreads(Vec<ConversationThread>),
    PersistEmbeddedSession {
        token: String,
        subject: Option<String>,
    },
    ClearEmbeddedSession,
    RequestRedraw,
}

pub const MSG_INVALID_EMAIL_CHAT: &str =
    "Por favor, introduce un email válido antes de enviar mensajes.";
pub const MSG_INVALID_EMAIL_SUBJECTS: &str =
    "Por favor, introduce un email válido para añadir asignaturas.";
pub const MSG_ADD_SUBJECT_FAILED: &str =
    "Error al añadir la asignatura. Por favor, inténtalo de nuevo.";
pub const MSG_REMOVE_SUBJECT_FAILED: &str =
    "Error al eliminar la asignatura. Por favor, inténtalo de nuevo.";

pub fn reduce(state: &mut SessionState, action: SessionAction) -> Vec<Effect> {
    match action {
        SessionAction::User(user) => reduce_user(state, user),
        SessionAction::Runtime(runtime) => reduce_runtime(state, runtime),
    }
}

fn reduce_user(state: &mut SessionState, action: UserAction) -> Vec<Effect> {
    if state.identity.phase == IdentityPhase::Rejected {
        // Terminal screen: nothing to interact with.
        return Vec::new();
    }

    match action {
        UserAction::SetEmail(raw) => set_email(state, raw),
        UserAction::SetChatMode(mode) => {
            state.chat_mode = mode;
            vec![Effect::RequestRedraw]
        }
        UserAction::SelectSubject(subject_id) => select_subject(state, subject_id),
        UserAction::AddSubject(subject_id) => {
            directory_mutation(state, DirectoryOp::Add, subject_id)
        }
        UserAction::RemoveSubject(subject_id) => {
            directory_mutation(state, DirectoryOp::Remove, subject_id)
        }
        UserAction::SubmitMessage(content) => submit_message(state, content),
        UserAction::DismissError => {
            state.error = None;
            vec![Effect::RequestRedraw]
        }
    }
}

fn set_email(state: &mut SessionState, raw: String) -> Vec<Effect> {
    if state.identity.phase != IdentityPhase::Standalone {
        // Embedded identity is asserted by the platform and immutable.
        return Vec::new();
    }

    let email = complete_email(&raw);
    state.identity.email = email.clone();

    let mut effects = vec![Effect::PersistEmail(email.clone())];
    if is_valid_email(&email) {
        effects.push(Effect::ListSubjects { email });
        effects.extend(ensure_active_thread(state));
    }
    effects.push(Effect::RequestRedraw);
    effects
}

fn select_subject(state: &mut SessionState, subject_id: String) -> Vec<Effect> {
    state.directory.selected = subject_id.clone();
    state.error = None;
    state.turn.rate_limit = None;

    let mut effects = vec![Effect::PersistSelectedSubject(subject_id)];
    effects.extend(ensure_active_thread(state));
    effects.push(Effect::RequestRedraw);
    effects
}

fn directory_mutation(
    state: &mut SessionState,
    op: DirectoryOp,
    subject_id: String,
) -> Vec<Effect> {
    if state.identity.phase == IdentityPhase::Embedded {
        // The embedded subject set is server-asserted, never edited locally.
        return Vec::new();
    }
    if !state.identity.has_valid_email() {
        state.error = Some(FaultMessage::new(
            FaultKind::InvalidIdentity,
            MSG_INVALID_EMAIL_SUBJECTS,
        ));
        return vec![Effect::RequestRedraw];
    }
    if state.directory.syncing {
        return Vec::new();
    }

    state.directory.syncing = true;
    let email = state.identity.email.clone();
    let effect = match op {
        DirectoryOp::Add => Effect::AddSubject { email, subject_id },
        DirectoryOp::Remove => Effect::RemoveSubject { email, subject_id },
        DirectoryOp::List => Effect::ListSubjects { email },
    };
    vec![effect, Effect::RequestRedraw]
}

fn submit_message(state: &mut SessionState, content: String) -> Vec<Effect> {
    if state.turn.phase == TurnPhase::Sending {
        // One turn in flight at a time; the UI disables the input, this guard
        // backs it up.
        return Vec::new();
    }

    let content = content.trim().to_string();
    if content.is_empty() {
        return Vec::new();
    }

    if !state.directory.has_selection() || !state.identity.has_valid_email() {
        state.error = Some(FaultMessage::new(
            FaultKind::InvalidIdentity,
            MSG_INVALID_EMAIL_CHAT,
        ));
        return vec![Effect::RequestRedraw];
    }

    let now = Utc::now();
    let email = state.identity.email.clone();
    let subject = state.directory.selected.clone();
    let thread = state.ledger.find_or_create(&subject, &email, now);

    state.error = None;
    state.turn.rate_limit = None;
    state.turn.phase = TurnPhase::Sending;

    let updated = ledger::append(&thread, Message::user(content.clone(), &subject, now));
    let thread_id = updated.id.clone();
    state.ledger.replace(updated);
    log(
        state,
        LogLevel::Info,
        LogSource::Session,
        "turn",
        format!("sending message on {subject} (thread {thread_id})"),
    );

    vec![
        Effect::PersistThreads(state.ledger.threads().to_vec()),
        Effect::SendChat {
            thread_id,
            message: content,
            subject,
            mode: state.chat_mode,
            email,
        },
        Effect::RequestRedraw,
    ]
}

fn reduce_runtime(state: &mut SessionState, action: RuntimeAction) -> Vec<Effect> {
    match action {
        RuntimeAction::Hydrate { launch, persisted } => hydrate(state, launch, persisted),
        RuntimeAction::TokenValidated {
            user,
            subject,
            context_label,
        } => token_validated(state, user, subject, context_label),
        RuntimeAction::TokenRejected { message } => token_rejected(state, message),
        RuntimeAction::SubjectsListed { subjects } => subjects_listed(state, subjects),
        RuntimeAction::SubjectAdded {
            subject_id,
            subjects,
        } => subject_added(state, subject_id, subjects),
        RuntimeAction::SubjectRemoved {
            subject_id,
            subjects,
        } => subject_removed(state, subject_id, subjects),
        RuntimeAction::DirectoryFailed { op, message } => directory_failed(state, op, message),
        RuntimeAction::ChatSucceeded { thread_id, reply } => {
            chat_succeeded(state, thread_id, reply)
        }
        RuntimeAction::ChatFailed { thread_id, fault } => chat_failed(state, thread_id, fault),
        RuntimeAction::StorageDegraded { context, message } => {
            log(
                state,
                LogLevel::Warn,
                LogSource::Store,
                &context,
                format!("degraded to defaults: {message}"),
            );
            Vec::new()
        }
    }
}

fn hydrate(state: &mut SessionState, launch: LaunchParams, persisted: PersistedSession) -> Vec<Effect> {
    if state.hydrated {
        return Vec::new();
    }
    let now = Utc::now();
    state.hydrated = true;

    let mut hydrated_ledger = ConversationLedger::new(persisted.threads);
    let pruned = hydrated_ledger.prune(THREAD_MAX_AGE_MS, now);
    state.ledger = hydrated_ledger;

    let mut effects = Vec::new();
    if pruned > 0 {
        log(
            state,
            LogLevel::Info,
            LogSource::Store,
            "hydrate",
            format!("pruned {pruned} stale threads"),
        );
        effects.push(Effect::PersistThreads(state.ledger.threads().to_vec()));
    }

    if let (true, Some(token)) = (launch.lti, launch.session_token.clone()) {
        // Fresh embedded launch: the query token wins over anything stored.
        state.identity.phase = IdentityPhase::Resolving;
        state.identity.token = Some(TokenContext::unvalidated(
            token.clone(),
            launch.subject.clone(),
        ));
        if let Some(subject) = launch.subject.clone() {
            state.directory.selected = subject;
        }
        log(
            state,
            LogLevel::Info,
            LogSource::Session,
            "hydrate",
            "embedded launch detected, validating session token",
        );
        effects.push(Effect::PersistEmbeddedSession {
            token: token.clone(),
            subject: launch.subject,
        });
        effects.push(Effect::ValidateToken { token });
    } else if let Some(token) = persisted.session_token {
        // Returning embedded user: tokens are never assumed durably valid.
        state.identity.phase = IdentityPhase::Resolving;
        state.identity.token = Some(TokenContext::unvalidated(
            token.clone(),
            persisted.token_subject.clone(),
        ));
        if let Some(subject) = persisted.token_subject {
            state.directory.selected = subject;
        }
        log(
            state,
            LogLevel::Info,
            LogSource::Session,
            "hydrate",
            "re-validating stored session token",
        );
        effects.push(Effect::ValidateToken { token });
    } else {
        state.identity.phase = IdentityPhase::Standalone;
        state.identity.email = persisted.email.unwrap_or_default();
        if let Some(subject) = persisted.selected_subject {
            if state.catalog.contains(&subject) {
                state.directory.selected = subject;
            }
        }
        if state.identity.has_valid_email() {
            effects.push(Effect::ListSubjects {
                email: state.identity.email.clone(),
            });
            effects.extend(ensure_active_thread(state));
        }
    }

    effects.push(Effect::RequestRedraw);
    effects
}

fn token_validated(
    state: &mut SessionState,
    user: ValidatedUser,
    subject: Option<String>,
    context_label: Option<String>,
) -> Vec<Effect> {
    if state.identity.phase != IdentityPhase::Resolving {
        return Vec::new();
    }
    let Some(token) = state.identity.token.as_mut() else {
        return Vec::new();
    };

    token.validated = true;
    token.context_label = context_label;
    if subject.is_some() {
        token.subject = subject;
    }
    let asserted_subject = token.subject.clone();

    state.identity.phase = IdentityPhase::Embedded;
    state.identity.email = user.email;
    state.identity.display_name = Some(user.name);
    state.identity.role = user.role;

    // The server-asserted subject seeds the directory for this identity.
    if let Some(subject) = asserted_subject {
        if !state.directory.subjects.contains(&subject) {
            state.directory.subjects.push(subject.clone());
        }
        state.directory.selected = subject;
    }

    let validated_log = format!("embedded session validated for {}", state.identity.email);
    log(state, LogLevel::Info, LogSource::Session, "identity", validated_log);

    let mut effects = vec![Effect::PersistEmail(state.identity.email.clone())];
    if state.directory.has_selection() {
        effects.push(Effect::PersistSelectedSubject(
            state.directory.selected.clone(),
        ));
    }
    effects.extend(ensure_active_thread(state));
    effects.push(Effect::RequestRedraw);
    effects
}

fn token_rejected(state: &mut SessionState, message: String) -> Vec<Effect> {
    if state.identity.phase != IdentityPhase::Resolving {
        return Vec::new();
    }

    // Hard stop: a failed embedded launch must not impersonate a cached
    // standalone identity.
    state.identity.phase = IdentityPhase::Rejected;
    state.identity.token = None;
    state.identity.rejection = Some(message.clone());
    log(
        state,
        LogLevel::Warn,
        LogSource::Session,
        "identity",
        format!("session token rejected: {message}"),
    );

    vec![Effect::ClearEmbeddedSession, Effect::RequestRedraw]
}

fn subjects_listed(state: &mut SessionState, subjects: Vec<String>) -> Vec<Effect> {
    if state.identity.phase != IdentityPhase::Standalone {
        // Embedded subject lists come only from the token assertion.
        return Vec::new();
    }
    state.directory.subjects = subjects;
    vec![Effect::RequestRedraw]
}

fn subject_added(
    state: &mut SessionState,
    subject_id: String,
    subjects: Vec<String>,
) -> Vec<Effect> {
    state.directory.syncing = false;
    state.directory.subjects = subjects;
    log(
        state,
        LogLevel::Info,
        LogSource::Session,
        "directory",
        format!("subscribed to {subject_id}"),
    );

    let mut effects = Vec::new();
    // First-subject bootstrap: a lone subject becomes the selection.
    if state.directory.subjects.len() == 1 {
        state.directory.selected = state.directory.subjects[0].clone();
        effects.push(Effect::PersistSelectedSubject(
            state.directory.selected.clone(),
        ));
        effects.extend(ensure_active_thread(state));
    }
    effects.push(Effect::RequestRedraw);
    effects
}

fn subject_removed(
    state: &mut SessionState,
    subject_id: String,
    subjects: Vec<String>,
) -> Vec<Effect> {
    state.directory.syncing = false;
    state.directory.subjects = subjects;
    log(
        state,
        LogLevel::Info,
        LogSource::Session,
        "directory",
        format!("unsubscribed from {subject_id}"),
    );

    let mut effects = Vec::new();
    if state.directory.selected == subject_id {
        state.directory.selected = state
            .directory
            .subjects
            .first()
            .cloned()
            .unwrap_or_default();
        effects.push(Effect::PersistSelectedSubject(
            state.directory.selected.clone(),
        ));
        effects.extend(ensure_active_thread(state));
    }
    effects.push(Effect::RequestRedraw);
    effects
}

fn directory_failed(state: &mut SessionState, op: DirectoryOp, message: String) -> Vec<Effect> {
    state.directory.syncing = false;
    log(
        state,
        LogLevel::Warn,
        LogSource::Transport,
        "directory",
        format!("{} failed: {message}", op.label()),
    );

    match op {
        // A failed refresh keeps the cached set without bothering the user.
        DirectoryOp::List => Vec::new(),
        DirectoryOp::Add => {
            state.error = Some(FaultMessage::new(FaultKind::ApiError, MSG_ADD_SUBJECT_FAILED));
            vec![Effect::RequestRedraw]
        }
        DirectoryOp::Remove => {
            state.error = Some(FaultMessage::new(
                FaultKind::ApiError,
                MSG_REMOVE_SUBJECT_FAILED,
            ));
            vec![Effect::RequestRedraw]
        }
    }
}

fn chat_succeeded(state: &mut SessionState, thread_id: String, reply: AssistantReply) -> Vec<Effect> {
    if state.turn.phase != TurnPhase::Sending {
        return Vec::new();
    }
    state.turn.phase = TurnPhase::Idle;

    let Some(thread) = state.ledger.get_by_id(&thread_id).cloned() else {
        // Thread pruned or replaced between send and reply; drop the reply
        // rather than resurrect it.
        return vec![Effect::RequestRedraw];
    };

    let now = Utc::now();
    let subject = thread.subject.clone();
    let updated = ledger::append(
        &thread,
        Message::assistant(reply.content, &subject, reply.sources, reply.model_used, now),
    );
    state.ledger.replace(updated);
    log(
        state,
        LogLevel::Info,
        LogSource::Session,
        "turn",
        format!("assistant reply appended on {subject}"),
    );

    vec![
        Effect::PersistThreads(state.ledger.threads().to_vec()),
        Effect::RequestRedraw,
    ]
}

fn chat_failed(state: &mut SessionState, thread_id: String, fault: ClassifiedError) -> Vec<Effect> {
    if state.turn.phase != TurnPhase::Sending {
        return Vec::new();
    }
    // The optimistic user message stays in the thread; only the reply failed.
    state.turn.phase = TurnPhase::Failed;

    if fault.kind == FaultKind::RateLimited {
        let snapshot = fault.rate_limit.unwrap_or_default();
        state.turn.rate_limit = Some(snapshot);
        state.error = Some(FaultMessage::new(fault.kind, rate_limit_notice(&snapshot)));
    } else {
        state.error = Some(FaultMessage::new(fault.kind, fault.message.clone()));
    }
    log(
        state,
        LogLevel::Warn,
        LogSource::Transport,
        "turn",
        format!(
            "chat failed on thread {thread_id} ({}): {}",
            fault.kind.label(),
            fault.message
        ),
    );

    vec![Effect::RequestRedraw]
}

/// Whenever a selection and a format-valid email coexist, the matching thread
/// must exist. Returns the persistence effect when the ledger changed.
fn ensure_active_thread(state: &mut SessionState) -> Vec<Effect> {
    if !state.directory.has_selection() || !state.identity.has_valid_email() {
        return Vec::new();
    }

    let now = Utc::now();
    let subject = state.directory.selected.clone();
    let email = state.identity.email.clone();
    let existed = state.ledger.get(&subject, &email).is_some();
    let thread = state.ledger.find_or_create(&subject, &email, now);
    if !existed {
        log(
            state,
            LogLevel::Info,
            LogSource::Session,
            "ledger",
            format!("new thread {} for {subject}", thread.id),
        );
    }

    vec![Effect::PersistThreads(state.ledger.threads().to_vec())]
}

fn log(
    state: &mut SessionState,
    level: LogLevel,
    source: LogSource,
    context: &str,
    message: impl Into<String>,
) {
    state.logs.append(LogEntry {
        seq: 0,
        level,
        source,
        context: Some(context.to_string()),
        message: message.into(),
    });
}

#[cfg(test)]
mod tests;
