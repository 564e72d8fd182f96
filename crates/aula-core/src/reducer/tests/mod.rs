pub(super) use super::reduce;
pub(super) use super::Effect;
pub(super) use super::MSG_ADD_SUBJECT_FAILED;
pub(super) use super::MSG_INVALID_EMAIL_CHAT;
pub(super) use super::MSG_INVALID_EMAIL_SUBJECTS;
pub(super) use super::MSG_REMOVE_SUBJECT_FAILED;
pub(super) use crate::actions::AssistantReply;
pub(super) use crate::actions::DirectoryOp;
pub(super) use crate::actions::RuntimeAction;
pub(super) use crate::actions::SessionAction;
pub(super) use crate::actions::UserAction;
pub(super) use crate::catalog::SubjectCatalog;
pub(super) use crate::gateway::classify_response;
pub(super) use crate::gateway::ClassifiedError;
pub(super) use crate::gateway::FaultKind;
pub(super) use crate::identity::LaunchParams;
pub(super) use crate::identity::ValidatedUser;
pub(super) use crate::ledger::ConversationLedger;
pub(super) use crate::ledger::ConversationThread;
pub(super) use crate::persistence::PersistedSession;
pub(super) use crate::state::IdentityPhase;
pub(super) use crate::state::SessionState;
pub(super) use crate::state::TurnPhase;

mod identity_resolution;

pub(super) const EMAIL: &str = "ana@correo.ugr.es";
pub(super) const SUBJECT: &str = "metaheuristicas";

fn state() -> SessionState {
    SessionState::new(SubjectCatalog::builtin())
}

fn run_user(state: &mut SessionState, action: UserAction) -> Vec<Effect> {
    reduce(state, SessionAction::User(action))
}

fn run_runtime(state: &mut SessionState, action: RuntimeAction) -> Vec<Effect> {
    reduce(state, SessionAction::Runtime(action))
}

/// Hydrated standalone session with a valid email and a selected subject.
fn standalone_session() -> SessionState {
    let mut state = state();
    run_runtime(
        &mut state,
        RuntimeAction::Hydrate {
            launch: LaunchParams::default(),
            persisted: PersistedSession {
                email: Some(EMAIL.to_string()),
                selected_subject: Some(SUBJECT.to_string()),
                ..PersistedSession::default()
            },
        },
    );
    state
}

/// Session hydrated from an embedded launch, still validating its token.
fn embedded_launch_session(token: &str, subject: Option<&str>) -> SessionState {
    let mut state = state();
    run_runtime(
        &mut state,
        RuntimeAction::Hydrate {
            launch: LaunchParams {
                session_token: Some(token.to_string()),
                lti: true,
                subject: subject.map(|s| s.to_string()),
            },
            persisted: PersistedSession::default(),
        },
    );
    state
}

fn validated_user(email: &str) -> ValidatedUser {
    ValidatedUser {
        id: "u-1".to_string(),
        name: "Ana García".to_string(),
        email: email.to_string(),
        role: Some("Learner".to_string()),
    }
}

fn threads_with_activity(entries: &[(&str, &str, chrono::DateTime<chrono::Utc>)]) -> Vec<ConversationThread> {
    let mut ledger = ConversationLedger::default();
    for (subject, email, at) in entries {
        ledger.find_or_create(subject, email, *at);
    }
    ledger.threads().to_vec()
}

fn sent_chat(effects: &[Effect]) -> Option<&Effect> {
    effects
        .iter()
        .find(|effect| matches!(effect, Effect::SendChat { .. }))
}

fn persisted_threads(effects: &[Effect]) -> Option<&Vec<ConversationThread>> {
    effects.iter().find_map(|effect| match effect {
        Effect::PersistThreads(threads) => Some(threads),
        _ => None,
    })
}
