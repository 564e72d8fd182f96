use super::*;
use crate::identity::SessionMode;
use pretty_assertions::assert_eq;

#[test]
fn embedded_launch_persists_and_validates_the_query_token() {
    let state = embedded_launch_session("tok-123", Some("calculo"));

    assert_eq!(state.identity.phase, IdentityPhase::Resolving);
    let token = state.identity.token.as_ref().expect("token context");
    assert_eq!(token.token, "tok-123");
    assert_eq!(token.subject.as_deref(), Some("calculo"));
    assert!(!token.validated);
    assert_eq!(state.directory.selected, "calculo");
}

#[test]
fn embedded_launch_emits_persist_and_validate_effects() {
    let mut state = state();
    let effects = run_runtime(
        &mut state,
        RuntimeAction::Hydrate {
            launch: LaunchParams {
                session_token: Some("tok-123".to_string()),
                lti: true,
                subject: Some("calculo".to_string()),
            },
            persisted: PersistedSession::default(),
        },
    );

    assert!(effects.iter().any(|effect| matches!(
        effect,
        Effect::PersistEmbeddedSession { token, subject }
            if token == "tok-123" && subject.as_deref() == Some("calculo")
    )));
    assert!(effects
        .iter()
        .any(|effect| matches!(effect, Effect::ValidateToken { token } if token == "tok-123")));
}

#[test]
fn stored_token_is_revalidated_on_every_load() {
    let mut state = state();
    let effects = run_runtime(
        &mut state,
        RuntimeAction::Hydrate {
            launch: LaunchParams::default(),
            persisted: PersistedSession {
                session_token: Some("tok-old".to_string()),
                token_subject: Some("calculo".to_string()),
                ..PersistedSession::default()
            },
        },
    );

    assert_eq!(state.identity.phase, IdentityPhase::Resolving);
    assert_eq!(state.directory.selected, "calculo");
    assert!(effects
        .iter()
        .any(|effect| matches!(effect, Effect::ValidateToken { token } if token == "tok-old")));
}

#[test]
fn standalone_hydration_restores_email_selection_and_thread() {
    let mut state = state();
    let effects = run_runtime(
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

    assert_eq!(state.identity.phase, IdentityPhase::Standalone);
    assert_eq!(state.identity.email, EMAIL);
    assert_eq!(state.directory.selected, SUBJECT);
    assert!(state.current_thread().is_some());
    assert!(effects
        .iter()
        .any(|effect| matches!(effect, Effect::ListSubjects { email } if email == EMAIL)));
}

#[test]
fn persisted_subject_outside_the_catalog_is_dropped() {
    let mut state = state();
    run_runtime(
        &mut state,
        RuntimeAction::Hydrate {
            launch: LaunchParams::default(),
            persisted: PersistedSession {
                email: Some(EMAIL.to_string()),
                selected_subject: Some("asignatura_retirada".to_string()),
                ..PersistedSession::default()
            },
        },
    );

    assert_eq!(state.directory.selected, "");
    assert!(state.current_thread().is_none());
}

#[test]
fn validation_success_adopts_the_asserted_identity() {
    let mut state = embedded_launch_session("tok-123", Some("calculo"));
    let effects = run_runtime(
        &mut state,
        RuntimeAction::TokenValidated {
            user: validated_user("ana@go.ugr.es"),
            subject: Some(SUBJECT.to_string()),
            context_label: Some("Grado en Informática".to_string()),
        },
    );

    assert_eq!(state.identity.phase, IdentityPhase::Embedded);
    assert_eq!(state.identity.email, "ana@go.ugr.es");
    assert_eq!(state.identity.display_name.as_deref(), Some("Ana García"));
    let identity = state.identity.current().expect("settled identity");
    assert_eq!(identity.mode, SessionMode::Embedded);
    assert_eq!(identity.role.as_deref(), Some("Learner"));
    let token = state.identity.token.as_ref().expect("token context");
    assert!(token.validated);
    assert_eq!(token.context_label.as_deref(), Some("Grado en Informática"));
    // The server-asserted subject replaces the URL seed and joins the set.
    assert_eq!(state.directory.selected, SUBJECT);
    assert_eq!(state.directory.subjects, vec![SUBJECT.to_string()]);
    assert!(state.current_thread().is_some());
    assert!(effects
        .iter()
        .any(|effect| matches!(effect, Effect::PersistEmail(email) if email == "ana@go.ugr.es")));
}

#[test]
fn validation_without_subject_keeps_the_url_seed() {
    let mut state = embedded_launch_session("tok-123", Some("calculo"));
    run_runtime(
        &mut state,
        RuntimeAction::TokenValidated {
            user: validated_user("ana@go.ugr.es"),
            subject: None,
            context_label: None,
        },
    );

    assert_eq!(state.directory.selected, "calculo");
    assert_eq!(state.directory.subjects, vec!["calculo".to_string()]);
}

#[test]
fn identity_is_pending_while_the_token_validates() {
    let state = embedded_launch_session("tok-123", None);
    assert_eq!(state.identity.current(), None);
}

#[test]
fn validation_failure_is_terminal_and_purges_the_token() {
    let mut state = embedded_launch_session("tok-bad", None);
    let effects = run_runtime(
        &mut state,
        RuntimeAction::TokenRejected {
            message: "Invalid or expired session token".to_string(),
        },
    );

    assert_eq!(state.identity.phase, IdentityPhase::Rejected);
    assert_eq!(state.identity.token, None);
    assert_eq!(
        state.identity.rejection.as_deref(),
        Some("Invalid or expired session token")
    );
    assert!(effects
        .iter()
        .any(|effect| matches!(effect, Effect::ClearEmbeddedSession)));
}

#[test]
fn rejected_launch_never_falls_back_to_a_cached_standalone_email() {
    let mut state = state();
    run_runtime(
        &mut state,
        RuntimeAction::Hydrate {
            launch: LaunchParams {
                session_token: Some("tok-bad".to_string()),
                lti: true,
                subject: None,
            },
            persisted: PersistedSession {
                email: Some("otra@correo.ugr.es".to_string()),
                ..PersistedSession::default()
            },
        },
    );
    run_runtime(
        &mut state,
        RuntimeAction::TokenRejected {
            message: "Invalid or expired session token".to_string(),
        },
    );

    assert_eq!(state.identity.phase, IdentityPhase::Rejected);
    assert_eq!(state.identity.email, "");
    assert!(run_user(&mut state, UserAction::SubmitMessage("hola".to_string())).is_empty());
    assert!(run_user(&mut state, UserAction::SetEmail("otra@correo.ugr.es".to_string())).is_empty());
}

#[test]
fn hydration_after_a_purge_comes_up_standalone() {
    // The executor removed the embedded keys after the rejection; the next
    // load must not see a token at all.
    let mut state = state();
    run_runtime(
        &mut state,
        RuntimeAction::Hydrate {
            launch: LaunchParams::default(),
            persisted: PersistedSession {
                email: Some(EMAIL.to_string()),
                session_token: None,
                token_subject: None,
                ..PersistedSession::default()
            },
        },
    );

    assert_eq!(state.identity.phase, IdentityPhase::Standalone);
    assert_eq!(state.identity.token, None);
}

#[test]
fn embedded_email_is_immutable() {
    let mut state = embedded_launch_session("tok-123", Some(SUBJECT));
    run_runtime(
        &mut state,
        RuntimeAction::TokenValidated {
            user: validated_user("ana@go.ugr.es"),
            subject: None,
            context_label: None,
        },
    );

    let effects = run_user(&mut state, UserAction::SetEmail("otra@correo.ugr.es".to_string()));

    assert!(effects.is_empty());
    assert_eq!(state.identity.email, "ana@go.ugr.es");
}

#[test]
fn token_verdicts_outside_resolution_are_ignored() {
    let mut state = standalone_session();
    let effects = run_runtime(
        &mut state,
        RuntimeAction::TokenRejected {
            message: "late".to_string(),
        },
    );

    assert!(effects.is_empty());
    assert_eq!(state.identity.phase, IdentityPhase::Standalone);
}
