use aula_core::actions::AssistantReply;
use aula_core::actions::DirectoryOp;
use aula_core::actions::RuntimeAction;
use aula_core::persistence::KeyValueStore;
use aula_core::persistence::SessionStore;
use aula_core::persistence::StorageError;
use aula_core::reducer::Effect;

use crate::api::ChatApi;
use crate::contracts::ChatRequest;
use crate::contracts::SubjectsResponse;

const DIRECTORY_UNSUCCESSFUL: &str = "server reported an unsuccessful update";

/// Runs one reducer effect to completion and returns the runtime actions to
/// feed back. Network outcomes become actions; persistence failures degrade
/// to a logged default instead of propagating.
pub struct EffectExecutor<A, S: KeyValueStore> {
    api: A,
    store: SessionStore<S>,
}

impl<A: ChatApi, S: KeyValueStore> EffectExecutor<A, S> {
    pub fn new(api: A, store: SessionStore<S>) -> Self {
        Self { api, store }
    }

    pub fn store(&self) -> &SessionStore<S> {
        &self.store
    }

    pub async fn execute(&mut self, effect: Effect) -> Vec<RuntimeAction> {
        match effect {
            Effect::ValidateToken { token } => match self.api.validate_session(&token).await {
                Ok(validation) => vec![RuntimeAction::TokenValidated {
                    user: validation.user,
                    subject: validation.subject,
                    context_label: validation.context_label,
                }],
                Err(fault) => {
                    tracing::warn!(error = %fault, "session validation failed");
                    vec![RuntimeAction::TokenRejected {
                        message: fault.message,
                    }]
                }
            },
            Effect::ListSubjects { email } => {
                let outcome = self.api.list_subjects(&email).await;
                directory_outcome(DirectoryOp::List, None, outcome)
            }
            Effect::AddSubject { email, subject_id } => {
                let outcome = self.api.add_subject(&email, &subject_id).await;
                directory_outcome(DirectoryOp::Add, Some(subject_id), outcome)
            }
            Effect::RemoveSubject { email, subject_id } => {
                let outcome = self.api.remove_subject(&email, &subject_id).await;
                directory_outcome(DirectoryOp::Remove, Some(subject_id), outcome)
            }
            Effect::SendChat {
                thread_id,
                message,
                subject,
                mode,
                email,
            } => {
                let request = ChatRequest {
                    message,
                    subject,
                    mode: mode.label().to_string(),
                    email,
                };
                match self.api.send_chat(&request).await {
                    Ok(response) => vec![RuntimeAction::ChatSucceeded {
                        thread_id,
                        reply: AssistantReply {
                            content: response.response,
                            sources: response.sources,
                            model_used: response.model_used,
                        },
                    }],
                    Err(fault) => vec![RuntimeAction::ChatFailed { thread_id, fault }],
                }
            }
            Effect::PersistEmail(email) => {
                self.persist("email", |store| store.set_email(&email))
            }
            Effect::PersistSelectedSubject(subject) => self.persist("selected-subject", |store| {
                store.set_selected_subject(&subject)
            }),
            Effect::PersistThreads(threads) => {
                self.persist("threads", |store| store.set_threads(&threads))
            }
            Effect::PersistEmbeddedSession { token, subject } => {
                self.persist("embedded-session", |store| {
                    store.set_embedded_session(&token, subject.as_deref())
                })
            }
            Effect::ClearEmbeddedSession => {
                self.persist("embedded-session", |store| store.clear_embedded_session())
            }
            // Rendering is the host's concern.
            Effect::RequestRedraw => Vec::new(),
        }
    }

    fn persist(
        &mut self,
        context: &str,
        write: impl FnOnce(&mut SessionStore<S>) -> Result<(), StorageError>,
    ) -> Vec<RuntimeAction> {
        match write(&mut self.store) {
            Ok(()) => Vec::new(),
            Err(error) => {
                tracing::warn!(context, error = %error, "persistence degraded");
                vec![RuntimeAction::StorageDegraded {
                    context: context.to_string(),
                    message: error.to_string(),
                }]
            }
        }
    }
}

fn directory_outcome(
    op: DirectoryOp,
    subject_id: Option<String>,
    outcome: Result<SubjectsResponse, aula_core::gateway::ClassifiedError>,
) -> Vec<RuntimeAction> {
    match outcome {
        Ok(response) if response.success => match (op, subject_id) {
            (DirectoryOp::Add, Some(subject_id)) => vec![RuntimeAction::SubjectAdded {
                subject_id,
                subjects: response.subjects,
            }],
            (DirectoryOp::Remove, Some(subject_id)) => vec![RuntimeAction::SubjectRemoved {
                subject_id,
                subjects: response.subjects,
            }],
            _ => vec![RuntimeAction::SubjectsListed {
                subjects: response.subjects,
            }],
        },
        Ok(_) => {
            tracing::warn!(op = op.label(), "directory call unsuccessful");
            vec![RuntimeAction::DirectoryFailed {
                op,
                message: DIRECTORY_UNSUCCESSFUL.to_string(),
            }]
        }
        Err(fault) => {
            tracing::warn!(op = op.label(), error = %fault, "directory call failed");
            vec![RuntimeAction::DirectoryFailed {
                op,
                message: fault.message,
            }]
        }
    }
}
