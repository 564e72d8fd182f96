use crate::gateway::ClassifiedError;
use crate::identity::LaunchParams;
use crate::identity::ValidatedUser;
use crate::persistence::PersistedSession;
use crate::state::ChatMode;

#[derive(Debug, Clone)]
pub enum SessionAction {
    User(UserAction),
    Runtime(RuntimeAction),
}

/// Direct user input, forwarded by the host.
#[derive(Debug, Clone)]
pub enum UserAction {
    SetEmail(String),
    SetChatMode(ChatMode),
    SelectSubject(String),
    AddSubject(String),
    RemoveSubject(String),
    SubmitMessage(String),
    DismissError,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DirectoryOp {
    List,
    Add,
    Remove,
}

impl DirectoryOp {
    pub fn label(self) -> &'static str {
        match self {
            Self::List => "list",
            Self::Add => "add",
            Self::Remove => "remove",
        }
    }
}

/// Assistant response body after a successful chat call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssistantReply {
    pub content: String,
    pub sources: Vec<String>,
    pub model_used: Option<String>,
}

/// Results of completed effects, fed back by the executor.
#[derive(Debug, Clone)]
pub enum RuntimeAction {
    Hydrate {
        launch: LaunchParams,
        persisted: PersistedSession,
    },
    TokenValidated {
        user: ValidatedUser,
        subject: Option<String>,
        context_label: Option<String>,
    },
    TokenRejected {
        message: String,
    },
    SubjectsListed {
        subjects: Vec<String>,
    },
    SubjectAdded {
        subject_id: String,
        subjects: Vec<String>,
    },
    SubjectRemoved {
        subject_id: String,
        subjects: Vec<String>,
    },
    DirectoryFailed {
        op: DirectoryOp,
        message: String,
    },
    ChatSucceeded {
        thread_id: String,
        reply: AssistantReply,
    },
    ChatFailed {
        thread_id: String,
        fault: ClassifiedError,
    },
    StorageDegraded {
        context: String,
        message: String,
    },
}
