use aula_core::identity::ValidatedUser;
use serde::Deserialize;
use serde::Serialize;

/// Body of the outbound chat call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChatRequest {
    pub message: String,
    pub subject: String,
    pub mode: String,
    pub email: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ChatResponse {
    pub response: String,
    #[serde(default)]
    pub subject: Option<String>,
    #[serde(default)]
    pub sources: Vec<String>,
    #[serde(default)]
    pub model_used: Option<String>,
    #[serde(default)]
    pub query_type: Option<String>,
}

/// Shared shape of the three subject-directory calls.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SubjectsResponse {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub subjects: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SessionValidation {
    pub user: ValidatedUser,
    #[serde(default)]
    pub subject: Option<String>,
    #[serde(default)]
    pub context_label: Option<String>,
}
