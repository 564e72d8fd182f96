use std::time::Duration;

use async_trait::async_trait;
use aula_core::gateway::classify_response;
use aula_core::gateway::classify_transport;
use aula_core::gateway::ClassifiedError;
use serde::de::DeserializeOwned;

use crate::contracts::ChatRequest;
use crate::contracts::ChatResponse;
use crate::contracts::SessionValidation;
use crate::contracts::SubjectsResponse;

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// The five outbound contracts. Implementations return already-classified
/// faults so callers never see raw transport errors.
#[async_trait]
pub trait ChatApi {
    async fn validate_session(&self, token: &str) -> Result<SessionValidation, ClassifiedError>;
    async fn send_chat(&self, request: &ChatRequest) -> Result<ChatResponse, ClassifiedError>;
    async fn list_subjects(&self, email: &str) -> Result<SubjectsResponse, ClassifiedError>;
    async fn add_subject(
        &self,
        email: &str,
        subject_id: &str,
    ) -> Result<SubjectsResponse, ClassifiedError>;
    async fn remove_subject(
        &self,
        email: &str,
        subject_id: &str,
    ) -> Result<SubjectsResponse, ClassifiedError>;
}

/// reqwest-backed transport against the backend HTTP API.
#[derive(Debug, Clone)]
pub struct HttpApi {
    client: reqwest::Client,
    base_url: String,
}

impl HttpApi {
    pub fn new(base_url: &str) -> Result<Self, ClassifiedError> {
        let client = reqwest::Client::builder()
            .timeout(DEFAULT_TIMEOUT)
            .build()
            .map_err(|error| classify_transport(&error.to_string()))?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    async fn decode<T: DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<T, ClassifiedError> {
        let status = response.status().as_u16();
        let body = response
            .text()
            .await
            .map_err(|error| classify_transport(&error.to_string()))?;
        if !(200..300).contains(&status) {
            tracing::debug!(status, "request failed");
            return Err(classify_response(status, &body));
        }
        serde_json::from_str(&body).map_err(|error| classify_transport(&error.to_string()))
    }
}

#[async_trait]
impl ChatApi for HttpApi {
    async fn validate_session(&self, token: &str) -> Result<SessionValidation, ClassifiedError> {
        let response = self
            .client
            .get(self.endpoint("/session/validate"))
            .header("X-Session-Token", token)
            .send()
            .await
            .map_err(|error| classify_transport(&error.to_string()))?;
        Self::decode(response).await
    }

    async fn send_chat(&self, request: &ChatRequest) -> Result<ChatResponse, ClassifiedError> {
        let response = self
            .client
            .post(self.endpoint("/chat"))
            .json(request)
            .send()
            .await
            .map_err(|error| classify_transport(&error.to_string()))?;
        Self::decode(response).await
    }

    async fn list_subjects(&self, email: &str) -> Result<SubjectsResponse, ClassifiedError> {
        let response = self
            .client
            .get(self.endpoint("/user/subjects"))
            .query(&[("email", email)])
            .send()
            .await
            .map_err(|error| classify_transport(&error.to_string()))?;
        Self::decode(response).await
    }

    async fn add_subject(
        &self,
        email: &str,
        subject_id: &str,
    ) -> Result<SubjectsResponse, ClassifiedError> {
        let response = self
            .client
            .post(self.endpoint("/user/subjects"))
            .json(&serde_json::json!({ "email": email, "subject_id": subject_id }))
            .send()
            .await
            .map_err(|error| classify_transport(&error.to_string()))?;
        Self::decode(response).await
    }

    async fn remove_subject(
        &self,
        email: &str,
        subject_id: &str,
    ) -> Result<SubjectsResponse, ClassifiedError> {
        let response = self
            .client
            .delete(self.endpoint(&format!("/user/subjects/{subject_id}")))
            .query(&[("email", email)])
            .send()
            .await
            .map_err(|error| classify_transport(&error.to_string()))?;
        Self::decode(response).await
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::HttpApi;

    #[test]
    fn base_url_drops_the_trailing_slash() {
        let api = HttpApi::new("http://localhost:8000/").expect("client");
        assert_eq!(api.endpoint("/chat"), "http://localhost:8000/chat");
    }
}
