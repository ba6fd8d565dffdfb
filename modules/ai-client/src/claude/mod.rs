mod client;
pub(crate) mod types;

use types::MessagesRequest;

use crate::error::{AiError, Result};

/// Anthropic Messages API handle. Cloning shares the connection pool.
#[derive(Clone)]
pub struct Claude {
    api_key: String,
    model: String,
    temperature: Option<f32>,
    http: reqwest::Client,
}

impl Claude {
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            model: model.into(),
            temperature: Some(0.7),
            http: reqwest::Client::new(),
        }
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn request(&self, system: Option<&str>, prompt: String, max_tokens: u32) -> MessagesRequest {
        let mut request = MessagesRequest::single_turn(&self.model, prompt, max_tokens);
        request.system = system.map(String::from);
        request.temperature = self.temperature;
        request
    }

    /// Single-turn completion. Returns the trimmed first text block, or
    /// [`AiError::EmptyResponse`] when the reply carried none.
    pub async fn complete(
        &self,
        system: Option<&str>,
        user: impl Into<String>,
        max_tokens: u32,
    ) -> Result<String> {
        let request = self.request(system, user.into(), max_tokens);
        let response =
            client::post_messages(&self.http, client::BASE_URL, &self.api_key, &request).await?;

        match response.first_text() {
            Some(text) => Ok(text.trim().to_string()),
            None => Err(AiError::EmptyResponse),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::types::MessagesResponse;
    use super::*;

    #[test]
    fn request_carries_prompt_and_omits_missing_system() {
        let ai = Claude::new("k", "m");
        let json = serde_json::to_value(ai.request(None, "hello".into(), 300)).unwrap();
        assert_eq!(json["max_tokens"], 300);
        assert_eq!(json["messages"][0]["role"], "user");
        assert_eq!(json["messages"][0]["content"], "hello");
        assert!(json.get("system").is_none());

        let json = serde_json::to_value(ai.request(Some("be brief"), "hi".into(), 10)).unwrap();
        assert_eq!(json["system"], "be brief");
    }

    #[test]
    fn first_text_skips_other_blocks() {
        let response: MessagesResponse = serde_json::from_str(
            r#"{"content": [{"type": "thinking", "thinking": "..."}, {"type": "text", "text": "SKIP"}], "stop_reason": "end_turn"}"#,
        )
        .unwrap();
        assert_eq!(response.first_text(), Some("SKIP"));

        let empty: MessagesResponse = serde_json::from_str(r#"{"content": []}"#).unwrap();
        assert_eq!(empty.first_text(), None);
    }
}
