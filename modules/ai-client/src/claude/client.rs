use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE};
use tracing::debug;

use super::types::{MessagesRequest, MessagesResponse};
use crate::error::{AiError, Result};

pub(crate) const BASE_URL: &str = "https://api.anthropic.com/v1";
const API_VERSION: &str = "2023-06-01";

/// Sends one request to the Messages endpoint.
pub(crate) async fn post_messages(
    http: &reqwest::Client,
    base_url: &str,
    api_key: &str,
    request: &MessagesRequest,
) -> Result<MessagesResponse> {
    debug!(
        model = %request.model,
        max_tokens = request.max_tokens,
        "Sending Claude request"
    );

    let resp = http
        .post(format!("{base_url}/messages"))
        .headers(headers(api_key)?)
        .json(request)
        .send()
        .await?;

    let status = resp.status();
    if !status.is_success() {
        return Err(AiError::Api {
            status: status.as_u16(),
            message: resp.text().await.unwrap_or_default(),
        });
    }
    Ok(resp.json().await?)
}

fn headers(api_key: &str) -> Result<HeaderMap> {
    let key = HeaderValue::from_str(api_key)
        .map_err(|e| AiError::Parse(format!("API key is not a valid header value: {e}")))?;

    let mut headers = HeaderMap::new();
    headers.insert("x-api-key", key);
    headers.insert("anthropic-version", HeaderValue::from_static(API_VERSION));
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    Ok(headers)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn newline_in_key_is_rejected() {
        assert!(matches!(headers("sk-ant\nbad"), Err(AiError::Parse(_))));
        assert!(headers("sk-ant-test").is_ok());
    }
}
