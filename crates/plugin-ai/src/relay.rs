use core::time::Duration;

use plugin_core::error::{HTTP_TIMEOUT, with_timeout};
use plugin_core::{BotError, CallClass};
use serde::Serialize;
use serde_json::Value;

/// Reply used when the backend answers without a usable `reply` field.
pub const FALLBACK_REPLY: &str = "AI Error";

#[derive(Serialize)]
struct ChatRequest<'a> {
    message: &'a str,
}

/// Client for the chat backend: `POST {base}/chat` with `{"message": ...}`.
#[derive(Debug, Clone)]
pub struct AiRelay {
    http: reqwest::Client,
    base_url: String,
    timeout: Duration,
}

impl AiRelay {
    #[must_use]
    pub fn new(http: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self {
            http,
            base_url: base_url.into(),
            timeout: HTTP_TIMEOUT,
        }
    }

    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    fn chat_url(&self) -> String {
        format!("{}/chat", self.base_url.trim_end_matches('/'))
    }

    /// Send `prompt` verbatim and return the backend's reply.
    ///
    /// # Errors
    ///
    /// `Backend` for connection failures and non-2xx statuses, `Timeout` when
    /// the call outlives the relay deadline.
    pub async fn ask(&self, prompt: &str) -> Result<String, BotError> {
        with_timeout(CallClass::Relay, self.timeout, self.post_chat(prompt)).await
    }

    async fn post_chat(&self, prompt: &str) -> Result<String, BotError> {
        let resp = self
            .http
            .post(self.chat_url())
            .json(&ChatRequest { message: prompt })
            .send()
            .await
            .and_then(reqwest::Response::error_for_status)
            .map_err(|e| BotError::Backend(e.to_string()))?;
        let body = resp
            .bytes()
            .await
            .map_err(|e| BotError::Backend(e.to_string()))?;
        Ok(extract_reply(&body))
    }
}

fn extract_reply(body: &[u8]) -> String {
    serde_json::from_slice::<Value>(body)
        .ok()
        .as_ref()
        .and_then(|v| v.get("reply"))
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .unwrap_or(FALLBACK_REPLY)
        .to_owned()
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use wiremock::matchers::{body_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    #[test]
    fn reply_fallbacks() {
        assert_eq!(extract_reply(br#"{"reply":"hi"}"#), "hi");
        assert_eq!(extract_reply(br#"{"reply":""}"#), FALLBACK_REPLY);
        assert_eq!(extract_reply(br#"{"answer":"hi"}"#), FALLBACK_REPLY);
        assert_eq!(extract_reply(br#"{"reply":3}"#), FALLBACK_REPLY);
        assert_eq!(extract_reply(b"<html>"), FALLBACK_REPLY);
    }

    #[tokio::test]
    async fn posts_prompt_verbatim() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat"))
            .and(body_json(json!({ "message": " spaced prompt" })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "reply": "ok" })))
            .expect(1)
            .mount(&server)
            .await;

        let relay = AiRelay::new(reqwest::Client::new(), format!("{}/", server.uri()));
        assert_eq!(relay.ask(" spaced prompt").await.unwrap(), "ok");
    }

    #[tokio::test]
    async fn non_success_is_backend_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat"))
            .respond_with(ResponseTemplate::new(502))
            .mount(&server)
            .await;

        let relay = AiRelay::new(reqwest::Client::new(), server.uri());
        assert!(matches!(relay.ask("hi").await, Err(BotError::Backend(_))));
    }

    #[tokio::test]
    async fn slow_backend_times_out() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({ "reply": "late" }))
                    .set_delay(Duration::from_secs(2)),
            )
            .mount(&server)
            .await;

        let relay = AiRelay::new(reqwest::Client::new(), server.uri())
            .with_timeout(Duration::from_millis(100));
        let err = relay.ask("hi").await.unwrap_err();
        assert!(err.is_timeout());
    }
}
