use std::future::Future;
use std::time::Duration;

use reqwest::Client;

use super::error::CompletionError;
use super::types::{ChatRequest, ChatResponse};
use crate::config::LlmConfig;

/// Anything that can deliver a chat request and hand back the parsed body.
///
/// Implemented by [`ChatClient`] for real HTTP calls and by test doubles.
pub trait ChatSender: Send + Sync {
    fn send_chat(
        &self,
        req: &ChatRequest,
    ) -> impl Future<Output = Result<ChatResponse, CompletionError>> + Send;
}

pub struct ChatClient {
    client: Client,
    url: String,
}

impl ChatClient {
    /// Build a client for the configured endpoint.
    ///
    /// Without `request_timeout_secs` the request may wait indefinitely, which
    /// is what local model servers with slow first-token latency need.
    pub fn new(config: &LlmConfig) -> Result<Self, CompletionError> {
        let mut builder =
            Client::builder().connect_timeout(Duration::from_secs(config.connect_timeout_secs));
        if let Some(secs) = config.request_timeout_secs {
            builder = builder.timeout(Duration::from_secs(secs));
        }
        Ok(Self {
            client: builder.build()?,
            url: config.url.clone(),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

impl ChatSender for ChatClient {
    async fn send_chat(&self, req: &ChatRequest) -> Result<ChatResponse, CompletionError> {
        let response = self
            .client
            .post(&self.url)
            .header("content-type", "application/json")
            .json(req)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            return Err(CompletionError::Status {
                status: status.as_u16(),
                body,
            });
        }

        serde_json::from_str::<ChatResponse>(&body)
            .map_err(|e| CompletionError::Malformed(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::types::ChatMessage;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn config_for(url: String) -> LlmConfig {
        LlmConfig {
            url,
            ..LlmConfig::default()
        }
    }

    fn request() -> ChatRequest {
        ChatRequest {
            model: "gpt-oss-20b".into(),
            messages: vec![ChatMessage::user("ping")],
            temperature: 0.7,
            max_tokens: 500,
        }
    }

    #[tokio::test]
    async fn parses_successful_reply() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .and(body_partial_json(serde_json::json!({"model": "gpt-oss-20b"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "choices": [{"message": {"role": "assistant", "content": "pong"}}]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client =
            ChatClient::new(&config_for(format!("{}/v1/chat/completions", server.uri()))).unwrap();
        let resp = client.send_chat(&request()).await.unwrap();
        assert_eq!(resp.reply_text().as_deref(), Some("pong"));
    }

    #[tokio::test]
    async fn non_success_status_is_reported() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503).set_body_string("loading"))
            .mount(&server)
            .await;

        let client = ChatClient::new(&config_for(server.uri())).unwrap();
        let err = client.send_chat(&request()).await.unwrap_err();
        match err {
            CompletionError::Status { status, body } => {
                assert_eq!(status, 503);
                assert_eq!(body, "loading");
            }
            other => panic!("expected Status, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn wrong_json_shape_is_malformed() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({"answer": "hi"})),
            )
            .mount(&server)
            .await;

        let client = ChatClient::new(&config_for(server.uri())).unwrap();
        let err = client.send_chat(&request()).await.unwrap_err();
        assert!(matches!(err, CompletionError::Malformed(_)));
    }

    #[tokio::test]
    async fn refused_connection_is_classified() {
        let port = {
            let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap().port()
        };
        let client = ChatClient::new(&config_for(format!("http://127.0.0.1:{port}/v1"))).unwrap();
        let err = client.send_chat(&request()).await.unwrap_err();
        assert!(matches!(err, CompletionError::Connection(_)), "got {err:?}");
    }

    #[tokio::test]
    async fn slow_service_times_out() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_delay(Duration::from_secs(5))
                    .set_body_json(serde_json::json!({"choices": []})),
            )
            .mount(&server)
            .await;

        let config = LlmConfig {
            request_timeout_secs: Some(1),
            ..config_for(server.uri())
        };
        let client = ChatClient::new(&config).unwrap();
        let err = client.send_chat(&request()).await.unwrap_err();
        assert!(matches!(err, CompletionError::Timeout), "got {err:?}");
    }
}
