//! HTTP text generation client.
//!
//! POSTs `{"prompt": "..."}` to the configured endpoint and accepts either a
//! JSON object with a `text` field or a plain-text body.

use std::time::Duration;

use reqwest::Client;
use serde_json::json;
use tokio::runtime::Runtime;

use super::TextGenerator;
use crate::error::GenerationError;

pub struct HttpTextGenerator {
    endpoint: String,
    api_key: Option<String>,
    client: Client,
    runtime: Runtime,
}

impl std::fmt::Debug for HttpTextGenerator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpTextGenerator")
            .field("endpoint", &self.endpoint)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

impl HttpTextGenerator {
    pub fn new(
        endpoint: impl Into<String>,
        api_key: Option<String>,
        timeout: Duration,
    ) -> Result<Self, GenerationError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| GenerationError::Request(e.to_string()))?;
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| GenerationError::Request(e.to_string()))?;
        Ok(Self {
            endpoint: endpoint.into(),
            api_key,
            client,
            runtime,
        })
    }

    async fn request(&self, prompt: &str) -> Result<String, GenerationError> {
        let mut req = self
            .client
            .post(&self.endpoint)
            .json(&json!({ "prompt": prompt }));
        if let Some(key) = &self.api_key {
            req = req.bearer_auth(key);
        }

        let resp = req.send().await.map_err(map_reqwest_error)?;
        let status = resp.status();
        let body = resp.text().await.map_err(map_reqwest_error)?;
        if !status.is_success() {
            return Err(GenerationError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let text = match serde_json::from_str::<serde_json::Value>(&body) {
            Ok(serde_json::Value::Object(obj)) => match obj.get("text") {
                Some(serde_json::Value::String(text)) => text.clone(),
                _ => body,
            },
            _ => body,
        };
        if text.trim().is_empty() {
            return Err(GenerationError::Empty);
        }
        Ok(text)
    }
}

fn map_reqwest_error(err: reqwest::Error) -> GenerationError {
    if err.is_timeout() {
        GenerationError::Timeout
    } else {
        GenerationError::Request(err.to_string())
    }
}

impl TextGenerator for HttpTextGenerator {
    fn generate(&self, prompt: &str) -> Result<String, GenerationError> {
        let result = self.runtime.block_on(self.request(prompt));
        if let Err(e) = &result {
            tracing::warn!(endpoint = %self.endpoint, error = %e, "text generation failed");
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Matcher;

    fn generator(server_url: &str, key: Option<&str>) -> HttpTextGenerator {
        HttpTextGenerator::new(
            format!("{server_url}/generate"),
            key.map(str::to_string),
            Duration::from_secs(5),
        )
        .unwrap()
    }

    #[test]
    fn returns_text_field_of_json_body() {
        let mut server = mockito::Server::new();
        let mock = server
            .mock("POST", "/generate")
            .match_header("authorization", "Bearer secret")
            .match_body(Matcher::PartialJson(json!({ "prompt": "walk" })))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"text":"You found a hidden garden."}"#)
            .create();

        let text = generator(&server.url(), Some("secret")).generate("walk").unwrap();
        assert_eq!(text, "You found a hidden garden.");
        mock.assert();
    }

    #[test]
    fn accepts_plain_text_body() {
        let mut server = mockito::Server::new();
        server
            .mock("POST", "/generate")
            .with_status(200)
            .with_body("[{\"vibe\":\"chill\"}]")
            .create();

        let text = generator(&server.url(), None).generate("walk").unwrap();
        assert_eq!(text, "[{\"vibe\":\"chill\"}]");
    }

    #[test]
    fn error_status_is_reported() {
        let mut server = mockito::Server::new();
        server
            .mock("POST", "/generate")
            .with_status(503)
            .with_body("busy")
            .create();

        let err = generator(&server.url(), None).generate("walk").unwrap_err();
        assert_eq!(
            err,
            GenerationError::Status {
                status: 503,
                body: "busy".into()
            }
        );
    }

    #[test]
    fn blank_body_is_empty() {
        let mut server = mockito::Server::new();
        server
            .mock("POST", "/generate")
            .with_status(200)
            .with_body("   ")
            .create();

        let err = generator(&server.url(), None).generate("walk").unwrap_err();
        assert_eq!(err, GenerationError::Empty);
    }

    #[test]
    fn unreachable_endpoint_is_request_error() {
        let generator = HttpTextGenerator::new(
            "http://127.0.0.1:9/generate",
            None,
            Duration::from_secs(2),
        )
        .unwrap();
        assert!(matches!(
            generator.generate("walk"),
            Err(GenerationError::Request(_)) | Err(GenerationError::Timeout)
        ));
    }
}
