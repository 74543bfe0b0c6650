use reqwest::StatusCode;
use serde::Deserialize;
use std::time::Duration;

use super::FeedbackRequest;
use crate::config::FeedbackConfig;
use crate::error::{CoachError, CoachResult};

/// Produces coaching text for a user/reference pose pair
#[async_trait::async_trait]
pub trait FeedbackGenerator: Send + Sync {
    async fn generate(&self, request: &FeedbackRequest) -> CoachResult<String>;
}

#[derive(Debug, Deserialize)]
struct FeedbackResponse {
    #[serde(default)]
    feedback: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

/// Feedback service reached over HTTP: POST the request as JSON, read `{"feedback": ...}` back.
#[derive(Debug, Clone)]
pub struct HttpFeedbackGenerator {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpFeedbackGenerator {
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> CoachResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| CoachError::Config(format!("failed to build HTTP client: {}", e)))?;
        Ok(Self {
            client,
            endpoint: endpoint.into(),
        })
    }

    pub fn from_config(config: &FeedbackConfig) -> CoachResult<Self> {
        Self::new(&config.endpoint, config.timeout())
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait::async_trait]
impl FeedbackGenerator for HttpFeedbackGenerator {
    async fn generate(&self, request: &FeedbackRequest) -> CoachResult<String> {
        let response = self
            .client
            .post(&self.endpoint)
            .json(request)
            .send()
            .await
            .map_err(|e| {
                let kind = if e.is_timeout() { "timed out" } else { "transport error" };
                CoachError::FeedbackRequestFailed(format!("{}: {}", kind, e))
            })?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| CoachError::FeedbackRequestFailed(format!("failed to read body: {}", e)))?;
        parse_response(status, &body)
    }
}

/// Extracts the feedback text from a service response
pub fn parse_response(status: StatusCode, body: &str) -> CoachResult<String> {
    let parsed = serde_json::from_str::<FeedbackResponse>(body).ok();

    if !status.is_success() {
        let detail = parsed
            .and_then(|r| r.error)
            .unwrap_or_else(|| body.chars().take(200).collect());
        return Err(CoachError::FeedbackRequestFailed(format!("{} - {}", status, detail)));
    }

    let response = parsed.ok_or_else(|| {
        CoachError::FeedbackRequestFailed("response is not a feedback document".to_string())
    })?;
    if let Some(error) = response.error {
        return Err(CoachError::FeedbackRequestFailed(error));
    }
    match response.feedback {
        Some(text) if !text.trim().is_empty() => Ok(text.trim().to_string()),
        _ => Err(CoachError::FeedbackRequestFailed(
            "response has no feedback".to_string(),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pose::{Landmark, LandmarkFrame};
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    fn request() -> FeedbackRequest {
        let frame = LandmarkFrame::new(vec![Landmark::new(0.5, 0.5, 0.0, 1.0); 33]);
        FeedbackRequest::new(frame.clone(), frame)
    }

    /// Serves one HTTP exchange and hands back the raw request
    async fn serve_once(
        status_line: &'static str,
        body: &'static str,
    ) -> (String, tokio::task::JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("http://{}/evaluate_pose", listener.local_addr().unwrap());
        let handle = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut raw = Vec::new();
            let mut buf = [0u8; 4096];
            loop {
                let n = socket.read(&mut buf).await.unwrap();
                if n == 0 {
                    break;
                }
                raw.extend_from_slice(&buf[..n]);
                let text = String::from_utf8_lossy(&raw);
                if let Some(header_end) = text.find("\r\n\r\n") {
                    let length = text[..header_end]
                        .lines()
                        .find_map(|l| {
                            let (name, value) = l.split_once(':')?;
                            name.eq_ignore_ascii_case("content-length")
                                .then(|| value.trim().parse::<usize>().ok())
                                .flatten()
                        })
                        .unwrap_or(0);
                    if raw.len() >= header_end + 4 + length {
                        break;
                    }
                }
            }
            let response = format!(
                "{}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                status_line,
                body.len(),
                body
            );
            socket.write_all(response.as_bytes()).await.unwrap();
            socket.shutdown().await.ok();
            String::from_utf8_lossy(&raw).into_owned()
        });
        (url, handle)
    }

    #[test]
    fn test_parse_response() {
        assert_eq!(
            parse_response(StatusCode::OK, r#"{"feedback": " Bend your knees. "}"#).unwrap(),
            "Bend your knees."
        );
        assert!(parse_response(StatusCode::OK, r#"{"error": "model offline"}"#).is_err());
        assert!(parse_response(StatusCode::OK, r#"{"feedback": ""}"#).is_err());
        assert!(parse_response(StatusCode::OK, "<html>").is_err());

        let err = parse_response(StatusCode::BAD_REQUEST, r#"{"error": "Invalid pose data"}"#)
            .unwrap_err();
        assert!(err.to_string().contains("Invalid pose data"));
    }

    #[tokio::test]
    async fn test_http_generator_round_trip() {
        let body = r#"{"feedback":"Lift your left arm higher."}"#;
        let (url, server) = serve_once("HTTP/1.1 200 OK", body).await;
        let generator = HttpFeedbackGenerator::new(url, Duration::from_secs(5)).unwrap();
        let text = generator.generate(&request()).await.unwrap();
        assert_eq!(text, "Lift your left arm higher.");

        let raw = server.await.unwrap();
        assert!(raw.starts_with("POST /evaluate_pose"));
        assert!(raw.contains("\"user_pose\""));
        assert!(raw.contains("\"reference_pose\""));
    }

    #[tokio::test]
    async fn test_http_generator_server_error() {
        let (url, _server) =
            serve_once("HTTP/1.1 500 Internal Server Error", r#"{"error":"boom"}"#).await;
        let generator = HttpFeedbackGenerator::new(url, Duration::from_secs(5)).unwrap();
        let err = generator.generate(&request()).await.unwrap_err();
        assert!(matches!(err, CoachError::FeedbackRequestFailed(_)));
    }

    #[tokio::test]
    async fn test_http_generator_unreachable() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("http://{}/evaluate_pose", listener.local_addr().unwrap());
        drop(listener);
        let generator = HttpFeedbackGenerator::new(url, Duration::from_secs(2)).unwrap();
        assert!(matches!(
            generator.generate(&request()).await,
            Err(CoachError::FeedbackRequestFailed(_))
        ));
    }
}
