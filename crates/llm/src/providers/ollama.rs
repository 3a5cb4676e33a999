//! Ollama LLM provider implementation.
//!
//! Talks to a local (or remote) Ollama runtime over `/api/generate`.
//! Structured objects use Ollama's `format: "json"` mode and are streamed
//! through the default `stream_object` fold.
//! Ollama API: https://github.com/ollama/ollama/blob/main/docs/api.md

use crate::client::{LlmClient, LlmRequest, LlmResponse, LlmStream, LlmStreamChunk, LlmUsage};
use futures::StreamExt;
use hivemind_core::{AppError, AppResult};
use serde::{Deserialize, Serialize};
use tracing::instrument;

#[derive(Debug, Serialize)]
struct GenerateRequest {
    model: String,
    prompt: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    format: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    options: Option<GenerateOptions>,
    stream: bool,
}

#[derive(Debug, Serialize, PartialEq)]
struct GenerateOptions {
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    num_predict: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    model: String,
    response: String,
    done: bool,
    #[serde(default)]
    prompt_eval_count: Option<u32>,
    #[serde(default)]
    eval_count: Option<u32>,
}

impl GenerateResponse {
    fn usage(&self) -> LlmUsage {
        LlmUsage::new(
            self.prompt_eval_count.unwrap_or(0),
            self.eval_count.unwrap_or(0),
        )
    }
}

/// Ollama LLM client.
pub struct OllamaClient {
    base_url: String,
    api_key: Option<String>,
    client: reqwest::Client,
}

impl OllamaClient {
    /// Client for http://localhost:11434.
    pub fn new() -> Self {
        Self::with_base_url(crate::factory::DEFAULT_OLLAMA_URL)
    }

    /// Client for a custom base URL.
    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: None,
            client: reqwest::Client::new(),
        }
    }

    /// Send a bearer token, for Ollama instances behind an auth proxy.
    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    fn to_generate_request(&self, request: &LlmRequest) -> GenerateRequest {
        let options = if request.temperature.is_some() || request.max_tokens.is_some() {
            Some(GenerateOptions {
                temperature: request.temperature,
                num_predict: request.max_tokens,
            })
        } else {
            None
        };

        GenerateRequest {
            model: request.model.clone(),
            prompt: request.prompt.clone(),
            system: request.system.clone(),
            format: request.format.clone(),
            options,
            stream: request.stream,
        }
    }

    async fn post(&self, body: &GenerateRequest) -> AppResult<reqwest::Response> {
        let url = format!("{}/api/generate", self.base_url);
        let mut builder = self.client.post(&url).json(body);
        if let Some(key) = &self.api_key {
            builder = builder.bearer_auth(key);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| AppError::Llm(format!("Failed to send request to Ollama: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(AppError::Llm(format!(
                "Ollama API error ({}): {}",
                status, error_text
            )));
        }

        Ok(response)
    }
}

impl Default for OllamaClient {
    fn default() -> Self {
        Self::new()
    }
}

fn parse_line(line: &str) -> AppResult<LlmStreamChunk> {
    let parsed: GenerateResponse = serde_json::from_str(line)
        .map_err(|e| AppError::Llm(format!("Failed to parse chunk: {}", e)))?;

    let usage = parsed.done.then(|| parsed.usage());
    Ok(LlmStreamChunk {
        content: parsed.response,
        model: parsed.model,
        done: parsed.done,
        usage,
    })
}

/// Append `bytes` to `pending` and parse every line it completes.
///
/// Lines are decoded only once whole, so a multibyte character split across
/// network chunks survives intact.
fn take_lines(pending: &mut Vec<u8>, bytes: &[u8]) -> Vec<AppResult<LlmStreamChunk>> {
    pending.extend_from_slice(bytes);
    let mut complete = Vec::new();
    while let Some(pos) = pending.iter().position(|b| *b == b'\n') {
        let line: Vec<u8> = pending.drain(..=pos).collect();
        match std::str::from_utf8(&line) {
            Ok(text) if text.trim().is_empty() => {}
            Ok(text) => complete.push(parse_line(text.trim())),
            Err(e) => complete.push(Err(AppError::Llm(format!("Invalid UTF-8 in stream: {}", e)))),
        }
    }
    complete
}

#[async_trait::async_trait]
impl LlmClient for OllamaClient {
    fn provider_name(&self) -> &str {
        "ollama"
    }

    #[instrument(skip(self, request), fields(model = %request.model))]
    async fn complete(&self, request: &LlmRequest) -> AppResult<LlmResponse> {
        let mut body = self.to_generate_request(request);
        body.stream = false;

        let response = self.post(&body).await?;
        let parsed: GenerateResponse = response
            .json()
            .await
            .map_err(|e| AppError::Llm(format!("Failed to parse Ollama response: {}", e)))?;

        tracing::debug!(
            eval_count = parsed.eval_count.unwrap_or(0),
            "Received completion from Ollama"
        );

        let usage = parsed.usage();
        Ok(LlmResponse {
            content: parsed.response,
            model: parsed.model,
            usage,
            done: parsed.done,
        })
    }

    #[instrument(skip(self, request), fields(model = %request.model))]
    async fn stream(&self, request: &LlmRequest) -> AppResult<LlmStream> {
        let mut body = self.to_generate_request(request);
        body.stream = true;

        let response = self.post(&body).await?;

        // Ollama sends newline-delimited JSON; a network chunk may end in the
        // middle of a line, so carry the remainder over to the next chunk.
        let stream = response
            .bytes_stream()
            .scan(Vec::new(), |pending, result| {
                let items: Vec<AppResult<LlmStreamChunk>> = match result {
                    Ok(bytes) => take_lines(pending, &bytes),
                    Err(e) => vec![Err(AppError::Llm(format!("Stream error: {}", e)))],
                };
                futures::future::ready(Some(futures::stream::iter(items)))
            })
            .flatten();

        Ok(Box::pin(stream))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ollama_client_creation() {
        let client = OllamaClient::with_base_url("http://localhost:11434/");
        assert_eq!(client.provider_name(), "ollama");
        assert_eq!(client.base_url, "http://localhost:11434");
        assert!(client.api_key.is_none());
    }

    #[test]
    fn test_generate_request_conversion() {
        let client = OllamaClient::new();
        let request = LlmRequest::new("Hello", "llama3.2")
            .with_temperature(0.7)
            .with_max_tokens(100)
            .with_json_format();

        let body = client.to_generate_request(&request);
        assert_eq!(body.model, "llama3.2");
        assert_eq!(body.prompt, "Hello");
        assert_eq!(body.format.as_deref(), Some("json"));
        assert_eq!(
            body.options,
            Some(GenerateOptions {
                temperature: Some(0.7),
                num_predict: Some(100),
            })
        );
    }

    #[test]
    fn test_plain_request_has_no_options() {
        let client = OllamaClient::new();
        let body = client.to_generate_request(&LlmRequest::new("Hi", "llama3.2"));
        let json = serde_json::to_value(&body).unwrap();
        assert!(json.get("options").is_none());
        assert!(json.get("format").is_none());
    }

    #[test]
    fn test_parse_final_line_carries_usage() {
        let chunk = parse_line(
            r#"{"model":"llama3.2","response":"","done":true,"prompt_eval_count":5,"eval_count":7}"#,
        )
        .unwrap();
        assert!(chunk.done);
        assert_eq!(chunk.usage.map(|u| u.total_tokens), Some(12));
    }

    #[test]
    fn test_take_lines_keeps_split_character() {
        let line = "{\"model\":\"m\",\"response\":\"caf\u{e9}\",\"done\":false}\n".as_bytes();
        let split = line.iter().position(|b| *b == 0xC3).unwrap() + 1;

        let mut pending = Vec::new();
        assert!(take_lines(&mut pending, &line[..split]).is_empty());
        let chunks = take_lines(&mut pending, &line[split..]);

        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].as_ref().unwrap().content, "caf\u{e9}");
        assert!(pending.is_empty());
    }

    #[test]
    fn test_take_lines_carries_partial_line() {
        let mut pending = Vec::new();
        let chunks = take_lines(
            &mut pending,
            b"{\"model\":\"m\",\"response\":\"a\",\"done\":false}\n\n{\"model\":",
        );
        assert_eq!(chunks.len(), 1);
        assert_eq!(pending, b"{\"model\":".to_vec());
    }

    #[tokio::test]
    async fn test_stream_decodes_character_split_across_chunks() {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let body = concat!(
            "{\"model\":\"m\",\"response\":\"caf\u{e9}\",\"done\":false}\n",
            "{\"model\":\"m\",\"response\":\"\",\"done\":true}\n"
        )
        .as_bytes();
        let split = body.iter().position(|b| *b == 0xC3).unwrap() + 1;

        let server = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut request = Vec::new();
            let mut buf = [0u8; 4096];
            loop {
                let n = socket.read(&mut buf).await.unwrap();
                request.extend_from_slice(&buf[..n]);
                let text = String::from_utf8_lossy(&request).to_lowercase();
                if let Some(end) = text.find("\r\n\r\n") {
                    let length = text
                        .lines()
                        .find_map(|l| l.strip_prefix("content-length:"))
                        .and_then(|v| v.trim().parse::<usize>().ok())
                        .unwrap_or(0);
                    if request.len() >= end + 4 + length {
                        break;
                    }
                }
                assert!(n > 0, "connection closed before the request was read");
            }
            socket
                .write_all(b"HTTP/1.1 200 OK\r\ncontent-type: application/x-ndjson\r\nconnection: close\r\n\r\n")
                .await
                .unwrap();
            socket.write_all(&body[..split]).await.unwrap();
            socket.flush().await.unwrap();
            tokio::time::sleep(std::time::Duration::from_millis(50)).await;
            socket.write_all(&body[split..]).await.unwrap();
            socket.shutdown().await.unwrap();
        });

        let client = OllamaClient::with_base_url(format!("http://{}", addr));
        let mut stream = client.stream(&LlmRequest::new("q", "m")).await.unwrap();
        let mut text = String::new();
        while let Some(chunk) = stream.next().await {
            text.push_str(&chunk.unwrap().content);
        }

        assert_eq!(text, "caf\u{e9}");
        server.await.unwrap();
    }
}
