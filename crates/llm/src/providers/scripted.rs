//! Scripted LLM client.
//!
//! Replays a queue of canned replies in order and records every request it
//! receives. Used by tests to drive the agreement/synthesis/quality paths
//! deterministically, and as the `scripted` provider for offline runs where
//! an empty script makes every call fail.

use crate::client::{
    LlmClient, LlmRequest, LlmResponse, LlmStream, LlmStreamChunk, LlmUsage, ObjectStream,
};
use crate::structured::parse_partial_object;
use hivemind_core::{AppError, AppResult};
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard};

/// One canned reply.
#[derive(Debug, Clone)]
pub enum Reply {
    /// Plain text, streamed word by word
    Text(String),
    /// A sequence of successively more complete objects
    Objects(Vec<Value>),
    /// Provider failure
    Fail(String),
    /// A call that never returns
    Hang,
}

/// Deterministic LLM double.
#[derive(Debug, Default)]
pub struct ScriptedClient {
    replies: Mutex<VecDeque<Reply>>,
    requests: Mutex<Vec<LlmRequest>>,
    calls: AtomicUsize,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl ScriptedClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a reply.
    pub fn push(&self, reply: Reply) -> &Self {
        lock(&self.replies).push_back(reply);
        self
    }

    /// Queue a single final object.
    pub fn push_object(&self, object: Value) -> &Self {
        self.push(Reply::Objects(vec![object]))
    }

    pub fn push_text(&self, text: impl Into<String>) -> &Self {
        self.push(Reply::Text(text.into()))
    }

    pub fn push_failure(&self, message: impl Into<String>) -> &Self {
        self.push(Reply::Fail(message.into()))
    }

    pub fn push_hang(&self) -> &Self {
        self.push(Reply::Hang)
    }

    /// Number of calls received so far.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Copies of every request received, in order.
    pub fn requests(&self) -> Vec<LlmRequest> {
        lock(&self.requests).clone()
    }

    async fn next_reply(&self, request: &LlmRequest) -> Reply {
        self.calls.fetch_add(1, Ordering::SeqCst);
        lock(&self.requests).push(request.clone());
        let reply = lock(&self.replies)
            .pop_front()
            .unwrap_or_else(|| Reply::Fail("scripted client has no replies left".to_string()));
        if let Reply::Hang = reply {
            futures::future::pending::<()>().await;
        }
        reply
    }
}

fn reply_text(reply: Reply) -> AppResult<String> {
    match reply {
        Reply::Text(text) => Ok(text),
        Reply::Objects(objects) => Ok(objects
            .last()
            .map(Value::to_string)
            .unwrap_or_default()),
        Reply::Fail(message) => Err(AppError::Llm(message)),
        Reply::Hang => Err(AppError::Llm("scripted reply never settled".to_string())),
    }
}

#[async_trait::async_trait]
impl LlmClient for ScriptedClient {
    fn provider_name(&self) -> &str {
        "scripted"
    }

    async fn complete(&self, request: &LlmRequest) -> AppResult<LlmResponse> {
        let content = reply_text(self.next_reply(request).await)?;
        Ok(LlmResponse {
            content,
            model: request.model.clone(),
            usage: LlmUsage::default(),
            done: true,
        })
    }

    async fn stream(&self, request: &LlmRequest) -> AppResult<LlmStream> {
        let content = reply_text(self.next_reply(request).await)?;
        let model = request.model.clone();

        let mut chunks: Vec<AppResult<LlmStreamChunk>> = content
            .split_inclusive(' ')
            .map(|word| {
                Ok(LlmStreamChunk {
                    content: word.to_string(),
                    model: model.clone(),
                    done: false,
                    usage: None,
                })
            })
            .collect();
        chunks.push(Ok(LlmStreamChunk {
            content: String::new(),
            model,
            done: true,
            usage: Some(LlmUsage::default()),
        }));

        Ok(Box::pin(futures::stream::iter(chunks)))
    }

    async fn stream_object(&self, request: &LlmRequest) -> AppResult<ObjectStream> {
        let objects: Vec<AppResult<Value>> = match self.next_reply(request).await {
            Reply::Objects(objects) => objects.into_iter().map(Ok).collect(),
            Reply::Text(text) => parse_partial_object(&text).into_iter().map(Ok).collect(),
            Reply::Fail(message) => return Err(AppError::Llm(message)),
            Reply::Hang => return Err(AppError::Llm("scripted reply never settled".to_string())),
        };
        Ok(Box::pin(futures::stream::iter(objects)))
    }
}
