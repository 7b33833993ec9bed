//! Language model collaborator and per-session model rotation.

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;
use thiserror::Error;

use crate::models::ChatMessage;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LlmError {
    /// Upstream failure, carrying the provider's message.
    #[error("{0}")]
    Request(String),

    #[error("No chat models configured")]
    NoModels,
}

/// One chat turn sent to the model.
#[derive(Debug, Clone, Copy)]
pub struct ChatRequest<'a> {
    pub model: &'a str,
    pub system: &'a str,
    /// Earlier turns, oldest first. Does not include `message`.
    pub history: &'a [ChatMessage],
    pub message: &'a str,
}

#[async_trait]
pub trait ChatModel: Send + Sync {
    async fn generate(&self, request: ChatRequest<'_>) -> Result<String, LlmError>;
}

// ═══════════════════════════════════════════
// Model rotation
// ═══════════════════════════════════════════

/// Round-robin cursor over configured model names.
#[derive(Debug, Clone)]
pub struct ModelRotation {
    models: Vec<String>,
    cursor: usize,
}

impl ModelRotation {
    pub fn new(models: Vec<String>) -> Self {
        Self { models, cursor: 0 }
    }

    pub fn len(&self) -> usize {
        self.models.len()
    }

    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }

    pub fn current(&self) -> Result<&str, LlmError> {
        self.models
            .get(self.cursor)
            .map(String::as_str)
            .ok_or(LlmError::NoModels)
    }

    /// Move to the next model, wrapping around.
    pub fn advance(&mut self) {
        if !self.models.is_empty() {
            self.cursor = (self.cursor + 1) % self.models.len();
        }
    }
}

// ═══════════════════════════════════════════
// Mock
// ═══════════════════════════════════════════

/// What a `MockChatModel` saw on one call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedCall {
    pub model: String,
    pub system: String,
    pub history: Vec<ChatMessage>,
    pub message: String,
}

/// Scripted model for tests and offline demos. Replies are consumed in order;
/// once the script runs out every call gets `default_reply`.
pub struct MockChatModel {
    script: Mutex<VecDeque<Result<String, LlmError>>>,
    default_reply: String,
    calls: Mutex<Vec<RecordedCall>>,
}

impl MockChatModel {
    pub fn new(default_reply: &str) -> Self {
        Self {
            script: Mutex::new(VecDeque::new()),
            default_reply: default_reply.to_string(),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn then_reply(self, reply: &str) -> Self {
        self.push(Ok(reply.to_string()));
        self
    }

    pub fn then_fail(self, message: &str) -> Self {
        self.push(Err(LlmError::Request(message.to_string())));
        self
    }

    fn push(&self, entry: Result<String, LlmError>) {
        if let Ok(mut script) = self.script.lock() {
            script.push_back(entry);
        }
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl ChatModel for MockChatModel {
    async fn generate(&self, request: ChatRequest<'_>) -> Result<String, LlmError> {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(RecordedCall {
                model: request.model.to_string(),
                system: request.system.to_string(),
                history: request.history.to_vec(),
                message: request.message.to_string(),
            });
        }
        let next = self.script.lock().ok().and_then(|mut s| s.pop_front());
        next.unwrap_or_else(|| Ok(self.default_reply.clone()))
    }
}
