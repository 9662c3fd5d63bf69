//! LLM integration - OpenAI-compatible chat completions
//!
//! This module provides:
//! - HTTP client for chat completions (OpenRouter by default)
//! - Request/response types matching the OpenAI-compatible API
//! - Model fallback with automatic retry
//! - The [`ChatModel`] seam used by the reviewer and the query agent

mod client;
mod types;

pub use client::{ChatModel, ChatOptions, LlmClient, LlmClientBuilder, estimate_tokens};
pub use types::{
    ChatRequest, ChatResponse, Choice, FinishReason, LlmResponse, Message, MessageRole,
    ResponseFormat, ResponseMessage, Usage,
};
