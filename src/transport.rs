//! inbound collaborator: something that turns a user turn into a chunk stream.
//!
//! - `Transport::open` issues the request (non-success status → `Err`).
//! - `ChunkSource::next_chunk` yields raw bytes until `None` (end of data).
//! - `ChunkSource::cancel` releases the underlying reader; afterwards the
//!   source must not be polled again.
//!
//! the library ships `LlmTransport` (any `llm` provider). http transports
//! live with the host (see `example/quiz.rs`).

use async_trait::async_trait;
use bevy::prelude::*;
use futures_lite::StreamExt;
use std::any::type_name_of_val;
use std::sync::Arc;

use crate::error::TransportError;
use crate::framer::Framing;

pub use llm::{
    LLMProvider,
    builder::{LLMBackend, LLMBuilder},
    chat::{ChatMessage, ChatRole, StreamChoice, StreamDelta, StreamResponse},
    error::LLMError,
};

#[cfg_attr(not(target_arch = "wasm32"), async_trait)]
#[cfg_attr(target_arch = "wasm32", async_trait(?Send))]
pub trait ChunkSource {
    async fn next_chunk(&mut self) -> Option<Result<Vec<u8>, TransportError>>;
    async fn cancel(&mut self);
}

#[cfg_attr(not(target_arch = "wasm32"), async_trait)]
#[cfg_attr(target_arch = "wasm32", async_trait(?Send))]
pub trait Transport: Send + Sync {
    /// wire format of the chunks this transport yields.
    fn framing(&self) -> Framing;
    async fn open(&self, user_turn: &str) -> Result<BoxedSource, TransportError>;
}

#[cfg(not(target_arch = "wasm32"))]
pub type BoxedSource = Box<dyn ChunkSource + Send>;
#[cfg(target_arch = "wasm32")]
pub type BoxedSource = Box<dyn ChunkSource>;

/// a transport over an `llm` provider. the provider keeps the history
/// (configure builder memory), each turn only sends the new user message.
#[derive(Clone)]
pub struct LlmTransport {
    provider: Arc<dyn LLMProvider>,
    stream: bool,
}

impl LlmTransport {
    pub fn new(provider: Arc<dyn LLMProvider>) -> Self {
        Self { provider, stream: true }
    }

    /// one-shot `chat()` instead of structured streaming.
    pub fn one_shot(mut self) -> Self {
        self.stream = false;
        self
    }

    async fn chat_once(&self, messages: &[ChatMessage]) -> Result<BoxedSource, TransportError> {
        let resp = self.provider.chat(messages).await?;
        let text = resp.text().unwrap_or_default().to_string();
        debug!(target: "bevy_quiz_stream", "llm one-shot reply: len={}", text.len());
        Ok(Box::new(OnceSource(Some(text.into_bytes()))))
    }
}

#[cfg_attr(not(target_arch = "wasm32"), async_trait)]
#[cfg_attr(target_arch = "wasm32", async_trait(?Send))]
impl Transport for LlmTransport {
    fn framing(&self) -> Framing {
        // deltas are plain text
        Framing::Raw
    }

    async fn open(&self, user_turn: &str) -> Result<BoxedSource, TransportError> {
        let messages = vec![ChatMessage::user().content(user_turn.to_string()).build()];
        let pty = type_name_of_val(self.provider.as_ref());
        if !self.stream {
            return self.chat_once(&messages).await;
        }
        match self.provider.chat_stream_struct(&messages).await {
            Ok(stream) => Ok(Box::new(LlmSource { stream: Some(stream) })),
            Err(err) => {
                warn!(target: "bevy_quiz_stream",
                    "structured streaming failed for provider {}: {err}. falling back to one-shot chat()",
                    pty
                );
                self.chat_once(&messages).await
            }
        }
    }
}

struct LlmSource<S> {
    stream: Option<S>,
}

#[cfg_attr(not(target_arch = "wasm32"), async_trait)]
#[cfg_attr(target_arch = "wasm32", async_trait(?Send))]
impl<S> ChunkSource for LlmSource<S>
where
    S: futures_lite::Stream<Item = Result<StreamResponse, LLMError>> + Unpin + Send,
{
    async fn next_chunk(&mut self) -> Option<Result<Vec<u8>, TransportError>> {
        loop {
            let item = self.stream.as_mut()?.next().await?;
            match item {
                Ok(StreamResponse { choices, .. }) => {
                    let mut text = String::new();
                    for StreamChoice { delta: StreamDelta { content, .. } } in choices {
                        if let Some(t) = content {
                            text.push_str(&t);
                        }
                    }
                    // tool-call-only and empty deltas carry no text
                    if !text.is_empty() {
                        return Some(Ok(text.into_bytes()));
                    }
                }
                Err(err) => return Some(Err(err.into())),
            }
        }
    }

    async fn cancel(&mut self) {
        // dropping the provider stream closes the connection
        self.stream = None;
    }
}

/// a whole reply delivered as a single chunk.
pub struct OnceSource(pub Option<Vec<u8>>);

#[cfg_attr(not(target_arch = "wasm32"), async_trait)]
#[cfg_attr(target_arch = "wasm32", async_trait(?Send))]
impl ChunkSource for OnceSource {
    async fn next_chunk(&mut self) -> Option<Result<Vec<u8>, TransportError>> {
        self.0.take().filter(|b| !b.is_empty()).map(Ok)
    }

    async fn cancel(&mut self) {
        self.0 = None;
    }
}
