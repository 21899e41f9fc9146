//! stream controller: owns one conversation's read loop.
//!
//! `Idle → Sending → Streaming → {Completed, Cancelled, Failed}`
//!
//! - `start` cancels any in-flight turn, publishes an empty placeholder and
//!   hands back a `Turn` future for the caller to spawn.
//! - every chunk is framed, appended and the whole buffer re-parsed; the full
//!   block list is republished (never a diff).
//! - end of data triggers one last re-parse, then `Completed`.
//! - cancellation releases the reader and publishes nothing but the terminal
//!   status; the last published blocks stay as they were.
//! - transport errors replace the content with the fallback text.

use bevy::prelude::*;
use flume::{Receiver, Sender};
use futures_lite::future;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::accumulator::MessageBuffer;
use crate::assemble::{AssembleContext, parse_blocks};
use crate::blocks::ContentBlock;
use crate::config::ParseConfig;
use crate::error::TransportError;
use crate::framer::{Framer, Utf8Decoder};
use crate::transport::Transport;

/// identity of one assistant message: the owning conversation plus a
/// per-conversation sequence number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MessageId {
    pub session: u64,
    pub seq: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum TurnStatus {
    #[default]
    Idle,
    Sending,
    Streaming,
    Completed,
    Cancelled,
    Failed,
}

impl TurnStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled | Self::Failed)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TurnOutcome {
    Completed,
    Cancelled,
    Failed { fallback: String, error: TransportError },
}

impl TurnOutcome {
    pub fn status(&self) -> TurnStatus {
        match self {
            Self::Completed => TurnStatus::Completed,
            Self::Cancelled => TurnStatus::Cancelled,
            Self::Failed { .. } => TurnStatus::Failed,
        }
    }
}

/// what the controller publishes, in order, for each message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamMsg {
    Status { message: MessageId, status: TurnStatus },
    /// full replacement: buffer text so far and the blocks parsed from it.
    Blocks { message: MessageId, text: String, blocks: Vec<ContentBlock> },
    Finished { message: MessageId, outcome: TurnOutcome },
}

impl StreamMsg {
    pub fn message(&self) -> MessageId {
        match self {
            Self::Status { message, .. } | Self::Blocks { message, .. } | Self::Finished { message, .. } => *message,
        }
    }
}

/// cooperative cancellation for one turn. cloning shares the same turn.
#[derive(Clone, Debug)]
pub struct CancelHandle {
    flag: Arc<AtomicBool>,
    tx: Sender<()>,
}

impl CancelHandle {
    fn new() -> (Self, Receiver<()>) {
        let (tx, rx) = flume::bounded(1);
        (Self { flag: Arc::new(AtomicBool::new(false)), tx }, rx)
    }

    pub fn cancel(&self) {
        if !self.flag.swap(true, Ordering::SeqCst) {
            let _ = self.tx.try_send(());
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

/// per-conversation controller. at most one turn is live at a time.
pub struct StreamController {
    session: u64,
    transport: Arc<dyn Transport>,
    config: Arc<ParseConfig>,
    outbox: Sender<StreamMsg>,
    active: Option<(MessageId, CancelHandle)>,
    next_seq: u64,
}

impl StreamController {
    pub fn new(
        session: u64,
        transport: Arc<dyn Transport>,
        config: Arc<ParseConfig>,
        outbox: Sender<StreamMsg>,
    ) -> Self {
        Self { session, transport, config, outbox, active: None, next_seq: 0 }
    }

    /// begins a new turn; the previous one (if any) is cancelled first.
    pub fn start(&mut self, user_turn: impl Into<String>) -> Turn {
        self.cancel();

        let id = MessageId { session: self.session, seq: self.next_seq };
        self.next_seq += 1;
        let (cancel, cancel_rx) = CancelHandle::new();
        self.active = Some((id, cancel.clone()));

        let user_turn = user_turn.into();
        info!(target: "bevy_quiz_stream", "start turn: message={:?} len={}", id, user_turn.len());
        let _ = self.outbox.send(StreamMsg::Status { message: id, status: TurnStatus::Sending });
        let _ = self.outbox.send(StreamMsg::Blocks { message: id, text: String::new(), blocks: Vec::new() });

        Turn {
            id,
            user_turn,
            transport: self.transport.clone(),
            config: self.config.clone(),
            outbox: self.outbox.clone(),
            cancel,
            cancel_rx,
        }
    }

    /// cancels the in-flight turn, if any.
    pub fn cancel(&mut self) {
        if let Some((id, handle)) = self.active.take() {
            debug!(target: "bevy_quiz_stream", "cancel requested: message={:?}", id);
            handle.cancel();
        }
    }

    pub fn active(&self) -> Option<MessageId> {
        self.active.as_ref().filter(|(_, h)| !h.is_cancelled()).map(|(id, _)| *id)
    }

    pub fn session(&self) -> u64 {
        self.session
    }
}

enum Step<T> {
    Cancelled,
    Ready(T),
}

/// one streamed response. run it to completion on whichever executor the
/// host uses; it resolves to the terminal status.
pub struct Turn {
    id: MessageId,
    user_turn: String,
    transport: Arc<dyn Transport>,
    config: Arc<ParseConfig>,
    outbox: Sender<StreamMsg>,
    cancel: CancelHandle,
    cancel_rx: Receiver<()>,
}

impl Turn {
    pub fn id(&self) -> MessageId {
        self.id
    }

    pub fn cancel_handle(&self) -> CancelHandle {
        self.cancel.clone()
    }

    /// races `fut` against cancellation; cancellation wins ties.
    async fn or_cancel<T>(&self, fut: impl std::future::Future<Output = T>) -> Step<T> {
        if self.cancel.is_cancelled() {
            return Step::Cancelled;
        }
        future::or(
            async {
                // the turn holds a sender, so this only resolves on cancel
                let _ = self.cancel_rx.recv_async().await;
                Step::Cancelled
            },
            async { Step::Ready(fut.await) },
        )
        .await
    }

    async fn publish(&self, msg: StreamMsg) {
        let _ = self.outbox.send_async(msg).await;
    }

    async fn finish(&self, outcome: TurnOutcome) -> TurnStatus {
        let status = outcome.status();
        self.publish(StreamMsg::Finished { message: self.id, outcome }).await;
        status
    }

    async fn fail(&self, error: TransportError) -> TurnStatus {
        error!(target: "bevy_quiz_stream", "turn failed: message={:?} error={}", self.id, error);
        let fallback = self.config.fallback_message.clone();
        self.publish(StreamMsg::Blocks {
            message: self.id,
            text: fallback.clone(),
            blocks: vec![ContentBlock::prose(&fallback)],
        })
        .await;
        self.finish(TurnOutcome::Failed { fallback, error }).await
    }

    async fn cancelled(&self) -> TurnStatus {
        info!(target: "bevy_quiz_stream", "turn cancelled: message={:?}", self.id);
        self.finish(TurnOutcome::Cancelled).await
    }

    fn parse(&self, buffer: &MessageBuffer) -> Vec<ContentBlock> {
        parse_blocks(buffer.as_str(), &self.config, AssembleContext::LIVE)
    }

    pub async fn run(self) -> TurnStatus {

        let mut source = match self.or_cancel(self.transport.open(&self.user_turn)).await {
            Step::Cancelled => return self.cancelled().await,
            Step::Ready(Err(err)) => return self.fail(err).await,
            Step::Ready(Ok(source)) => source,
        };

        let mut buffer = MessageBuffer::new();
        let mut decoder = Utf8Decoder::new();
        let mut framer = Framer::new(self.transport.framing(), &self.config.envelope_prefixes);
        let mut status = TurnStatus::Sending;

        loop {
            let chunk = match self.or_cancel(source.next_chunk()).await {
                Step::Cancelled => {
                    source.cancel().await;
                    return self.cancelled().await;
                }
                Step::Ready(None) => break,
                Step::Ready(Some(Err(err))) => {
                    source.cancel().await;
                    return self.fail(err).await;
                }
                Step::Ready(Some(Ok(bytes))) => bytes,
            };

            if status == TurnStatus::Sending {
                status = TurnStatus::Streaming;
                debug!(target: "bevy_quiz_stream", "first chunk: message={:?} bytes={}", self.id, chunk.len());
                self.publish(StreamMsg::Status { message: self.id, status }).await;
            }

            let before = buffer.len();
            for fragment in framer.push(&decoder.push(&chunk)) {
                buffer.append(&fragment);
            }
            if buffer.len() == before {
                continue;
            }
            if self.cancel.is_cancelled() {
                source.cancel().await;
                return self.cancelled().await;
            }
            let blocks = self.parse(&buffer);
            self.publish(StreamMsg::Blocks { message: self.id, text: buffer.as_str().to_string(), blocks })
                .await;
        }

        if self.cancel.is_cancelled() {
            return self.cancelled().await;
        }
        let tail = decoder.finish();
        for fragment in framer.push(&tail).into_iter().chain(framer.finish()) {
            buffer.append(&fragment);
        }
        // a decision made on a truncated tail gets one more look
        let blocks = self.parse(&buffer);
        info!(target: "bevy_quiz_stream",
            "turn completed: message={:?} fragments={} final_len={} blocks={}",
            self.id, buffer.fragments(), buffer.len(), blocks.len()
        );
        self.publish(StreamMsg::Blocks { message: self.id, text: buffer.into_string(), blocks }).await;
        self.finish(TurnOutcome::Completed).await
    }
}
