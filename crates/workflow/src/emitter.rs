//! Turns node output into the thread's ordered protocol event stream.
//!
//! [`EventEmitter`] owns the outbound channel and the thread's sequence
//! cursor. Each node writes through a [`NodeSink`], which applies the node's
//! [`StreamMode`]: streamed text leaves immediately, buffered text and
//! controls are held until the node commits. A sink that is dropped without
//! [`NodeSink::finish`] releases nothing, so a failed node never leaks
//! partial buffered output.

use std::sync::atomic::{AtomicU64, Ordering};

use thiserror::Error;
use tokio::sync::mpsc;
use waypoint_core::event::{ErrorPayload, StatusPayload};
use waypoint_core::{ControlKind, ControlPayload, EventBody, MessagePayload, NodeId, ProtocolEvent};

use crate::policy::{StreamMode, StreamPolicy};

/// The receiving side went away; the turn must stop emitting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("client disconnected")]
pub struct Disconnected;

pub struct EventEmitter {
    tx: mpsc::Sender<ProtocolEvent>,
    cursor: AtomicU64,
}

impl EventEmitter {
    /// `cursor` is the sequence number of the last event already sent on
    /// this thread.
    pub fn new(tx: mpsc::Sender<ProtocolEvent>, cursor: u64) -> Self {
        Self {
            tx,
            cursor: AtomicU64::new(cursor),
        }
    }

    /// Sequence number of the last event emitted.
    pub fn cursor(&self) -> u64 {
        self.cursor.load(Ordering::SeqCst)
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    pub async fn emit(&self, body: EventBody) -> Result<u64, Disconnected> {
        // A number is taken only once the channel has room for the event.
        let permit = self.tx.reserve().await.map_err(|_| Disconnected)?;
        let sequence_no = self.cursor.fetch_add(1, Ordering::SeqCst) + 1;
        permit.send(ProtocolEvent { body, sequence_no });
        Ok(sequence_no)
    }

    pub async fn message(&self, content: impl Into<String>, is_stream: bool) -> Result<u64, Disconnected> {
        self.emit(EventBody::Message(MessagePayload {
            content: content.into(),
            is_stream,
        }))
        .await
    }

    pub async fn control(&self, payload: ControlPayload) -> Result<u64, Disconnected> {
        self.emit(EventBody::Control(payload)).await
    }

    pub async fn status(&self, content: impl Into<String>, node: NodeId) -> Result<u64, Disconnected> {
        self.emit(EventBody::Status(StatusPayload {
            content: content.into(),
            node: node.to_string(),
        }))
        .await
    }

    pub async fn error(&self, message: impl Into<String>) -> Result<u64, Disconnected> {
        self.emit(EventBody::Error(ErrorPayload {
            message: message.into(),
        }))
        .await
    }
}

/// Per-node output writer.
pub struct NodeSink<'a> {
    node: NodeId,
    mode: StreamMode,
    emitter: &'a EventEmitter,
    /// Everything the node said, streamed or not. Recorded in history.
    transcript: String,
    control: Option<ControlPayload>,
}

impl<'a> NodeSink<'a> {
    pub fn new(node: NodeId, emitter: &'a EventEmitter) -> Self {
        Self {
            node,
            mode: StreamPolicy::mode(node),
            emitter,
            transcript: String::new(),
            control: None,
        }
    }

    pub fn mode(&self) -> StreamMode {
        self.mode
    }

    pub fn transcript(&self) -> &str {
        &self.transcript
    }

    /// Add text. Streamed nodes send it as an increment right away.
    pub async fn text(&mut self, piece: &str) -> Result<(), Disconnected> {
        if piece.is_empty() {
            return Ok(());
        }
        self.transcript.push_str(piece);
        if self.mode == StreamMode::Stream {
            self.emitter.message(piece, true).await?;
        }
        Ok(())
    }

    /// Set the node's control payload. A later call replaces an earlier one.
    pub fn control(&mut self, kind: ControlKind, options: Vec<serde_json::Value>) {
        self.control = Some(ControlPayload { kind, options });
    }

    /// Advisory progress note, sent immediately in every mode.
    pub async fn status(&self, content: &str) -> Result<(), Disconnected> {
        self.emitter.status(content, self.node).await.map(|_| ())
    }

    /// Release held output: one terminal message (buffered nodes only),
    /// then at most one control. Returns the transcript.
    pub async fn finish(self) -> Result<String, Disconnected> {
        if self.mode == StreamMode::Buffer && !self.transcript.is_empty() {
            self.emitter.message(self.transcript.clone(), false).await?;
        }
        if let Some(control) = self.control {
            self.emitter.control(control).await?;
        }
        Ok(self.transcript)
    }
}
