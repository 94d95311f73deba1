//! Generation and classification collaborators.
//!
//! The orchestrator never talks to a model directly. Free text comes from a
//! [`Generator`]; routing hints come from an [`IntentClassifier`]. Both are
//! traits so the runtime can swap a model-backed implementation for the
//! deterministic ones used offline and in tests.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::error::ProviderError;
use crate::node::NodeId;
use crate::state::{ConversationState, Turn};

/// A free-text generation request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationRequest {
    pub system: String,
    #[serde(default)]
    pub history: Vec<Turn>,
    pub prompt: String,
}

#[async_trait]
pub trait Generator: Send + Sync {
    fn name(&self) -> &str;

    async fn complete(&self, request: GenerationRequest) -> Result<String, ProviderError>;

    /// Incremental variant.
    ///
    /// Default implementation calls `complete()` and splits the text into
    /// sentence-sized pieces.
    async fn stream(
        &self,
        request: GenerationRequest,
    ) -> Result<mpsc::Receiver<Result<String, ProviderError>>, ProviderError> {
        let text = self.complete(request).await?;
        let pieces = split_increments(&text);
        let (tx, rx) = mpsc::channel(pieces.len().max(1));
        for piece in pieces {
            let _ = tx.send(Ok(piece)).await;
        }
        Ok(rx)
    }
}

/// Split text after sentence punctuation, keeping the punctuation.
pub fn split_increments(text: &str) -> Vec<String> {
    let mut pieces = Vec::new();
    let mut current = String::new();
    for ch in text.chars() {
        current.push(ch);
        if matches!(ch, '。' | '！' | '？' | '\n' | '!' | '?' | '.') {
            pieces.push(std::mem::take(&mut current));
        }
    }
    if !current.is_empty() {
        pieces.push(current);
    }
    pieces
}

/// Output of intent classification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Classification {
    /// None when the classifier could not decide.
    pub target: Option<NodeId>,
    pub confidence: f32,
    /// Whether the message belongs to the booking track.
    pub business: bool,
}

impl Classification {
    pub fn confident(target: NodeId) -> Self {
        Self {
            target: Some(target),
            confidence: 0.9,
            business: !matches!(target, NodeId::SideChat),
        }
    }

    pub fn unknown(business: bool) -> Self {
        Self {
            target: None,
            confidence: 0.0,
            business,
        }
    }
}

#[async_trait]
pub trait IntentClassifier: Send + Sync {
    fn name(&self) -> &str;

    async fn classify(
        &self,
        state: &ConversationState,
        message: &str,
    ) -> Result<Classification, ProviderError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Fixed(&'static str);

    #[async_trait]
    impl Generator for Fixed {
        fn name(&self) -> &str {
            "fixed"
        }
        async fn complete(&self, _request: GenerationRequest) -> Result<String, ProviderError> {
            Ok(self.0.to_string())
        }
    }

    #[test]
    fn split_keeps_punctuation() {
        let pieces = split_increments("你好。今天去哪？随便");
        assert_eq!(pieces, vec!["你好。", "今天去哪？", "随便"]);
    }

    #[tokio::test]
    async fn default_stream_yields_all_pieces() {
        let generator = Fixed("One. Two. Three");
        let mut rx = generator
            .stream(GenerationRequest {
                system: String::new(),
                history: vec![],
                prompt: "hi".into(),
            })
            .await
            .unwrap();
        let mut joined = String::new();
        while let Some(piece) = rx.recv().await {
            joined.push_str(&piece.unwrap());
        }
        assert_eq!(joined, "One. Two. Three");
    }

    #[test]
    fn confident_side_chat_is_not_business() {
        assert!(!Classification::confident(NodeId::SideChat).business);
        assert!(Classification::confident(NodeId::Plan).business);
    }
}
