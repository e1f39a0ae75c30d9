//! Requests the session sends to the AI content collaborator.
//!
//! Each use site is a single opaque async call: a request goes out, and some
//! time later a reply (or a failure) comes back as an event.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{Error, Result};
use crate::knowledge::KnowledgeBase;
use crate::models::Card;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RequestId(pub u64);

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "req-{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TextComplexity {
    #[default]
    Simple,
    Complex,
}

impl fmt::Display for TextComplexity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TextComplexity::Simple => f.write_str("simple"),
            TextComplexity::Complex => f.write_str("complex"),
        }
    }
}

/// An uploaded image, base64 encoded
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageAttachment {
    pub mime_type: String,
    pub data: String,
}

/// Card content produced by the assistant
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeneratedCard {
    pub question: String,
    pub answer: String,
    #[serde(default)]
    pub explanation: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum AssistantRequest {
    /// Answer a question asked mid-review, about the current card if any
    Explain { card: Option<Card>, query: String },
    ExplainCard { card: Card },
    GenerateDeck { topic: String, depth: String, count: u32 },
    GenerateDeckFromDocument { deck_name: String, text: String },
    /// Remediation cards for a weak point, grounded on optional context
    TargetedCards {
        card: Card,
        context: Option<String>,
        count: u32,
    },
    GenerateImage { prompt: String },
    AnalyzeImage { prompt: String, image: ImageAttachment },
    Transcribe { audio: Vec<u8>, mime_type: String },
    AnalyzeText {
        text: String,
        prompt: String,
        complexity: TextComplexity,
    },
}

impl AssistantRequest {
    pub fn kind(&self) -> &'static str {
        match self {
            AssistantRequest::Explain { .. } => "explain",
            AssistantRequest::ExplainCard { .. } => "explain-card",
            AssistantRequest::GenerateDeck { .. } => "generate-deck",
            AssistantRequest::GenerateDeckFromDocument { .. } => "generate-deck-from-document",
            AssistantRequest::TargetedCards { .. } => "targeted-cards",
            AssistantRequest::GenerateImage { .. } => "generate-image",
            AssistantRequest::AnalyzeImage { .. } => "analyze-image",
            AssistantRequest::Transcribe { .. } => "transcribe",
            AssistantRequest::AnalyzeText { .. } => "analyze-text",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum AssistantReply {
    Text(String),
    Cards(Vec<GeneratedCard>),
    /// Location or data URL of a generated image
    Image(String),
}

#[async_trait]
pub trait Assistant: Send + Sync {
    async fn complete(&self, request: AssistantRequest) -> Result<AssistantReply>;
}

/// Works without any network access. Explanations come from the card itself or
/// from the local knowledge base; every generative request fails.
#[derive(Debug, Clone, Default)]
pub struct OfflineAssistant {
    knowledge: KnowledgeBase,
}

impl OfflineAssistant {
    pub fn new(knowledge: KnowledgeBase) -> Self {
        Self { knowledge }
    }

    fn explain(&self, card: Option<&Card>, query: &str) -> Result<AssistantReply> {
        if let Some(explanation) = card.and_then(|c| c.explanation.as_deref()) {
            return Ok(AssistantReply::Text(explanation.to_string()));
        }
        let lookup = match card {
            Some(card) => format!("{} {} {}", query, card.question, card.answer),
            None => query.to_string(),
        };
        self.knowledge
            .find_relevant_chunk(&lookup)
            .map(|chunk| AssistantReply::Text(chunk.to_string()))
            .ok_or_else(|| Error::Assistant("no offline explanation available".into()))
    }
}

#[async_trait]
impl Assistant for OfflineAssistant {
    async fn complete(&self, request: AssistantRequest) -> Result<AssistantReply> {
        match &request {
            AssistantRequest::Explain { card, query } => self.explain(card.as_ref(), query),
            AssistantRequest::ExplainCard { card } => self.explain(Some(card), ""),
            other => Err(Error::Assistant(format!(
                "{} needs an online assistant",
                other.kind()
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn card(explanation: Option<&str>) -> Card {
        Card::new(
            "c1",
            "d1",
            "What is Anchoring Bias?",
            "Relying on the first number you hear",
            explanation.map(str::to_string),
            NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
        )
    }

    #[tokio::test]
    async fn test_offline_prefers_card_explanation() {
        let assistant = OfflineAssistant::default();
        let reply = assistant
            .complete(AssistantRequest::ExplainCard {
                card: card(Some("Stored explanation")),
            })
            .await
            .unwrap();

        assert_eq!(reply, AssistantReply::Text("Stored explanation".into()));
    }

    #[tokio::test]
    async fn test_offline_falls_back_to_knowledge_base() {
        let assistant = OfflineAssistant::default();
        let reply = assistant
            .complete(AssistantRequest::Explain {
                card: Some(card(None)),
                query: "why does the anchor matter".into(),
            })
            .await
            .unwrap();

        match reply {
            AssistantReply::Text(text) => assert!(text.starts_with("Anchoring Bias")),
            other => panic!("unexpected reply {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_offline_rejects_generation() {
        let assistant = OfflineAssistant::default();
        let result = assistant
            .complete(AssistantRequest::GenerateImage {
                prompt: "a cat".into(),
            })
            .await;

        assert!(matches!(result, Err(Error::Assistant(_))));
    }
}
