//! Commands delivered to the session by the conversational agent or the UI.
//!
//! The agent sends a command name plus a JSON argument bag. [`Command::parse`]
//! turns that into the closed [`Command`] type, so every handler is reached
//! through an exhaustive match.

use serde::Deserialize;
use serde_json::{Map, Value};

use super::assistant::{ImageAttachment, TextComplexity};
use crate::error::{Error, Result};
use crate::models::{GoalType, Rating};

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "name", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum Command {
    StartReview {
        deck_name: String,
    },
    ShowAnswer,
    RateCard {
        rating: Rating,
    },
    StartConversation {
        query: String,
    },
    SetStudyGoal {
        target: u32,
        goal_type: GoalType,
    },
    CreateDeck {
        deck_name: String,
    },
    DeleteDeck {
        deck_name: String,
    },
    ListDecks,
    ShowDecks,
    CreateCard {
        deck_name: String,
        question: String,
        answer: String,
        #[serde(default)]
        explanation: Option<String>,
    },
    FindCardToEdit {
        deck_name: String,
        question_query: String,
    },
    UpdateCardContent {
        #[serde(default)]
        new_question: Option<String>,
        #[serde(default)]
        new_answer: Option<String>,
        #[serde(default)]
        new_explanation: Option<String>,
    },
    GoBack,
    ShowImportView,
    ImportDeck {
        deck_name: String,
        csv_content: String,
    },
    ShowSmartGenerationView,
    GenerateDeckFromForm {
        topic: String,
        #[serde(default = "default_depth")]
        depth: String,
        number_of_cards: u32,
    },
    GenerateDeckFromDocument {
        deck_name: String,
        document_text: String,
    },
    ShowCardStats {
        deck_name: String,
        question_query: String,
    },
    ExplainCard,
    GenerateCardsFromWeakness {
        deck_name: String,
    },
    ShowImageGenerationView,
    GenerateImage {
        prompt: String,
    },
    ShowImageAnalysisView,
    AttachImage {
        image: ImageAttachment,
    },
    AnalyzeImage {
        prompt: String,
    },
    ShowTranscriptionView,
    StartRecording,
    StopRecording,
    ShowTextAnalysisView,
    AnalyzeText {
        text: String,
        prompt: String,
        #[serde(default)]
        complexity: TextComplexity,
    },
}

fn default_depth() -> String {
    "intermediate".to_string()
}

impl Command {
    /// Builds a command from its name and argument bag.
    pub fn parse(name: &str, args: &Value) -> Result<Command> {
        let mut fields = match args {
            Value::Object(map) => map.clone(),
            Value::Null => Map::new(),
            other => {
                return Err(Error::InvalidCommand(format!(
                    "{name}: arguments must be an object, got {other}"
                )));
            }
        };
        fields.insert("name".to_string(), Value::String(name.to_string()));

        let command: Command = serde_json::from_value(Value::Object(fields))
            .map_err(|e| Error::InvalidCommand(format!("{name}: {e}")))?;
        command.validate()?;
        Ok(command)
    }

    fn validate(&self) -> Result<()> {
        match self {
            Command::SetStudyGoal { target: 0, .. } => Err(Error::InvalidCommand(
                "setStudyGoal: target must be positive".into(),
            )),
            Command::GenerateDeckFromForm {
                number_of_cards: 0, ..
            } => Err(Error::InvalidCommand(
                "generateDeckFromForm: numberOfCards must be positive".into(),
            )),
            Command::StartReview { deck_name }
            | Command::CreateDeck { deck_name }
            | Command::DeleteDeck { deck_name }
            | Command::ImportDeck { deck_name, .. }
            | Command::GenerateDeckFromDocument { deck_name, .. }
                if deck_name.trim().is_empty() =>
            {
                Err(Error::InvalidCommand(format!(
                    "{}: deckName must not be empty",
                    self.name()
                )))
            }
            _ => Ok(()),
        }
    }

    /// Wire name of the command
    pub fn name(&self) -> &'static str {
        match self {
            Command::StartReview { .. } => "startReview",
            Command::ShowAnswer => "showAnswer",
            Command::RateCard { .. } => "rateCard",
            Command::StartConversation { .. } => "startConversation",
            Command::SetStudyGoal { .. } => "setStudyGoal",
            Command::CreateDeck { .. } => "createDeck",
            Command::DeleteDeck { .. } => "deleteDeck",
            Command::ListDecks => "listDecks",
            Command::ShowDecks => "showDecks",
            Command::CreateCard { .. } => "createCard",
            Command::FindCardToEdit { .. } => "findCardToEdit",
            Command::UpdateCardContent { .. } => "updateCardContent",
            Command::GoBack => "goBack",
            Command::ShowImportView => "showImportView",
            Command::ImportDeck { .. } => "importDeck",
            Command::ShowSmartGenerationView => "showSmartGenerationView",
            Command::GenerateDeckFromForm { .. } => "generateDeckFromForm",
            Command::GenerateDeckFromDocument { .. } => "generateDeckFromDocument",
            Command::ShowCardStats { .. } => "showCardStats",
            Command::ExplainCard => "explainCard",
            Command::GenerateCardsFromWeakness { .. } => "generateCardsFromWeakness",
            Command::ShowImageGenerationView => "showImageGenerationView",
            Command::GenerateImage { .. } => "generateImage",
            Command::ShowImageAnalysisView => "showImageAnalysisView",
            Command::AttachImage { .. } => "attachImage",
            Command::AnalyzeImage { .. } => "analyzeImage",
            Command::ShowTranscriptionView => "showTranscriptionView",
            Command::StartRecording => "startRecording",
            Command::StopRecording => "stopRecording",
            Command::ShowTextAnalysisView => "showTextAnalysisView",
            Command::AnalyzeText { .. } => "analyzeText",
        }
    }
}

/// A named command as received from the command source, before parsing
#[derive(Debug, Clone, PartialEq)]
pub struct CommandCall {
    pub id: String,
    pub name: String,
    pub args: Value,
}

impl CommandCall {
    pub fn new(id: impl Into<String>, name: impl Into<String>, args: Value) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            args,
        }
    }
}
