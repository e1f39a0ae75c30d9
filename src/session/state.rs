//! Session states and the prompts used when a conversation hands control back.
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SessionState {
    #[default]
    Idle,
    AwaitingCommand,
    ReadingQuestion,
    AwaitingAnswerReveal,
    ReadingAnswer,
    AwaitingRating,
    Processing,
    Conversation,
    EditingCard,
    ShowingDecks,
    ImportingDeck,
    ShowingCardStats,
    GeneratingImage,
    AnalyzingImage,
    TranscribingAudio,
    SmartGeneration,
    AnalyzingText,
    Error,
}

impl SessionState {
    pub const ALL: [SessionState; 18] = [
        SessionState::Idle,
        SessionState::AwaitingCommand,
        SessionState::ReadingQuestion,
        SessionState::AwaitingAnswerReveal,
        SessionState::ReadingAnswer,
        SessionState::AwaitingRating,
        SessionState::Processing,
        SessionState::Conversation,
        SessionState::EditingCard,
        SessionState::ShowingDecks,
        SessionState::ImportingDeck,
        SessionState::ShowingCardStats,
        SessionState::GeneratingImage,
        SessionState::AnalyzingImage,
        SessionState::TranscribingAudio,
        SessionState::SmartGeneration,
        SessionState::AnalyzingText,
        SessionState::Error,
    ];

    /// States that replace the card view with another screen
    pub fn is_secondary_view(self) -> bool {
        matches!(
            self,
            SessionState::EditingCard
                | SessionState::ShowingDecks
                | SessionState::ImportingDeck
                | SessionState::ShowingCardStats
                | SessionState::GeneratingImage
                | SessionState::AnalyzingImage
                | SessionState::TranscribingAudio
                | SessionState::SmartGeneration
                | SessionState::AnalyzingText
        )
    }

    /// States a conversational question may interrupt
    pub fn allows_conversation(self) -> bool {
        matches!(
            self,
            SessionState::AwaitingCommand
                | SessionState::ReadingQuestion
                | SessionState::AwaitingAnswerReveal
                | SessionState::ReadingAnswer
                | SessionState::AwaitingRating
                | SessionState::Conversation
                | SessionState::Error
        )
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = serde_json::to_value(self)
            .ok()
            .and_then(|v| v.as_str().map(str::to_string))
            .unwrap_or_else(|| format!("{:?}", self));
        f.write_str(&text)
    }
}

/// Prompt shown when a conversation ends and `restored` becomes current again.
pub fn resume_prompt(restored: SessionState) -> &'static str {
    match restored {
        SessionState::AwaitingRating => "Okay, let's continue. How did you do on the card?",
        SessionState::AwaitingAnswerReveal => {
            "Alright, back to it. Say 'Show Answer' when you're ready."
        }
        SessionState::AwaitingCommand => "Hope that helped! What's next?",
        _ => "Let's continue.",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_uses_wire_names() {
        assert_eq!(SessionState::AwaitingRating.to_string(), "AWAITING_RATING");
        assert_eq!(SessionState::Idle.to_string(), "IDLE");
    }

    #[test]
    fn test_secondary_views_never_allow_conversation() {
        for state in SessionState::ALL {
            if state.is_secondary_view() {
                assert!(!state.allows_conversation(), "{state}");
            }
        }
        assert!(!SessionState::Processing.allows_conversation());
        assert!(SessionState::AwaitingRating.allows_conversation());
    }

    #[test]
    fn test_resume_prompts() {
        assert_eq!(
            resume_prompt(SessionState::AwaitingRating),
            "Okay, let's continue. How did you do on the card?"
        );
        assert_eq!(resume_prompt(SessionState::ReadingAnswer), "Let's continue.");
    }
}
