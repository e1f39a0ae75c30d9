//! Card is a question/answer pair carrying its spaced repetition schedule.
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Position of a card in the learning process
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CardState {
    New,
    Learning,
    Review,
    Relearning,
}

impl CardState {
    pub fn as_str(&self) -> &'static str {
        match self {
            CardState::New => "NEW",
            CardState::Learning => "LEARNING",
            CardState::Review => "REVIEW",
            CardState::Relearning => "RELEARNING",
        }
    }
}

impl fmt::Display for CardState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CardState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "NEW" => Ok(CardState::New),
            "LEARNING" => Ok(CardState::Learning),
            "REVIEW" => Ok(CardState::Review),
            "RELEARNING" => Ok(CardState::Relearning),
            other => Err(format!("unknown card state '{other}'")),
        }
    }
}

/// Self-assessment given after the answer is revealed
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Rating {
    Again = 1,
    Hard = 2,
    Good = 3,
    Easy = 4,
}

impl Rating {
    pub const ALL: [Rating; 4] = [Rating::Again, Rating::Hard, Rating::Good, Rating::Easy];

    pub fn value(self) -> u8 {
        self as u8
    }

    /// Ratings that count as a successful recall
    pub fn is_pass(self) -> bool {
        matches!(self, Rating::Good | Rating::Easy)
    }
}

impl FromStr for Rating {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "AGAIN" | "1" => Ok(Rating::Again),
            "HARD" | "2" => Ok(Rating::Hard),
            "GOOD" | "3" => Ok(Rating::Good),
            "EASY" | "4" => Ok(Rating::Easy),
            other => Err(format!("unknown rating '{other}'")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Card {
    pub id: String,
    pub deck_id: String,
    pub question: String,
    pub answer: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub explanation: Option<String>,
    pub due_date: NaiveDate,
    pub stability: f64,
    pub difficulty: f64,
    pub lapses: u32,
    pub reps: u32,
    pub state: CardState,
}

impl Card {
    pub const INITIAL_DIFFICULTY: f64 = 3.0;

    /// Creates a card that has never been reviewed and is due on `today`.
    pub fn new(
        id: impl Into<String>,
        deck_id: impl Into<String>,
        question: impl Into<String>,
        answer: impl Into<String>,
        explanation: Option<String>,
        today: NaiveDate,
    ) -> Self {
        Self {
            id: id.into(),
            deck_id: deck_id.into(),
            question: question.into(),
            answer: answer.into(),
            explanation,
            due_date: today,
            stability: 0.0,
            difficulty: Self::INITIAL_DIFFICULTY,
            lapses: 0,
            reps: 0,
            state: CardState::New,
        }
    }

    pub fn is_due(&self, today: NaiveDate) -> bool {
        self.due_date <= today
    }
}
