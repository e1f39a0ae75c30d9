pub mod card;
pub mod deck;
pub mod fsrs;
pub mod goal;
pub mod transcript;

pub use card::{Card, CardState, Rating};
pub use deck::Deck;
pub use goal::{GoalType, StudyGoal, StudyProgress};
pub use transcript::{Speaker, TranscriptMessage};
