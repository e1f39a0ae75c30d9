//! Storage and goal-persistence collaborators.
//!
//! The session controller only talks to [`CardStore`]; [`db::SqliteStore`] is the
//! SQLite-backed implementation.

pub mod db;

use chrono::NaiveDate;

use crate::error::Result;
use crate::models::{Card, Deck, StudyGoal, StudyProgress};

pub use db::SqliteStore;

pub trait CardStore {
    fn decks(&self) -> Result<Vec<Deck>>;
    /// Case-insensitive lookup by deck name
    fn deck_by_name(&self, name: &str) -> Result<Option<Deck>>;
    fn create_deck(&mut self, name: &str) -> Result<Deck>;
    /// Deletes the deck and its cards. Returns false for an unknown deck.
    fn delete_deck(&mut self, deck_id: &str) -> Result<bool>;

    fn create_card(
        &mut self,
        deck_id: &str,
        question: &str,
        answer: &str,
        explanation: Option<&str>,
        today: NaiveDate,
    ) -> Result<Card>;
    fn update_card(&mut self, card: &Card) -> Result<()>;
    fn card(&self, card_id: &str) -> Result<Option<Card>>;
    fn cards_for_deck(&self, deck_id: &str) -> Result<Vec<Card>>;
    /// Cards with `due_date <= today`, oldest due date first
    fn due_cards(&self, deck_id: &str, today: NaiveDate) -> Result<Vec<Card>>;
    /// Card with the most lapses, ties broken by fewest reps
    fn weakest_card(&self, deck_id: &str) -> Result<Option<Card>>;
    /// Case-insensitive substring search over questions
    fn find_cards_by_question(&self, deck_id: &str, query: &str) -> Result<Vec<Card>>;

    /// Reads the persisted progress, resetting a stale daily counter first.
    fn study_progress(&mut self, today: NaiveDate) -> Result<Option<StudyProgress>>;
    fn set_study_goal(&mut self, goal: StudyGoal, today: NaiveDate) -> Result<StudyProgress>;
    /// Stores a new daily counter. Ignored unless the persisted goal is daily.
    fn update_study_progress(&mut self, progress: u32, today: NaiveDate) -> Result<()>;
}
