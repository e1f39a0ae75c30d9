//! JSON import/export module for decks.
//! Saves a deck with its cards (schedules included) and loads it back.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use chrono::NaiveDate;

use crate::database::CardStore;
use crate::error::Result;
use crate::models::{Card, Deck};

/// A deck and its cards as written to disk
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeckArchive {
    pub name: String,
    pub cards: Vec<Card>,
}

impl DeckArchive {
    pub fn new(deck: &Deck, cards: Vec<Card>) -> Self {
        Self {
            name: deck.name.clone(),
            cards,
        }
    }
}

/// Exports a deck to a JSON file at the specified path.
pub fn export_deck_json(deck: &Deck, cards: Vec<Card>, path: impl AsRef<Path>) -> Result<()> {
    let archive = DeckArchive::new(deck, cards);
    let json_string = serde_json::to_string_pretty(&archive)?;
    fs::write(path, json_string)?;
    Ok(())
}

/// Imports a deck archive from a JSON file.
/// Returns an error if the file doesn't exist or contains invalid JSON.
pub fn import_deck_json(path: impl AsRef<Path>) -> Result<DeckArchive> {
    let contents = fs::read_to_string(path.as_ref())?;
    let archive: DeckArchive = serde_json::from_str(&contents)?;
    log::info!(
        "Deck '{}' read from '{}'",
        archive.name,
        path.as_ref().display()
    );
    Ok(archive)
}

/// Saves an archive as a new deck. Cards get fresh ids but keep their schedule.
pub fn restore_deck(
    store: &mut impl CardStore,
    archive: &DeckArchive,
    today: NaiveDate,
) -> Result<Deck> {
    let deck = store.create_deck(&archive.name)?;
    for card in &archive.cards {
        let created = store.create_card(
            &deck.id,
            &card.question,
            &card.answer,
            card.explanation.as_deref(),
            today,
        )?;
        store.update_card(&Card {
            id: created.id,
            deck_id: deck.id.clone(),
            ..card.clone()
        })?;
    }
    Ok(deck)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::SqliteStore;
    use crate::models::CardState;

    fn create_test_deck() -> (Deck, Vec<Card>) {
        let today = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        let deck = Deck::new("d1", "Test Deck");
        let cards = vec![
            Card::new("c1", "d1", "hello", "cześć", None, today),
            Card::new("c2", "d1", "goodbye", "do widzenia", Some("formal".into()), today),
        ];
        (deck, cards)
    }

    #[test]
    fn test_export_and_import() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("deck.json");
        let (deck, cards) = create_test_deck();

        export_deck_json(&deck, cards.clone(), &path).unwrap();
        let imported = import_deck_json(&path).unwrap();

        assert_eq!(imported.name, "Test Deck");
        assert_eq!(imported.cards, cards);
    }

    #[test]
    fn test_import_hand_written_archive() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("deck.json");
        fs::write(
            &path,
            r#"{
  "name": "Import Test Deck",
  "cards": [
    {
      "id": "x",
      "deckId": "y",
      "question": "test term",
      "answer": "test definition",
      "dueDate": "2024-02-03",
      "stability": 4.04,
      "difficulty": 4.55,
      "lapses": 0,
      "reps": 1,
      "state": "REVIEW"
    }
  ]
}"#,
        )
        .unwrap();

        let archive = import_deck_json(&path).unwrap();
        assert_eq!(archive.cards.len(), 1);
        assert_eq!(archive.cards[0].question, "test term");
        assert_eq!(archive.cards[0].explanation, None);
    }

    #[test]
    fn test_restore_keeps_schedule() {
        let today = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        let (deck, mut cards) = create_test_deck();
        cards[1].state = CardState::Review;
        cards[1].reps = 4;
        cards[1].due_date = NaiveDate::from_ymd_opt(2024, 3, 1).unwrap();
        let archive = DeckArchive::new(&deck, cards);

        let mut store = SqliteStore::open_in_memory().unwrap();
        let restored = restore_deck(&mut store, &archive, today).unwrap();

        let saved = store.cards_for_deck(&restored.id).unwrap();
        assert_eq!(saved.len(), 2);
        assert_eq!(saved[1].reps, 4);
        assert_eq!(saved[1].state, CardState::Review);
        assert_eq!(saved[1].explanation.as_deref(), Some("formal"));
        assert_eq!(store.due_cards(&restored.id, today).unwrap().len(), 1);
    }

    #[test]
    fn test_import_nonexistent_file() {
        assert!(import_deck_json("nonexistent_file_xyz123.json").is_err());
    }

    #[test]
    fn test_import_invalid_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.json");
        fs::write(&path, "{ this is not valid json }").unwrap();

        assert!(import_deck_json(&path).is_err());
    }
}
