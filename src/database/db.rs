//! Database operations for the study assistant
//!
//! Handles SQLite database initialization, CRUD operations for decks and cards,
//! and persistence of the active study goal.

use chrono::NaiveDate;
use log::{debug, info};
use rusqlite::types::Type;
use rusqlite::{Connection, OptionalExtension, Row, params};
use std::path::Path;
use uuid::Uuid;

use super::CardStore;
use crate::error::Result;
use crate::models::{Card, CardState, Deck, GoalType, StudyGoal, StudyProgress};

const STUDY_PROGRESS_KEY: &str = "study_progress";

const CARD_COLUMNS: &str = "id, deck_id, question, answer, explanation, due_date, stability, difficulty, lapses, reps, state";

pub struct SqliteStore {
    conn: Connection,
}

impl SqliteStore {
    /// Opens (or creates) the database file and its tables
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let conn = Connection::open(path)?;
        Self::with_connection(conn)
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self> {
        let store = Self { conn };
        store.init_schema()?;
        Ok(store)
    }

    /// Creates tables for decks, cards, and app state
    fn init_schema(&self) -> Result<()> {
        self.conn.execute_batch(
            "PRAGMA foreign_keys = ON;

            CREATE TABLE IF NOT EXISTS decks (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS cards (
                id TEXT PRIMARY KEY,
                deck_id TEXT NOT NULL,
                question TEXT NOT NULL,
                answer TEXT NOT NULL,
                explanation TEXT,
                due_date TEXT NOT NULL,
                stability REAL NOT NULL DEFAULT 0,
                difficulty REAL NOT NULL DEFAULT 3,
                lapses INTEGER NOT NULL DEFAULT 0,
                reps INTEGER NOT NULL DEFAULT 0,
                state TEXT NOT NULL DEFAULT 'NEW',
                FOREIGN KEY (deck_id) REFERENCES decks(id) ON DELETE CASCADE
            );

            CREATE INDEX IF NOT EXISTS cards_by_deck_due ON cards(deck_id, due_date);

            CREATE TABLE IF NOT EXISTS app_state (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL
            );",
        )?;
        Ok(())
    }

    /// Creates the sample decks when the database holds no decks yet.
    /// Returns true if anything was inserted.
    pub fn seed_sample_decks(&mut self, today: NaiveDate) -> Result<bool> {
        if !self.decks()?.is_empty() {
            return Ok(false);
        }

        let capitals = self.create_deck("World Capitals")?;
        for (question, answer) in [
            ("What is the capital of Japan?", "Tokyo"),
            ("What is the capital of France?", "Paris"),
            ("What is the capital of Canada?", "Ottawa"),
            ("What is the capital of Australia?", "Canberra"),
            ("What is the capital of Brazil?", "Brasília"),
        ] {
            self.create_card(&capitals.id, question, answer, None, today)?;
        }

        let biases = self.create_deck("Cognitive Biases")?;
        for (question, answer, explanation) in [
            (
                "What is Confirmation Bias?",
                "Favoring information that confirms preexisting beliefs.",
                "The tendency to search for, interpret, favor, and recall information that supports what one already believes.",
            ),
            (
                "What is the Availability Heuristic?",
                "Overestimating the likelihood of events that are more easily recalled.",
                "A mental shortcut that relies on the examples that come to mind first when judging a topic.",
            ),
            (
                "What is the Dunning-Kruger Effect?",
                "When people with low ability at a task overestimate their ability.",
                "Low performers overrate themselves while experts tend to underrate their own skill.",
            ),
            (
                "What is Survivorship Bias?",
                "Focusing on \"survivors\" and ignoring failures, leading to skewed conclusions.",
                "Concentrating on what made it through a selection process and overlooking what did not.",
            ),
        ] {
            let card = self.create_card(&biases.id, question, answer, Some(explanation), today)?;
            self.conn.execute(
                "UPDATE cards SET difficulty = 5 WHERE id = ?1",
                params![card.id],
            )?;
        }

        info!("Seeded sample decks");
        Ok(true)
    }

    fn query_cards(&self, sql: &str, params: impl rusqlite::Params) -> Result<Vec<Card>> {
        let mut stmt = self.conn.prepare(sql)?;
        let cards = stmt
            .query_map(params, row_to_card)?
            .collect::<rusqlite::Result<Vec<Card>>>()?;
        Ok(cards)
    }

    fn save_progress(&self, progress: &StudyProgress) -> Result<()> {
        let json = serde_json::to_string(progress)?;
        self.conn.execute(
            "INSERT INTO app_state (key, value) VALUES (?1, ?2)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
            params![STUDY_PROGRESS_KEY, json],
        )?;
        Ok(())
    }

    fn load_progress(&self) -> Result<Option<StudyProgress>> {
        let value: Option<String> = self
            .conn
            .query_row(
                "SELECT value FROM app_state WHERE key = ?1",
                params![STUDY_PROGRESS_KEY],
                |row| row.get(0),
            )
            .optional()?;

        match value {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }
}

fn row_to_card(row: &Row<'_>) -> rusqlite::Result<Card> {
    let state: String = row.get(10)?;
    let state = state.parse::<CardState>().map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(10, Type::Text, e.into())
    })?;

    Ok(Card {
        id: row.get(0)?,
        deck_id: row.get(1)?,
        question: row.get(2)?,
        answer: row.get(3)?,
        explanation: row.get(4)?,
        due_date: row.get(5)?,
        stability: row.get(6)?,
        difficulty: row.get(7)?,
        lapses: row.get(8)?,
        reps: row.get(9)?,
        state,
    })
}

impl CardStore for SqliteStore {
    fn decks(&self) -> Result<Vec<Deck>> {
        let mut stmt = self
            .conn
            .prepare("SELECT id, name FROM decks ORDER BY rowid")?;
        let decks = stmt
            .query_map([], |row| Ok(Deck::new(row.get::<_, String>(0)?, row.get::<_, String>(1)?)))?
            .collect::<rusqlite::Result<Vec<Deck>>>()?;
        Ok(decks)
    }

    fn deck_by_name(&self, name: &str) -> Result<Option<Deck>> {
        Ok(self.decks()?.into_iter().find(|d| d.matches_name(name)))
    }

    fn create_deck(&mut self, name: &str) -> Result<Deck> {
        let deck = Deck::new(Uuid::new_v4().to_string(), name.trim());
        self.conn.execute(
            "INSERT INTO decks (id, name) VALUES (?1, ?2)",
            params![deck.id, deck.name],
        )?;
        debug!("Deck '{}' created", deck.name);
        Ok(deck)
    }

    fn delete_deck(&mut self, deck_id: &str) -> Result<bool> {
        let tx = self.conn.transaction()?;
        tx.execute("DELETE FROM cards WHERE deck_id = ?1", params![deck_id])?;
        let removed = tx.execute("DELETE FROM decks WHERE id = ?1", params![deck_id])?;
        tx.commit()?;
        Ok(removed > 0)
    }

    fn create_card(
        &mut self,
        deck_id: &str,
        question: &str,
        answer: &str,
        explanation: Option<&str>,
        today: NaiveDate,
    ) -> Result<Card> {
        let card = Card::new(
            Uuid::new_v4().to_string(),
            deck_id,
            question,
            answer,
            explanation.map(str::to_string),
            today,
        );
        self.conn.execute(
            "INSERT INTO cards (id, deck_id, question, answer, explanation, due_date, stability, difficulty, lapses, reps, state)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
            params![
                card.id,
                card.deck_id,
                card.question,
                card.answer,
                card.explanation,
                card.due_date,
                card.stability,
                card.difficulty,
                card.lapses,
                card.reps,
                card.state.as_str(),
            ],
        )?;
        Ok(card)
    }

    fn update_card(&mut self, card: &Card) -> Result<()> {
        self.conn.execute(
            "UPDATE cards
             SET question = ?1, answer = ?2, explanation = ?3, due_date = ?4, stability = ?5,
                 difficulty = ?6, lapses = ?7, reps = ?8, state = ?9
             WHERE id = ?10",
            params![
                card.question,
                card.answer,
                card.explanation,
                card.due_date,
                card.stability,
                card.difficulty,
                card.lapses,
                card.reps,
                card.state.as_str(),
                card.id,
            ],
        )?;
        Ok(())
    }

    fn card(&self, card_id: &str) -> Result<Option<Card>> {
        let sql = format!("SELECT {CARD_COLUMNS} FROM cards WHERE id = ?1");
        Ok(self.query_cards(&sql, params![card_id])?.into_iter().next())
    }

    fn cards_for_deck(&self, deck_id: &str) -> Result<Vec<Card>> {
        let sql = format!("SELECT {CARD_COLUMNS} FROM cards WHERE deck_id = ?1 ORDER BY rowid");
        self.query_cards(&sql, params![deck_id])
    }

    fn due_cards(&self, deck_id: &str, today: NaiveDate) -> Result<Vec<Card>> {
        let sql = format!(
            "SELECT {CARD_COLUMNS} FROM cards
             WHERE deck_id = ?1 AND due_date <= ?2
             ORDER BY due_date ASC, rowid ASC"
        );
        self.query_cards(&sql, params![deck_id, today])
    }

    fn weakest_card(&self, deck_id: &str) -> Result<Option<Card>> {
        let sql = format!(
            "SELECT {CARD_COLUMNS} FROM cards
             WHERE deck_id = ?1
             ORDER BY lapses DESC, reps ASC, rowid ASC
             LIMIT 1"
        );
        Ok(self.query_cards(&sql, params![deck_id])?.into_iter().next())
    }

    fn find_cards_by_question(&self, deck_id: &str, query: &str) -> Result<Vec<Card>> {
        // SQLite's lower() only folds ASCII, so match in Rust
        let query = query.to_lowercase();
        Ok(self
            .cards_for_deck(deck_id)?
            .into_iter()
            .filter(|card| card.question.to_lowercase().contains(&query))
            .collect())
    }

    fn study_progress(&mut self, today: NaiveDate) -> Result<Option<StudyProgress>> {
        let Some(mut progress) = self.load_progress()? else {
            return Ok(None);
        };
        if progress.roll_over(today) {
            debug!("Daily progress reset for {}", today);
            self.save_progress(&progress)?;
        }
        Ok(Some(progress))
    }

    fn set_study_goal(&mut self, goal: StudyGoal, today: NaiveDate) -> Result<StudyProgress> {
        let progress = StudyProgress::new(goal, today);
        self.save_progress(&progress)?;
        Ok(progress)
    }

    fn update_study_progress(&mut self, progress: u32, today: NaiveDate) -> Result<()> {
        if let Some(mut current) = self.study_progress(today)? {
            if current.goal.goal_type == GoalType::Daily {
                current.progress = progress;
                current.date = today;
                self.save_progress(&current)?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 5, d).unwrap()
    }

    fn store_with_deck() -> (SqliteStore, Deck) {
        let mut store = SqliteStore::open_in_memory().unwrap();
        let deck = store.create_deck("Spanish").unwrap();
        (store, deck)
    }

    #[test]
    fn test_create_and_load_card() {
        let (mut store, deck) = store_with_deck();
        let card = store
            .create_card(&deck.id, "perro", "dog", Some("noun"), day(1))
            .unwrap();

        let loaded = store.card(&card.id).unwrap().unwrap();
        assert_eq!(loaded, card);
        assert_eq!(loaded.state, CardState::New);
        assert_eq!(loaded.explanation.as_deref(), Some("noun"));
    }

    #[test]
    fn test_due_cards_filtered_and_sorted() {
        let (mut store, deck) = store_with_deck();
        let mut late = store.create_card(&deck.id, "a", "1", None, day(1)).unwrap();
        let mut early = store.create_card(&deck.id, "b", "2", None, day(1)).unwrap();
        let mut future = store.create_card(&deck.id, "c", "3", None, day(1)).unwrap();

        late.due_date = day(5);
        early.due_date = day(2);
        future.due_date = day(20);
        for card in [&late, &early, &future] {
            store.update_card(card).unwrap();
        }

        let due: Vec<String> = store
            .due_cards(&deck.id, day(10))
            .unwrap()
            .into_iter()
            .map(|c| c.question)
            .collect();
        assert_eq!(due, vec!["b", "a"]);
    }

    #[test]
    fn test_weakest_card_prefers_lapses_then_fewer_reps() {
        let (mut store, deck) = store_with_deck();
        let mut a = store.create_card(&deck.id, "a", "1", None, day(1)).unwrap();
        let mut b = store.create_card(&deck.id, "b", "2", None, day(1)).unwrap();
        let mut c = store.create_card(&deck.id, "c", "3", None, day(1)).unwrap();

        a.lapses = 2;
        a.reps = 7;
        b.lapses = 2;
        b.reps = 3;
        c.lapses = 1;
        for card in [&a, &b, &c] {
            store.update_card(card).unwrap();
        }

        assert_eq!(store.weakest_card(&deck.id).unwrap().unwrap().question, "b");
        assert!(store.weakest_card("missing").unwrap().is_none());
    }

    #[test]
    fn test_find_cards_by_question_ignores_case() {
        let (mut store, deck) = store_with_deck();
        store
            .create_card(&deck.id, "¿Dónde está ÁFRICA?", "there", None, day(1))
            .unwrap();
        store.create_card(&deck.id, "Other", "x", None, day(1)).unwrap();

        let found = store.find_cards_by_question(&deck.id, "áfrica").unwrap();
        assert_eq!(found.len(), 1);
        assert!(store.find_cards_by_question(&deck.id, "zzz").unwrap().is_empty());
    }

    #[test]
    fn test_delete_deck_removes_cards() {
        let (mut store, deck) = store_with_deck();
        let card = store.create_card(&deck.id, "q", "a", None, day(1)).unwrap();

        assert!(store.delete_deck(&deck.id).unwrap());
        assert!(store.card(&card.id).unwrap().is_none());
        assert!(store.deck_by_name("spanish").unwrap().is_none());
        assert!(!store.delete_deck(&deck.id).unwrap());
    }

    #[test]
    fn test_daily_progress_rolls_over_lazily() {
        let mut store = SqliteStore::open_in_memory().unwrap();
        assert!(store.study_progress(day(1)).unwrap().is_none());

        store
            .set_study_goal(StudyGoal::new(GoalType::Daily, 10), day(1))
            .unwrap();
        store.update_study_progress(4, day(1)).unwrap();
        assert_eq!(store.study_progress(day(1)).unwrap().unwrap().progress, 4);

        let next_day = store.study_progress(day(2)).unwrap().unwrap();
        assert_eq!(next_day.progress, 0);
        assert_eq!(next_day.date, day(2));
    }

    #[test]
    fn test_session_goal_progress_is_not_updated() {
        let mut store = SqliteStore::open_in_memory().unwrap();
        store
            .set_study_goal(StudyGoal::new(GoalType::Session, 5), day(1))
            .unwrap();
        store.update_study_progress(3, day(1)).unwrap();

        assert_eq!(store.study_progress(day(1)).unwrap().unwrap().progress, 0);
    }

    #[test]
    fn test_seed_only_once() {
        let mut store = SqliteStore::open_in_memory().unwrap();

        assert!(store.seed_sample_decks(day(1)).unwrap());
        assert!(!store.seed_sample_decks(day(1)).unwrap());
        assert_eq!(store.decks().unwrap().len(), 2);

        let biases = store.deck_by_name("cognitive biases").unwrap().unwrap();
        let cards = store.cards_for_deck(&biases.id).unwrap();
        assert_eq!(cards.len(), 4);
        assert!(cards.iter().all(|c| c.difficulty == 5.0));
    }
}
