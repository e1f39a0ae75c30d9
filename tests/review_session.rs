use chrono::NaiveDate;
use serde_json::{Value, json};
use std::sync::Arc;

use echo_cards::clock::{Clock, FixedClock};
use echo_cards::database::{CardStore, SqliteStore};
use echo_cards::models::CardState;
use echo_cards::session::{CommandCall, Effect, Event, SessionController, SessionState};

fn start(store: SqliteStore, clock: Arc<FixedClock>) -> SessionController<SqliteStore> {
    let mut controller = SessionController::new(store, clock);
    controller.on_event(Event::SessionOpened);
    controller
}

fn send(controller: &mut SessionController<SqliteStore>, name: &str, args: Value) -> Vec<Effect> {
    controller.handle(CommandCall::new(name, name, args))
}

/// Reviews every due card in the deck with the same rating and returns how many there were.
fn review_all(controller: &mut SessionController<SqliteStore>, deck: &str, rating: &str) -> usize {
    send(controller, "startReview", json!({ "deckName": deck }));
    let mut reviewed = 0;
    while controller.state() == SessionState::AwaitingAnswerReveal {
        send(controller, "showAnswer", json!({}));
        send(controller, "rateCard", json!({ "rating": rating }));
        reviewed += 1;
    }
    reviewed
}

fn achievements(effects: &[Effect]) -> usize {
    effects
        .iter()
        .filter(|e| matches!(e, Effect::Achievement(_)))
        .count()
}

#[test]
fn test_cards_come_back_when_due() {
    let clock = Arc::new(FixedClock::on(NaiveDate::from_ymd_opt(2024, 4, 1).unwrap()));
    let mut store = SqliteStore::open_in_memory().unwrap();
    store.seed_sample_decks(clock.today()).unwrap();
    let mut controller = start(store, clock.clone());

    assert_eq!(review_all(&mut controller, "World Capitals", "AGAIN"), 5);
    assert_eq!(controller.state(), SessionState::AwaitingCommand);

    // Failed new cards are in learning and due again tomorrow
    assert_eq!(review_all(&mut controller, "World Capitals", "GOOD"), 0);
    clock.advance_day();
    assert_eq!(review_all(&mut controller, "World Capitals", "GOOD"), 5);

    let deck = controller
        .store()
        .deck_by_name("World Capitals")
        .unwrap()
        .unwrap();
    for card in controller.store().cards_for_deck(&deck.id).unwrap() {
        assert_eq!(card.state, CardState::Review);
        assert!(card.due_date > clock.today());
        assert!(card.stability >= 1.0);
    }
}

#[test]
fn test_daily_goal_survives_restart() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("study.sqlite3");
    let clock = Arc::new(FixedClock::on(NaiveDate::from_ymd_opt(2024, 4, 1).unwrap()));

    let mut store = SqliteStore::open(&path).unwrap();
    store.seed_sample_decks(clock.today()).unwrap();
    let mut controller = start(store, clock.clone());
    send(
        &mut controller,
        "setStudyGoal",
        json!({ "target": 7, "goalType": "daily" }),
    );
    assert_eq!(review_all(&mut controller, "World Capitals", "EASY"), 5);
    drop(controller);

    // A new process picks up the goal and today's count
    let mut controller = start(SqliteStore::open(&path).unwrap(), clock.clone());
    send(&mut controller, "startReview", json!({ "deckName": "Cognitive Biases" }));

    let mut fired = Vec::new();
    for _ in 0..4 {
        send(&mut controller, "showAnswer", json!({}));
        let effects = send(&mut controller, "rateCard", json!({ "rating": "GOOD" }));
        fired.push(achievements(&effects));
    }
    assert_eq!(fired, vec![0, 1, 0, 0]);

    // Progress restarts the next day
    clock.advance_day();
    let mut store = SqliteStore::open(&path).unwrap();
    let progress = store.study_progress(clock.today()).unwrap().unwrap();
    assert_eq!(progress.progress, 0);
    assert_eq!(progress.goal.target, 7);
}

#[test]
fn test_conversation_during_review() {
    let clock = Arc::new(FixedClock::on(NaiveDate::from_ymd_opt(2024, 4, 1).unwrap()));
    let mut store = SqliteStore::open_in_memory().unwrap();
    store.seed_sample_decks(clock.today()).unwrap();
    let mut controller = start(store, clock);

    send(&mut controller, "startReview", json!({ "deckName": "Cognitive Biases" }));
    let effects = send(
        &mut controller,
        "startConversation",
        json!({ "query": "Give me an example" }),
    );
    assert!(effects.iter().any(|e| matches!(e, Effect::Assistant { .. })));

    // Review commands keep their guards while the conversation is open
    send(&mut controller, "showAnswer", json!({}));
    assert_eq!(controller.state(), SessionState::Conversation);

    send(&mut controller, "goBack", json!({}));
    assert_eq!(controller.state(), SessionState::AwaitingCommand);
    assert_eq!(controller.pending_requests(), 0);
}
