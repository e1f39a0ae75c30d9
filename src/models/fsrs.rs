//! FSRS-style spaced repetition scheduler.
//!
//! Each card carries a memory model made of two parameters:
//! - stability: roughly the number of days until recall probability decays to 90%
//! - difficulty: intrinsic hardness of the item, kept within [1, 10]
//!
//! The scheduler is a pure function of (card, rating, now). Elapsed time since the
//! last review is not tracked, so every review is treated as on time and the
//! retrievability estimate is the constant [`ON_TIME_RETRIEVABILITY`].
//! All due dates are whole calendar days.

use chrono::{Days, NaiveDate, NaiveDateTime};

use super::{Card, CardState, Rating};

/// Default FSRS-4.5 weights.
/// - w[0..4]: initial stability for Again, Hard, Good, Easy
/// - w[4], w[5]: initial difficulty and its slope for new cards
/// - w[6]: difficulty change per rating step
/// - w[8..11]: stability growth after a successful recall
/// - w[11..15]: stability after a lapse
/// - w[15]: Hard multiplier in the reference weights, unused here (see [`HARD_PENALTY`])
/// - w[16]: Easy multiplier
pub const W: [f64; 17] = [
    0.89, 1.37, 4.04, 9.48, 4.55, 0.48, 0.9, 0.0, 1.62, 0.1, 0.95, 1.95, 0.21, 0.89, 0.04, 1.28,
    2.99,
];

pub const MIN_DIFFICULTY: f64 = 1.0;
pub const MAX_DIFFICULTY: f64 = 10.0;
pub const MIN_STABILITY: f64 = 1.0;

/// Applied to the recalled stability on a Hard rating. Kept below one so a
/// Hard answer never schedules further out than a Good one.
pub const HARD_PENALTY: f64 = 0.8;

/// exp(ln(0.9) * t / S) with t == S.
pub const ON_TIME_RETRIEVABILITY: f64 = 0.9;

/// Initial stability for a card seen for the first time.
pub fn initial_stability(rating: Rating) -> f64 {
    W[rating.value() as usize - 1]
}

fn clamp_difficulty(difficulty: f64) -> f64 {
    difficulty.clamp(MIN_DIFFICULTY, MAX_DIFFICULTY)
}

fn rating_offset(rating: Rating) -> f64 {
    rating.value() as f64 - 3.0
}

/// `today + round(days)`, saturating at the last representable date.
pub fn add_days(today: NaiveDate, days: f64) -> NaiveDate {
    let days = days.round().max(0.0) as u64;
    today
        .checked_add_days(Days::new(days))
        .unwrap_or(NaiveDate::MAX)
}

/// Stability after forgetting a card in review.
fn stability_after_lapse(difficulty: f64, stability: f64, retrievability: f64) -> f64 {
    W[11]
        * difficulty.powf(-W[12])
        * ((stability + 1.0).powf(W[13]) - 1.0)
        * ((1.0 - retrievability) * W[14]).exp()
}

/// Stability after a Good recall. Never below the prior stability.
fn stability_after_recall(difficulty: f64, stability: f64, retrievability: f64) -> f64 {
    stability
        * (1.0
            + W[8].exp()
                * (11.0 - difficulty)
                * stability.powf(-W[9])
                * (((1.0 - retrievability) * W[10]).exp() - 1.0))
}

/// Computes the card's next schedule after it was rated at `now`.
pub fn calculate_next_review(card: &Card, rating: Rating, now: NaiveDateTime) -> Card {
    let today = now.date();

    match card.state {
        CardState::New => schedule_new(card, rating, today),
        CardState::Learning | CardState::Relearning => {
            if rating.is_pass() {
                // Graduates with its current stability and difficulty
                schedule_review(card, rating, today, ON_TIME_RETRIEVABILITY)
            } else {
                Card {
                    due_date: add_days(today, 1.0),
                    ..card.clone()
                }
            }
        }
        CardState::Review => schedule_review(card, rating, today, ON_TIME_RETRIEVABILITY),
    }
}

fn schedule_new(card: &Card, rating: Rating, today: NaiveDate) -> Card {
    let stability = initial_stability(rating);
    let (state, due_date) = if rating.is_pass() {
        (CardState::Review, add_days(today, stability))
    } else {
        (CardState::Learning, add_days(today, 1.0))
    };

    Card {
        reps: 1,
        lapses: 0,
        difficulty: clamp_difficulty(W[4] - W[5] * rating_offset(rating)),
        stability,
        state,
        due_date,
        ..card.clone()
    }
}

fn schedule_review(card: &Card, rating: Rating, today: NaiveDate, retrievability: f64) -> Card {
    let mut next = card.clone();

    if rating == Rating::Again {
        next.lapses += 1;
        next.state = CardState::Relearning;
        next.stability =
            stability_after_lapse(card.difficulty, card.stability, retrievability).max(MIN_STABILITY);
        next.due_date = add_days(today, 1.0);
        return next;
    }

    next.reps += 1;
    next.state = CardState::Review;
    next.difficulty = clamp_difficulty(card.difficulty - W[6] * rating_offset(rating));

    let mut stability = stability_after_recall(next.difficulty, card.stability, retrievability);
    match rating {
        Rating::Hard => stability *= HARD_PENALTY,
        Rating::Easy => stability *= W[16],
        _ => {}
    }
    // f64::max discards NaN, which a zero prior stability would produce
    next.stability = stability.max(MIN_STABILITY);
    next.due_date = add_days(today, next.stability);
    next
}

/// Interval in days each rating would give, in Again, Hard, Good, Easy order.
pub fn preview_intervals(card: &Card, now: NaiveDateTime) -> [i64; 4] {
    let today = now.date();
    Rating::ALL.map(|rating| {
        let next = calculate_next_review(card, rating, now);
        (next.due_date - today).num_days()
    })
}

/// Format an interval in days to a short human-readable string
pub fn format_interval(days: i64) -> String {
    if days <= 0 {
        "now".to_string()
    } else if days < 7 {
        format!("{}d", days)
    } else if days < 30 {
        format!("{}w", days / 7)
    } else if days < 365 {
        format!("{}mo", days / 30)
    } else {
        format!("{}y", days / 365)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn at(y: i32, m: u32, d: u32, h: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, m, d)
            .unwrap()
            .and_hms_opt(h, 30, 0)
            .unwrap()
    }

    fn day(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn new_card() -> Card {
        Card::new("c1", "d1", "q", "a", None, day(2024, 1, 1))
    }

    fn review_card(stability: f64, difficulty: f64) -> Card {
        Card {
            state: CardState::Review,
            stability,
            difficulty,
            reps: 3,
            lapses: 1,
            ..new_card()
        }
    }

    #[test]
    fn test_new_card_rated_good_graduates() {
        let next = calculate_next_review(&new_card(), Rating::Good, at(2024, 1, 1, 15));

        assert_eq!(next.state, CardState::Review);
        assert_eq!(next.stability, W[2]);
        assert_eq!(next.due_date, day(2024, 1, 5));
        assert_eq!(next.reps, 1);
        assert_eq!(next.lapses, 0);
        assert!((next.difficulty - 4.55).abs() < 1e-9);
    }

    #[test]
    fn test_new_card_rated_easy() {
        let next = calculate_next_review(&new_card(), Rating::Easy, at(2024, 1, 1, 8));

        assert_eq!(next.state, CardState::Review);
        assert_eq!(next.due_date, day(2024, 1, 10));
        assert!((next.difficulty - (4.55 - 0.48)).abs() < 1e-9);
    }

    #[test]
    fn test_new_card_rated_again_stays_learning() {
        let next = calculate_next_review(&new_card(), Rating::Again, at(2024, 1, 1, 23));

        assert_eq!(next.state, CardState::Learning);
        assert_eq!(next.stability, W[0]);
        assert_eq!(next.due_date, day(2024, 1, 2));
        assert!((next.difficulty - (4.55 + 2.0 * 0.48)).abs() < 1e-9);
    }

    #[test]
    fn test_learning_card_failing_only_moves_due_date() {
        let card = Card {
            state: CardState::Learning,
            stability: 1.37,
            difficulty: 5.0,
            reps: 1,
            ..new_card()
        };

        let next = calculate_next_review(&card, Rating::Hard, at(2024, 2, 10, 9));

        assert_eq!(next.state, CardState::Learning);
        assert_eq!(next.stability, card.stability);
        assert_eq!(next.difficulty, card.difficulty);
        assert_eq!(next.reps, card.reps);
        assert_eq!(next.due_date, day(2024, 2, 11));
    }

    #[test]
    fn test_relearning_card_graduates_on_good() {
        let card = Card {
            state: CardState::Relearning,
            stability: 2.0,
            difficulty: 6.0,
            reps: 4,
            lapses: 2,
            ..new_card()
        };

        let next = calculate_next_review(&card, Rating::Good, at(2024, 2, 10, 9));

        assert_eq!(next.state, CardState::Review);
        assert_eq!(next.reps, 5);
        assert_eq!(next.lapses, 2);
        assert!(next.stability >= card.stability);
    }

    #[test]
    fn test_review_lapse() {
        let card = review_card(20.0, 5.0);
        let next = calculate_next_review(&card, Rating::Again, at(2024, 6, 1, 12));

        assert_eq!(next.state, CardState::Relearning);
        assert_eq!(next.lapses, 2);
        assert_eq!(next.reps, 3);
        assert_eq!(next.difficulty, 5.0);
        assert_eq!(next.due_date, day(2024, 6, 2));
        assert!(next.stability >= MIN_STABILITY);
        assert!(next.stability < card.stability);
    }

    #[test]
    fn test_hard_and_easy_multipliers() {
        let card = review_card(10.0, 5.0);
        let now = at(2024, 6, 1, 12);

        let hard = calculate_next_review(&card, Rating::Hard, now);
        let good = calculate_next_review(&card, Rating::Good, now);
        let easy = calculate_next_review(&card, Rating::Easy, now);

        assert!(good.stability > card.stability);
        assert!(hard.stability < good.stability);
        assert!(easy.stability > good.stability);
        assert!(hard.due_date <= good.due_date);
        assert!(hard.difficulty > good.difficulty);
        assert!(easy.difficulty < good.difficulty);
        assert!(easy.due_date > good.due_date);
    }

    #[test]
    fn test_zero_stability_review_is_floored() {
        let card = review_card(0.0, 5.0);
        let next = calculate_next_review(&card, Rating::Good, at(2024, 6, 1, 12));

        assert_eq!(next.stability, MIN_STABILITY);
        assert_eq!(next.due_date, day(2024, 6, 2));
    }

    #[test]
    fn test_same_day_is_stable() {
        let card = review_card(10.0, 5.0);
        let morning = calculate_next_review(&card, Rating::Good, at(2024, 6, 1, 0));
        let evening = calculate_next_review(&card, Rating::Good, at(2024, 6, 1, 23));

        assert_eq!(morning, evening);
    }

    #[test]
    fn test_huge_stability_saturates_due_date() {
        assert_eq!(add_days(day(2024, 1, 1), 1e300), NaiveDate::MAX);
    }

    #[test]
    fn test_preview_intervals_for_new_card() {
        let intervals = preview_intervals(&new_card(), at(2024, 1, 1, 10));

        assert_eq!(intervals, [1, 1, 4, 9]);
    }

    #[test]
    fn test_format_interval() {
        assert_eq!(format_interval(0), "now");
        assert_eq!(format_interval(1), "1d");
        assert_eq!(format_interval(6), "6d");
        assert_eq!(format_interval(14), "2w");
        assert_eq!(format_interval(90), "3mo");
        assert_eq!(format_interval(730), "2y");
    }

    fn any_rating() -> impl Strategy<Value = Rating> {
        prop::sample::select(Rating::ALL.to_vec())
    }

    fn any_state() -> impl Strategy<Value = CardState> {
        prop::sample::select(vec![
            CardState::New,
            CardState::Learning,
            CardState::Review,
            CardState::Relearning,
        ])
    }

    proptest! {
        #[test]
        fn difficulty_stays_in_range(
            state in any_state(),
            rating in any_rating(),
            stability in 0.0f64..5000.0,
            difficulty in 1.0f64..=10.0,
        ) {
            let card = Card { state, stability, difficulty, ..new_card() };
            let next = calculate_next_review(&card, rating, at(2024, 1, 1, 12));

            prop_assert!((MIN_DIFFICULTY..=MAX_DIFFICULTY).contains(&next.difficulty));
            prop_assert!(next.reps >= card.reps.min(1));
            prop_assert!(next.lapses >= card.lapses || card.state == CardState::New);
            prop_assert!(next.due_date > day(2024, 1, 1));
        }

        #[test]
        fn review_stability_is_floored(
            rating in any_rating(),
            stability in 0.0f64..5000.0,
            difficulty in 1.0f64..=10.0,
        ) {
            let card = review_card(stability, difficulty);
            let next = calculate_next_review(&card, rating, at(2024, 1, 1, 12));

            prop_assert!(next.stability >= MIN_STABILITY);
        }

        #[test]
        fn lapse_law(stability in 0.0f64..5000.0, difficulty in 1.0f64..=10.0) {
            let card = review_card(stability, difficulty);
            let next = calculate_next_review(&card, Rating::Again, at(2024, 1, 1, 12));

            prop_assert_eq!(next.lapses, card.lapses + 1);
            prop_assert_eq!(next.state, CardState::Relearning);
            prop_assert_eq!(next.due_date, day(2024, 1, 2));
        }

        #[test]
        fn good_never_shrinks_stability(stability in 1.0f64..5000.0, difficulty in 1.0f64..=10.0) {
            let card = review_card(stability, difficulty);
            let first = calculate_next_review(&card, Rating::Good, at(2024, 1, 1, 12));
            let second = calculate_next_review(&first, Rating::Good, at(2024, 1, 1, 12));

            prop_assert!(first.stability >= card.stability);
            prop_assert!(second.stability >= first.stability);
        }

        #[test]
        fn recall_ratings_are_ordered(stability in 1.0f64..5000.0, difficulty in 1.0f64..=10.0) {
            let card = review_card(stability, difficulty);
            let now = at(2024, 1, 1, 12);
            let hard = calculate_next_review(&card, Rating::Hard, now);
            let good = calculate_next_review(&card, Rating::Good, now);
            let easy = calculate_next_review(&card, Rating::Easy, now);

            prop_assert!(hard.stability < good.stability);
            prop_assert!(good.stability < easy.stability);
            prop_assert!(hard.due_date <= good.due_date);
            prop_assert!(good.due_date <= easy.due_date);
        }
    }
}
