//! Study goals and the persisted daily progress record.
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GoalType {
    Session,
    Daily,
}

impl fmt::Display for GoalType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GoalType::Session => f.write_str("session"),
            GoalType::Daily => f.write_str("day"),
        }
    }
}

impl FromStr for GoalType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "session" => Ok(GoalType::Session),
            "daily" | "day" => Ok(GoalType::Daily),
            other => Err(format!("unknown goal type '{other}'")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StudyGoal {
    #[serde(rename = "type")]
    pub goal_type: GoalType,
    pub target: u32,
}

impl StudyGoal {
    pub fn new(goal_type: GoalType, target: u32) -> Self {
        Self { goal_type, target }
    }
}

/// Persisted progress towards the active goal, keyed by calendar date
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StudyProgress {
    pub goal: StudyGoal,
    pub progress: u32,
    pub date: NaiveDate,
}

impl StudyProgress {
    pub fn new(goal: StudyGoal, today: NaiveDate) -> Self {
        Self {
            goal,
            progress: 0,
            date: today,
        }
    }

    /// Resets a daily counter recorded on another day. Returns true when it changed.
    pub fn roll_over(&mut self, today: NaiveDate) -> bool {
        if self.goal.goal_type == GoalType::Daily && self.date != today {
            self.progress = 0;
            self.date = today;
            true
        } else {
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, d).unwrap()
    }

    #[test]
    fn test_daily_progress_rolls_over_on_new_day() {
        let mut progress = StudyProgress::new(StudyGoal::new(GoalType::Daily, 10), day(1));
        progress.progress = 7;

        assert!(!progress.roll_over(day(1)));
        assert_eq!(progress.progress, 7);

        assert!(progress.roll_over(day(2)));
        assert_eq!(progress.progress, 0);
        assert_eq!(progress.date, day(2));
    }

    #[test]
    fn test_session_progress_never_rolls_over() {
        let mut progress = StudyProgress::new(StudyGoal::new(GoalType::Session, 5), day(1));
        progress.progress = 3;

        assert!(!progress.roll_over(day(9)));
        assert_eq!(progress.progress, 3);
    }

    #[test]
    fn test_progress_json_layout() {
        let progress = StudyProgress::new(StudyGoal::new(GoalType::Daily, 20), day(4));
        let json = serde_json::to_string(&progress).unwrap();

        assert_eq!(
            json,
            r#"{"goal":{"type":"daily","target":20},"progress":0,"date":"2024-03-04"}"#
        );
    }
}
