//! Goal tracking for the review session.
//!
//! A session goal counts ratings in memory and is lost when the session ends.
//! A daily goal is also counted in the persisted progress record, which rolls
//! over to zero the first time it is read on a new day.

use chrono::NaiveDate;
use log::{debug, error, info};

use crate::database::CardStore;
use crate::error::Result;
use crate::models::{GoalType, StudyGoal};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GoalTracker {
    active: Option<StudyGoal>,
    session_progress: u32,
}

impl GoalTracker {
    /// Picks up the goal persisted by an earlier run, if any.
    pub fn restore(store: &mut impl CardStore, today: NaiveDate) -> Self {
        let active = match store.study_progress(today) {
            Ok(progress) => progress.map(|p| p.goal),
            Err(e) => {
                error!("Failed to read study progress: {}", e);
                None
            }
        };
        Self {
            active,
            session_progress: 0,
        }
    }

    pub fn active_goal(&self) -> Option<StudyGoal> {
        self.active
    }

    pub fn session_progress(&self) -> u32 {
        self.session_progress
    }

    pub fn reset_session(&mut self) {
        self.session_progress = 0;
    }

    /// Makes `goal` the active goal. A daily goal restarts its persisted counter.
    pub fn set_goal(
        &mut self,
        store: &mut impl CardStore,
        goal: StudyGoal,
        today: NaiveDate,
    ) -> Result<()> {
        self.active = Some(goal);
        self.session_progress = 0;
        if goal.goal_type == GoalType::Daily {
            store.set_study_goal(goal, today)?;
        }
        info!("Study goal set: {} cards per {}", goal.target, goal.goal_type);
        Ok(())
    }

    /// Counts one rated card. Returns the achievement message when this rating is
    /// the one that reaches the active goal's target.
    pub fn record_review(&mut self, store: &mut impl CardStore, today: NaiveDate) -> Option<String> {
        self.session_progress += 1;

        let mut achievement = None;
        if let Some(goal) = self.active {
            if goal.goal_type == GoalType::Session && self.session_progress == goal.target {
                achievement = Some(format!(
                    "Great job! You've reached your session goal of {} cards.",
                    goal.target
                ));
            }
        }

        match self.record_daily(store, today) {
            Ok(Some(daily)) => {
                if let Some(goal) = self.active {
                    if goal.goal_type == GoalType::Daily && daily == goal.target {
                        achievement = Some(format!(
                            "Great job! You've reached your daily goal of {} cards.",
                            goal.target
                        ));
                    }
                }
            }
            Ok(None) => {}
            Err(e) => error!("Failed to update daily progress: {}", e),
        }

        achievement
    }

    fn record_daily(&self, store: &mut impl CardStore, today: NaiveDate) -> Result<Option<u32>> {
        let Some(progress) = store.study_progress(today)? else {
            return Ok(None);
        };
        let daily = progress.progress + 1;
        store.update_study_progress(daily, today)?;
        debug!("Daily progress {}/{}", daily, progress.goal.target);
        Ok(Some(daily))
    }
}
