pub mod clock;
pub mod config;
pub mod database;
pub mod error;
pub mod export;
pub mod knowledge;
pub mod models;
pub mod session;

pub use config::Config;
pub use error::{Error, Result};
pub use models::{Card, CardState, Deck, GoalType, Rating, StudyGoal};
pub use session::{Command, CommandCall, SessionController, SessionState};
