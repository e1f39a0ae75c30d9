//! The review session: state machine, command surface and its async host.

pub mod assistant;
pub mod command;
pub mod controller;
pub mod goals;
pub mod playback;
pub mod runtime;
pub mod state;

pub use assistant::{Assistant, AssistantReply, AssistantRequest, OfflineAssistant, RequestId};
pub use command::{Command, CommandCall};
pub use controller::{Effect, Event, RecordingId, SessionController, ViewState};
pub use goals::GoalTracker;
pub use playback::{ConsoleSpeaker, PlaybackQueue, PlaybackState};
pub use runtime::{Message, NoRecorder, Output, Recorder, Runtime, RuntimeHandle};
pub use state::SessionState;
