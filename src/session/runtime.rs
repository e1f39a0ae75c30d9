//! Async host for the session controller.
//!
//! Commands, lifecycle events and completions all arrive on one mpsc channel
//! and are handled one at a time, so the controller never sees concurrent
//! mutation. Effects are carried out here: narration goes to the playback
//! queue, assistant requests run as abortable tasks that post their reply
//! back onto the channel.

use log::{debug, info, warn};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use super::assistant::{Assistant, AssistantRequest, RequestId};
use super::command::CommandCall;
use super::controller::{Effect, Event, RecordingId, SessionController};
use super::playback::{ConsoleSpeaker, PlaybackQueue, Speaker};
use crate::database::CardStore;
use crate::error::{Error, Result};

#[derive(Debug)]
pub enum Message {
    Command(CommandCall),
    Event(Event),
    Shutdown,
}

impl From<Event> for Message {
    fn from(event: Event) -> Self {
        Message::Event(event)
    }
}

/// What the session shows outside of narration
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Output {
    Acknowledged { call_id: String, name: String },
    Status(String),
    Achievement(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedAudio {
    pub audio: Vec<u8>,
    pub mime_type: String,
}

/// Microphone capture
pub trait Recorder: Send {
    fn start(&mut self, id: RecordingId) -> Result<()>;
    fn stop(&mut self, id: RecordingId) -> Result<RecordedAudio>;
    fn cancel(&mut self, id: RecordingId);
}

/// Used when no audio input is available
#[derive(Debug, Default)]
pub struct NoRecorder;

impl Recorder for NoRecorder {
    fn start(&mut self, _id: RecordingId) -> Result<()> {
        Err(Error::Recording("no audio input available".into()))
    }

    fn stop(&mut self, id: RecordingId) -> Result<RecordedAudio> {
        Err(Error::Recording(format!("{} was never started", id)))
    }

    fn cancel(&mut self, _id: RecordingId) {}
}

/// Sending side of the runtime's channel
#[derive(Debug, Clone)]
pub struct RuntimeHandle {
    sender: mpsc::UnboundedSender<Message>,
}

impl RuntimeHandle {
    /// Returns false once the runtime has stopped.
    pub fn command(&self, call: CommandCall) -> bool {
        self.sender.send(Message::Command(call)).is_ok()
    }

    pub fn event(&self, event: Event) -> bool {
        self.sender.send(Message::Event(event)).is_ok()
    }

    pub fn shutdown(&self) {
        let _ = self.sender.send(Message::Shutdown);
    }
}

pub struct Runtime<S: CardStore> {
    controller: SessionController<S>,
    assistant: Arc<dyn Assistant>,
    recorder: Box<dyn Recorder>,
    speaker: Option<Box<dyn Speaker>>,
    inbox: mpsc::UnboundedReceiver<Message>,
    sender: mpsc::UnboundedSender<Message>,
    output: mpsc::UnboundedSender<Output>,
    requests: HashMap<RequestId, JoinHandle<()>>,
}

impl<S: CardStore> Runtime<S> {
    pub fn new(
        controller: SessionController<S>,
        assistant: Arc<dyn Assistant>,
        recorder: Box<dyn Recorder>,
        speaker: Box<dyn Speaker>,
    ) -> (Self, RuntimeHandle, mpsc::UnboundedReceiver<Output>) {
        let (sender, inbox) = mpsc::unbounded_channel();
        let (output, output_rx) = mpsc::unbounded_channel();
        let handle = RuntimeHandle {
            sender: sender.clone(),
        };
        let runtime = Self {
            controller,
            assistant,
            recorder,
            speaker: Some(speaker),
            inbox,
            sender,
            output,
            requests: HashMap::new(),
        };
        (runtime, handle, output_rx)
    }

    /// Processes messages until shutdown, then tears down playback and any
    /// outstanding requests and hands the controller back.
    pub async fn run(mut self) -> SessionController<S> {
        let speaker = self
            .speaker
            .take()
            .unwrap_or_else(|| Box::new(ConsoleSpeaker::default()));
        let playback = PlaybackQueue::start(speaker, self.sender.clone());
        info!("Session runtime started");

        while let Some(message) = self.inbox.recv().await {
            let effects = match message {
                Message::Command(call) => self.controller.handle(call),
                Message::Event(event) => {
                    if let Event::AssistantReplied { request_id, .. } = &event {
                        self.requests.remove(request_id);
                    }
                    self.controller.on_event(event)
                }
                Message::Shutdown => break,
            };
            self.apply(&playback, effects);
        }

        for (request_id, task) in self.requests.drain() {
            debug!("Aborting {} on shutdown", request_id);
            task.abort();
        }
        playback.shutdown().await;
        info!("Session runtime stopped");
        self.controller
    }

    fn apply(&mut self, playback: &PlaybackQueue, effects: Vec<Effect>) {
        for effect in effects {
            match effect {
                Effect::Narrate(text) => playback.enqueue(text),
                Effect::StopPlayback => playback.stop(),
                Effect::Status(text) => self.emit(Output::Status(text)),
                Effect::Achievement(text) => self.emit(Output::Achievement(text)),
                Effect::Acknowledge { call_id, name } => {
                    self.emit(Output::Acknowledged { call_id, name })
                }
                Effect::Assistant {
                    request_id,
                    request,
                } => self.spawn_request(request_id, request),
                Effect::CancelAssistant(request_id) => {
                    if let Some(task) = self.requests.remove(&request_id) {
                        debug!("Cancelling {}", request_id);
                        task.abort();
                    }
                }
                Effect::StartRecording(recording_id) => {
                    if let Err(e) = self.recorder.start(recording_id) {
                        self.post(Event::RecordingFailed {
                            recording_id,
                            reason: e.to_string(),
                        });
                    }
                }
                Effect::StopRecording(recording_id) => {
                    let event = match self.recorder.stop(recording_id) {
                        Ok(RecordedAudio { audio, mime_type }) => Event::RecordingFinished {
                            recording_id,
                            audio,
                            mime_type,
                        },
                        Err(e) => Event::RecordingFailed {
                            recording_id,
                            reason: e.to_string(),
                        },
                    };
                    self.post(event);
                }
                Effect::CancelRecording(recording_id) => self.recorder.cancel(recording_id),
            }
        }
    }

    fn spawn_request(&mut self, request_id: RequestId, request: AssistantRequest) {
        let assistant = Arc::clone(&self.assistant);
        let sender = self.sender.clone();
        let task = tokio::spawn(async move {
            let result = assistant
                .complete(request)
                .await
                .map_err(|e| e.to_string());
            let _ = sender.send(Message::Event(Event::AssistantReplied { request_id, result }));
        });
        self.requests.insert(request_id, task);
    }

    fn post(&self, event: Event) {
        let _ = self.sender.send(Message::Event(event));
    }

    fn emit(&self, output: Output) {
        if self.output.send(output).is_err() {
            warn!("Output receiver dropped");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FixedClock;
    use crate::database::SqliteStore;
    use crate::session::assistant::OfflineAssistant;
    use crate::session::state::SessionState;
    use async_trait::async_trait;
    use chrono::NaiveDate;
    use serde_json::json;

    struct SilentSpeaker;

    #[async_trait]
    impl Speaker for SilentSpeaker {
        async fn speak(&mut self, _text: &str) -> Result<()> {
            Ok(())
        }
    }

    fn start() -> (
        JoinHandle<SessionController<SqliteStore>>,
        RuntimeHandle,
        mpsc::UnboundedReceiver<Output>,
    ) {
        let today = NaiveDate::from_ymd_opt(2024, 9, 2).unwrap();
        let mut store = SqliteStore::open_in_memory().unwrap();
        store.seed_sample_decks(today).unwrap();
        let controller = SessionController::new(store, Arc::new(FixedClock::on(today)));

        let (runtime, handle, outputs) = Runtime::new(
            controller,
            Arc::new(OfflineAssistant::default()),
            Box::new(NoRecorder),
            Box::new(SilentSpeaker),
        );
        (tokio::spawn(runtime.run()), handle, outputs)
    }

    async fn wait_for_status(outputs: &mut mpsc::UnboundedReceiver<Output>, status: &str) -> usize {
        let mut acknowledged = 0;
        loop {
            match outputs.recv().await {
                Some(Output::Acknowledged { .. }) => acknowledged += 1,
                Some(Output::Status(text)) if text == status => return acknowledged,
                Some(_) => {}
                None => panic!("runtime stopped before {status:?}"),
            }
        }
    }

    #[tokio::test]
    async fn test_conversation_resumes_after_answer_is_spoken() {
        let (task, handle, mut outputs) = start();

        handle.event(Event::SessionOpened);
        for (name, args) in [
            ("startReview", json!({ "deckName": "Cognitive Biases" })),
            ("showAnswer", json!({})),
            ("startConversation", json!({ "query": "Can you explain that?" })),
        ] {
            assert!(handle.command(CommandCall::new(name, name, args)));
        }

        let acknowledged =
            wait_for_status(&mut outputs, "Okay, let's continue. How did you do on the card?").await;
        assert_eq!(acknowledged, 3);

        handle.shutdown();
        let controller = task.await.unwrap();
        assert_eq!(controller.state(), SessionState::AwaitingRating);
        assert_eq!(controller.transcript().len(), 2);
        assert_eq!(controller.pending_requests(), 0);
    }

    #[tokio::test]
    async fn test_missing_microphone_is_reported() {
        let (task, handle, mut outputs) = start();

        handle.event(Event::SessionOpened);
        handle.command(CommandCall::new("1", "showTranscriptionView", json!({})));
        handle.command(CommandCall::new("2", "startRecording", json!({})));

        wait_for_status(
            &mut outputs,
            "Could not start recording. Please check microphone permissions.",
        )
        .await;

        handle.shutdown();
        let controller = task.await.unwrap();
        assert_eq!(controller.state(), SessionState::TranscribingAudio);
        assert!(!controller.view().recording);
    }
}
