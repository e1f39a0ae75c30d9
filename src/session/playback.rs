//! Narration playback.
//!
//! Texts are spoken strictly in the order they were queued. When the queue
//! drains (or is stopped) the session receives [`Event::PlaybackStopped`].

use async_trait::async_trait;
use log::{debug, warn};
use std::collections::VecDeque;
use tokio::io::AsyncWriteExt;
use tokio::sync::mpsc::error::TryRecvError;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

use super::controller::Event;
use crate::config::Voice;
use crate::error::Result;

#[async_trait]
pub trait Speaker: Send {
    /// Speaks one utterance, returning once it has been played in full.
    async fn speak(&mut self, text: &str) -> Result<()>;
}

/// Prints narration to stdout, tagged with the configured voice
#[derive(Debug, Default)]
pub struct ConsoleSpeaker {
    voice: Voice,
}

impl ConsoleSpeaker {
    pub fn new(voice: Voice) -> Self {
        Self { voice }
    }

    fn line(&self, text: &str) -> String {
        format!("{} » {}\n", self.voice, text)
    }
}

#[async_trait]
impl Speaker for ConsoleSpeaker {
    async fn speak(&mut self, text: &str) -> Result<()> {
        let mut stdout = tokio::io::stdout();
        stdout.write_all(self.line(text).as_bytes()).await?;
        stdout.flush().await?;
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackState {
    Playing,
    Paused,
    Stopped,
}

#[derive(Debug)]
enum Control {
    Enqueue(String),
    Pause,
    Resume,
    Stop,
}

pub struct PlaybackQueue {
    control: mpsc::UnboundedSender<Control>,
    state: watch::Receiver<PlaybackState>,
    task: JoinHandle<()>,
}

impl PlaybackQueue {
    /// Spawns the playback task. Must be called from within a tokio runtime.
    pub fn start<M>(speaker: Box<dyn Speaker>, events: mpsc::UnboundedSender<M>) -> Self
    where
        M: From<Event> + Send + 'static,
    {
        let (control, control_rx) = mpsc::unbounded_channel();
        let (state_tx, state) = watch::channel(PlaybackState::Stopped);
        let task = tokio::spawn(playback_loop(speaker, control_rx, state_tx, events));
        Self {
            control,
            state,
            task,
        }
    }

    pub fn enqueue(&self, text: impl Into<String>) {
        self.send(Control::Enqueue(text.into()));
    }

    /// Interrupts the current utterance and drops everything queued.
    pub fn stop(&self) {
        self.send(Control::Stop);
    }

    /// Holds playback. The interrupted utterance restarts on resume.
    pub fn pause(&self) {
        self.send(Control::Pause);
    }

    pub fn resume(&self) {
        self.send(Control::Resume);
    }

    pub fn state(&self) -> PlaybackState {
        *self.state.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<PlaybackState> {
        self.state.clone()
    }

    /// Stops playback and waits for the task to exit.
    pub async fn shutdown(self) {
        let Self { control, task, .. } = self;
        drop(control);
        if let Err(e) = task.await {
            warn!("Playback task ended abnormally: {}", e);
        }
    }

    fn send(&self, control: Control) {
        if self.control.send(control).is_err() {
            warn!("Playback task is gone");
        }
    }
}

async fn playback_loop<M: From<Event>>(
    mut speaker: Box<dyn Speaker>,
    mut control: mpsc::UnboundedReceiver<Control>,
    state: watch::Sender<PlaybackState>,
    events: mpsc::UnboundedSender<M>,
) {
    let mut queue: VecDeque<String> = VecDeque::new();
    let mut paused = false;
    // Something was spoken since the last PlaybackStopped
    let mut active = false;

    let finish = |active: &mut bool| {
        state.send_replace(PlaybackState::Stopped);
        if std::mem::take(active) {
            let _ = events.send(Event::PlaybackStopped.into());
        }
    };

    loop {
        let next = if paused { None } else { queue.pop_front() };

        let Some(text) = next else {
            // Take anything already sent before reporting that playback ended
            let message = match control.try_recv() {
                Ok(message) => Some(message),
                Err(TryRecvError::Disconnected) => None,
                Err(TryRecvError::Empty) => {
                    if !paused && active {
                        finish(&mut active);
                    }
                    control.recv().await
                }
            };
            match message {
                Some(Control::Enqueue(text)) => queue.push_back(text),
                Some(Control::Pause) => {
                    paused = true;
                    state.send_replace(PlaybackState::Paused);
                }
                Some(Control::Resume) => paused = false,
                Some(Control::Stop) => {
                    queue.clear();
                    paused = false;
                    finish(&mut active);
                }
                None => break,
            }
            continue;
        };

        active = true;
        state.send_replace(PlaybackState::Playing);

        let speech = speaker.speak(&text);
        tokio::pin!(speech);
        loop {
            tokio::select! {
                result = &mut speech => {
                    if let Err(e) = result {
                        warn!("Narration failed: {}", e);
                    }
                    break;
                }
                message = control.recv() => match message {
                    Some(Control::Enqueue(more)) => queue.push_back(more),
                    Some(Control::Pause) => {
                        queue.push_front(text.clone());
                        paused = true;
                        state.send_replace(PlaybackState::Paused);
                        break;
                    }
                    Some(Control::Resume) => {}
                    Some(Control::Stop) => {
                        debug!("Playback stopped with {} queued", queue.len());
                        queue.clear();
                        finish(&mut active);
                        break;
                    }
                    None => return,
                },
            }
        }
    }
}
