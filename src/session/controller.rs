//! Review session state machine.
//!
//! The controller owns the review queue, the current card and every transient
//! view field. It never performs I/O other than through the [`CardStore`];
//! narration, assistant calls and recording are returned as [`Effect`]s for the
//! host to carry out, and their completions come back as [`Event`]s.
//!
//! Every handler checks its precondition when it runs. A command that does not
//! fit the current state is a silent no-op.

use log::{debug, error, info, warn};
use std::collections::{BTreeMap, VecDeque};
use std::fmt;
use std::sync::Arc;

use super::assistant::{AssistantReply, AssistantRequest, ImageAttachment, RequestId, TextComplexity};
use super::command::{Command, CommandCall};
use super::goals::GoalTracker;
use super::state::{SessionState, resume_prompt};
use crate::clock::Clock;
use crate::database::CardStore;
use crate::error::Error;
use crate::export::csv::parse_csv_deck;
use crate::knowledge::KnowledgeBase;
use crate::models::fsrs::{self, format_interval, preview_intervals};
use crate::models::{Card, GoalType, Rating, StudyGoal, TranscriptMessage};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RecordingId(pub u64);

impl fmt::Display for RecordingId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "rec-{}", self.0)
    }
}

/// Work the host performs on behalf of the controller
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    /// Speak and display the text
    Narrate(String),
    /// Display only
    Status(String),
    /// One-shot goal notification
    Achievement(String),
    Assistant {
        request_id: RequestId,
        request: AssistantRequest,
    },
    CancelAssistant(RequestId),
    StartRecording(RecordingId),
    /// Finish the recording and deliver its audio
    StopRecording(RecordingId),
    /// Discard the recording
    CancelRecording(RecordingId),
    StopPlayback,
    Acknowledge {
        call_id: String,
        name: String,
    },
}

/// Completions and lifecycle notifications fed back into the controller
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    SessionOpened,
    SessionClosed,
    ConnectionFailed(String),
    /// Narration playback has fully drained
    PlaybackStopped,
    AssistantReplied {
        request_id: RequestId,
        result: Result<AssistantReply, String>,
    },
    RecordingFinished {
        recording_id: RecordingId,
        audio: Vec<u8>,
        mime_type: String,
    },
    RecordingFailed {
        recording_id: RecordingId,
        reason: String,
    },
}

/// Transient fields of the secondary views. Cleared together by `goBack`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ViewState {
    pub card_to_edit: Option<Card>,
    pub card_for_stats: Option<Card>,
    pub card_explanation: Option<String>,
    pub generating_explanation: bool,
    pub generated_image: Option<String>,
    pub generating_image: bool,
    pub image_to_analyze: Option<ImageAttachment>,
    pub analysis_result: Option<String>,
    pub analyzing_image: bool,
    pub recording: bool,
    pub transcribing: bool,
    pub transcription_result: Option<String>,
    pub analyzing_text: bool,
    pub text_analysis_result: Option<String>,
}

impl ViewState {
    pub fn is_clear(&self) -> bool {
        *self == ViewState::default()
    }
}

/// What to do with an assistant reply once it arrives
#[derive(Debug, Clone, PartialEq)]
enum PendingReply {
    Conversation,
    CardExplanation,
    DeckGeneration { deck_name: String },
    WeakPoint { deck_id: String, deck_name: String },
    Image,
    ImageAnalysis,
    Transcription,
    TextAnalysis,
}

impl PendingReply {
    /// The state whose view consumes the reply.
    fn owner(&self) -> SessionState {
        match self {
            PendingReply::Conversation => SessionState::Conversation,
            PendingReply::CardExplanation => SessionState::ShowingCardStats,
            PendingReply::DeckGeneration { .. } | PendingReply::WeakPoint { .. } => {
                SessionState::Processing
            }
            PendingReply::Image => SessionState::GeneratingImage,
            PendingReply::ImageAnalysis => SessionState::AnalyzingImage,
            PendingReply::Transcription => SessionState::TranscribingAudio,
            PendingReply::TextAnalysis => SessionState::AnalyzingText,
        }
    }
}

pub struct SessionController<S: CardStore> {
    store: S,
    clock: Arc<dyn Clock>,
    knowledge: KnowledgeBase,
    weak_point_card_count: u32,

    state: SessionState,
    previous_state: Option<SessionState>,
    review_queue: VecDeque<Card>,
    current_card: Option<Card>,
    card_flipped: bool,
    view: ViewState,
    goals: GoalTracker,
    transcript: Vec<TranscriptMessage>,

    pending: BTreeMap<RequestId, PendingReply>,
    next_request_id: u64,
    recording: Option<RecordingId>,
    next_recording_id: u64,

    outbox: Vec<Effect>,
}

impl<S: CardStore> SessionController<S> {
    pub fn new(mut store: S, clock: Arc<dyn Clock>) -> Self {
        let goals = GoalTracker::restore(&mut store, clock.today());
        Self {
            store,
            clock,
            knowledge: KnowledgeBase::default(),
            weak_point_card_count: 3,
            state: SessionState::Idle,
            previous_state: None,
            review_queue: VecDeque::new(),
            current_card: None,
            card_flipped: false,
            view: ViewState::default(),
            goals,
            transcript: Vec::new(),
            pending: BTreeMap::new(),
            next_request_id: 1,
            recording: None,
            next_recording_id: 1,
            outbox: Vec::new(),
        }
    }

    pub fn with_knowledge_base(mut self, knowledge: KnowledgeBase) -> Self {
        self.knowledge = knowledge;
        self
    }

    pub fn with_weak_point_card_count(mut self, count: u32) -> Self {
        self.weak_point_card_count = count.max(1);
        self
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn previous_state(&self) -> Option<SessionState> {
        self.previous_state
    }

    pub fn current_card(&self) -> Option<&Card> {
        self.current_card.as_ref()
    }

    pub fn review_queue(&self) -> &VecDeque<Card> {
        &self.review_queue
    }

    pub fn is_card_flipped(&self) -> bool {
        self.card_flipped
    }

    pub fn view(&self) -> &ViewState {
        &self.view
    }

    pub fn goals(&self) -> &GoalTracker {
        &self.goals
    }

    pub fn transcript(&self) -> &[TranscriptMessage] {
        &self.transcript
    }

    pub fn pending_requests(&self) -> usize {
        self.pending.len()
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut S {
        &mut self.store
    }

    pub fn into_store(self) -> S {
        self.store
    }

    /// Parses and runs a command from the command source, then acknowledges it.
    /// Unknown or malformed commands are logged and dropped.
    pub fn handle(&mut self, call: CommandCall) -> Vec<Effect> {
        match Command::parse(&call.name, &call.args) {
            Ok(command) => {
                debug!("Command {} ({})", command.name(), call.id);
                self.run(command);
            }
            Err(e) => warn!("Dropping command {}: {}", call.id, e),
        }
        self.outbox.push(Effect::Acknowledge {
            call_id: call.id,
            name: call.name,
        });
        self.flush()
    }

    /// Runs an already-typed command, as issued by UI actions.
    pub fn dispatch(&mut self, command: Command) -> Vec<Effect> {
        self.run(command);
        self.flush()
    }

    pub fn on_event(&mut self, event: Event) -> Vec<Effect> {
        match event {
            Event::SessionOpened => self.session_opened(),
            Event::SessionClosed => self.session_closed(),
            Event::ConnectionFailed(reason) => self.connection_failed(&reason),
            Event::PlaybackStopped => self.playback_stopped(),
            Event::AssistantReplied { request_id, result } => {
                self.assistant_replied(request_id, result)
            }
            Event::RecordingFinished {
                recording_id,
                audio,
                mime_type,
            } => self.recording_finished(recording_id, audio, mime_type),
            Event::RecordingFailed {
                recording_id,
                reason,
            } => self.recording_failed(recording_id, &reason),
        }
        self.flush()
    }

    fn flush(&mut self) -> Vec<Effect> {
        std::mem::take(&mut self.outbox)
    }

    fn run(&mut self, command: Command) {
        // Only goBack may interrupt an operation in flight
        if self.state == SessionState::Processing && command != Command::GoBack {
            debug!("Ignoring {} while processing", command.name());
            return;
        }

        match command {
            Command::StartReview { deck_name } => self.start_review(&deck_name),
            Command::ShowAnswer => self.show_answer(),
            Command::RateCard { rating } => self.rate_card(rating),
            Command::StartConversation { query } => self.start_conversation(query),
            Command::SetStudyGoal { target, goal_type } => self.set_study_goal(target, goal_type),
            Command::CreateDeck { deck_name } => self.create_deck(&deck_name),
            Command::DeleteDeck { deck_name } => self.delete_deck(&deck_name),
            Command::ListDecks => self.list_decks(),
            Command::ShowDecks => self.show_decks(),
            Command::CreateCard {
                deck_name,
                question,
                answer,
                explanation,
            } => self.create_card(&deck_name, &question, &answer, explanation.as_deref()),
            Command::FindCardToEdit {
                deck_name,
                question_query,
            } => self.find_card_to_edit(&deck_name, &question_query),
            Command::UpdateCardContent {
                new_question,
                new_answer,
                new_explanation,
            } => self.update_card_content(new_question, new_answer, new_explanation),
            Command::GoBack => self.go_back(),
            Command::ShowImportView => self.show_import_view(),
            Command::ImportDeck {
                deck_name,
                csv_content,
            } => self.import_deck(&deck_name, &csv_content),
            Command::ShowSmartGenerationView => self.show_smart_generation_view(),
            Command::GenerateDeckFromForm {
                topic,
                depth,
                number_of_cards,
            } => self.generate_deck_from_form(topic, depth, number_of_cards),
            Command::GenerateDeckFromDocument {
                deck_name,
                document_text,
            } => self.generate_deck_from_document(deck_name, document_text),
            Command::ShowCardStats {
                deck_name,
                question_query,
            } => self.show_card_stats(&deck_name, &question_query),
            Command::ExplainCard => self.explain_card(),
            Command::GenerateCardsFromWeakness { deck_name } => {
                self.generate_cards_from_weakness(&deck_name)
            }
            Command::ShowImageGenerationView => self.show_image_generation_view(),
            Command::GenerateImage { prompt } => self.generate_image(prompt),
            Command::ShowImageAnalysisView => self.show_image_analysis_view(),
            Command::AttachImage { image } => self.attach_image(image),
            Command::AnalyzeImage { prompt } => self.analyze_image(prompt),
            Command::ShowTranscriptionView => self.show_transcription_view(),
            Command::StartRecording => self.start_recording(),
            Command::StopRecording => self.stop_recording(),
            Command::ShowTextAnalysisView => self.show_text_analysis_view(),
            Command::AnalyzeText {
                text,
                prompt,
                complexity,
            } => self.analyze_text(text, prompt, complexity),
        }
    }

    // ---- helpers ----

    /// Moves to `next`. Work started by the view being left is cancelled.
    fn set_state(&mut self, next: SessionState) {
        if self.state == next {
            return;
        }
        debug!("State {} -> {}", self.state, next);
        let left = std::mem::replace(&mut self.state, next);
        self.abandon_requests(|reply| reply.owner() == left);
        if left == SessionState::TranscribingAudio {
            if let Some(recording_id) = self.recording.take() {
                self.view.recording = false;
                self.outbox.push(Effect::CancelRecording(recording_id));
            }
        }
    }

    /// Cancels matching in-flight requests and clears their busy flags.
    fn abandon_requests(&mut self, matches: impl Fn(&PendingReply) -> bool) {
        let abandoned: Vec<RequestId> = self
            .pending
            .iter()
            .filter(|(_, reply)| matches(reply))
            .map(|(request_id, _)| *request_id)
            .collect();
        for request_id in abandoned {
            let Some(reply) = self.pending.remove(&request_id) else {
                continue;
            };
            debug!("Cancelling {} ({:?})", request_id, reply);
            match reply {
                PendingReply::CardExplanation => self.view.generating_explanation = false,
                PendingReply::Image => self.view.generating_image = false,
                PendingReply::ImageAnalysis => self.view.analyzing_image = false,
                PendingReply::Transcription => self.view.transcribing = false,
                PendingReply::TextAnalysis => self.view.analyzing_text = false,
                _ => {}
            }
            self.outbox.push(Effect::CancelAssistant(request_id));
        }
    }

    fn narrate(&mut self, text: impl Into<String>) {
        self.outbox.push(Effect::Narrate(text.into()));
    }

    fn status(&mut self, text: impl Into<String>) {
        self.outbox.push(Effect::Status(text.into()));
    }

    fn request(&mut self, request: AssistantRequest, reply: PendingReply) {
        let request_id = RequestId(self.next_request_id);
        self.next_request_id += 1;
        debug!("Assistant request {} ({})", request_id, request.kind());
        self.pending.insert(request_id, reply);
        self.outbox.push(Effect::Assistant {
            request_id,
            request,
        });
    }

    fn awaiting(&self, reply: &PendingReply) -> bool {
        self.pending.values().any(|p| p == reply)
    }

    /// Logs a storage failure, tells the user and returns to the command prompt.
    fn storage_failed(&mut self, action: &str, err: Error) {
        error!("Storage failure while {}: {}", action, err);
        self.narrate(format!(
            "Sorry, something went wrong while {}. Please try again.",
            action
        ));
        self.set_state(SessionState::AwaitingCommand);
    }

    fn deck_not_found(&mut self, deck_name: &str) {
        self.narrate(format!("Sorry, I couldn't find a deck named \"{}\".", deck_name));
    }

    /// Clears every secondary-view field and abandons in-flight work.
    fn reset_view(&mut self) {
        for (request_id, _) in std::mem::take(&mut self.pending) {
            self.outbox.push(Effect::CancelAssistant(request_id));
        }
        if let Some(recording_id) = self.recording.take() {
            self.outbox.push(Effect::CancelRecording(recording_id));
        }
        self.view = ViewState::default();
        self.previous_state = None;
    }

    fn today(&self) -> chrono::NaiveDate {
        self.clock.today()
    }

    // ---- lifecycle ----

    fn session_opened(&mut self) {
        if matches!(self.state, SessionState::Idle | SessionState::Error) {
            self.set_state(SessionState::AwaitingCommand);
            self.status("Say 'Start Review' to begin.");
        }
    }

    fn session_closed(&mut self) {
        self.reset_view();
        self.set_state(SessionState::Idle);
        self.status("Session ended.");
    }

    fn connection_failed(&mut self, reason: &str) {
        error!("Connection failed: {}", reason);
        self.set_state(SessionState::Error);
        self.status("Connection error.");
    }

    // ---- review cycle ----

    fn start_review(&mut self, deck_name: &str) {
        self.reset_view();
        self.goals.reset_session();
        self.review_queue.clear();
        self.current_card = None;
        self.card_flipped = false;
        self.set_state(SessionState::Processing);
        self.status(format!("Loading deck: {}...", deck_name));

        let deck = match self.store.deck_by_name(deck_name) {
            Ok(Some(deck)) => deck,
            Ok(None) => {
                self.set_state(SessionState::AwaitingCommand);
                self.deck_not_found(deck_name);
                return;
            }
            Err(e) => return self.storage_failed("loading the deck", e),
        };

        let today = self.today();
        match self.store.due_cards(&deck.id, today) {
            Ok(cards) if cards.is_empty() => {
                self.set_state(SessionState::AwaitingCommand);
                self.narrate(format!("No cards due for review in {}.", deck_name));
            }
            Ok(cards) => {
                info!("Reviewing {} cards from '{}'", cards.len(), deck.name);
                self.review_queue = cards.into();
                self.current_card = self.review_queue.front().cloned();
                self.read_question();
            }
            Err(e) => self.storage_failed("loading the due cards", e),
        }
    }

    /// Entry action of READING_QUESTION. Moves on as soon as narration is requested.
    fn read_question(&mut self) {
        let Some(card) = self.current_card.as_ref() else {
            return;
        };
        let question = card.question.clone();
        self.card_flipped = false;
        self.set_state(SessionState::ReadingQuestion);
        self.narrate(question);
        self.set_state(SessionState::AwaitingAnswerReveal);
        self.status("Say 'Show Answer' when ready.");
    }

    fn show_answer(&mut self) {
        if self.state != SessionState::AwaitingAnswerReveal {
            debug!("showAnswer ignored in {}", self.state);
            return;
        }
        let Some(card) = self.current_card.as_ref() else {
            return;
        };
        let answer = card.answer.clone();

        self.card_flipped = true;
        self.set_state(SessionState::ReadingAnswer);
        self.narrate(format!(
            "{}. How did you do? Say Again, Hard, Good, or Easy.",
            answer
        ));
        self.set_state(SessionState::AwaitingRating);
        self.status("Rate your answer: Again, Hard, Good, or Easy.");
    }

    fn rate_card(&mut self, rating: Rating) {
        if self.state != SessionState::AwaitingRating {
            debug!("rateCard ignored in {}", self.state);
            return;
        }
        let Some(card) = self.current_card.clone() else {
            return;
        };

        self.set_state(SessionState::Processing);
        let updated = fsrs::calculate_next_review(&card, rating, self.clock.now());
        if let Err(e) = self.store.update_card(&updated) {
            error!("Failed to save rating for {}: {}", card.id, e);
            self.narrate("Sorry, I couldn't save that rating. Please rate the card again.");
            self.set_state(SessionState::AwaitingRating);
            return;
        }
        debug!(
            "Card {} rated {:?}: {} -> {}, due {}",
            card.id, rating, card.state, updated.state, updated.due_date
        );

        let today = self.today();
        if let Some(message) = self.goals.record_review(&mut self.store, today) {
            info!("{}", message);
            self.outbox.push(Effect::Achievement(message));
        }

        self.review_queue.pop_front();
        match self.review_queue.front().cloned() {
            Some(next) => {
                self.current_card = Some(next);
                self.read_question();
            }
            None => {
                self.current_card = None;
                self.card_flipped = false;
                self.set_state(SessionState::AwaitingCommand);
                self.narrate("Review complete! Well done.");
            }
        }
    }

    // ---- conversation ----

    fn start_conversation(&mut self, query: String) {
        if !self.state.allows_conversation() {
            debug!("startConversation ignored in {}", self.state);
            return;
        }
        // A follow-up question keeps the state the first question interrupted
        if self.state != SessionState::Conversation {
            self.previous_state = Some(self.state);
        }
        self.set_state(SessionState::Conversation);
        self.status("Thinking about your question...");
        self.transcript.push(TranscriptMessage::user(query.clone()));

        let card = self.current_card.clone();
        self.request(AssistantRequest::Explain { card, query }, PendingReply::Conversation);
    }

    fn conversation_replied(&mut self, result: Result<AssistantReply, String>) {
        if self.state != SessionState::Conversation {
            return;
        }
        match result {
            Ok(AssistantReply::Text(text)) if !text.trim().is_empty() => {
                self.transcript.push(TranscriptMessage::assistant(text.clone()));
                self.narrate(text);
            }
            Ok(_) => {
                warn!("Empty or unexpected explanation reply");
                self.narrate("Sorry, I don't have an answer for that right now.");
            }
            Err(e) => {
                warn!("Explanation failed: {}", e);
                self.narrate("Sorry, I don't have an answer for that right now.");
            }
        }
    }

    /// Resume watcher: returns to the interrupted state once the answer has been spoken.
    fn playback_stopped(&mut self) {
        if self.state != SessionState::Conversation {
            return;
        }
        if self.awaiting(&PendingReply::Conversation) {
            return;
        }
        let Some(previous) = self.previous_state.take() else {
            return;
        };
        self.set_state(previous);
        self.status(resume_prompt(previous));
    }

    // ---- goals ----

    fn set_study_goal(&mut self, target: u32, goal_type: GoalType) {
        let today = self.today();
        let goal = StudyGoal::new(goal_type, target);
        if let Err(e) = self.goals.set_goal(&mut self.store, goal, today) {
            error!("Failed to persist study goal: {}", e);
            self.narrate("Sorry, I couldn't save that goal. Please try again.");
            return;
        }
        self.narrate(format!(
            "Ok, I've set your goal to {} cards per {}.",
            target, goal_type
        ));
    }

    // ---- universal reset ----

    fn go_back(&mut self) {
        self.reset_view();
        self.outbox.push(Effect::StopPlayback);
        self.set_state(SessionState::AwaitingCommand);
        self.status("What would you like to do next?");
    }

    // ---- decks and cards ----

    fn create_deck(&mut self, deck_name: &str) {
        match self.store.deck_by_name(deck_name) {
            Ok(Some(_)) => {
                self.narrate(format!("You already have a deck named \"{}\".", deck_name));
                return;
            }
            Ok(None) => {}
            Err(e) => return self.storage_failed("creating the deck", e),
        }
        match self.store.create_deck(deck_name) {
            Ok(deck) => {
                info!("Created deck '{}'", deck.name);
                self.narrate(format!("I've created the \"{}\" deck for you.", deck_name));
            }
            Err(e) => self.storage_failed("creating the deck", e),
        }
    }

    fn delete_deck(&mut self, deck_name: &str) {
        let deck = match self.store.deck_by_name(deck_name) {
            Ok(Some(deck)) => deck,
            Ok(None) => return self.deck_not_found(deck_name),
            Err(e) => return self.storage_failed("deleting the deck", e),
        };
        if let Err(e) = self.store.delete_deck(&deck.id) {
            return self.storage_failed("deleting the deck", e);
        }
        info!("Deleted deck '{}'", deck.name);

        // A review of the deleted deck cannot continue
        if self
            .current_card
            .as_ref()
            .is_some_and(|card| card.deck_id == deck.id)
        {
            self.review_queue.clear();
            self.current_card = None;
            self.card_flipped = false;
            match self.state {
                SessionState::AwaitingAnswerReveal | SessionState::AwaitingRating => {
                    self.set_state(SessionState::AwaitingCommand)
                }
                // Resume at the prompt once the answer has been spoken
                SessionState::Conversation => {
                    self.previous_state = Some(SessionState::AwaitingCommand)
                }
                _ => {}
            }
        }
        self.narrate(format!("Okay, the \"{}\" deck has been deleted.", deck_name));
    }

    fn list_decks(&mut self) {
        match self.store.decks() {
            Ok(decks) if decks.is_empty() => self.narrate("You don't have any decks yet."),
            Ok(decks) => {
                let names: Vec<&str> = decks.iter().map(|d| d.name.as_str()).collect();
                self.narrate(format!("Here are your decks: {}.", names.join(", ")));
            }
            Err(e) => self.storage_failed("listing your decks", e),
        }
    }

    fn show_decks(&mut self) {
        self.set_state(SessionState::ShowingDecks);
        self.status("Select a deck to begin a review session.");
        self.narrate(
            "Here are your decks. You can select one to start or tell me which one to review.",
        );
    }

    fn create_card(&mut self, deck_name: &str, question: &str, answer: &str, explanation: Option<&str>) {
        let deck = match self.store.deck_by_name(deck_name) {
            Ok(Some(deck)) => deck,
            Ok(None) => {
                return self.narrate(format!(
                    "Sorry, I couldn't find a deck named \"{}\" to add the card to.",
                    deck_name
                ));
            }
            Err(e) => return self.storage_failed("adding the card", e),
        };
        let today = self.today();
        match self
            .store
            .create_card(&deck.id, question, answer, explanation, today)
        {
            Ok(_) => self.narrate(format!(
                "Okay, I've added that card to the \"{}\" deck.",
                deck_name
            )),
            Err(e) => self.storage_failed("adding the card", e),
        }
    }

    /// First card in the deck whose question contains `query`. Narrates what went wrong otherwise.
    fn find_card(&mut self, deck_name: &str, query: &str) -> Option<Card> {
        let deck = match self.store.deck_by_name(deck_name) {
            Ok(Some(deck)) => deck,
            Ok(None) => {
                self.deck_not_found(deck_name);
                return None;
            }
            Err(e) => {
                self.storage_failed("looking up the card", e);
                return None;
            }
        };
        match self.store.find_cards_by_question(&deck.id, query) {
            Ok(cards) if !cards.is_empty() => cards.into_iter().next(),
            Ok(_) => {
                self.narrate(format!(
                    "I couldn't find any card in \"{}\" with a question containing \"{}\".",
                    deck_name, query
                ));
                None
            }
            Err(e) => {
                self.storage_failed("looking up the card", e);
                None
            }
        }
    }

    fn find_card_to_edit(&mut self, deck_name: &str, query: &str) {
        let Some(card) = self.find_card(deck_name, query) else {
            return;
        };
        self.status(format!("Editing: {}", card.question));
        self.narrate(format!(
            "I found the card: \"{}\". What should the new question, answer, or explanation be?",
            card.question
        ));
        self.view.card_to_edit = Some(card);
        self.set_state(SessionState::EditingCard);
    }

    fn update_card_content(
        &mut self,
        new_question: Option<String>,
        new_answer: Option<String>,
        new_explanation: Option<String>,
    ) {
        if self.state != SessionState::EditingCard {
            debug!("updateCardContent ignored in {}", self.state);
            return;
        }
        let Some(mut card) = self.view.card_to_edit.clone() else {
            return;
        };

        if let Some(question) = new_question {
            card.question = question;
        }
        if let Some(answer) = new_answer {
            card.answer = answer;
        }
        if new_explanation.is_some() {
            card.explanation = new_explanation;
        }

        if let Err(e) = self.store.update_card(&card) {
            return self.storage_failed("updating the card", e);
        }

        // Keep queued copies in step with the edit
        for queued in self.review_queue.iter_mut().filter(|c| c.id == card.id) {
            queued.question = card.question.clone();
            queued.answer = card.answer.clone();
            queued.explanation = card.explanation.clone();
        }
        if self.current_card.as_ref().is_some_and(|c| c.id == card.id) {
            self.current_card = self.review_queue.front().cloned();
        }

        self.view.card_to_edit = None;
        self.set_state(SessionState::AwaitingCommand);
        self.narrate("I've updated the card.");
    }

    fn show_card_stats(&mut self, deck_name: &str, query: &str) {
        // An explanation still running belongs to the previous card
        self.abandon_requests(|reply| *reply == PendingReply::CardExplanation);
        self.view.card_explanation = None;
        self.view.generating_explanation = false;
        let Some(card) = self.find_card(deck_name, query) else {
            return;
        };

        let [again, hard, good, easy] = preview_intervals(&card, self.clock.now());
        self.status(format!(
            "Viewing stats for: {} | state {}, due {}, stability {:.2}, difficulty {:.2}, reps {}, lapses {} | next: again {}, hard {}, good {}, easy {}",
            card.question,
            card.state,
            card.due_date,
            card.stability,
            card.difficulty,
            card.reps,
            card.lapses,
            format_interval(again),
            format_interval(hard),
            format_interval(good),
            format_interval(easy),
        ));
        self.narrate(format!(
            "Here are the stats for the card \"{}\". You can also ask me to explain this card.",
            card.question
        ));
        self.view.card_for_stats = Some(card);
        self.set_state(SessionState::ShowingCardStats);
    }

    fn explain_card(&mut self) {
        if self.state != SessionState::ShowingCardStats || self.view.generating_explanation {
            debug!("explainCard ignored in {}", self.state);
            return;
        }
        let Some(card) = self.view.card_for_stats.clone() else {
            return;
        };

        self.view.generating_explanation = true;
        self.view.card_explanation = None;
        self.status("Generating AI explanation...");
        self.narrate(format!(
            "Okay, I'm generating an explanation for \"{}\". One moment...",
            card.question
        ));
        self.request(AssistantRequest::ExplainCard { card }, PendingReply::CardExplanation);
    }

    fn card_explanation_replied(&mut self, result: Result<AssistantReply, String>) {
        self.view.generating_explanation = false;
        match result {
            Ok(AssistantReply::Text(text)) if !text.trim().is_empty() => {
                self.view.card_explanation = Some(text);
                self.status("Explanation generated.");
                self.narrate("The explanation is ready for you to read.");
            }
            other => {
                warn!("Card explanation failed: {:?}", other.err());
                self.narrate("Sorry, I couldn't generate an explanation for this card.");
            }
        }
    }

    // ---- import and generation ----

    fn show_import_view(&mut self) {
        self.set_state(SessionState::ImportingDeck);
        self.status("Import a deck from a .csv or .txt file.");
        self.narrate("Okay, let's import a new deck. Please choose a file and give the deck a name.");
    }

    fn import_deck(&mut self, deck_name: &str, csv_content: &str) {
        if self.state != SessionState::ImportingDeck {
            debug!("importDeck ignored in {}", self.state);
            return;
        }
        let cards = parse_csv_deck(csv_content);
        if cards.is_empty() {
            self.narrate("I couldn't find any cards in that file. Each line needs a question and an answer.");
            return;
        }

        let today = self.today();
        let deck = match self.store.create_deck(deck_name) {
            Ok(deck) => deck,
            Err(e) => return self.storage_failed("importing the deck", e),
        };
        for card in &cards {
            if let Err(e) = self.store.create_card(
                &deck.id,
                &card.question,
                &card.answer,
                card.explanation.as_deref(),
                today,
            ) {
                return self.storage_failed("importing the deck", e);
            }
        }
        info!("Imported {} cards into '{}'", cards.len(), deck.name);
        self.set_state(SessionState::AwaitingCommand);
        self.narrate(format!(
            "Great! The \"{}\" deck has been imported successfully with {} cards.",
            deck.name,
            cards.len()
        ));
    }

    fn show_smart_generation_view(&mut self) {
        self.set_state(SessionState::SmartGeneration);
        self.status("Create a deck with AI from a topic or document.");
        self.narrate("Welcome to the Smart Deck Generator. You can tell me a topic to create a deck from, or upload a document for me to analyze.");
    }

    fn generate_deck_from_form(&mut self, topic: String, depth: String, count: u32) {
        self.narrate(format!(
            "Okay, generating a new \"{}\" level deck about \"{}\" with {} cards. This might take a moment...",
            depth, topic, count
        ));
        self.set_state(SessionState::Processing);
        self.request(
            AssistantRequest::GenerateDeck {
                topic: topic.clone(),
                depth,
                count,
            },
            PendingReply::DeckGeneration { deck_name: topic },
        );
    }

    fn generate_deck_from_document(&mut self, deck_name: String, text: String) {
        self.narrate(format!(
            "Okay, analyzing your document to create the \"{}\" deck. This may take a few moments...",
            deck_name
        ));
        self.set_state(SessionState::Processing);
        self.request(
            AssistantRequest::GenerateDeckFromDocument {
                deck_name: deck_name.clone(),
                text,
            },
            PendingReply::DeckGeneration { deck_name },
        );
    }

    fn deck_generated(&mut self, deck_name: &str, result: Result<AssistantReply, String>) {
        self.set_state(SessionState::AwaitingCommand);
        let cards = match result {
            Ok(AssistantReply::Cards(cards)) if !cards.is_empty() => cards,
            other => {
                warn!("Deck generation for '{}' failed: {:?}", deck_name, other.err());
                self.narrate(format!(
                    "Sorry, I had trouble creating the deck about \"{}\". Please try again.",
                    deck_name
                ));
                return;
            }
        };

        let today = self.today();
        let deck = match self.store.create_deck(deck_name) {
            Ok(deck) => deck,
            Err(e) => return self.storage_failed("saving the generated deck", e),
        };
        for card in &cards {
            if let Err(e) = self.store.create_card(
                &deck.id,
                &card.question,
                &card.answer,
                card.explanation.as_deref(),
                today,
            ) {
                return self.storage_failed("saving the generated deck", e);
            }
        }
        self.narrate(format!(
            "I've created the \"{}\" deck for you with {} cards.",
            deck_name,
            cards.len()
        ));
    }

    fn generate_cards_from_weakness(&mut self, deck_name: &str) {
        self.set_state(SessionState::Processing);
        self.narrate(format!(
            "Alright, analyzing your performance in the \"{}\" deck to find your weak points...",
            deck_name
        ));

        let deck = match self.store.deck_by_name(deck_name) {
            Ok(Some(deck)) => deck,
            Ok(None) => {
                self.deck_not_found(deck_name);
                self.set_state(SessionState::AwaitingCommand);
                return;
            }
            Err(e) => return self.storage_failed("analyzing the deck", e),
        };

        let weakest = match self.store.weakest_card(&deck.id) {
            Ok(Some(card)) if card.lapses > 0 => card,
            Ok(_) => {
                self.narrate(format!(
                    "You don't seem to have any weak points in \"{}\" right now. Great job!",
                    deck_name
                ));
                self.set_state(SessionState::ShowingDecks);
                return;
            }
            Err(e) => return self.storage_failed("analyzing the deck", e),
        };

        self.status("Found weak point, generating new cards...");
        self.narrate(format!(
            "It looks like you're struggling with: \"{}\". I'll consult my knowledge base to create some new cards to help you practice.",
            weakest.question
        ));

        let context = self
            .knowledge
            .find_relevant_chunk(&format!("{} {}", weakest.question, weakest.answer))
            .map(str::to_string);
        if context.is_none() {
            self.narrate("I couldn't find specific information on that topic in my knowledge base, but I'll try to create some cards anyway.");
        }

        let count = self.weak_point_card_count;
        self.request(
            AssistantRequest::TargetedCards {
                card: weakest,
                context,
                count,
            },
            PendingReply::WeakPoint {
                deck_id: deck.id,
                deck_name: deck_name.to_string(),
            },
        );
    }

    fn weak_point_cards_generated(
        &mut self,
        deck_id: &str,
        deck_name: &str,
        result: Result<AssistantReply, String>,
    ) {
        self.set_state(SessionState::ShowingDecks);
        let cards = match result {
            Ok(AssistantReply::Cards(cards)) if !cards.is_empty() => cards,
            other => {
                warn!("Remediation cards for '{}' failed: {:?}", deck_name, other.err());
                self.narrate("I had some trouble generating new cards for that topic. Please try again later.");
                return;
            }
        };

        let today = self.today();
        for card in &cards {
            if let Err(e) = self.store.create_card(
                deck_id,
                &card.question,
                &card.answer,
                card.explanation.as_deref(),
                today,
            ) {
                error!("Failed to save remediation card: {}", e);
                self.narrate("Sorry, something went wrong while saving the new cards. Please try again.");
                return;
            }
        }
        self.narrate(format!(
            "I've added {} new cards to the \"{}\" deck to help you master this topic.",
            cards.len(),
            deck_name
        ));
    }

    // ---- image, audio and text tools ----

    fn show_image_generation_view(&mut self) {
        self.set_state(SessionState::GeneratingImage);
        self.status("Enter a prompt to generate an image.");
        self.narrate("What kind of image would you like me to create?");
    }

    fn generate_image(&mut self, prompt: String) {
        if self.state != SessionState::GeneratingImage || self.view.generating_image {
            debug!("generateImage ignored in {}", self.state);
            return;
        }
        self.view.generating_image = true;
        self.view.generated_image = None;
        self.status(format!("Generating an image of \"{}\"...", prompt));
        self.narrate(format!(
            "Okay, generating an image of {}. This might take a moment.",
            prompt
        ));
        self.request(AssistantRequest::GenerateImage { prompt }, PendingReply::Image);
    }

    fn image_generated(&mut self, result: Result<AssistantReply, String>) {
        self.view.generating_image = false;
        match result {
            Ok(AssistantReply::Image(url)) if !url.is_empty() => {
                self.view.generated_image = Some(url);
                self.status("Image generated successfully.");
                self.narrate("Here is the image you requested.");
            }
            other => {
                warn!("Image generation failed: {:?}", other.err());
                self.status("Sorry, I failed to generate the image.");
                self.narrate("Sorry, I had a problem generating that image. Please try again.");
            }
        }
    }

    fn show_image_analysis_view(&mut self) {
        self.set_state(SessionState::AnalyzingImage);
        self.status("Upload an image to analyze.");
        self.narrate("Please upload an image, and let me know what you want to know about it.");
    }

    fn attach_image(&mut self, image: ImageAttachment) {
        if self.state != SessionState::AnalyzingImage || self.view.analyzing_image {
            debug!("attachImage ignored in {}", self.state);
            return;
        }
        self.view.image_to_analyze = Some(image);
        self.view.analysis_result = None;
    }

    fn analyze_image(&mut self, prompt: String) {
        if self.state != SessionState::AnalyzingImage || self.view.analyzing_image {
            debug!("analyzeImage ignored in {}", self.state);
            return;
        }
        let Some(image) = self.view.image_to_analyze.clone() else {
            return self.narrate("Please upload an image first.");
        };
        self.view.analyzing_image = true;
        self.view.analysis_result = None;
        self.status("Analyzing image...");
        self.narrate("Okay, analyzing the image. One moment.");
        self.request(
            AssistantRequest::AnalyzeImage { prompt, image },
            PendingReply::ImageAnalysis,
        );
    }

    fn image_analyzed(&mut self, result: Result<AssistantReply, String>) {
        self.view.analyzing_image = false;
        match result {
            Ok(AssistantReply::Text(text)) if !text.trim().is_empty() => {
                self.view.analysis_result = Some(text);
                self.status("Image analysis complete.");
                self.narrate("Here is the analysis of the image.");
            }
            other => {
                warn!("Image analysis failed: {:?}", other.err());
                self.narrate("Sorry, I couldn't analyze that image. Please try again.");
            }
        }
    }

    fn show_transcription_view(&mut self) {
        self.set_state(SessionState::TranscribingAudio);
        self.view.transcription_result = None;
        self.status("Ready to transcribe audio.");
        self.narrate("I'm ready to transcribe. Press the record button to start.");
    }

    fn start_recording(&mut self) {
        if self.state != SessionState::TranscribingAudio
            || self.recording.is_some()
            || self.view.transcribing
        {
            debug!("startRecording ignored in {}", self.state);
            return;
        }
        let recording_id = RecordingId(self.next_recording_id);
        self.next_recording_id += 1;
        self.recording = Some(recording_id);
        self.view.recording = true;
        self.view.transcription_result = None;
        self.outbox.push(Effect::StartRecording(recording_id));
        self.status("Recording...");
    }

    fn stop_recording(&mut self) {
        if self.state != SessionState::TranscribingAudio || !self.view.recording {
            debug!("stopRecording ignored in {}", self.state);
            return;
        }
        let Some(recording_id) = self.recording else {
            return;
        };
        self.view.recording = false;
        self.outbox.push(Effect::StopRecording(recording_id));
    }

    fn recording_finished(&mut self, recording_id: RecordingId, audio: Vec<u8>, mime_type: String) {
        if self.recording != Some(recording_id) || self.state != SessionState::TranscribingAudio {
            debug!("Dropping audio from stale recording {}", recording_id);
            return;
        }
        self.recording = None;
        self.view.recording = false;
        self.view.transcribing = true;
        self.status("Transcribing audio...");
        self.request(
            AssistantRequest::Transcribe { audio, mime_type },
            PendingReply::Transcription,
        );
    }

    fn recording_failed(&mut self, recording_id: RecordingId, reason: &str) {
        if self.recording != Some(recording_id) {
            return;
        }
        warn!("Recording {} failed: {}", recording_id, reason);
        self.recording = None;
        self.view.recording = false;
        self.status("Could not start recording. Please check microphone permissions.");
    }

    fn transcribed(&mut self, result: Result<AssistantReply, String>) {
        self.view.transcribing = false;
        match result {
            Ok(AssistantReply::Text(text)) => {
                self.view.transcription_result = Some(text);
                self.status("Transcription complete.");
            }
            other => {
                warn!("Transcription failed: {:?}", other.err());
                self.status("Sorry, I couldn't transcribe that recording.");
            }
        }
    }

    fn show_text_analysis_view(&mut self) {
        self.set_state(SessionState::AnalyzingText);
        self.status("Enter some text to analyze.");
        self.narrate("Please provide the text you want me to analyze, and tell me what you want to know.");
    }

    fn analyze_text(&mut self, text: String, prompt: String, complexity: TextComplexity) {
        if self.state != SessionState::AnalyzingText || self.view.analyzing_text {
            debug!("analyzeText ignored in {}", self.state);
            return;
        }
        self.view.analyzing_text = true;
        self.view.text_analysis_result = None;
        self.status("Analyzing text...");
        self.narrate(format!(
            "Okay, analyzing the text using the {} model. One moment.",
            complexity
        ));
        self.request(
            AssistantRequest::AnalyzeText {
                text,
                prompt,
                complexity,
            },
            PendingReply::TextAnalysis,
        );
    }

    fn text_analyzed(&mut self, result: Result<AssistantReply, String>) {
        self.view.analyzing_text = false;
        match result {
            Ok(AssistantReply::Text(text)) if !text.trim().is_empty() => {
                self.view.text_analysis_result = Some(text);
                self.status("Text analysis complete.");
                self.narrate("Here is the analysis.");
            }
            other => {
                warn!("Text analysis failed: {:?}", other.err());
                self.narrate("Sorry, I couldn't analyze that text. Please try again.");
            }
        }
    }

    // ---- assistant replies ----

    fn assistant_replied(&mut self, request_id: RequestId, result: Result<AssistantReply, String>) {
        let Some(pending) = self.pending.remove(&request_id) else {
            debug!("Dropping stale assistant reply {}", request_id);
            return;
        };
        if pending.owner() != self.state {
            debug!("Dropping reply {} for {} while in {}", request_id, pending.owner(), self.state);
            return;
        }

        match pending {
            PendingReply::Conversation => self.conversation_replied(result),
            PendingReply::CardExplanation => self.card_explanation_replied(result),
            PendingReply::DeckGeneration { deck_name } => self.deck_generated(&deck_name, result),
            PendingReply::WeakPoint { deck_id, deck_name } => {
                self.weak_point_cards_generated(&deck_id, &deck_name, result)
            }
            PendingReply::Image => self.image_generated(result),
            PendingReply::ImageAnalysis => self.image_analyzed(result),
            PendingReply::Transcription => self.transcribed(result),
            PendingReply::TextAnalysis => self.text_analyzed(result),
        }
    }
}
