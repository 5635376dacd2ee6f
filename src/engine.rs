//! Event-driven session controller.
//!
//! The UI and the player feed [`SessionEvent`]s into [`SessionEngine::handle`];
//! the engine answers with [`Command`]s for the player and the terminal, and
//! exposes what to show through [`SessionEngine::view`]. Nothing here blocks
//! or talks to a device directly, so the whole flow runs headless in tests.

use std::cell::Cell;
use std::io;
use std::path::PathBuf;
use std::rc::Rc;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Local, TimeDelta};
use tracing::{debug, error, info, warn};

use crate::config::Entry;
use crate::error::{Result, SessionError};
use crate::grammar::{Method, ACR_LABELS, DSIS_LABELS};
use crate::logger::{QuestionnaireLog, QuestionnairePhase, RatingLog};
use crate::media::MediaLibrary;
use crate::questionnaire::{Question, QuestionnaireAnswer};
use crate::sampler::{LiveRating, Sampler, SAMPLE_INTERVAL};
use crate::session::SessionState;

pub const BACK_CONFIRM_WINDOW: Duration = Duration::from_millis(2000);
pub const BACK_AGAIN_NOTICE: &str = "Press back again to cancel.";

pub const DEFAULT_START_MESSAGE: &str =
    "Welcome! You will watch a series of short videos and rate the quality of each one.\nPress Enter to begin.";
pub const DEFAULT_TRAINING_MESSAGE: &str =
    "The next videos are for training, so you can get used to the rating procedure.\nPress Enter to start the training.";
pub const TRAINING_COMPLETE_MESSAGE: &str =
    "Training is complete. The actual test starts now.\nPress Enter to continue.";
pub const DEFAULT_FINISH_MESSAGE: &str = "The test is complete. Thank you for participating!";

pub const LIVE_RATING_MIN: i32 = 1;
pub const LIVE_RATING_MAX: i32 = 5;
pub const LIVE_RATING_DEFAULT: i32 = 3;

/// Source of wall-clock time for timestamps, countdowns and the back window.
pub trait Clock {
    fn now(&self) -> DateTime<Local>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Local> {
        Local::now()
    }
}

/// Clock that only moves when told to. Clones share the same time.
#[derive(Debug, Clone)]
pub struct ManualClock {
    now: Rc<Cell<DateTime<Local>>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Local>) -> Self {
        Self {
            now: Rc::new(Cell::new(start)),
        }
    }

    pub fn advance(&self, by: Duration) {
        let delta = TimeDelta::milliseconds(by.as_millis() as i64);
        self.now.set(self.now.get() + delta);
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new(Local::now())
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Local> {
        self.now.get()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    NotStarted,
    ShowingStart,
    ShowingPreQuestionnaire,
    ShowingTrainingIntro,
    PreparingEntry,
    PlayingVideo,
    ShowingBreak,
    AwaitingRating,
    ShowingTrainingComplete,
    ShowingPostQuestionnaire,
    ShowingFinish,
    Terminated,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    Begin,
    /// Continue from a message screen or a break.
    Acknowledge,
    /// Values for the current question; empty means skipped.
    Answer(Vec<String>),
    SizeKnown { width: u32, height: u32 },
    Prepared,
    PlaybackCompleted,
    PlaybackError(i32),
    RatingSubmitted(i32),
    /// Live rating change during time-continuous playback.
    RatingAdjusted(i32),
    Tick,
    Back,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Prepare(PathBuf),
    StartPlayback,
    StopPlayback,
    /// A timed break ran out; the participant may continue.
    BreakElapsed,
    Notice(String),
    Exit,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RatingScale {
    Categorical(&'static [(&'static str, i32)]),
    Slider { min: i32, max: i32, initial: i32 },
}

impl RatingScale {
    pub fn for_method(method: Method) -> Self {
        match method {
            Method::Dsis => RatingScale::Categorical(&DSIS_LABELS),
            Method::Continuous => RatingScale::Slider {
                min: 0,
                max: 100,
                initial: 50,
            },
            Method::TimeContinuous => RatingScale::Slider {
                min: LIVE_RATING_MIN,
                max: LIVE_RATING_MAX,
                initial: LIVE_RATING_DEFAULT,
            },
            Method::AcrCategorical | Method::Undefined => RatingScale::Categorical(&ACR_LABELS),
        }
    }

    pub fn accepts(&self, value: i32) -> bool {
        match self {
            RatingScale::Categorical(labels) => labels.iter().any(|(_, v)| *v == value),
            RatingScale::Slider { min, max, .. } => (*min..=*max).contains(&value),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageKind {
    Start,
    TrainingIntro,
    TrainingComplete,
    Finish,
}

/// What the render sink should currently show.
#[derive(Debug, Clone, PartialEq)]
pub enum View {
    Idle,
    Message {
        kind: MessageKind,
        text: String,
    },
    Question {
        phase: QuestionnairePhase,
        number: usize,
        total: usize,
        intro: Option<String>,
        question: Question,
        error: Option<String>,
    },
    Preparing {
        position: usize,
        total: usize,
        video: String,
        training: bool,
    },
    Playing {
        position: usize,
        total: usize,
        video: String,
        training: bool,
        live_rating: Option<i32>,
    },
    Break {
        remaining_secs: Option<u64>,
        can_continue: bool,
    },
    Rating {
        video: String,
        scale: RatingScale,
    },
}

#[derive(Debug, Clone)]
pub struct EngineOptions {
    pub logs_dir: PathBuf,
    pub sample_interval: Duration,
    pub back_window: Duration,
}

impl EngineOptions {
    pub fn new(logs_dir: impl Into<PathBuf>) -> Self {
        Self {
            logs_dir: logs_dir.into(),
            sample_interval: SAMPLE_INTERVAL,
            back_window: BACK_CONFIRM_WINDOW,
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct BreakTimer {
    started_at: DateTime<Local>,
    duration_secs: Option<u32>,
    elapsed: bool,
}

fn seconds_between(from: DateTime<Local>, to: DateTime<Local>) -> f64 {
    (to - from).num_milliseconds() as f64 / 1000.0
}

fn poisoned() -> SessionError {
    SessionError::Io(io::Error::other("rating log lock poisoned"))
}

pub struct SessionEngine {
    state: SessionState,
    phase: Phase,
    media: Box<dyn MediaLibrary>,
    clock: Box<dyn Clock>,
    options: EngineOptions,
    started_at: Option<DateTime<Local>>,
    rating_log: Option<Arc<Mutex<RatingLog>>>,
    rating_log_path: Option<PathBuf>,
    questionnaire_log: Option<QuestionnaireLog>,
    live: Arc<LiveRating>,
    sampler: Option<Sampler>,
    size_known: bool,
    prepared: bool,
    prompt_shown_at: Option<DateTime<Local>>,
    break_timer: Option<BreakTimer>,
    question_index: usize,
    question_error: Option<String>,
    last_back: Option<DateTime<Local>>,
}

impl SessionEngine {
    pub fn new(
        state: SessionState,
        media: Box<dyn MediaLibrary>,
        clock: Box<dyn Clock>,
        options: EngineOptions,
    ) -> Self {
        Self {
            state,
            phase: Phase::NotStarted,
            media,
            clock,
            options,
            started_at: None,
            rating_log: None,
            rating_log_path: None,
            questionnaire_log: None,
            live: Arc::new(LiveRating::new(LIVE_RATING_DEFAULT)),
            sampler: None,
            size_known: false,
            prepared: false,
            prompt_shown_at: None,
            break_timer: None,
            question_index: 0,
            question_error: None,
            last_back: None,
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn is_terminated(&self) -> bool {
        self.phase == Phase::Terminated
    }

    /// Path of the ratings file once the start screen has been acknowledged.
    pub fn rating_log_path(&self) -> Option<&PathBuf> {
        self.rating_log_path.as_ref()
    }

    pub fn live_rating(&self) -> i32 {
        self.live.get()
    }

    pub fn handle(&mut self, event: SessionEvent) -> Result<Vec<Command>> {
        use Phase::*;

        if event == SessionEvent::Back {
            return Ok(self.on_back());
        }

        match (self.phase, event) {
            (NotStarted, SessionEvent::Begin) => {
                info!(
                    participant = self.state.participant_id,
                    method = %self.state.method,
                    entries = self.state.entries.len(),
                    "session started"
                );
                self.phase = ShowingStart;
                Ok(vec![])
            }
            (ShowingStart, SessionEvent::Acknowledge) => self.on_start_acknowledged(),
            (ShowingPreQuestionnaire | ShowingPostQuestionnaire, SessionEvent::Answer(values)) => {
                self.on_answer(values)
            }
            (ShowingTrainingIntro, SessionEvent::Acknowledge) => self.prepare_current(),
            (PreparingEntry, SessionEvent::SizeKnown { width, height }) => {
                if width == 0 || height == 0 {
                    warn!(width, height, "player reported an empty video size");
                }
                self.size_known = true;
                Ok(self.maybe_start_playback())
            }
            (PreparingEntry, SessionEvent::Prepared) => {
                self.prepared = true;
                Ok(self.maybe_start_playback())
            }
            (PreparingEntry | PlayingVideo, SessionEvent::PlaybackError(code)) => {
                self.on_playback_error(code)
            }
            (PlayingVideo, SessionEvent::RatingAdjusted(delta)) => {
                self.adjust_live_rating(delta);
                Ok(vec![])
            }
            (PlayingVideo, SessionEvent::PlaybackCompleted) => self.on_playback_completed(),
            (AwaitingRating, SessionEvent::RatingSubmitted(value)) => self.on_rating(value),
            (ShowingBreak, SessionEvent::Tick) => Ok(self.on_break_tick()),
            (ShowingBreak, SessionEvent::Acknowledge) => self.on_break_continue(),
            (ShowingTrainingComplete, SessionEvent::Acknowledge) => self.enter_next_entry(),
            (ShowingFinish, SessionEvent::Acknowledge) => Ok(self.terminate()),
            (phase, event) => {
                if event != SessionEvent::Tick {
                    debug!(?phase, ?event, "event ignored");
                }
                Ok(vec![])
            }
        }
    }

    fn on_start_acknowledged(&mut self) -> Result<Vec<Command>> {
        let now = self.clock.now();
        let log = RatingLog::create(
            &self.options.logs_dir,
            self.state.participant_id,
            self.state.method,
            &now,
        )?;
        self.rating_log_path = Some(log.path().to_path_buf());
        self.rating_log = Some(Arc::new(Mutex::new(log)));
        self.started_at = Some(now);

        if self.state.pre_questionnaire.is_some() {
            self.enter_questionnaire(Phase::ShowingPreQuestionnaire);
            return Ok(vec![]);
        }
        self.enter_next_entry()
    }

    fn enter_questionnaire(&mut self, phase: Phase) {
        debug!(?phase, "showing questionnaire");
        self.phase = phase;
        self.question_index = 0;
        self.question_error = None;
        self.prompt_shown_at = Some(self.clock.now());
    }

    fn questionnaire_phase(&self) -> QuestionnairePhase {
        if self.phase == Phase::ShowingPostQuestionnaire {
            QuestionnairePhase::Post
        } else {
            QuestionnairePhase::Pre
        }
    }

    fn current_question(&self) -> Option<&Question> {
        let questionnaire = match self.questionnaire_phase() {
            QuestionnairePhase::Pre => self.state.pre_questionnaire.as_ref(),
            QuestionnairePhase::Post => self.state.post_questionnaire.as_ref(),
        };
        questionnaire.and_then(|q| q.get(self.question_index))
    }

    fn on_answer(&mut self, values: Vec<String>) -> Result<Vec<Command>> {
        let kind = self.questionnaire_phase();
        let Some(question) = self.current_question().cloned() else {
            return self.leave_questionnaire(kind);
        };

        let values: Vec<String> = values
            .into_iter()
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
            .collect();
        if let Err(message) = question.check_answer(&values) {
            self.question_error = Some(message.clone());
            return Ok(vec![Command::Notice(message)]);
        }

        let now = self.clock.now();
        let duration = seconds_between(self.prompt_shown_at.unwrap_or(now), now);
        let answer = if values.is_empty() {
            QuestionnaireAnswer::skipped(now, duration)
        } else {
            QuestionnaireAnswer::multiple(values, now, duration)
        };

        if self.questionnaire_log.is_none() {
            self.questionnaire_log = Some(QuestionnaireLog::create(
                &self.options.logs_dir,
                self.state.participant_id,
                kind,
                &self.started_at.unwrap_or(now),
            )?);
        }
        if let Some(log) = self.questionnaire_log.as_mut() {
            log.log_answer(self.question_index + 1, &question, &answer)?;
        }
        match kind {
            QuestionnairePhase::Pre => self.state.pre_answers.push(answer),
            QuestionnairePhase::Post => self.state.post_answers.push(answer),
        }

        self.question_index += 1;
        self.question_error = None;
        self.prompt_shown_at = Some(now);
        if self.current_question().is_none() {
            return self.leave_questionnaire(kind);
        }
        Ok(vec![])
    }

    fn leave_questionnaire(&mut self, kind: QuestionnairePhase) -> Result<Vec<Command>> {
        self.questionnaire_log = None;
        self.question_index = 0;
        info!(%kind, "questionnaire complete");
        match kind {
            QuestionnairePhase::Pre => self.enter_next_entry(),
            QuestionnairePhase::Post => {
                self.enter_finish()?;
                Ok(vec![])
            }
        }
    }

    fn enter_next_entry(&mut self) -> Result<Vec<Command>> {
        if self.state.is_complete() {
            if self.state.post_questionnaire.is_some() {
                self.enter_questionnaire(Phase::ShowingPostQuestionnaire);
            } else {
                self.enter_finish()?;
            }
            return Ok(vec![]);
        }

        let index = self.state.current_index;
        if self.state.is_training_start(index) && !self.state.training_intro_shown {
            self.state.training_intro_shown = true;
            self.phase = Phase::ShowingTrainingIntro;
            debug!(index, "showing training intro");
            return Ok(vec![]);
        }
        self.prepare_current()
    }

    fn prepare_current(&mut self) -> Result<Vec<Command>> {
        match self.state.current_entry().cloned() {
            None => self.enter_next_entry(),
            Some(Entry::Break(duration_secs)) => {
                let duration_secs = duration_secs.filter(|secs| *secs > 0);
                info!(index = self.state.current_index, ?duration_secs, "break");
                self.break_timer = Some(BreakTimer {
                    started_at: self.clock.now(),
                    duration_secs,
                    elapsed: duration_secs.is_none(),
                });
                self.phase = Phase::ShowingBreak;
                Ok(vec![])
            }
            Some(Entry::Video(name)) => {
                debug!(index = self.state.current_index, video = %name, "preparing video");
                self.size_known = false;
                self.prepared = false;
                self.phase = Phase::PreparingEntry;
                Ok(vec![Command::Prepare(self.media.path_of(&name))])
            }
        }
    }

    fn current_video(&self) -> String {
        self.state
            .current_entry()
            .and_then(Entry::video_name)
            .unwrap_or_default()
            .to_string()
    }

    fn maybe_start_playback(&mut self) -> Vec<Command> {
        if !(self.size_known && self.prepared) {
            return vec![];
        }
        self.phase = Phase::PlayingVideo;
        if self.state.method == Method::TimeContinuous {
            self.live.set(LIVE_RATING_DEFAULT);
            self.live.set_playing(true);
            if let Some(log) = &self.rating_log {
                self.sampler = Some(Sampler::start(
                    log.clone(),
                    self.live.clone(),
                    self.state.current_index,
                    self.current_video(),
                    self.options.sample_interval,
                ));
            }
        }
        vec![Command::StartPlayback]
    }

    fn stop_sampler(&mut self) {
        self.live.set_playing(false);
        if let Some(mut sampler) = self.sampler.take() {
            sampler.stop();
        }
    }

    fn adjust_live_rating(&mut self, delta: i32) {
        if self.state.method != Method::TimeContinuous {
            return;
        }
        let value = (self.live.get() + delta).clamp(LIVE_RATING_MIN, LIVE_RATING_MAX);
        self.live.set(value);
    }

    fn on_playback_completed(&mut self) -> Result<Vec<Command>> {
        self.stop_sampler();
        let index = self.state.current_index;
        if self.state.method == Method::TimeContinuous {
            let now = self.clock.now();
            self.state.record_rating(self.live.get(), now);
            return self.after_entry(index);
        }
        self.phase = Phase::AwaitingRating;
        self.prompt_shown_at = Some(self.clock.now());
        Ok(vec![])
    }

    fn on_rating(&mut self, value: i32) -> Result<Vec<Command>> {
        if !RatingScale::for_method(self.state.method).accepts(value) {
            warn!(value, "rating outside of scale");
            return Ok(vec![Command::Notice(format!("{value} is not a valid rating"))]);
        }
        let now = self.clock.now();
        let duration = self.prompt_shown_at.map(|shown| seconds_between(shown, now));
        let index = self.state.current_index;
        let video = self.current_video();

        self.write_rating_log(|log| log.log_rating(index, &video, value, &now, duration))?;
        self.state.record_rating(value, now);
        self.prompt_shown_at = None;
        self.after_entry(index)
    }

    fn on_break_tick(&mut self) -> Vec<Command> {
        let now = self.clock.now();
        match self.break_timer.as_mut() {
            Some(timer) if !timer.elapsed => {
                let due = timer.duration_secs.unwrap_or_default() as f64;
                if seconds_between(timer.started_at, now) >= due {
                    timer.elapsed = true;
                    info!("break countdown finished");
                    vec![Command::BreakElapsed]
                } else {
                    vec![]
                }
            }
            _ => vec![],
        }
    }

    fn on_break_continue(&mut self) -> Result<Vec<Command>> {
        if !self.break_timer.is_some_and(|t| t.elapsed) {
            return Ok(vec![]);
        }
        self.break_timer = None;
        let index = self.state.current_index;
        self.write_rating_log(|log| log.log_break())?;
        self.state.record_break(self.clock.now());
        self.after_entry(index)
    }

    fn after_entry(&mut self, index: usize) -> Result<Vec<Command>> {
        if self.state.is_training_end(index)
            && !self.state.training_complete_shown
            && !self.state.is_complete()
        {
            self.state.training_complete_shown = true;
            self.phase = Phase::ShowingTrainingComplete;
            info!(index, "training complete");
            return Ok(vec![]);
        }
        self.enter_next_entry()
    }

    fn on_playback_error(&mut self, code: i32) -> Result<Vec<Command>> {
        error!(code, index = self.state.current_index, "playback error, finishing session");
        self.stop_sampler();
        self.enter_finish()?;
        Ok(vec![
            Command::StopPlayback,
            Command::Notice(format!("Playback failed (error {code}). The session has ended.")),
        ])
    }

    fn write_rating_log(&self, write: impl FnOnce(&mut RatingLog) -> Result<()>) -> Result<()> {
        match &self.rating_log {
            Some(log) => {
                let mut log = log.lock().map_err(|_| poisoned())?;
                write(&mut log)
            }
            None => Ok(()),
        }
    }

    fn close_logs(&mut self) -> Result<()> {
        self.stop_sampler();
        self.questionnaire_log = None;
        if let Some(log) = self.rating_log.take() {
            log.lock().map_err(|_| poisoned())?.close()?;
        }
        Ok(())
    }

    fn enter_finish(&mut self) -> Result<()> {
        self.break_timer = None;
        self.close_logs()?;
        self.phase = Phase::ShowingFinish;
        info!(
            participant = self.state.participant_id,
            rated = self.state.ratings.len(),
            "session finished"
        );
        Ok(())
    }

    fn terminate(&mut self) -> Vec<Command> {
        self.state.reset();
        self.phase = Phase::Terminated;
        vec![Command::Exit]
    }

    fn on_back(&mut self) -> Vec<Command> {
        if matches!(self.phase, Phase::NotStarted | Phase::Terminated) {
            return vec![];
        }
        let now = self.clock.now();
        let window = TimeDelta::milliseconds(self.options.back_window.as_millis() as i64);
        let confirmed = self.last_back.is_some_and(|prev| now - prev <= window);
        if !confirmed {
            self.last_back = Some(now);
            return vec![Command::Notice(BACK_AGAIN_NOTICE.to_string())];
        }
        self.cancel()
    }

    fn cancel(&mut self) -> Vec<Command> {
        warn!(
            participant = self.state.participant_id,
            index = self.state.current_index,
            "session cancelled"
        );
        let mut commands = vec![];
        if matches!(self.phase, Phase::PreparingEntry | Phase::PlayingVideo) {
            commands.push(Command::StopPlayback);
        }
        self.break_timer = None;
        if let Err(e) = self.close_logs() {
            error!(error = %e, "failed to close logs on cancel");
        }
        commands.extend(self.terminate());
        commands
    }

    pub fn view(&self) -> View {
        let messages = &self.state.messages;
        let position = self.state.current_index + 1;
        let total = self.state.entries.len();
        let training = self.state.is_training(self.state.current_index);

        match self.phase {
            Phase::NotStarted | Phase::Terminated => View::Idle,
            Phase::ShowingStart => View::Message {
                kind: MessageKind::Start,
                text: messages.start.clone().unwrap_or_else(|| DEFAULT_START_MESSAGE.into()),
            },
            Phase::ShowingTrainingIntro => View::Message {
                kind: MessageKind::TrainingIntro,
                text: messages
                    .training
                    .clone()
                    .unwrap_or_else(|| DEFAULT_TRAINING_MESSAGE.into()),
            },
            Phase::ShowingTrainingComplete => View::Message {
                kind: MessageKind::TrainingComplete,
                text: TRAINING_COMPLETE_MESSAGE.into(),
            },
            Phase::ShowingFinish => View::Message {
                kind: MessageKind::Finish,
                text: messages.finish.clone().unwrap_or_else(|| DEFAULT_FINISH_MESSAGE.into()),
            },
            Phase::ShowingPreQuestionnaire | Phase::ShowingPostQuestionnaire => {
                let kind = self.questionnaire_phase();
                let (questionnaire, intro) = match kind {
                    QuestionnairePhase::Pre => {
                        (&self.state.pre_questionnaire, &messages.pre_questionnaire)
                    }
                    QuestionnairePhase::Post => {
                        (&self.state.post_questionnaire, &messages.post_questionnaire)
                    }
                };
                match self.current_question() {
                    Some(question) => View::Question {
                        phase: kind,
                        number: self.question_index + 1,
                        total: questionnaire.as_ref().map_or(0, |q| q.len()),
                        intro: intro.clone().filter(|_| self.question_index == 0),
                        question: question.clone(),
                        error: self.question_error.clone(),
                    },
                    None => View::Idle,
                }
            }
            Phase::PreparingEntry => View::Preparing {
                position,
                total,
                video: self.current_video(),
                training,
            },
            Phase::PlayingVideo => View::Playing {
                position,
                total,
                video: self.current_video(),
                training,
                live_rating: (self.state.method == Method::TimeContinuous).then(|| self.live.get()),
            },
            Phase::ShowingBreak => {
                let now = self.clock.now();
                let (remaining_secs, can_continue) = match self.break_timer {
                    Some(timer) => (
                        timer.duration_secs.map(|secs| {
                            let left = secs as f64 - seconds_between(timer.started_at, now);
                            left.max(0.0).ceil() as u64
                        }),
                        timer.elapsed,
                    ),
                    None => (None, false),
                };
                View::Break {
                    remaining_secs,
                    can_continue,
                }
            }
            Phase::AwaitingRating => View::Rating {
                video: self.current_video(),
                scale: RatingScale::for_method(self.state.method),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TrainingRange;
    use crate::questionnaire::{QuestionType, Questionnaire};
    use crate::session::BREAK_PLACEHOLDER_RATING;
    use assert_matches::assert_matches;
    use std::fs;
    use std::path::Path;
    use tempfile::{tempdir, TempDir};

    struct AllPresent;

    impl MediaLibrary for AllPresent {
        fn exists(&self, _name: &str) -> bool {
            true
        }

        fn path_of(&self, name: &str) -> PathBuf {
            Path::new("/media").join(name)
        }
    }

    fn video(name: &str) -> Entry {
        Entry::Video(name.to_string())
    }

    fn state(method: Method, entries: Vec<Entry>) -> SessionState {
        SessionState {
            participant_id: 7,
            method,
            entries,
            ..Default::default()
        }
    }

    fn engine(state: SessionState) -> (SessionEngine, ManualClock, TempDir) {
        let dir = tempdir().unwrap();
        let clock = ManualClock::default();
        let mut options = EngineOptions::new(dir.path());
        options.sample_interval = Duration::from_millis(5);
        let engine = SessionEngine::new(state, Box::new(AllPresent), Box::new(clock.clone()), options);
        (engine, clock, dir)
    }

    fn send(engine: &mut SessionEngine, event: SessionEvent) -> Vec<Command> {
        engine.handle(event).unwrap()
    }

    fn start(engine: &mut SessionEngine) -> Vec<Command> {
        send(engine, SessionEvent::Begin);
        send(engine, SessionEvent::Acknowledge)
    }

    fn play_through(engine: &mut SessionEngine) {
        send(engine, SessionEvent::SizeKnown { width: 1920, height: 1080 });
        send(engine, SessionEvent::Prepared);
        send(engine, SessionEvent::PlaybackCompleted);
    }

    fn log_lines(engine: &SessionEngine) -> Vec<String> {
        let path = engine.rating_log_path().unwrap();
        fs::read_to_string(path)
            .unwrap()
            .lines()
            .map(str::to_string)
            .collect()
    }

    #[test]
    fn acr_session_with_training_and_break() {
        let mut s = state(
            Method::AcrCategorical,
            vec![video("t.mp4"), video("a.mp4"), Entry::Break(None), video("b.mp4")],
        );
        s.training_range = Some(TrainingRange::new(0, 0));
        let (mut engine, clock, _dir) = engine(s);

        assert_eq!(send(&mut engine, SessionEvent::Begin), vec![]);
        assert_matches!(engine.view(), View::Message { kind: MessageKind::Start, .. });
        assert_eq!(send(&mut engine, SessionEvent::Acknowledge), vec![]);
        assert_eq!(engine.phase(), Phase::ShowingTrainingIntro);

        assert_eq!(
            send(&mut engine, SessionEvent::Acknowledge),
            vec![Command::Prepare(PathBuf::from("/media/t.mp4"))]
        );
        play_through(&mut engine);
        assert_eq!(engine.phase(), Phase::AwaitingRating);
        clock.advance(Duration::from_millis(1500));
        send(&mut engine, SessionEvent::RatingSubmitted(4));
        assert_eq!(engine.phase(), Phase::ShowingTrainingComplete);

        assert_eq!(
            send(&mut engine, SessionEvent::Acknowledge),
            vec![Command::Prepare(PathBuf::from("/media/a.mp4"))]
        );
        play_through(&mut engine);
        send(&mut engine, SessionEvent::RatingSubmitted(5));
        assert_eq!(engine.phase(), Phase::ShowingBreak);
        assert_matches!(engine.view(), View::Break { remaining_secs: None, can_continue: true });

        assert_eq!(
            send(&mut engine, SessionEvent::Acknowledge),
            vec![Command::Prepare(PathBuf::from("/media/b.mp4"))]
        );
        play_through(&mut engine);
        send(&mut engine, SessionEvent::RatingSubmitted(1));
        assert_eq!(engine.phase(), Phase::ShowingFinish);
        assert_eq!(engine.state().ratings, vec![4, 5, BREAK_PLACEHOLDER_RATING, 1]);
        assert_eq!(engine.state().rating_timestamps.len(), 4);

        let lines = log_lines(&engine);
        assert_eq!(lines.len(), 5);
        assert!(lines[1].starts_with("0,t.mp4,4,"));
        assert!(lines[1].ends_with(",1.500"));
        assert_eq!(lines[3], "-1,BREAK,,,");
        assert!(lines[4].starts_with("3,b.mp4,1,"));

        assert_eq!(send(&mut engine, SessionEvent::Acknowledge), vec![Command::Exit]);
        assert!(engine.is_terminated());
        assert_eq!(*engine.state(), SessionState::default());
    }

    #[test]
    fn playback_waits_for_size_and_prepared_in_any_order() {
        let (mut engine, _clock, _dir) = engine(state(Method::AcrCategorical, vec![video("a.mp4")]));
        start(&mut engine);
        assert_eq!(send(&mut engine, SessionEvent::Prepared), vec![]);
        assert_eq!(engine.phase(), Phase::PreparingEntry);
        assert_eq!(
            send(&mut engine, SessionEvent::SizeKnown { width: 640, height: 360 }),
            vec![Command::StartPlayback]
        );
        assert_eq!(engine.phase(), Phase::PlayingVideo);
        // a late duplicate signal does not restart playback
        assert_eq!(send(&mut engine, SessionEvent::Prepared), vec![]);
    }

    #[test]
    fn timed_break_enables_continue_when_elapsed() {
        let (mut engine, clock, _dir) = engine(state(
            Method::AcrCategorical,
            vec![Entry::Break(Some(10)), video("a.mp4")],
        ));
        start(&mut engine);
        assert_matches!(engine.view(), View::Break { remaining_secs: Some(10), can_continue: false });

        assert_eq!(send(&mut engine, SessionEvent::Acknowledge), vec![]);
        assert_eq!(engine.phase(), Phase::ShowingBreak);

        clock.advance(Duration::from_secs(4));
        assert_eq!(send(&mut engine, SessionEvent::Tick), vec![]);
        assert_matches!(engine.view(), View::Break { remaining_secs: Some(6), .. });

        clock.advance(Duration::from_secs(6));
        assert_eq!(send(&mut engine, SessionEvent::Tick), vec![Command::BreakElapsed]);
        assert_eq!(send(&mut engine, SessionEvent::Tick), vec![]);

        assert_eq!(
            send(&mut engine, SessionEvent::Acknowledge),
            vec![Command::Prepare(PathBuf::from("/media/a.mp4"))]
        );
        assert_eq!(engine.state().ratings, vec![BREAK_PLACEHOLDER_RATING]);
    }

    #[test]
    fn zero_second_break_is_untimed() {
        let (mut engine, _clock, _dir) = engine(state(Method::AcrCategorical, vec![Entry::Break(Some(0))]));
        start(&mut engine);
        assert_matches!(engine.view(), View::Break { remaining_secs: None, can_continue: true });
        send(&mut engine, SessionEvent::Acknowledge);
        assert_eq!(engine.phase(), Phase::ShowingFinish);
    }

    #[test]
    fn back_needs_confirmation_within_window() {
        let (mut engine, clock, _dir) = engine(state(Method::AcrCategorical, vec![video("a.mp4")]));
        start(&mut engine);
        let path = engine.rating_log_path().unwrap().clone();

        assert_eq!(
            send(&mut engine, SessionEvent::Back),
            vec![Command::Notice(BACK_AGAIN_NOTICE.into())]
        );
        clock.advance(Duration::from_millis(2500));
        assert_eq!(
            send(&mut engine, SessionEvent::Back),
            vec![Command::Notice(BACK_AGAIN_NOTICE.into())]
        );
        assert_eq!(engine.phase(), Phase::PreparingEntry);

        clock.advance(Duration::from_millis(500));
        assert_eq!(
            send(&mut engine, SessionEvent::Back),
            vec![Command::StopPlayback, Command::Exit]
        );
        assert!(engine.is_terminated());
        assert_eq!(*engine.state(), SessionState::default());
        assert_eq!(fs::read_to_string(path).unwrap().lines().count(), 1);
    }

    #[test]
    fn cancel_during_timed_break_writes_nothing() {
        let (mut engine, clock, _dir) = engine(state(
            Method::AcrCategorical,
            vec![Entry::Break(Some(10)), video("a.mp4")],
        ));
        start(&mut engine);
        assert_eq!(engine.phase(), Phase::ShowingBreak);
        let path = engine.rating_log_path().unwrap().clone();

        send(&mut engine, SessionEvent::Back);
        assert_eq!(send(&mut engine, SessionEvent::Back), vec![Command::Exit]);

        clock.advance(Duration::from_secs(20));
        assert_eq!(send(&mut engine, SessionEvent::Tick), vec![]);
        assert_eq!(send(&mut engine, SessionEvent::Acknowledge), vec![]);
        assert!(engine.is_terminated());
        assert!(engine.state().ratings.is_empty());
        let contents = fs::read_to_string(path).unwrap();
        assert_eq!(
            contents.lines().collect::<Vec<_>>(),
            vec!["video_position,video_name,rating,rated_at,rating_duration"]
        );
    }

    #[test]
    fn cancel_during_time_continuous_playback_stops_sampling() {
        let (mut engine, _clock, _dir) = engine(state(Method::TimeContinuous, vec![video("a.mp4")]));
        start(&mut engine);
        send(&mut engine, SessionEvent::SizeKnown { width: 1, height: 1 });
        send(&mut engine, SessionEvent::Prepared);
        std::thread::sleep(Duration::from_millis(30));
        let path = engine.rating_log_path().unwrap().clone();

        send(&mut engine, SessionEvent::Back);
        assert_eq!(
            send(&mut engine, SessionEvent::Back),
            vec![Command::StopPlayback, Command::Exit]
        );
        let rows = fs::read_to_string(&path).unwrap().lines().count();
        assert!(rows >= 2);

        std::thread::sleep(Duration::from_millis(50));
        let contents = fs::read_to_string(&path).unwrap();
        assert_eq!(contents.lines().count(), rows);
        assert!(contents.lines().skip(1).all(|l| l.starts_with("0,a.mp4,")));
    }

    #[test]
    fn playback_error_finishes_and_skips_post_questionnaire() {
        let mut s = state(Method::AcrCategorical, vec![video("a.mp4"), video("b.mp4")]);
        s.post_questionnaire = Some(Questionnaire::new(vec![Question::new(
            "Comments?",
            QuestionType::Text,
            &[],
            false,
        )]));
        let (mut engine, _clock, _dir) = engine(s);
        start(&mut engine);
        play_through(&mut engine);
        send(&mut engine, SessionEvent::RatingSubmitted(3));
        send(&mut engine, SessionEvent::SizeKnown { width: 1, height: 1 });
        send(&mut engine, SessionEvent::Prepared);

        let commands = send(&mut engine, SessionEvent::PlaybackError(700));
        assert_eq!(commands[0], Command::StopPlayback);
        assert_matches!(commands[1], Command::Notice(_));
        assert_eq!(engine.phase(), Phase::ShowingFinish);
        assert_eq!(log_lines(&engine).len(), 2);
    }

    #[test]
    fn questionnaires_validate_and_log_answers() {
        let mut s = state(Method::AcrCategorical, vec![video("a.mp4")]);
        s.messages.pre_questionnaire = Some("About you".into());
        s.pre_questionnaire = Some(Questionnaire::new(vec![
            Question::new("Age?", QuestionType::Number, &[], true),
            Question::new("Hobbies", QuestionType::MultipleChoice, &["Film", "Games"], false),
        ]));
        let (mut engine, _clock, dir) = engine(s);
        start(&mut engine);
        assert_eq!(engine.phase(), Phase::ShowingPreQuestionnaire);
        assert_matches!(
            engine.view(),
            View::Question { number: 1, total: 2, intro: Some(_), error: None, .. }
        );

        let commands = send(&mut engine, SessionEvent::Answer(vec!["".into()]));
        assert_matches!(commands.as_slice(), [Command::Notice(_)]);
        assert_matches!(engine.view(), View::Question { number: 1, error: Some(_), .. });

        send(&mut engine, SessionEvent::Answer(vec!["29".into()]));
        assert_matches!(engine.view(), View::Question { number: 2, intro: None, error: None, .. });
        let commands = send(
            &mut engine,
            SessionEvent::Answer(vec!["Film".into(), "Games".into()]),
        );
        assert_eq!(commands, vec![Command::Prepare(PathBuf::from("/media/a.mp4"))]);
        assert_eq!(engine.state().pre_answers.len(), 2);

        let questionnaire_log = fs::read_dir(dir.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .find(|p| p.to_string_lossy().ends_with("_pre_questionnaire.csv"))
            .unwrap();
        let contents = fs::read_to_string(questionnaire_log).unwrap();
        assert_eq!(contents.lines().count(), 4);
    }

    #[test]
    fn post_questionnaire_comes_before_finish() {
        let mut s = state(Method::AcrCategorical, vec![video("a.mp4")]);
        s.post_questionnaire = Some(Questionnaire::new(vec![Question::new(
            "Comments?",
            QuestionType::Text,
            &[],
            false,
        )]));
        let (mut engine, _clock, _dir) = engine(s);
        start(&mut engine);
        play_through(&mut engine);
        send(&mut engine, SessionEvent::RatingSubmitted(2));
        assert_eq!(engine.phase(), Phase::ShowingPostQuestionnaire);
        send(&mut engine, SessionEvent::Answer(vec![]));
        assert_eq!(engine.phase(), Phase::ShowingFinish);
        assert!(engine.state().post_answers[0].is_skipped());
    }

    #[test]
    fn training_complete_is_skipped_when_nothing_follows() {
        let mut s = state(Method::AcrCategorical, vec![video("t.mp4")]);
        s.training_range = Some(TrainingRange::new(0, 0));
        let (mut engine, _clock, _dir) = engine(s);
        start(&mut engine);
        send(&mut engine, SessionEvent::Acknowledge);
        play_through(&mut engine);
        send(&mut engine, SessionEvent::RatingSubmitted(3));
        assert_eq!(engine.phase(), Phase::ShowingFinish);
    }

    #[test]
    fn out_of_scale_rating_is_rejected() {
        let (mut engine, _clock, _dir) = engine(state(Method::Continuous, vec![video("a.mp4")]));
        start(&mut engine);
        play_through(&mut engine);
        assert_matches!(engine.view(), View::Rating { scale: RatingScale::Slider { min: 0, max: 100, initial: 50 }, .. });
        let commands = send(&mut engine, SessionEvent::RatingSubmitted(101));
        assert_matches!(commands.as_slice(), [Command::Notice(_)]);
        assert_eq!(engine.phase(), Phase::AwaitingRating);
        send(&mut engine, SessionEvent::RatingSubmitted(73));
        assert_eq!(engine.state().ratings, vec![73]);
    }

    #[test]
    fn dsis_uses_impairment_labels() {
        let (mut engine, _clock, _dir) = engine(state(Method::Dsis, vec![video("a.mp4")]));
        start(&mut engine);
        play_through(&mut engine);
        assert_matches!(engine.view(), View::Rating { scale: RatingScale::Categorical(labels), .. } if labels[0].0 == "Imperceptible");
    }

    #[test]
    fn time_continuous_streams_samples_without_prompt() {
        let (mut engine, _clock, _dir) = engine(state(
            Method::TimeContinuous,
            vec![video("a.mp4"), video("b.mp4")],
        ));
        start(&mut engine);
        send(&mut engine, SessionEvent::SizeKnown { width: 1, height: 1 });
        send(&mut engine, SessionEvent::Prepared);
        assert_matches!(engine.view(), View::Playing { live_rating: Some(3), .. });

        send(&mut engine, SessionEvent::RatingAdjusted(1));
        send(&mut engine, SessionEvent::RatingAdjusted(1));
        send(&mut engine, SessionEvent::RatingAdjusted(1));
        assert_eq!(engine.live_rating(), LIVE_RATING_MAX);
        std::thread::sleep(Duration::from_millis(30));

        let commands = send(&mut engine, SessionEvent::PlaybackCompleted);
        assert_eq!(commands, vec![Command::Prepare(PathBuf::from("/media/b.mp4"))]);
        assert_eq!(engine.state().ratings, vec![5]);

        let lines = log_lines(&engine);
        assert!(lines.len() >= 2);
        assert!(lines[1..].iter().all(|l| l.starts_with("0,a.mp4,") && l.ends_with(',')));

        // the next video starts again from the default value
        send(&mut engine, SessionEvent::SizeKnown { width: 1, height: 1 });
        send(&mut engine, SessionEvent::Prepared);
        assert_eq!(engine.live_rating(), LIVE_RATING_DEFAULT);
        send(&mut engine, SessionEvent::RatingAdjusted(-5));
        assert_eq!(engine.live_rating(), LIVE_RATING_MIN);
    }

    #[test]
    fn events_out_of_phase_are_ignored() {
        let (mut engine, _clock, _dir) = engine(state(Method::AcrCategorical, vec![video("a.mp4")]));
        assert_eq!(send(&mut engine, SessionEvent::Acknowledge), vec![]);
        assert_eq!(send(&mut engine, SessionEvent::Back), vec![]);
        assert_eq!(engine.phase(), Phase::NotStarted);
        start(&mut engine);
        assert_eq!(send(&mut engine, SessionEvent::RatingSubmitted(5)), vec![]);
        assert_eq!(send(&mut engine, SessionEvent::PlaybackCompleted), vec![]);
        assert_eq!(engine.phase(), Phase::PreparingEntry);
    }
}
