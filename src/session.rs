use chrono::{DateTime, Local};
use tracing::{info, warn};

use crate::config::{ConfigDocument, Entry, ParseError, TrainingRange};
use crate::error::{Result, SessionError};
use crate::grammar::Method;
use crate::media::MediaLibrary;
use crate::questionnaire::{Questionnaire, QuestionnaireAnswer};

/// Rating slot value recorded for a break.
pub const BREAK_PLACEHOLDER_RATING: i32 = -1;

#[derive(Debug, Clone, PartialEq, Default)]
pub struct SessionMessages {
    pub start: Option<String>,
    pub finish: Option<String>,
    pub training: Option<String>,
    pub pre_questionnaire: Option<String>,
    pub post_questionnaire: Option<String>,
}

/// Mutable record of one participant's run.
///
/// `ratings` and `rating_timestamps` grow in step with `current_index`: slot
/// `i` belongs to `entries[i]`, breaks included.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SessionState {
    pub participant_id: u32,
    pub method: Method,
    pub current_index: usize,
    pub entries: Vec<Entry>,
    pub training_range: Option<TrainingRange>,
    pub ratings: Vec<i32>,
    pub rating_timestamps: Vec<DateTime<Local>>,
    pub messages: SessionMessages,
    pub pre_questionnaire: Option<Questionnaire>,
    pub post_questionnaire: Option<Questionnaire>,
    pub pre_answers: Vec<QuestionnaireAnswer>,
    pub post_answers: Vec<QuestionnaireAnswer>,
    pub training_intro_shown: bool,
    pub training_complete_shown: bool,
}

impl SessionState {
    /// Builds the session plan from a parsed document.
    ///
    /// Videos missing from `library` are dropped and the training bounds are
    /// moved to follow the surviving entries. A document that failed to parse
    /// at all, has a question nobody could answer, or leaves nothing to play
    /// is refused.
    pub fn from_document(
        doc: &ConfigDocument,
        participant_id: u32,
        library: &dyn MediaLibrary,
    ) -> Result<Self> {
        if doc.fatal {
            return Err(SessionError::ConfigRejected {
                file: doc.file_name.clone(),
                errors: doc.parse_errors.clone(),
            });
        }
        let question_errors = questionnaire_errors(doc);
        if !question_errors.is_empty() {
            return Err(SessionError::ConfigRejected {
                file: doc.file_name.clone(),
                errors: question_errors,
            });
        }
        if doc.has_errors() {
            warn!(
                file = %doc.file_name,
                errors = doc.parse_errors.len(),
                "starting session despite config errors"
            );
        }

        let (entries, training_range) = build_plan(&doc.entries, doc.training_range, library);
        if entries.is_empty() {
            return Err(SessionError::EmptyPlan(doc.file_name.clone()));
        }
        info!(
            participant_id,
            entries = entries.len(),
            removed = doc.entries.len() - entries.len(),
            "session plan built"
        );

        Ok(Self {
            participant_id,
            method: doc.effective_method(),
            entries,
            training_range,
            messages: SessionMessages {
                start: doc.start_message.clone(),
                finish: doc.finish_message.clone(),
                training: doc.training_message.clone(),
                pre_questionnaire: doc.pre_questionnaire_message.clone(),
                post_questionnaire: doc.post_questionnaire_message.clone(),
            },
            pre_questionnaire: doc.pre_questionnaire.clone(),
            post_questionnaire: doc.post_questionnaire.clone(),
            ..Default::default()
        })
    }

    pub fn current_entry(&self) -> Option<&Entry> {
        self.entries.get(self.current_index)
    }

    pub fn is_complete(&self) -> bool {
        self.current_index >= self.entries.len()
    }

    pub fn is_training(&self, index: usize) -> bool {
        self.training_range.is_some_and(|r| r.contains(index))
    }

    pub fn is_training_start(&self, index: usize) -> bool {
        self.training_range.is_some_and(|r| r.start == index)
    }

    pub fn is_training_end(&self, index: usize) -> bool {
        self.training_range.is_some_and(|r| r.end == index)
    }

    /// Stores the rating for the current entry and moves to the next one.
    pub fn record_rating(&mut self, rating: i32, at: DateTime<Local>) {
        self.ratings.push(rating);
        self.rating_timestamps.push(at);
        self.current_index += 1;
    }

    pub fn record_break(&mut self, at: DateTime<Local>) {
        self.record_rating(BREAK_PLACEHOLDER_RATING, at);
    }

    /// Clears every field, not only the collected ratings.
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

fn questionnaire_errors(doc: &ConfigDocument) -> Vec<ParseError> {
    [
        ("pre_questionnaire", &doc.pre_questionnaire),
        ("post_questionnaire", &doc.post_questionnaire),
    ]
    .into_iter()
    .filter_map(|(field, questionnaire)| questionnaire.as_ref().map(|q| (field, q.validate())))
    .flat_map(|(field, messages)| {
        messages
            .into_iter()
            .map(move |message| ParseError::general(format!("{field}: {message}")))
    })
    .collect()
}

/// Drops videos the library does not have. Breaks always stay.
///
/// The training range keeps covering the surviving entries that were inside
/// it; if none survive the range disappears.
pub fn build_plan(
    entries: &[Entry],
    training_range: Option<TrainingRange>,
    library: &dyn MediaLibrary,
) -> (Vec<Entry>, Option<TrainingRange>) {
    let mut kept = Vec::with_capacity(entries.len());
    let mut training: Option<TrainingRange> = None;

    for (original, entry) in entries.iter().enumerate() {
        if let Entry::Video(name) = entry {
            if !library.exists(name) {
                warn!(video = %name, "video not found, removed from session");
                continue;
            }
        }
        if training_range.is_some_and(|r| r.contains(original)) {
            let index = kept.len();
            training = Some(match training {
                Some(r) => TrainingRange::new(r.start, index),
                None => TrainingRange::new(index, index),
            });
        }
        kept.push(entry.clone());
    }

    (kept, training)
}
