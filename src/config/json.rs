//! Structured format (`.json`).
//!
//! ```json
//! {
//!   "method": "ACR",
//!   "custom_messages": { "start_message": "...", "finish_message": "..." },
//!   "playlist": ["TRAINING_START", "t.mp4", "TRAINING_END", "a.mp4", "BREAK 30"],
//!   "pre_questionnaire": [{ "question": "Age?", "type": "number" }]
//! }
//! ```
//!
//! Unlike the line format, repeated training markers are rejected here.

use serde::Deserialize;
use tracing::debug;

use super::{break_errors, ConfigDocument, ConfigParser, Entry, TrainingRange};
use crate::grammar::{self, Method, VALID_METHOD_TOKENS};
use crate::questionnaire::{Question, Questionnaire};

#[derive(Debug, Clone, Copy, Default)]
pub struct JsonConfigParser;

#[derive(Debug, Default, Deserialize)]
struct RawConfig {
    method: Option<String>,
    custom_messages: Option<RawMessages>,
    playlist: Option<Vec<String>>,
    pre_questionnaire: Option<Vec<Question>>,
    post_questionnaire: Option<Vec<Question>>,
}

#[derive(Debug, Default, Deserialize)]
struct RawMessages {
    start_message: Option<String>,
    finish_message: Option<String>,
    training_message: Option<String>,
    pre_questionnaire_message: Option<String>,
    post_questionnaire_message: Option<String>,
}

fn non_empty(message: Option<String>) -> Option<String> {
    message.filter(|m| !m.trim().is_empty())
}

impl ConfigParser for JsonConfigParser {
    fn parse_str(&self, file_name: &str, contents: &str) -> ConfigDocument {
        if contents.trim().is_empty() {
            return ConfigDocument::fail(file_name, "Empty or invalid JSON config file");
        }
        let raw = match serde_json::from_str::<Option<RawConfig>>(contents) {
            Ok(Some(raw)) => raw,
            Ok(None) => return ConfigDocument::fail(file_name, "Empty or invalid JSON config file"),
            Err(e) => return ConfigDocument::fail(file_name, format!("Invalid JSON syntax: {e}")),
        };

        let mut doc = ConfigDocument::new(file_name);

        if let Some(token) = raw.method.as_deref() {
            match grammar::parse_method_token(token) {
                Method::Undefined => doc.error(
                    0,
                    format!("Unknown method \"{token}\" (valid: {VALID_METHOD_TOKENS})"),
                ),
                method => doc.method = method,
            }
        }

        let messages = raw.custom_messages.unwrap_or_default();
        doc.start_message = non_empty(messages.start_message);
        doc.finish_message = non_empty(messages.finish_message);
        doc.training_message = non_empty(messages.training_message);
        doc.pre_questionnaire_message = non_empty(messages.pre_questionnaire_message);
        doc.post_questionnaire_message = non_empty(messages.post_questionnaire_message);

        match raw.playlist {
            Some(items) if !items.is_empty() => read_playlist(&mut doc, &items),
            _ => doc.error(0, "Playlist is required and cannot be empty"),
        }

        doc.pre_questionnaire = read_questionnaire(&mut doc, "pre_questionnaire", raw.pre_questionnaire);
        doc.post_questionnaire =
            read_questionnaire(&mut doc, "post_questionnaire", raw.post_questionnaire);

        debug!(
            file = file_name,
            entries = doc.entries.len(),
            errors = doc.parse_errors.len(),
            "parsed JSON config"
        );
        doc
    }
}

fn read_playlist(doc: &mut ConfigDocument, items: &[String]) {
    let mut start: Option<usize> = None;
    let mut end: Option<usize> = None;

    for (i, raw) in items.iter().enumerate() {
        let item_no = i + 1;
        let item = raw.trim();
        if item.is_empty() {
            continue;
        }

        if grammar::is_training_start_marker(item) {
            // a repeated marker is reported, and the last one wins
            if start.is_some() {
                doc.error(0, format!("Duplicate TRAINING_START in playlist (item {item_no})"));
            }
            start = Some(doc.entries.len());
        } else if grammar::is_training_end_marker(item) {
            if start.is_none() {
                doc.error(0, format!("TRAINING_END without TRAINING_START (item {item_no})"));
                continue;
            }
            if end.is_some() {
                doc.error(0, format!("Duplicate TRAINING_END in playlist (item {item_no})"));
            }
            end = Some(doc.entries.len());
        } else if grammar::is_break_entry(item) {
            for message in break_errors(item) {
                doc.error(0, format!("{message} (item {item_no})"));
            }
            doc.entries.push(Entry::Break(grammar::parse_break_duration(item)));
        } else {
            doc.entries.push(Entry::Video(item.to_string()));
        }
    }

    doc.training_range = match (start, end) {
        (Some(_), None) => {
            doc.error(0, "TRAINING_START without matching TRAINING_END");
            None
        }
        (Some(start), Some(end)) if end < start => {
            doc.error(0, "TRAINING_END must come after TRAINING_START");
            None
        }
        (Some(start), Some(end)) if end == start => {
            doc.error(0, "TRAINING_START/TRAINING_END enclose no entries");
            None
        }
        (Some(start), Some(end)) => Some(TrainingRange::new(start, end - 1)),
        _ => None,
    };
}

fn read_questionnaire(
    doc: &mut ConfigDocument,
    field: &str,
    questions: Option<Vec<Question>>,
) -> Option<Questionnaire> {
    let questionnaire = Questionnaire::from_questions(questions)?;
    for message in questionnaire.validate() {
        doc.error(0, format!("{field}: {message}"));
    }
    Some(questionnaire)
}
