//! Line format (`.cfg`): one directive or video file name per line.

use tracing::debug;

use super::{break_errors, ConfigDocument, ConfigParser, Entry, TrainingRange};
use crate::grammar::{self, Method, VALID_METHOD_TOKENS};

#[derive(Debug, Clone, Copy, Default)]
pub struct TextConfigParser;

/// Where a training marker was seen: its line and the entry index it refers to.
#[derive(Debug, Clone, Copy)]
struct Marker {
    line: usize,
    index: usize,
}

impl ConfigParser for TextConfigParser {
    fn parse_str(&self, file_name: &str, contents: &str) -> ConfigDocument {
        let mut doc = ConfigDocument::new(file_name);
        let mut training_start: Option<Marker> = None;
        // index of the entry after the section, so an empty section is representable
        let mut training_end: Option<Marker> = None;

        for (i, raw) in contents.lines().enumerate() {
            let line_no = i + 1;
            let line = raw.trim();
            if line.is_empty() {
                continue;
            }

            if grammar::is_method_directive(line) {
                let token = grammar::method_token(line);
                match grammar::parse_method_token(token.unwrap_or("")) {
                    Method::Undefined => doc.error(
                        line_no,
                        format!(
                            "Unknown METHOD \"{}\" (valid: {VALID_METHOD_TOKENS})",
                            token.unwrap_or("(empty)")
                        ),
                    ),
                    method => {
                        debug!(%method, line = line_no, "method directive");
                        doc.method = method;
                    }
                }
            } else if grammar::is_start_message_directive(line) {
                read_message(&mut doc, line, line_no, grammar::START_MESSAGE_PREFIX, |d| {
                    &mut d.start_message
                });
            } else if grammar::is_finish_message_directive(line) {
                read_message(&mut doc, line, line_no, grammar::FINISH_MESSAGE_PREFIX, |d| {
                    &mut d.finish_message
                });
            } else if grammar::is_training_message_directive(line) {
                read_message(
                    &mut doc,
                    line,
                    line_no,
                    grammar::TRAINING_MESSAGE_PREFIX,
                    |d| &mut d.training_message,
                );
            } else if grammar::is_training_start_marker(line) {
                training_start = Some(Marker {
                    line: line_no,
                    index: doc.entries.len(),
                });
            } else if grammar::is_training_end_marker(line) {
                training_end = Some(Marker {
                    line: line_no,
                    index: doc.entries.len(),
                });
            } else if grammar::is_break_entry(line) {
                for message in break_errors(line) {
                    doc.error(line_no, message);
                }
                doc.entries.push(Entry::Break(grammar::parse_break_duration(line)));
            } else {
                doc.entries.push(Entry::Video(line.to_string()));
            }
        }

        doc.training_range = match (training_start, training_end) {
            (None, None) => None,
            (Some(start), None) => {
                doc.error(start.line, "TRAINING_START without matching TRAINING_END");
                None
            }
            (None, Some(end)) => {
                doc.error(end.line, "TRAINING_END without matching TRAINING_START");
                None
            }
            (Some(start), Some(end)) if end.line <= start.line => {
                doc.error(
                    end.line,
                    format!("TRAINING_END must come after TRAINING_START (line {})", start.line),
                );
                None
            }
            (Some(start), Some(end)) if end.index == start.index => {
                doc.error(end.line, "TRAINING_START/TRAINING_END enclose no entries");
                None
            }
            (Some(start), Some(end)) => Some(TrainingRange::new(start.index, end.index - 1)),
        };

        doc
    }
}

fn read_message(
    doc: &mut ConfigDocument,
    line: &str,
    line_no: usize,
    prefix: &str,
    slot: impl FnOnce(&mut ConfigDocument) -> &mut Option<String>,
) {
    match grammar::parse_message_directive(line, prefix) {
        Some(message) => *slot(doc) = Some(message),
        None => doc.error(line_no, format!("{prefix} directive without message")),
    }
}
