//! Line/item vocabulary shared by both config formats.
//!
//! Every recogniser works on a single trimmed line (text format) or playlist
//! item (JSON format). Keyword prefixes are matched case-insensitively, except
//! `BREAK` which has always been matched case-sensitively.

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

pub const METHOD_PREFIX: &str = "METHOD";
pub const START_MESSAGE_PREFIX: &str = "START_MESSAGE";
pub const FINISH_MESSAGE_PREFIX: &str = "FINISH_MESSAGE";
pub const TRAINING_MESSAGE_PREFIX: &str = "TRAINING_MESSAGE";
pub const TRAINING_START_MARKER: &str = "TRAINING_START";
pub const TRAINING_END_MARKER: &str = "TRAINING_END";
pub const BREAK_PREFIX: &str = "BREAK";

/// Accepted METHOD tokens, in the order they are listed in error messages.
pub const VALID_METHOD_TOKENS: &str = "ACR, CONTINUOUS, DSIS, TIME_CONTINUOUS";

/// Rating elicitation technique for a session.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, strum_macros::Display,
)]
pub enum Method {
    #[default]
    #[strum(to_string = "Undefined")]
    Undefined,
    #[strum(to_string = "ACR - Categorical")]
    AcrCategorical,
    #[strum(to_string = "Continuous scale")]
    Continuous,
    #[strum(to_string = "DSIS")]
    Dsis,
    #[strum(to_string = "Time-continuous")]
    TimeContinuous,
}

impl Method {
    pub fn is_defined(&self) -> bool {
        *self != Method::Undefined
    }

    /// Display name with spaces replaced, as used in log file names.
    pub fn file_label(&self) -> String {
        self.to_string().replace(' ', "_")
    }
}

/// ACR categories from best to worst, paired with their stored value.
pub const ACR_LABELS: [(&str, i32); 5] = [
    ("Excellent", 5),
    ("Good", 4),
    ("Fair", 3),
    ("Poor", 2),
    ("Bad", 1),
];

/// Impairment scale used by DSIS.
pub const DSIS_LABELS: [(&str, i32); 5] = [
    ("Imperceptible", 5),
    ("Perceptible, but not annoying", 4),
    ("Slightly annoying", 3),
    ("Annoying", 2),
    ("Very annoying", 1),
];

fn starts_with_ignore_case(line: &str, prefix: &str) -> bool {
    line.len() >= prefix.len()
        && line.is_char_boundary(prefix.len())
        && line[..prefix.len()].eq_ignore_ascii_case(prefix)
}

pub fn is_method_directive(line: &str) -> bool {
    starts_with_ignore_case(line, METHOD_PREFIX)
}

pub fn is_start_message_directive(line: &str) -> bool {
    starts_with_ignore_case(line, START_MESSAGE_PREFIX)
}

pub fn is_finish_message_directive(line: &str) -> bool {
    starts_with_ignore_case(line, FINISH_MESSAGE_PREFIX)
}

pub fn is_training_message_directive(line: &str) -> bool {
    starts_with_ignore_case(line, TRAINING_MESSAGE_PREFIX)
}

/// Whole-line match; `TRAINING_START foo` is not a marker.
pub fn is_training_start_marker(line: &str) -> bool {
    line.trim().eq_ignore_ascii_case(TRAINING_START_MARKER)
}

pub fn is_training_end_marker(line: &str) -> bool {
    line.trim().eq_ignore_ascii_case(TRAINING_END_MARKER)
}

/// Case-sensitive on purpose: `break 10` is a video named "break 10".
pub fn is_break_entry(line: &str) -> bool {
    line.starts_with(BREAK_PREFIX)
}

/// Second whitespace-separated token as a non-negative number of seconds.
///
/// `None` means the break is untimed: no token, a non-numeric token, or a
/// negative one.
pub fn parse_break_duration(line: &str) -> Option<u32> {
    if !is_break_entry(line) {
        return None;
    }
    match line.split_whitespace().nth(1) {
        Some(token) => match token.parse::<u32>() {
            Ok(secs) => {
                debug!(secs, "parsed BREAK duration");
                Some(secs)
            }
            Err(_) => {
                warn!(line, "could not parse BREAK duration");
                None
            }
        },
        None => None,
    }
}

/// Total over all inputs: anything unrecognised is `Method::Undefined`.
pub fn parse_method_token(token: &str) -> Method {
    match token.trim().to_ascii_uppercase().as_str() {
        "ACR" => Method::AcrCategorical,
        "CONTINUOUS" => Method::Continuous,
        "DSIS" => Method::Dsis,
        "TIME_CONTINUOUS" => Method::TimeContinuous,
        _ => Method::Undefined,
    }
}

/// The token following `METHOD`, if any.
pub fn method_token(line: &str) -> Option<&str> {
    line.split_whitespace().nth(1)
}

/// Strips `prefix`, trims, and turns the two characters `\n` into a newline.
///
/// Returns `None` when nothing is left after the prefix.
pub fn parse_message_directive(line: &str, prefix: &str) -> Option<String> {
    if !starts_with_ignore_case(line, prefix) {
        return None;
    }
    let message = line[prefix.len()..].trim();
    if message.is_empty() {
        warn!(prefix, "directive without message");
        return None;
    }
    Some(message.replace("\\n", "\n"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn break_duration_variants() {
        assert_eq!(parse_break_duration("BREAK 60"), Some(60));
        assert_eq!(parse_break_duration("BREAK"), None);
        assert_eq!(parse_break_duration("BREAK abc"), None);
        assert_eq!(parse_break_duration("BREAK -5"), None);
        assert_eq!(parse_break_duration("BREAK   15   extra"), Some(15));
    }

    #[test]
    fn break_prefix_is_case_sensitive() {
        assert!(is_break_entry("BREAK"));
        assert!(is_break_entry("BREAK 10"));
        assert!(!is_break_entry("break 10"));
        assert!(!is_break_entry("Break"));
    }

    #[test]
    fn method_tokens_are_case_insensitive() {
        assert_eq!(parse_method_token("acr"), Method::AcrCategorical);
        assert_eq!(parse_method_token("Continuous"), Method::Continuous);
        assert_eq!(parse_method_token("DSIS"), Method::Dsis);
        assert_eq!(parse_method_token("time_continuous"), Method::TimeContinuous);
    }

    #[test]
    fn unknown_method_tokens_map_to_undefined() {
        assert_eq!(parse_method_token(""), Method::Undefined);
        assert_eq!(parse_method_token("MOS"), Method::Undefined);
        assert_eq!(parse_method_token("ACR5"), Method::Undefined);
    }

    #[test]
    fn message_directive_decodes_newlines() {
        assert_eq!(
            parse_message_directive("START_MESSAGE Hello\\nWorld", START_MESSAGE_PREFIX),
            Some("Hello\nWorld".to_string())
        );
        assert_eq!(
            parse_message_directive("start_message   spaced  ", START_MESSAGE_PREFIX),
            Some("spaced".to_string())
        );
    }

    #[test]
    fn message_directive_without_text_is_none() {
        assert_eq!(parse_message_directive("FINISH_MESSAGE", FINISH_MESSAGE_PREFIX), None);
        assert_eq!(parse_message_directive("FINISH_MESSAGE   ", FINISH_MESSAGE_PREFIX), None);
    }

    #[test]
    fn only_backslash_n_is_unescaped() {
        assert_eq!(
            parse_message_directive("START_MESSAGE a\\tb\\\\c", START_MESSAGE_PREFIX),
            Some("a\\tb\\\\c".to_string())
        );
    }

    #[test]
    fn training_markers_require_whole_line() {
        assert!(is_training_start_marker("training_start"));
        assert!(is_training_start_marker("  TRAINING_START  "));
        assert!(!is_training_start_marker("TRAINING_START now"));
        assert!(is_training_end_marker("Training_End"));
        assert!(!is_training_end_marker("TRAINING_ENDING"));
    }

    #[test]
    fn directive_prefixes_ignore_keyword_case() {
        assert!(is_method_directive("method ACR"));
        assert!(is_start_message_directive("Start_Message hi"));
        assert!(is_finish_message_directive("FINISH_MESSAGE bye"));
        assert!(is_training_message_directive("training_message go"));
        assert!(!is_method_directive("video.mp4"));
    }

    #[test]
    fn method_display_and_file_label() {
        assert_eq!(Method::AcrCategorical.to_string(), "ACR - Categorical");
        assert_eq!(Method::AcrCategorical.file_label(), "ACR_-_Categorical");
        assert_eq!(Method::TimeContinuous.file_label(), "Time-continuous");
    }
}
