//! Normalized playlist model shared by both config formats.
//!
//! A `ConfigDocument` is always produced, even for unreadable or malformed
//! files: problems are collected in `parse_errors` and the caller decides
//! whether they block a session.

pub mod json;
pub mod text;

use std::fmt;
use std::fs;
use std::path::Path;

use itertools::Itertools;
use tracing::{debug, warn};

use crate::grammar::Method;
use crate::questionnaire::Questionnaire;

pub use json::JsonConfigParser;
pub use text::TextConfigParser;

pub const JSON_EXTENSION: &str = "json";
pub const TEXT_EXTENSION: &str = "cfg";

/// One item of the playback plan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Entry {
    Video(String),
    /// Break with an optional countdown in seconds; `None` waits for the supervisor.
    Break(Option<u32>),
}

impl Entry {
    pub fn is_video(&self) -> bool {
        matches!(self, Entry::Video(_))
    }

    pub fn is_break(&self) -> bool {
        matches!(self, Entry::Break(_))
    }

    pub fn video_name(&self) -> Option<&str> {
        match self {
            Entry::Video(name) => Some(name),
            Entry::Break(_) => None,
        }
    }
}

/// Inclusive bounds of the training section, as indices into the entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrainingRange {
    pub start: usize,
    pub end: usize,
}

impl TrainingRange {
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }

    pub fn contains(&self, index: usize) -> bool {
        self.start <= index && index <= self.end
    }
}

/// A recoverable problem found while parsing. `location` is a 1-based line
/// number, or 0 when the problem has no single line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseError {
    pub location: usize,
    pub message: String,
}

impl ParseError {
    pub fn new(location: usize, message: impl Into<String>) -> Self {
        Self {
            location,
            message: message.into(),
        }
    }

    pub fn general(message: impl Into<String>) -> Self {
        Self::new(0, message)
    }
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.location > 0 {
            write!(f, "Line {}: {}", self.location, self.message)
        } else {
            f.write_str(&self.message)
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct ConfigDocument {
    pub file_name: String,
    pub method: Method,
    pub start_message: Option<String>,
    pub finish_message: Option<String>,
    pub training_message: Option<String>,
    pub pre_questionnaire_message: Option<String>,
    pub post_questionnaire_message: Option<String>,
    pub entries: Vec<Entry>,
    pub training_range: Option<TrainingRange>,
    pub pre_questionnaire: Option<Questionnaire>,
    pub post_questionnaire: Option<Questionnaire>,
    pub parse_errors: Vec<ParseError>,
    /// Set when the file could not be read or its syntax is broken; such a
    /// document never starts a session.
    pub fatal: bool,
}

impl ConfigDocument {
    pub fn new(file_name: impl Into<String>) -> Self {
        Self {
            file_name: file_name.into(),
            ..Default::default()
        }
    }

    pub(crate) fn fail(file_name: &str, message: impl Into<String>) -> Self {
        let mut doc = Self::new(file_name);
        doc.error(0, message);
        doc.fatal = true;
        doc
    }

    pub(crate) fn error(&mut self, location: usize, message: impl Into<String>) {
        let error = ParseError::new(location, message);
        warn!(file = %self.file_name, %error, "config parse error");
        self.parse_errors.push(error);
    }

    pub fn has_errors(&self) -> bool {
        !self.parse_errors.is_empty()
    }

    pub fn is_valid(&self) -> bool {
        !self.has_errors()
    }

    /// Videos outside the training section.
    pub fn video_count(&self) -> usize {
        self.total_video_count() - self.training_video_count()
    }

    pub fn training_video_count(&self) -> usize {
        match self.training_range {
            Some(range) => self
                .entries
                .iter()
                .enumerate()
                .filter(|(i, e)| range.contains(*i) && e.is_video())
                .count(),
            None => 0,
        }
    }

    pub fn total_video_count(&self) -> usize {
        self.entries.iter().filter(|e| e.is_video()).count()
    }

    pub fn break_count(&self) -> usize {
        self.entries.iter().filter(|e| e.is_break()).count()
    }

    /// Referenced video names in playlist order, without repeats.
    pub fn video_names(&self) -> Vec<&str> {
        self.entries
            .iter()
            .filter_map(Entry::video_name)
            .unique()
            .collect()
    }

    /// Method the session runs with; an unset method means ACR.
    pub fn effective_method(&self) -> Method {
        if self.method.is_defined() {
            self.method
        } else {
            Method::AcrCategorical
        }
    }

    pub fn participant_id(&self) -> Option<u32> {
        participant_id_from_name(&self.file_name)
    }
}

/// First run of ASCII digits in a file name, e.g. `subject_12.cfg` → 12.
pub fn participant_id_from_name(file_name: &str) -> Option<u32> {
    let digits: String = file_name
        .chars()
        .skip_while(|c| !c.is_ascii_digit())
        .take_while(|c| c.is_ascii_digit())
        .collect();
    digits.parse().ok()
}

/// Both config formats turn their source text into the same document.
pub trait ConfigParser {
    fn parse_str(&self, file_name: &str, contents: &str) -> ConfigDocument;

    fn parse_file(&self, path: &Path) -> ConfigDocument {
        let file_name = file_name_of(path);
        match fs::read_to_string(path) {
            Ok(contents) => {
                debug!(path = %path.display(), "parsing config file");
                self.parse_str(&file_name, &contents)
            }
            Err(e) => ConfigDocument::fail(&file_name, format!("Could not read file: {e}")),
        }
    }
}

fn file_name_of(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

fn extension_of(path: &Path) -> Option<String> {
    path.extension()
        .map(|e| e.to_string_lossy().to_ascii_lowercase())
}

/// `.json` files use the structured parser; everything else the line format.
pub fn parser_for(path: &Path) -> Box<dyn ConfigParser> {
    match extension_of(path).as_deref() {
        Some(JSON_EXTENSION) => Box::new(JsonConfigParser),
        _ => Box::new(TextConfigParser),
    }
}

pub fn parse_config_file(path: &Path) -> ConfigDocument {
    parser_for(path).parse_file(path)
}

pub fn is_config_file(path: &Path) -> bool {
    matches!(
        extension_of(path).as_deref(),
        Some(JSON_EXTENSION) | Some(TEXT_EXTENSION)
    )
}

/// Config file name for a participant, per extension.
pub fn config_file_name(id: u32, extension: &str) -> String {
    format!("subject_{id}.{extension}")
}

/// Problems with the duration token of a BREAK line or item.
pub(crate) fn break_errors(line: &str) -> Vec<String> {
    match line.split_whitespace().nth(1) {
        Some(token) => match token.parse::<i64>() {
            Ok(secs) if secs < 0 => vec!["BREAK duration must be non-negative".to_string()],
            Ok(_) => vec![],
            Err(_) => vec![format!("BREAK duration \"{token}\" is not a valid number")],
        },
        None => vec![],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn participant_id_is_first_digit_run() {
        assert_eq!(participant_id_from_name("subject_12.cfg"), Some(12));
        assert_eq!(participant_id_from_name("s7_v2.json"), Some(7));
        assert_eq!(participant_id_from_name("pilot.cfg"), None);
    }

    #[test]
    fn dispatch_is_by_extension_ignoring_case() {
        let dir = tempdir().unwrap();
        let json = dir.path().join("subject_1.JSON");
        fs::write(&json, r#"{"method":"DSIS","playlist":["a.mp4"]}"#).unwrap();
        let doc = parse_config_file(&json);
        assert_eq!(doc.method, Method::Dsis);
        assert!(doc.is_valid());

        let cfg = dir.path().join("subject_1.cfg");
        fs::write(&cfg, "METHOD CONTINUOUS\na.mp4\n").unwrap();
        assert_eq!(parse_config_file(&cfg).method, Method::Continuous);

        // no content sniffing: JSON text in a .cfg file is read line by line
        let sneaky = dir.path().join("subject_2.cfg");
        fs::write(&sneaky, r#"{"playlist":["a.mp4"]}"#).unwrap();
        let doc = parse_config_file(&sneaky);
        assert_eq!(doc.entries.len(), 1);
        assert_eq!(doc.method, Method::Undefined);
    }

    #[test]
    fn config_file_recognition() {
        assert!(is_config_file(Path::new("subject_1.cfg")));
        assert!(is_config_file(Path::new("subject_1.Json")));
        assert!(!is_config_file(Path::new("video.mp4")));
        assert!(!is_config_file(Path::new("README")));
    }

    #[test]
    fn unreadable_file_is_fatal_with_single_error() {
        let dir = tempdir().unwrap();
        let doc = parse_config_file(&dir.path().join("subject_9.cfg"));
        assert!(doc.fatal);
        assert!(doc.entries.is_empty());
        assert_eq!(doc.parse_errors.len(), 1);
        assert_eq!(doc.parse_errors[0].location, 0);
        assert!(doc.parse_errors[0].message.starts_with("Could not read file"));
    }

    #[test]
    fn counts_split_training_and_main_videos() {
        let mut doc = ConfigDocument::new("subject_1.cfg");
        doc.entries = vec![
            Entry::Video("t.mp4".into()),
            Entry::Video("a.mp4".into()),
            Entry::Break(Some(5)),
            Entry::Video("a.mp4".into()),
        ];
        doc.training_range = Some(TrainingRange::new(0, 0));
        assert_eq!(doc.training_video_count(), 1);
        assert_eq!(doc.video_count(), 2);
        assert_eq!(doc.break_count(), 1);
        assert_eq!(
            doc.entries.len(),
            doc.break_count() + doc.total_video_count()
        );
        assert_eq!(doc.video_names(), vec!["t.mp4", "a.mp4"]);
    }

    #[test]
    fn undefined_method_runs_as_acr() {
        let doc = ConfigDocument::new("x.cfg");
        assert_eq!(doc.effective_method(), Method::AcrCategorical);
    }

    #[test]
    fn break_error_messages() {
        assert!(break_errors("BREAK").is_empty());
        assert!(break_errors("BREAK 10").is_empty());
        assert_eq!(
            break_errors("BREAK -3"),
            vec!["BREAK duration must be non-negative".to_string()]
        );
        assert_eq!(
            break_errors("BREAK ten"),
            vec!["BREAK duration \"ten\" is not a valid number".to_string()]
        );
    }

    #[test]
    fn parse_error_display_includes_line() {
        assert_eq!(ParseError::new(4, "oops").to_string(), "Line 4: oops");
        assert_eq!(ParseError::general("oops").to_string(), "oops");
    }
}
