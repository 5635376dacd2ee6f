//! Checks a whole config folder against the media library.

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use tracing::{debug, info};

use crate::config::{self, ConfigDocument, ParseError};
use crate::error::Result;
use crate::grammar::Method;
use crate::media::DirectoryLibrary;
use crate::media::MediaLibrary;

/// Per-file overview shown in the validation report.
#[derive(Debug, Clone, PartialEq)]
pub struct ConfigSummary {
    pub file_name: String,
    pub participant_id: Option<u32>,
    pub method: Method,
    pub video_count: usize,
    pub training_video_count: usize,
    pub break_count: usize,
    pub videos: Vec<String>,
    pub error_count: usize,
}

impl ConfigSummary {
    pub fn from_document(doc: &ConfigDocument) -> Self {
        Self {
            file_name: doc.file_name.clone(),
            participant_id: doc.participant_id(),
            method: doc.method,
            video_count: doc.video_count(),
            training_video_count: doc.training_video_count(),
            break_count: doc.break_count(),
            videos: doc.video_names().into_iter().map(str::to_string).collect(),
            error_count: doc.parse_errors.len(),
        }
    }

    pub fn participant_label(&self) -> String {
        self.participant_id
            .map(|id| id.to_string())
            .unwrap_or_else(|| "-".to_string())
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ValidationReport {
    pub summaries: Vec<ConfigSummary>,
    pub errors: Vec<String>,
}

impl ValidationReport {
    pub fn is_ok(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Numbered files first in ID order, then the rest by name.
pub fn compare_summaries(a: &ConfigSummary, b: &ConfigSummary) -> Ordering {
    match (a.participant_id, b.participant_id) {
        (Some(x), Some(y)) => x.cmp(&y).then_with(|| a.file_name.cmp(&b.file_name)),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => a.file_name.cmp(&b.file_name),
    }
}

pub fn describe_parse_error(file_name: &str, error: &ParseError) -> String {
    if error.location > 0 {
        format!(
            "Config file \"{file_name}\" has invalid syntax at line {}: {}",
            error.location, error.message
        )
    } else {
        format!("Config file \"{file_name}\": {}", error.message)
    }
}

pub fn describe_missing_video(video: &str, config_files: &[String]) -> String {
    let files = config_files
        .iter()
        .map(|f| format!("\"{f}\""))
        .collect::<Vec<_>>()
        .join(", ");
    let noun = if config_files.len() == 1 {
        "config file"
    } else {
        "config files"
    };
    format!("Video \"{video}\" not found, but specified in {noun} {files}")
}

/// Validates already parsed documents. Parse errors come first, file by
/// file, followed by one error per missing video.
pub fn validate_documents(docs: &[ConfigDocument], library: &dyn MediaLibrary) -> ValidationReport {
    let mut report = ValidationReport::default();
    let mut references: BTreeMap<&str, Vec<String>> = BTreeMap::new();

    for doc in docs {
        report.errors.extend(
            doc.parse_errors
                .iter()
                .map(|e| describe_parse_error(&doc.file_name, e)),
        );
        for video in doc.video_names() {
            references
                .entry(video)
                .or_default()
                .push(doc.file_name.clone());
        }
        report.summaries.push(ConfigSummary::from_document(doc));
    }

    for (video, files) in &references {
        if !library.exists(video) {
            debug!(video, files = files.len(), "referenced video missing");
            report.errors.push(describe_missing_video(video, files));
        }
    }

    report.summaries.sort_by(compare_summaries);
    report
}

/// Parses every config file in `config_dir` and checks it against `media_dir`.
pub fn validate_directory(config_dir: &Path, media_dir: &Path) -> Result<ValidationReport> {
    let mut paths: Vec<_> = fs::read_dir(config_dir)?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| path.is_file() && config::is_config_file(path))
        .collect();
    paths.sort();

    let docs: Vec<ConfigDocument> = paths.iter().map(|p| config::parse_config_file(p)).collect();
    let mut report = validate_documents(&docs, &DirectoryLibrary::new(media_dir));
    if !media_dir.is_dir() && docs.iter().any(|d| d.total_video_count() > 0) {
        report.errors.retain(|e| !e.starts_with("Video \""));
        report
            .errors
            .push("Videos folder does not exist but config files reference videos".to_string());
    }
    info!(
        files = docs.len(),
        errors = report.errors.len(),
        "config folder validated"
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConfigParser;
    use tempfile::tempdir;

    fn write(dir: &Path, name: &str, contents: &str) {
        fs::write(dir.join(name), contents).unwrap();
    }

    #[test]
    fn missing_video_is_reported_once_for_all_referencing_files() {
        let root = tempdir().unwrap();
        let cfg = root.path().join("cfg");
        let media = root.path().join("media");
        fs::create_dir_all(&cfg).unwrap();
        fs::create_dir_all(&media).unwrap();
        write(&media, "a.mp4", "");
        write(&cfg, "subject_1.cfg", "a.mp4\nmissing.mp4\n");
        write(&cfg, "subject_2.json", r#"{"playlist":["missing.mp4","a.mp4"]}"#);

        let report = validate_directory(&cfg, &media).unwrap();
        assert_eq!(
            report.errors,
            vec![
                "Video \"missing.mp4\" not found, but specified in config files \"subject_1.cfg\", \"subject_2.json\""
                    .to_string()
            ]
        );
        assert_eq!(report.summaries.len(), 2);
    }

    #[test]
    fn single_reference_uses_singular() {
        assert_eq!(
            describe_missing_video("x.mp4", &["subject_3.cfg".to_string()]),
            "Video \"x.mp4\" not found, but specified in config file \"subject_3.cfg\""
        );
    }

    #[test]
    fn one_broken_file_does_not_stop_the_others() {
        let root = tempdir().unwrap();
        let cfg = root.path();
        write(cfg, "subject_1.json", "{ nope");
        write(cfg, "subject_2.cfg", "BREAK x\na.mp4\n");
        write(cfg, "a.mp4", "");
        write(cfg, "notes.txt", "ignored");

        let report = validate_directory(cfg, cfg).unwrap();
        assert_eq!(report.summaries.len(), 2);
        assert_eq!(report.errors.len(), 2);
        assert!(report.errors[0].starts_with("Config file \"subject_1.json\": Invalid JSON syntax"));
        assert_eq!(
            report.errors[1],
            "Config file \"subject_2.cfg\" has invalid syntax at line 1: BREAK duration \"x\" is not a valid number"
        );
    }

    #[test]
    fn summaries_sort_by_participant_id_then_name() {
        let docs: Vec<_> = ["subject_10.cfg", "pilot.cfg", "subject_2.cfg", "alpha.cfg"]
            .iter()
            .map(|name| ConfigDocument::new(*name))
            .collect();
        struct Nothing;
        impl MediaLibrary for Nothing {
            fn exists(&self, _: &str) -> bool {
                false
            }
            fn path_of(&self, name: &str) -> std::path::PathBuf {
                name.into()
            }
        }
        let report = validate_documents(&docs, &Nothing);
        let order: Vec<_> = report.summaries.iter().map(|s| s.file_name.as_str()).collect();
        assert_eq!(order, vec!["subject_2.cfg", "subject_10.cfg", "alpha.cfg", "pilot.cfg"]);
        assert_eq!(report.summaries[2].participant_label(), "-");
    }

    #[test]
    fn summary_counts() {
        let doc = config::TextConfigParser.parse_str(
            "subject_5.cfg",
            "METHOD DSIS\nTRAINING_START\nt.mp4\nTRAINING_END\na.mp4\nBREAK\nb.mp4\n",
        );
        let summary = ConfigSummary::from_document(&doc);
        assert_eq!(summary.participant_id, Some(5));
        assert_eq!(summary.method, Method::Dsis);
        assert_eq!(summary.training_video_count, 1);
        assert_eq!(summary.video_count, 2);
        assert_eq!(summary.break_count, 1);
        assert_eq!(summary.videos, vec!["t.mp4", "a.mp4", "b.mp4"]);
    }

    #[test]
    fn missing_media_folder_is_one_error() {
        let root = tempdir().unwrap();
        write(root.path(), "subject_1.cfg", "a.mp4\nb.mp4\n");
        let report = validate_directory(root.path(), &root.path().join("nope")).unwrap();
        assert_eq!(
            report.errors,
            vec!["Videos folder does not exist but config files reference videos".to_string()]
        );
    }
}
