//! Crash-safe CSV output: every row is flushed before the call returns.

use std::fs::{self, File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Local};
use tracing::{debug, info, warn};

use crate::error::{Result, SessionError};
use crate::grammar::Method;
use crate::questionnaire::{Question, QuestionnaireAnswer};

pub const RATING_HEADER: [&str; 5] = [
    "video_position",
    "video_name",
    "rating",
    "rated_at",
    "rating_duration",
];

pub const QUESTIONNAIRE_HEADER: [&str; 6] = [
    "question_number",
    "question_type",
    "question_text",
    "answer",
    "answered_at",
    "answer_duration",
];

pub const BREAK_VIDEO_POSITION: i64 = -1;
pub const BREAK_VIDEO_NAME: &str = "BREAK";

const FILE_DATE_FORMAT: &str = "%Y%m%d-%H%M%S";
const ISO8601_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%:z";

pub fn format_timestamp(at: &DateTime<Local>) -> String {
    at.format(ISO8601_FORMAT).to_string()
}

pub fn format_duration(secs: Option<f64>) -> String {
    secs.map(|d| format!("{d:.3}")).unwrap_or_default()
}

/// `<id>_<yyyyMMdd-HHmmss>_<method>.csv`, spaces in the method name replaced by `_`.
pub fn rating_log_file_name(participant_id: u32, started_at: &DateTime<Local>, method: Method) -> String {
    format!(
        "{}_{}_{}.csv",
        participant_id,
        started_at.format(FILE_DATE_FORMAT),
        method.file_label()
    )
}

/// Whether any file in `logs_dir` already belongs to `participant_id`, judged
/// by the part of its name before the first `_`.
pub fn id_exists(logs_dir: &Path, participant_id: u32) -> bool {
    let Ok(dir) = fs::read_dir(logs_dir) else {
        return false;
    };
    dir.filter_map(|entry| entry.ok())
        .filter_map(|entry| entry.file_name().into_string().ok())
        .any(|name| {
            name.split('_')
                .next()
                .and_then(|prefix| prefix.parse::<u32>().ok())
                == Some(participant_id)
        })
}

/// Opens a fresh log file; an existing file of the same name is an error,
/// never overwritten.
fn create_new(path: &Path) -> io::Result<File> {
    OpenOptions::new().write(true).create_new(true).open(path)
}

fn closed() -> SessionError {
    SessionError::Io(io::Error::other("log file is already closed"))
}

/// Per-session ratings file.
#[derive(Debug)]
pub struct RatingLog {
    path: PathBuf,
    writer: Option<csv::Writer<File>>,
}

impl RatingLog {
    pub fn create(
        logs_dir: &Path,
        participant_id: u32,
        method: Method,
        started_at: &DateTime<Local>,
    ) -> Result<Self> {
        fs::create_dir_all(logs_dir)?;
        let path = logs_dir.join(rating_log_file_name(participant_id, started_at, method));
        let mut writer = csv::Writer::from_writer(create_new(&path)?);
        writer.write_record(RATING_HEADER)?;
        writer.flush()?;
        info!(path = %path.display(), "rating log started");
        Ok(Self {
            path,
            writer: Some(writer),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_open(&self) -> bool {
        self.writer.is_some()
    }

    /// `duration_secs` is the response time; `None` leaves the column empty.
    pub fn log_rating(
        &mut self,
        position: usize,
        video_name: &str,
        rating: i32,
        rated_at: &DateTime<Local>,
        duration_secs: Option<f64>,
    ) -> Result<()> {
        self.write(&[
            position.to_string(),
            video_name.to_string(),
            rating.to_string(),
            format_timestamp(rated_at),
            format_duration(duration_secs),
        ])?;
        debug!(position, video = video_name, rating, "rating logged");
        Ok(())
    }

    pub fn log_break(&mut self) -> Result<()> {
        self.write(&[
            BREAK_VIDEO_POSITION.to_string(),
            BREAK_VIDEO_NAME.to_string(),
            String::new(),
            String::new(),
            String::new(),
        ])?;
        debug!("break logged");
        Ok(())
    }

    fn write(&mut self, record: &[String]) -> Result<()> {
        let writer = self.writer.as_mut().ok_or_else(closed)?;
        writer.write_record(record)?;
        writer.flush()?;
        Ok(())
    }

    /// Closing twice is a no-op.
    pub fn close(&mut self) -> Result<()> {
        if let Some(mut writer) = self.writer.take() {
            writer.flush()?;
            info!(path = %self.path.display(), "rating log closed");
        }
        Ok(())
    }
}

impl Drop for RatingLog {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            warn!(error = %e, "failed to close rating log");
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, strum_macros::Display)]
pub enum QuestionnairePhase {
    #[strum(to_string = "pre")]
    Pre,
    #[strum(to_string = "post")]
    Post,
}

/// Answers to one questionnaire, written as they are submitted.
#[derive(Debug)]
pub struct QuestionnaireLog {
    path: PathBuf,
    writer: csv::Writer<File>,
}

impl QuestionnaireLog {
    /// `<id>_<yyyyMMdd-HHmmss>_<pre|post>_questionnaire.csv`
    pub fn create(
        logs_dir: &Path,
        participant_id: u32,
        phase: QuestionnairePhase,
        started_at: &DateTime<Local>,
    ) -> Result<Self> {
        fs::create_dir_all(logs_dir)?;
        let name = format!(
            "{}_{}_{}_questionnaire.csv",
            participant_id,
            started_at.format(FILE_DATE_FORMAT),
            phase
        );
        let path = logs_dir.join(name);
        let mut writer = csv::Writer::from_writer(create_new(&path)?);
        writer.write_record(QUESTIONNAIRE_HEADER)?;
        writer.flush()?;
        info!(path = %path.display(), "questionnaire log started");
        Ok(Self { path, writer })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// One row per value, so a multiple-choice answer spans several rows
    /// sharing number, timestamp and duration. A skipped answer is one row
    /// with an empty answer column.
    pub fn log_answer(
        &mut self,
        number: usize,
        question: &Question,
        answer: &QuestionnaireAnswer,
    ) -> Result<()> {
        let kind = question.kind.as_deref().unwrap_or_default();
        let answered_at = format_timestamp(&answer.answered_at);
        let duration = format_duration(Some(answer.duration_secs));
        let values: Vec<&str> = if answer.is_skipped() {
            vec![""]
        } else {
            answer.values.iter().map(String::as_str).collect()
        };
        for value in values {
            self.writer.write_record([
                number.to_string().as_str(),
                kind,
                question.text(),
                value,
                answered_at.as_str(),
                duration.as_str(),
            ])?;
        }
        self.writer.flush()?;
        Ok(())
    }
}
