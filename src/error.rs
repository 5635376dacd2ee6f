use std::path::PathBuf;

use thiserror::Error;

use crate::config::ParseError;

#[derive(Error, Debug)]
pub enum SessionError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("No config file found for participant {id} in {}", dir.display())]
    ConfigNotFound { id: u32, dir: PathBuf },

    #[error("Config file \"{file}\" cannot be used: {}", summarize(errors))]
    ConfigRejected { file: String, errors: Vec<ParseError> },

    #[error("Participant ID {0} has already been used")]
    ParticipantIdUsed(u32),

    #[error("Config file \"{0}\" has no playable entries")]
    EmptyPlan(String),

    #[error("Player error: {0}")]
    Player(String),
}

fn summarize(errors: &[ParseError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

pub type Result<T> = std::result::Result<T, SessionError>;
