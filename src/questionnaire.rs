use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

pub const VALID_QUESTION_TYPES: &str = "number, radio, multiple-choice, text";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuestionType {
    Number,
    Radio,
    MultipleChoice,
    Text,
}

impl QuestionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            QuestionType::Number => "number",
            QuestionType::Radio => "radio",
            QuestionType::MultipleChoice => "multiple-choice",
            QuestionType::Text => "text",
        }
    }

    pub fn has_options(&self) -> bool {
        matches!(self, QuestionType::Radio | QuestionType::MultipleChoice)
    }
}

impl fmt::Display for QuestionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for QuestionType {
    type Err = String;

    /// Exact, case-sensitive match on the four type names.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "number" => Ok(QuestionType::Number),
            "radio" => Ok(QuestionType::Radio),
            "multiple-choice" => Ok(QuestionType::MultipleChoice),
            "text" => Ok(QuestionType::Text),
            other => Err(format!(
                "Invalid question type \"{other}\" (valid: {VALID_QUESTION_TYPES})"
            )),
        }
    }
}

/// One question as authored in a `pre_questionnaire`/`post_questionnaire` array.
///
/// Fields stay as written so that validation can report exactly what was
/// wrong; use [`Question::question_type`] for the typed view.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Question {
    #[serde(rename = "question", default)]
    pub text: Option<String>,
    #[serde(rename = "type", default)]
    pub kind: Option<String>,
    #[serde(default)]
    pub options: Option<Vec<String>>,
    #[serde(default)]
    pub required: Option<bool>,
}

impl Question {
    pub fn new(text: &str, kind: QuestionType, options: &[&str], required: bool) -> Self {
        Self {
            text: Some(text.to_string()),
            kind: Some(kind.as_str().to_string()),
            options: if options.is_empty() {
                None
            } else {
                Some(options.iter().map(|o| o.to_string()).collect())
            },
            required: Some(required),
        }
    }

    pub fn text(&self) -> &str {
        self.text.as_deref().unwrap_or("")
    }

    pub fn question_type(&self) -> Option<QuestionType> {
        self.kind.as_deref().and_then(|k| k.parse().ok())
    }

    pub fn options(&self) -> &[String] {
        self.options.as_deref().unwrap_or(&[])
    }

    /// Defaults to true when the field is absent.
    pub fn is_required(&self) -> bool {
        self.required.unwrap_or(true)
    }

    pub fn validate(&self) -> Result<QuestionType, String> {
        if self.text().trim().is_empty() {
            return Err("Question text is required".to_string());
        }
        let kind = match self.kind.as_deref().map(str::trim) {
            None | Some("") => {
                return Err(format!(
                    "Invalid question type \"(missing)\" (valid: {VALID_QUESTION_TYPES})"
                ))
            }
            Some(kind) => kind.parse::<QuestionType>()?,
        };
        if kind.has_options() && self.options().is_empty() {
            return Err(format!("Options are required for {kind} questions"));
        }
        Ok(kind)
    }

    /// Checks a submitted answer against this question.
    ///
    /// An empty answer (no values, or a single empty value) is a skip and is
    /// only accepted when the question is optional.
    pub fn check_answer(&self, values: &[String]) -> Result<(), String> {
        let skipped = values.iter().all(|v| v.trim().is_empty());
        if skipped {
            return if self.is_required() {
                Err("An answer is required".to_string())
            } else {
                Ok(())
            };
        }
        match self.question_type() {
            Some(QuestionType::Number) => {
                let value = values[0].trim();
                if values.len() != 1 || value.parse::<f64>().is_err() {
                    return Err(format!("\"{value}\" is not a number"));
                }
            }
            Some(QuestionType::Text) => {
                if values.len() != 1 {
                    return Err("Expected a single answer".to_string());
                }
            }
            Some(QuestionType::Radio) => {
                if values.len() != 1 || !self.options().contains(&values[0]) {
                    return Err("Select one of the options".to_string());
                }
            }
            Some(QuestionType::MultipleChoice) => {
                if let Some(unknown) = values.iter().find(|v| !self.options().contains(v)) {
                    return Err(format!("\"{unknown}\" is not one of the options"));
                }
            }
            None => return Err("Question has an invalid type".to_string()),
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Questionnaire {
    questions: Vec<Question>,
}

impl Questionnaire {
    pub fn new(questions: Vec<Question>) -> Self {
        Self { questions }
    }

    /// A list with no questions is the same as no questionnaire at all.
    pub fn from_questions(questions: Option<Vec<Question>>) -> Option<Self> {
        match questions {
            Some(questions) if !questions.is_empty() => Some(Self::new(questions)),
            _ => None,
        }
    }

    pub fn questions(&self) -> &[Question] {
        &self.questions
    }

    pub fn get(&self, index: usize) -> Option<&Question> {
        self.questions.get(index)
    }

    pub fn len(&self) -> usize {
        self.questions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.questions.is_empty()
    }

    /// One message per invalid question, numbered from 1.
    pub fn validate(&self) -> Vec<String> {
        self.questions
            .iter()
            .enumerate()
            .filter_map(|(i, q)| q.validate().err().map(|e| format!("Question {}: {}", i + 1, e)))
            .collect()
    }

    pub fn is_valid(&self) -> bool {
        self.validate().is_empty()
    }
}

/// A submitted answer with its timing.
#[derive(Debug, Clone, PartialEq)]
pub struct QuestionnaireAnswer {
    /// One value, except for multiple-choice where each selected option is a value.
    pub values: Vec<String>,
    pub answered_at: DateTime<Local>,
    pub duration_secs: f64,
}

impl QuestionnaireAnswer {
    pub fn single(value: impl Into<String>, answered_at: DateTime<Local>, duration_secs: f64) -> Self {
        Self {
            values: vec![value.into()],
            answered_at,
            duration_secs,
        }
    }

    pub fn multiple(values: Vec<String>, answered_at: DateTime<Local>, duration_secs: f64) -> Self {
        Self {
            values,
            answered_at,
            duration_secs,
        }
    }

    pub fn skipped(answered_at: DateTime<Local>, duration_secs: f64) -> Self {
        Self::single("", answered_at, duration_secs)
    }

    pub fn is_skipped(&self) -> bool {
        self.values.is_empty() || (self.values.len() == 1 && self.values[0].is_empty())
    }
}
