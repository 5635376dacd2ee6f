use crossterm::event::{KeyCode, KeyEvent};
use ratatui::{
    buffer::Buffer,
    layout::Rect,
    style::{Color, Modifier, Style},
    text::{Line, Span},
};
use subjective::engine::{RatingScale, SessionEvent, View};
use subjective::grammar::ACR_LABELS;
use subjective::questionnaire::QuestionType;
use unicode_width::UnicodeWidthStr;

use crate::ui::{render_centered, PromptState, SessionScreen};

const SLIDER_WIDTH: usize = 50;

/// A UI Screen boundary: responsible for rendering one kind of view and
/// turning keys into session events
pub trait Screen {
    fn render(&self, screen: &SessionScreen, area: Rect, buf: &mut Buffer);
    /// Optional per-screen key handling. Returns the event to send, if any.
    fn on_key(&self, _key: KeyEvent, _view: &View, _prompt: &mut PromptState) -> Option<SessionEvent> {
        None
    }
    fn hint(&self, _view: &View) -> &'static str {
        ""
    }
}

fn bold() -> Style {
    Style::default().add_modifier(Modifier::BOLD)
}

fn dim() -> Style {
    Style::default().add_modifier(Modifier::DIM)
}

fn is_confirm(key: &KeyEvent) -> bool {
    matches!(key.code, KeyCode::Enter | KeyCode::Char(' '))
}

/// Label of an ACR value, used for the live rating read-out
fn acr_label(value: i32) -> &'static str {
    ACR_LABELS
        .iter()
        .find(|(_, v)| *v == value)
        .map_or("", |(label, _)| *label)
}

/// Lays `labels` out across `width` columns, first flush left, last flush right.
fn spread(labels: &[&str], width: usize) -> String {
    let used: usize = labels.iter().map(|l| l.width()).sum();
    if labels.len() < 2 || used >= width {
        return labels.join(" ");
    }
    let gaps = labels.len() - 1;
    let free = width - used;
    let mut out = String::new();
    for (i, label) in labels.iter().enumerate() {
        out.push_str(label);
        if i < gaps {
            let pad = free / gaps + usize::from(i < free % gaps);
            out.push_str(&" ".repeat(pad));
        }
    }
    out
}

fn slider_bar(value: i32, min: i32, max: i32) -> String {
    let span = (max - min).max(1) as f64;
    let filled = (((value - min) as f64 / span) * SLIDER_WIDTH as f64).round() as usize;
    let filled = filled.min(SLIDER_WIDTH);
    format!("{}{}", "█".repeat(filled), "░".repeat(SLIDER_WIDTH - filled))
}

pub struct IdleScreen;

impl Screen for IdleScreen {
    fn render(&self, _screen: &SessionScreen, _area: Rect, _buf: &mut Buffer) {}
}

/// Start, training and finish messages
pub struct MessageScreen;

impl Screen for MessageScreen {
    fn render(&self, screen: &SessionScreen, area: Rect, buf: &mut Buffer) {
        let View::Message { text, .. } = screen.view else {
            return;
        };
        let lines = text
            .lines()
            .map(|l| Line::from(Span::styled(l.to_string(), bold())))
            .collect();
        render_centered(lines, area, buf);
    }

    fn on_key(&self, key: KeyEvent, _view: &View, _prompt: &mut PromptState) -> Option<SessionEvent> {
        is_confirm(&key).then_some(SessionEvent::Acknowledge)
    }

    fn hint(&self, _view: &View) -> &'static str {
        "Enter to continue, Esc twice to cancel"
    }
}

pub struct QuestionScreen;

impl Screen for QuestionScreen {
    fn render(&self, screen: &SessionScreen, area: Rect, buf: &mut Buffer) {
        let View::Question {
            number,
            total,
            intro,
            question,
            error,
            ..
        } = screen.view
        else {
            return;
        };
        let prompt = screen.prompt;
        let mut lines = vec![];
        if let Some(intro) = intro {
            lines.extend(intro.lines().map(|l| {
                Line::from(Span::styled(
                    l.to_string(),
                    Style::default().add_modifier(Modifier::ITALIC),
                ))
            }));
            lines.push(Line::default());
        }
        lines.push(Line::from(Span::styled(
            format!("Question {number} of {total}"),
            dim(),
        )));
        let suffix = if question.is_required() { "" } else { " (optional)" };
        lines.push(Line::from(Span::styled(
            format!("{}{suffix}", question.text()),
            bold(),
        )));
        lines.push(Line::default());

        match question.question_type() {
            Some(QuestionType::Radio) => {
                for (i, option) in question.options().iter().enumerate() {
                    let mark = if i == prompt.cursor { "> (•)" } else { "  ( )" };
                    lines.push(Line::from(format!("{mark} {option}")));
                }
            }
            Some(QuestionType::MultipleChoice) => {
                for (i, option) in question.options().iter().enumerate() {
                    let cursor = if i == prompt.cursor { ">" } else { " " };
                    let tick = if prompt.selected.contains(&i) { "x" } else { " " };
                    lines.push(Line::from(format!("{cursor} [{tick}] {option}")));
                }
            }
            _ => lines.push(Line::from(format!("> {}_", prompt.text))),
        }

        if let Some(error) = error {
            lines.push(Line::default());
            lines.push(Line::from(Span::styled(
                error.clone(),
                Style::default().fg(Color::Red).add_modifier(Modifier::BOLD),
            )));
        }
        render_centered(lines, area, buf);
    }

    fn on_key(&self, key: KeyEvent, view: &View, prompt: &mut PromptState) -> Option<SessionEvent> {
        let View::Question { question, .. } = view else {
            return None;
        };
        if key.code == KeyCode::Tab {
            return Some(SessionEvent::Answer(vec![]));
        }
        let options = question.options();
        match question.question_type() {
            Some(QuestionType::Radio) => match key.code {
                KeyCode::Up => prompt.move_cursor(-1, options.len()),
                KeyCode::Down => prompt.move_cursor(1, options.len()),
                KeyCode::Enter => {
                    return options
                        .get(prompt.cursor)
                        .map(|o| SessionEvent::Answer(vec![o.clone()]));
                }
                _ => {}
            },
            Some(QuestionType::MultipleChoice) => match key.code {
                KeyCode::Up => prompt.move_cursor(-1, options.len()),
                KeyCode::Down => prompt.move_cursor(1, options.len()),
                KeyCode::Char(' ') => prompt.toggle(prompt.cursor),
                KeyCode::Enter => {
                    let picked = prompt
                        .selected
                        .iter()
                        .filter_map(|i| options.get(*i).cloned())
                        .collect();
                    return Some(SessionEvent::Answer(picked));
                }
                _ => {}
            },
            _ => match key.code {
                KeyCode::Char(c) => prompt.text.push(c),
                KeyCode::Backspace => {
                    prompt.text.pop();
                }
                KeyCode::Enter => {
                    let text = prompt.text.trim();
                    let values = if text.is_empty() {
                        vec![]
                    } else {
                        vec![text.to_string()]
                    };
                    return Some(SessionEvent::Answer(values));
                }
                _ => {}
            },
        }
        None
    }

    fn hint(&self, view: &View) -> &'static str {
        let View::Question { question, .. } = view else {
            return "";
        };
        match question.question_type() {
            Some(QuestionType::Radio) => "Up/Down choose, Enter submit, Tab skip",
            Some(QuestionType::MultipleChoice) => "Up/Down move, Space tick, Enter submit, Tab skip",
            _ => "Type your answer, Enter submit, Tab skip",
        }
    }
}

/// Preparing and playing a video
pub struct PlaybackScreen;

impl Screen for PlaybackScreen {
    fn render(&self, screen: &SessionScreen, area: Rect, buf: &mut Buffer) {
        let (position, total, video, training, live) = match screen.view {
            View::Preparing {
                position,
                total,
                video,
                training,
            } => (position, total, video, training, None),
            View::Playing {
                position,
                total,
                video,
                training,
                live_rating,
            } => (position, total, video, training, *live_rating),
            _ => return,
        };
        let status = if matches!(screen.view, View::Preparing { .. }) {
            "Preparing"
        } else {
            "Playing"
        };
        let mut lines = vec![];
        if *training {
            lines.push(Line::from(Span::styled(
                "Training",
                Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD),
            )));
        }
        lines.push(Line::from(Span::styled(format!("{status} {video}"), bold())));
        lines.push(Line::from(Span::styled(format!("{position} / {total}"), dim())));
        if let Some(value) = live {
            lines.push(Line::default());
            lines.push(Line::from(format!("{value} {}", acr_label(value))));
            lines.push(Line::from(slider_bar(value, 1, 5)));
        }
        render_centered(lines, area, buf);
    }

    fn on_key(&self, key: KeyEvent, view: &View, _prompt: &mut PromptState) -> Option<SessionEvent> {
        let View::Playing {
            live_rating: Some(_),
            ..
        } = view
        else {
            return None;
        };
        match key.code {
            KeyCode::Up | KeyCode::Right | KeyCode::Char('+') => Some(SessionEvent::RatingAdjusted(1)),
            KeyCode::Down | KeyCode::Left | KeyCode::Char('-') => Some(SessionEvent::RatingAdjusted(-1)),
            _ => None,
        }
    }

    fn hint(&self, view: &View) -> &'static str {
        match view {
            View::Playing {
                live_rating: Some(_),
                ..
            } => "Up/Down adjust your rating while the video plays",
            _ => "",
        }
    }
}

pub struct BreakScreen;

impl BreakScreen {
    fn can_continue(view: &View) -> bool {
        matches!(
            view,
            View::Break {
                can_continue: true,
                ..
            } | View::Break {
                remaining_secs: None,
                ..
            }
        )
    }
}

impl Screen for BreakScreen {
    fn render(&self, screen: &SessionScreen, area: Rect, buf: &mut Buffer) {
        let View::Break { remaining_secs, .. } = screen.view else {
            return;
        };
        let mut lines = vec![Line::from(Span::styled("Break", bold()))];
        if let Some(secs) = remaining_secs {
            lines.push(Line::from(format!("{secs} seconds remaining")));
        }
        if Self::can_continue(screen.view) {
            lines.push(Line::default());
            lines.push(Line::from(Span::styled(
                "You may continue when ready",
                Style::default().fg(Color::Green),
            )));
        }
        render_centered(lines, area, buf);
    }

    fn on_key(&self, key: KeyEvent, _view: &View, _prompt: &mut PromptState) -> Option<SessionEvent> {
        is_confirm(&key).then_some(SessionEvent::Acknowledge)
    }

    fn hint(&self, view: &View) -> &'static str {
        if Self::can_continue(view) {
            "Enter to continue"
        } else {
            ""
        }
    }
}

pub struct RatingScreen;

impl Screen for RatingScreen {
    fn render(&self, screen: &SessionScreen, area: Rect, buf: &mut Buffer) {
        let View::Rating { scale, .. } = screen.view else {
            return;
        };
        let mut lines = vec![
            Line::from(Span::styled("How would you rate the quality of the video?", bold())),
            Line::default(),
        ];
        match scale {
            RatingScale::Categorical(labels) => {
                for (i, (label, _)) in labels.iter().enumerate() {
                    if i == screen.prompt.cursor {
                        lines.push(Line::from(Span::styled(
                            format!("> {label}"),
                            Style::default().fg(Color::Green).add_modifier(Modifier::BOLD),
                        )));
                    } else {
                        lines.push(Line::from(format!("  {label}")));
                    }
                }
            }
            RatingScale::Slider { min, max, initial } => {
                let value = screen.prompt.slider.unwrap_or(*initial);
                lines.push(Line::from(Span::styled(value.to_string(), bold())));
                lines.push(Line::from(slider_bar(value, *min, *max)));
                let ends = [min.to_string(), max.to_string()];
                let labels: Vec<&str> = if screen.no_ticks {
                    ends.iter().map(String::as_str).collect()
                } else {
                    ACR_LABELS.iter().rev().map(|(label, _)| *label).collect()
                };
                lines.push(Line::from(Span::styled(spread(&labels, SLIDER_WIDTH), dim())));
            }
        }
        render_centered(lines, area, buf);
    }

    fn on_key(&self, key: KeyEvent, view: &View, prompt: &mut PromptState) -> Option<SessionEvent> {
        let View::Rating { scale, .. } = view else {
            return None;
        };
        match scale {
            RatingScale::Categorical(labels) => match key.code {
                KeyCode::Up => prompt.move_cursor(-1, labels.len()),
                KeyCode::Down => prompt.move_cursor(1, labels.len()),
                KeyCode::Enter => {
                    return labels
                        .get(prompt.cursor)
                        .map(|(_, value)| SessionEvent::RatingSubmitted(*value));
                }
                KeyCode::Char(c) => {
                    let value = c.to_digit(10).map(|d| d as i32)?;
                    return scale.accepts(value).then_some(SessionEvent::RatingSubmitted(value));
                }
                _ => {}
            },
            RatingScale::Slider { min, max, initial } => {
                let current = prompt.slider.unwrap_or(*initial);
                let next = match key.code {
                    KeyCode::Left => current - 1,
                    KeyCode::Right => current + 1,
                    KeyCode::PageDown => current - 10,
                    KeyCode::PageUp => current + 10,
                    KeyCode::Home => *min,
                    KeyCode::End => *max,
                    KeyCode::Enter => return Some(SessionEvent::RatingSubmitted(current)),
                    _ => return None,
                };
                prompt.slider = Some(next.clamp(*min, *max));
            }
        }
        None
    }

    fn hint(&self, view: &View) -> &'static str {
        match view {
            View::Rating {
                scale: RatingScale::Slider { .. },
                ..
            } => "Left/Right move, PgUp/PgDn jump, Enter submit",
            _ => "Up/Down choose or press a number, Enter submit",
        }
    }
}

/// Helper to construct the appropriate screen for the current view
pub fn current_screen(view: &View) -> Box<dyn Screen> {
    match view {
        View::Idle => Box::new(IdleScreen),
        View::Message { .. } => Box::new(MessageScreen),
        View::Question { .. } => Box::new(QuestionScreen),
        View::Preparing { .. } | View::Playing { .. } => Box::new(PlaybackScreen),
        View::Break { .. } => Box::new(BreakScreen),
        View::Rating { .. } => Box::new(RatingScreen),
    }
}
