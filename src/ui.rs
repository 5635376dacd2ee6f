pub mod screen;

use std::collections::BTreeSet;
use std::mem::discriminant;

use ratatui::{
    buffer::Buffer,
    layout::{Alignment, Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Paragraph, Widget, Wrap},
};
use subjective::engine::View;

use self::screen::current_screen;

const HORIZONTAL_MARGIN: u16 = 5;
const VERTICAL_MARGIN: u16 = 2;

/// Input being composed for the prompt on screen
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PromptState {
    /// Highlighted option or rating label
    pub cursor: usize,
    /// Ticked options of a multiple-choice question
    pub selected: BTreeSet<usize>,
    pub text: String,
    pub slider: Option<i32>,
}

impl PromptState {
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    pub fn move_cursor(&mut self, delta: isize, len: usize) {
        if len == 0 {
            return;
        }
        self.cursor = (self.cursor as isize + delta).clamp(0, len as isize - 1) as usize;
    }

    pub fn toggle(&mut self, index: usize) {
        if !self.selected.remove(&index) {
            self.selected.insert(index);
        }
    }
}

/// Whether two views show the same prompt, so typed input should survive
pub fn same_prompt(a: &View, b: &View) -> bool {
    match (a, b) {
        (
            View::Question {
                phase: pa,
                number: na,
                ..
            },
            View::Question {
                phase: pb,
                number: nb,
                ..
            },
        ) => pa == pb && na == nb,
        (View::Rating { video: va, .. }, View::Rating { video: vb, .. }) => va == vb,
        _ => discriminant(a) == discriminant(b),
    }
}

/// Everything one frame needs
pub struct SessionScreen<'a> {
    pub view: &'a View,
    pub prompt: &'a PromptState,
    pub notice: Option<&'a str>,
    pub no_ticks: bool,
}

impl Widget for &SessionScreen<'_> {
    fn render(self, area: Rect, buf: &mut Buffer) {
        let chunks = Layout::default()
            .direction(Direction::Vertical)
            .horizontal_margin(HORIZONTAL_MARGIN)
            .vertical_margin(VERTICAL_MARGIN)
            .constraints([Constraint::Min(1), Constraint::Length(1), Constraint::Length(1)])
            .split(area);

        current_screen(self.view).render(self, chunks[0], buf);

        if let Some(notice) = self.notice {
            Paragraph::new(Span::styled(
                notice,
                Style::default()
                    .fg(Color::Yellow)
                    .add_modifier(Modifier::BOLD),
            ))
            .alignment(Alignment::Center)
            .render(chunks[1], buf);
        }

        Paragraph::new(Span::styled(
            current_screen(self.view).hint(self.view),
            Style::default().add_modifier(Modifier::DIM | Modifier::ITALIC),
        ))
        .alignment(Alignment::Center)
        .render(chunks[2], buf);
    }
}

/// Text block centred vertically in `area`
pub(crate) fn render_centered(lines: Vec<Line<'_>>, area: Rect, buf: &mut Buffer) {
    let width = area.width.max(1);
    let height = lines
        .iter()
        .map(|line| (line.width().max(1) as u16).div_ceil(width))
        .sum::<u16>()
        .min(area.height);
    let top = area.y + (area.height - height) / 2;
    let target = Rect::new(area.x, top, area.width, height);
    Paragraph::new(lines)
        .alignment(Alignment::Center)
        .wrap(Wrap { trim: true })
        .render(target, buf);
}
