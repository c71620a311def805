//! The cooked (line-input) editor.
//!
//! Active while a ReadConsole waits in line-input mode: decoded tokens
//! mutate an edit buffer held on the input handle, echo repaints the active
//! screen buffer and the host output sink, and a terminator moves the
//! composed line into the handle's ready queue for piecemeal delivery.

use std::cell::RefCell;

use cathode_common::modes::{InputMode, OutputMode};
use cathode_common::traits::HostIo;
use cathode_common::types::{clamp_to_char_boundary, next_char_index, prev_char_index};
use cathode_parser::codepage;
use cathode_parser::token::{control_key_state, virtual_key, KeyEventRecord};
use tracing::trace;

use crate::buffer::screen::ScreenBuffer;
use crate::output::{apply_text, OutputSinks};

/// The edit buffer never grows past this many UTF-16 units; further input
/// is dropped until the line is submitted.
const LINE_CAPACITY: usize = 8192;

const BS: u16 = 0x08;
const SPACE: u16 = b' ' as u16;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CookedLineState {
    pub line: Vec<u16>,
    /// Index into `line` in UTF-16 units; never inside a surrogate pair.
    pub cursor: usize,
    pub insert: bool,
    /// A completed line (terminator included) awaiting delivery.
    pub ready: Vec<u16>,
}

impl Default for CookedLineState {
    fn default() -> Self {
        Self {
            line: Vec::new(),
            cursor: 0,
            insert: true,
            ready: Vec::new(),
        }
    }
}

impl CookedLineState {
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

/// What a token did to the line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CookedEvent {
    /// The line was finalized; `history_line` is the text without the
    /// terminator suffix.
    LineComplete {
        history_line: Vec<u16>,
        terminated_by_cr: bool,
    },
    CtrlC,
    CtrlBreak,
    EndOfFile,
}

/// One in-flight cooked read: the handle's editor state plus the sinks
/// echo writes to.
pub struct CookedSession<'a, H: HostIo> {
    pub state: &'a mut CookedLineState,
    pub input_mode: InputMode,
    pub output_mode: OutputMode,
    pub output_code_page: u32,
    pub process_control_z: bool,
    pub screen: Option<&'a RefCell<ScreenBuffer>>,
    pub host: &'a mut H,
}

impl<H: HostIo> CookedSession<'_, H> {
    fn processed(&self) -> bool {
        self.input_mode.contains(InputMode::PROCESSED_INPUT)
    }

    fn echo_enabled(&self) -> bool {
        self.input_mode.contains(InputMode::ECHO_INPUT)
    }

    fn echo_units(&mut self, units: &[u16]) {
        if !self.echo_enabled() || units.is_empty() {
            return;
        }
        if let Some(screen) = self.screen {
            let mut buf = screen.borrow_mut();
            apply_text(&mut buf, units, self.output_mode, &mut OutputSinks::default());
        }
        let mut bytes = Vec::new();
        codepage::encode_units(self.output_code_page, units, &mut bytes);
        let _ = self.host.write_output_bytes(&bytes);
    }

    /// Repaint from edit position `from` (where the terminal cursor
    /// currently sits) to the end of the line, cover `blanks` vacated
    /// columns, and backspace the terminal cursor to the edit cursor.
    fn repaint_from(&mut self, from: usize, blanks: usize) {
        let mut units: Vec<u16> = self.state.line[from..].to_vec();
        units.extend(std::iter::repeat(SPACE).take(blanks));
        let back = self.state.line.len() + blanks - self.state.cursor;
        units.extend(std::iter::repeat(BS).take(back));
        self.echo_units(&units);
    }

    fn insert_units(&mut self, units: &[u16]) {
        if self.state.line.len() + units.len() > LINE_CAPACITY {
            trace!("cooked line at capacity, input dropped");
            return;
        }
        let start = self.state.cursor;
        let mut removed = 0;
        if !self.state.insert && self.state.cursor < self.state.line.len() {
            let end = next_char_index(&self.state.line, self.state.cursor);
            removed = end - self.state.cursor;
            self.state.line.drain(self.state.cursor..end);
        }
        let cursor = self.state.cursor;
        self.state.line.splice(cursor..cursor, units.iter().copied());
        self.state.cursor += units.len();
        self.repaint_from(start, removed.saturating_sub(units.len()));
    }

    fn backspace(&mut self) {
        if self.state.cursor == 0 {
            return;
        }
        let start = prev_char_index(&self.state.line, self.state.cursor);
        let removed = self.state.cursor - start;
        self.state.line.drain(start..self.state.cursor);
        self.state.cursor = start;
        let steps: Vec<u16> = std::iter::repeat(BS).take(removed).collect();
        self.echo_units(&steps);
        self.repaint_from(start, removed);
    }

    fn delete_at_cursor(&mut self) {
        if self.state.cursor >= self.state.line.len() {
            return;
        }
        let end = next_char_index(&self.state.line, self.state.cursor);
        let removed = end - self.state.cursor;
        self.state.line.drain(self.state.cursor..end);
        self.repaint_from(self.state.cursor, removed);
    }

    fn clear_line(&mut self) {
        let len = self.state.line.len();
        let mut units: Vec<u16> = std::iter::repeat(BS).take(self.state.cursor).collect();
        units.extend(std::iter::repeat(SPACE).take(len));
        units.extend(std::iter::repeat(BS).take(len));
        self.echo_units(&units);
        self.state.line.clear();
        self.state.cursor = 0;
    }

    fn move_cursor_to(&mut self, target: usize) {
        let target = clamp_to_char_boundary(&self.state.line, target);
        if target < self.state.cursor {
            let steps: Vec<u16> = std::iter::repeat(BS)
                .take(self.state.cursor - target)
                .collect();
            self.echo_units(&steps);
        } else if target > self.state.cursor {
            let ahead = self.state.line[self.state.cursor..target].to_vec();
            self.echo_units(&ahead);
        }
        self.state.cursor = target;
    }

    fn is_word_space(&self, index: usize) -> bool {
        self.state.line.get(index) == Some(&SPACE)
    }

    fn word_left(&self) -> usize {
        let line = &self.state.line;
        let mut index = self.state.cursor;
        while index > 0 && self.is_word_space(prev_char_index(line, index)) {
            index = prev_char_index(line, index);
        }
        while index > 0 && !self.is_word_space(prev_char_index(line, index)) {
            index = prev_char_index(line, index);
        }
        index
    }

    fn word_right(&self) -> usize {
        let line = &self.state.line;
        let mut index = self.state.cursor;
        while index < line.len() && !self.is_word_space(index) {
            index = next_char_index(line, index);
        }
        while index < line.len() && self.is_word_space(index) {
            index = next_char_index(line, index);
        }
        index
    }

    fn delete_to_start(&mut self) {
        let removed = self.state.cursor;
        if removed == 0 {
            return;
        }
        self.state.line.drain(..removed);
        let steps: Vec<u16> = std::iter::repeat(BS).take(removed).collect();
        self.echo_units(&steps);
        self.state.cursor = 0;
        self.repaint_from(0, removed);
    }

    fn delete_to_end(&mut self) {
        let removed = self.state.line.len() - self.state.cursor;
        if removed == 0 {
            return;
        }
        self.state.line.truncate(self.state.cursor);
        self.repaint_from(self.state.cursor, removed);
    }

    fn finalize(&mut self, terminated_by_cr: bool) -> CookedEvent {
        let mut echo: Vec<u16> = self.state.line[self.state.cursor..].to_vec();
        let suffix: &[u16] = if self.processed() {
            &[0x0D, 0x0A]
        } else {
            &[0x0D]
        };
        echo.extend_from_slice(suffix);
        self.echo_units(&echo);

        let history_line = std::mem::take(&mut self.state.line);
        self.state.ready.extend_from_slice(&history_line);
        self.state.ready.extend_from_slice(suffix);
        self.state.cursor = 0;
        CookedEvent::LineComplete {
            history_line,
            terminated_by_cr,
        }
    }

    /// Feed one decoded text token (a character or surrogate pair).
    pub fn handle_text(&mut self, units: &[u16]) -> Option<CookedEvent> {
        if units.len() == 1 {
            match units[0] {
                0x0D => return Some(self.finalize(true)),
                0x0A => return Some(self.finalize(false)),
                0x08 | 0x7F => {
                    self.backspace();
                    return None;
                }
                0x03 if self.processed() => return Some(CookedEvent::CtrlC),
                0x1A if self.process_control_z && self.state.line.is_empty() => {
                    return Some(CookedEvent::EndOfFile);
                }
                0x1B => {
                    self.clear_line();
                    return None;
                }
                _ => {}
            }
        }
        self.insert_units(units);
        None
    }

    /// Feed one synthesized key event.
    pub fn handle_key(&mut self, record: KeyEventRecord) -> Option<CookedEvent> {
        if !record.key_down {
            return None;
        }
        let ctrl = record.control_key_state
            & (control_key_state::LEFT_CTRL_PRESSED | control_key_state::RIGHT_CTRL_PRESSED)
            != 0;
        for _ in 0..record.repeat_count.max(1) {
            match record.virtual_key_code {
                virtual_key::VK_LEFT => {
                    let target = if ctrl {
                        self.word_left()
                    } else {
                        prev_char_index(&self.state.line, self.state.cursor)
                    };
                    self.move_cursor_to(target);
                }
                virtual_key::VK_RIGHT => {
                    let target = if ctrl {
                        self.word_right()
                    } else {
                        next_char_index(&self.state.line, self.state.cursor)
                    };
                    self.move_cursor_to(target);
                }
                virtual_key::VK_HOME => {
                    if ctrl {
                        self.delete_to_start();
                    } else {
                        self.move_cursor_to(0);
                    }
                }
                virtual_key::VK_END => {
                    if ctrl {
                        self.delete_to_end();
                    } else {
                        self.move_cursor_to(self.state.line.len());
                    }
                }
                virtual_key::VK_DELETE => self.delete_at_cursor(),
                virtual_key::VK_INSERT => self.state.insert = !self.state.insert,
                virtual_key::VK_ESCAPE => self.clear_line(),
                virtual_key::VK_RETURN => return Some(self.finalize(true)),
                virtual_key::VK_BACK => self.backspace(),
                virtual_key::VK_CANCEL if self.processed() => {
                    return Some(CookedEvent::CtrlBreak);
                }
                _ => {
                    if record.unicode_char != 0 {
                        if let Some(event) = self.handle_text(&[record.unicode_char]) {
                            return Some(event);
                        }
                    }
                }
            }
        }
        None
    }
}
