//! The streaming VT escape machine.
//!
//! The parser state lives inside the screen buffer so a sequence can be
//! split across any number of write requests. Phases are an explicit enum
//! and all accumulators are bounded; overflow aborts the sequence back to
//! ground rather than growing without limit.

use cathode_common::types::{default_palette, Cell, Coord, Rect, TextAttributes};
use tracing::trace;

use super::engine::{carriage_return, line_feed, reverse_line_feed, OutputSinks};
use super::sgr;
use crate::buffer::screen::{SavedCursor, ScreenBuffer};

const MAX_INTERMEDIATES: usize = 4;
const MAX_CSI_LENGTH: usize = 128;
const MAX_CSI_PARAMS: usize = 32;
const MAX_OSC_PAYLOAD: usize = 512;
/// Parameters accumulate 20 bits before saturating.
const MAX_CSI_PARAM_VALUE: u32 = 0xF_FFFF;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum VtPhase {
    #[default]
    Ground,
    Escape,
    EscDispatch,
    Csi,
    Osc,
    OscEscape,
    VtString,
    StringEscape,
}

#[derive(Debug, Clone, Default)]
struct CsiAccum {
    params: Vec<u32>,
    current: Option<u32>,
    private: bool,
    exclamation: bool,
    length: usize,
}

impl CsiAccum {
    fn push_digit(&mut self, digit: u32) {
        let value = self.current.unwrap_or(0);
        self.current = Some(
            value
                .saturating_mul(10)
                .saturating_add(digit)
                .min(MAX_CSI_PARAM_VALUE),
        );
    }

    fn finish_param(&mut self) {
        let value = self.current.take().unwrap_or(0);
        if self.params.len() < MAX_CSI_PARAMS {
            self.params.push(value);
        }
    }

    fn param(&self, index: usize, default: u32) -> u32 {
        match self.params.get(index) {
            Some(&0) | None => default,
            Some(&value) => value,
        }
    }

    fn raw_param(&self, index: usize) -> u32 {
        self.params.get(index).copied().unwrap_or(0)
    }
}

#[derive(Debug, Clone, Default)]
struct OscAccum {
    action: u32,
    in_payload: bool,
    payload: Vec<u16>,
}

/// Per-buffer parser scratch: the phase plus the accumulators the active
/// phase is filling.
#[derive(Debug, Clone, Default)]
pub struct VtParseState {
    phase: VtPhase,
    intermediates: Vec<u8>,
    csi: CsiAccum,
    osc: OscAccum,
}

impl VtParseState {
    pub fn phase(&self) -> VtPhase {
        self.phase
    }

    fn reset(&mut self) {
        *self = Self::default();
    }
}

/// Units that pull the machine out of ground state.
pub(crate) fn is_introducer(unit: u16) -> bool {
    matches!(
        unit,
        0x1B | 0x90 | 0x98 | 0x9B | 0x9C | 0x9D | 0x9E | 0x9F
    )
}

pub(crate) fn enter(buf: &mut ScreenBuffer, unit: u16) {
    let vt = buf.vt_mut();
    vt.reset();
    vt.phase = match unit {
        0x1B => VtPhase::Escape,
        0x9B => VtPhase::Csi,
        0x9D => VtPhase::Osc,
        0x90 | 0x98 | 0x9E | 0x9F => VtPhase::VtString,
        // C1 ST with no open string is a no-op.
        _ => VtPhase::Ground,
    };
}

pub(crate) fn process_unit(buf: &mut ScreenBuffer, unit: u16, sinks: &mut OutputSinks<'_>) {
    match buf.vt().phase {
        VtPhase::Ground => unreachable!("ground units are handled by the engine"),
        VtPhase::Escape => escape_phase(buf, unit),
        VtPhase::EscDispatch => esc_dispatch_phase(buf, unit),
        VtPhase::Csi => csi_phase(buf, unit, sinks),
        VtPhase::Osc => osc_phase(buf, unit, sinks),
        VtPhase::OscEscape => osc_escape_phase(buf, unit, sinks),
        VtPhase::VtString => {
            if unit == 0x9C {
                buf.vt_mut().reset();
            } else if unit == 0x1B {
                buf.vt_mut().phase = VtPhase::StringEscape;
            }
        }
        VtPhase::StringEscape => match unit {
            0x5C => buf.vt_mut().reset(),
            0x1B => {}
            _ => buf.vt_mut().phase = VtPhase::VtString,
        },
    }
}

fn escape_phase(buf: &mut ScreenBuffer, unit: u16) {
    let mut done = true;
    match unit {
        0x5B => {
            buf.vt_mut().phase = VtPhase::Csi;
            done = false;
        }
        0x5D => {
            buf.vt_mut().phase = VtPhase::Osc;
            done = false;
        }
        0x50 | 0x58 | 0x5E | 0x5F => {
            buf.vt_mut().phase = VtPhase::VtString;
            done = false;
        }
        0x37 => buf.save_cursor_state(),
        0x38 => restore_cursor(buf),
        0x44 => line_feed(buf),
        0x4D => reverse_line_feed(buf),
        0x45 => {
            carriage_return(buf);
            line_feed(buf);
        }
        0x63 => hard_reset(buf),
        0x5C => {}
        0x20..=0x2F => {
            buf.vt_mut().intermediates.push(unit as u8);
            buf.vt_mut().phase = VtPhase::EscDispatch;
            done = false;
        }
        _ => {
            trace!(unit, "unrecognized escape final consumed");
        }
    }
    if done {
        buf.vt_mut().reset();
    }
}

fn esc_dispatch_phase(buf: &mut ScreenBuffer, unit: u16) {
    match unit {
        0x20..=0x2F => {
            if buf.vt().intermediates.len() >= MAX_INTERMEDIATES {
                buf.vt_mut().reset();
            } else {
                buf.vt_mut().intermediates.push(unit as u8);
            }
        }
        0x30..=0x7E => {
            let is_decaln = buf.vt().intermediates == [b'#'] && unit == 0x38;
            buf.vt_mut().reset();
            if is_decaln {
                screen_alignment_pattern(buf);
            }
        }
        _ => buf.vt_mut().reset(),
    }
}

fn csi_phase(buf: &mut ScreenBuffer, unit: u16, sinks: &mut OutputSinks<'_>) {
    buf.vt_mut().csi.length += 1;
    if buf.vt().csi.length > MAX_CSI_LENGTH {
        buf.vt_mut().reset();
        return;
    }
    match unit {
        0x30..=0x39 => buf.vt_mut().csi.push_digit(u32::from(unit - 0x30)),
        0x3B => buf.vt_mut().csi.finish_param(),
        0x3F => buf.vt_mut().csi.private = true,
        0x21 => buf.vt_mut().csi.exclamation = true,
        0x40..=0x7E => {
            buf.vt_mut().csi.finish_param();
            let accum = std::mem::take(&mut buf.vt_mut().csi);
            buf.vt_mut().reset();
            dispatch_csi(buf, &accum, unit as u8, sinks);
        }
        0x1B => {
            buf.vt_mut().reset();
            buf.vt_mut().phase = VtPhase::Escape;
        }
        _ => buf.vt_mut().reset(),
    }
}

fn osc_phase(buf: &mut ScreenBuffer, unit: u16, sinks: &mut OutputSinks<'_>) {
    match unit {
        0x07 | 0x9C => {
            let accum = std::mem::take(&mut buf.vt_mut().osc);
            buf.vt_mut().reset();
            dispatch_osc(&accum, sinks);
        }
        0x1B => buf.vt_mut().phase = VtPhase::OscEscape,
        0x30..=0x39 if !buf.vt().osc.in_payload => {
            let osc = &mut buf.vt_mut().osc;
            osc.action = osc.action.saturating_mul(10).saturating_add(u32::from(unit - 0x30));
        }
        0x3B if !buf.vt().osc.in_payload => buf.vt_mut().osc.in_payload = true,
        _ => {
            if !buf.vt().osc.in_payload {
                // A non-numeric action is not something we dispatch; drop
                // the string.
                buf.vt_mut().reset();
                buf.vt_mut().phase = VtPhase::VtString;
            } else if buf.vt().osc.payload.len() < MAX_OSC_PAYLOAD {
                buf.vt_mut().osc.payload.push(unit);
            } else {
                buf.vt_mut().reset();
                buf.vt_mut().phase = VtPhase::VtString;
            }
        }
    }
}

fn osc_escape_phase(buf: &mut ScreenBuffer, unit: u16, sinks: &mut OutputSinks<'_>) {
    if unit == 0x5C {
        let accum = std::mem::take(&mut buf.vt_mut().osc);
        buf.vt_mut().reset();
        dispatch_osc(&accum, sinks);
    } else {
        buf.vt_mut().reset();
    }
}

fn dispatch_osc(accum: &OscAccum, sinks: &mut OutputSinks<'_>) {
    match accum.action {
        0 | 1 | 2 | 21 => {
            if let Some(title) = sinks.title.as_deref_mut() {
                title.clear();
                title.extend_from_slice(&accum.payload);
            }
        }
        other => trace!(action = other, "OSC action captured and discarded"),
    }
}

fn dispatch_csi(buf: &mut ScreenBuffer, accum: &CsiAccum, final_byte: u8, sinks: &mut OutputSinks<'_>) {
    match final_byte {
        b'm' if !accum.private => {
            let attrs = sgr::apply_sgr(
                &accum.params,
                buf.text_attrs(),
                buf.default_text_attrs(),
                buf.palette(),
            );
            buf.set_text_attrs(attrs);
        }
        b'n' => device_status_report(buf, accum, sinks),
        b'H' | b'f' => cursor_position(buf, accum.param(0, 1), accum.param(1, 1)),
        b'G' | b'`' => {
            let x = (accum.param(0, 1) as i32 - 1).clamp(0, i32::from(buf.size().x) - 1);
            move_and_clear(buf, Coord::new(x as i16, buf.cursor().y));
        }
        b'd' => {
            let y = absolute_row(buf, accum.param(0, 1));
            move_and_clear(buf, Coord::new(buf.cursor().x, y));
        }
        b'E' => {
            cursor_vertical(buf, accum.param(0, 1) as i32);
            move_and_clear(buf, Coord::new(0, buf.cursor().y));
        }
        b'F' => {
            cursor_vertical(buf, -(accum.param(0, 1) as i32));
            move_and_clear(buf, Coord::new(0, buf.cursor().y));
        }
        b'A' => cursor_vertical(buf, -(accum.param(0, 1) as i32)),
        b'B' => cursor_vertical(buf, accum.param(0, 1) as i32),
        b'C' => cursor_horizontal(buf, accum.param(0, 1) as i32),
        b'D' => cursor_horizontal(buf, -(accum.param(0, 1) as i32)),
        b'@' => insert_chars(buf, accum.param(0, 1)),
        b'P' => delete_chars(buf, accum.param(0, 1)),
        b'X' => erase_chars(buf, accum.param(0, 1)),
        b'r' => set_scrolling_margins(buf, accum),
        b'S' => scroll_region_vertical(buf, accum.param(0, 1).min(i16::MAX as u32) as i16),
        b'T' => scroll_region_vertical(buf, -(accum.param(0, 1).min(i16::MAX as u32) as i16)),
        b'L' => insert_delete_lines(buf, accum.param(0, 1), true),
        b'M' => insert_delete_lines(buf, accum.param(0, 1), false),
        b'J' => erase_display(buf, accum.raw_param(0)),
        b'K' => erase_line(buf, accum.raw_param(0)),
        b'p' if accum.exclamation => soft_reset(buf),
        b's' if accum.params.is_empty() && !accum.private => buf.save_cursor_state(),
        b'u' => restore_cursor(buf),
        b'h' => set_modes(buf, accum, true),
        b'l' => set_modes(buf, accum, false),
        other => trace!(final_byte = other, "unsupported CSI final ignored"),
    }
}

fn move_and_clear(buf: &mut ScreenBuffer, pos: Coord) {
    buf.move_cursor(pos);
    buf.clear_delayed_wrap();
}

/// Vertical clamp bounds: movement that starts inside the margins stays
/// inside them.
fn vertical_bounds(buf: &ScreenBuffer) -> (i16, i16) {
    let (top, bottom) = buf.scroll_region();
    let y = buf.cursor().y;
    let min = if y >= top { top } else { 0 };
    let max = if y <= bottom { bottom } else { buf.size().y - 1 };
    (min, max)
}

fn cursor_vertical(buf: &mut ScreenBuffer, delta: i32) {
    let (min, max) = vertical_bounds(buf);
    let y = (i32::from(buf.cursor().y) + delta).clamp(i32::from(min), i32::from(max));
    move_and_clear(buf, Coord::new(buf.cursor().x, y as i16));
}

fn cursor_horizontal(buf: &mut ScreenBuffer, delta: i32) {
    let x = (i32::from(buf.cursor().x) + delta).clamp(0, i32::from(buf.size().x) - 1);
    move_and_clear(buf, Coord::new(x as i16, buf.cursor().y));
}

fn absolute_row(buf: &ScreenBuffer, row: u32) -> i16 {
    let row = row.min(i16::MAX as u32) as i32 - 1;
    if buf.origin_mode() {
        let (top, bottom) = buf.scroll_region();
        (i32::from(top) + row).clamp(i32::from(top), i32::from(bottom)) as i16
    } else {
        row.clamp(0, i32::from(buf.size().y) - 1) as i16
    }
}

fn cursor_position(buf: &mut ScreenBuffer, row: u32, col: u32) {
    let y = absolute_row(buf, row);
    let x = (col.min(i16::MAX as u32) as i32 - 1).clamp(0, i32::from(buf.size().x) - 1) as i16;
    move_and_clear(buf, Coord::new(x, y));
}

fn device_status_report(buf: &ScreenBuffer, accum: &CsiAccum, sinks: &mut OutputSinks<'_>) {
    match accum.raw_param(0) {
        5 => inject_reply(sinks, b"\x1b[0n"),
        6 => {
            let base_y = if buf.origin_mode() {
                buf.scroll_region().0
            } else {
                buf.viewport().top
            };
            let row = i32::from(buf.cursor().y) - i32::from(base_y) + 1;
            let col = i32::from(buf.cursor().x) - i32::from(buf.viewport().left) + 1;
            let reply = if accum.private {
                format!("\x1b[?{row};{col};1R")
            } else {
                format!("\x1b[{row};{col}R")
            };
            inject_reply(sinks, reply.as_bytes());
        }
        _ => {}
    }
}

fn inject_reply(sinks: &mut OutputSinks<'_>, bytes: &[u8]) {
    if let Some(host) = sinks.host.as_deref_mut() {
        if host.vt_should_answer_queries() {
            let _ = host.inject_input_bytes(bytes);
        }
    }
}

fn blank_cell(buf: &ScreenBuffer) -> Cell {
    Cell::blank(buf.text_attrs())
}

fn insert_chars(buf: &mut ScreenBuffer, count: u32) {
    let cursor = buf.cursor();
    let fill = blank_cell(buf);
    let count = count.min(buf.size().x as u32);
    for _ in 0..count {
        buf.insert_shift(cursor, fill);
    }
    buf.clear_delayed_wrap();
}

fn delete_chars(buf: &mut ScreenBuffer, count: u32) {
    let cursor = buf.cursor();
    let fill = blank_cell(buf);
    let count = count.min(buf.size().x as u32);
    for _ in 0..count {
        buf.delete_shift(cursor, fill);
    }
    buf.clear_delayed_wrap();
}

fn erase_chars(buf: &mut ScreenBuffer, count: u32) {
    let cursor = buf.cursor();
    let remaining = (buf.size().x - cursor.x) as usize;
    let count = (count as usize).min(remaining);
    let attrs = buf.text_attrs();
    buf.fill_chars(cursor, b' ' as u16, count);
    buf.fill_attrs(cursor, attrs, count);
    buf.clear_delayed_wrap();
}

fn erase_display(buf: &mut ScreenBuffer, mode: u32) {
    let size = buf.size();
    let cursor = buf.cursor();
    let attrs = buf.text_attrs();
    let total = size.x as usize * size.y as usize;
    let linear = cursor.y as usize * size.x as usize + cursor.x as usize;
    match mode {
        0 => {
            buf.fill_chars(cursor, b' ' as u16, total - linear);
            buf.fill_attrs(cursor, attrs, total - linear);
        }
        1 => {
            buf.fill_chars(Coord::new(0, 0), b' ' as u16, linear + 1);
            buf.fill_attrs(Coord::new(0, 0), attrs, linear + 1);
        }
        2 | 3 => buf.clear_all(attrs),
        _ => {}
    }
    buf.clear_delayed_wrap();
}

fn erase_line(buf: &mut ScreenBuffer, mode: u32) {
    let cursor = buf.cursor();
    let width = buf.size().x;
    let attrs = buf.text_attrs();
    let (origin, len) = match mode {
        0 => (cursor, (width - cursor.x) as usize),
        1 => (Coord::new(0, cursor.y), cursor.x as usize + 1),
        2 => (Coord::new(0, cursor.y), width as usize),
        _ => return,
    };
    buf.fill_chars(origin, b' ' as u16, len);
    buf.fill_attrs(origin, attrs, len);
    buf.clear_delayed_wrap();
}

fn set_scrolling_margins(buf: &mut ScreenBuffer, accum: &CsiAccum) {
    let height = buf.size().y as u32;
    let top = accum.param(0, 1);
    let bottom = accum.param(1, height);
    if top == 1 && bottom >= height {
        buf.set_margins(None);
    } else if top < bottom && bottom <= height {
        if !buf.set_margins(Some((top as i16 - 1, bottom as i16 - 1))) {
            return;
        }
    } else {
        return;
    }
    let home_y = if buf.origin_mode() {
        buf.scroll_region().0
    } else {
        0
    };
    move_and_clear(buf, Coord::new(0, home_y));
}

/// Positive `delta` scrolls content up (SU), negative down (SD).
pub(crate) fn scroll_region_vertical(buf: &mut ScreenBuffer, delta: i16) {
    if delta == 0 {
        return;
    }
    let (top, bottom) = buf.scroll_region();
    let region = Rect::new(0, top, buf.size().x - 1, bottom);
    let fill = blank_cell(buf);
    buf.scroll(region, Some(region), Coord::new(0, top - delta), fill);
}

fn insert_delete_lines(buf: &mut ScreenBuffer, count: u32, insert: bool) {
    let (top, bottom) = buf.scroll_region();
    let y = buf.cursor().y;
    if y < top || y > bottom {
        return;
    }
    let count = (count.min(i16::MAX as u32) as i16).min(bottom - y + 1);
    let region = Rect::new(0, y, buf.size().x - 1, bottom);
    let fill = blank_cell(buf);
    let dest_y = if insert { y + count } else { y - count };
    buf.scroll(region, Some(region), Coord::new(0, dest_y), fill);
    buf.clear_delayed_wrap();
}

fn set_modes(buf: &mut ScreenBuffer, accum: &CsiAccum, enable: bool) {
    for &param in &accum.params {
        if !accum.private {
            if param == 4 {
                buf.set_insert_mode(enable);
            }
            continue;
        }
        match param {
            25 => buf.set_cursor_visible(enable),
            6 => {
                buf.set_origin_mode(enable);
                let home_y = if enable { buf.scroll_region().0 } else { 0 };
                move_and_clear(buf, Coord::new(0, home_y));
            }
            7 => buf.set_autowrap(enable),
            1049 => {
                let attrs = buf.text_attrs();
                buf.set_vt_using_alternate_screen_buffer(enable, b' ' as u16, attrs);
            }
            other => trace!(selector = other, enable, "unsupported private mode ignored"),
        }
    }
}

fn restore_cursor(buf: &mut ScreenBuffer) {
    buf.restore_cursor_state();
    if buf.origin_mode() {
        let (top, bottom) = buf.scroll_region();
        let clamped = buf.cursor().y.clamp(top, bottom);
        if clamped != buf.cursor().y {
            let delayed = buf.delayed_wrap_pos().is_some();
            buf.move_cursor(Coord::new(buf.cursor().x, clamped));
            buf.restore_delayed_wrap(delayed);
        }
    }
}

fn soft_reset(buf: &mut ScreenBuffer) {
    buf.set_cursor_visible(true);
    buf.set_autowrap(true);
    buf.set_origin_mode(false);
    buf.set_insert_mode(false);
    buf.set_margins(None);
    let default = buf.default_text_attrs();
    buf.set_text_attrs(default);
    buf.set_saved_cursor(Some(SavedCursor::default()));
}

fn hard_reset(buf: &mut ScreenBuffer) {
    if buf.in_alternate_buffer() {
        let attrs = buf.default_text_attrs();
        buf.set_vt_using_alternate_screen_buffer(false, b' ' as u16, attrs);
    }
    buf.set_palette(default_palette());
    buf.set_margins(None);
    buf.set_origin_mode(false);
    buf.set_insert_mode(false);
    buf.set_autowrap(true);
    let default = buf.default_text_attrs();
    buf.set_text_attrs(default);
    buf.clear_all(default);
    buf.move_cursor(Coord::new(0, 0));
    buf.set_cursor_visible(true);
    buf.clear_delayed_wrap();
    buf.set_saved_cursor(None);
}

fn screen_alignment_pattern(buf: &mut ScreenBuffer) {
    let default = buf.default_text_attrs();
    let total = buf.size().x as usize * buf.size().y as usize;
    buf.fill_chars(Coord::new(0, 0), b'E' as u16, total);
    buf.fill_attrs(Coord::new(0, 0), default, total);
    let attrs = buf.text_attrs() - TextAttributes::REVERSE_VIDEO - TextAttributes::UNDERSCORE;
    buf.set_text_attrs(attrs);
    buf.set_origin_mode(false);
    buf.set_margins(None);
    move_and_clear(buf, Coord::new(0, 0));
}
