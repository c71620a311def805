use cathode_common::modes::OutputMode;
use cathode_common::traits::HostIo;
use cathode_common::types::{Cell, Coord};

use super::vt::{self, VtPhase};
use crate::buffer::screen::ScreenBuffer;

/// Side channels the output engine may need while applying text: the host
/// input stream for VT query replies, and the server title for OSC.
#[derive(Default)]
pub struct OutputSinks<'a> {
    pub host: Option<&'a mut dyn HostIo>,
    pub title: Option<&'a mut Vec<u16>>,
}

/// Apply a wide-character stream to the screen buffer under the given
/// output mode.
pub fn apply_text(
    buf: &mut ScreenBuffer,
    text: &[u16],
    mode: OutputMode,
    sinks: &mut OutputSinks<'_>,
) {
    let vt_mode = mode.contains(OutputMode::VIRTUAL_TERMINAL_PROCESSING);
    // A wrap the engine already performed absorbs the next explicit line
    // feed, so "AB\r\n" with B in the last column advances one row, not two.
    let mut wrap_absorbs_lf = false;

    for &unit in text {
        if vt_mode {
            if buf.vt().phase() != VtPhase::Ground {
                vt::process_unit(buf, unit, sinks);
                continue;
            }
            if vt::is_introducer(unit) {
                vt::enter(buf, unit);
                continue;
            }
        }

        if mode.contains(OutputMode::PROCESSED_OUTPUT) {
            match unit {
                0x0D => {
                    carriage_return(buf);
                    continue;
                }
                0x0A => {
                    if wrap_absorbs_lf {
                        wrap_absorbs_lf = false;
                    } else {
                        line_feed(buf);
                    }
                    if !mode.contains(OutputMode::DISABLE_NEWLINE_AUTO_RETURN) {
                        carriage_return(buf);
                    }
                    continue;
                }
                0x08 => {
                    let cursor = buf.cursor();
                    if cursor.x > 0 {
                        buf.move_cursor(Coord::new(cursor.x - 1, cursor.y));
                    }
                    buf.clear_delayed_wrap();
                    continue;
                }
                0x09 => {
                    let spaces = 8 - (buf.cursor().x % 8) as usize;
                    for _ in 0..spaces {
                        write_printable(buf, b' ' as u16, mode, &mut wrap_absorbs_lf);
                    }
                    continue;
                }
                _ => {}
            }
        }

        write_printable(buf, unit, mode, &mut wrap_absorbs_lf);
    }
}

fn write_printable(buf: &mut ScreenBuffer, unit: u16, mode: OutputMode, wrap_absorbs_lf: &mut bool) {
    let vt_mode = mode.contains(OutputMode::VIRTUAL_TERMINAL_PROCESSING);

    // Deferred EOL: the glyph written in the last column left the cursor
    // there; the wrap happens now, just before the next glyph.
    if vt_mode && buf.autowrap() {
        if let Some(pos) = buf.delayed_wrap_pos() {
            if pos == buf.cursor() {
                carriage_return(buf);
                line_feed(buf);
            }
        }
    }

    let cursor = buf.cursor();
    let cell = Cell::new(unit, buf.text_attrs());
    if vt_mode && buf.insert_mode() {
        buf.insert_shift(cursor, cell);
    } else {
        buf.put_cell(cursor, cell);
    }

    let last_column = buf.size().x - 1;
    if vt_mode {
        if cursor.x >= last_column {
            buf.set_delayed_wrap_at_cursor();
        } else {
            buf.move_cursor(Coord::new(cursor.x + 1, cursor.y));
            buf.clear_delayed_wrap();
        }
    } else if cursor.x >= last_column {
        if mode.contains(OutputMode::WRAP_AT_EOL_OUTPUT) {
            carriage_return(buf);
            line_feed(buf);
            *wrap_absorbs_lf = true;
        }
        // Without wrap the cursor is pinned to the last column.
    } else {
        buf.move_cursor(Coord::new(cursor.x + 1, cursor.y));
    }
}

pub(crate) fn carriage_return(buf: &mut ScreenBuffer) {
    buf.move_cursor(Coord::new(0, buf.cursor().y));
    buf.clear_delayed_wrap();
}

/// Line feed honoring the scroll region (§DECSTBM): at the region bottom
/// the region scrolls; outside the region the whole buffer scrolls once
/// the cursor falls off the end.
pub(crate) fn line_feed(buf: &mut ScreenBuffer) {
    buf.clear_delayed_wrap();
    let (top, bottom) = buf.scroll_region();
    let cursor = buf.cursor();
    if cursor.y >= top && cursor.y <= bottom {
        if cursor.y == bottom {
            vt::scroll_region_vertical(buf, 1);
        } else {
            buf.move_cursor(Coord::new(cursor.x, cursor.y + 1));
        }
    } else if cursor.y + 1 >= buf.size().y {
        let bounds = buf.bounds();
        let fill = Cell::blank(buf.text_attrs());
        buf.scroll(bounds, None, Coord::new(0, -1), fill);
    } else {
        buf.move_cursor(Coord::new(cursor.x, cursor.y + 1));
    }
}

pub(crate) fn reverse_line_feed(buf: &mut ScreenBuffer) {
    buf.clear_delayed_wrap();
    let (top, bottom) = buf.scroll_region();
    let cursor = buf.cursor();
    if cursor.y >= top && cursor.y <= bottom {
        if cursor.y == top {
            vt::scroll_region_vertical(buf, -1);
        } else {
            buf.move_cursor(Coord::new(cursor.x, cursor.y - 1));
        }
    } else if cursor.y == 0 {
        let bounds = buf.bounds();
        let fill = Cell::blank(buf.text_attrs());
        buf.scroll(bounds, None, Coord::new(0, 1), fill);
    } else {
        buf.move_cursor(Coord::new(cursor.x, cursor.y - 1));
    }
}
