use cathode_common::types::{default_palette, Cell, ColorRef, Coord, Rect, TextAttributes};
use tracing::debug;

use super::grid::CharGrid;
use crate::output::vt::VtParseState;

pub const DEFAULT_SIZE: Coord = Coord { x: 120, y: 40 };
pub const DEFAULT_CURSOR_SIZE: u32 = 25;

/// Cursor state captured by DECSC and restored by DECRC.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SavedCursor {
    pub position: Coord,
    pub attrs: TextAttributes,
    pub delayed_wrap: bool,
    pub origin_mode: bool,
}

impl Default for SavedCursor {
    fn default() -> Self {
        Self {
            position: Coord::new(0, 0),
            attrs: TextAttributes::standard(),
            delayed_wrap: false,
            origin_mode: false,
        }
    }
}

/// Main-buffer snapshot taken while the alternate buffer is active.
#[derive(Debug, Clone)]
struct AltBackup {
    grid: CharGrid,
    cursor: Coord,
    text_attrs: TextAttributes,
    margins: Option<(i16, i16)>,
    delayed_wrap_pos: Option<Coord>,
    origin_mode: bool,
    saved_cursor: Option<SavedCursor>,
}

/// One screen buffer: the cell grid plus every piece of presentation state
/// the console protocol exposes for it.
#[derive(Debug, Clone)]
pub struct ScreenBuffer {
    grid: CharGrid,
    cursor: Coord,
    viewport: Rect,
    max_window: Coord,
    text_attrs: TextAttributes,
    default_text_attrs: TextAttributes,
    popup_attrs: u16,
    cursor_size: u32,
    cursor_visible: bool,
    palette: [ColorRef; 16],
    saved_cursor: Option<SavedCursor>,
    margins: Option<(i16, i16)>,
    alt_backup: Option<Box<AltBackup>>,
    autowrap: bool,
    delayed_wrap_pos: Option<Coord>,
    origin_mode: bool,
    insert_mode: bool,
    vt: VtParseState,
    revision: u64,
}

impl ScreenBuffer {
    pub fn new(size: Coord) -> Option<Self> {
        let attrs = TextAttributes::standard();
        let grid = CharGrid::new(size, Cell::blank(attrs))?;
        Some(Self {
            grid,
            cursor: Coord::new(0, 0),
            viewport: Rect::new(0, 0, size.x - 1, size.y - 1),
            max_window: size,
            text_attrs: attrs,
            default_text_attrs: attrs,
            popup_attrs: 0,
            cursor_size: DEFAULT_CURSOR_SIZE,
            cursor_visible: true,
            palette: default_palette(),
            saved_cursor: None,
            margins: None,
            alt_backup: None,
            autowrap: true,
            delayed_wrap_pos: None,
            origin_mode: false,
            insert_mode: false,
            vt: VtParseState::default(),
            revision: 0,
        })
    }

    pub fn with_default_size() -> Option<Self> {
        Self::new(DEFAULT_SIZE)
    }

    fn touch(&mut self) {
        self.revision += 1;
    }

    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn size(&self) -> Coord {
        self.grid.size()
    }

    pub fn bounds(&self) -> Rect {
        self.grid.bounds()
    }

    pub fn cursor(&self) -> Coord {
        self.cursor
    }

    pub fn viewport(&self) -> Rect {
        self.viewport
    }

    pub fn max_window(&self) -> Coord {
        self.max_window
    }

    pub fn text_attrs(&self) -> TextAttributes {
        self.text_attrs
    }

    pub fn default_text_attrs(&self) -> TextAttributes {
        self.default_text_attrs
    }

    pub fn popup_attrs(&self) -> u16 {
        self.popup_attrs
    }

    pub fn cursor_size(&self) -> u32 {
        self.cursor_size
    }

    pub fn cursor_visible(&self) -> bool {
        self.cursor_visible
    }

    pub fn palette(&self) -> &[ColorRef; 16] {
        &self.palette
    }

    pub fn margins(&self) -> Option<(i16, i16)> {
        self.margins
    }

    pub fn autowrap(&self) -> bool {
        self.autowrap
    }

    pub fn origin_mode(&self) -> bool {
        self.origin_mode
    }

    pub fn insert_mode(&self) -> bool {
        self.insert_mode
    }

    pub fn delayed_wrap_pos(&self) -> Option<Coord> {
        self.delayed_wrap_pos
    }

    pub fn in_alternate_buffer(&self) -> bool {
        self.alt_backup.is_some()
    }

    pub fn saved_cursor(&self) -> Option<SavedCursor> {
        self.saved_cursor
    }

    pub fn vt(&self) -> &VtParseState {
        &self.vt
    }

    /// Parser scratch is not presentation state; changing it does not bump
    /// the revision.
    pub fn vt_mut(&mut self) -> &mut VtParseState {
        &mut self.vt
    }

    /// The active scroll region as inclusive rows: DECSTBM margins when
    /// set, else the full buffer height.
    pub fn scroll_region(&self) -> (i16, i16) {
        self.margins.unwrap_or((0, self.size().y - 1))
    }

    pub fn set_cursor_position(&mut self, pos: Coord) -> bool {
        if !self.bounds().contains(pos) {
            return false;
        }
        if self.cursor != pos {
            self.cursor = pos;
            self.touch();
        }
        self.clear_delayed_wrap();
        true
    }

    /// Cursor move from the output engine: position is already computed
    /// in-bounds, delayed wrap is managed by the caller.
    pub(crate) fn move_cursor(&mut self, pos: Coord) {
        debug_assert!(self.bounds().contains(pos));
        if self.cursor != pos {
            self.cursor = pos;
            self.touch();
        }
    }

    pub fn set_delayed_wrap_at_cursor(&mut self) {
        self.delayed_wrap_pos = Some(self.cursor);
    }

    pub fn clear_delayed_wrap(&mut self) {
        self.delayed_wrap_pos = None;
    }

    pub(crate) fn restore_delayed_wrap(&mut self, set: bool) {
        self.delayed_wrap_pos = set.then_some(self.cursor);
    }

    pub fn set_text_attrs(&mut self, attrs: TextAttributes) {
        if self.text_attrs != attrs {
            self.text_attrs = attrs;
            self.touch();
        }
    }

    pub fn set_default_text_attrs(&mut self, attrs: TextAttributes) {
        if self.default_text_attrs != attrs {
            self.default_text_attrs = attrs;
            self.touch();
        }
    }

    pub fn set_popup_attrs(&mut self, attrs: u16) {
        self.popup_attrs = attrs;
    }

    pub fn set_cursor_info(&mut self, size: u32, visible: bool) -> bool {
        if !(1..=100).contains(&size) {
            return false;
        }
        if self.cursor_size != size || self.cursor_visible != visible {
            self.cursor_size = size;
            self.cursor_visible = visible;
            self.touch();
        }
        true
    }

    pub fn set_cursor_visible(&mut self, visible: bool) {
        if self.cursor_visible != visible {
            self.cursor_visible = visible;
            self.touch();
        }
    }

    pub fn set_palette(&mut self, palette: [ColorRef; 16]) {
        if self.palette != palette {
            self.palette = palette;
            self.touch();
        }
    }

    pub fn set_autowrap(&mut self, enabled: bool) {
        self.autowrap = enabled;
        self.clear_delayed_wrap();
    }

    pub fn set_origin_mode(&mut self, enabled: bool) {
        self.origin_mode = enabled;
    }

    pub fn set_insert_mode(&mut self, enabled: bool) {
        self.insert_mode = enabled;
    }

    /// Set DECSTBM margins. Rows are 0-based inclusive and must describe a
    /// region of at least two rows inside the buffer.
    pub fn set_margins(&mut self, margins: Option<(i16, i16)>) -> bool {
        if let Some((top, bottom)) = margins {
            if top < 0 || bottom >= self.size().y || top >= bottom {
                return false;
            }
        }
        self.margins = margins;
        true
    }

    /// Resize the cell storage, preserving the top-left overlap and filling
    /// the remainder with blank cells in the default attributes.
    pub fn set_size(&mut self, new_size: Coord) -> bool {
        if new_size.x <= 0 || new_size.y <= 0 {
            return false;
        }
        if new_size == self.size() {
            return true;
        }
        let fill = Cell::blank(self.default_text_attrs);
        let Some(mut new_grid) = CharGrid::new(new_size, fill) else {
            return false;
        };
        let keep = Rect::new(
            0,
            0,
            (new_size.x.min(self.size().x)) - 1,
            (new_size.y.min(self.size().y)) - 1,
        );
        let (region, cells) = self.grid.read_rect(keep);
        new_grid.write_rect(region, &cells);
        self.grid = new_grid;

        self.cursor = Coord::new(
            self.cursor.x.min(new_size.x - 1),
            self.cursor.y.min(new_size.y - 1),
        );
        let width = self.viewport.width().min(new_size.x);
        let height = self.viewport.height().min(new_size.y);
        let left = self.viewport.left.min(new_size.x - width);
        let top = self.viewport.top.min(new_size.y - height);
        self.viewport = Rect::new(left, top, left + width - 1, top + height - 1);
        if let Some((margin_top, margin_bottom)) = self.margins {
            if margin_bottom >= new_size.y || margin_top >= margin_bottom {
                self.margins = None;
            } else {
                self.margins = Some((margin_top, margin_bottom));
            }
        }
        self.clear_delayed_wrap();
        self.touch();
        debug!(x = new_size.x, y = new_size.y, "screen buffer resized");
        true
    }

    /// Validate and install a new viewport rectangle.
    pub fn set_viewport(&mut self, rect: Rect) -> bool {
        if rect.is_empty() || !self.bounds().contains(Coord::new(rect.left, rect.top)) {
            return false;
        }
        if !self.bounds().contains(Coord::new(rect.right, rect.bottom)) {
            return false;
        }
        if self.viewport != rect {
            self.viewport = rect;
            self.touch();
        }
        true
    }

    /// Translate the viewport the minimal distance that brings the cursor
    /// inside it; dimensions are unchanged.
    pub fn snap_window_to_cursor(&mut self) {
        let mut view = self.viewport;
        if self.cursor.x < view.left {
            let shift = view.left - self.cursor.x;
            view.left -= shift;
            view.right -= shift;
        } else if self.cursor.x > view.right {
            let shift = self.cursor.x - view.right;
            view.left += shift;
            view.right += shift;
        }
        if self.cursor.y < view.top {
            let shift = view.top - self.cursor.y;
            view.top -= shift;
            view.bottom -= shift;
        } else if self.cursor.y > view.bottom {
            let shift = self.cursor.y - view.bottom;
            view.top += shift;
            view.bottom += shift;
        }
        if view != self.viewport {
            self.viewport = view;
            self.touch();
        }
    }

    pub fn save_cursor_state(&mut self) {
        self.saved_cursor = Some(SavedCursor {
            position: self.cursor,
            attrs: self.text_attrs,
            delayed_wrap: self.delayed_wrap_pos.is_some(),
            origin_mode: self.origin_mode,
        });
    }

    pub fn set_saved_cursor(&mut self, saved: Option<SavedCursor>) {
        self.saved_cursor = saved;
    }

    /// Restore DECSC state; the position is clamped into bounds.
    pub fn restore_cursor_state(&mut self) {
        let saved = self.saved_cursor.unwrap_or_default();
        let pos = Coord::new(
            saved.position.x.clamp(0, self.size().x - 1),
            saved.position.y.clamp(0, self.size().y - 1),
        );
        self.move_cursor(pos);
        self.set_text_attrs(saved.attrs);
        self.origin_mode = saved.origin_mode;
        self.restore_delayed_wrap(saved.delayed_wrap);
    }

    /// Switch to or from the alternate screen buffer (DECSET 1049).
    /// Enabling while already in alternate mode is a no-op, as is
    /// disabling in main mode. Returns false only on allocation failure.
    pub fn set_vt_using_alternate_screen_buffer(
        &mut self,
        enable: bool,
        fill_ch: u16,
        fill_attrs: TextAttributes,
    ) -> bool {
        if enable {
            if self.alt_backup.is_some() {
                return true;
            }
            let Some(blank) = CharGrid::new(self.size(), Cell::new(fill_ch, fill_attrs)) else {
                return false;
            };
            let backup = AltBackup {
                grid: std::mem::replace(&mut self.grid, blank),
                cursor: self.cursor,
                text_attrs: self.text_attrs,
                margins: self.margins,
                delayed_wrap_pos: self.delayed_wrap_pos,
                origin_mode: self.origin_mode,
                saved_cursor: self.saved_cursor,
            };
            self.alt_backup = Some(Box::new(backup));
            self.cursor = Coord::new(0, 0);
            self.margins = None;
            self.delayed_wrap_pos = None;
            self.saved_cursor = None;
            self.touch();
        } else {
            let Some(backup) = self.alt_backup.take() else {
                return true;
            };
            self.grid = backup.grid;
            self.cursor = backup.cursor;
            self.text_attrs = backup.text_attrs;
            self.margins = backup.margins;
            self.delayed_wrap_pos = backup.delayed_wrap_pos;
            self.origin_mode = backup.origin_mode;
            self.saved_cursor = backup.saved_cursor;
            self.touch();
        }
        true
    }

    // Grid pass-throughs that keep the revision honest.

    pub fn cell(&self, pos: Coord) -> Option<Cell> {
        self.grid.cell(pos)
    }

    pub fn put_cell(&mut self, pos: Coord, cell: Cell) -> bool {
        let changed = self.grid.set_cell(pos, cell);
        if changed {
            self.touch();
        }
        changed
    }

    pub fn insert_shift(&mut self, pos: Coord, cell: Cell) -> bool {
        let changed = self.grid.insert_cell(pos, cell);
        if changed {
            self.touch();
        }
        changed
    }

    pub fn delete_shift(&mut self, pos: Coord, fill: Cell) -> bool {
        let changed = self.grid.delete_cell(pos, fill);
        if changed {
            self.touch();
        }
        changed
    }

    pub fn fill_chars(&mut self, origin: Coord, ch: u16, len: usize) -> usize {
        let count = self.grid.fill_chars(origin, ch, len);
        if count > 0 {
            self.touch();
        }
        count
    }

    pub fn fill_attrs(&mut self, origin: Coord, attrs: TextAttributes, len: usize) -> usize {
        let count = self.grid.fill_attrs(origin, attrs, len);
        if count > 0 {
            self.touch();
        }
        count
    }

    pub fn read_chars(&self, origin: Coord, out: &mut [u16]) -> usize {
        self.grid.read_chars(origin, out)
    }

    pub fn read_attrs(&self, origin: Coord, out: &mut [u16]) -> usize {
        self.grid.read_attrs(origin, out)
    }

    pub fn write_chars(&mut self, origin: Coord, chars: &[u16]) -> usize {
        let count = self.grid.write_chars(origin, chars);
        if count > 0 {
            self.touch();
        }
        count
    }

    pub fn write_attrs(&mut self, origin: Coord, attrs: &[u16]) -> usize {
        let count = self.grid.write_attrs(origin, attrs);
        if count > 0 {
            self.touch();
        }
        count
    }

    pub fn read_rect(&self, source: Rect) -> (Rect, Vec<Cell>) {
        self.grid.read_rect(source)
    }

    pub fn write_rect(&mut self, dest: Rect, cells: &[Cell]) -> usize {
        let count = self.grid.write_rect(dest, cells);
        if count > 0 {
            self.touch();
        }
        count
    }

    pub fn scroll(
        &mut self,
        source: Rect,
        clip: Option<Rect>,
        dest_origin: Coord,
        fill: Cell,
    ) -> bool {
        let ok = self.grid.scroll(source, clip, dest_origin, fill);
        if ok {
            self.touch();
        }
        ok
    }

    /// Fill the whole grid with blanks in the given attributes.
    pub fn clear_all(&mut self, attrs: TextAttributes) {
        let total = self.size().x as usize * self.size().y as usize;
        self.grid.fill_chars(Coord::new(0, 0), b' ' as u16, total);
        self.grid.fill_attrs(Coord::new(0, 0), attrs, total);
        self.touch();
    }
}
