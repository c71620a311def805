use cathode_common::types::{Cell, Coord, Rect, TextAttributes};

/// Row-major grid of character cells.
///
/// All operations are clamped: out-of-bounds single-cell writes are no-ops,
/// run lengths saturate at the end of the grid, and the return value is the
/// number of cells actually touched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CharGrid {
    size: Coord,
    cells: Vec<Cell>,
}

impl CharGrid {
    /// Allocate a grid filled with `fill`. Returns `None` when the backing
    /// storage cannot be allocated.
    pub fn new(size: Coord, fill: Cell) -> Option<Self> {
        if size.x <= 0 || size.y <= 0 {
            return None;
        }
        let total = usize::try_from(size.x).ok()? * usize::try_from(size.y).ok()?;
        let mut cells = Vec::new();
        cells.try_reserve_exact(total).ok()?;
        cells.resize(total, fill);
        Some(Self { size, cells })
    }

    pub fn size(&self) -> Coord {
        self.size
    }

    pub fn bounds(&self) -> Rect {
        Rect::new(0, 0, self.size.x - 1, self.size.y - 1)
    }

    fn index(&self, pos: Coord) -> Option<usize> {
        if pos.x < 0 || pos.y < 0 || pos.x >= self.size.x || pos.y >= self.size.y {
            return None;
        }
        Some(pos.y as usize * self.size.x as usize + pos.x as usize)
    }

    pub fn cell(&self, pos: Coord) -> Option<Cell> {
        self.index(pos).map(|idx| self.cells[idx])
    }

    pub fn set_cell(&mut self, pos: Coord, cell: Cell) -> bool {
        match self.index(pos) {
            Some(idx) => {
                self.cells[idx] = cell;
                true
            }
            None => false,
        }
    }

    /// Insert `cell` at `pos`, shifting the rest of the row right and
    /// dropping the final cell.
    pub fn insert_cell(&mut self, pos: Coord, cell: Cell) -> bool {
        let Some(idx) = self.index(pos) else {
            return false;
        };
        let row_end = (pos.y as usize + 1) * self.size.x as usize;
        self.cells.copy_within(idx..row_end - 1, idx + 1);
        self.cells[idx] = cell;
        true
    }

    /// Delete the cell at `pos`, shifting the rest of the row left and
    /// back-filling the final column with `fill`.
    pub fn delete_cell(&mut self, pos: Coord, fill: Cell) -> bool {
        let Some(idx) = self.index(pos) else {
            return false;
        };
        let row_end = (pos.y as usize + 1) * self.size.x as usize;
        self.cells.copy_within(idx + 1..row_end, idx);
        self.cells[row_end - 1] = fill;
        true
    }

    fn run(&self, origin: Coord, requested: usize) -> Option<(usize, usize)> {
        let start = self.index(origin)?;
        Some((start, requested.min(self.cells.len() - start)))
    }

    /// Fill `len` cells in row-major order starting at `origin` with `ch`,
    /// leaving attributes alone. Returns the count written.
    pub fn fill_chars(&mut self, origin: Coord, ch: u16, len: usize) -> usize {
        let Some((start, count)) = self.run(origin, len) else {
            return 0;
        };
        for cell in &mut self.cells[start..start + count] {
            cell.ch = ch;
        }
        count
    }

    pub fn fill_attrs(&mut self, origin: Coord, attrs: TextAttributes, len: usize) -> usize {
        let Some((start, count)) = self.run(origin, len) else {
            return 0;
        };
        for cell in &mut self.cells[start..start + count] {
            cell.attrs = attrs;
        }
        count
    }

    pub fn read_chars(&self, origin: Coord, out: &mut [u16]) -> usize {
        let Some((start, count)) = self.run(origin, out.len()) else {
            return 0;
        };
        for (slot, cell) in out.iter_mut().zip(&self.cells[start..start + count]) {
            *slot = cell.ch;
        }
        count
    }

    pub fn read_attrs(&self, origin: Coord, out: &mut [u16]) -> usize {
        let Some((start, count)) = self.run(origin, out.len()) else {
            return 0;
        };
        for (slot, cell) in out.iter_mut().zip(&self.cells[start..start + count]) {
            *slot = cell.attrs.bits();
        }
        count
    }

    pub fn write_chars(&mut self, origin: Coord, chars: &[u16]) -> usize {
        let Some((start, count)) = self.run(origin, chars.len()) else {
            return 0;
        };
        for (cell, ch) in self.cells[start..start + count].iter_mut().zip(chars) {
            cell.ch = *ch;
        }
        count
    }

    pub fn write_attrs(&mut self, origin: Coord, attrs: &[u16]) -> usize {
        let Some((start, count)) = self.run(origin, attrs.len()) else {
            return 0;
        };
        for (cell, word) in self.cells[start..start + count].iter_mut().zip(attrs) {
            cell.attrs = TextAttributes::from_bits_retain(*word);
        }
        count
    }

    /// Copy a rectangle of cells out of the grid. `source` is clamped to the
    /// grid; the returned vector is `width * height` of the clamped rect.
    pub fn read_rect(&self, source: Rect) -> (Rect, Vec<Cell>) {
        let clamped = source.intersect(&self.bounds());
        if clamped.is_empty() {
            return (clamped, Vec::new());
        }
        let mut cells =
            Vec::with_capacity(clamped.width() as usize * clamped.height() as usize);
        for y in clamped.top..=clamped.bottom {
            let row = self.index(Coord::new(clamped.left, y)).expect("clamped row");
            cells.extend_from_slice(&self.cells[row..row + clamped.width() as usize]);
        }
        (clamped, cells)
    }

    /// Write a row-major rectangle of cells. `cells` must hold
    /// `dest.width() * dest.height()` entries; cells falling outside the
    /// grid are dropped. Returns the count written.
    pub fn write_rect(&mut self, dest: Rect, cells: &[Cell]) -> usize {
        if dest.is_empty() {
            return 0;
        }
        let width = dest.width() as usize;
        let mut written = 0;
        for (row_index, y) in (dest.top..=dest.bottom).enumerate() {
            for (col_index, x) in (dest.left..=dest.right).enumerate() {
                let Some(cell) = cells.get(row_index * width + col_index) else {
                    return written;
                };
                if self.set_cell(Coord::new(x, y), *cell) {
                    written += 1;
                }
            }
        }
        written
    }

    /// Move a rectangle of cells and back-fill the vacated area.
    ///
    /// The contents of `source` (clamped to the grid) land at
    /// `dest_origin`, restricted to `clip`; cells of `source` not covered
    /// by the destination are filled with `fill`. The copy goes through a
    /// snapshot so overlapping moves are safe. Returns false only when the
    /// snapshot cannot be allocated.
    pub fn scroll(
        &mut self,
        source: Rect,
        clip: Option<Rect>,
        dest_origin: Coord,
        fill: Cell,
    ) -> bool {
        let valid = self.bounds();
        let src = source.intersect(&valid);
        let clip = clip.map_or(valid, |c| c.intersect(&valid));
        if src.is_empty() || clip.is_empty() {
            return true;
        }

        let width = src.width() as usize;
        let height = src.height() as usize;
        let mut snapshot: Vec<Cell> = Vec::new();
        if snapshot.try_reserve_exact(width * height).is_err() {
            return false;
        }
        for y in src.top..=src.bottom {
            let row = self.index(Coord::new(src.left, y)).expect("clamped row");
            snapshot.extend_from_slice(&self.cells[row..row + width]);
        }

        // The destination keeps the offset of the unclamped source origin.
        let dx = dest_origin.x - source.left;
        let dy = dest_origin.y - source.top;
        let dest = Rect::new(src.left + dx, src.top + dy, src.right + dx, src.bottom + dy);

        for pos_y in src.top..=src.bottom {
            for pos_x in src.left..=src.right {
                let pos = Coord::new(pos_x, pos_y);
                if clip.contains(pos) && !dest.contains(pos) {
                    self.set_cell(pos, fill);
                }
            }
        }

        for (row_index, y) in (src.top..=src.bottom).enumerate() {
            for (col_index, x) in (src.left..=src.right).enumerate() {
                let target = Coord::new(x + dx, y + dy);
                if clip.contains(target) {
                    self.set_cell(target, snapshot[row_index * width + col_index]);
                }
            }
        }

        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn grid(w: i16, h: i16) -> CharGrid {
        CharGrid::new(Coord::new(w, h), Cell::default()).unwrap()
    }

    fn row_string(grid: &CharGrid, y: i16) -> String {
        let mut out = String::new();
        for x in 0..grid.size().x {
            out.push(char::from_u32(u32::from(grid.cell(Coord::new(x, y)).unwrap().ch)).unwrap());
        }
        out
    }

    fn put_str(grid: &mut CharGrid, origin: Coord, text: &str) {
        let units: Vec<u16> = text.encode_utf16().collect();
        grid.write_chars(origin, &units);
    }

    #[test]
    fn test_out_of_bounds_ops_are_noops() {
        let mut g = grid(4, 2);
        assert!(!g.set_cell(Coord::new(4, 0), Cell::default()));
        assert!(!g.set_cell(Coord::new(0, -1), Cell::default()));
        assert_eq!(g.fill_chars(Coord::new(0, 2), b'x' as u16, 5), 0);
        let mut out = [0u16; 4];
        assert_eq!(g.read_chars(Coord::new(-1, 0), &mut out), 0);
    }

    #[test]
    fn test_fill_wraps_rows_and_saturates() {
        let mut g = grid(3, 2);
        // Fill crossing the right edge wraps to the next row and stops at
        // the end of the grid.
        assert_eq!(g.fill_chars(Coord::new(2, 0), b'#' as u16, 10), 4);
        assert_eq!(row_string(&g, 0), "  #");
        assert_eq!(row_string(&g, 1), "###");
    }

    #[test]
    fn test_insert_shifts_row_and_drops_last() {
        let mut g = grid(4, 1);
        put_str(&mut g, Coord::new(0, 0), "abcd");
        g.insert_cell(Coord::new(1, 0), Cell::new(b'X' as u16, TextAttributes::standard()));
        assert_eq!(row_string(&g, 0), "aXbc");
    }

    #[test]
    fn test_delete_shifts_left_and_backfills() {
        let mut g = grid(4, 1);
        put_str(&mut g, Coord::new(0, 0), "abcd");
        g.delete_cell(Coord::new(1, 0), Cell::default());
        assert_eq!(row_string(&g, 0), "acd ");
    }

    #[test]
    fn test_scroll_up_within_region() {
        let mut g = grid(3, 4);
        for (y, text) in ["aaa", "bbb", "ccc", "ddd"].iter().enumerate() {
            put_str(&mut g, Coord::new(0, y as i16), text);
        }
        // Move rows 1..=2 up one row, blanks fill the vacated row 2.
        assert!(g.scroll(
            Rect::new(0, 1, 2, 2),
            Some(Rect::new(0, 0, 2, 2)),
            Coord::new(0, 0),
            Cell::default(),
        ));
        assert_eq!(row_string(&g, 0), "bbb");
        assert_eq!(row_string(&g, 1), "ccc");
        assert_eq!(row_string(&g, 2), "   ");
        assert_eq!(row_string(&g, 3), "ddd");
    }

    #[test]
    fn test_scroll_overlapping_down() {
        let mut g = grid(2, 3);
        put_str(&mut g, Coord::new(0, 0), "ab");
        put_str(&mut g, Coord::new(0, 1), "cd");
        put_str(&mut g, Coord::new(0, 2), "ef");
        assert!(g.scroll(Rect::new(0, 0, 1, 1), None, Coord::new(0, 1), Cell::default()));
        assert_eq!(row_string(&g, 0), "  ");
        assert_eq!(row_string(&g, 1), "ab");
        assert_eq!(row_string(&g, 2), "cd");
    }

    #[test]
    fn test_scroll_respects_clip() {
        let mut g = grid(3, 3);
        put_str(&mut g, Coord::new(0, 0), "abc");
        put_str(&mut g, Coord::new(0, 1), "def");
        // Clip to column 0: only that column moves or is filled.
        assert!(g.scroll(
            Rect::new(0, 0, 2, 0),
            Some(Rect::new(0, 0, 0, 2)),
            Coord::new(0, 1),
            Cell::new(b'.' as u16, TextAttributes::standard()),
        ));
        assert_eq!(row_string(&g, 0), ".bc");
        assert_eq!(row_string(&g, 1), "aef");
    }

    #[test]
    fn test_read_rect_clamps() {
        let g = grid(3, 2);
        let (clamped, cells) = g.read_rect(Rect::new(1, 0, 10, 10));
        assert_eq!(clamped, Rect::new(1, 0, 2, 1));
        assert_eq!(cells.len(), 4);
    }
}
