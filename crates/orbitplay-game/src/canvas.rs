use std::fmt;

use crate::{body::ARENA_HALF, fixed::Vec2};

pub const DEFAULT_WIDTH: usize = 64;
pub const DEFAULT_HEIGHT: usize = 24;

/// Character grid the game draws the arena onto, plus one status line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AsciiCanvas {
    width: usize,
    height: usize,
    cells: Vec<char>,
    status: String,
}

impl AsciiCanvas {
    pub fn new(width: usize, height: usize) -> Self {
        let (width, height) = (width.max(1), height.max(1));
        Self {
            width,
            height,
            cells: vec![' '; width * height],
            status: String::new(),
        }
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn clear(&mut self) {
        self.cells.fill(' ');
        self.status.clear();
    }

    pub fn set_status(&mut self, status: String) {
        self.status = status;
    }

    pub fn status(&self) -> &str {
        &self.status
    }

    pub fn get(&self, col: usize, row: usize) -> Option<char> {
        (col < self.width && row < self.height).then(|| self.cells[row * self.width + col])
    }

    /// Put `glyph` at the cell covering world position `pos`. Positions
    /// outside the arena are ignored.
    pub fn plot(&mut self, pos: Vec2, glyph: char) {
        let Some(col) = to_cell(pos.x, self.width) else {
            return;
        };
        let Some(row) = to_cell(pos.y, self.height) else {
            return;
        };
        self.cells[row * self.width + col] = glyph;
    }
}

fn to_cell(coord: i64, cells: usize) -> Option<usize> {
    let span = 2 * ARENA_HALF;
    let offset = coord + ARENA_HALF;
    if !(0..=span).contains(&offset) {
        return None;
    }
    let cell = (offset as i128 * cells as i128 / (span as i128 + 1)) as usize;
    Some(cell.min(cells - 1))
}

impl Default for AsciiCanvas {
    fn default() -> Self {
        Self::new(DEFAULT_WIDTH, DEFAULT_HEIGHT)
    }
}

impl fmt::Display for AsciiCanvas {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}", self.status)?;
        for row in self.cells.chunks(self.width) {
            let line: String = row.iter().collect();
            writeln!(f, "{}", line.trim_end())?;
        }
        Ok(())
    }
}
