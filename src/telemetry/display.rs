//! Multi-pane status display.
//!
//! The terminal is split into a fixed grid of cells, one per rank, laid out
//! row-major. Each cell shows a rank's latest message and a progress bar:
//!
//! ```text
//! +---------------------------------------
//! |
//! |        Pass#   2  TRAAB...  --->  4
//! |  45.10%  [####      ] 1804/4000
//! |
//! ```
//!
//! Only cells marked dirty on the [`StatusBoard`] are repainted.

use super::board::{Progress, StatusBoard};
use crate::config::TerminalGeometry;
use crate::constants;
use crate::group::Rank;
use std::io::{self, Write};

const BORDER_H: char = '-';
const BORDER_V: char = '|';
const BORDER_T: char = '+';

/// Top-left corner of a cell, in zero-based terminal coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CellPosition {
    pub row: usize,
    pub column: usize,
    pub x: usize,
    pub y: usize,
}

/// Fixed grid of status cells.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GridLayout {
    columns: usize,
    rows: usize,
    cell_width: usize,
    cell_height: usize,
}

impl GridLayout {
    /// Fit as many cells of the given size as the terminal holds (at least
    /// one).
    pub fn new(geometry: TerminalGeometry, cell_width: usize, cell_height: usize) -> Self {
        let cell_width = cell_width.max(1);
        let cell_height = cell_height.max(1);
        Self {
            columns: (geometry.columns / cell_width).max(1),
            rows: (geometry.rows / cell_height).max(1),
            cell_width,
            cell_height,
        }
    }

    /// Cells per row.
    pub fn columns(&self) -> usize {
        self.columns
    }

    /// Rows of cells.
    pub fn rows(&self) -> usize {
        self.rows
    }

    /// Number of ranks that fit on screen.
    pub fn capacity(&self) -> usize {
        self.columns * self.rows
    }

    /// Width of one cell.
    pub fn cell_width(&self) -> usize {
        self.cell_width
    }

    /// Height of one cell.
    pub fn cell_height(&self) -> usize {
        self.cell_height
    }

    /// Where a rank's cell sits, or `None` if it does not fit on screen.
    pub fn cell_for(&self, rank: Rank) -> Option<CellPosition> {
        let row = rank / self.columns;
        let column = rank % self.columns;
        (row < self.rows).then(|| CellPosition {
            row,
            column,
            x: column * self.cell_width,
            y: row * self.cell_height,
        })
    }
}

/// Everything needed to paint one cell.
#[derive(Debug, Clone, Copy)]
pub struct Cell<'a> {
    pub rank: Rank,
    pub position: CellPosition,
    pub width: usize,
    pub height: usize,
    pub message: &'a str,
    pub progress: Progress,
}

/// A grid-addressable terminal surface.
pub trait CellRenderer {
    /// Paint one cell.
    fn draw_cell(&mut self, cell: &Cell<'_>) -> io::Result<()>;

    /// Called after a batch of cells has been drawn.
    fn finish(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Format a progress pair as `" 45.10%  [####    ] 1804/4000"` fitted to a
/// cell of `width` columns.
pub fn progress_line(progress: Progress, width: usize) -> String {
    let bar_len = width
        .saturating_sub(constants::telemetry::PROGRESS_DECORATION)
        .max(1);
    let fraction = progress.fraction();
    let filled = ((fraction * bar_len as f64) as usize).min(bar_len);
    format!(
        "{:6.2}%  [{:<bar_len$}] {}/{}",
        fraction * 100.0,
        "#".repeat(filled),
        progress.completed,
        progress.total,
        bar_len = bar_len
    )
}

fn fit(text: &str, width: usize) -> String {
    let clipped: String = text.chars().take(width).collect();
    format!("{:^width$}", clipped, width = width)
}

/// Renderer that positions the cursor with ANSI escape sequences.
pub struct AnsiRenderer<W: Write> {
    out: W,
    cleared: bool,
}

impl AnsiRenderer<io::Stderr> {
    /// Render to standard error.
    pub fn stderr() -> Self {
        Self::new(io::stderr())
    }
}

impl<W: Write> AnsiRenderer<W> {
    /// Render to `out`. The screen is cleared before the first cell.
    pub fn new(out: W) -> Self {
        Self {
            out,
            cleared: false,
        }
    }

    /// Consume the renderer and return the writer.
    pub fn into_inner(self) -> W {
        self.out
    }

    fn move_to(&mut self, x: usize, y: usize) -> io::Result<()> {
        write!(self.out, "\x1b[{};{}H", y + 1, x + 1)
    }
}

impl<W: Write> CellRenderer for AnsiRenderer<W> {
    fn draw_cell(&mut self, cell: &Cell<'_>) -> io::Result<()> {
        if !self.cleared {
            write!(self.out, "\x1b[2J")?;
            self.cleared = true;
        }

        let inner = cell.width.saturating_sub(1);
        let (x, y) = (cell.position.x, cell.position.y);
        let border: String = std::iter::repeat(BORDER_H).take(inner).collect();

        self.move_to(x, y)?;
        write!(self.out, "{}{}", BORDER_T, border)?;
        for line in 1..cell.height {
            self.move_to(x, y + line)?;
            match line {
                2 => write!(self.out, "{}{}", BORDER_V, fit(cell.message, inner))?,
                3 => write!(
                    self.out,
                    "{}{}",
                    BORDER_V,
                    fit(&progress_line(cell.progress, cell.width), inner)
                )?,
                _ => write!(self.out, "{}{:inner$}", BORDER_V, "", inner = inner)?,
            }
        }
        Ok(())
    }

    fn finish(&mut self) -> io::Result<()> {
        self.out.flush()
    }
}

/// Repaint every dirty cell of `board` and clear the dirty marks.
///
/// Returns the number of cells drawn; ranks that do not fit on screen are
/// skipped.
pub fn redraw(
    board: &mut StatusBoard,
    layout: &GridLayout,
    renderer: &mut dyn CellRenderer,
) -> io::Result<usize> {
    let mut drawn = 0;
    for rank in board.take_dirty() {
        let position = match layout.cell_for(rank) {
            Some(position) => position,
            None => continue,
        };
        let cell = Cell {
            rank,
            position,
            width: layout.cell_width(),
            height: layout.cell_height(),
            message: board.message(rank).unwrap_or_default(),
            progress: board.progress(rank).unwrap_or_default(),
        };
        renderer.draw_cell(&cell)?;
        drawn += 1;
    }
    if drawn > 0 {
        renderer.finish()?;
    }
    Ok(drawn)
}
