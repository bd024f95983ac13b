use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Reasons a board operation could not be carried out.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum BoardError {
    #[error("cell ({x}, {y}) is outside the board")]
    OutOfBounds { x: usize, y: usize },
    #[error("column {0} is full")]
    ColumnFull(usize),
    #[error("a ship of length {length} does not fit at ({x}, {y})")]
    CannotPlace { x: usize, y: usize, length: usize },
}

/// A rectangular grid addressed as `(x, y)` and stored row-major, so the JSON
/// form is a plain array of rows (`rows[y][x]`).
///
/// Every mutating operation returns a fresh grid and leaves the input alone.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Grid<T> {
    rows: Vec<Vec<T>>,
}

impl<T: Clone> Grid<T> {
    pub fn new(width: usize, height: usize, fill: T) -> Self {
        Grid {
            rows: vec![vec![fill; width]; height],
        }
    }

    pub fn from_rows(rows: Vec<Vec<T>>) -> Self {
        Grid { rows }
    }

    pub fn width(&self) -> usize {
        self.rows.first().map(Vec::len).unwrap_or(0)
    }

    pub fn height(&self) -> usize {
        self.rows.len()
    }

    pub fn rows(&self) -> &[Vec<T>] {
        &self.rows
    }

    /// Reads a cell; anything outside the grid (including the tail of a
    /// short row in a malformed grid) is `None`.
    pub fn get(&self, x: usize, y: usize) -> Option<&T> {
        self.rows.get(y).and_then(|row| row.get(x))
    }

    pub fn contains(&self, x: usize, y: usize) -> bool {
        self.get(x, y).is_some()
    }

    /// Copy-on-write single cell update.
    pub fn with_cell(&self, x: usize, y: usize, value: T) -> Result<Self, BoardError> {
        let mut next = self.clone();
        match next.rows.get_mut(y).and_then(|row| row.get_mut(x)) {
            Some(cell) => {
                *cell = value;
                Ok(next)
            }
            None => Err(BoardError::OutOfBounds { x, y }),
        }
    }

    /// Copy-on-write update of several cells; fails without side effects if
    /// any coordinate is outside the grid.
    pub fn with_cells<I>(&self, cells: I, value: T) -> Result<Self, BoardError>
    where
        I: IntoIterator<Item = (usize, usize)>,
    {
        let mut next = self.clone();
        for (x, y) in cells {
            match next.rows.get_mut(y).and_then(|row| row.get_mut(x)) {
                Some(cell) => *cell = value.clone(),
                None => return Err(BoardError::OutOfBounds { x, y }),
            }
        }
        Ok(next)
    }

    pub fn cells(&self) -> impl Iterator<Item = &T> {
        self.rows.iter().flatten()
    }

    pub fn map<U, F>(&self, f: F) -> Grid<U>
    where
        F: Fn(&T) -> U,
    {
        Grid {
            rows: self
                .rows
                .iter()
                .map(|row| row.iter().map(&f).collect())
                .collect(),
        }
    }
}

/// Builds a `size` x `size` grid filled with `fill`.
pub fn create_empty_board<T: Clone>(size: usize, fill: T) -> Grid<T> {
    Grid::new(size, size, fill)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_board_has_requested_dimensions() {
        let grid = create_empty_board(4, 0u8);
        assert_eq!(grid.width(), 4);
        assert_eq!(grid.height(), 4);
        assert!(grid.cells().all(|c| *c == 0));
    }

    #[test]
    fn with_cell_leaves_input_untouched() {
        let grid = Grid::new(3, 2, 'a');
        let next = grid.with_cell(2, 1, 'b').unwrap();
        assert_eq!(grid.get(2, 1), Some(&'a'));
        assert_eq!(next.get(2, 1), Some(&'b'));
    }

    #[test]
    fn out_of_range_access_is_rejected() {
        let grid = Grid::new(3, 2, 0u8);
        assert_eq!(grid.get(3, 0), None);
        assert_eq!(grid.get(0, 2), None);
        assert_eq!(
            grid.with_cell(5, 0, 1),
            Err(BoardError::OutOfBounds { x: 5, y: 0 })
        );
        assert!(grid.with_cells(vec![(0, 0), (0, 9)], 1).is_err());
    }

    #[test]
    fn ragged_rows_do_not_panic() {
        let grid = Grid::from_rows(vec![vec![1, 2, 3], vec![4]]);
        assert_eq!(grid.get(2, 1), None);
        assert!(grid.with_cell(2, 1, 9).is_err());
    }

    #[test]
    fn serializes_as_plain_rows() {
        let grid = Grid::from_rows(vec![vec![1, 2], vec![3, 4]]);
        assert_eq!(serde_json::to_string(&grid).unwrap(), "[[1,2],[3,4]]");
    }
}
