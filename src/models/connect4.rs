use crate::models::board::{BoardError, Grid};
use crate::models::game::Slot;

pub const ROWS: usize = 6;
pub const COLUMNS: usize = 7;

// Length of a winning line
const LINE: usize = 4;

/// A Connect-4 cell holds the disc of whoever dropped into it, or nothing.
pub type Disc = Option<Slot>;
pub type DiscBoard = Grid<Disc>;

pub fn empty_board() -> DiscBoard {
    Grid::new(COLUMNS, ROWS, None)
}

/// Row a disc dropped into `column` would land in. Row 0 is the top.
pub fn lowest_empty_row(board: &DiscBoard, column: usize) -> Result<usize, BoardError> {
    if column >= board.width() {
        return Err(BoardError::OutOfBounds { x: column, y: 0 });
    }
    (0..board.height())
        .rev()
        .find(|&row| board.get(column, row) == Some(&None))
        .ok_or(BoardError::ColumnFull(column))
}

/// Drops a disc for `slot`, returning the new board and the landing row.
pub fn drop_disc(board: &DiscBoard, column: usize, slot: Slot) -> Result<(DiscBoard, usize), BoardError> {
    let row = lowest_empty_row(board, column)?;
    let next = board.with_cell(column, row, Some(slot))?;
    Ok((next, row))
}

// Scan order: horizontal, vertical, down-right, down-left
const DIRECTIONS: [(isize, isize); 4] = [(1, 0), (0, 1), (1, 1), (-1, 1)];

fn line_from(board: &DiscBoard, x: usize, y: usize, (dx, dy): (isize, isize), slot: Slot) -> bool {
    (0..LINE as isize).all(|step| {
        let cx = x as isize + dx * step;
        let cy = y as isize + dy * step;
        cx >= 0 && cy >= 0 && board.get(cx as usize, cy as usize) == Some(&Some(slot))
    })
}

/// True if `slot` has four in a row anywhere on the board.
pub fn check_line(board: &DiscBoard, slot: Slot) -> bool {
    DIRECTIONS.iter().any(|&direction| {
        (0..board.height()).any(|y| {
            (0..board.width()).any(|x| line_from(board, x, y, direction, slot))
        })
    })
}

/// The board is full when its top row has no empty cell.
pub fn is_full(board: &DiscBoard) -> bool {
    match board.rows().first() {
        Some(top) => !top.is_empty() && top.iter().all(Option::is_some),
        None => false,
    }
}

pub fn disc_count(board: &DiscBoard) -> usize {
    board.cells().filter(|cell| cell.is_some()).count()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn play(board: &DiscBoard, moves: &[(usize, Slot)]) -> DiscBoard {
        moves
            .iter()
            .fold(board.clone(), |b, &(column, slot)| drop_disc(&b, column, slot).unwrap().0)
    }

    #[test]
    fn discs_stack_from_the_bottom() {
        let board = empty_board();
        let (board, row) = drop_disc(&board, 3, Slot::Player1).unwrap();
        assert_eq!(row, ROWS - 1);
        let (board, row) = drop_disc(&board, 3, Slot::Player2).unwrap();
        assert_eq!(row, ROWS - 2);
        assert_eq!(board.get(3, ROWS - 1), Some(&Some(Slot::Player1)));
        assert_eq!(board.get(3, ROWS - 2), Some(&Some(Slot::Player2)));
        assert_eq!(disc_count(&board), 2);
    }

    #[test]
    fn full_column_rejects_drop() {
        let moves: Vec<_> = (0..ROWS)
            .map(|i| (0, if i % 2 == 0 { Slot::Player1 } else { Slot::Player2 }))
            .collect();
        let board = play(&empty_board(), &moves);
        assert_eq!(lowest_empty_row(&board, 0), Err(BoardError::ColumnFull(0)));
        assert_eq!(drop_disc(&board, 0, Slot::Player1), Err(BoardError::ColumnFull(0)));
    }

    #[test]
    fn out_of_range_column_is_rejected() {
        assert_eq!(
            drop_disc(&empty_board(), COLUMNS, Slot::Player1),
            Err(BoardError::OutOfBounds { x: COLUMNS, y: 0 })
        );
    }

    #[test]
    fn detects_lines_in_every_direction() {
        let p1 = Slot::Player1;
        let p2 = Slot::Player2;

        let horizontal = play(&empty_board(), &[(0, p1), (1, p1), (2, p1), (3, p1)]);
        assert!(check_line(&horizontal, p1));
        assert!(!check_line(&horizontal, p2));

        let vertical = play(&empty_board(), &[(6, p2), (6, p2), (6, p2), (6, p2)]);
        assert!(check_line(&vertical, p2));

        let rising = play(
            &empty_board(),
            &[
                (0, p1),
                (1, p2), (1, p1),
                (2, p2), (2, p2), (2, p1),
                (3, p2), (3, p2), (3, p2), (3, p1),
            ],
        );
        assert!(check_line(&rising, p1));

        let falling = play(
            &empty_board(),
            &[
                (6, p1),
                (5, p2), (5, p1),
                (4, p2), (4, p2), (4, p1),
                (3, p2), (3, p2), (3, p2), (3, p1),
            ],
        );
        assert!(check_line(&falling, p1));
    }

    #[test]
    fn three_in_a_row_is_not_a_line() {
        let board = play(&empty_board(), &[(0, Slot::Player1), (1, Slot::Player1), (2, Slot::Player1)]);
        assert!(!check_line(&board, Slot::Player1));
    }

    #[test]
    fn filled_board_without_line_is_a_draw() {
        // Colours alternate by column and flip every second row, so no four
        // line up in any direction.
        let rows: Vec<Vec<Disc>> = (0..ROWS)
            .map(|y| {
                (0..COLUMNS)
                    .map(|x| {
                        if (x + y / 2) % 2 == 0 {
                            Some(Slot::Player1)
                        } else {
                            Some(Slot::Player2)
                        }
                    })
                    .collect()
            })
            .collect();
        let board = Grid::from_rows(rows);
        assert!(is_full(&board));
        assert!(!check_line(&board, Slot::Player1));
        assert!(!check_line(&board, Slot::Player2));
    }

    #[test]
    fn empty_or_malformed_board_is_not_full() {
        assert!(!is_full(&empty_board()));
        assert!(!is_full(&Grid::from_rows(vec![])));
    }
}
