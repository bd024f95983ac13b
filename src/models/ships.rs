use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::models::board::{create_empty_board, BoardError, Grid};

pub const BOARD_SIZE: usize = 10;
pub const FLEET: [usize; 5] = [5, 4, 3, 3, 2];

// Attempts per ship before random placement gives up on it
const PLACEMENT_ATTEMPTS: usize = 100;

#[derive(Deserialize, Serialize, Clone, Copy, Debug, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum Cell {
    #[default]
    Empty,
    Ship,
    Hit,
    Miss,
}

/// What the opponent is allowed to see of a board.
#[derive(Deserialize, Serialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum FogCell {
    Unknown,
    Hit,
    Miss,
}

#[derive(Deserialize, Serialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Orientation {
    Horizontal,
    Vertical,
}

#[derive(Deserialize, Serialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ShotOutcome {
    Miss,
    Hit,
    Invalid,
}

pub type ShipBoard = Grid<Cell>;

/// Result of firing at a board. On `Invalid` the board is the input, unchanged.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Shot {
    pub board: ShipBoard,
    pub outcome: ShotOutcome,
}

pub fn empty_board() -> ShipBoard {
    create_empty_board(BOARD_SIZE, Cell::Empty)
}

// Cells covered by a ship; `None` where the coordinate would overflow.
fn span(
    x: usize,
    y: usize,
    length: usize,
    orientation: Orientation,
) -> impl Iterator<Item = Option<(usize, usize)>> {
    (0..length).map(move |i| match orientation {
        Orientation::Horizontal => x.checked_add(i).map(|cx| (cx, y)),
        Orientation::Vertical => y.checked_add(i).map(|cy| (x, cy)),
    })
}

pub fn can_place(board: &ShipBoard, x: usize, y: usize, length: usize, orientation: Orientation) -> bool {
    if length == 0 {
        return false;
    }
    span(x, y, length, orientation)
        .all(|cell| matches!(cell.and_then(|(cx, cy)| board.get(cx, cy)), Some(Cell::Empty)))
}

pub fn place_ship(
    board: &ShipBoard,
    x: usize,
    y: usize,
    length: usize,
    orientation: Orientation,
) -> Result<ShipBoard, BoardError> {
    if !can_place(board, x, y, length, orientation) {
        return Err(BoardError::CannotPlace { x, y, length });
    }
    board.with_cells(span(x, y, length, orientation).flatten(), Cell::Ship)
}

pub fn resolve_shot(board: &ShipBoard, x: usize, y: usize) -> Shot {
    let (next, outcome) = match board.get(x, y) {
        Some(Cell::Empty) => (Cell::Miss, ShotOutcome::Miss),
        Some(Cell::Ship) => (Cell::Hit, ShotOutcome::Hit),
        _ => {
            return Shot {
                board: board.clone(),
                outcome: ShotOutcome::Invalid,
            }
        }
    };
    match board.with_cell(x, y, next) {
        Ok(board) => Shot { board, outcome },
        Err(_) => Shot {
            board: board.clone(),
            outcome: ShotOutcome::Invalid,
        },
    }
}

pub fn all_sunk(board: &ShipBoard) -> bool {
    !board.cells().any(|cell| *cell == Cell::Ship)
}

/// A board has lost once it held a fleet and none of it is left afloat.
/// An untouched empty board is not a loss.
pub fn defeated(board: &ShipBoard) -> bool {
    all_sunk(board) && board.cells().any(|cell| *cell == Cell::Hit)
}

pub fn fleet_complete(board: &ShipBoard) -> bool {
    let expected: usize = FLEET.iter().sum();
    board.width() == BOARD_SIZE
        && board.height() == BOARD_SIZE
        && board.cells().filter(|cell| **cell == Cell::Ship).count() == expected
}

pub fn masked(board: &ShipBoard) -> Grid<FogCell> {
    board.map(|cell| match cell {
        Cell::Hit => FogCell::Hit,
        Cell::Miss => FogCell::Miss,
        _ => FogCell::Unknown,
    })
}

/// Places the standard fleet at random. A ship that finds no free spot within
/// the attempt budget is skipped, so the result may be short on very crowded
/// boards; on an empty 10x10 board this does not happen in practice.
pub fn random_fleet<R: Rng + ?Sized>(rng: &mut R) -> ShipBoard {
    let mut board = empty_board();
    for &length in FLEET.iter() {
        for _ in 0..PLACEMENT_ATTEMPTS {
            let orientation = if rng.gen_bool(0.5) {
                Orientation::Horizontal
            } else {
                Orientation::Vertical
            };
            let x = rng.gen_range(0..BOARD_SIZE);
            let y = rng.gen_range(0..BOARD_SIZE);
            if let Ok(next) = place_ship(&board, x, y, length, orientation) {
                board = next;
                break;
            }
        }
    }
    board
}
