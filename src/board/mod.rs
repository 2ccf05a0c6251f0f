//! Board model - grid cells, ships and the local fleet

pub mod placement;

use serde::{Deserialize, Serialize};

pub use placement::PlacementError;

/// Default grid width
pub const GRID_COLS: usize = 9;
/// Default grid height
pub const GRID_ROWS: usize = 7;

/// State of a single grid cell
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Cell {
    #[default]
    Water,
    Ship,
    Hit,
    Miss,
}

impl Cell {
    /// Outcome tag for a resolved shot
    pub fn from_shot(hit: bool) -> Self {
        if hit {
            Cell::Hit
        } else {
            Cell::Miss
        }
    }
}

/// Flat `cols * rows` grid, indexed `row * cols + col`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Grid {
    cols: usize,
    rows: usize,
    cells: Vec<Cell>,
}

impl Grid {
    pub fn new(cols: usize, rows: usize) -> Self {
        Self {
            cols,
            rows,
            cells: vec![Cell::Water; cols * rows],
        }
    }

    /// Rebuild a grid from its wire form. Returns `None` if the length does not match.
    pub fn from_cells(cols: usize, rows: usize, cells: Vec<Cell>) -> Option<Self> {
        (cells.len() == cols * rows).then_some(Self { cols, rows, cells })
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    /// Total cell count
    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn get(&self, index: usize) -> Option<Cell> {
        self.cells.get(index).copied()
    }

    /// Set a cell. Out-of-range indices are ignored and reported as `false`.
    pub fn set(&mut self, index: usize, cell: Cell) -> bool {
        match self.cells.get_mut(index) {
            Some(slot) => {
                *slot = cell;
                true
            }
            None => false,
        }
    }

    /// Split an index into `(row, col)`
    pub fn coords(&self, index: usize) -> (usize, usize) {
        (index / self.cols, index % self.cols)
    }

    pub fn index(&self, row: usize, col: usize) -> usize {
        row * self.cols + col
    }

    pub fn count(&self, cell: Cell) -> usize {
        self.cells.iter().filter(|c| **c == cell).count()
    }

    /// Reset every cell to water
    pub fn fill_water(&mut self) {
        self.cells.iter_mut().for_each(|c| *c = Cell::Water);
    }
}

/// Stable identifier of a ship within a session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ShipId(pub u8);

/// Static ship class definition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShipClass {
    pub name: &'static str,
    pub size: usize,
}

/// The fleet every player places
pub const FLEET: [ShipClass; 5] = [
    ShipClass { name: "Carrier", size: 5 },
    ShipClass { name: "Battleship", size: 4 },
    ShipClass { name: "Cruiser", size: 3 },
    ShipClass { name: "Submarine", size: 3 },
    ShipClass { name: "Destroyer", size: 2 },
];

/// A ship on the local board
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ship {
    pub id: ShipId,
    pub name: &'static str,
    pub size: usize,
    /// Occupied cell indices, empty while unplaced
    pub positions: Vec<usize>,
    pub horizontal: bool,
}

impl Ship {
    pub fn new(id: ShipId, class: ShipClass) -> Self {
        Self {
            id,
            name: class.name,
            size: class.size,
            positions: Vec::new(),
            horizontal: true,
        }
    }

    pub fn placed(&self) -> bool {
        !self.positions.is_empty()
    }
}

/// The local player's grid and fleet
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BoardState {
    pub grid: Grid,
    pub ships: Vec<Ship>,
}

impl BoardState {
    pub fn new(cols: usize, rows: usize, fleet: &[ShipClass]) -> Self {
        let ships = fleet
            .iter()
            .enumerate()
            .map(|(i, class)| Ship::new(ShipId(i as u8), *class))
            .collect();

        Self {
            grid: Grid::new(cols, rows),
            ships,
        }
    }

    /// Standard 9x7 board with the default fleet
    pub fn standard() -> Self {
        Self::new(GRID_COLS, GRID_ROWS, &FLEET)
    }

    pub fn ship(&self, id: ShipId) -> Option<&Ship> {
        self.ships.iter().find(|s| s.id == id)
    }

    pub fn ship_mut(&mut self, id: ShipId) -> Option<&mut Ship> {
        self.ships.iter_mut().find(|s| s.id == id)
    }

    /// Case-insensitive lookup by ship name
    pub fn ship_by_name(&self, name: &str) -> Option<&Ship> {
        self.ships.iter().find(|s| s.name.eq_ignore_ascii_case(name))
    }

    pub fn all_placed(&self) -> bool {
        self.ships.iter().all(Ship::placed)
    }

    pub fn unplaced(&self) -> impl Iterator<Item = &Ship> {
        self.ships.iter().filter(|s| !s.placed())
    }
}
