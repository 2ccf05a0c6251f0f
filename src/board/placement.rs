//! Placement engine - footprints, manual drops, random fill and rotation
//!
//! Every placement path funnels through [`BoardState::footprint_at`], which
//! rejects runs that leave the grid, wrap across a row or column, or overlap a
//! cell owned by another ship. Manual drops clamp their anchor inward before
//! that check; random attempts and rotations do not.

use rand::Rng;
use tracing::debug;

use super::{BoardState, Cell, ShipId};

/// Attempts made by the random search before giving up on a ship
pub const MAX_RANDOM_ATTEMPTS: usize = 100;

/// Outcome of a bounded random search
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RandomPlacement {
    Placed(Vec<usize>),
    Unplaced,
}

/// Reasons a placement request is refused
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PlacementError {
    #[error("No such ship")]
    UnknownShip,

    #[error("Drop point is outside the grid")]
    OutsideGrid,

    #[error("Cell size must be positive")]
    InvalidCellSize,

    #[error("{0} does not fit there")]
    Blocked(&'static str),

    #[error("{0} cannot rotate in place")]
    RotationBlocked(&'static str),
}

impl BoardState {
    /// Footprint for `ship` dropped at `anchor`, clamping the anchor inward so the
    /// whole run stays on the grid. `None` when the anchor is off the grid or the
    /// clamped run overlaps another ship.
    pub fn compute_footprint(&self, id: ShipId, anchor: usize) -> Option<Vec<usize>> {
        let ship = self.ship(id)?;
        if anchor >= self.grid.len() {
            return None;
        }

        let (mut row, mut col) = self.grid.coords(anchor);
        if ship.horizontal {
            if col + ship.size > self.grid.cols() {
                col = self.grid.cols().checked_sub(ship.size)?;
            }
        } else if row + ship.size > self.grid.rows() {
            row = self.grid.rows().checked_sub(ship.size)?;
        }

        self.footprint_at(ship.size, &ship.positions, row, col, ship.horizontal)
    }

    /// Run of `size` cells starting exactly at `(row, col)`. Cells listed in
    /// `owned` may already hold a ship.
    fn footprint_at(
        &self,
        size: usize,
        owned: &[usize],
        row: usize,
        col: usize,
        horizontal: bool,
    ) -> Option<Vec<usize>> {
        let (rows, cols) = (self.grid.rows(), self.grid.cols());

        (0..size)
            .map(|offset| {
                let (r, c) = if horizontal {
                    (row, col + offset)
                } else {
                    (row + offset, col)
                };
                if r >= rows || c >= cols {
                    return None;
                }
                let index = self.grid.index(r, c);
                match self.grid.get(index)? {
                    Cell::Ship if !owned.contains(&index) => None,
                    _ => Some(index),
                }
            })
            .collect()
    }

    /// Place a ship from a pixel drop point on a grid drawn with square cells
    /// of `cell_px` pixels.
    pub fn place_manually(
        &mut self,
        id: ShipId,
        x: f64,
        y: f64,
        cell_px: f64,
    ) -> Result<Vec<usize>, PlacementError> {
        if !(cell_px.is_finite() && cell_px > 0.0) {
            return Err(PlacementError::InvalidCellSize);
        }
        if !(x.is_finite() && y.is_finite()) || x < 0.0 || y < 0.0 {
            return Err(PlacementError::OutsideGrid);
        }

        let col = (x / cell_px).floor() as usize;
        let row = (y / cell_px).floor() as usize;
        if col >= self.grid.cols() || row >= self.grid.rows() {
            return Err(PlacementError::OutsideGrid);
        }

        let name = self.ship(id).ok_or(PlacementError::UnknownShip)?.name;
        let anchor = self.grid.index(row, col);
        let positions = self
            .compute_footprint(id, anchor)
            .ok_or(PlacementError::Blocked(name))?;

        self.occupy(id, positions.clone());
        Ok(positions)
    }

    /// Bounded random search for a spot for one ship. The ship is lifted off the
    /// board first, so an exhausted search leaves it unplaced.
    pub fn place_randomly<R: Rng>(
        &mut self,
        id: ShipId,
        rng: &mut R,
    ) -> Result<RandomPlacement, PlacementError> {
        self.lift(id)?;
        let size = self.ship(id).ok_or(PlacementError::UnknownShip)?.size;
        let (rows, cols) = (self.grid.rows(), self.grid.cols());

        for _ in 0..MAX_RANDOM_ATTEMPTS {
            let horizontal = rng.gen_bool(0.5);
            let row = rng.gen_range(0..rows);
            let col = rng.gen_range(0..cols);

            if let Some(positions) = self.footprint_at(size, &[], row, col, horizontal) {
                if let Some(ship) = self.ship_mut(id) {
                    ship.horizontal = horizontal;
                }
                self.occupy(id, positions.clone());
                return Ok(RandomPlacement::Placed(positions));
            }
        }

        debug!(ship = id.0, "Random placement exhausted its attempts");
        Ok(RandomPlacement::Unplaced)
    }

    /// Wipe the board and place every ship at random. Returns the ships that
    /// could not be placed.
    pub fn randomize_all<R: Rng>(&mut self, rng: &mut R) -> Vec<ShipId> {
        self.clear();
        let ids: Vec<ShipId> = self.ships.iter().map(|s| s.id).collect();
        self.place_each(ids, rng)
    }

    /// Place only the ships that have no position yet. Returns those still unplaced.
    pub fn randomize_unplaced<R: Rng>(&mut self, rng: &mut R) -> Vec<ShipId> {
        let ids: Vec<ShipId> = self.unplaced().map(|s| s.id).collect();
        self.place_each(ids, rng)
    }

    fn place_each<R: Rng>(&mut self, ids: Vec<ShipId>, rng: &mut R) -> Vec<ShipId> {
        ids.into_iter()
            .filter(|id| !matches!(self.place_randomly(*id, rng), Ok(RandomPlacement::Placed(_))))
            .collect()
    }

    /// Flip a ship's orientation, pivoting on its first cell. A placed ship whose
    /// rotated run would leave the grid or hit another ship stays as it was.
    pub fn toggle_orientation(&mut self, id: ShipId) -> Result<(), PlacementError> {
        let ship = self.ship(id).ok_or(PlacementError::UnknownShip)?;

        let Some(&anchor) = ship.positions.first() else {
            if let Some(ship) = self.ship_mut(id) {
                ship.horizontal = !ship.horizontal;
            }
            return Ok(());
        };

        let (row, col) = self.grid.coords(anchor);
        let horizontal = !ship.horizontal;
        let positions = self
            .footprint_at(ship.size, &ship.positions, row, col, horizontal)
            .ok_or(PlacementError::RotationBlocked(ship.name))?;

        if let Some(ship) = self.ship_mut(id) {
            ship.horizontal = horizontal;
        }
        self.occupy(id, positions);
        Ok(())
    }

    /// Reset to open water with every ship unplaced
    pub fn clear(&mut self) {
        self.grid.fill_water();
        for ship in &mut self.ships {
            ship.positions.clear();
        }
    }

    /// Put a ship at positions supplied by the server, bypassing validation.
    pub fn restore(&mut self, id: ShipId, positions: Vec<usize>, horizontal: bool) {
        if let Some(ship) = self.ship_mut(id) {
            ship.positions = positions;
            ship.horizontal = horizontal;
        }
    }

    /// Remove a ship from the grid, leaving its orientation intact
    fn lift(&mut self, id: ShipId) -> Result<(), PlacementError> {
        let ship = self.ship_mut(id).ok_or(PlacementError::UnknownShip)?;
        let old = std::mem::take(&mut ship.positions);
        for index in old {
            self.grid.set(index, Cell::Water);
        }
        Ok(())
    }

    /// Move a ship onto already-validated positions
    fn occupy(&mut self, id: ShipId, positions: Vec<usize>) {
        if self.lift(id).is_err() {
            return;
        }
        for &index in &positions {
            self.grid.set(index, Cell::Ship);
        }
        if let Some(ship) = self.ship_mut(id) {
            ship.positions = positions;
        }
    }
}
