//! A closed set of grid flavours behind one capability trait.
//!
//! Editing tools that work on "whatever grid is loaded" hold a [`GridKind`]
//! and talk to it through [`GridAccess`]; they never need to know which
//! concrete grid they got.

use glam::{IVec3, Vec3};

use crate::chunk::GridCell;
use crate::cube::{Cube, CubeGrid};
use crate::grid::Grid;

/// Operations every grid flavour supports, independent of its cell type.
pub trait GridAccess {
    /// Activate or clear a cell. Cube grids place a default-coloured cube at
    /// the cell's world position.
    fn set_cell_generic(&mut self, cell: IVec3, active: bool);

    fn is_active_generic(&self, cell: IVec3) -> bool;

    fn active_cell_count(&self) -> usize;

    fn bounds(&self) -> (IVec3, IVec3);
}

impl GridAccess for CubeGrid {
    fn set_cell_generic(&mut self, cell: IVec3, active: bool) {
        if active {
            self.place_cube(cell.x, cell.y, cell.z, Vec3::ONE);
        } else {
            self.remove_cube(cell.x, cell.y, cell.z);
        }
    }

    fn is_active_generic(&self, cell: IVec3) -> bool {
        self.is_cube_active(cell.x, cell.y, cell.z)
    }

    fn active_cell_count(&self) -> usize {
        self.total_active_cube_count()
    }

    fn bounds(&self) -> (IVec3, IVec3) {
        (self.min_bounds(), self.max_bounds())
    }
}

/// Cell types that can be produced from a plain on/off flag.
pub trait FromActive: GridCell {
    fn from_active(active: bool) -> Self;
}

impl FromActive for bool {
    fn from_active(active: bool) -> Self {
        active
    }
}

impl FromActive for u8 {
    fn from_active(active: bool) -> Self {
        u8::from(active)
    }
}

impl FromActive for Cube {
    fn from_active(active: bool) -> Self {
        Cube {
            active,
            ..Cube::default()
        }
    }
}

impl<T: FromActive> GridAccess for Grid<T> {
    fn set_cell_generic(&mut self, cell: IVec3, active: bool) {
        self.set_cell(cell.x, cell.y, cell.z, T::from_active(active));
    }

    fn is_active_generic(&self, cell: IVec3) -> bool {
        self.is_cell_active(cell.x, cell.y, cell.z)
    }

    fn active_cell_count(&self) -> usize {
        self.total_active_cell_count()
    }

    fn bounds(&self) -> (IVec3, IVec3) {
        (self.min_bounds(), self.max_bounds())
    }
}

/// The grid an editor session works on.
#[derive(Debug)]
pub enum GridKind<T> {
    Cube(CubeGrid),
    Generic(Grid<T>),
}

impl<T: FromActive> GridKind<T> {
    pub fn is_cube_grid(&self) -> bool {
        matches!(self, GridKind::Cube(_))
    }

    pub fn as_cube_grid(&self) -> Option<&CubeGrid> {
        match self {
            GridKind::Cube(grid) => Some(grid),
            GridKind::Generic(_) => None,
        }
    }

    pub fn as_cube_grid_mut(&mut self) -> Option<&mut CubeGrid> {
        match self {
            GridKind::Cube(grid) => Some(grid),
            GridKind::Generic(_) => None,
        }
    }

    fn access(&self) -> &dyn GridAccess {
        match self {
            GridKind::Cube(grid) => grid,
            GridKind::Generic(grid) => grid,
        }
    }

    fn access_mut(&mut self) -> &mut dyn GridAccess {
        match self {
            GridKind::Cube(grid) => grid,
            GridKind::Generic(grid) => grid,
        }
    }
}

impl<T: FromActive> GridAccess for GridKind<T> {
    fn set_cell_generic(&mut self, cell: IVec3, active: bool) {
        self.access_mut().set_cell_generic(cell, active);
    }

    fn is_active_generic(&self, cell: IVec3) -> bool {
        self.access().is_active_generic(cell)
    }

    fn active_cell_count(&self) -> usize {
        self.access().active_cell_count()
    }

    fn bounds(&self) -> (IVec3, IVec3) {
        self.access().bounds()
    }
}
