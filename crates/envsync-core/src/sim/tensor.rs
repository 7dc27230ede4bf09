//! Per-environment state tensors
//!
//! A [`StateTensor`] is a `num_envs × items × width` buffer stored as an
//! `nalgebra::DMatrix` with one row per environment. Column block `i` holds
//! item `i` (an actor, DOF or rigid body), so the slice of one item across
//! every environment is a strided view with no copying.

use std::ops::Range;

use nalgebra::{DMatrix, DMatrixView, DMatrixViewMut};

use crate::{Error, Result};

/// Width of a root-state or rigid-body-state item
pub const ROOT_STATE_WIDTH: usize = 13;
/// Width of a DOF-state item: (position, velocity)
pub const DOF_STATE_WIDTH: usize = 2;
/// Width of a contact-force item
pub const CONTACT_FORCE_WIDTH: usize = 3;

/// Root-state column ranges
pub mod cols {
    use std::ops::Range;

    pub const POSITION: Range<usize> = 0..3;
    pub const ORIENTATION: Range<usize> = 3..7;
    pub const LINEAR_VELOCITY: Range<usize> = 7..10;
    pub const ANGULAR_VELOCITY: Range<usize> = 10..13;
    pub const ALL: Range<usize> = 0..13;
}

/// Dense `num_envs × items × width` tensor
#[derive(Debug, Clone, PartialEq)]
pub struct StateTensor {
    data: DMatrix<f32>,
    width: usize,
}

impl StateTensor {
    /// Zero-filled tensor
    pub fn zeros(num_envs: usize, items: usize, width: usize) -> Self {
        Self {
            data: DMatrix::zeros(num_envs, items * width),
            width,
        }
    }

    pub fn num_envs(&self) -> usize {
        self.data.nrows()
    }

    /// Number of items per environment
    pub fn items(&self) -> usize {
        if self.width == 0 {
            0
        } else {
            self.data.ncols() / self.width
        }
    }

    pub fn width(&self) -> usize {
        self.width
    }

    /// Whole tensor, one row per environment
    pub fn as_matrix(&self) -> &DMatrix<f32> {
        &self.data
    }

    pub fn as_matrix_mut(&mut self) -> &mut DMatrix<f32> {
        &mut self.data
    }

    fn column_start(&self, item: usize, range: &Range<usize>) -> Result<usize> {
        if item >= self.items() {
            return Err(Error::NotFound(format!(
                "item {item} out of range (tensor holds {})",
                self.items()
            )));
        }
        if range.start > range.end || range.end > self.width {
            return Err(Error::DimensionMismatch {
                what: "tensor column range",
                expected: self.width,
                actual: range.end,
            });
        }
        Ok(item * self.width + range.start)
    }

    /// `num_envs × range.len()` view of one item
    pub fn columns(&self, item: usize, range: Range<usize>) -> Result<DMatrixView<'_, f32>> {
        let start = self.column_start(item, &range)?;
        Ok(self.data.view((0, start), (self.num_envs(), range.len())))
    }

    /// Mutable `num_envs × range.len()` view of one item
    pub fn columns_mut(
        &mut self,
        item: usize,
        range: Range<usize>,
    ) -> Result<DMatrixViewMut<'_, f32>> {
        let start = self.column_start(item, &range)?;
        let num_envs = self.num_envs();
        Ok(self.data.view_mut((0, start), (num_envs, range.len())))
    }

    /// Write the same values into `range` of one item for every environment
    pub fn fill_columns(&mut self, item: usize, range: Range<usize>, values: &[f32]) -> Result<()> {
        if values.len() != range.len() {
            return Err(Error::DimensionMismatch {
                what: "tensor row values",
                expected: range.len(),
                actual: values.len(),
            });
        }
        let mut view = self.columns_mut(item, range)?;
        for mut row in view.row_iter_mut() {
            row.iter_mut().zip(values).for_each(|(dst, &src)| *dst = src);
        }
        Ok(())
    }

    /// Copy all columns of `item` from `other`, leaving every other item untouched
    pub fn copy_item_from(&mut self, other: &StateTensor, item: usize) -> Result<()> {
        if other.num_envs() != self.num_envs() || other.width != self.width {
            return Err(Error::DimensionMismatch {
                what: "tensor shape",
                expected: self.data.ncols(),
                actual: other.data.ncols(),
            });
        }
        let width = self.width;
        let src = other.columns(item, 0..width)?;
        self.columns_mut(item, 0..width)?.copy_from(&src);
        Ok(())
    }

    /// Values of one item in one environment, `None` when either index is out of range
    pub fn item(&self, env: usize, item: usize) -> Option<Vec<f32>> {
        if env >= self.num_envs() || item >= self.items() {
            return None;
        }
        let start = item * self.width;
        Some(
            self.data
                .row(env)
                .columns(start, self.width)
                .iter()
                .copied()
                .collect(),
        )
    }
}

/// Item counts per environment, fixed when a session is prepared
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TensorLayout {
    pub actors: usize,
    pub dofs: usize,
    pub rigid_bodies: usize,
}

/// The four state tensors of one session
#[derive(Debug, Clone, PartialEq)]
pub struct SimTensors {
    pub root_state: StateTensor,
    pub dof_state: StateTensor,
    pub rigid_body_state: StateTensor,
    pub contact_force: StateTensor,
}

impl SimTensors {
    /// Zero-filled tensors for `num_envs` replicas of `layout`
    pub fn zeros(num_envs: usize, layout: TensorLayout) -> Self {
        Self {
            root_state: StateTensor::zeros(num_envs, layout.actors, ROOT_STATE_WIDTH),
            dof_state: StateTensor::zeros(num_envs, layout.dofs, DOF_STATE_WIDTH),
            rigid_body_state: StateTensor::zeros(num_envs, layout.rigid_bodies, ROOT_STATE_WIDTH),
            contact_force: StateTensor::zeros(num_envs, layout.rigid_bodies, CONTACT_FORCE_WIDTH),
        }
    }

    pub fn num_envs(&self) -> usize {
        self.root_state.num_envs()
    }

    pub fn layout(&self) -> TensorLayout {
        TensorLayout {
            actors: self.root_state.items(),
            dofs: self.dof_state.items(),
            rigid_bodies: self.rigid_body_state.items(),
        }
    }
}
