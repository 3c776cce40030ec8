//! Uniform-grid neighborhood graph over the source point cloud.
//!
//! The grid supports PROSAC-style spatially coherent sampling and local
//! scoring: each occupied cell stores both the source and the destination
//! indices falling into it. The graph borrows the source matrix for its
//! whole lifetime; it is built once and immutable afterwards.

use std::collections::HashMap;

use crate::errors::EstimationError;
use crate::types::DataMatrix;

/// Indices binned into one grid cell.
#[derive(Debug, Default, Clone)]
pub struct GridCell {
    pub source_indices: Vec<usize>,
    pub destination_indices: Vec<usize>,
}

/// Uniform grid over the bounding box of the source points.
///
/// Cell size per axis is `extent / division_count`; a point maps to
/// `floor((p - origin) / cell_size)` linearized row-major, with points on
/// the maximum extent clamped into the last cell. Empty cells are absent
/// from the map.
pub struct GridNeighborhoodGraph<'a> {
    source: &'a DataMatrix,
    cells: HashMap<usize, GridCell>,
    origin: [f64; 2],
    cell_sizes: [f64; 2],
    division_count: usize,
    empty: Vec<usize>,
}

impl<'a> GridNeighborhoodGraph<'a> {
    /// Build the grid from the source matrix, optionally binning a
    /// destination matrix into the same cells.
    pub fn build(
        source: &'a DataMatrix,
        destination: Option<&DataMatrix>,
        division_count: usize,
    ) -> Result<Self, EstimationError> {
        if division_count == 0 {
            return Err(EstimationError::InvalidInput(
                "neighborhood graph needs at least one division per axis".into(),
            ));
        }
        if source.nrows() == 0 || source.ncols() < 2 {
            return Err(EstimationError::InvalidInput(
                "neighborhood graph needs a non-empty Nx2+ source matrix".into(),
            ));
        }

        let mut min = [f64::INFINITY; 2];
        let mut max = [f64::NEG_INFINITY; 2];
        for row in 0..source.nrows() {
            for axis in 0..2 {
                let v = source[(row, axis)];
                if !v.is_finite() {
                    return Err(EstimationError::InvalidInput(
                        "non-finite coordinate in source matrix".into(),
                    ));
                }
                min[axis] = min[axis].min(v);
                max[axis] = max[axis].max(v);
            }
        }

        let cell_sizes = [
            grid_step(max[0] - min[0], division_count),
            grid_step(max[1] - min[1], division_count),
        ];

        let mut graph = Self {
            source,
            cells: HashMap::new(),
            origin: min,
            cell_sizes,
            division_count,
            empty: Vec::new(),
        };

        for row in 0..source.nrows() {
            let cell = graph.cell_id(source[(row, 0)], source[(row, 1)]);
            graph.cells.entry(cell).or_default().source_indices.push(row);
        }

        if let Some(destination) = destination {
            if destination.ncols() < 2 {
                return Err(EstimationError::InvalidInput(
                    "neighborhood graph needs an Mx2+ destination matrix".into(),
                ));
            }
            for row in 0..destination.nrows() {
                let (x, y) = (destination[(row, 0)], destination[(row, 1)]);
                if !x.is_finite() || !y.is_finite() {
                    return Err(EstimationError::InvalidInput(
                        "non-finite coordinate in destination matrix".into(),
                    ));
                }
                let cell = graph.cell_id(x, y);
                graph
                    .cells
                    .entry(cell)
                    .or_default()
                    .destination_indices
                    .push(row);
            }
        }

        Ok(graph)
    }

    fn axis_cell(&self, value: f64, axis: usize) -> usize {
        let offset = ((value - self.origin[axis]) / self.cell_sizes[axis]).floor();
        (offset.max(0.0) as usize).min(self.division_count - 1)
    }

    fn cell_id(&self, x: f64, y: f64) -> usize {
        self.axis_cell(y, 1) * self.division_count + self.axis_cell(x, 0)
    }

    /// Source indices sharing the cell of `point_idx`.
    pub fn neighbors(&self, point_idx: usize) -> &[usize] {
        if point_idx >= self.source.nrows() {
            return &self.empty;
        }
        let cell = self.cell_id(self.source[(point_idx, 0)], self.source[(point_idx, 1)]);
        self.cells
            .get(&cell)
            .map(|c| c.source_indices.as_slice())
            .unwrap_or(&self.empty)
    }

    /// Source indices of the point's cell and its 8-connected neighbors.
    pub fn neighbors_with_adjacent(&self, point_idx: usize) -> Vec<usize> {
        if point_idx >= self.source.nrows() {
            return Vec::new();
        }
        let cx = self.axis_cell(self.source[(point_idx, 0)], 0) as isize;
        let cy = self.axis_cell(self.source[(point_idx, 1)], 1) as isize;
        let divisions = self.division_count as isize;

        let mut neighbors = Vec::new();
        for dy in -1..=1 {
            for dx in -1..=1 {
                let (nx, ny) = (cx + dx, cy + dy);
                if nx < 0 || ny < 0 || nx >= divisions || ny >= divisions {
                    continue;
                }
                let cell = (ny * divisions + nx) as usize;
                if let Some(c) = self.cells.get(&cell) {
                    neighbors.extend_from_slice(&c.source_indices);
                }
            }
        }
        neighbors
    }

    /// All occupied cells, keyed by linearized cell id.
    pub fn cells(&self) -> &HashMap<usize, GridCell> {
        &self.cells
    }

    /// Cell extents along the two axes.
    pub fn cell_sizes(&self) -> &[f64; 2] {
        &self.cell_sizes
    }

    pub fn filled_cell_count(&self) -> usize {
        self.cells.len()
    }

    pub fn division_count(&self) -> usize {
        self.division_count
    }
}

fn grid_step(extent: f64, divisions: usize) -> f64 {
    if extent > 0.0 {
        extent / divisions as f64
    } else {
        1.0
    }
}
