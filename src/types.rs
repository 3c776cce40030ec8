//! Core shared types for the multi-match estimation pipeline.
//!
//! Source and destination point clouds, as well as per-candidate match
//! scores, are plain dense `f64` tables; rows index observations, columns
//! index channels. The match table carries destination *indices* and is
//! integer-typed so that "no candidate" can be encoded as a negative entry.

use nalgebra::DMatrix;

/// Dense dynamic matrix of `f64`. Point clouds store `(x, y)` in the first
/// two columns; further columns may carry auxiliary features.
pub type DataMatrix = DMatrix<f64>;

/// Source-count x K table of candidate destination indices. Entries that are
/// negative or not a valid destination row mean "no candidate".
pub type MatchMatrix = DMatrix<i64>;

/// One tentative correspondence: `(source_row, destination_row)`.
pub type MatchPair = (usize, usize);
