//! Top-level module for mesh topology helpers.
//!
//! - [`cell_type`]: cell shapes and their facet tables
//! - [`face_key`]: orientation-free facet keys and the per-partition facet table

pub mod cell_type;
pub mod face_key;

pub use cell_type::CellType;
pub use face_key::{FaceKey, FacetTable, GlobalId};
