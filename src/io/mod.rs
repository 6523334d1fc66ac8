//! Mesh output helpers.

pub mod vtk;

pub use vtk::{VtkWriter, write_vtk};
