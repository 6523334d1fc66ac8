//! Ghost-zone algorithms and the communication layer they run on.

pub mod boundary;
pub mod boundary_exchange;
pub mod bounds_exchange;
pub mod collective;
pub mod communicator;
pub mod ghost_builder;
pub mod ghost_update;
pub mod submesh;
pub mod wire;

pub use boundary::{BoundaryMesh, extract_boundary_mesh};
pub use ghost_builder::{GhostBuilder, GhostedMesh};
pub use ghost_update::{UpdateSizes, update_ghosts};
