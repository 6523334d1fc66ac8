#![cfg_attr(docsrs, feature(doc_cfg))]
//! # mesh-ghost
//!
//! mesh-ghost builds ghost zones for distributed unstructured meshes. Every rank
//! owns a disjoint partition of a globally conforming mesh whose points carry
//! globally unique IDs. The crate discovers which cells on neighbouring ranks
//! are face-adjacent to the local partition, appends them (and their points) to
//! a ghosted copy of the local mesh, and records persistent communication links
//! so that field data on the ghosts can be refreshed repeatedly without
//! re-matching topology.
//!
//! ## Phases
//! 1. Boundary extraction: facets keyed by sorted global point IDs; cells with a
//!    facet seen only once form the boundary mesh.
//! 2. Bounds all-gather and bounding-box collision to select candidate ranks.
//! 3. Point-to-point exchange of boundary meshes with candidates, facet matching,
//!    ghost insertion and link recording.
//! 4. Repeated [`update_ghosts`](connectivity::GhostZoneConnectivity::update_ghosts):
//!    local copy, pack, exchange, fill.
//!
//! ## Features
//! - `mpi-support`: an [`MpiComm`](algs::communicator::MpiComm) backend on top of the `mpi` crate.
//! - `rayon`: parallel facet keying when building facet tables.
//! - `fast-hash`: ahash-backed maps for the facet and history tables.
//! - `check-invariants`: validate ghosted meshes and links in release builds too.
//!
//! In-process ranks on threads are provided by
//! [`RayonComm`](algs::communicator::RayonComm), which is what the test-suite uses.

pub mod algs;
pub mod config;
pub mod connectivity;
pub mod data;
pub mod debug_invariants;
pub mod io;
pub mod mesh_error;
pub mod mesh_generation;
pub mod overlap;
pub mod topology;

pub use debug_invariants::DebugInvariants;

/// A convenient prelude to import the most-used traits & types:
pub mod prelude {
    pub use crate::algs::boundary::{BoundaryMesh, extract_boundary_mesh};
    pub use crate::algs::communicator::{CommTag, Communicator, NoComm, RayonComm, Wait};
    #[cfg(feature = "mpi-support")]
    pub use crate::algs::communicator::MpiComm;
    pub use crate::algs::ghost_builder::GhostedMesh;
    pub use crate::config::GhostConfig;
    pub use crate::connectivity::{GhostZoneConnectivity, generate_ghost_data};
    pub use crate::data::bounds::BoundingBox;
    pub use crate::data::field::{FieldArray, FieldData, FieldValues};
    pub use crate::data::mesh::UnstructuredMesh;
    pub use crate::debug_invariants::DebugInvariants;
    pub use crate::mesh_error::MeshGhostError;
    pub use crate::overlap::delta::{AddDelta, CopyDelta, GhostDelta};
    pub use crate::overlap::links::CommunicationLinks;
    pub use crate::topology::cell_type::CellType;
    pub use crate::topology::face_key::{FaceKey, GlobalId};
}
