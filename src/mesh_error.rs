//! MeshGhostError: Unified error type for mesh-ghost public APIs
//!
//! Every fallible public operation in the crate returns this error, so callers
//! never have to match on panics from the communication or matching phases.

use crate::topology::cell_type::CellType;
use thiserror::Error;

/// Unified error type for mesh-ghost operations.
#[derive(Debug, Error)]
pub enum MeshGhostError {
    /// The mesh has no point-data array holding global point IDs.
    #[error("mesh has no global ID point data (expected array `{0}`)")]
    MissingGlobalIds(String),
    /// The global ID array has the wrong shape or type.
    #[error("global ID array `{name}` is invalid: {reason}")]
    InvalidGlobalIds { name: String, reason: String },
    /// A cell was given a number of points that does not fit its shape.
    #[error("cell {cell} of type {cell_type:?} has {found} points, expected {expected}")]
    CellArity {
        cell: usize,
        cell_type: CellType,
        expected: usize,
        found: usize,
    },
    /// A cell references a point index that does not exist.
    #[error("cell {cell} references point {point}, but the mesh has {num_points} points")]
    PointOutOfRange {
        cell: usize,
        point: usize,
        num_points: usize,
    },
    /// A facet is shared by more than two cells of the same partition.
    #[error("facet {face} is shared by more than two cells ({cells:?})")]
    NonManifoldFace { face: String, cells: Vec<usize> },
    /// A field array does not hold `num_tuples * components` values.
    #[error("field `{name}` holds {found} values, expected {expected}")]
    FieldLength {
        name: String,
        expected: usize,
        found: usize,
    },
    /// A field array with the given name does not exist.
    #[error("field `{0}` not found")]
    MissingField(String),
    /// Two arrays that must agree on scalar type or components do not.
    #[error("field `{name}`: {reason}")]
    FieldMismatch { name: String, reason: String },
    /// A tuple index is out of range for a field array.
    #[error("field `{name}`: tuple {tuple} out of range (array has {num_tuples} tuples)")]
    TupleOutOfRange {
        name: String,
        tuple: usize,
        num_tuples: usize,
    },
    /// Communication with a neighbour failed.
    #[error("communication error with rank {neighbor}: {source}")]
    CommError {
        neighbor: usize,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
    /// Other ranks failed a collective phase this rank completed.
    #[error("collective phase failed on rank(s) {ranks:?}")]
    PeerFailed { ranks: Vec<usize> },
    /// A wire payload could not be decoded.
    #[error("wire decode error: {0}")]
    WireDecode(String),
    /// A wire payload carries an incompatible version.
    #[error("unsupported wire version {found} (expected {expected})")]
    WireVersion { found: u16, expected: u16 },
    /// A wire payload carries a different record kind than expected.
    #[error("unexpected wire record kind {found} (expected {expected})")]
    WireKind { found: u16, expected: u16 },
    /// Ghost values arrived for a global point ID that has no ghost slot.
    #[error("rank {rank} sent values for global point {global_id}, which has no target")]
    UnknownGhostNode { rank: usize, global_id: i64 },
    /// Ghost values arrived for a remote cell that has no ghost slot.
    #[error("rank {rank} sent values for its cell {remote_cell}, which has no target")]
    UnknownGhostCell { rank: usize, remote_cell: usize },
    /// A second mesh was registered with a connectivity object.
    #[error("a mesh is already registered; only one mesh per rank is supported")]
    MeshAlreadyRegistered,
    /// An operation needs a registered mesh.
    #[error("no mesh registered")]
    NoMeshRegistered,
    /// Ghost updates were requested before connectivity was built.
    #[error("ghost-zone connectivity has not been built")]
    ConnectivityNotBuilt,
    /// The local mesh topology changed after connectivity was built.
    #[error("local mesh topology changed since the connectivity was built: {0}")]
    TopologyChanged(String),
    /// Rank/size pair is not usable.
    #[error("invalid rank configuration: rank {rank} of {size}")]
    InvalidRank { rank: usize, size: usize },
    /// Invalid input for mesh generation or partitioning.
    #[error("invalid geometry: {0}")]
    InvalidGeometry(String),
    /// Invariant checks failed.
    #[error("invariant violated: {0}")]
    InvariantViolation(String),
    /// I/O failure while writing debug output.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
