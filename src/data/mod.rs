//! Data module: meshes, field arrays and bounding boxes

pub mod bounds;
pub mod field;
pub mod mesh;

pub use bounds::BoundingBox;
pub use field::{FieldArray, FieldData, FieldScalar, FieldValues, ScalarType};
pub use mesh::UnstructuredMesh;
