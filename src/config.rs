//! Run-time settings for ghost-zone construction and updates.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::algs::communicator::{CommTag, GhostCommTags};
use crate::mesh_error::MeshGhostError;

pub const DEFAULT_GLOBAL_ID_FIELD: &str = "GlobalID";
pub const DEFAULT_GHOST_CELL_ARRAY: &str = "GHOSTCELL";
pub const DEFAULT_BASE_TAG: u16 = 0x4700;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GhostConfig {
    /// Point-data array holding global point IDs.
    pub global_id_field: String,
    /// Cell-data array marking ghost cells (0 local, 1 ghost).
    pub ghost_cell_array: String,
    /// Growth applied to the local box before the collision test.
    pub bounds_tolerance: f64,
    /// Point arrays shipped with the boundary mesh; `None` ships all of them.
    pub boundary_point_fields: Option<Vec<String>>,
    /// Cell arrays shipped with the boundary mesh; `None` ships all of them.
    pub boundary_cell_fields: Option<Vec<String>>,
    /// First tag of the five consecutive tags used by one connectivity.
    pub base_tag: u16,
    /// Validate the ghosted mesh and links after every build.
    pub check_invariants: bool,
    /// Dump boundary and ghosted meshes per rank as legacy VTK files.
    pub debug_output_dir: Option<PathBuf>,
}

impl Default for GhostConfig {
    fn default() -> Self {
        Self {
            global_id_field: DEFAULT_GLOBAL_ID_FIELD.to_string(),
            ghost_cell_array: DEFAULT_GHOST_CELL_ARRAY.to_string(),
            bounds_tolerance: 0.0,
            boundary_point_fields: None,
            boundary_cell_fields: None,
            base_tag: DEFAULT_BASE_TAG,
            check_invariants: cfg!(feature = "check-invariants"),
            debug_output_dir: None,
        }
    }
}

impl GhostConfig {
    pub fn with_global_id_field(mut self, name: impl Into<String>) -> Self {
        self.global_id_field = name.into();
        self
    }

    pub fn with_ghost_cell_array(mut self, name: impl Into<String>) -> Self {
        self.ghost_cell_array = name.into();
        self
    }

    pub fn with_bounds_tolerance(mut self, tol: f64) -> Self {
        self.bounds_tolerance = tol;
        self
    }

    pub fn with_boundary_point_fields<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.boundary_point_fields = Some(names.into_iter().map(Into::into).collect());
        self
    }

    pub fn with_boundary_cell_fields<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.boundary_cell_fields = Some(names.into_iter().map(Into::into).collect());
        self
    }

    pub fn with_base_tag(mut self, tag: u16) -> Self {
        self.base_tag = tag;
        self
    }

    pub fn with_check_invariants(mut self, on: bool) -> Self {
        self.check_invariants = on;
        self
    }

    pub fn with_debug_output_dir<P: Into<PathBuf>>(mut self, dir: P) -> Self {
        self.debug_output_dir = Some(dir.into());
        self
    }

    pub fn tags(&self) -> GhostCommTags {
        GhostCommTags::from_base(CommTag::new(self.base_tag))
    }

    /// Should point array `name` travel with the boundary mesh?
    pub fn ships_point_field(&self, name: &str) -> bool {
        name != self.global_id_field
            && self
                .boundary_point_fields
                .as_ref()
                .is_none_or(|list| list.iter().any(|n| n == name))
    }

    /// Should cell array `name` travel with the boundary mesh?
    pub fn ships_cell_field(&self, name: &str) -> bool {
        name != self.ghost_cell_array
            && self
                .boundary_cell_fields
                .as_ref()
                .is_none_or(|list| list.iter().any(|n| n == name))
    }

    pub fn validate(&self) -> Result<(), MeshGhostError> {
        let bad = |msg: String| MeshGhostError::InvalidGeometry(msg);
        if self.global_id_field.is_empty() {
            return Err(bad("global ID field name is empty".into()));
        }
        if self.ghost_cell_array.is_empty() {
            return Err(bad("ghost cell array name is empty".into()));
        }
        if !self.bounds_tolerance.is_finite() || self.bounds_tolerance < 0.0 {
            return Err(bad(format!(
                "bounds tolerance must be finite and non-negative, got {}",
                self.bounds_tolerance
            )));
        }
        if self.base_tag > u16::MAX - 6 {
            return Err(bad(format!("base tag {:#x} leaves no room for phase tags", self.base_tag)));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_and_builders() {
        let c = GhostConfig::default()
            .with_bounds_tolerance(1e-9)
            .with_boundary_point_fields(["pressure"]);
        assert_eq!(c.global_id_field, "GlobalID");
        assert!(c.ships_point_field("pressure"));
        assert!(!c.ships_point_field("velocity"));
        assert!(!c.ships_point_field("GlobalID"));
        assert!(c.ships_cell_field("material"));
        assert!(!c.ships_cell_field("GHOSTCELL"));
        assert!(c.validate().is_ok());
        assert!(c.with_bounds_tolerance(-1.0).validate().is_err());
    }

    #[test]
    fn serde_fills_missing_keys() {
        let c: GhostConfig = serde_json::from_str(r#"{"ghost_cell_array":"vtkGhost"}"#).unwrap();
        assert_eq!(c.ghost_cell_array, "vtkGhost");
        assert_eq!(c.base_tag, DEFAULT_BASE_TAG);
        let back: GhostConfig = serde_json::from_str(&serde_json::to_string(&c).unwrap()).unwrap();
        assert_eq!(back, c);
    }
}
