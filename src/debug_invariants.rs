use std::collections::BTreeSet;

use crate::algs::ghost_builder::GhostedMesh;
use crate::mesh_error::MeshGhostError;
use crate::overlap::links::CommunicationLinks;
use crate::overlap::perf::FastSet;

/// Trait for validating data structure invariants.
pub trait DebugInvariants {
    /// Assert invariants in debug builds or when invariant checking is enabled.
    fn debug_assert_invariants(&self);
    /// Validate invariants and return the first error encountered.
    fn validate_invariants(&self) -> Result<(), MeshGhostError>;
}

/// Helper macro to run a fallible check and panic on error when invariant
/// checking is enabled.
#[macro_export]
macro_rules! debug_invariants {
    ($expr:expr, $($ctx:tt)*) => {
        #[cfg(any(debug_assertions, feature = "check-invariants"))]
        if let Err(e) = $expr {
            panic!(concat!("[invariants] ", $($ctx)*, ": {}"), e);
        }
    };
}

fn violated(msg: String) -> Result<(), MeshGhostError> {
    Err(MeshGhostError::InvariantViolation(msg))
}

impl DebugInvariants for GhostedMesh {
    fn debug_assert_invariants(&self) {
        crate::debug_invariants!(self.validate_invariants(), "GhostedMesh");
    }

    /// One global ID per point, no duplicates, histories pointing at the
    /// entries they describe, ghosts after locals.
    fn validate_invariants(&self) -> Result<(), MeshGhostError> {
        let mesh = self.mesh();
        let gids = self.global_ids();
        if gids.len() != mesh.num_points() {
            return violated(format!("{} global IDs for {} points", gids.len(), mesh.num_points()));
        }
        let mut seen = FastSet::default();
        if let Some(dup) = gids.iter().find(|&&g| !seen.insert(g)) {
            return violated(format!("global ID {dup} appears twice"));
        }
        if self.num_local_points() > mesh.num_points() || self.num_local_cells() > mesh.num_cells() {
            return violated("local prefix longer than the mesh".into());
        }
        if self.node_history().len() != mesh.num_points() {
            return violated(format!(
                "node history has {} entries for {} points",
                self.node_history().len(),
                mesh.num_points()
            ));
        }
        for (&g, &i) in self.node_history() {
            if gids.get(i) != Some(&g) {
                return violated(format!("node history maps {g} to point {i}"));
            }
        }
        if self.cell_history().len() != self.num_ghost_cells() {
            return violated(format!(
                "cell history has {} entries for {} ghost cells",
                self.cell_history().len(),
                self.num_ghost_cells()
            ));
        }
        for (key, &c) in self.cell_history() {
            if !self.is_ghost_cell(c) || &mesh.cell_key(c, gids) != key {
                return violated(format!("cell history maps {key} to cell {c}"));
            }
        }
        mesh.validate_fields()
    }
}

impl DebugInvariants for CommunicationLinks {
    fn debug_assert_invariants(&self) {
        crate::debug_invariants!(self.validate_invariants(), "CommunicationLinks");
    }

    /// Every target slot is claimed once and every receive link has a target.
    fn validate_invariants(&self) -> Result<(), MeshGhostError> {
        let mut slots = BTreeSet::new();
        for (g, i) in self.target_nodes() {
            if !slots.insert(i) {
                return violated(format!("ghost point {i} targeted twice (global ID {g})"));
            }
        }
        let mut cells = BTreeSet::new();
        for ((r, rc), i) in self.target_cells() {
            if !cells.insert(i) {
                return violated(format!("ghost cell {i} targeted twice (rank {r} cell {rc})"));
            }
        }
        for &r in self.neighbors() {
            for l in self.rcv_node_links(r) {
                if self.target_node_id(r, l.global)? != l.local {
                    return violated(format!("receive link of rank {r} disagrees with target map"));
                }
            }
            for l in self.rcv_cell_links(r) {
                if self.target_cell_id(r, l.remote)? != l.local {
                    return violated(format!("receive cell link of rank {r} disagrees with target map"));
                }
            }
        }
        Ok(())
    }
}

/// Links must only address ghosts for receives and local entries for sends.
pub fn validate_links_against(
    links: &CommunicationLinks,
    ghosted: &GhostedMesh,
) -> Result<(), MeshGhostError> {
    for &r in links.neighbors() {
        if links
            .snd_node_links(r)
            .iter()
            .any(|l| l.local >= ghosted.num_local_points())
        {
            return violated(format!("send node link to rank {r} addresses a ghost"));
        }
        if links
            .snd_cell_links(r)
            .iter()
            .any(|l| l.local >= ghosted.num_local_cells())
        {
            return violated(format!("send cell link to rank {r} addresses a ghost"));
        }
        if links.rcv_node_links(r).iter().any(|l| !ghosted.is_ghost_point(l.local)) {
            return violated(format!("receive node link from rank {r} addresses a local point"));
        }
        if links.rcv_cell_links(r).iter().any(|l| !ghosted.is_ghost_cell(l.local)) {
            return violated(format!("receive cell link from rank {r} addresses a local cell"));
        }
    }
    Ok(())
}
