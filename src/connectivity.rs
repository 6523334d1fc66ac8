//! Ghost-zone connectivity of one rank: build once, update many times.
//!
//! A [`GhostZoneConnectivity`] owns the registered local mesh, the ghosted
//! mesh derived from it and the communication links. Building is collective:
//! every rank of the communicator must call
//! [`build_ghost_zone_connectivity`](GhostZoneConnectivity::build_ghost_zone_connectivity),
//! and likewise every rank must call
//! [`update_ghosts`](GhostZoneConnectivity::update_ghosts) the same number of
//! times.

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use log::{debug, info};

use crate::algs::boundary::{BoundaryMesh, extract_boundary_mesh};
use crate::algs::boundary_exchange::exchange_boundary_meshes;
use crate::algs::bounds_exchange::{candidate_ranks, exchange_bounds};
use crate::algs::collective::agree;
use crate::algs::communicator::Communicator;
use crate::algs::ghost_builder::{GhostBuilder, GhostedMesh};
use crate::algs::ghost_update::{self, UpdateSizes};
use crate::config::GhostConfig;
use crate::data::mesh::UnstructuredMesh;
use crate::debug_invariants::{DebugInvariants, validate_links_against};
use crate::io::vtk::write_vtk;
use crate::mesh_error::MeshGhostError;
use crate::overlap::delta::{CopyDelta, GhostDelta};
use crate::overlap::links::CommunicationLinks;

#[derive(Debug)]
struct Built {
    ghosted: GhostedMesh,
    links: CommunicationLinks,
    candidates: BTreeSet<usize>,
    update_sizes: UpdateSizes,
}

pub struct GhostZoneConnectivity<'c, C: Communicator> {
    comm: &'c C,
    config: GhostConfig,
    local: Option<UnstructuredMesh>,
    built: Option<Built>,
}

impl<'c, C: Communicator> GhostZoneConnectivity<'c, C> {
    pub fn new(comm: &'c C, config: GhostConfig) -> Result<Self, MeshGhostError> {
        config.validate()?;
        if comm.rank() >= comm.size().max(1) {
            return Err(MeshGhostError::InvalidRank {
                rank: comm.rank(),
                size: comm.size(),
            });
        }
        Ok(Self {
            comm,
            config,
            local: None,
            built: None,
        })
    }

    pub fn config(&self) -> &GhostConfig {
        &self.config
    }

    /// Hand over the local partition. Only one mesh per rank is supported.
    pub fn register_mesh(&mut self, mesh: UnstructuredMesh) -> Result<(), MeshGhostError> {
        if self.local.is_some() {
            return Err(MeshGhostError::MeshAlreadyRegistered);
        }
        mesh.global_ids(&self.config.global_id_field)?;
        mesh.validate_fields()?;
        self.local = Some(mesh);
        Ok(())
    }

    pub fn local_mesh(&self) -> Result<&UnstructuredMesh, MeshGhostError> {
        self.local.as_ref().ok_or(MeshGhostError::NoMeshRegistered)
    }

    /// Mutable access to the local mesh, e.g. to change field values between
    /// updates. Adding points or cells invalidates the connectivity.
    pub fn local_mesh_mut(&mut self) -> Result<&mut UnstructuredMesh, MeshGhostError> {
        self.local.as_mut().ok_or(MeshGhostError::NoMeshRegistered)
    }

    /// Collective: discover face-adjacent remote cells, build the ghosted mesh
    /// and record the communication links. Rebuilding replaces both.
    ///
    /// Local failures (bad global IDs, non-manifold facets, undecodable
    /// boundaries, invariant or debug-output errors) are agreed on by all
    /// ranks: the failing rank returns its error and every other rank returns
    /// [`MeshGhostError::PeerFailed`]. A transport that stops delivering
    /// messages still blocks the ranks waiting on it.
    pub fn build_ghost_zone_connectivity(&mut self) -> Result<(), MeshGhostError> {
        let local = self.local.as_ref().ok_or(MeshGhostError::NoMeshRegistered)?;
        let rank = self.comm.rank();

        if self.comm.is_serial() {
            debug!("single rank: ghosted mesh is the local mesh");
            self.built = Some(Built {
                ghosted: GhostedMesh::from_local(local, &self.config.global_id_field)?,
                links: CommunicationLinks::new(),
                candidates: BTreeSet::new(),
                update_sizes: UpdateSizes::default(),
            });
            return Ok(());
        }

        let tags = self.config.tags();
        let boundary = agree(extract_boundary_mesh(local, &self.config), self.comm, tags.status)?;
        let all_bounds = exchange_bounds(&boundary.bounds(), self.comm, tags.bounds)?;
        let candidates = candidate_ranks(rank, &boundary.bounds(), &all_bounds, self.config.bounds_tolerance);

        let assembled = exchange_boundary_meshes(&boundary, &candidates, self.comm, &tags)
            .and_then(|remote| assemble(local, &boundary, &remote, &self.config, rank));
        let (ghosted, links) = agree(assembled, self.comm, tags.status)?;

        info!(
            "rank {rank}: {} ghost cells, {} ghost points from {} neighbours ({} candidates)",
            ghosted.num_ghost_cells(),
            ghosted.num_ghost_points(),
            links.neighbors().len(),
            candidates.len()
        );
        self.built = Some(Built {
            ghosted,
            links,
            candidates,
            update_sizes: UpdateSizes::default(),
        });
        Ok(())
    }

    /// Collective: refresh ghost values, overwriting them with the owners'.
    ///
    /// Packet sizes are exchanged by the first update after a build only. A
    /// rank whose local mesh no longer matches the build fails with
    /// [`MeshGhostError::TopologyChanged`] and its neighbours with
    /// [`MeshGhostError::PeerFailed`].
    pub fn update_ghosts(&mut self) -> Result<(), MeshGhostError> {
        self.update_ghosts_with::<CopyDelta>()
    }

    /// Collective: refresh ghost values, fusing received tuples with `D`.
    pub fn update_ghosts_with<D: GhostDelta>(&mut self) -> Result<(), MeshGhostError> {
        let local = self.local.as_ref().ok_or(MeshGhostError::NoMeshRegistered)?;
        let built = self.built.as_mut().ok_or(MeshGhostError::ConnectivityNotBuilt)?;
        ghost_update::update_ghosts::<C, D>(
            local,
            &mut built.ghosted,
            &built.links,
            self.comm,
            &self.config.tags(),
            &self.config,
            &mut built.update_sizes,
        )
    }

    pub fn ghosted_mesh(&self) -> Result<&GhostedMesh, MeshGhostError> {
        self.built
            .as_ref()
            .map(|b| &b.ghosted)
            .ok_or(MeshGhostError::ConnectivityNotBuilt)
    }

    pub fn links(&self) -> Result<&CommunicationLinks, MeshGhostError> {
        self.built
            .as_ref()
            .map(|b| &b.links)
            .ok_or(MeshGhostError::ConnectivityNotBuilt)
    }

    /// Ranks whose bounding box touched ours during the last build.
    pub fn candidate_ranks(&self) -> Option<&BTreeSet<usize>> {
        self.built.as_ref().map(|b| &b.candidates)
    }

    pub fn into_ghosted_mesh(self) -> Result<GhostedMesh, MeshGhostError> {
        self.built
            .map(|b| b.ghosted)
            .ok_or(MeshGhostError::ConnectivityNotBuilt)
    }
}

/// Local half of a build: insert the ghosts received from every candidate,
/// check invariants and dump debug meshes.
fn assemble(
    local: &UnstructuredMesh,
    boundary: &BoundaryMesh,
    remote: &BTreeMap<usize, BoundaryMesh>,
    config: &GhostConfig,
    rank: usize,
) -> Result<(GhostedMesh, CommunicationLinks), MeshGhostError> {
    let mut builder = GhostBuilder::new(local, boundary, config)?;
    for (&nbr, rb) in remote {
        builder.process_remote_boundary(nbr, rb)?;
    }
    let (ghosted, links) = builder.finish()?;

    if config.check_invariants {
        ghosted.validate_invariants()?;
        links.validate_invariants()?;
        validate_links_against(&links, &ghosted)?;
    } else {
        ghosted.debug_assert_invariants();
        links.debug_assert_invariants();
    }
    if let Some(dir) = &config.debug_output_dir {
        write_debug_output(dir, rank, boundary, &ghosted)?;
    }
    Ok((ghosted, links))
}

fn write_debug_output(
    dir: &Path,
    rank: usize,
    boundary: &BoundaryMesh,
    ghosted: &GhostedMesh,
) -> Result<(), MeshGhostError> {
    std::fs::create_dir_all(dir)?;
    write_vtk(&boundary.mesh, dir.join(format!("boundary_rank{rank}.vtk")))?;
    write_vtk(ghosted.mesh(), dir.join(format!("ghosted_rank{rank}.vtk")))?;
    debug!("rank {rank}: debug meshes written to {}", dir.display());
    Ok(())
}

/// One-shot ghost generation: register `mesh`, build, run one update and
/// return the ghosted mesh with its ghost-cell marker array.
pub fn generate_ghost_data<C: Communicator>(
    mesh: UnstructuredMesh,
    comm: &C,
    config: GhostConfig,
) -> Result<UnstructuredMesh, MeshGhostError> {
    let mut conn = GhostZoneConnectivity::new(comm, config)?;
    conn.register_mesh(mesh)?;
    conn.build_ghost_zone_connectivity()?;
    conn.update_ghosts()?;
    Ok(conn.into_ghosted_mesh()?.into_mesh())
}
