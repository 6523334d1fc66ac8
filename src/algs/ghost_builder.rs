//! Ghost insertion: append face-adjacent remote cells to a copy of the local
//! mesh and record the communication links that keep them up to date.
//!
//! Points are deduplicated through a node history keyed by global ID (local
//! points are pre-registered, so shared interface points are never
//! duplicated) and cells through a cell history keyed by the sorted global
//! IDs of their points.

use log::debug;

use crate::algs::boundary::{BoundaryLinks, BoundaryMesh};
use crate::config::GhostConfig;
use crate::data::field::{FieldArray, FieldData};
use crate::data::mesh::UnstructuredMesh;
use crate::mesh_error::MeshGhostError;
use crate::overlap::links::CommunicationLinks;
use crate::overlap::perf::{FastMap, map_with_capacity};
use crate::topology::face_key::{FaceKey, GlobalId};

/// The local mesh followed by ghost points and ghost cells.
#[derive(Clone, Debug)]
pub struct GhostedMesh {
    mesh: UnstructuredMesh,
    global_ids: Vec<GlobalId>,
    num_local_points: usize,
    num_local_cells: usize,
    node_history: FastMap<GlobalId, usize>,
    cell_history: FastMap<FaceKey, usize>,
}

impl GhostedMesh {
    /// A ghosted mesh without ghosts: the local mesh with all its fields.
    pub fn from_local(local: &UnstructuredMesh, global_id_field: &str) -> Result<Self, MeshGhostError> {
        let global_ids = local.global_ids(global_id_field)?.to_vec();
        let mut node_history = map_with_capacity(global_ids.len());
        for (i, &g) in global_ids.iter().enumerate() {
            node_history.insert(g, i);
        }
        Ok(Self {
            mesh: local.clone(),
            global_ids,
            num_local_points: local.num_points(),
            num_local_cells: local.num_cells(),
            node_history,
            cell_history: FastMap::default(),
        })
    }

    pub fn mesh(&self) -> &UnstructuredMesh {
        &self.mesh
    }

    pub(crate) fn mesh_mut(&mut self) -> &mut UnstructuredMesh {
        &mut self.mesh
    }

    pub fn into_mesh(self) -> UnstructuredMesh {
        self.mesh
    }

    /// Global ID of every point, local points first.
    pub fn global_ids(&self) -> &[GlobalId] {
        &self.global_ids
    }

    pub fn num_local_points(&self) -> usize {
        self.num_local_points
    }

    pub fn num_local_cells(&self) -> usize {
        self.num_local_cells
    }

    pub fn num_ghost_points(&self) -> usize {
        self.mesh.num_points() - self.num_local_points
    }

    pub fn num_ghost_cells(&self) -> usize {
        self.mesh.num_cells() - self.num_local_cells
    }

    pub fn is_ghost_cell(&self, c: usize) -> bool {
        c >= self.num_local_cells && c < self.mesh.num_cells()
    }

    pub fn is_ghost_point(&self, p: usize) -> bool {
        p >= self.num_local_points && p < self.mesh.num_points()
    }

    /// Ghosted index of the point with global ID `gid`.
    pub fn point_of(&self, gid: GlobalId) -> Option<usize> {
        self.node_history.get(&gid).copied()
    }

    /// Ghosted index of the ghost cell with key `key`.
    pub fn ghost_cell_of(&self, key: &FaceKey) -> Option<usize> {
        self.cell_history.get(key).copied()
    }

    pub(crate) fn node_history(&self) -> &FastMap<GlobalId, usize> {
        &self.node_history
    }

    pub(crate) fn cell_history(&self) -> &FastMap<FaceKey, usize> {
        &self.cell_history
    }
}

/// Append one tuple to every array of `dst`, copied from tuple `src_tuple` of
/// the same-named compatible array in `src`, zero otherwise.
fn push_tuple(dst: &mut FieldData, src: &FieldData, src_tuple: usize) -> Result<(), MeshGhostError> {
    for a in dst.iter_mut() {
        let n = a.num_tuples();
        a.resize_tuples(n + 1);
        if let Some(s) = src.get(a.name()).filter(|s| s.is_compatible(a)) {
            a.copy_tuple_from(n, s, src_tuple)?;
        }
    }
    Ok(())
}

/// Incremental builder of a [`GhostedMesh`] and its [`CommunicationLinks`].
pub struct GhostBuilder<'a> {
    local: &'a UnstructuredMesh,
    local_gids: &'a [GlobalId],
    boundary_links: BoundaryLinks,
    ghosted: GhostedMesh,
    links: CommunicationLinks,
    global_id_field: &'a str,
    matches: Vec<usize>,
    conn: Vec<usize>,
}

impl<'a> GhostBuilder<'a> {
    pub fn new(
        local: &'a UnstructuredMesh,
        local_boundary: &BoundaryMesh,
        config: &'a GhostConfig,
    ) -> Result<Self, MeshGhostError> {
        let local_gids = local.global_ids(&config.global_id_field)?;
        Ok(Self {
            local,
            local_gids,
            boundary_links: local_boundary.build_links()?,
            ghosted: GhostedMesh::from_local(local, &config.global_id_field)?,
            links: CommunicationLinks::new(),
            global_id_field: &config.global_id_field,
            matches: Vec::with_capacity(4),
            conn: Vec::with_capacity(8),
        })
    }

    /// Match every cell of `remote` (received from `rank`) against the local
    /// boundary, insert the face-adjacent ones as ghosts and record links in
    /// both directions. Returns the number of ghost cells inserted.
    pub fn process_remote_boundary(
        &mut self,
        rank: usize,
        remote: &BoundaryMesh,
    ) -> Result<usize, MeshGhostError> {
        let remote_gids = remote.global_id_set();
        let mut inserted = 0;

        for rc in 0..remote.num_cells() {
            self.matches.clear();
            if self.boundary_links.match_cell(remote, rc, &mut self.matches) == 0 {
                continue;
            }

            for &lc in &self.matches {
                self.links.enqueue_cell_send(rank, lc);
                for &p in self.local.cell_points(lc) {
                    let g = self.local_gids[p];
                    if !remote_gids.contains(&g) {
                        self.links.enqueue_node_send(rank, p, g);
                    }
                }
            }

            let rpts = remote.mesh.cell_points(rc);
            let key = FaceKey::from_ids(rpts.iter().map(|&rp| remote.global_ids[rp]));
            let ghost_cell = match self.ghosted.cell_history.get(&key) {
                Some(&c) => c,
                None => {
                    self.conn.clear();
                    for &rp in rpts {
                        let g = remote.global_ids[rp];
                        let idx = match self.ghosted.node_history.get(&g) {
                            Some(&i) => i,
                            None => {
                                let i = self.ghosted.mesh.add_point(remote.mesh.point(rp));
                                self.ghosted.global_ids.push(g);
                                self.ghosted.node_history.insert(g, i);
                                push_tuple(
                                    self.ghosted.mesh.point_data_mut(),
                                    remote.mesh.point_data(),
                                    rp,
                                )?;
                                i
                            }
                        };
                        self.conn.push(idx);
                    }
                    let c = self
                        .ghosted
                        .mesh
                        .add_cell(remote.mesh.cell_type(rc), &self.conn)?;
                    push_tuple(self.ghosted.mesh.cell_data_mut(), remote.mesh.cell_data(), rc)?;
                    self.ghosted.cell_history.insert(key, c);
                    inserted += 1;
                    c
                }
            };

            self.links
                .enqueue_cell_rcv(rank, ghost_cell, remote.local_cell_ids[rc]);
            for &p in self.ghosted.mesh.cell_points(ghost_cell) {
                if p >= self.ghosted.num_local_points {
                    self.links
                        .enqueue_node_rcv(rank, p, self.ghosted.global_ids[p]);
                }
            }
        }

        debug!(
            "rank {rank}: {inserted} ghost cells inserted, {} local cells to send",
            self.links.snd_cell_links(rank).len()
        );
        Ok(inserted)
    }

    /// Finalise the ghost global IDs and hand out the mesh and links.
    pub fn finish(mut self) -> Result<(GhostedMesh, CommunicationLinks), MeshGhostError> {
        let ids = FieldArray::from_vec(self.global_id_field, 1, self.ghosted.global_ids.clone())?;
        self.ghosted.mesh.point_data_mut().insert(ids);
        self.ghosted.mesh.validate_fields()?;
        Ok((self.ghosted, self.links))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::algs::boundary::extract_boundary_mesh;
    use crate::algs::submesh::extract_submesh;
    use crate::mesh_generation::{slab_owners, structured_rect};

    fn halves() -> (UnstructuredMesh, UnstructuredMesh) {
        let global = structured_rect(4, 2, [0.0, 0.0], [4.0, 2.0], false, "GlobalID").unwrap();
        let owners = slab_owners(&global, 2, 0).unwrap();
        (
            extract_submesh(&global, &owners, 0).unwrap(),
            extract_submesh(&global, &owners, 1).unwrap(),
        )
    }

    #[test]
    fn two_halves_ghost_one_column_each() {
        let cfg = GhostConfig::default();
        let (m0, m1) = halves();
        let b0 = extract_boundary_mesh(&m0, &cfg).unwrap();
        let b1 = extract_boundary_mesh(&m1, &cfg).unwrap();

        let mut builder = GhostBuilder::new(&m0, &b0, &cfg).unwrap();
        assert_eq!(builder.process_remote_boundary(1, &b1).unwrap(), 2);
        let (g, links) = builder.finish().unwrap();

        assert_eq!(g.num_ghost_cells(), 2);
        // the column beyond the interface adds one row of 3 points
        assert_eq!(g.num_ghost_points(), 3);
        assert_eq!(links.snd_cell_links(1).len(), 2);
        assert_eq!(links.rcv_cell_links(1).len(), 2);
        assert_eq!(links.snd_node_links(1).len(), 3);
        assert_eq!(links.rcv_node_links(1).len(), 3);
        let gids = g.mesh().global_ids("GlobalID").unwrap();
        assert_eq!(gids.len(), g.mesh().num_points());
        let mut sorted = gids.to_vec();
        sorted.sort_unstable();
        sorted.dedup();
        assert_eq!(sorted.len(), gids.len());
    }

    #[test]
    fn processing_the_same_rank_twice_adds_nothing() {
        let cfg = GhostConfig::default();
        let (m0, m1) = halves();
        let b0 = extract_boundary_mesh(&m0, &cfg).unwrap();
        let b1 = extract_boundary_mesh(&m1, &cfg).unwrap();
        let mut builder = GhostBuilder::new(&m0, &b0, &cfg).unwrap();
        builder.process_remote_boundary(1, &b1).unwrap();
        assert_eq!(builder.process_remote_boundary(1, &b1).unwrap(), 0);
        let (g, links) = builder.finish().unwrap();
        assert_eq!(g.num_ghost_cells(), 2);
        assert_eq!(links.rcv_cell_links(1).len(), 2);
    }
}
