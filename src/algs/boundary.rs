//! Boundary-mesh extraction and facet matching against remote boundary cells.
//!
//! The boundary mesh of a partition is made of the cells that own at least one
//! facet no other local cell shares. It is the unit exchanged between ranks:
//! a remote cell can only be face-adjacent to one of these cells.

use log::{debug, warn};

use crate::config::GhostConfig;
use crate::data::bounds::BoundingBox;
use crate::data::field::FieldData;
use crate::data::mesh::UnstructuredMesh;
use crate::mesh_error::MeshGhostError;
use crate::overlap::perf::{FastMap, FastSet, map_with_capacity};
use crate::topology::face_key::{FaceKey, FacetTable, GlobalId};

/// Boundary cells of one partition with their points, tagged with IDs.
///
/// For a locally extracted boundary mesh the IDs refer to the local mesh;
/// for a received one they refer to the sender's mesh.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct BoundaryMesh {
    /// Boundary cells and points, with shipped field data.
    pub mesh: UnstructuredMesh,
    /// Global ID of every boundary point.
    pub global_ids: Vec<GlobalId>,
    /// Index of every boundary point in the owning partition.
    pub local_ids: Vec<usize>,
    /// Index of every boundary cell in the owning partition.
    pub local_cell_ids: Vec<usize>,
}

/// Lookup tables of a local boundary mesh used while matching.
#[derive(Clone, Debug, Default)]
pub struct BoundaryLinks {
    /// Global ID → point index in the local mesh.
    pub global_to_local: FastMap<GlobalId, usize>,
    /// Boundary facet key → cell index in the local mesh.
    pub face_links: FastMap<FaceKey, usize>,
}

/// Collect the boundary cells of `mesh`.
///
/// Point and cell arrays selected by `config` are copied onto the boundary
/// mesh; the global IDs are always attached under `config.global_id_field`.
pub fn extract_boundary_mesh(
    mesh: &UnstructuredMesh,
    config: &GhostConfig,
) -> Result<BoundaryMesh, MeshGhostError> {
    let gids = mesh.global_ids(&config.global_id_field)?;
    let table = FacetTable::build(mesh, gids)?;

    let mut is_boundary_cell = vec![false; mesh.num_cells()];
    for (_, adj) in table.boundary_facets() {
        is_boundary_cell[adj.cells()[0]] = true;
    }
    let local_cell_ids: Vec<usize> = (0..mesh.num_cells()).filter(|&c| is_boundary_cell[c]).collect();

    let mut point_map: FastMap<usize, usize> = map_with_capacity(local_cell_ids.len() * 4);
    let mut local_ids = Vec::new();
    let mut out = UnstructuredMesh::with_capacity(local_cell_ids.len() * 2, local_cell_ids.len());
    let mut conn = Vec::with_capacity(8);
    for &c in &local_cell_ids {
        conn.clear();
        for &p in mesh.cell_points(c) {
            let bp = *point_map.entry(p).or_insert_with(|| {
                local_ids.push(p);
                out.add_point(mesh.point(p))
            });
            conn.push(bp);
        }
        out.add_cell(mesh.cell_type(c), &conn)?;
    }
    let global_ids: Vec<GlobalId> = local_ids.iter().map(|&p| gids[p]).collect();

    for a in mesh.point_data().iter().filter(|a| config.ships_point_field(a.name())) {
        out.point_data_mut().insert(a.gather(&local_ids)?);
    }
    for a in mesh.cell_data().iter().filter(|a| config.ships_cell_field(a.name())) {
        out.cell_data_mut().insert(a.gather(&local_cell_ids)?);
    }
    check_requested(mesh.point_data(), config.boundary_point_fields.as_deref())?;
    check_requested(mesh.cell_data(), config.boundary_cell_fields.as_deref())?;
    out.set_global_ids(&config.global_id_field, global_ids.clone())?;

    if local_cell_ids.is_empty() && mesh.num_cells() > 0 {
        warn!("partition with {} cells has an empty boundary", mesh.num_cells());
    }
    debug!(
        "boundary mesh: {} of {} cells, {} points",
        local_cell_ids.len(),
        mesh.num_cells(),
        global_ids.len()
    );

    Ok(BoundaryMesh {
        mesh: out,
        global_ids,
        local_ids,
        local_cell_ids,
    })
}

fn check_requested(fd: &FieldData, requested: Option<&[String]>) -> Result<(), MeshGhostError> {
    match requested.and_then(|names| names.iter().find(|n| !fd.has_array(n))) {
        Some(missing) => Err(MeshGhostError::MissingField(missing.clone())),
        None => Ok(()),
    }
}

impl BoundaryMesh {
    pub fn num_cells(&self) -> usize {
        self.mesh.num_cells()
    }

    pub fn num_points(&self) -> usize {
        self.mesh.num_points()
    }

    pub fn is_empty(&self) -> bool {
        self.mesh.num_cells() == 0
    }

    pub fn bounds(&self) -> BoundingBox {
        self.mesh.bounds()
    }

    /// Global IDs of all boundary points.
    pub fn global_id_set(&self) -> FastSet<GlobalId> {
        self.global_ids.iter().copied().collect()
    }

    /// Key of facet `facet` of boundary cell `cell`, in global IDs.
    fn facet_key(&self, cell: usize, facet: usize, scratch: &mut Vec<usize>) -> FaceKey {
        let ct = self.mesh.cell_type(cell);
        let pts = self.mesh.cell_points(cell);
        ct.facet_local_points(facet, scratch);
        FaceKey::from_ids(scratch.iter().map(|&l| self.global_ids[pts[l]]))
    }

    /// Index the facets seen once in this boundary mesh and the global IDs of
    /// its points, both mapped back to the owning partition.
    ///
    /// Facets on the inner side of the boundary layer are indexed as well; in
    /// a conforming mesh no remote facet can carry their key.
    pub fn build_links(&self) -> Result<BoundaryLinks, MeshGhostError> {
        let table = FacetTable::build(&self.mesh, &self.global_ids)?;
        let mut face_links = map_with_capacity(table.len());
        for (key, adj) in table.boundary_facets() {
            face_links.insert(key.clone(), self.local_cell_ids[adj.cells()[0]]);
        }
        let global_to_local = self
            .global_ids
            .iter()
            .copied()
            .zip(self.local_ids.iter().copied())
            .collect();
        Ok(BoundaryLinks {
            global_to_local,
            face_links,
        })
    }
}

impl BoundaryLinks {
    /// Push into `out` every local cell sharing a facet with cell `cell` of
    /// `remote`. Returns the number of matches.
    pub fn match_cell(&self, remote: &BoundaryMesh, cell: usize, out: &mut Vec<usize>) -> usize {
        let before = out.len();
        let mut scratch = Vec::with_capacity(4);
        for f in 0..remote.mesh.cell_type(cell).num_facets() {
            let key = remote.facet_key(cell, f, &mut scratch);
            if let Some(&local) = self.face_links.get(&key) {
                if !out[before..].contains(&local) {
                    out.push(local);
                }
            }
        }
        out.len() - before
    }

    pub fn is_local(&self, gid: GlobalId) -> bool {
        self.global_to_local.contains_key(&gid)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::field::FieldArray;
    use crate::mesh_generation::structured_rect;
    use crate::topology::cell_type::CellType;

    #[test]
    fn three_by_three_quads_have_eight_boundary_cells() {
        let mesh = structured_rect(3, 3, [0.0, 0.0], [3.0, 3.0], false, "GlobalID").unwrap();
        let b = extract_boundary_mesh(&mesh, &GhostConfig::default()).unwrap();
        assert_eq!(b.num_cells(), 8);
        assert!(!b.local_cell_ids.contains(&4));
        assert_eq!(b.num_points(), 16);
        assert_eq!(b.mesh.global_ids("GlobalID").unwrap(), b.global_ids.as_slice());
        // 12 outer edges plus the 4 edges around the removed centre cell.
        let links = b.build_links().unwrap();
        assert_eq!(links.face_links.len(), 16);
        assert_eq!(links.global_to_local.len(), 16);
    }

    #[test]
    fn shipped_fields_follow_selection() {
        let mut mesh = structured_rect(2, 1, [0.0, 0.0], [2.0, 1.0], false, "GlobalID").unwrap();
        mesh.cell_data_mut()
            .insert(FieldArray::from_vec("mat", 1, vec![7i32, 8]).unwrap());
        mesh.point_data_mut()
            .insert(FieldArray::from_vec("t", 1, vec![0.0f64; 6]).unwrap());
        let cfg = GhostConfig::default().with_boundary_point_fields(Vec::<String>::new());
        let b = extract_boundary_mesh(&mesh, &cfg).unwrap();
        assert_eq!(b.mesh.cell_data().get("mat").unwrap().as_slice::<i32>(), Some(&[7, 8][..]));
        assert!(!b.mesh.point_data().has_array("t"));

        let missing = GhostConfig::default().with_boundary_cell_fields(["nope"]);
        assert!(matches!(
            extract_boundary_mesh(&mesh, &missing),
            Err(MeshGhostError::MissingField(_))
        ));
    }

    #[test]
    fn remote_cell_matches_by_global_ids_only() {
        // local: one triangle (gids 1,2,3); remote: triangle (2,3,4) placed elsewhere.
        let mut local = UnstructuredMesh::new();
        for p in [[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]] {
            local.add_point(p);
        }
        local.add_cell(CellType::Triangle, &[0, 1, 2]).unwrap();
        local.set_global_ids("GlobalID", vec![1, 2, 3]).unwrap();
        let lb = extract_boundary_mesh(&local, &GhostConfig::default()).unwrap();
        let links = lb.build_links().unwrap();

        let mut remote = UnstructuredMesh::new();
        for p in [[5.0, 0.0, 0.0], [6.0, 0.0, 0.0], [5.0, 1.0, 0.0]] {
            remote.add_point(p);
        }
        remote.add_cell(CellType::Triangle, &[0, 1, 2]).unwrap();
        remote.set_global_ids("GlobalID", vec![2, 3, 4]).unwrap();
        let rb = extract_boundary_mesh(&remote, &GhostConfig::default()).unwrap();

        let mut out = Vec::new();
        assert_eq!(links.match_cell(&rb, 0, &mut out), 1);
        assert_eq!(out, vec![0]);
        assert!(links.is_local(3));
        assert!(!links.is_local(4));
    }
}
