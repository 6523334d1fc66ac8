//! Submesh extraction: cut a global mesh into per-rank partitions.
//!
//! Each partition keeps its cells in global order and renumbers the points it
//! references in first-use order. Point and cell data (including the global-ID
//! array) are carried over, so every partition of a conforming mesh is itself
//! ready for ghost-zone construction.

use crate::data::mesh::UnstructuredMesh;
use crate::mesh_error::MeshGhostError;
use crate::overlap::perf::{FastMap, map_with_capacity};

fn check_owners(global: &UnstructuredMesh, owners: &[usize]) -> Result<(), MeshGhostError> {
    if owners.len() != global.num_cells() {
        return Err(MeshGhostError::InvalidGeometry(format!(
            "{} owners for {} cells",
            owners.len(),
            global.num_cells()
        )));
    }
    Ok(())
}

/// The cells of `global` owned by `rank`, with their points and data.
pub fn extract_submesh(
    global: &UnstructuredMesh,
    owners: &[usize],
    rank: usize,
) -> Result<UnstructuredMesh, MeshGhostError> {
    check_owners(global, owners)?;
    let cells: Vec<usize> = (0..global.num_cells()).filter(|&c| owners[c] == rank).collect();

    let mut point_map: FastMap<usize, usize> = map_with_capacity(cells.len() * 2);
    let mut points = Vec::new();
    let mut sub = UnstructuredMesh::with_capacity(cells.len() * 2, cells.len());
    let mut conn = Vec::with_capacity(8);
    for &c in &cells {
        conn.clear();
        for &p in global.cell_points(c) {
            let q = *point_map.entry(p).or_insert_with(|| {
                points.push(p);
                sub.add_point(global.point(p))
            });
            conn.push(q);
        }
        sub.add_cell(global.cell_type(c), &conn)?;
    }

    for a in global.point_data() {
        sub.point_data_mut().insert(a.gather(&points)?);
    }
    for a in global.cell_data() {
        sub.cell_data_mut().insert(a.gather(&cells)?);
    }
    Ok(sub)
}

/// One submesh per part `0..num_parts`.
pub fn partition_mesh(
    global: &UnstructuredMesh,
    owners: &[usize],
    num_parts: usize,
) -> Result<Vec<UnstructuredMesh>, MeshGhostError> {
    check_owners(global, owners)?;
    if let Some(&bad) = owners.iter().find(|&&o| o >= num_parts) {
        return Err(MeshGhostError::InvalidRank {
            rank: bad,
            size: num_parts,
        });
    }
    (0..num_parts)
        .map(|r| extract_submesh(global, owners, r))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::field::FieldArray;
    use crate::mesh_generation::structured_rect;

    #[test]
    fn parts_cover_every_cell_once() {
        let mut g = structured_rect(3, 2, [0.0, 0.0], [3.0, 2.0], true, "GlobalID").unwrap();
        let n = g.num_cells();
        g.cell_data_mut()
            .insert(FieldArray::from_vec("id", 1, (0..n as i64).collect()).unwrap());
        let owners: Vec<usize> = (0..n).map(|c| c % 3).collect();
        let parts = partition_mesh(&g, &owners, 3).unwrap();
        let mut ids: Vec<i64> = parts
            .iter()
            .flat_map(|m| m.cell_data().get("id").unwrap().as_slice::<i64>().unwrap().to_vec())
            .collect();
        ids.sort_unstable();
        assert_eq!(ids, (0..n as i64).collect::<Vec<_>>());
        for m in &parts {
            assert!(m.validate_fields().is_ok());
            assert_eq!(m.global_ids("GlobalID").unwrap().len(), m.num_points());
        }
    }

    #[test]
    fn bad_owner_arrays_are_rejected() {
        let g = structured_rect(2, 2, [0.0, 0.0], [1.0, 1.0], false, "GlobalID").unwrap();
        assert!(extract_submesh(&g, &[0, 1], 0).is_err());
        assert!(matches!(
            partition_mesh(&g, &[0, 0, 0, 4], 2),
            Err(MeshGhostError::InvalidRank { rank: 4, size: 2 })
        ));
    }
}
