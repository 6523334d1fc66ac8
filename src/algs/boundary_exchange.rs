//! Boundary-mesh codec and point-to-point exchange with candidate ranks.
//!
//! Layout after the [`WireHdr`](crate::algs::wire::WireHdr):
//! points (count, xyz, global IDs, owner indices), cells (count, VTK type,
//! point count, owner index, connectivity), point data, cell data.

use std::collections::{BTreeMap, BTreeSet};

use log::debug;

use crate::algs::boundary::BoundaryMesh;
use crate::algs::collective::{exchange_payloads, exchange_sizes_symmetric};
use crate::algs::communicator::{Communicator, GhostCommTags};
use crate::algs::wire::{KIND_BOUNDARY_MESH, WireReader, WireWriter};
use crate::data::mesh::UnstructuredMesh;
use crate::mesh_error::MeshGhostError;
use crate::topology::cell_type::CellType;

pub fn encode_boundary_mesh(b: &BoundaryMesh) -> Vec<u8> {
    let m = &b.mesh;
    let mut w = WireWriter::with_capacity(
        KIND_BOUNDARY_MESH,
        m.num_points() * 40 + m.connectivity_len() * 8 + m.num_cells() * 24,
    );
    w.put_count(m.num_points());
    w.put_f64s(m.points().iter().flat_map(|p| p.iter().copied()));
    w.put_i64s(b.global_ids.iter().copied());
    w.put_indices(b.local_ids.iter().copied());

    w.put_count(m.num_cells());
    for (c, (ct, pts)) in m.cells().enumerate() {
        w.put_u8(ct.vtk_id());
        w.put_count(pts.len());
        w.put_count(b.local_cell_ids[c]);
        w.put_indices(pts.iter().copied());
    }

    w.put_field_data(m.point_data());
    w.put_field_data(m.cell_data());
    w.finish()
}

pub fn decode_boundary_mesh(bytes: &[u8]) -> Result<BoundaryMesh, MeshGhostError> {
    let mut r = WireReader::open(bytes, KIND_BOUNDARY_MESH)?;

    let np = r.get_count()?;
    let coords = r.get_f64s(np.checked_mul(3).ok_or_else(|| {
        MeshGhostError::WireDecode(format!("point count {np} overflows"))
    })?)?;
    let global_ids = r.get_i64s(np)?;
    let local_ids = r.get_indices(np)?;

    let nc = r.get_count()?;
    let mut mesh = UnstructuredMesh::with_capacity(np, nc.min(r.remaining()));
    for xyz in coords.chunks_exact(3) {
        mesh.add_point([xyz[0], xyz[1], xyz[2]]);
    }
    let mut local_cell_ids = Vec::with_capacity(nc.min(r.remaining()));
    for _ in 0..nc {
        let vtk = r.get_u8()?;
        let n = r.get_count()?;
        local_cell_ids.push(r.get_count()?);
        let pts = r.get_indices(n)?;
        let ct = CellType::from_vtk_id(vtk, n)
            .ok_or_else(|| MeshGhostError::WireDecode(format!("unknown cell type {vtk}")))?;
        mesh.add_cell(ct, &pts)?;
    }

    *mesh.point_data_mut() = r.get_field_data()?;
    *mesh.cell_data_mut() = r.get_field_data()?;
    r.finish()?;
    mesh.validate_fields()?;

    Ok(BoundaryMesh {
        mesh,
        global_ids,
        local_ids,
        local_cell_ids,
    })
}

/// Send `local` to every candidate and receive theirs: sizes first, then
/// payloads. Candidates that turn out to have an empty boundary are kept in
/// the result with an empty mesh.
pub fn exchange_boundary_meshes<C: Communicator>(
    local: &BoundaryMesh,
    candidates: &BTreeSet<usize>,
    comm: &C,
    tags: &GhostCommTags,
) -> Result<BTreeMap<usize, BoundaryMesh>, MeshGhostError> {
    if candidates.is_empty() {
        return Ok(BTreeMap::new());
    }
    let payload = encode_boundary_mesh(local);
    let outgoing: BTreeMap<usize, Vec<u8>> = candidates
        .iter()
        .map(|&nbr| (nbr, payload.clone()))
        .collect();
    let send_sizes = candidates.iter().map(|&nbr| (nbr, payload.len())).collect();

    let sizes_in = exchange_sizes_symmetric(&send_sizes, candidates, comm, tags.boundary_sizes)?;
    let raw = exchange_payloads(&outgoing, &sizes_in, comm, tags.boundary)?;

    let mut remote = BTreeMap::new();
    for (nbr, bytes) in raw {
        let b = decode_boundary_mesh(&bytes).map_err(|e| MeshGhostError::CommError {
            neighbor: nbr,
            source: Box::new(e),
        })?;
        debug!(
            "rank {}: boundary of rank {nbr} has {} cells ({} bytes)",
            comm.rank(),
            b.num_cells(),
            bytes.len()
        );
        remote.insert(nbr, b);
    }
    Ok(remote)
}
