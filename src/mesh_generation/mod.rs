//! Structured mesh generators with global point IDs, plus simple owner maps.
//!
//! Generated meshes number points lexicographically (`x` fastest) and store
//! that index as the global ID. Owner maps assign each cell to a part by its
//! centroid, which is enough to produce conforming partitions for tests and
//! benchmarks.

use crate::data::bounds::BoundingBox;
use crate::data::mesh::UnstructuredMesh;
use crate::mesh_error::MeshGhostError;
use crate::topology::cell_type::CellType;
use crate::topology::face_key::GlobalId;

fn invalid_geometry(message: impl Into<String>) -> MeshGhostError {
    MeshGhostError::InvalidGeometry(message.into())
}

/// Kuhn subdivision of a hex (VTK point order) into six tets sharing the
/// 0–6 diagonal; neighbouring hexes split their shared faces identically.
const KUHN_TETS: [[usize; 4]; 6] = [
    [0, 1, 2, 6],
    [0, 1, 5, 6],
    [0, 3, 2, 6],
    [0, 3, 7, 6],
    [0, 4, 5, 6],
    [0, 4, 7, 6],
];

fn check_extent(min: &[f64], max: &[f64], counts: &[usize]) -> Result<(), MeshGhostError> {
    for (d, &n) in counts.iter().enumerate() {
        if n == 0 {
            return Err(invalid_geometry(format!("cell count along axis {d} must be non-zero")));
        }
        if !(max[d] > min[d]) {
            return Err(invalid_geometry(format!(
                "axis {d}: max {} must exceed min {}",
                max[d], min[d]
            )));
        }
    }
    Ok(())
}

/// `nx × ny` quads on `[min, max]`, or `2·nx·ny` triangles if `triangles`.
pub fn structured_rect(
    nx: usize,
    ny: usize,
    min: [f64; 2],
    max: [f64; 2],
    triangles: bool,
    global_id_field: &str,
) -> Result<UnstructuredMesh, MeshGhostError> {
    check_extent(&min, &max, &[nx, ny])?;
    let (hx, hy) = ((max[0] - min[0]) / nx as f64, (max[1] - min[1]) / ny as f64);
    let cells = if triangles { 2 * nx * ny } else { nx * ny };
    let mut mesh = UnstructuredMesh::with_capacity((nx + 1) * (ny + 1), cells);
    for j in 0..=ny {
        for i in 0..=nx {
            mesh.add_point([min[0] + i as f64 * hx, min[1] + j as f64 * hy, 0.0]);
        }
    }
    let p = |i: usize, j: usize| i + (nx + 1) * j;
    for j in 0..ny {
        for i in 0..nx {
            let q = [p(i, j), p(i + 1, j), p(i + 1, j + 1), p(i, j + 1)];
            if triangles {
                mesh.add_cell(CellType::Triangle, &[q[0], q[1], q[2]])?;
                mesh.add_cell(CellType::Triangle, &[q[0], q[2], q[3]])?;
            } else {
                mesh.add_cell(CellType::Quadrilateral, &q)?;
            }
        }
    }
    let ids: Vec<GlobalId> = (0..mesh.num_points() as GlobalId).collect();
    mesh.set_global_ids(global_id_field, ids)?;
    Ok(mesh)
}

/// `nx × ny × nz` hexes on `[min, max]`, or six Kuhn tets per hex if `tets`.
pub fn structured_box(
    dims: [usize; 3],
    min: [f64; 3],
    max: [f64; 3],
    tets: bool,
    global_id_field: &str,
) -> Result<UnstructuredMesh, MeshGhostError> {
    check_extent(&min, &max, &dims)?;
    let [nx, ny, nz] = dims;
    let h: Vec<f64> = (0..3).map(|d| (max[d] - min[d]) / dims[d] as f64).collect();
    let hexes = nx * ny * nz;
    let mut mesh = UnstructuredMesh::with_capacity(
        (nx + 1) * (ny + 1) * (nz + 1),
        if tets { 6 * hexes } else { hexes },
    );
    for k in 0..=nz {
        for j in 0..=ny {
            for i in 0..=nx {
                mesh.add_point([
                    min[0] + i as f64 * h[0],
                    min[1] + j as f64 * h[1],
                    min[2] + k as f64 * h[2],
                ]);
            }
        }
    }
    let p = |i: usize, j: usize, k: usize| i + (nx + 1) * (j + (ny + 1) * k);
    for k in 0..nz {
        for j in 0..ny {
            for i in 0..nx {
                let hex = [
                    p(i, j, k),
                    p(i + 1, j, k),
                    p(i + 1, j + 1, k),
                    p(i, j + 1, k),
                    p(i, j, k + 1),
                    p(i + 1, j, k + 1),
                    p(i + 1, j + 1, k + 1),
                    p(i, j + 1, k + 1),
                ];
                if tets {
                    for t in &KUHN_TETS {
                        mesh.add_cell(CellType::Tetrahedron, &t.map(|l| hex[l]))?;
                    }
                } else {
                    mesh.add_cell(CellType::Hexahedron, &hex)?;
                }
            }
        }
    }
    let ids: Vec<GlobalId> = (0..mesh.num_points() as GlobalId).collect();
    mesh.set_global_ids(global_id_field, ids)?;
    Ok(mesh)
}

fn centroid(mesh: &UnstructuredMesh, c: usize) -> [f64; 3] {
    let pts = mesh.cell_points(c);
    let mut x = [0.0; 3];
    for &p in pts {
        let q = mesh.point(p);
        for d in 0..3 {
            x[d] += q[d];
        }
    }
    x.map(|v| v / pts.len() as f64)
}

fn bin(v: f64, lo: f64, hi: f64, n: usize) -> usize {
    if n <= 1 || hi <= lo {
        return 0;
    }
    (((v - lo) / (hi - lo) * n as f64).floor().max(0.0) as usize).min(n - 1)
}

fn owner_bounds(mesh: &UnstructuredMesh) -> Result<BoundingBox, MeshGhostError> {
    let b = mesh.bounds();
    if !b.is_valid() {
        return Err(invalid_geometry("mesh has no points"));
    }
    Ok(b)
}

/// Cut along `axis` into `num_slabs` slabs of equal width.
pub fn slab_owners(
    mesh: &UnstructuredMesh,
    num_slabs: usize,
    axis: usize,
) -> Result<Vec<usize>, MeshGhostError> {
    if num_slabs == 0 || axis > 2 {
        return Err(invalid_geometry(format!(
            "need at least one slab along axis 0..=2, got {num_slabs} along {axis}"
        )));
    }
    let b = owner_bounds(mesh)?;
    Ok((0..mesh.num_cells())
        .map(|c| bin(centroid(mesh, c)[axis], b.min[axis], b.max[axis], num_slabs))
        .collect())
}

/// Cut into `parts[0] × parts[1] × parts[2]` blocks; part index is
/// `ix + px * (iy + py * iz)`.
pub fn block_owners(mesh: &UnstructuredMesh, parts: [usize; 3]) -> Result<Vec<usize>, MeshGhostError> {
    if parts.contains(&0) {
        return Err(invalid_geometry(format!("block counts must be non-zero, got {parts:?}")));
    }
    let b = owner_bounds(mesh)?;
    Ok((0..mesh.num_cells())
        .map(|c| {
            let x = centroid(mesh, c);
            let i: Vec<usize> = (0..3).map(|d| bin(x[d], b.min[d], b.max[d], parts[d])).collect();
            i[0] + parts[0] * (i[1] + parts[1] * i[2])
        })
        .collect())
}
