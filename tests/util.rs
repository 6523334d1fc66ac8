#![allow(dead_code)]
use std::collections::BTreeSet;

use mesh_ghost::algs::submesh::partition_mesh;
use mesh_ghost::prelude::*;
use mesh_ghost::topology::face_key::FacetTable;

pub const GID: &str = "GlobalID";

/// Run `f` on `n` in-process ranks (one thread each) and collect the results
/// in rank order.
pub fn run_ranks<T, F>(n: usize, f: F) -> Vec<T>
where
    T: Send,
    F: Fn(&RayonComm) -> T + Sync,
{
    let comms = RayonComm::world(n);
    std::thread::scope(|s| {
        let f = &f;
        let handles: Vec<_> = comms.iter().map(|c| s.spawn(move || f(c))).collect();
        handles
            .into_iter()
            .map(|h| h.join().expect("rank panicked"))
            .collect()
    })
}

/// Partition `global` by `owners` and build ghost zones on every rank.
pub fn build_ghosts(
    global: &UnstructuredMesh,
    owners: &[usize],
    nranks: usize,
    config: &GhostConfig,
) -> Vec<(GhostedMesh, CommunicationLinks)> {
    let parts = partition_mesh(global, owners, nranks).unwrap();
    run_ranks(nranks, |comm| {
        let mut conn = GhostZoneConnectivity::new(comm, config.clone()).unwrap();
        conn.register_mesh(parts[comm.rank()].clone()).unwrap();
        conn.build_ghost_zone_connectivity().unwrap();
        let links = conn.links().unwrap().clone();
        (conn.into_ghosted_mesh().unwrap(), links)
    })
}

/// Keys of the global cells that rank `rank` must ghost: every cell owned
/// elsewhere that shares a facet with a cell owned by `rank`.
pub fn expected_ghost_keys(global: &UnstructuredMesh, owners: &[usize], rank: usize) -> BTreeSet<FaceKey> {
    let gids = global.global_ids(GID).unwrap();
    let table = FacetTable::build(global, gids).unwrap();
    let mut out = BTreeSet::new();
    for (_, adj) in table.iter() {
        if let &[a, b] = adj.cells() {
            if owners[a] == rank && owners[b] != rank {
                out.insert(global.cell_key(b, gids));
            }
            if owners[b] == rank && owners[a] != rank {
                out.insert(global.cell_key(a, gids));
            }
        }
    }
    out
}

/// Keys of the ghost cells of `g`, in ghosted order (duplicates kept).
pub fn ghost_keys(g: &GhostedMesh) -> Vec<FaceKey> {
    let gids = g.global_ids();
    (g.num_local_cells()..g.mesh().num_cells())
        .map(|c| g.mesh().cell_key(c, gids))
        .collect()
}

/// Panic if a global point ID or a cell key appears twice.
pub fn assert_no_duplicates(g: &GhostedMesh) {
    let gids = g.global_ids();
    let unique: BTreeSet<_> = gids.iter().collect();
    assert_eq!(unique.len(), gids.len(), "duplicate ghost points");
    let keys: BTreeSet<_> = (0..g.mesh().num_cells())
        .map(|c| g.mesh().cell_key(c, gids))
        .collect();
    assert_eq!(keys.len(), g.mesh().num_cells(), "duplicate ghost cells");
}
