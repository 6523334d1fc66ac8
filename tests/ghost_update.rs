mod util;
use util::*;

use mesh_ghost::algs::submesh::partition_mesh;
use mesh_ghost::mesh_generation::{block_owners, slab_owners, structured_box, structured_rect};
use mesh_ghost::prelude::*;

/// Global mesh with a constant global cell ID array and a value field.
fn tagged_box(dims: [usize; 3], tets: bool) -> UnstructuredMesh {
    let ext = dims.map(|n| n as f64);
    let mut g = structured_box(dims, [0.0; 3], ext, tets, GID).unwrap();
    let nc = g.num_cells();
    let np = g.num_points();
    g.cell_data_mut()
        .insert(FieldArray::from_vec("cell_gid", 1, (0..nc as i64).collect()).unwrap());
    g.cell_data_mut()
        .insert(FieldArray::from_vec("value", 2, vec![0.0f64; 2 * nc]).unwrap());
    g.point_data_mut()
        .insert(FieldArray::from_vec("temp", 1, vec![0.0f32; np]).unwrap());
    g
}

fn set_values(mesh: &mut UnstructuredMesh, step: usize) {
    let cell_gid = mesh.cell_data().get("cell_gid").unwrap().as_slice::<i64>().unwrap().to_vec();
    let values = mesh.cell_data_mut().get_mut("value").unwrap().as_slice_mut::<f64>().unwrap();
    for (c, &gid) in cell_gid.iter().enumerate() {
        values[2 * c] = gid as f64;
        values[2 * c + 1] = step as f64;
    }
    let pgid = mesh.global_ids(GID).unwrap().to_vec();
    let temp = mesh.point_data_mut().get_mut("temp").unwrap().as_slice_mut::<f32>().unwrap();
    for (p, &g) in pgid.iter().enumerate() {
        temp[p] = (g as f32) + step as f32 * 1000.0;
    }
}

fn check_values(g: &GhostedMesh, step: usize) {
    let m = g.mesh();
    let cell_gid = m.cell_data().get("cell_gid").unwrap().as_slice::<i64>().unwrap();
    let values = m.cell_data().get("value").unwrap().as_slice::<f64>().unwrap();
    for c in 0..m.num_cells() {
        assert_eq!(values[2 * c], cell_gid[c] as f64, "cell {c}");
        assert_eq!(values[2 * c + 1], step as f64, "cell {c}");
    }
    let temp = m.point_data().get("temp").unwrap().as_slice::<f32>().unwrap();
    for (p, &gid) in g.global_ids().iter().enumerate() {
        assert_eq!(temp[p], gid as f32 + step as f32 * 1000.0, "point {p}");
    }
    let flags = m.cell_data().get("GHOSTCELL").unwrap().as_slice::<u8>().unwrap();
    for c in 0..m.num_cells() {
        assert_eq!(flags[c] == 1, g.is_ghost_cell(c));
    }
}

#[test]
fn repeated_updates_refresh_values_only() {
    let global = tagged_box([6, 2, 2], false);
    let owners = slab_owners(&global, 3, 0).unwrap();
    let parts = partition_mesh(&global, &owners, 3).unwrap();

    run_ranks(3, |comm| {
        let mut conn = GhostZoneConnectivity::new(comm, GhostConfig::default()).unwrap();
        conn.register_mesh(parts[comm.rank()].clone()).unwrap();
        conn.build_ghost_zone_connectivity().unwrap();

        let before = conn.ghosted_mesh().unwrap().mesh().copy_structure();
        for step in 1..=3 {
            set_values(conn.local_mesh_mut().unwrap(), step);
            conn.update_ghosts().unwrap();
            let g = conn.ghosted_mesh().unwrap();
            check_values(g, step);
            assert_eq!(g.mesh().copy_structure(), before);
        }
    });
}

#[test]
fn tet_blocks_receive_owner_values() {
    let global = tagged_box([4, 4, 2], true);
    let owners = block_owners(&global, [2, 2, 1]).unwrap();
    let parts = partition_mesh(&global, &owners, 4).unwrap();

    let ghosts = run_ranks(4, |comm| {
        let config = GhostConfig::default().with_check_invariants(true);
        let mut conn = GhostZoneConnectivity::new(comm, config).unwrap();
        conn.register_mesh(parts[comm.rank()].clone()).unwrap();
        conn.build_ghost_zone_connectivity().unwrap();
        set_values(conn.local_mesh_mut().unwrap(), 7);
        conn.update_ghosts().unwrap();
        let g = conn.ghosted_mesh().unwrap();
        check_values(g, 7);
        g.num_ghost_cells()
    });
    assert!(ghosts.iter().all(|&n| n > 0));
}

#[test]
fn additive_update_accumulates_contributions() {
    let mut global = structured_rect(4, 1, [0.0, 0.0], [4.0, 1.0], false, GID).unwrap();
    global
        .cell_data_mut()
        .insert(FieldArray::from_vec("w", 1, vec![1.0f64; 4]).unwrap());
    let owners = slab_owners(&global, 2, 0).unwrap();
    let parts = partition_mesh(&global, &owners, 2).unwrap();

    let ghost_w = run_ranks(2, |comm| {
        let config = GhostConfig::default().with_boundary_cell_fields(Vec::<String>::new());
        let mut conn = GhostZoneConnectivity::new(comm, config).unwrap();
        conn.register_mesh(parts[comm.rank()].clone()).unwrap();
        conn.build_ghost_zone_connectivity().unwrap();
        conn.update_ghosts_with::<AddDelta>().unwrap();
        conn.update_ghosts_with::<AddDelta>().unwrap();
        let g = conn.ghosted_mesh().unwrap();
        let w = g.mesh().cell_data().get("w").unwrap().as_slice::<f64>().unwrap();
        w[g.num_local_cells()]
    });
    // ghost slot starts at zero (field not shipped) and gains 1.0 per update
    assert_eq!(ghost_w, vec![2.0, 2.0]);
}

#[test]
fn additive_update_saturates_byte_fields() {
    let mut global = structured_rect(4, 1, [0.0, 0.0], [4.0, 1.0], false, GID).unwrap();
    global
        .cell_data_mut()
        .insert(FieldArray::from_vec("flag", 1, vec![200u8; 4]).unwrap());
    let owners = slab_owners(&global, 2, 0).unwrap();
    let parts = partition_mesh(&global, &owners, 2).unwrap();

    let ghost_flag = run_ranks(2, |comm| {
        let config = GhostConfig::default().with_boundary_cell_fields(Vec::<String>::new());
        let mut conn = GhostZoneConnectivity::new(comm, config).unwrap();
        conn.register_mesh(parts[comm.rank()].clone()).unwrap();
        conn.build_ghost_zone_connectivity().unwrap();
        conn.update_ghosts_with::<AddDelta>().unwrap();
        conn.update_ghosts_with::<AddDelta>().unwrap();
        let g = conn.ghosted_mesh().unwrap();
        let flag = g.mesh().cell_data().get("flag").unwrap().as_slice::<u8>().unwrap();
        (flag[g.num_local_cells() - 1], flag[g.num_local_cells()])
    });
    // 0 + 200 + 200 clamps at u8::MAX; owned cells keep their value
    assert_eq!(ghost_flag, vec![(200, 255), (200, 255)]);
}

#[test]
fn duplicate_global_ids_fail_the_build_on_every_rank() {
    let global = tagged_box([4, 1, 1], false);
    let owners = slab_owners(&global, 2, 0).unwrap();
    let parts = partition_mesh(&global, &owners, 2).unwrap();

    let out = run_ranks(2, |comm| {
        let mut conn = GhostZoneConnectivity::new(comm, GhostConfig::default()).unwrap();
        conn.register_mesh(parts[comm.rank()].clone()).unwrap();
        if comm.rank() == 1 {
            let mesh = conn.local_mesh_mut().unwrap();
            let gids = mesh.point_data_mut().get_mut(GID).unwrap().as_slice_mut::<i64>().unwrap();
            gids[1] = gids[0];
        }
        conn.build_ghost_zone_connectivity()
    });
    assert!(matches!(out[1], Err(MeshGhostError::InvalidGlobalIds { .. })));
    match &out[0] {
        Err(MeshGhostError::PeerFailed { ranks }) => assert_eq!(ranks, &vec![1]),
        other => panic!("rank 0: {other:?}"),
    }
}

#[test]
fn changed_topology_fails_the_update_on_every_rank() {
    let global = tagged_box([6, 1, 1], false);
    let owners = slab_owners(&global, 3, 0).unwrap();
    let parts = partition_mesh(&global, &owners, 3).unwrap();

    let out = run_ranks(3, |comm| {
        let mut conn = GhostZoneConnectivity::new(comm, GhostConfig::default()).unwrap();
        conn.register_mesh(parts[comm.rank()].clone()).unwrap();
        conn.build_ghost_zone_connectivity().unwrap();
        conn.update_ghosts().unwrap();
        if comm.rank() == 1 {
            conn.local_mesh_mut().unwrap().add_point([0.5, 0.5, 9.0]);
        }
        conn.update_ghosts()
    });
    assert!(matches!(out[1], Err(MeshGhostError::TopologyChanged(_))));
    for r in [0, 2] {
        match &out[r] {
            Err(MeshGhostError::PeerFailed { ranks }) => assert_eq!(ranks, &vec![1]),
            other => panic!("rank {r}: {other:?}"),
        }
    }
}

#[test]
fn one_rank_world_is_the_local_mesh() {
    let global = tagged_box([2, 2, 2], false);
    let out = run_ranks(1, |comm| {
        generate_ghost_data(global.clone(), comm, GhostConfig::default()).unwrap()
    });
    assert_eq!(out[0].num_cells(), global.num_cells());
    assert_eq!(out[0].num_points(), global.num_points());
}

#[test]
fn generate_ghost_data_returns_marked_mesh() {
    let global = tagged_box([4, 1, 1], false);
    let owners = slab_owners(&global, 2, 0).unwrap();
    let parts = partition_mesh(&global, &owners, 2).unwrap();
    let out = run_ranks(2, |comm| {
        generate_ghost_data(parts[comm.rank()].clone(), comm, GhostConfig::default()).unwrap()
    });
    for m in out {
        let flags = m.cell_data().get("GHOSTCELL").unwrap().as_slice::<u8>().unwrap();
        assert_eq!(flags, &[0, 0, 1]);
    }
}
