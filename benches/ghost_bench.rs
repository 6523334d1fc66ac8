use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};

use mesh_ghost::algs::submesh::partition_mesh;
use mesh_ghost::mesh_generation::{slab_owners, structured_box};
use mesh_ghost::prelude::*;

const GID: &str = "GlobalID";

fn partitions(n: usize, nranks: usize) -> Vec<UnstructuredMesh> {
    let mut global = structured_box([n, n, n], [0.0; 3], [1.0; 3], true, GID).unwrap();
    let nc = global.num_cells();
    global
        .cell_data_mut()
        .insert(FieldArray::from_vec("pressure", 1, vec![1.0f64; nc]).unwrap());
    let owners = slab_owners(&global, nranks, 0).unwrap();
    partition_mesh(&global, &owners, nranks).unwrap()
}

/// Run `f` once per rank on scoped threads sharing a fresh mailbox.
fn on_ranks(parts: &[UnstructuredMesh], f: impl Fn(&RayonComm, &UnstructuredMesh) + Sync) {
    let comms = RayonComm::world(parts.len());
    std::thread::scope(|s| {
        for (c, m) in comms.iter().zip(parts) {
            let f = &f;
            s.spawn(move || f(c, m));
        }
    });
}

fn bench_build(c: &mut Criterion) {
    let mut group = c.benchmark_group("ghost_build");
    group.sample_size(20);
    for &nranks in &[2usize, 4] {
        let parts = partitions(12, nranks);
        group.bench_with_input(BenchmarkId::from_parameter(nranks), &parts, |b, parts| {
            b.iter(|| {
                on_ranks(parts, |comm, m| {
                    let mut conn = GhostZoneConnectivity::new(comm, GhostConfig::default()).unwrap();
                    conn.register_mesh(m.clone()).unwrap();
                    conn.build_ghost_zone_connectivity().unwrap();
                })
            })
        });
    }
    group.finish();
}

fn bench_update(c: &mut Criterion) {
    let mut group = c.benchmark_group("ghost_update");
    group.sample_size(20);
    for &nranks in &[2usize, 4] {
        let parts = partitions(12, nranks);
        group.bench_with_input(BenchmarkId::from_parameter(nranks), &parts, |b, parts| {
            b.iter(|| {
                on_ranks(parts, |comm, m| {
                    let mut conn = GhostZoneConnectivity::new(comm, GhostConfig::default()).unwrap();
                    conn.register_mesh(m.clone()).unwrap();
                    conn.build_ghost_zone_connectivity().unwrap();
                    for _ in 0..10 {
                        conn.update_ghosts().unwrap();
                    }
                })
            })
        });
    }
    group.finish();
}

criterion_group!(benches, bench_build, bench_update);
criterion_main!(benches);
