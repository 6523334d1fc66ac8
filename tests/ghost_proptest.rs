mod util;
use util::*;

use proptest::prelude::*;
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};

use mesh_ghost::mesh_generation::{structured_box, structured_rect};
use mesh_ghost::prelude::*;

/// Random owner per cell; the first `nranks` cells pin one cell to each rank
/// so no partition is empty.
fn random_owners(num_cells: usize, nranks: usize, seed: u64) -> Vec<usize> {
    let mut rng = SmallRng::seed_from_u64(seed);
    (0..num_cells)
        .map(|c| if c < nranks { c } else { rng.gen_range(0..nranks) })
        .collect()
}

fn check(global: &UnstructuredMesh, owners: &[usize], nranks: usize) -> Result<(), TestCaseError> {
    let out = build_ghosts(global, owners, nranks, &GhostConfig::default().with_check_invariants(true));
    for (rank, (g, links)) in out.iter().enumerate() {
        let keys = ghost_keys(g);
        let got: std::collections::BTreeSet<_> = keys.iter().cloned().collect();
        prop_assert_eq!(got.len(), keys.len(), "duplicate ghost cell on rank {}", rank);
        prop_assert_eq!(got, expected_ghost_keys(global, owners, rank));

        let gids = g.global_ids();
        let unique: std::collections::BTreeSet<_> = gids.iter().collect();
        prop_assert_eq!(unique.len(), gids.len());

        for &nbr in links.neighbors() {
            let other = &out[nbr].1;
            prop_assert_eq!(links.snd_cell_links(nbr).len(), other.rcv_cell_links(rank).len());
            prop_assert_eq!(links.snd_node_links(nbr).len(), other.rcv_node_links(rank).len());
        }
    }
    Ok(())
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    #[test]
    fn random_triangle_partitions(nranks in 2usize..5, seed in any::<u64>()) {
        let global = structured_rect(4, 3, [0.0, 0.0], [1.0, 1.0], true, GID).unwrap();
        let owners = random_owners(global.num_cells(), nranks, seed);
        check(&global, &owners, nranks)?;
    }

    #[test]
    fn random_hex_partitions(nranks in 2usize..4, seed in any::<u64>()) {
        let global = structured_box([3, 2, 2], [0.0; 3], [3.0, 2.0, 2.0], false, GID).unwrap();
        let owners = random_owners(global.num_cells(), nranks, seed);
        check(&global, &owners, nranks)?;
    }
}
