//! Bounding-box all-gather and collision test selecting candidate ranks.

use std::collections::BTreeSet;

use log::debug;

use crate::algs::collective::all_gather_f64;
use crate::algs::communicator::{CommTag, Communicator};
use crate::data::bounds::BoundingBox;
use crate::mesh_error::MeshGhostError;

/// All-gather every rank's box; the result is indexed by rank.
pub fn exchange_bounds<C: Communicator>(
    local: &BoundingBox,
    comm: &C,
    tag: CommTag,
) -> Result<Vec<BoundingBox>, MeshGhostError> {
    let gathered = all_gather_f64(&local.to_array(), comm, tag)?;
    gathered
        .into_iter()
        .enumerate()
        .map(|(rank, v)| {
            let arr: [f64; 6] = v.as_slice().try_into().map_err(|_| MeshGhostError::CommError {
                neighbor: rank,
                source: format!("bounds record has {} values, expected 6", v.len()).into(),
            })?;
            Ok(BoundingBox::from_array(&arr))
        })
        .collect()
}

/// Ranks other than `me` whose box touches `local` grown by `tolerance`.
///
/// The test is symmetric, so two ranks always agree on being candidates of
/// each other. Empty boxes collide with nothing.
pub fn candidate_ranks(
    me: usize,
    local: &BoundingBox,
    all: &[BoundingBox],
    tolerance: f64,
) -> BTreeSet<usize> {
    let mut grown = *local;
    grown.inflate(tolerance);
    let candidates: BTreeSet<usize> = all
        .iter()
        .enumerate()
        .filter(|&(r, b)| r != me && grown.intersects(b))
        .map(|(r, _)| r)
        .collect();
    debug!("rank {me}: {} candidate ranks {:?}", candidates.len(), candidates);
    candidates
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::algs::communicator::RayonComm;

    fn unit_box_at(x: f64) -> BoundingBox {
        BoundingBox::from_points(&[[x, 0.0, 0.0], [x + 1.0, 1.0, 1.0]])
    }

    #[test]
    fn neighbours_touching_at_a_face_are_candidates() {
        let all = vec![unit_box_at(0.0), unit_box_at(1.0), unit_box_at(2.0), BoundingBox::empty()];
        let c: Vec<_> = candidate_ranks(1, &all[1], &all, 0.0).into_iter().collect();
        assert_eq!(c, vec![0, 2]);
        let c0: Vec<_> = candidate_ranks(0, &all[0], &all, 0.0).into_iter().collect();
        assert_eq!(c0, vec![1]);
        assert!(candidate_ranks(3, &all[3], &all, 1.0).is_empty());
    }

    #[test]
    fn tolerance_bridges_small_gaps() {
        let all = vec![unit_box_at(0.0), unit_box_at(1.1)];
        assert!(candidate_ranks(0, &all[0], &all, 0.0).is_empty());
        assert_eq!(candidate_ranks(0, &all[0], &all, 0.2).len(), 1);
    }

    #[test]
    fn bounds_travel_between_threads() {
        let comms = RayonComm::world(3);
        let out: Vec<Vec<BoundingBox>> = std::thread::scope(|s| {
            let hs: Vec<_> = comms
                .iter()
                .map(|c| s.spawn(move || exchange_bounds(&unit_box_at(c.rank() as f64), c, CommTag::new(77)).unwrap()))
                .collect();
            hs.into_iter().map(|h| h.join().unwrap()).collect()
        });
        for all in out {
            assert_eq!(all[2], unit_box_at(2.0));
            assert_eq!(all[0], unit_box_at(0.0));
        }
    }
}
