use std::collections::{BTreeMap, BTreeSet};

use mesh_ghost::algs::collective::{exchange_payloads, exchange_sizes_symmetric};
use mesh_ghost::algs::communicator::{CommTag, Communicator, NoComm, RayonComm, Wait};
use serial_test::serial;

#[test]
fn zero_neighbors_symmetric() {
    let sizes: BTreeMap<usize, usize> = BTreeMap::new();
    let neighbors: BTreeSet<usize> = BTreeSet::new();
    let res = exchange_sizes_symmetric(&sizes, &neighbors, &NoComm, CommTag::new(0x11));
    assert!(res.unwrap().is_empty());
}

#[test]
fn zero_neighbors_payloads() {
    let res = exchange_payloads(&BTreeMap::new(), &BTreeMap::new(), &NoComm, CommTag::new(0x13));
    assert!(res.unwrap().is_empty());
}

#[test]
#[serial]
fn mismatch_drain() {
    let tag = CommTag::new(0x12);
    let c0 = RayonComm::new(0, 3);
    let c1 = RayonComm::new(1, 3);
    let c2 = RayonComm::new(2, 3);

    // Neighbor 1 sends a malformed count (3 bytes)
    let _ = c1.isend(0, tag.as_u16(), &[1, 2, 3]);
    let mut r1 = [0u8; 8];
    let h1 = c1.irecv(0, tag.as_u16(), &mut r1);

    // Neighbor 2 sends a correct 8-byte count
    let _ = c2.isend(0, tag.as_u16(), &[0; 8]);
    let mut r2 = [0u8; 8];
    let h2 = c2.irecv(0, tag.as_u16(), &mut r2);

    let sizes: BTreeMap<usize, usize> = BTreeMap::new();
    let neighbors: BTreeSet<usize> = [1, 2].into_iter().collect();
    let res = exchange_sizes_symmetric(&sizes, &neighbors, &c0, tag);
    assert!(res.is_err());

    // Our sends to both neighbors still went out
    assert_eq!(h1.wait().unwrap().len(), 8);
    assert_eq!(h2.wait().unwrap().len(), 8);
}

#[test]
fn sizes_then_payloads_between_threads() {
    let comms = RayonComm::world(3);
    let tag = CommTag::new(0x20);
    let results: Vec<_> = std::thread::scope(|s| {
        let hs: Vec<_> = comms
            .iter()
            .map(|c| {
                s.spawn(move || {
                    let me = c.rank();
                    let neighbors: BTreeSet<usize> = (0..3).filter(|&r| r != me).collect();
                    // rank r sends r+1 copies of its rank to everybody
                    let outgoing: BTreeMap<usize, Vec<u8>> =
                        neighbors.iter().map(|&n| (n, vec![me as u8; me + 1])).collect();
                    let sizes: BTreeMap<usize, usize> =
                        outgoing.iter().map(|(&n, b)| (n, b.len())).collect();
                    let incoming = exchange_sizes_symmetric(&sizes, &neighbors, c, tag).unwrap();
                    exchange_payloads(&outgoing, &incoming, c, tag.offset(1)).unwrap()
                })
            })
            .collect();
        hs.into_iter().map(|h| h.join().unwrap()).collect()
    });
    for (me, got) in results.iter().enumerate() {
        for (&from, bytes) in got {
            assert_ne!(from, me);
            assert_eq!(bytes, &vec![from as u8; from + 1]);
        }
        assert_eq!(got.len(), 2);
    }
}

#[test]
fn commtag_round_trip() {
    let val = 0xABCD;
    let tag = CommTag::new(val);
    assert_eq!(tag.as_u16(), val);
}
