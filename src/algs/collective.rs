//! Collective helpers built on point-to-point [`Communicator`] calls.
//!
//! Each helper posts all receives, then all sends, waits for every receive
//! and finally drains every send handle. Errors are collected while waiting
//! and reported only after all handles have completed, so a failing neighbour
//! never leaves a request in flight.

use std::collections::{BTreeMap, BTreeSet};

use crate::algs::communicator::{CommTag, Communicator, Wait};
use crate::algs::wire::{WireCount, cast_slice, cast_slice_mut};
use crate::mesh_error::MeshGhostError;

fn comm_err(neighbor: usize, msg: String) -> MeshGhostError {
    MeshGhostError::CommError {
        neighbor,
        source: msg.into(),
    }
}

/// Exchange one count with every rank in `neighbors` (symmetric pattern).
///
/// Ranks missing from `send_sizes` are sent 0. Returns `nbr → count`.
pub fn exchange_sizes_symmetric<C: Communicator>(
    send_sizes: &BTreeMap<usize, usize>,
    neighbors: &BTreeSet<usize>,
    comm: &C,
    tag: CommTag,
) -> Result<BTreeMap<usize, usize>, MeshGhostError> {
    // 1) post all receives
    let mut recv_size = Vec::with_capacity(neighbors.len());
    for &nbr in neighbors {
        let mut cnt = WireCount::new(0);
        let h = comm.irecv(
            nbr,
            tag.as_u16(),
            cast_slice_mut(std::slice::from_mut(&mut cnt)),
        );
        recv_size.push((nbr, h));
    }

    // 2) post all sends
    let mut pending_sends = Vec::with_capacity(neighbors.len());
    for &nbr in neighbors {
        let count = WireCount::new(send_sizes.get(&nbr).copied().unwrap_or(0));
        pending_sends.push(comm.isend(
            nbr,
            tag.as_u16(),
            cast_slice(std::slice::from_ref(&count)),
        ));
    }

    // 3) wait for all recvs, collect counts (but do not early-return)
    let mut sizes_in = BTreeMap::new();
    let mut maybe_err = None;
    for (nbr, h) in recv_size {
        match h.wait() {
            Some(data) if data.len() == size_of::<WireCount>() => {
                let mut cnt = WireCount::new(0);
                cast_slice_mut(std::slice::from_mut(&mut cnt)).copy_from_slice(&data);
                sizes_in.insert(nbr, cnt.get());
            }
            Some(data) if maybe_err.is_none() => {
                maybe_err = Some(comm_err(
                    nbr,
                    format!(
                        "expected {} bytes for size header, got {}",
                        size_of::<WireCount>(),
                        data.len()
                    ),
                ));
            }
            None if maybe_err.is_none() => {
                maybe_err = Some(comm_err(nbr, format!("failed to receive size from rank {nbr}")));
            }
            _ => {}
        }
    }

    // 4) always drain all send handles before returning
    for send in pending_sends {
        let _ = send.wait();
    }

    match maybe_err {
        Some(err) => Err(err),
        None => Ok(sizes_in),
    }
}

/// Exchange byte payloads whose sizes are already known on both sides.
///
/// `outgoing[nbr]` is sent to `nbr`; `incoming_sizes[nbr]` bytes are expected
/// back. Zero-sized entries are skipped on both sides.
pub fn exchange_payloads<C: Communicator>(
    outgoing: &BTreeMap<usize, Vec<u8>>,
    incoming_sizes: &BTreeMap<usize, usize>,
    comm: &C,
    tag: CommTag,
) -> Result<BTreeMap<usize, Vec<u8>>, MeshGhostError> {
    let mut pending_recvs = Vec::with_capacity(incoming_sizes.len());
    for (&nbr, &len) in incoming_sizes.iter().filter(|&(_, &len)| len > 0) {
        let mut buf = vec![0u8; len];
        pending_recvs.push((nbr, len, comm.irecv(nbr, tag.as_u16(), &mut buf)));
    }

    let mut pending_sends = Vec::with_capacity(outgoing.len());
    for (&nbr, payload) in outgoing.iter().filter(|(_, p)| !p.is_empty()) {
        pending_sends.push(comm.isend(nbr, tag.as_u16(), payload));
    }

    let mut received = BTreeMap::new();
    let mut maybe_err = None;
    for (nbr, len, h) in pending_recvs {
        match h.wait() {
            Some(data) if data.len() == len => {
                received.insert(nbr, data);
            }
            Some(data) if maybe_err.is_none() => {
                maybe_err = Some(comm_err(
                    nbr,
                    format!("expected {len} payload bytes, got {}", data.len()),
                ));
            }
            None if maybe_err.is_none() => {
                maybe_err = Some(comm_err(nbr, format!("failed to receive payload from rank {nbr}")));
            }
            _ => {}
        }
    }

    for send in pending_sends {
        let _ = send.wait();
    }

    match maybe_err {
        Some(err) => Err(err),
        None => Ok(received),
    }
}

/// Every rank contributes `local` (same length everywhere); the result is
/// indexed by rank.
pub fn all_gather_f64<C: Communicator>(
    local: &[f64],
    comm: &C,
    tag: CommTag,
) -> Result<Vec<Vec<f64>>, MeshGhostError> {
    let (me, size) = (comm.rank(), comm.size());
    if me >= size.max(1) {
        return Err(MeshGhostError::InvalidRank { rank: me, size });
    }
    let mut out = vec![Vec::new(); size.max(1)];
    out[me] = local.to_vec();
    if comm.is_serial() {
        return Ok(out);
    }

    let bytes: Vec<u8> = local.iter().flat_map(|v| v.to_le_bytes()).collect();
    let peers: Vec<usize> = (0..size).filter(|&r| r != me).collect();

    let mut pending_recvs = Vec::with_capacity(peers.len());
    for &peer in &peers {
        let mut buf = vec![0u8; bytes.len()];
        pending_recvs.push((peer, comm.irecv(peer, tag.as_u16(), &mut buf)));
    }
    let pending_sends: Vec<_> = peers
        .iter()
        .map(|&peer| comm.isend(peer, tag.as_u16(), &bytes))
        .collect();

    let mut maybe_err = None;
    for (peer, h) in pending_recvs {
        match h.wait() {
            Some(data) if data.len() == bytes.len() => {
                out[peer] = data
                    .chunks_exact(8)
                    .map(|c| {
                        let mut b = [0u8; 8];
                        b.copy_from_slice(c);
                        f64::from_le_bytes(b)
                    })
                    .collect();
            }
            other if maybe_err.is_none() => {
                let got = other.map_or(0, |d| d.len());
                maybe_err = Some(comm_err(
                    peer,
                    format!("all-gather expected {} bytes, got {got}", bytes.len()),
                ));
            }
            _ => {}
        }
    }
    for send in pending_sends {
        let _ = send.wait();
    }

    match maybe_err {
        Some(err) => Err(err),
        None => Ok(out),
    }
}

/// All-gather one success flag per rank and return the ranks that failed.
///
/// Every rank must call this the same number of times, whether or not its
/// own step succeeded, so nobody is left waiting on a rank that bailed out.
pub fn failed_ranks<C: Communicator>(
    ok: bool,
    comm: &C,
    tag: CommTag,
) -> Result<Vec<usize>, MeshGhostError> {
    let flags = all_gather_f64(&[if ok { 0.0 } else { 1.0 }], comm, tag)?;
    Ok(flags
        .iter()
        .enumerate()
        .filter(|(_, f)| f.first().is_some_and(|&v| v != 0.0))
        .map(|(r, _)| r)
        .collect())
}

/// Settle a local step collectively: the rank's own error wins, otherwise a
/// failure anywhere else becomes [`MeshGhostError::PeerFailed`].
pub fn agree<T, C: Communicator>(
    step: Result<T, MeshGhostError>,
    comm: &C,
    tag: CommTag,
) -> Result<T, MeshGhostError> {
    let failed = failed_ranks(step.is_ok(), comm, tag)?;
    match step {
        Err(e) => Err(e),
        Ok(_) if !failed.is_empty() => Err(MeshGhostError::PeerFailed { ranks: failed }),
        Ok(v) => Ok(v),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::algs::communicator::{NoComm, RayonComm};
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, Ordering};

    #[derive(Clone)]
    struct DropFlag(Arc<AtomicBool>);

    struct FlagHandle {
        data: Option<Vec<u8>>,
        flag: DropFlag,
    }

    impl Wait for FlagHandle {
        fn wait(self) -> Option<Vec<u8>> {
            self.flag.0.store(true, Ordering::SeqCst);
            self.data
        }
    }

    /// Receives return a short message; sends record that they were waited on.
    struct ShortComm {
        sent_waited: DropFlag,
    }

    impl Communicator for ShortComm {
        type SendHandle = FlagHandle;
        type RecvHandle = FlagHandle;

        fn isend(&self, _peer: usize, _tag: u16, _buf: &[u8]) -> FlagHandle {
            FlagHandle {
                data: None,
                flag: self.sent_waited.clone(),
            }
        }
        fn irecv(&self, _peer: usize, _tag: u16, _buf: &mut [u8]) -> FlagHandle {
            FlagHandle {
                data: Some(vec![1, 2, 3]),
                flag: DropFlag(Arc::new(AtomicBool::new(false))),
            }
        }
        fn rank(&self) -> usize {
            0
        }
        fn size(&self) -> usize {
            2
        }
        fn barrier(&self) {}
    }

    #[test]
    fn size_error_still_drains_sends() {
        let flag = DropFlag(Arc::new(AtomicBool::new(false)));
        let comm = ShortComm {
            sent_waited: flag.clone(),
        };
        let nbrs: BTreeSet<usize> = [1].into();
        let err = exchange_sizes_symmetric(&BTreeMap::new(), &nbrs, &comm, CommTag::new(5)).unwrap_err();
        assert!(matches!(err, MeshGhostError::CommError { neighbor: 1, .. }));
        assert!(flag.0.load(Ordering::SeqCst));
    }

    #[test]
    fn payload_length_mismatch_is_reported() {
        let flag = DropFlag(Arc::new(AtomicBool::new(false)));
        let comm = ShortComm {
            sent_waited: flag.clone(),
        };
        let outgoing: BTreeMap<usize, Vec<u8>> = [(1, vec![0u8; 4])].into();
        let sizes: BTreeMap<usize, usize> = [(1, 8)].into();
        assert!(exchange_payloads(&outgoing, &sizes, &comm, CommTag::new(6)).is_err());
        assert!(flag.0.load(Ordering::SeqCst));
    }

    #[test]
    fn three_ranks_exchange_sizes_and_payloads() {
        let comms = RayonComm::world(3);
        let tag = CommTag::new(40);
        let results: Vec<_> = std::thread::scope(|s| {
            let hs: Vec<_> = comms
                .iter()
                .map(|c| {
                    s.spawn(move || {
                        let me = c.rank();
                        let nbrs: BTreeSet<usize> = (0..3).filter(|&r| r != me).collect();
                        let outgoing: BTreeMap<usize, Vec<u8>> =
                            nbrs.iter().map(|&n| (n, vec![me as u8; me + n + 1])).collect();
                        let sizes: BTreeMap<usize, usize> =
                            outgoing.iter().map(|(&n, p)| (n, p.len())).collect();
                        let incoming = exchange_sizes_symmetric(&sizes, &nbrs, c, tag).unwrap();
                        exchange_payloads(&outgoing, &incoming, c, tag.offset(1)).unwrap()
                    })
                })
                .collect();
            hs.into_iter().map(|h| h.join().unwrap()).collect()
        });
        assert_eq!(results[0][&2], vec![2u8; 3]);
        assert_eq!(results[2][&1], vec![1u8; 4]);
        assert_eq!(results[1].len(), 2);
    }

    #[test]
    fn all_gather_collects_every_rank() {
        let comms = RayonComm::world(4);
        let gathered: Vec<_> = std::thread::scope(|s| {
            let hs: Vec<_> = comms
                .iter()
                .map(|c| s.spawn(move || all_gather_f64(&[c.rank() as f64, -1.0], c, CommTag::new(9)).unwrap()))
                .collect();
            hs.into_iter().map(|h| h.join().unwrap()).collect()
        });
        for g in gathered {
            assert_eq!(g.len(), 4);
            assert_eq!(g[3], vec![3.0, -1.0]);
        }
        assert_eq!(all_gather_f64(&[1.0], &NoComm, CommTag::new(1)).unwrap(), vec![vec![1.0]]);
    }

    #[test]
    fn agree_reports_the_failing_rank_everywhere() {
        let comms = RayonComm::world(3);
        let results: Vec<Result<usize, MeshGhostError>> = std::thread::scope(|s| {
            let hs: Vec<_> = comms
                .iter()
                .map(|c| {
                    s.spawn(move || {
                        let step = if c.rank() == 1 {
                            Err(MeshGhostError::InvalidGeometry("bad partition".into()))
                        } else {
                            Ok(c.rank())
                        };
                        agree(step, c, CommTag::new(11))
                    })
                })
                .collect();
            hs.into_iter().map(|h| h.join().unwrap()).collect()
        });
        assert!(matches!(results[1], Err(MeshGhostError::InvalidGeometry(_))));
        for r in [0, 2] {
            match &results[r] {
                Err(MeshGhostError::PeerFailed { ranks }) => assert_eq!(ranks, &vec![1]),
                other => panic!("rank {r}: {other:?}"),
            }
        }
        assert_eq!(agree(Ok(5), &NoComm, CommTag::new(1)).unwrap(), 5);
    }
}
