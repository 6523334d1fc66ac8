//! Repeated ghost refresh over recorded communication links.
//!
//! One update is: copy local values into the ghosted mesh, pack the values at
//! the send links of every neighbour, exchange packets, and fuse the received
//! tuples into their target ghost slots. Topology is never touched.
//!
//! Packet sizes are exchanged once per neighbour and kept in [`UpdateSizes`].
//! Later updates post receives of the remembered size directly. A packet that
//! changed size (a field was added, say) is announced by a resize control
//! message padded to the old size, followed by the packet itself on the same
//! tag. A rank whose local step failed still sends an abort message to every
//! neighbour, so peers fail with [`MeshGhostError::PeerFailed`] instead of
//! waiting forever.

use std::collections::{BTreeMap, BTreeSet};

use log::{debug, warn};

use crate::algs::collective::{exchange_payloads, exchange_sizes_symmetric};
use crate::algs::communicator::{CommTag, Communicator, GhostCommTags, Wait};
use crate::algs::ghost_builder::GhostedMesh;
use crate::algs::wire::{
    KIND_GHOST_UPDATE, KIND_UPDATE_CONTROL, WireCount, WireHdr, WireReader, WireWriter, peek_kind,
};
use crate::config::GhostConfig;
use crate::data::field::{FieldArray, FieldData, ScalarType};
use crate::data::mesh::UnstructuredMesh;
use crate::mesh_error::MeshGhostError;
use crate::overlap::delta::GhostDelta;
use crate::overlap::links::CommunicationLinks;

fn sync_arrays(
    src: &FieldData,
    dst: &mut FieldData,
    n_local: usize,
    n_total: usize,
    skip: &str,
) -> Result<(), MeshGhostError> {
    for a in src.iter().filter(|a| a.name() != skip) {
        let reusable = dst
            .get(a.name())
            .map(|d| d.is_compatible(a) && d.num_tuples() == n_total);
        match reusable {
            Some(true) => {
                if let Some(d) = dst.get_mut(a.name()) {
                    d.copy_prefix_from(a, n_local)?;
                }
            }
            existing => {
                if existing.is_some() {
                    warn!("array `{}` changed type or shape; ghost values reset", a.name());
                }
                let mut fresh = a.empty_like(n_total);
                fresh.copy_prefix_from(a, n_local)?;
                dst.insert(fresh);
            }
        }
    }
    Ok(())
}

/// Copy the local point and cell data over the local prefix of the ghosted
/// mesh and make sure the ghost-cell marker array exists.
///
/// The global-ID array is skipped; it never changes. Fails with
/// [`MeshGhostError::TopologyChanged`] if the local mesh gained or lost
/// points or cells since the ghosted mesh was built.
pub fn synch_local_data(
    local: &UnstructuredMesh,
    ghosted: &mut GhostedMesh,
    config: &GhostConfig,
) -> Result<(), MeshGhostError> {
    let (np, nc) = (ghosted.num_local_points(), ghosted.num_local_cells());
    if local.num_points() != np || local.num_cells() != nc {
        return Err(MeshGhostError::TopologyChanged(format!(
            "built for {np} points / {nc} cells, now {} / {}",
            local.num_points(),
            local.num_cells()
        )));
    }
    local.validate_fields()?;
    let (tp, tc) = (ghosted.mesh().num_points(), ghosted.mesh().num_cells());

    let marker = &config.ghost_cell_array;
    let mesh = ghosted.mesh_mut();
    sync_arrays(local.point_data(), mesh.point_data_mut(), np, tp, &config.global_id_field)?;
    sync_arrays(local.cell_data(), mesh.cell_data_mut(), nc, tc, marker)?;

    let has_marker = mesh
        .cell_data()
        .get(marker)
        .is_some_and(|a| a.scalar_type() == ScalarType::U8 && a.components() == 1 && a.num_tuples() == tc);
    if !has_marker {
        let flags: Vec<u8> = (0..tc).map(|c| u8::from(c >= nc)).collect();
        mesh.cell_data_mut()
            .insert(FieldArray::from_vec(marker.as_str(), 1, flags)?);
    }
    Ok(())
}

/// Pack the values `rank` expects from us: global IDs and point tuples at the
/// send node links, then remote cell IDs and cell tuples at the send cell
/// links.
pub fn serialize_ghost_zones(
    ghosted: &GhostedMesh,
    links: &CommunicationLinks,
    rank: usize,
    config: &GhostConfig,
) -> Result<Vec<u8>, MeshGhostError> {
    let mesh = ghosted.mesh();
    let nodes = links.snd_node_links(rank);
    let cells = links.snd_cell_links(rank);
    let node_idx: Vec<usize> = nodes.iter().map(|l| l.local).collect();
    let cell_idx: Vec<usize> = cells.iter().map(|l| l.local).collect();

    let mut w = WireWriter::new(KIND_GHOST_UPDATE);
    w.put_count(nodes.len());
    w.put_i64s(nodes.iter().map(|l| l.global));
    let mut pd = FieldData::new();
    for a in mesh.point_data().iter().filter(|a| a.name() != config.global_id_field) {
        pd.insert(a.gather(&node_idx)?);
    }
    w.put_field_data(&pd);

    w.put_count(cells.len());
    w.put_indices(cells.iter().map(|l| l.remote));
    let mut cd = FieldData::new();
    for a in mesh.cell_data().iter().filter(|a| a.name() != config.ghost_cell_array) {
        cd.insert(a.gather(&cell_idx)?);
    }
    w.put_field_data(&cd);
    Ok(w.finish())
}

fn fuse_arrays<D: GhostDelta>(
    dst: &mut FieldData,
    src: &FieldData,
    targets: &[usize],
) -> Result<(), MeshGhostError> {
    for s in src {
        let d = dst
            .get_mut(s.name())
            .ok_or_else(|| MeshGhostError::MissingField(s.name().to_string()))?;
        for (i, &t) in targets.iter().enumerate() {
            d.fuse_tuple_from::<D>(t, s, i)?;
        }
    }
    Ok(())
}

/// Decode a packet from `rank` and fuse its tuples into the ghost slots named
/// by the target mappings.
pub fn fill_ghost_zones<D: GhostDelta>(
    ghosted: &mut GhostedMesh,
    links: &CommunicationLinks,
    rank: usize,
    bytes: &[u8],
) -> Result<(), MeshGhostError> {
    let mut r = WireReader::open(bytes, KIND_GHOST_UPDATE)?;

    let nn = r.get_count()?;
    let gids = r.get_i64s(nn)?;
    let pd = r.get_field_data()?;
    let nc = r.get_count()?;
    let remote_cells = r.get_indices(nc)?;
    let cd = r.get_field_data()?;
    r.finish()?;

    let expected = (links.rcv_node_links(rank).len(), links.rcv_cell_links(rank).len());
    if (nn, nc) != expected {
        return Err(MeshGhostError::CommError {
            neighbor: rank,
            source: format!(
                "ghost packet has {nn} points / {nc} cells, links expect {} / {}",
                expected.0, expected.1
            )
            .into(),
        });
    }
    pd.validate_tuples(nn)?;
    cd.validate_tuples(nc)?;

    let node_targets = gids
        .iter()
        .map(|&g| links.target_node_id(rank, g))
        .collect::<Result<Vec<_>, _>>()?;
    let cell_targets = remote_cells
        .iter()
        .map(|&c| links.target_cell_id(rank, c))
        .collect::<Result<Vec<_>, _>>()?;

    let mesh = ghosted.mesh_mut();
    fuse_arrays::<D>(mesh.point_data_mut(), &pd, &node_targets)?;
    fuse_arrays::<D>(mesh.cell_data_mut(), &cd, &cell_targets)
}

const CONTROL_RESIZE: u8 = 0;
const CONTROL_ABORT: u8 = 1;
const CONTROL_LEN: usize = size_of::<WireHdr>() + 1 + size_of::<WireCount>();

#[derive(Debug, PartialEq, Eq)]
enum Control {
    Resize(usize),
    Abort,
}

/// Control message, zero-padded to `len` bytes.
fn control_packet(control: Control, len: usize) -> Vec<u8> {
    let mut w = WireWriter::with_capacity(KIND_UPDATE_CONTROL, CONTROL_LEN);
    match control {
        Control::Resize(n) => {
            w.put_u8(CONTROL_RESIZE);
            w.put_count(n);
        }
        Control::Abort => {
            w.put_u8(CONTROL_ABORT);
            w.put_count(0);
        }
    }
    let mut bytes = w.finish();
    bytes.resize(len.max(CONTROL_LEN), 0);
    bytes
}

/// `None` for an ordinary ghost packet. Padding after the control body is
/// ignored.
fn read_control(bytes: &[u8]) -> Result<Option<Control>, MeshGhostError> {
    if peek_kind(bytes) != Some(KIND_UPDATE_CONTROL) {
        return Ok(None);
    }
    let mut r = WireReader::open(bytes, KIND_UPDATE_CONTROL)?;
    let code = r.get_u8()?;
    let n = r.get_count()?;
    match code {
        CONTROL_RESIZE => Ok(Some(Control::Resize(n))),
        CONTROL_ABORT => Ok(Some(Control::Abort)),
        other => Err(MeshGhostError::WireDecode(format!("unknown control code {other}"))),
    }
}

fn recv_err(neighbor: usize, msg: String) -> MeshGhostError {
    MeshGhostError::CommError {
        neighbor,
        source: msg.into(),
    }
}

/// Ghost packet sizes agreed with each neighbour, in both directions.
///
/// Filled by the first update after a build and kept in step on both sides
/// afterwards; a rebuild starts from an empty set.
#[derive(Clone, Debug, Default)]
pub struct UpdateSizes {
    outgoing: BTreeMap<usize, usize>,
    incoming: BTreeMap<usize, usize>,
}

impl UpdateSizes {
    pub fn is_empty(&self) -> bool {
        self.outgoing.is_empty() && self.incoming.is_empty()
    }

    /// Bytes we currently send to `nbr` per update.
    pub fn outgoing(&self, nbr: usize) -> Option<usize> {
        self.outgoing.get(&nbr).copied()
    }

    /// Bytes we currently expect from `nbr` per update.
    pub fn incoming(&self, nbr: usize) -> Option<usize> {
        self.incoming.get(&nbr).copied()
    }

    /// Send `outgoing[nbr]` to every neighbour and return what each sent back.
    fn exchange<C: Communicator>(
        &mut self,
        outgoing: &BTreeMap<usize, Vec<u8>>,
        neighbors: &BTreeSet<usize>,
        comm: &C,
        tags: &GhostCommTags,
    ) -> Result<BTreeMap<usize, Vec<u8>>, MeshGhostError> {
        let (known, fresh): (BTreeSet<usize>, BTreeSet<usize>) =
            neighbors.iter().copied().partition(|n| self.incoming.contains_key(n));
        let mut received = BTreeMap::new();
        if !fresh.is_empty() {
            received.extend(self.exchange_fresh(outgoing, &fresh, comm, tags)?);
        }
        if !known.is_empty() {
            received.extend(self.exchange_known(outgoing, &known, comm, tags.update)?);
        }
        Ok(received)
    }

    fn exchange_fresh<C: Communicator>(
        &mut self,
        outgoing: &BTreeMap<usize, Vec<u8>>,
        neighbors: &BTreeSet<usize>,
        comm: &C,
        tags: &GhostCommTags,
    ) -> Result<BTreeMap<usize, Vec<u8>>, MeshGhostError> {
        let packets: BTreeMap<usize, Vec<u8>> = outgoing
            .iter()
            .filter(|(n, _)| neighbors.contains(n))
            .map(|(&n, p)| (n, p.clone()))
            .collect();
        let sizes: BTreeMap<usize, usize> = packets.iter().map(|(&n, p)| (n, p.len())).collect();
        let incoming = exchange_sizes_symmetric(&sizes, neighbors, comm, tags.update_sizes)?;
        let received = exchange_payloads(&packets, &incoming, comm, tags.update)?;
        self.outgoing.extend(sizes);
        self.incoming.extend(incoming);
        Ok(received)
    }

    fn exchange_known<C: Communicator>(
        &mut self,
        outgoing: &BTreeMap<usize, Vec<u8>>,
        neighbors: &BTreeSet<usize>,
        comm: &C,
        tag: CommTag,
    ) -> Result<BTreeMap<usize, Vec<u8>>, MeshGhostError> {
        let tag = tag.as_u16();

        let mut pending_recvs = Vec::with_capacity(neighbors.len());
        for &nbr in neighbors {
            let len = self.incoming(nbr).unwrap_or(0);
            let mut buf = vec![0u8; len];
            pending_recvs.push((nbr, len, comm.irecv(nbr, tag, &mut buf)));
        }

        let mut pending_sends = Vec::with_capacity(neighbors.len());
        for &nbr in neighbors {
            let Some(packet) = outgoing.get(&nbr) else {
                continue;
            };
            let agreed = self.outgoing(nbr).unwrap_or(0);
            if packet.len() == agreed {
                pending_sends.push(comm.isend(nbr, tag, packet));
            } else {
                debug_assert!(agreed >= CONTROL_LEN);
                let resize = control_packet(Control::Resize(packet.len()), agreed);
                pending_sends.push(comm.isend(nbr, tag, &resize));
                pending_sends.push(comm.isend(nbr, tag, packet));
                self.outgoing.insert(nbr, packet.len());
            }
        }

        let mut received = BTreeMap::new();
        let mut maybe_err = None;
        for (nbr, len, h) in pending_recvs {
            let got = match h.wait() {
                Some(data) if data.len() == len => match read_control(&data) {
                    Ok(Some(Control::Resize(n))) => {
                        let mut buf = vec![0u8; n];
                        match comm.irecv(nbr, tag, &mut buf).wait() {
                            Some(data) if data.len() == n => {
                                self.incoming.insert(nbr, n);
                                Ok(data)
                            }
                            other => Err(recv_err(
                                nbr,
                                format!(
                                    "expected {n} resized packet bytes, got {}",
                                    other.map_or(0, |d| d.len())
                                ),
                            )),
                        }
                    }
                    Ok(_) => Ok(data),
                    Err(e) => Err(e),
                },
                other => Err(recv_err(
                    nbr,
                    format!(
                        "expected {len} ghost packet bytes, got {}",
                        other.map_or(0, |d| d.len())
                    ),
                )),
            };
            match got {
                Ok(data) => {
                    received.insert(nbr, data);
                }
                Err(e) if maybe_err.is_none() => maybe_err = Some(e),
                Err(_) => {}
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
}

/// Full refresh: local copy, pack, exchange with every neighbour, fill.
///
/// A local failure (say [`MeshGhostError::TopologyChanged`]) is returned on
/// this rank after the exchange completes, and its neighbours get
/// [`MeshGhostError::PeerFailed`]. Ghost values are left untouched on every
/// rank that sees a failure.
pub fn update_ghosts<C, D>(
    local: &UnstructuredMesh,
    ghosted: &mut GhostedMesh,
    links: &CommunicationLinks,
    comm: &C,
    tags: &GhostCommTags,
    config: &GhostConfig,
    sizes: &mut UpdateSizes,
) -> Result<(), MeshGhostError>
where
    C: Communicator,
    D: GhostDelta,
{
    let synced = synch_local_data(local, ghosted, config);
    if links.is_empty() || comm.is_serial() {
        return synced;
    }

    let packed = synced.and_then(|()| {
        links
            .neighbors()
            .iter()
            .map(|&nbr| serialize_ghost_zones(ghosted, links, nbr, config).map(|p| (nbr, p)))
            .collect::<Result<BTreeMap<_, _>, _>>()
    });
    let (outgoing, own_err) = match packed {
        Ok(outgoing) => (outgoing, None),
        Err(e) => {
            let abort = control_packet(Control::Abort, CONTROL_LEN);
            let outgoing: BTreeMap<usize, Vec<u8>> =
                links.neighbors().iter().map(|&n| (n, abort.clone())).collect();
            (outgoing, Some(e))
        }
    };

    let incoming = sizes.exchange(&outgoing, links.neighbors(), comm, tags)?;
    if let Some(e) = own_err {
        return Err(e);
    }

    let mut aborted = Vec::new();
    for (&nbr, bytes) in &incoming {
        if read_control(bytes)? == Some(Control::Abort) {
            aborted.push(nbr);
        }
    }
    if !aborted.is_empty() {
        return Err(MeshGhostError::PeerFailed { ranks: aborted });
    }

    for (nbr, bytes) in &incoming {
        fill_ghost_zones::<D>(ghosted, links, *nbr, bytes)?;
    }
    debug!(
        "rank {}: ghost update exchanged with {} neighbours",
        comm.rank(),
        incoming.len()
    );
    Ok(())
}
