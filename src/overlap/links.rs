//! Persistent communication links between the ghosted mesh and its neighbours.
//!
//! Links are recorded once while ghost cells are inserted and then reused by
//! every ghost update. Per neighbour rank there are four ordered lists:
//! points and cells we send, points and cells we receive. Receives are resolved
//! through two target maps, one keyed by global point ID and one keyed by
//! `(rank, remote cell index)`.

use std::collections::{BTreeMap, BTreeSet};

use crate::mesh_error::MeshGhostError;
use crate::overlap::perf::{FastMap, FastSet};
use crate::topology::face_key::GlobalId;

/// A point travelling between ranks.
///
/// For sends `local` is the point index in the local mesh; for receives it is
/// the point index in the ghosted mesh.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct NodeLink {
    pub local: usize,
    pub global: GlobalId,
}

/// A cell travelling between ranks.
///
/// For sends `local` is the local cell index and `remote` repeats it, since the
/// receiver keys ghosts by the sender's cell index. For receives `local` is the
/// cell index in the ghosted mesh and `remote` the sender's cell index.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct CellLink {
    pub local: usize,
    pub remote: usize,
}

#[derive(Clone, Debug)]
struct PerRank<T> {
    lists: BTreeMap<usize, Vec<T>>,
    seen: FastMap<usize, FastSet<usize>>,
}

impl<T> Default for PerRank<T> {
    fn default() -> Self {
        Self {
            lists: BTreeMap::new(),
            seen: FastMap::default(),
        }
    }
}

impl<T> PerRank<T> {
    fn push_unique(&mut self, rank: usize, key: usize, link: T) -> bool {
        if !self.seen.entry(rank).or_default().insert(key) {
            return false;
        }
        self.lists.entry(rank).or_default().push(link);
        true
    }

    fn get(&self, rank: usize) -> &[T] {
        self.lists.get(&rank).map_or(&[], Vec::as_slice)
    }

    fn total(&self) -> usize {
        self.lists.values().map(Vec::len).sum()
    }
}

/// Send/receive lists for every neighbouring rank.
#[derive(Clone, Debug, Default)]
pub struct CommunicationLinks {
    snd_nodes: PerRank<NodeLink>,
    rcv_nodes: PerRank<NodeLink>,
    snd_cells: PerRank<CellLink>,
    rcv_cells: PerRank<CellLink>,
    target_node_mapping: FastMap<GlobalId, usize>,
    target_cell_mapping: FastMap<(usize, usize), usize>,
    neighbors: BTreeSet<usize>,
}

impl CommunicationLinks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that local point `local` (global ID `global`) is sent to `rank`.
    /// Returns `false` if it was already queued for that rank.
    pub fn enqueue_node_send(&mut self, rank: usize, local: usize, global: GlobalId) -> bool {
        self.neighbors.insert(rank);
        self.snd_nodes
            .push_unique(rank, local, NodeLink { local, global })
    }

    /// Record that ghosted point `ghosted` (global ID `global`) is filled by `rank`.
    pub fn enqueue_node_rcv(&mut self, rank: usize, ghosted: usize, global: GlobalId) -> bool {
        self.neighbors.insert(rank);
        self.target_node_mapping.insert(global, ghosted);
        self.rcv_nodes.push_unique(
            rank,
            ghosted,
            NodeLink {
                local: ghosted,
                global,
            },
        )
    }

    /// Record that local cell `local` is sent to `rank`.
    pub fn enqueue_cell_send(&mut self, rank: usize, local: usize) -> bool {
        self.neighbors.insert(rank);
        self.snd_cells.push_unique(
            rank,
            local,
            CellLink {
                local,
                remote: local,
            },
        )
    }

    /// Record that ghosted cell `ghosted` mirrors cell `remote` of `rank`.
    pub fn enqueue_cell_rcv(&mut self, rank: usize, ghosted: usize, remote: usize) -> bool {
        self.neighbors.insert(rank);
        self.target_cell_mapping.insert((rank, remote), ghosted);
        self.rcv_cells.push_unique(
            rank,
            remote,
            CellLink {
                local: ghosted,
                remote,
            },
        )
    }

    /// Ghosted point index receiving values for global ID `global` from `rank`.
    pub fn target_node_id(&self, rank: usize, global: GlobalId) -> Result<usize, MeshGhostError> {
        self.target_node_mapping
            .get(&global)
            .copied()
            .ok_or(MeshGhostError::UnknownGhostNode {
                rank,
                global_id: global,
            })
    }

    /// Ghosted cell index receiving values for cell `remote` of `rank`.
    pub fn target_cell_id(&self, rank: usize, remote: usize) -> Result<usize, MeshGhostError> {
        self.target_cell_mapping
            .get(&(rank, remote))
            .copied()
            .ok_or(MeshGhostError::UnknownGhostCell {
                rank,
                remote_cell: remote,
            })
    }

    pub fn snd_node_links(&self, rank: usize) -> &[NodeLink] {
        self.snd_nodes.get(rank)
    }

    pub fn rcv_node_links(&self, rank: usize) -> &[NodeLink] {
        self.rcv_nodes.get(rank)
    }

    pub fn snd_cell_links(&self, rank: usize) -> &[CellLink] {
        self.snd_cells.get(rank)
    }

    pub fn rcv_cell_links(&self, rank: usize) -> &[CellLink] {
        self.rcv_cells.get(rank)
    }

    /// Ranks we exchange anything with, ascending.
    pub fn neighbors(&self) -> &BTreeSet<usize> {
        &self.neighbors
    }

    pub fn is_empty(&self) -> bool {
        self.neighbors.is_empty()
    }

    pub fn num_snd_nodes(&self) -> usize {
        self.snd_nodes.total()
    }

    pub fn num_rcv_nodes(&self) -> usize {
        self.rcv_nodes.total()
    }

    pub fn num_snd_cells(&self) -> usize {
        self.snd_cells.total()
    }

    pub fn num_rcv_cells(&self) -> usize {
        self.rcv_cells.total()
    }

    pub(crate) fn target_nodes(&self) -> impl Iterator<Item = (GlobalId, usize)> + '_ {
        self.target_node_mapping.iter().map(|(&g, &i)| (g, i))
    }

    pub(crate) fn target_cells(&self) -> impl Iterator<Item = ((usize, usize), usize)> + '_ {
        self.target_cell_mapping.iter().map(|(&k, &i)| (k, i))
    }
}
