//! Thin façade over serial, intra-process (threads) or inter-process (MPI)
//! message passing.
//!
//! Messages are *contiguous byte slices* (no zero-copy guarantees). All handles
//! are waitable but non-blocking: callers post every receive and send first and
//! only then call [`Wait::wait`], which blocks until the buffer is ready.

use std::collections::VecDeque;
use std::sync::Arc;

use bytes::Bytes;
use dashmap::DashMap;
use once_cell::sync::Lazy;
use parking_lot::{Condvar, Mutex};

/// Typed message tag. Phases derive their tags from one base with
/// [`CommTag::offset`] so that two builds with different bases never mix.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct CommTag(pub u16);

impl CommTag {
    pub const fn new(tag: u16) -> Self {
        CommTag(tag)
    }

    pub const fn as_u16(self) -> u16 {
        self.0
    }

    /// Raw tag value, for passing straight to [`Communicator`] calls.
    pub const fn base(self) -> u16 {
        self.0
    }

    pub const fn offset(self, k: u16) -> CommTag {
        CommTag(self.0.wrapping_add(k))
    }
}

/// Tag reserved for [`Communicator::barrier`] in the mailbox backends.
pub const BARRIER_TAG: u16 = u16::MAX;

/// One tag per exchange phase of a ghost-zone build and update.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct GhostCommTags {
    pub bounds: CommTag,
    pub boundary_sizes: CommTag,
    pub boundary: CommTag,
    pub update_sizes: CommTag,
    pub update: CommTag,
    pub status: CommTag,
}

impl GhostCommTags {
    pub const fn from_base(base: CommTag) -> Self {
        Self {
            bounds: base,
            boundary_sizes: base.offset(1),
            boundary: base.offset(2),
            update_sizes: base.offset(3),
            update: base.offset(4),
            status: base.offset(5),
        }
    }
}

/// Non-blocking communication interface.
pub trait Communicator: Send + Sync + 'static {
    /// Handle returned by `isend`.
    type SendHandle: Wait;
    /// Handle returned by `irecv`.
    type RecvHandle: Wait;

    fn isend(&self, peer: usize, tag: u16, buf: &[u8]) -> Self::SendHandle;
    /// Post a receive of at most `buf.len()` bytes; the data is returned by
    /// `wait`, `buf` only fixes the length.
    fn irecv(&self, peer: usize, tag: u16, buf: &mut [u8]) -> Self::RecvHandle;

    fn rank(&self) -> usize;
    fn size(&self) -> usize;

    /// Block until every rank has entered the barrier.
    fn barrier(&self);

    /// True when there is nobody to talk to.
    fn is_serial(&self) -> bool {
        self.size() <= 1
    }
}

/// Anything that can be waited on.
pub trait Wait {
    /// Wait for completion and return the received data (if any).
    fn wait(self) -> Option<Vec<u8>>;
}

impl Wait for () {
    fn wait(self) -> Option<Vec<u8>> {
        None
    }
}

/// Serial communicator: rank 0 of 1. Receives never produce data.
#[derive(Clone, Debug, Default)]
pub struct NoComm;

impl Communicator for NoComm {
    type SendHandle = ();
    type RecvHandle = ();

    fn isend(&self, _peer: usize, _tag: u16, _buf: &[u8]) {}
    fn irecv(&self, _peer: usize, _tag: u16, _buf: &mut [u8]) {}

    fn rank(&self) -> usize {
        0
    }
    fn size(&self) -> usize {
        1
    }
    fn barrier(&self) {}
}

// --- RayonComm: intra-process / multi-thread ---
type Key = (usize, usize, u16); // (src, dst, tag)

/// Message queues shared by a group of in-process ranks.
#[derive(Default)]
struct Mailbox {
    slots: DashMap<Key, VecDeque<Bytes>>,
    lock: Mutex<()>,
    arrived: Condvar,
}

impl Mailbox {
    fn post(&self, key: Key, data: Bytes) {
        let _guard = self.lock.lock();
        self.slots.entry(key).or_default().push_back(data);
        self.arrived.notify_all();
    }

    fn take(&self, key: &Key) -> Bytes {
        let mut guard = self.lock.lock();
        loop {
            if let Some(data) = self.slots.get_mut(key).and_then(|mut q| q.pop_front()) {
                return data;
            }
            self.arrived.wait(&mut guard);
        }
    }
}

static MAILBOX: Lazy<Arc<Mailbox>> = Lazy::new(|| Arc::new(Mailbox::default()));

/// Pending receive on a [`RayonComm`]; the message is dequeued on `wait`.
pub struct LocalHandle {
    mailbox: Arc<Mailbox>,
    key: Key,
    len: usize,
}

impl Wait for LocalHandle {
    fn wait(self) -> Option<Vec<u8>> {
        let data = self.mailbox.take(&self.key);
        let n = data.len().min(self.len);
        Some(data[..n].to_vec())
    }
}

/// In-process ranks running on threads, exchanging messages through a
/// FIFO mailbox per `(src, dst, tag)`.
///
/// [`RayonComm::new`] attaches to a process-wide mailbox, so tests using it
/// with overlapping tags should run serially. [`RayonComm::world`] creates an
/// isolated group.
#[derive(Clone)]
pub struct RayonComm {
    rank: usize,
    size: usize,
    mailbox: Arc<Mailbox>,
}

impl std::fmt::Debug for RayonComm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RayonComm")
            .field("rank", &self.rank)
            .field("size", &self.size)
            .finish()
    }
}

impl RayonComm {
    pub fn new(rank: usize, size: usize) -> Self {
        Self {
            rank,
            size,
            mailbox: Arc::clone(&MAILBOX),
        }
    }

    /// `size` communicators sharing a fresh mailbox, index = rank.
    pub fn world(size: usize) -> Vec<RayonComm> {
        let mailbox = Arc::new(Mailbox::default());
        (0..size)
            .map(|rank| RayonComm {
                rank,
                size,
                mailbox: Arc::clone(&mailbox),
            })
            .collect()
    }
}

impl Communicator for RayonComm {
    type SendHandle = ();
    type RecvHandle = LocalHandle;

    fn isend(&self, peer: usize, tag: u16, buf: &[u8]) {
        self.mailbox
            .post((self.rank, peer, tag), Bytes::copy_from_slice(buf));
    }

    fn irecv(&self, peer: usize, tag: u16, buf: &mut [u8]) -> LocalHandle {
        LocalHandle {
            mailbox: Arc::clone(&self.mailbox),
            key: (peer, self.rank, tag),
            len: buf.len(),
        }
    }

    fn rank(&self) -> usize {
        self.rank
    }

    fn size(&self) -> usize {
        self.size
    }

    fn barrier(&self) {
        for peer in (0..self.size).filter(|&p| p != self.rank) {
            self.isend(peer, BARRIER_TAG, &[]);
        }
        for peer in (0..self.size).filter(|&p| p != self.rank) {
            let _ = self.irecv(peer, BARRIER_TAG, &mut []).wait();
        }
    }
}

// --- MPI backend (feature = "mpi-support") ---
#[cfg(feature = "mpi-support")]
mod mpi_backend {
    use super::{Communicator, Wait};
    use mpi::Threading;
    use mpi::environment::Universe;
    use mpi::request::{Request, StaticScope};
    use mpi::topology::SimpleCommunicator;
    use mpi::traits::{
        Communicator as MpiCommunicatorTrait, CommunicatorCollectives, Destination, Source,
    };

    /// MPI world communicator. Buffers handed to MPI are owned by the handles
    /// and released after `wait`.
    ///
    /// Only constructed when MPI runs at `MPI_THREAD_MULTIPLE`, so a shared
    /// reference may be used from several threads at once.
    pub struct MpiComm {
        world: SimpleCommunicator,
        rank: usize,
        size: usize,
        _universe: Option<Universe>,
    }

    // SAFETY: every MpiComm is created at thread level `Threading::Multiple`
    // (checked in `new` and `from_world`), where the MPI standard allows
    // concurrent calls on one communicator from any thread.
    unsafe impl Send for MpiComm {}
    // SAFETY: as above.
    unsafe impl Sync for MpiComm {}

    impl MpiComm {
        /// Initialise MPI with `MPI_THREAD_MULTIPLE` and wrap `MPI_COMM_WORLD`.
        /// Returns `None` if MPI was already initialised elsewhere or the
        /// library grants a lower thread level.
        pub fn new() -> Option<Self> {
            let (universe, threading) = mpi::initialize_with_threading(Threading::Multiple)?;
            if threading != Threading::Multiple {
                log::warn!("MPI granted thread level {threading:?}, need Multiple");
                return None;
            }
            let world = universe.world();
            Some(Self::wrap(world, Some(universe)))
        }

        /// Wrap an existing communicator whose environment is managed by the
        /// caller. `None` unless MPI was initialised with `MPI_THREAD_MULTIPLE`.
        pub fn from_world(world: SimpleCommunicator) -> Option<Self> {
            (mpi::environment::threading_support() == Threading::Multiple)
                .then(|| Self::wrap(world, None))
        }

        fn wrap(world: SimpleCommunicator, universe: Option<Universe>) -> Self {
            let rank = world.rank() as usize;
            let size = world.size() as usize;
            Self {
                world,
                rank,
                size,
                _universe: universe,
            }
        }
    }

    pub struct MpiSendHandle {
        req: Request<'static, [u8], StaticScope>,
        buf: *mut [u8],
    }

    impl Wait for MpiSendHandle {
        fn wait(self) -> Option<Vec<u8>> {
            let _ = self.req.wait();
            // SAFETY: `buf` was leaked in `isend` and the request has completed.
            drop(unsafe { Box::from_raw(self.buf) });
            None
        }
    }

    pub struct MpiRecvHandle {
        req: Request<'static, [u8], StaticScope>,
        buf: *mut [u8],
    }

    impl Wait for MpiRecvHandle {
        fn wait(self) -> Option<Vec<u8>> {
            let _ = self.req.wait();
            // SAFETY: `buf` was leaked in `irecv` and the request has completed.
            let data = unsafe { Box::from_raw(self.buf) };
            Some(data.into_vec())
        }
    }

    impl Communicator for MpiComm {
        type SendHandle = MpiSendHandle;
        type RecvHandle = MpiRecvHandle;

        fn isend(&self, peer: usize, tag: u16, buf: &[u8]) -> MpiSendHandle {
            let owned: &'static mut [u8] = Box::leak(buf.to_vec().into_boxed_slice());
            let ptr: *mut [u8] = owned;
            // SAFETY: `ptr` stays valid until the handle reclaims it after completion.
            let data: &'static [u8] = unsafe { &*ptr };
            let req = self
                .world
                .process_at_rank(peer as i32)
                .immediate_send_with_tag(StaticScope, data, i32::from(tag));
            MpiSendHandle { req, buf: ptr }
        }

        fn irecv(&self, peer: usize, tag: u16, buf: &mut [u8]) -> MpiRecvHandle {
            let owned: &'static mut [u8] = Box::leak(vec![0u8; buf.len()].into_boxed_slice());
            let ptr: *mut [u8] = owned;
            // SAFETY: as in `isend`.
            let data: &'static mut [u8] = unsafe { &mut *ptr };
            let req = self
                .world
                .process_at_rank(peer as i32)
                .immediate_receive_into_with_tag(StaticScope, data, i32::from(tag));
            MpiRecvHandle { req, buf: ptr }
        }

        fn rank(&self) -> usize {
            self.rank
        }

        fn size(&self) -> usize {
            self.size
        }

        fn barrier(&self) {
            self.world.barrier();
        }
    }
}

#[cfg(feature = "mpi-support")]
pub use mpi_backend::{MpiComm, MpiRecvHandle, MpiSendHandle};
