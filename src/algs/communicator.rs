//! Thin façade over intra-process (threads) or inter-process (MPI) message passing.
//!
//! Messages are *contiguous byte slices* (no zero-copy guarantees).
//! Point-to-point handles are **waitable**; the halo exchange and the
//! collective defaults below call `.wait()` before they trust a buffer.
//!
//! Collectives (`allreduce_*`, `broadcast`, `barrier`) have default
//! implementations built on `isend`/`irecv` that funnel through rank 0 and
//! combine contributions in rank order, so every worker observes a
//! bit-identical reduced value. Backends with native collectives override them.

use crate::poisson_error::{PoissonError, Result};
use bytes::Bytes;
use dashmap::DashMap;
use parking_lot::{Condvar, Mutex};
use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Tags at or above this value are reserved for collectives.
pub const COLLECTIVE_TAG_BASE: u16 = 0xFF00;
const TAG_REDUCE_UP: u16 = COLLECTIVE_TAG_BASE + 1;
const TAG_REDUCE_DOWN: u16 = COLLECTIVE_TAG_BASE + 2;
const TAG_BCAST_LEN: u16 = COLLECTIVE_TAG_BASE + 3;
const TAG_BCAST_DATA: u16 = COLLECTIVE_TAG_BASE + 4;

/// Binary operator applied by a reduction.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReduceOp {
    Sum,
    Max,
}

impl ReduceOp {
    /// Combine two values. `Max` propagates NaN instead of discarding it.
    #[inline]
    pub fn apply(self, acc: f64, x: f64) -> f64 {
        match self {
            ReduceOp::Sum => acc + x,
            ReduceOp::Max => max_keep_nan(acc, x),
        }
    }
}

/// `f64::max` that returns NaN when either side is NaN.
#[inline]
pub fn max_keep_nan(a: f64, b: f64) -> f64 {
    if a.is_nan() || b.is_nan() {
        f64::NAN
    } else {
        a.max(b)
    }
}

/// Message-passing interface shared by every backend.
pub trait Communicator {
    /// Handle returned by `isend`.
    type SendHandle: Wait;
    /// Handle returned by `irecv`.
    type RecvHandle: Wait;

    /// This worker's rank in `0..size()`.
    fn rank(&self) -> usize;
    /// Total number of workers.
    fn size(&self) -> usize;

    fn isend(&self, peer: usize, tag: u16, buf: &[u8]) -> Self::SendHandle;
    fn irecv(&self, peer: usize, tag: u16, buf: &mut [u8]) -> Self::RecvHandle;

    /// Paired send/receive: send `send` to `dest` and fill `recv` from
    /// `source` under the same tag. A `None` peer turns that half into a no-op.
    ///
    /// The receive is posted before the send, so neighbours exchanging with
    /// each other cannot block in a cycle on a backend with buffered sends.
    fn sendrecv(
        &self,
        dest: Option<usize>,
        send: &[u8],
        source: Option<usize>,
        recv: &mut [u8],
        tag: u16,
    ) -> Result<()> {
        let rx = source.map(|src| (src, self.irecv(src, tag, recv)));
        if let Some(dst) = dest {
            self.isend(dst, tag, send).wait();
        }
        if let Some((src, handle)) = rx {
            let data = handle.wait().ok_or_else(|| {
                PoissonError::Comm(format!("no message from rank {src} (tag {tag:#06x})"))
            })?;
            copy_exact(recv, &data, src, tag)?;
        }
        Ok(())
    }

    /// Combine one `f64` per worker with `op`; every worker gets the result.
    fn allreduce(&self, local: f64, op: ReduceOp) -> Result<f64> {
        let size = self.size();
        if size == 1 {
            return Ok(local);
        }
        let mut word = [0u8; 8];
        if self.rank() == 0 {
            let mut acc = local;
            for src in 1..size {
                let v = self.recv_f64(src, TAG_REDUCE_UP, &mut word)?;
                acc = op.apply(acc, v);
            }
            for dst in 1..size {
                self.isend(dst, TAG_REDUCE_DOWN, &acc.to_le_bytes()).wait();
            }
            Ok(acc)
        } else {
            self.isend(0, TAG_REDUCE_UP, &local.to_le_bytes()).wait();
            self.recv_f64(0, TAG_REDUCE_DOWN, &mut word)
        }
    }

    fn allreduce_sum(&self, local: f64) -> Result<f64> {
        self.allreduce(local, ReduceOp::Sum)
    }

    fn allreduce_max(&self, local: f64) -> Result<f64> {
        self.allreduce(local, ReduceOp::Max)
    }

    /// Replace `buf` on every worker with the contents of `buf` on `root`.
    fn broadcast(&self, root: usize, buf: &mut Vec<u8>) -> Result<()> {
        let size = self.size();
        if root >= size {
            return Err(PoissonError::Comm(format!(
                "broadcast root {root} outside communicator of size {size}"
            )));
        }
        if size == 1 {
            return Ok(());
        }
        if self.rank() == root {
            let len = (buf.len() as u64).to_le_bytes();
            for dst in (0..size).filter(|&r| r != root) {
                self.isend(dst, TAG_BCAST_LEN, &len).wait();
                self.isend(dst, TAG_BCAST_DATA, buf).wait();
            }
        } else {
            let mut len = [0u8; 8];
            let data = self
                .irecv(root, TAG_BCAST_LEN, &mut len)
                .wait()
                .ok_or_else(|| PoissonError::Comm("broadcast length lost".into()))?;
            copy_exact(&mut len, &data, root, TAG_BCAST_LEN)?;
            buf.clear();
            buf.resize(u64::from_le_bytes(len) as usize, 0);
            let data = self
                .irecv(root, TAG_BCAST_DATA, buf)
                .wait()
                .ok_or_else(|| PoissonError::Comm("broadcast payload lost".into()))?;
            copy_exact(buf, &data, root, TAG_BCAST_DATA)?;
        }
        Ok(())
    }

    /// Block until every worker has entered the barrier.
    fn barrier(&self) -> Result<()> {
        self.allreduce(0.0, ReduceOp::Max).map(|_| ())
    }

    #[doc(hidden)]
    fn recv_f64(&self, peer: usize, tag: u16, word: &mut [u8; 8]) -> Result<f64> {
        let data = self
            .irecv(peer, tag, word)
            .wait()
            .ok_or_else(|| PoissonError::Comm(format!("no reduction value from rank {peer}")))?;
        copy_exact(word, &data, peer, tag)?;
        Ok(f64::from_le_bytes(*word))
    }
}

fn copy_exact(dst: &mut [u8], data: &[u8], peer: usize, tag: u16) -> Result<()> {
    if data.len() != dst.len() {
        return Err(PoissonError::Comm(format!(
            "rank {peer} sent {} bytes on tag {tag:#06x}, expected {}",
            data.len(),
            dst.len()
        )));
    }
    dst.copy_from_slice(data);
    Ok(())
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

/// Compile-time no-op comm for a single worker.
#[derive(Clone, Debug, Default)]
pub struct NoComm;

impl Communicator for NoComm {
    type SendHandle = ();
    type RecvHandle = ();

    fn rank(&self) -> usize {
        0
    }
    fn size(&self) -> usize {
        1
    }
    fn isend(&self, _peer: usize, _tag: u16, _buf: &[u8]) -> Self::SendHandle {}
    fn irecv(&self, _peer: usize, _tag: u16, _buf: &mut [u8]) -> Self::RecvHandle {}
}

// --- ThreadComm: intra-process / multi-thread ---
type Key = (usize, usize, u16); // (src, dst, tag)

/// Shared message store of one thread world.
#[derive(Default)]
struct Mailbox {
    slots: DashMap<Key, VecDeque<Bytes>>,
    bell: Mutex<u64>,
    ring: Condvar,
    aborted: AtomicBool,
}

impl Mailbox {
    fn post(&self, key: Key, data: Bytes) {
        self.slots.entry(key).or_default().push_back(data);
        let mut rung = self.bell.lock();
        *rung = rung.wrapping_add(1);
        self.ring.notify_all();
    }

    fn try_take(&self, key: &Key) -> Option<Bytes> {
        self.slots.get_mut(key).and_then(|mut q| q.pop_front())
    }

    /// Blocks until a message for `key` arrives; `None` once aborted.
    fn take(&self, key: &Key) -> Option<Bytes> {
        let mut rung = self.bell.lock();
        loop {
            if let Some(bytes) = self.try_take(key) {
                return Some(bytes);
            }
            if self.aborted.load(Ordering::Acquire) {
                return None;
            }
            self.ring.wait(&mut rung);
        }
    }

    fn abort(&self) {
        self.aborted.store(true, Ordering::Release);
        let _rung = self.bell.lock();
        self.ring.notify_all();
    }
}

/// Pending receive on a [`ThreadComm`]; the message is taken on `wait`.
pub struct LocalHandle {
    mailbox: Arc<Mailbox>,
    key: Key,
    len: usize,
}

impl Wait for LocalHandle {
    fn wait(self) -> Option<Vec<u8>> {
        let bytes = self.mailbox.take(&self.key)?;
        let n = bytes.len().min(self.len);
        Some(bytes[..n].to_vec())
    }
}

/// Worker handle in a world of threads sharing one mailbox.
///
/// Sends are buffered and never block; each (source, destination, tag)
/// triple is a FIFO queue.
#[derive(Clone)]
pub struct ThreadComm {
    rank: usize,
    size: usize,
    mailbox: Arc<Mailbox>,
}

impl std::fmt::Debug for ThreadComm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ThreadComm")
            .field("rank", &self.rank)
            .field("size", &self.size)
            .finish()
    }
}

impl ThreadComm {
    /// Build `size` connected handles, one per worker thread.
    pub fn world(size: usize) -> Vec<ThreadComm> {
        let mailbox = Arc::new(Mailbox::default());
        (0..size)
            .map(|rank| ThreadComm {
                rank,
                size,
                mailbox: Arc::clone(&mailbox),
            })
            .collect()
    }

    /// Wake every blocked receiver in this world and make all further
    /// receives fail. Used when one worker cannot continue.
    pub fn abort(&self) {
        self.mailbox.abort();
    }

    pub fn is_aborted(&self) -> bool {
        self.mailbox.aborted.load(Ordering::Acquire)
    }
}

impl Communicator for ThreadComm {
    type SendHandle = ();
    type RecvHandle = LocalHandle;

    fn rank(&self) -> usize {
        self.rank
    }

    fn size(&self) -> usize {
        self.size
    }

    fn isend(&self, peer: usize, tag: u16, buf: &[u8]) -> Self::SendHandle {
        self.mailbox
            .post((self.rank, peer, tag), Bytes::copy_from_slice(buf));
    }

    fn irecv(&self, peer: usize, tag: u16, buf: &mut [u8]) -> Self::RecvHandle {
        LocalHandle {
            mailbox: Arc::clone(&self.mailbox),
            key: (peer, self.rank, tag),
            len: buf.len(),
        }
    }

    fn sendrecv(
        &self,
        dest: Option<usize>,
        send: &[u8],
        source: Option<usize>,
        recv: &mut [u8],
        tag: u16,
    ) -> Result<()> {
        if let Some(dst) = dest {
            self.isend(dst, tag, send);
        }
        if let Some(src) = source {
            let data = self.irecv(src, tag, recv).wait().ok_or(PoissonError::Aborted)?;
            copy_exact(recv, &data, src, tag)?;
        }
        Ok(())
    }

    fn recv_f64(&self, peer: usize, tag: u16, word: &mut [u8; 8]) -> Result<f64> {
        let data = self.irecv(peer, tag, word).wait().ok_or(PoissonError::Aborted)?;
        copy_exact(word, &data, peer, tag)?;
        Ok(f64::from_le_bytes(*word))
    }
}

// --- MPI backend (feature = "mpi-support") ---
#[cfg(feature = "mpi-support")]
mod mpi_backend {
    use super::*;
    use mpi::collective::SystemOperation;
    use mpi::environment::Universe;
    use mpi::point_to_point::send_receive_into_with_tags;
    use mpi::topology::SimpleCommunicator;
    use mpi::traits::*;

    /// One MPI process per worker.
    ///
    /// `isend` is a standard-mode send and `irecv` completes on `wait`, so
    /// neither is truly non-blocking; the halo exchange goes through the
    /// `sendrecv` override (`MPI_Sendrecv`) and collectives map onto the
    /// native MPI operations.
    pub struct MpiComm {
        _universe: Universe,
        pub world: SimpleCommunicator,
        rank: usize,
        size: usize,
    }

    impl MpiComm {
        pub fn new() -> Result<Self> {
            let universe = mpi::initialize()
                .ok_or_else(|| PoissonError::Comm("MPI is already initialized".into()))?;
            let world = universe.world();
            let rank = world.rank() as usize;
            let size = world.size() as usize;
            Ok(Self {
                _universe: universe,
                world,
                rank,
                size,
            })
        }
    }

    /// Receive completed lazily on `wait`.
    pub struct MpiRecv {
        peer: i32,
        tag: i32,
    }

    impl Wait for MpiRecv {
        fn wait(self) -> Option<Vec<u8>> {
            let world = SimpleCommunicator::world();
            let (data, _status) = world
                .process_at_rank(self.peer)
                .receive_vec_with_tag::<u8>(self.tag);
            Some(data)
        }
    }

    impl Communicator for MpiComm {
        type SendHandle = ();
        type RecvHandle = MpiRecv;

        fn rank(&self) -> usize {
            self.rank
        }

        fn size(&self) -> usize {
            self.size
        }

        fn isend(&self, peer: usize, tag: u16, buf: &[u8]) -> Self::SendHandle {
            self.world
                .process_at_rank(peer as i32)
                .send_with_tag(buf, i32::from(tag));
        }

        fn irecv(&self, peer: usize, tag: u16, _buf: &mut [u8]) -> MpiRecv {
            MpiRecv {
                peer: peer as i32,
                tag: i32::from(tag),
            }
        }

        fn sendrecv(
            &self,
            dest: Option<usize>,
            send: &[u8],
            source: Option<usize>,
            recv: &mut [u8],
            tag: u16,
        ) -> Result<()> {
            let tag = i32::from(tag);
            match (dest, source) {
                (Some(dst), Some(src)) => {
                    let to = self.world.process_at_rank(dst as i32);
                    let from = self.world.process_at_rank(src as i32);
                    let _status = send_receive_into_with_tags(send, &to, tag, recv, &from, tag);
                }
                (Some(dst), None) => {
                    self.world.process_at_rank(dst as i32).send_with_tag(send, tag);
                }
                (None, Some(src)) => {
                    let _status = self
                        .world
                        .process_at_rank(src as i32)
                        .receive_into_with_tag(recv, tag);
                }
                (None, None) => {}
            }
            Ok(())
        }

        fn allreduce(&self, local: f64, op: ReduceOp) -> Result<f64> {
            let mut global = 0.0f64;
            match op {
                ReduceOp::Sum => {
                    self.world
                        .all_reduce_into(&local, &mut global, SystemOperation::sum())
                }
                ReduceOp::Max => {
                    self.world
                        .all_reduce_into(&local, &mut global, SystemOperation::max())
                }
            }
            Ok(global)
        }

        fn broadcast(&self, root: usize, buf: &mut Vec<u8>) -> Result<()> {
            let root = self.world.process_at_rank(root as i32);
            let mut len = buf.len() as u64;
            root.broadcast_into(&mut len);
            buf.resize(len as usize, 0);
            root.broadcast_into(&mut buf[..]);
            Ok(())
        }

        fn barrier(&self) -> Result<()> {
            self.world.barrier();
            Ok(())
        }
    }
}

#[cfg(feature = "mpi-support")]
pub use mpi_backend::MpiComm;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn thread_roundtrip_two_ranks() {
        let world = ThreadComm::world(2);
        let (comm0, comm1) = (&world[0], &world[1]);

        let mut recv_buf = [0u8; 4];
        let recv_handle = comm1.irecv(0, 7, &mut recv_buf);
        comm0.isend(1, 7, &[1, 2, 3, 4]).wait();

        let data = recv_handle
            .wait()
            .expect("Expected to receive data from rank 0");
        recv_buf.copy_from_slice(&data);
        assert_eq!(&recv_buf, &[1, 2, 3, 4]);
    }

    #[test]
    fn no_comm_collectives_are_identity() {
        let comm = NoComm;
        assert_eq!(comm.allreduce_sum(2.5).unwrap(), 2.5);
        assert_eq!(comm.allreduce_max(-1.0).unwrap(), -1.0);
        let mut buf = vec![1, 2, 3];
        comm.broadcast(0, &mut buf).unwrap();
        assert_eq!(buf, vec![1, 2, 3]);
        comm.barrier().unwrap();
    }

    #[test]
    fn sendrecv_without_peers_is_a_noop() {
        let comm = NoComm;
        let mut recv = [9u8; 2];
        comm.sendrecv(None, &[1, 2], None, &mut recv, 3).unwrap();
        assert_eq!(recv, [9, 9]);
    }

    #[test]
    fn abort_releases_a_blocked_receiver() {
        let world = ThreadComm::world(2);
        let waiter = world[1].clone();
        let t = std::thread::spawn(move || {
            let mut buf = [0u8; 8];
            waiter.irecv(0, 1, &mut buf).wait()
        });
        world[0].abort();
        assert!(t.join().unwrap().is_none());
        assert!(world[1].is_aborted());
    }

    #[test]
    fn reduce_op_apply() {
        assert_eq!(ReduceOp::Sum.apply(1.0, 2.0), 3.0);
        assert_eq!(ReduceOp::Max.apply(1.0, 2.0), 2.0);
        assert_eq!(ReduceOp::Max.apply(5.0, 2.0), 5.0);
    }

    #[test]
    fn max_reduction_keeps_nan() {
        assert!(ReduceOp::Max.apply(1.0, f64::NAN).is_nan());
        assert!(ReduceOp::Max.apply(f64::NAN, 1.0).is_nan());
        assert_eq!(ReduceOp::Max.apply(1.0, f64::INFINITY), f64::INFINITY);
    }
}
