//! Rank-to-rank exchange engine for coupled interfaces
//!
//! Two layers:
//!
//! - [`Communicator`]: point-to-point sends/receives plus a deterministic
//!   global sum. Sends are nonblocking; receives block until the matching
//!   envelope arrives. [`ChannelComm`] implements it over a fully connected
//!   crossbeam-channel mesh, which is how simulated ranks run inside one
//!   process (tests spawn one thread per rank).
//! - [`PatchExchange`]: per-level state for interface exchanges. It owns one
//!   send buffer per interface, reused across outer iterations, and drives
//!   the post/complete protocol: post every processor interface of a level
//!   before completing any, or two ranks can end up waiting on each other.
//!
//! There are no timeouts. A peer that never answers blocks the solve; a
//! peer that disconnects or answers with the wrong payload is a fatal
//! protocol error.

use crate::interface::{CoupledMatrix, Coupling};
use crate::traits::Scalar;
use crossbeam_channel::{unbounded, Receiver, Sender};
use ndarray::Array1;
use thiserror::Error;

/// Fatal exchange failures. There is no recovery path for a broken
/// distributed matrix-vector product, so these propagate straight up.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TransportError {
    #[error("exchange with rank {peer}: expected {expected} values, received {got}")]
    SizeMismatch {
        peer: usize,
        expected: usize,
        got: usize,
    },

    #[error("exchange with rank {peer}: payload kind does not match the posted receive")]
    PayloadKind { peer: usize },

    #[error("rank {peer} is not part of this communicator")]
    UnknownRank { peer: usize },

    #[error("rank {peer} disconnected before completing an exchange")]
    Disconnected { peer: usize },
}

/// Point-to-point communication between the ranks holding mesh partitions.
///
/// Sends must not block. Receives block until the envelope with the given
/// (source, tag) pair arrives; envelopes from the same source with the same
/// tag are delivered in the order they were sent.
pub trait Communicator<T: Scalar>: Send {
    /// This rank's index.
    fn rank(&self) -> usize;

    /// Total number of ranks.
    fn n_ranks(&self) -> usize;

    /// Post a value payload to `to`. Nonblocking.
    fn send_values(&mut self, to: usize, tag: u32, values: &[T]) -> Result<(), TransportError>;

    /// Block until the matching value payload from `from` arrives.
    fn recv_values(&mut self, from: usize, tag: u32) -> Result<Vec<T>, TransportError>;

    /// Post an index payload to `to` (agglomeration exchanges cluster ids).
    fn send_indices(&mut self, to: usize, tag: u32, indices: &[usize])
        -> Result<(), TransportError>;

    /// Block until the matching index payload from `from` arrives.
    fn recv_indices(&mut self, from: usize, tag: u32) -> Result<Vec<usize>, TransportError>;

    /// Global sum over all ranks. Every rank contributes and every rank
    /// receives the same result; summation order is fixed (ascending rank)
    /// so the result is reproducible.
    fn sum_all(&mut self, local: T) -> Result<T, TransportError>;
}

#[derive(Debug)]
enum Payload<T> {
    Values(Vec<T>),
    Indices(Vec<usize>),
}

#[derive(Debug)]
struct Envelope<T> {
    src: usize,
    tag: u32,
    payload: Payload<T>,
}

/// Tag reserved for [`Communicator::sum_all`] traffic.
const REDUCE_TAG: u32 = u32::MAX;

/// In-process communicator: one handle per simulated rank, connected by
/// unbounded channels.
///
/// Unbounded channels make sends genuinely nonblocking; a receive scans a
/// stash of already-arrived envelopes before blocking on the inbox, so
/// out-of-order arrivals with other tags are kept for their own receive.
#[derive(Debug)]
pub struct ChannelComm<T: Scalar> {
    rank: usize,
    peers: Vec<Option<Sender<Envelope<T>>>>,
    inbox: Receiver<Envelope<T>>,
    stash: Vec<Envelope<T>>,
}

impl<T: Scalar> ChannelComm<T> {
    /// Build a fully connected mesh of `n_ranks` communicators, one per
    /// simulated rank.
    pub fn mesh(n_ranks: usize) -> Vec<ChannelComm<T>> {
        let endpoints: Vec<(Sender<Envelope<T>>, Receiver<Envelope<T>>)> =
            (0..n_ranks).map(|_| unbounded()).collect();

        (0..n_ranks)
            .map(|rank| ChannelComm {
                rank,
                peers: endpoints
                    .iter()
                    .enumerate()
                    .map(|(p, (tx, _))| (p != rank).then(|| tx.clone()))
                    .collect(),
                inbox: endpoints[rank].1.clone(),
                stash: Vec::new(),
            })
            .collect()
    }

    /// Communicator for a single unpartitioned rank.
    pub fn single() -> Self {
        Self::mesh(1).pop().expect("mesh(1) yields one communicator")
    }

    fn post(&self, to: usize, tag: u32, payload: Payload<T>) -> Result<(), TransportError> {
        let sender = self
            .peers
            .get(to)
            .and_then(|s| s.as_ref())
            .ok_or(TransportError::UnknownRank { peer: to })?;
        sender
            .send(Envelope {
                src: self.rank,
                tag,
                payload,
            })
            .map_err(|_| TransportError::Disconnected { peer: to })
    }

    fn take(&mut self, from: usize, tag: u32) -> Result<Payload<T>, TransportError> {
        if let Some(pos) = self
            .stash
            .iter()
            .position(|e| e.src == from && e.tag == tag)
        {
            return Ok(self.stash.remove(pos).payload);
        }
        loop {
            let envelope = self
                .inbox
                .recv()
                .map_err(|_| TransportError::Disconnected { peer: from })?;
            if envelope.src == from && envelope.tag == tag {
                return Ok(envelope.payload);
            }
            self.stash.push(envelope);
        }
    }
}

impl<T: Scalar> Communicator<T> for ChannelComm<T> {
    fn rank(&self) -> usize {
        self.rank
    }

    fn n_ranks(&self) -> usize {
        self.peers.len()
    }

    fn send_values(&mut self, to: usize, tag: u32, values: &[T]) -> Result<(), TransportError> {
        self.post(to, tag, Payload::Values(values.to_vec()))
    }

    fn recv_values(&mut self, from: usize, tag: u32) -> Result<Vec<T>, TransportError> {
        match self.take(from, tag)? {
            Payload::Values(v) => Ok(v),
            Payload::Indices(_) => Err(TransportError::PayloadKind { peer: from }),
        }
    }

    fn send_indices(
        &mut self,
        to: usize,
        tag: u32,
        indices: &[usize],
    ) -> Result<(), TransportError> {
        self.post(to, tag, Payload::Indices(indices.to_vec()))
    }

    fn recv_indices(&mut self, from: usize, tag: u32) -> Result<Vec<usize>, TransportError> {
        match self.take(from, tag)? {
            Payload::Indices(v) => Ok(v),
            Payload::Values(_) => Err(TransportError::PayloadKind { peer: from }),
        }
    }

    fn sum_all(&mut self, local: T) -> Result<T, TransportError> {
        let n = self.n_ranks();
        if n == 1 {
            return Ok(local);
        }
        let rank = self.rank;
        for peer in (0..n).filter(|&p| p != rank) {
            self.send_values(peer, REDUCE_TAG, &[local])?;
        }
        let mut total = T::zero();
        for peer in 0..n {
            let contribution = if peer == self.rank {
                local
            } else {
                let payload = self.recv_values(peer, REDUCE_TAG)?;
                if payload.len() != 1 {
                    return Err(TransportError::SizeMismatch {
                        peer,
                        expected: 1,
                        got: payload.len(),
                    });
                }
                payload[0]
            };
            total += contribution;
        }
        Ok(total)
    }
}

/// Per-level exchange state for one matrix's interfaces.
///
/// Owns one send and one receive slot per interface. Send buffers are
/// reused across outer iterations; received payloads arrive owned from the
/// communicator and are stored in the matching slot.
#[derive(Debug)]
pub struct PatchExchange<T: Scalar> {
    send_bufs: Vec<Vec<T>>,
    recv_bufs: Vec<Vec<T>>,
    posted: Vec<bool>,
}

impl<T: Scalar> PatchExchange<T> {
    /// Exchange state sized for `matrix`'s interfaces.
    pub fn for_matrix(matrix: &CoupledMatrix<T>) -> Self {
        let sizes: Vec<usize> = matrix.interfaces.iter().map(|i| i.len()).collect();
        Self {
            send_bufs: sizes.iter().map(|&s| Vec::with_capacity(s)).collect(),
            recv_bufs: sizes.iter().map(|&s| Vec::with_capacity(s)).collect(),
            posted: vec![false; sizes.len()],
        }
    }

    /// Post the exchange for one interface: gather the local boundary
    /// values of `x` and send them to the peer. No-op for cyclic
    /// interfaces, which read the partner patch locally at completion.
    pub fn post<C: Communicator<T>>(
        &mut self,
        matrix: &CoupledMatrix<T>,
        idx: usize,
        x: &Array1<T>,
        comm: &mut C,
    ) -> Result<(), TransportError> {
        let iface = &matrix.interfaces[idx];
        if let Coupling::Processor { peer, tag, .. } = iface.coupling {
            let buf = &mut self.send_bufs[idx];
            iface.gather(x, buf);
            comm.send_values(peer, tag, buf)?;
        }
        self.posted[idx] = true;
        Ok(())
    }

    /// Post every interface of the level. Always call this (or `post` for
    /// each interface) before the first `complete` of a product step.
    pub fn post_all<C: Communicator<T>>(
        &mut self,
        matrix: &CoupledMatrix<T>,
        x: &Array1<T>,
        comm: &mut C,
    ) -> Result<(), TransportError> {
        for idx in 0..matrix.interfaces.len() {
            self.post(matrix, idx, x, comm)?;
        }
        Ok(())
    }

    /// Complete the exchange for one interface and return the transformed
    /// partner values, one per face.
    ///
    /// Blocks for processor interfaces until the peer's payload lands; a
    /// payload whose length differs from the interface is a fatal protocol
    /// error. Cyclic interfaces read the partner patch's current values
    /// from `x`. Completing before posting is a programming error, caught
    /// by a debug assertion.
    pub fn complete<C: Communicator<T>>(
        &mut self,
        matrix: &CoupledMatrix<T>,
        idx: usize,
        x: &Array1<T>,
        comm: &mut C,
    ) -> Result<&[T], TransportError> {
        debug_assert!(
            self.posted[idx],
            "complete() before post() on interface {idx}"
        );
        let iface = &matrix.interfaces[idx];
        match &iface.coupling {
            Coupling::Processor {
                peer,
                tag,
                transform,
            } => {
                let got = comm.recv_values(*peer, *tag)?;
                if got.len() != iface.len() {
                    return Err(TransportError::SizeMismatch {
                        peer: *peer,
                        expected: iface.len(),
                        got: got.len(),
                    });
                }
                self.recv_bufs[idx] = got;
                transform.apply_scalar_field(&mut self.recv_bufs[idx]);
            }
            Coupling::Cyclic {
                partner, transform, ..
            } => {
                let partner_patch = &matrix.interfaces[*partner];
                let buf = &mut self.recv_bufs[idx];
                partner_patch.gather(x, buf);
                transform.apply_scalar_field(buf);
            }
        }
        self.posted[idx] = false;
        Ok(&self.recv_bufs[idx])
    }
}
