//! Point-to-point communicators
//!
//! The executor moves tensors between ranks through a [`Communicator`]. The
//! primitive is symmetric: every participating rank issues the same
//! `send_recv(receiver, sender, tensor)` call, and the implementation decides
//! from its own rank whether to send `tensor` or to overwrite it with the
//! received payload. Calls block (await) until the local side completes.
//!
//! [`LocalCommunicator`] connects the ranks of a simulated world living in one
//! process through tokio channels. Each ordered `(sender, receiver)` pair has
//! its own FIFO, so messages between two ranks arrive in the order they were
//! sent, which is all the executor's canonical traversal requires.

use crate::error::{PipelineError, Result};
use crate::mesh::Rank;
use crate::tensor::Tensor;
use async_trait::async_trait;
use tokio::sync::{mpsc, Mutex};

/// Transport for point-to-point tensor transfers
#[async_trait]
pub trait Communicator: Send + Sync {
    /// Move `tensor` from `sender` to `receiver`
    ///
    /// On the sender rank `tensor` is the payload and is left untouched. On
    /// the receiver rank it is replaced by the received tensor. Other ranks
    /// return immediately.
    async fn send_recv(&self, receiver: Rank, sender: Rank, tensor: &mut Tensor) -> Result<()>;
}

/// In-process communicator endpoint for one rank of a simulated world
pub struct LocalCommunicator {
    rank: Rank,
    /// Outgoing channels indexed by destination rank
    outboxes: Vec<mpsc::UnboundedSender<Tensor>>,
    /// Incoming channels indexed by source rank
    inboxes: Vec<Mutex<mpsc::UnboundedReceiver<Tensor>>>,
}

impl LocalCommunicator {
    /// Create fully connected endpoints for ranks `0..world_size`
    ///
    /// ```rust
    /// use meshflow_core::communicator::LocalCommunicator;
    ///
    /// let endpoints = LocalCommunicator::group(3);
    /// assert_eq!(endpoints.len(), 3);
    /// assert_eq!(endpoints[2].rank(), 2);
    /// ```
    pub fn group(world_size: usize) -> Vec<LocalCommunicator> {
        let mut outboxes: Vec<Vec<mpsc::UnboundedSender<Tensor>>> =
            (0..world_size).map(|_| Vec::with_capacity(world_size)).collect();
        let mut inboxes: Vec<Vec<Option<mpsc::UnboundedReceiver<Tensor>>>> =
            (0..world_size).map(|_| (0..world_size).map(|_| None).collect()).collect();

        for src in 0..world_size {
            for dst in 0..world_size {
                let (tx, rx) = mpsc::unbounded_channel();
                outboxes[src].push(tx);
                inboxes[dst][src] = Some(rx);
            }
        }

        outboxes
            .into_iter()
            .zip(inboxes)
            .enumerate()
            .map(|(rank, (outboxes, inboxes))| LocalCommunicator {
                rank,
                outboxes,
                inboxes: inboxes.into_iter().flatten().map(Mutex::new).collect(),
            })
            .collect()
    }

    pub fn rank(&self) -> Rank {
        self.rank
    }

    pub fn world_size(&self) -> usize {
        self.outboxes.len()
    }

    fn check_rank(&self, rank: Rank) -> Result<()> {
        if rank >= self.world_size() {
            return Err(PipelineError::Communication(format!(
                "Rank {} is outside a world of {} ranks",
                rank,
                self.world_size()
            )));
        }
        Ok(())
    }
}

impl std::fmt::Debug for LocalCommunicator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalCommunicator")
            .field("rank", &self.rank)
            .field("world_size", &self.world_size())
            .finish()
    }
}

#[async_trait]
impl Communicator for LocalCommunicator {
    async fn send_recv(&self, receiver: Rank, sender: Rank, tensor: &mut Tensor) -> Result<()> {
        self.check_rank(receiver)?;
        self.check_rank(sender)?;

        if sender == receiver {
            return Ok(());
        }

        if self.rank == sender {
            tracing::trace!(rank = self.rank, to = receiver, "Sending payload");
            self.outboxes[receiver].send(tensor.clone()).map_err(|_| {
                PipelineError::Communication(format!("Rank {} is no longer receiving", receiver))
            })?;
        } else if self.rank == receiver {
            tracing::trace!(rank = self.rank, from = sender, "Waiting for payload");
            let mut inbox = self.inboxes[sender].lock().await;
            *tensor = inbox.recv().await.ok_or_else(|| {
                PipelineError::Communication(format!("Rank {} hung up before sending", sender))
            })?;
        }
        Ok(())
    }
}
