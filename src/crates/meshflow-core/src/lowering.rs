//! Communication lowering
//!
//! Turns one cross-mesh edge into a list of point-to-point transfers. Each
//! [`TransferDescriptor`] names a root sender and the receivers it serves; the
//! receivers of all descriptors of one edge partition the receiver set.
//!
//! # Policies
//!
//! | Policy | Assignment | Receivers per sender |
//! |--------|------------|----------------------|
//! | [`EvenSplitLowering`] | contiguous slices of R, in order | floor(R/S); the first R mod S senders get one more |
//! | [`RoundRobinLowering`] | receiver *i* → sender *i* mod S | same counts, interleaved |
//!
//! ```text
//! S = [a, b], R = [r0, r1, r2]
//!
//! even split:   a -> [r0, r1]   b -> [r2]
//! round robin:  a -> [r0, r2]   b -> [r1]
//! ```
//!
//! Neither policy looks at network topology. A topology-aware scheduler can be
//! plugged into the executor by implementing [`CommunicationLowering`].

use crate::config::LoweringPolicy;
use crate::error::{PipelineError, Result};
use crate::mesh::Rank;
use serde::Serialize;
use std::sync::Arc;

/// One root sender and the receivers it must send to
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TransferDescriptor {
    pub root: Rank,
    /// Receivers served by `root`, excluding `root` itself unless it is also
    /// an assigned receiver
    pub receivers: Vec<Rank>,
}

impl TransferDescriptor {
    /// Full team: the root followed by its receivers
    pub fn team(&self) -> Vec<Rank> {
        let mut team = Vec::with_capacity(self.receivers.len() + 1);
        team.push(self.root);
        team.extend_from_slice(&self.receivers);
        team
    }
}

/// Strategy distributing receivers among senders
pub trait CommunicationLowering: Send + Sync {
    /// Produce one descriptor per sender, in sender order
    ///
    /// # Errors
    ///
    /// [`PipelineError::EmptySenderSet`] when `senders` is empty.
    fn lower(&self, edge: &str, senders: &[Rank], receivers: &[Rank]) -> Result<Vec<TransferDescriptor>>;
}

/// Contiguous, evenly balanced split of the receivers
#[derive(Debug, Clone, Copy, Default)]
pub struct EvenSplitLowering;

impl CommunicationLowering for EvenSplitLowering {
    fn lower(&self, edge: &str, senders: &[Rank], receivers: &[Rank]) -> Result<Vec<TransferDescriptor>> {
        if senders.is_empty() {
            return Err(PipelineError::EmptySenderSet(edge.to_string()));
        }
        let per_sender = receivers.len() / senders.len();
        let remainder = receivers.len() % senders.len();

        let mut next = 0;
        Ok(senders
            .iter()
            .enumerate()
            .map(|(i, &root)| {
                let take = per_sender + usize::from(i < remainder);
                let slice = receivers[next..next + take].to_vec();
                next += take;
                TransferDescriptor { root, receivers: slice }
            })
            .collect())
    }
}

/// Interleaved assignment: receiver `i` goes to sender `i mod |S|`
#[derive(Debug, Clone, Copy, Default)]
pub struct RoundRobinLowering;

impl CommunicationLowering for RoundRobinLowering {
    fn lower(&self, edge: &str, senders: &[Rank], receivers: &[Rank]) -> Result<Vec<TransferDescriptor>> {
        if senders.is_empty() {
            return Err(PipelineError::EmptySenderSet(edge.to_string()));
        }
        let mut descriptors: Vec<TransferDescriptor> = senders
            .iter()
            .map(|&root| TransferDescriptor { root, receivers: Vec::new() })
            .collect();
        for (i, &receiver) in receivers.iter().enumerate() {
            descriptors[i % senders.len()].receivers.push(receiver);
        }
        Ok(descriptors)
    }
}

/// Lowering implementation for a configured policy
pub fn lowering_for(policy: LoweringPolicy) -> Arc<dyn CommunicationLowering> {
    match policy {
        LoweringPolicy::EvenSplit => Arc::new(EvenSplitLowering),
        LoweringPolicy::RoundRobin => Arc::new(RoundRobinLowering),
    }
}
