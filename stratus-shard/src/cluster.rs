//! Shard cluster
//!
//! Holds one [`ShardClient`] per configured shard and hands out shards for
//! placement according to the configured spreading policy.

use crate::client::ShardClient;
use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use stratus_core::{Result, StratusError};
use tracing::error;

/// Shared handle to a shard client
pub type DynShard = Arc<dyn ShardClient>;

/// Order in which a cluster hands out shards for placement
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SpreadingPolicy {
    /// Uniform random permutation of the candidate shards
    #[default]
    Random,
    /// Ascending by cached utilization; ties keep the configured shard order
    LeastUsed,
}

/// A fixed set of shards with identifier lookup and policy-driven iteration.
///
/// The shard set is immutable after construction.
pub struct ShardCluster {
    listed: HashMap<String, DynShard>,
    /// Shards in configuration order; the stable tie-break for LeastUsed
    snapshot: Vec<DynShard>,
    policy: SpreadingPolicy,
}

impl ShardCluster {
    /// Create a cluster from a non-empty shard list
    pub fn new(shards: Vec<DynShard>, policy: SpreadingPolicy) -> Result<Self> {
        if shards.is_empty() {
            return Err(StratusError::InvalidInput(
                "cluster requires at least one shard".to_string(),
            ));
        }

        let mut listed = HashMap::with_capacity(shards.len());
        for shard in &shards {
            let id = shard.identifier().to_string();
            if listed.insert(id.clone(), shard.clone()).is_some() {
                return Err(StratusError::InvalidInput(format!(
                    "duplicate shard identifier: {}",
                    id
                )));
            }
        }

        Ok(Self {
            listed,
            snapshot: shards,
            policy,
        })
    }

    /// Exact lookup by shard identifier
    pub fn get(&self, shard_id: &str) -> Result<DynShard> {
        self.listed
            .get(shard_id)
            .cloned()
            .ok_or_else(|| StratusError::ShardNotFound(shard_id.to_string()))
    }

    /// Uniform random pick across all listed shards
    pub fn random(&self) -> DynShard {
        let index = rand::thread_rng().gen_range(0..self.snapshot.len());
        self.snapshot[index].clone()
    }

    /// Iterate the shards not named in `except`, in policy order.
    ///
    /// Each remaining shard is yielded at most once; the iterator ends when
    /// the set is exhausted.
    pub fn iterator(&self, except: &[String]) -> ShardIterator {
        let except: HashSet<&str> = except.iter().map(|s| s.as_str()).collect();
        let mut shards: Vec<DynShard> = self
            .snapshot
            .iter()
            .filter(|shard| !except.contains(shard.identifier()))
            .cloned()
            .collect();

        match self.policy {
            SpreadingPolicy::Random => {
                shards.shuffle(&mut rand::thread_rng());
            }
            SpreadingPolicy::LeastUsed => {
                // stable: equal utilization keeps snapshot order
                shards.sort_by_key(|shard| shard.utilization());
            }
        }

        ShardIterator { shards, pos: 0 }
    }

    /// Number of listed shards
    pub fn listed_count(&self) -> usize {
        self.snapshot.len()
    }

    /// The cluster's spreading policy
    pub fn policy(&self) -> SpreadingPolicy {
        self.policy
    }

    /// Close all shard clients, best effort. Returns an aggregate error if
    /// any shard failed to close.
    pub async fn close(&self) -> Result<()> {
        let mut failures = 0usize;
        for shard in &self.snapshot {
            if let Err(err) = shard.close().await {
                failures += 1;
                error!(shard = shard.identifier(), error = %err, "failed to close shard");
            }
        }
        if failures > 0 {
            return Err(StratusError::Internal(format!(
                "{} shard(s) failed to close",
                failures
            )));
        }
        Ok(())
    }
}

/// Policy-ordered shard iterator produced by [`ShardCluster::iterator`]
pub struct ShardIterator {
    shards: Vec<DynShard>,
    pos: usize,
}

impl Iterator for ShardIterator {
    type Item = DynShard;

    fn next(&mut self) -> Option<DynShard> {
        let shard = self.shards.get(self.pos)?.clone();
        self.pos += 1;
        Some(shard)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.shards.len() - self.pos;
        (remaining, Some(remaining))
    }
}

impl ExactSizeIterator for ShardIterator {}
