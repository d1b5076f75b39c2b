//! Erasure-coded storage: D+P Reed-Solomon shares on D+P distinct shards
//!
//! Unlike replication, parity shards are not redundant copies: all D+P
//! shares must be placed for a write to succeed, and any D of them suffice
//! to reconstruct the block.

use super::{delete_objects, fetch_object, object_is_ok, ChunkConfig, ChunkStorage, CheckStatus};
use async_trait::async_trait;
use bytes::Bytes;
use futures::future::join_all;
use std::sync::Arc;
use stratus_core::{ErasureCodec, ErasureConfig, Result, StratusError};
use stratus_metadata::ObjectLocation;
use stratus_shard::{ShardClient, ShardCluster};
use tracing::{debug, warn};

/// Stores each chunk as `data + parity` Reed-Solomon shares, one per shard
pub struct ErasureStorage {
    cluster: Arc<ShardCluster>,
    codec: ErasureCodec,
}

impl ErasureStorage {
    /// Create an erasure-coded storage with the given geometry
    pub fn new(cluster: Arc<ShardCluster>, config: ErasureConfig) -> Result<Self> {
        if config.total_shards() > cluster.listed_count() {
            return Err(StratusError::InvalidInput(format!(
                "erasure geometry {}+{} exceeds listed shard count {}",
                config.data_shards,
                config.parity_shards,
                cluster.listed_count()
            )));
        }
        Ok(Self {
            cluster,
            codec: ErasureCodec::new(config)?,
        })
    }

    fn data_shards(&self) -> usize {
        self.codec.config().data_shards
    }

    fn total_shards(&self) -> usize {
        self.codec.config().total_shards()
    }

    fn expect_total<'a>(&self, config: &'a ChunkConfig) -> Result<&'a [ObjectLocation]> {
        if config.objects.len() != self.total_shards() {
            return Err(StratusError::InvalidInput(format!(
                "erasure placement has {} objects, expected {}",
                config.objects.len(),
                self.total_shards()
            )));
        }
        Ok(&config.objects)
    }

    /// Place `shares[i]` for every position in `positions`, rolling failed
    /// placements forward onto the next shard from `iter`.
    async fn place_shares(
        &self,
        shares: &[Bytes],
        slots: &mut [Option<ObjectLocation>],
        positions: Vec<usize>,
        iter: &mut stratus_shard::ShardIterator,
    ) -> Result<()> {
        let mut pending: Vec<(usize, stratus_shard::DynShard)> = Vec::new();
        for position in positions {
            let shard = iter.next().ok_or_else(|| StratusError::WriteInsufficient {
                placed: slots.iter().filter(|s| s.is_some()).count(),
                required: self.total_shards(),
            })?;
            pending.push((position, shard));
        }

        while !pending.is_empty() {
            let puts = pending.drain(..).map(|(position, shard)| {
                let share = shares[position].clone();
                async move {
                    let id = shard.identifier().to_string();
                    (position, id, shard.put_object(share).await)
                }
            });

            let mut retry = Vec::new();
            for (position, shard_id, result) in join_all(puts).await {
                match result {
                    Ok(key) => slots[position] = Some(ObjectLocation { shard_id, key }),
                    Err(StratusError::NamespaceFull) => return Err(StratusError::NamespaceFull),
                    Err(err) => {
                        warn!(shard = %shard_id, position, error = %err, "share put failed, rolling forward");
                        retry.push(position);
                    }
                }
            }

            for position in retry {
                let shard = iter.next().ok_or_else(|| StratusError::WriteInsufficient {
                    placed: slots.iter().filter(|s| s.is_some()).count(),
                    required: self.total_shards(),
                })?;
                pending.push((position, shard));
            }
        }
        Ok(())
    }

    /// Gather at least `data_shards` shares, trying placements in recorded
    /// order and pulling further positions in as earlier ones fail.
    async fn gather_shares(
        &self,
        objects: &[ObjectLocation],
    ) -> Result<Vec<Option<Vec<u8>>>> {
        let total = self.total_shards();
        let required = self.data_shards();

        let mut shares: Vec<Option<Vec<u8>>> = vec![None; total];
        let mut have = 0usize;
        let mut next_position = required;
        let mut wave: Vec<usize> = (0..required).collect();

        while have < required {
            if wave.is_empty() {
                return Err(StratusError::ReadInsufficient {
                    available: have,
                    required,
                });
            }

            let fetches = wave.drain(..).map(|position| {
                let object = objects[position].clone();
                let cluster = self.cluster.clone();
                async move { (position, fetch_object(&cluster, &object).await) }
            });

            let mut failures = 0usize;
            for (position, result) in join_all(fetches).await {
                match result {
                    Ok(data) => {
                        shares[position] = Some(data.to_vec());
                        have += 1;
                    }
                    Err(err) => {
                        debug!(position, error = %err, "share unavailable");
                        failures += 1;
                    }
                }
            }

            for _ in 0..failures {
                if next_position < total {
                    wave.push(next_position);
                    next_position += 1;
                }
            }
        }

        Ok(shares)
    }
}

#[async_trait]
impl ChunkStorage for ErasureStorage {
    async fn write_chunk(&self, data: Bytes) -> Result<ChunkConfig> {
        let shares: Vec<Bytes> = self
            .codec
            .encode(&data)?
            .into_iter()
            .map(Bytes::from)
            .collect();

        let total = shares.len();
        let mut slots: Vec<Option<ObjectLocation>> = vec![None; total];
        let mut iter = self.cluster.iterator(&[]);
        self.place_shares(&shares, &mut slots, (0..total).collect(), &mut iter)
            .await?;

        let objects = slots
            .into_iter()
            .map(|slot| {
                slot.ok_or_else(|| {
                    StratusError::Internal("share placement left an empty slot".to_string())
                })
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(ChunkConfig { objects })
    }

    async fn read_chunk(&self, config: &ChunkConfig) -> Result<Bytes> {
        let objects = self.expect_total(config)?;
        let mut shares = self.gather_shares(objects).await?;
        let payload = self.codec.decode(&mut shares)?;
        Ok(Bytes::from(payload))
    }

    async fn check_chunk(&self, config: &ChunkConfig, fast: bool) -> Result<CheckStatus> {
        let objects = self.expect_total(config)?;
        let required = self.data_shards();

        if fast {
            let mut live = 0usize;
            for (index, object) in objects.iter().enumerate() {
                if object_is_ok(&self.cluster, object).await {
                    live += 1;
                    // enough to read and already degraded: no need to look further
                    if live >= required && live < index + 1 {
                        return Ok(CheckStatus::Valid);
                    }
                } else if objects.len() - (index + 1) + live < required {
                    return Ok(CheckStatus::Invalid);
                }
            }
            return Ok(if live == objects.len() {
                CheckStatus::Optimal
            } else if live >= required {
                CheckStatus::Valid
            } else {
                CheckStatus::Invalid
            });
        }

        let checks = objects
            .iter()
            .map(|object| object_is_ok(&self.cluster, object));
        let live = join_all(checks).await.into_iter().filter(|ok| *ok).count();

        Ok(if live == objects.len() {
            CheckStatus::Optimal
        } else if live >= required {
            CheckStatus::Valid
        } else {
            CheckStatus::Invalid
        })
    }

    async fn repair_chunk(&self, config: &ChunkConfig) -> Result<ChunkConfig> {
        let objects = self.expect_total(config)?;
        let required = self.data_shards();

        // probe which placements survived
        let probes = objects
            .iter()
            .map(|object| object_is_ok(&self.cluster, object));
        let alive: Vec<bool> = join_all(probes).await;

        let survivors = alive.iter().filter(|ok| **ok).count();
        if survivors < required {
            return Err(StratusError::InsufficientShares {
                available: survivors,
                required,
            });
        }

        // fetch the surviving shares (any `required` of them suffice)
        let mut shares: Vec<Option<Vec<u8>>> = vec![None; objects.len()];
        let mut have = 0usize;
        let mut lost: Vec<usize> = Vec::new();
        for (position, object) in objects.iter().enumerate() {
            if !alive[position] {
                lost.push(position);
                continue;
            }
            if have >= required {
                continue;
            }
            match fetch_object(&self.cluster, object).await {
                Ok(data) => {
                    shares[position] = Some(data.to_vec());
                    have += 1;
                }
                Err(err) => {
                    debug!(position, error = %err, "surviving share unreadable during repair");
                    lost.push(position);
                }
            }
        }
        if have < required {
            return Err(StratusError::InsufficientShares {
                available: have,
                required,
            });
        }

        // regenerate every share, then re-place the lost positions
        self.codec.reconstruct(&mut shares)?;
        let share_bytes: Vec<Bytes> = shares
            .into_iter()
            .map(|share| {
                share.map(Bytes::from).ok_or_else(|| {
                    StratusError::Internal("reconstruction left a share missing".to_string())
                })
            })
            .collect::<Result<Vec<_>>>()?;

        let mut slots: Vec<Option<ObjectLocation>> =
            objects.iter().cloned().map(Some).collect();
        let healthy: Vec<String> = objects
            .iter()
            .enumerate()
            .filter(|(position, _)| !lost.contains(position))
            .map(|(_, object)| object.shard_id.clone())
            .collect();

        lost.sort_unstable();
        lost.dedup();
        let mut iter = self.cluster.iterator(&healthy);
        self.place_shares(&share_bytes, &mut slots, lost, &mut iter)
            .await?;

        let objects = slots
            .into_iter()
            .map(|slot| {
                slot.ok_or_else(|| {
                    StratusError::Internal("repair left an empty placement slot".to_string())
                })
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(ChunkConfig { objects })
    }

    async fn delete_chunk(&self, config: &ChunkConfig) -> Result<()> {
        delete_objects(&self.cluster, &config.objects).await
    }
}
