//! End-to-end tests for the Stratus client
//!
//! Drives the full path (split, hash, process, disperse, record metadata,
//! then read/check/repair/delete) against in-memory shards and an
//! in-memory metadata store.

use rand::RngCore;
use std::collections::{BTreeMap, HashSet};
use std::io::Cursor;
use std::sync::Arc;
use stratus_client::{
    default_hasher_constructor, default_processor_constructor, CheckStatus, Client,
    ErasureStorage, Pipeline, ProcessorConstructor, ReplicationStorage, SingleStorage,
};
use stratus_core::{
    CompressionAlgorithm, CompressionMode, ErasureConfig, ProcessorChain, StratusError,
};
use stratus_metadata::{MemoryMetaDb, MetaClient, ObjectLocation};
use stratus_shard::{DynShard, MemoryShard, ShardClient, ShardCluster, SpreadingPolicy};

const AES_KEY: &[u8] = b"cF0BFpIsljOS8UmaP8YRHRX0nBPVRVPw";

enum Mode {
    Single,
    Replication(usize),
    Erasure(usize, usize),
}

fn build_client(
    shard_count: usize,
    block_size: usize,
    mode: Mode,
    processor_ctor: ProcessorConstructor,
) -> (Vec<Arc<MemoryShard>>, Client) {
    let shards: Vec<Arc<MemoryShard>> = (0..shard_count)
        .map(|i| Arc::new(MemoryShard::new(format!("shard-{}", i), "testns")))
        .collect();
    let dyn_shards: Vec<DynShard> = shards.iter().map(|s| s.clone() as DynShard).collect();
    let cluster = Arc::new(ShardCluster::new(dyn_shards, SpreadingPolicy::Random).unwrap());

    let storage: Arc<dyn stratus_client::ChunkStorage> = match mode {
        Mode::Single => Arc::new(SingleStorage::new(cluster)),
        Mode::Replication(r) => Arc::new(ReplicationStorage::new(cluster, r).unwrap()),
        Mode::Erasure(d, p) => Arc::new(
            ErasureStorage::new(cluster, ErasureConfig::new(d, p).unwrap()).unwrap(),
        ),
    };

    let pipeline = Pipeline::new(
        block_size,
        storage,
        default_hasher_constructor(),
        processor_ctor,
    )
    .with_workers(4);

    let metastor = MetaClient::new(Arc::new(MemoryMetaDb::new()), "testns").unwrap();
    (shards, Client::new(pipeline, metastor))
}

fn random_bytes(len: usize) -> Vec<u8> {
    let mut data = vec![0u8; len];
    rand::thread_rng().fill_bytes(&mut data);
    data
}

async fn read_all(client: &Client, metadata: &stratus_metadata::Metadata) -> Vec<u8> {
    let mut output = Vec::new();
    client.read(metadata, &mut output).await.unwrap();
    output
}

async fn delete_object(shards: &[Arc<MemoryShard>], object: &ObjectLocation) {
    shards
        .iter()
        .find(|s| s.identifier() == object.shard_id)
        .unwrap()
        .delete_object(&object.key)
        .await
        .unwrap();
}

// 4 shards; block 64; no processing; replication 4; 256 random bytes
#[tokio::test]
async fn replicated_write_spreads_over_all_shards() {
    let (_shards, client) = build_client(4, 64, Mode::Replication(4), default_processor_constructor());
    let input = random_bytes(256);

    let metadata = client
        .write(b"scenario-1", Cursor::new(input.clone()))
        .await
        .unwrap();

    assert_eq!(metadata.size, 256);
    assert_eq!(metadata.chunks.len(), 4);
    for chunk in &metadata.chunks {
        assert_eq!(chunk.size, 64);
        assert_eq!(chunk.objects.len(), 4);
        let ids: HashSet<_> = chunk.objects.iter().map(|o| &o.shard_id).collect();
        assert_eq!(ids.len(), 4);
    }

    assert_eq!(read_all(&client, &metadata).await, input);
}

// 4 shards; block 256; snappy + AES-GCM; erasure 2+1; 2560 random bytes;
// one object lost per chunk -> Valid; repair -> readable again
#[tokio::test]
async fn erasure_survives_loss_and_repairs() {
    let processor_ctor: ProcessorConstructor = Arc::new(|| {
        ProcessorChain::builder(
            Some((CompressionAlgorithm::Snappy, CompressionMode::Default)),
            Some(AES_KEY),
        )
    });
    let (shards, client) = build_client(4, 256, Mode::Erasure(2, 1), processor_ctor);
    let input = random_bytes(2560);

    let metadata = client
        .write(b"scenario-2", Cursor::new(input.clone()))
        .await
        .unwrap();
    assert_eq!(metadata.chunks.len(), 10);
    assert!(metadata.chunks.iter().all(|c| c.objects.len() == 3));
    assert_eq!(client.check(&metadata, false).await.unwrap(), CheckStatus::Optimal);

    // lose one object per chunk, rotating the victim position
    for (i, chunk) in metadata.chunks.iter().enumerate() {
        delete_object(&shards, &chunk.objects[i % 3]).await;
    }
    assert_eq!(client.check(&metadata, false).await.unwrap(), CheckStatus::Valid);

    let repaired = client.repair(&metadata).await.unwrap();
    assert_eq!(repaired.size, metadata.size);
    assert!(repaired.last_write_epoch > metadata.last_write_epoch);
    assert_eq!(
        client.check(&repaired, false).await.unwrap(),
        CheckStatus::Optimal
    );

    assert_eq!(read_all(&client, &repaired).await, input);
}

// 4 shards; block 256; erasure 2+1; range read spanning two chunks
#[tokio::test]
async fn range_read_spans_chunks() {
    let (_shards, client) = build_client(4, 256, Mode::Erasure(2, 1), default_processor_constructor());
    let input = random_bytes(256 * 10);

    let metadata = client
        .write(b"scenario-3", Cursor::new(input.clone()))
        .await
        .unwrap();

    let mut output = Vec::new();
    client
        .read_range(&metadata, &mut output, 257, 255)
        .await
        .unwrap();
    assert_eq!(output.len(), 255);
    assert_eq!(output, &input[257..512]);

    // full stream through the range path
    let mut output = Vec::new();
    client
        .read_range(&metadata, &mut output, 0, input.len() as u64)
        .await
        .unwrap();
    assert_eq!(output, input);

    // zero-length range
    let mut output = Vec::new();
    client.read_range(&metadata, &mut output, 512, 0).await.unwrap();
    assert!(output.is_empty());
}

// 1 shard; block 0; single mode; repair is not supported
#[tokio::test]
async fn single_mode_stores_one_chunk_and_rejects_repair() {
    let (_shards, client) = build_client(1, 0, Mode::Single, default_processor_constructor());
    let input = random_bytes(10 * 1024);

    let metadata = client
        .write(b"scenario-4", Cursor::new(input.clone()))
        .await
        .unwrap();
    assert_eq!(metadata.chunks.len(), 1);
    assert_eq!(metadata.size, input.len() as u64);

    assert_eq!(
        client.check(&metadata, false).await.unwrap(),
        CheckStatus::Optimal
    );
    assert!(matches!(
        client.repair(&metadata).await,
        Err(StratusError::NotSupported)
    ));
    assert_eq!(read_all(&client, &metadata).await, input);
}

// 4 shards; replication 4; object lost on three shards; read still succeeds
#[tokio::test]
async fn replicated_read_survives_three_losses() {
    let (shards, client) = build_client(4, 0, Mode::Replication(4), default_processor_constructor());
    let input = random_bytes(64);

    let metadata = client
        .write(b"scenario-5", Cursor::new(input.clone()))
        .await
        .unwrap();

    let chunk = &metadata.chunks[0];
    for object in &chunk.objects[..3] {
        delete_object(&shards, object).await;
    }

    assert_eq!(read_all(&client, &metadata).await, input);
}

// 4 shards; erasure 2+1; ten concurrent writers against distinct keys
#[tokio::test]
async fn concurrent_writers_on_distinct_keys() {
    let (_shards, client) = build_client(4, 0, Mode::Erasure(2, 1), default_processor_constructor());
    let client = Arc::new(client);

    let mut handles = Vec::new();
    for i in 0..10 {
        let client = client.clone();
        let input = random_bytes(1024);
        handles.push(tokio::spawn(async move {
            let key = format!("writer-{}", i).into_bytes();
            let metadata = client.write(&key, Cursor::new(input.clone())).await?;
            let mut output = Vec::new();
            client.read(&metadata, &mut output).await?;
            Ok::<_, StratusError>((metadata, input, output))
        }));
    }

    for handle in handles {
        let (metadata, input, output) = handle.await.unwrap().unwrap();
        assert_eq!(metadata.size, 1024);
        assert_eq!(output, input);
    }
}

#[tokio::test]
async fn delete_removes_objects_and_metadata() {
    let (shards, client) = build_client(4, 128, Mode::Erasure(2, 1), default_processor_constructor());
    let input = random_bytes(512);

    let metadata = client
        .write(b"deleted", Cursor::new(input))
        .await
        .unwrap();
    assert!(shards.iter().map(|s| s.object_count()).sum::<usize>() > 0);

    client.delete(&metadata).await.unwrap();
    assert_eq!(shards.iter().map(|s| s.object_count()).sum::<usize>(), 0);
    assert!(matches!(
        client.meta_client().get_metadata(b"deleted").await,
        Err(StratusError::KeyNotFound)
    ));

    // deleting an already-deleted stream only misses the metadata record
    assert!(client.delete(&metadata).await.is_ok());
}

#[tokio::test]
async fn empty_stream_roundtrip() {
    let (_shards, client) = build_client(2, 64, Mode::Replication(2), default_processor_constructor());

    let metadata = client.write(b"empty", Cursor::new(Vec::new())).await.unwrap();
    assert_eq!(metadata.size, 0);
    assert!(metadata.chunks.is_empty());

    assert!(read_all(&client, &metadata).await.is_empty());
    assert_eq!(
        client.check(&metadata, false).await.unwrap(),
        CheckStatus::Optimal
    );
}

#[tokio::test]
async fn empty_key_is_rejected() {
    let (_shards, client) = build_client(1, 0, Mode::Single, default_processor_constructor());
    assert!(matches!(
        client.write(b"", Cursor::new(vec![1u8; 8])).await,
        Err(StratusError::InvalidInput(_))
    ));
}

#[tokio::test]
async fn user_defined_metadata_is_kept() {
    let (_shards, client) = build_client(2, 0, Mode::Replication(2), default_processor_constructor());

    let mut user = BTreeMap::new();
    user.insert("content-type".to_string(), "text/plain".to_string());
    user.insert("origin".to_string(), "integration-test".to_string());

    let metadata = client
        .write_with_user_meta(b"tagged", Cursor::new(random_bytes(32)), user.clone())
        .await
        .unwrap();
    assert_eq!(metadata.user_defined, user);

    let fetched = client.meta_client().get_metadata(b"tagged").await.unwrap();
    assert_eq!(fetched.user_defined, user);
}

#[tokio::test]
async fn linked_records_point_at_each_other() {
    let (_shards, client) = build_client(2, 0, Mode::Replication(2), default_processor_constructor());

    client
        .write(b"first", Cursor::new(random_bytes(16)))
        .await
        .unwrap();
    let second = client
        .write_with_linked_previous(b"second", b"first", Cursor::new(random_bytes(16)))
        .await
        .unwrap();

    assert_eq!(second.previous_key.as_deref(), Some(&b"first"[..]));
    let first = client.meta_client().get_metadata(b"first").await.unwrap();
    assert_eq!(first.next_key.as_deref(), Some(&b"second"[..]));
}

#[tokio::test]
async fn linking_to_missing_record_fails() {
    let (_shards, client) = build_client(2, 0, Mode::Replication(2), default_processor_constructor());
    assert!(matches!(
        client
            .write_with_linked_previous(b"new", b"missing", Cursor::new(vec![0u8; 8]))
            .await,
        Err(StratusError::KeyNotFound)
    ));
}

#[tokio::test]
async fn rewrite_keeps_creation_time_and_advances_last_write() {
    let (_shards, client) = build_client(2, 0, Mode::Replication(2), default_processor_constructor());

    let first = client
        .write(b"rewritten", Cursor::new(random_bytes(64)))
        .await
        .unwrap();
    let second = client
        .write(b"rewritten", Cursor::new(random_bytes(128)))
        .await
        .unwrap();

    assert_eq!(second.created_epoch, first.created_epoch);
    assert!(second.last_write_epoch > first.last_write_epoch);
    assert_eq!(second.size, 128);
}

#[tokio::test]
async fn metadata_survives_encode_decode() {
    let (_shards, client) = build_client(4, 100, Mode::Erasure(2, 2), default_processor_constructor());
    let input = random_bytes(1000);

    let written = client
        .write(b"encoded", Cursor::new(input.clone()))
        .await
        .unwrap();
    let fetched = client.meta_client().get_metadata(b"encoded").await.unwrap();
    assert_eq!(fetched, written);

    assert_eq!(read_all(&client, &fetched).await, input);
}

#[tokio::test]
async fn cancelled_client_rejects_operations() {
    let (_shards, client) = build_client(1, 16, Mode::Single, default_processor_constructor());
    client.cancellation_token().cancel();

    assert!(matches!(
        client.write(b"late", Cursor::new(vec![0u8; 64])).await,
        Err(StratusError::Cancelled)
    ));
}
