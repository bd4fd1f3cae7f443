//! Chunk classification: local hits, scavenging, remote fallback.

use std::fs;

use ferry_store::{BlobStatus, ChunkStore};

use crate::reconcile::ChunkState;

use super::helpers::{other_data, test_data, test_node};

const CHUNK: u64 = 1024;

#[test]
fn test_fresh_receiver_everything_remote() {
    let sender = test_node(CHUNK);
    let receiver = test_node(CHUNK);
    let path = sender.write_file("ten.bin", &test_data(10 * CHUNK as usize));
    let manifest = sender.node.chunk_file(&path).unwrap();

    let rec = receiver.node.reconcile(&manifest).unwrap();
    assert_eq!(rec.count(ChunkState::Remote), 10);
    assert_eq!(rec.count(ChunkState::Local), 0);
    assert_eq!(rec.count(ChunkState::Scavenged), 0);
    let indices: Vec<u64> = rec.downloads.iter().map(|r| r.index).collect();
    assert_eq!(indices, (0..10).collect::<Vec<_>>());
    assert_eq!(rec.missing.remaining(), 10);
}

#[test]
fn test_stored_blobs_resolve_local() {
    let sender = test_node(CHUNK);
    let receiver = test_node(CHUNK);
    let data = test_data(10 * CHUNK as usize);
    let path = sender.write_file("ten.bin", &data);
    let manifest = sender.node.chunk_file(&path).unwrap();

    let copy = receiver.write_file("copy.bin", &data);
    receiver.node.seed_file(&copy).unwrap();

    let rec = receiver.node.reconcile(&manifest).unwrap();
    assert_eq!(rec.count(ChunkState::Local), 10);
    assert!(rec.downloads.is_empty());
    assert!(rec.missing.is_complete());
}

#[test]
fn test_chunk_scavenged_from_other_file() {
    let sender = test_node(CHUNK);
    let receiver = test_node(CHUNK);
    let data = test_data(10 * CHUNK as usize);
    let path = sender.write_file("ten.bin", &data);
    let manifest = sender.node.chunk_file(&path).unwrap();

    // Chunk 3 of the sent file sits at offset 1024 of an unrelated local file.
    let mut local = other_data(CHUNK as usize, 7);
    local.extend_from_slice(&data[3 * CHUNK as usize..4 * CHUNK as usize]);
    let local_path = receiver.write_file("other.bin", &local);
    let seeded = receiver.node.seed_file(&local_path).unwrap();
    for chunk in &seeded.chunks {
        receiver.store.delete(chunk.digest).unwrap();
    }
    assert_eq!(receiver.blob_count(), 0);

    let rec = receiver.node.reconcile(&manifest).unwrap();
    assert_eq!(rec.states[3], ChunkState::Scavenged);
    assert_eq!(rec.count(ChunkState::Scavenged), 1);
    assert_eq!(rec.count(ChunkState::Remote), 9);
    assert!(rec.downloads.iter().all(|r| r.index != 3));
    assert_eq!(
        receiver.store.check(manifest.chunks[3].digest).unwrap(),
        BlobStatus::Valid
    );
    // The source file is only read.
    assert_eq!(fs::read(&local_path).unwrap(), local);
}

#[test]
fn test_stale_scavenge_source_skips_only_that_chunk() {
    let sender = test_node(CHUNK);
    let receiver = test_node(CHUNK);
    let data = test_data(4 * CHUNK as usize);
    let path = sender.write_file("four.bin", &data);
    let manifest = sender.node.chunk_file(&path).unwrap();

    let copy = receiver.write_file("copy.bin", &data);
    receiver.node.seed_file(&copy).unwrap();
    for chunk in &manifest.chunks {
        receiver.store.delete(chunk.digest).unwrap();
    }

    // Chunk 1 of the local copy changes after it was indexed.
    let mut edited = data.clone();
    edited[CHUNK as usize + 10] ^= 0x55;
    fs::write(&copy, &edited).unwrap();

    let rec = receiver.node.reconcile(&manifest).unwrap();
    assert_eq!(
        rec.states,
        vec![
            ChunkState::Scavenged,
            ChunkState::Remote,
            ChunkState::Scavenged,
            ChunkState::Scavenged,
        ]
    );
    assert_eq!(rec.downloads.len(), 1);
    assert_eq!(rec.downloads[0].index, 1);
}

#[test]
fn test_vanished_scavenge_source_is_skipped() {
    let sender = test_node(CHUNK);
    let receiver = test_node(CHUNK);
    let data = test_data(3 * CHUNK as usize);
    let path = sender.write_file("three.bin", &data);
    let manifest = sender.node.chunk_file(&path).unwrap();

    let copy = receiver.write_file("copy.bin", &data);
    receiver.node.seed_file(&copy).unwrap();
    for chunk in &manifest.chunks {
        receiver.store.delete(chunk.digest).unwrap();
    }
    fs::remove_file(&copy).unwrap();

    let rec = receiver.node.reconcile(&manifest).unwrap();
    assert_eq!(rec.count(ChunkState::Remote), 3);
}

#[test]
fn test_truncated_scavenge_source_is_skipped() {
    let sender = test_node(CHUNK);
    let receiver = test_node(CHUNK);
    let data = test_data(3 * CHUNK as usize);
    let path = sender.write_file("three.bin", &data);
    let manifest = sender.node.chunk_file(&path).unwrap();

    let copy = receiver.write_file("copy.bin", &data);
    receiver.node.seed_file(&copy).unwrap();
    for chunk in &manifest.chunks {
        receiver.store.delete(chunk.digest).unwrap();
    }
    fs::write(&copy, &data[..2 * CHUNK as usize + 100]).unwrap();

    let rec = receiver.node.reconcile(&manifest).unwrap();
    assert_eq!(rec.count(ChunkState::Scavenged), 2);
    assert_eq!(rec.states[2], ChunkState::Remote);
}

#[test]
fn test_corrupt_blob_is_not_local() {
    let sender = test_node(CHUNK);
    let receiver = test_node(CHUNK);
    let data = test_data(4 * CHUNK as usize);
    let path = sender.write_file("four.bin", &data);
    let manifest = sender.node.chunk_file(&path).unwrap();

    let copy = receiver.write_file("copy.bin", &data);
    receiver.node.seed_file(&copy).unwrap();
    let victim = manifest.chunks[2].digest;
    fs::write(receiver.store.blob_path(victim), b"not the chunk").unwrap();

    let rec = receiver.node.reconcile(&manifest).unwrap();
    // Falls through to the indexed copy, which repairs the blob.
    assert_eq!(rec.states[2], ChunkState::Scavenged);
    assert_eq!(rec.count(ChunkState::Local), 3);
    assert_eq!(receiver.store.check(victim).unwrap(), BlobStatus::Valid);
}

#[test]
fn test_corrupt_blob_without_other_copy_is_remote() {
    let sender = test_node(CHUNK);
    let receiver = test_node(CHUNK);
    let data = test_data(2 * CHUNK as usize);
    let path = sender.write_file("two.bin", &data);
    let manifest = sender.node.chunk_file(&path).unwrap();

    let first = manifest.chunks[0];
    receiver
        .store
        .put(first.digest, &data[..CHUNK as usize])
        .unwrap();
    fs::write(receiver.store.blob_path(first.digest), b"garbage").unwrap();

    let rec = receiver.node.reconcile(&manifest).unwrap();
    assert_eq!(rec.states, vec![ChunkState::Remote, ChunkState::Remote]);
}

#[test]
fn test_repeated_remote_digest_requested_once() {
    let sender = test_node(CHUNK);
    let receiver = test_node(CHUNK);
    let a = test_data(CHUNK as usize);
    let b = other_data(CHUNK as usize, 42);
    let data = [a.as_slice(), &b, &a, &a].concat();
    let path = sender.write_file("repeat.bin", &data);
    let manifest = sender.node.chunk_file(&path).unwrap();

    let rec = receiver.node.reconcile(&manifest).unwrap();
    assert_eq!(rec.count(ChunkState::Remote), 4);
    let indices: Vec<u64> = rec.downloads.iter().map(|r| r.index).collect();
    assert_eq!(indices, vec![0, 1]);
    assert_eq!(rec.missing.remaining(), 2);
}

#[test]
fn test_no_chunk_left_unknown() {
    let sender = test_node(CHUNK);
    let receiver = test_node(CHUNK);
    let data = test_data(5 * CHUNK as usize + 17);
    let path = sender.write_file("odd.bin", &data);
    let manifest = sender.node.chunk_file(&path).unwrap();

    let copy = receiver.write_file("prefix.bin", &data[..2 * CHUNK as usize]);
    receiver.node.seed_file(&copy).unwrap();

    let rec = receiver.node.reconcile(&manifest).unwrap();
    assert_eq!(rec.states.len(), 6);
    assert_eq!(rec.count(ChunkState::Unknown), 0);
    assert_eq!(rec.count(ChunkState::Local), 2);
    assert_eq!(rec.count(ChunkState::Remote), 4);
}
