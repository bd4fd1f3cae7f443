//! Full sender/receiver sessions between two endpoints with on-disk state.

use std::fs;

use ferry_cas::digest_file;
use ferry_integration_tests::{Endpoint, KIB, MIB, seeded_data, test_data, transfer};
use ferry_store::ChunkStore;
use ferry_types::Digest;

#[test]
fn test_ten_mib_to_fresh_receiver() {
    let sender = Endpoint::new(MIB);
    let receiver = Endpoint::new(MIB);
    let data = test_data(10 * MIB);
    let path = sender.write_file("ten.bin", &data);

    let (sent, received) = transfer(&sender, &receiver, &path);
    let sent = sent.unwrap();
    let received = received.unwrap();

    assert_eq!(sent.chunks, 10);
    assert_eq!(received.local, 0);
    assert_eq!(received.scavenged, 0);
    assert_eq!(received.remote, 10);
    assert_eq!(received.downloaded_chunks, 10);
    assert_eq!(
        digest_file(&received.destination).unwrap(),
        digest_file(&path).unwrap()
    );
    assert_eq!(receiver.row_count(), 10);
    assert_eq!(receiver.blob_count(), 10);
}

#[test]
fn test_receiver_with_all_blobs_requests_nothing() {
    let sender = Endpoint::new(MIB);
    let receiver = Endpoint::new(MIB);
    let data = test_data(10 * MIB);
    let path = sender.write_file("ten.bin", &data);

    let (_, first) = transfer(&sender, &receiver, &path);
    first.unwrap();

    let (sent, second) = transfer(&sender, &receiver, &path);
    let sent = sent.unwrap();
    let second = second.unwrap();
    assert_eq!(sent.requests_served, 0);
    assert_eq!(sent.bytes_sent, 0);
    assert_eq!(second.local, 10);
    assert_eq!(fs::read(&second.destination).unwrap(), data);
}

#[test]
fn test_chunk_scavenged_from_unrelated_file() {
    let sender = Endpoint::new(64 * KIB);
    let receiver = Endpoint::new(64 * KIB);
    let data = test_data(8 * 64 * KIB);
    let path = sender.write_file("eight.bin", &data);

    // An older local file holds chunk 5 at offset 128 KiB; its blobs are gone.
    let mut older = seeded_data(2 * 64 * KIB, 77);
    older.extend_from_slice(&data[5 * 64 * KIB..6 * 64 * KIB]);
    let older_path = receiver.write_file("older.bin", &older);
    let seeded = receiver.node.seed_file(&older_path).unwrap();
    for chunk in &seeded.chunks {
        receiver.store.delete(chunk.digest).unwrap();
    }

    let (sent, received) = transfer(&sender, &receiver, &path);
    let sent = sent.unwrap();
    let received = received.unwrap();
    assert_eq!(received.scavenged, 1);
    assert_eq!(received.remote, 7);
    assert_eq!(sent.requests_served, 7);
    assert_eq!(fs::read(&received.destination).unwrap(), data);
    assert_eq!(fs::read(&older_path).unwrap(), older);
}

#[test]
fn test_shared_chunk_deduplicated_across_files() {
    let sender = Endpoint::new(64 * KIB);
    let receiver = Endpoint::new(64 * KIB);
    let common = test_data(64 * KIB);
    let a = [common.as_slice(), &seeded_data(64 * KIB, 1)].concat();
    let b = [seeded_data(64 * KIB, 2).as_slice(), &common].concat();
    let a_path = sender.write_file("a.bin", &a);
    let b_path = sender.write_file("b.bin", &b);

    let (_, ra) = transfer(&sender, &receiver, &a_path);
    let (_, rb) = transfer(&sender, &receiver, &b_path);
    ra.unwrap();
    let rb = rb.unwrap();
    assert_eq!(rb.local, 1);

    assert_eq!(receiver.blob_count(), 3);
    let common_digest = Digest::from_data(&common);
    let rows: Vec<_> = receiver
        .meta
        .list_all()
        .unwrap()
        .into_iter()
        .filter(|(d, _)| *d == common_digest)
        .collect();
    assert_eq!(rows.len(), 2);
    assert_ne!(rows[0].1, rows[1].1);
}

#[test]
fn test_index_survives_restart() {
    let sender = Endpoint::new(64 * KIB);
    let receiver = Endpoint::new(64 * KIB);
    let data = test_data(5 * 64 * KIB + 123);
    let path = sender.write_file("five.bin", &data);

    let (_, first) = transfer(&sender, &receiver, &path);
    first.unwrap();

    let receiver = receiver.restart();
    assert_eq!(receiver.row_count(), 6);
    let (_, second) = transfer(&sender, &receiver, &path);
    let second = second.unwrap();
    assert_eq!(second.local, 6);
    assert_eq!(second.downloaded_chunks, 0);
}

#[test]
fn test_pooled_receiver_matches_serial() {
    let sender = Endpoint::new(64 * KIB);
    let serial = Endpoint::new(64 * KIB);
    let pooled = Endpoint::with_config(ferry_engine::FerryNodeConfig {
        chunk_size: 64 * KIB as u64,
        workers: 4,
        prefetch_size: 3,
        ..Default::default()
    });
    let data = test_data(30 * 64 * KIB + 5);
    let path = sender.write_file("thirty.bin", &data);

    let (_, a) = transfer(&sender, &serial, &path);
    let (_, b) = transfer(&sender, &pooled, &path);
    let a = a.unwrap();
    let b = b.unwrap();
    assert_eq!(a.downloaded_chunks, b.downloaded_chunks);
    assert_eq!(a.downloaded_bytes, b.downloaded_bytes);
    assert_eq!(fs::read(&a.destination).unwrap(), fs::read(&b.destination).unwrap());

    let mut sa = serial.store.list().unwrap();
    let mut sb = pooled.store.list().unwrap();
    sa.sort();
    sb.sort();
    assert_eq!(sa, sb);
}
