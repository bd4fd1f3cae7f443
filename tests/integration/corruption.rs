//! Tampered blobs and their effect on a transfer.

use std::fs;

use ferry_engine::ChunkState;
use ferry_integration_tests::{Endpoint, KIB, test_data, transfer};
use ferry_store::{BlobStatus, ChunkStore};

#[test]
fn test_tampered_blob_downloaded_again() {
    let sender = Endpoint::new(64 * KIB);
    let receiver = Endpoint::new(64 * KIB);
    let data = test_data(4 * 64 * KIB);
    let path = sender.write_file("four.bin", &data);

    let (_, first) = transfer(&sender, &receiver, &path);
    let first = first.unwrap();
    // Only the store copy is damaged; the received file itself is gone.
    fs::remove_file(&first.destination).unwrap();

    let manifest = sender.node.chunk_file(&path).unwrap();
    let victim = manifest.chunks[1].digest;
    let blob = receiver.store.blob_path(victim);
    let mut bytes = fs::read(&blob).unwrap();
    bytes[100] ^= 0xA5;
    fs::write(&blob, &bytes).unwrap();
    assert!(matches!(
        receiver.store.check(victim).unwrap(),
        BlobStatus::Corrupt { .. }
    ));

    let rec = receiver.node.reconcile(&manifest).unwrap();
    assert_eq!(rec.states[1], ChunkState::Remote);
    assert_eq!(rec.count(ChunkState::Local), 3);

    let (sent, second) = transfer(&sender, &receiver, &path);
    let sent = sent.unwrap();
    let second = second.unwrap();
    assert_eq!(sent.requests_served, 1);
    assert_eq!(second.remote, 1);
    assert_eq!(fs::read(&second.destination).unwrap(), data);
    assert_eq!(receiver.store.check(victim).unwrap(), BlobStatus::Valid);
}

#[test]
fn test_tampered_blob_with_surviving_copy_is_scavenged() {
    let sender = Endpoint::new(64 * KIB);
    let receiver = Endpoint::new(64 * KIB);
    let data = test_data(4 * 64 * KIB);
    let path = sender.write_file("four.bin", &data);

    let (_, first) = transfer(&sender, &receiver, &path);
    first.unwrap();

    let manifest = sender.node.chunk_file(&path).unwrap();
    let victim = manifest.chunks[3].digest;
    fs::write(receiver.store.blob_path(victim), b"bitrot").unwrap();

    let (sent, second) = transfer(&sender, &receiver, &path);
    let sent = sent.unwrap();
    let second = second.unwrap();
    assert_eq!(second.scavenged, 1);
    assert_eq!(sent.requests_served, 0);
    assert_eq!(fs::read(&second.destination).unwrap(), data);
}
