//! Garbage collection against a persisted index.

use std::fs;

use ferry_integration_tests::{Endpoint, KIB, test_data, transfer};

#[test]
fn test_deleted_file_chunks_collected_once() {
    let sender = Endpoint::new(64 * KIB);
    let receiver = Endpoint::new(64 * KIB);
    let path = sender.write_file("doomed.bin", &test_data(3 * 64 * KIB));

    let (_, received) = transfer(&sender, &receiver, &path);
    let received = received.unwrap();
    assert_eq!(receiver.blob_count(), 3);

    fs::remove_file(&received.destination).unwrap();
    let receiver = receiver.restart();

    let first = receiver.node.collect_garbage().unwrap();
    assert_eq!(first.digests_removed, 3);
    assert_eq!(first.blobs_deleted, 3);
    assert_eq!(receiver.blob_count(), 0);
    assert_eq!(receiver.row_count(), 0);

    let second = receiver.node.collect_garbage().unwrap();
    assert_eq!(second.digests_examined, 0);
    assert_eq!(second.digests_removed, 0);
}

#[test]
fn test_live_files_untouched() {
    let receiver = Endpoint::new(64 * KIB);
    let kept = receiver.write_file("kept.bin", &test_data(2 * 64 * KIB));
    receiver.node.seed_file(&kept).unwrap();

    let report = receiver.node.collect_garbage().unwrap();
    assert_eq!(report.digests_examined, 2);
    assert_eq!(report.digests_removed, 0);
    assert_eq!(receiver.blob_count(), 2);
    assert_eq!(receiver.row_count(), 2);
}
