//! Sessions over real OS channels.

use std::fs;

use ferry_integration_tests::{Endpoint, KIB, test_data, transfer_tcp};

#[test]
fn test_transfer_over_tcp_loopback() {
    let sender = Endpoint::new(64 * KIB);
    let receiver = Endpoint::new(64 * KIB);
    let data = test_data(20 * 64 * KIB + 999);
    let path = sender.write_file("tcp.bin", &data);

    let (sent, received) = transfer_tcp(&sender, &receiver, &path);
    let sent = sent.unwrap();
    let received = received.unwrap();
    assert_eq!(sent.requests_served, 21);
    assert_eq!(fs::read(&received.destination).unwrap(), data);
}

#[test]
fn test_pooled_transfer_over_tcp() {
    let sender = Endpoint::new(64 * KIB);
    let receiver = Endpoint::with_config(ferry_engine::FerryNodeConfig {
        chunk_size: 64 * KIB as u64,
        workers: 3,
        prefetch_size: 2,
        ..Default::default()
    });
    let data = test_data(12 * 64 * KIB);
    let path = sender.write_file("pooled.bin", &data);

    let (_, received) = transfer_tcp(&sender, &receiver, &path);
    assert_eq!(fs::read(&received.unwrap().destination).unwrap(), data);
}

#[cfg(unix)]
#[test]
fn test_transfer_over_fifos() {
    use ferry_integration_tests::transfer_fifo;

    let sender = Endpoint::new(64 * KIB);
    let receiver = Endpoint::new(64 * KIB);
    let data = test_data(6 * 64 * KIB + 1);
    let path = sender.write_file("fifo.bin", &data);
    let fifo_dir = receiver.root().join("pipes");
    fs::create_dir_all(&fifo_dir).unwrap();

    let (sent, received) = transfer_fifo(&sender, &receiver, &path, &fifo_dir);
    sent.unwrap();
    let received = received.unwrap();
    assert_eq!(fs::read(&received.destination).unwrap(), data);
}
