//! Wire-level tests against a running server using raw frames.

#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]

use pretty_assertions::assert_eq;
use slotkv_server::{Server, ServerConfig};
use std::net::SocketAddr;
use std::time::Duration;
use tempfile::TempDir;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

const VALUE_LEN: usize = 32;
const BLOCK_SIZE: usize = 4 * VALUE_LEN;

const INIT: u8 = 1;
const SET: u8 = 2;
const FLUSH: u8 = 4;
const CLOSE: u8 = 5;
const READ: u8 = 6;

/// Start a server with two partitions on a random port.
async fn start_test_server(dir: &TempDir) -> (SocketAddr, Server) {
    let mut config = ServerConfig::new("127.0.0.1:0".parse().unwrap(), dir.path());
    config.partitions = 2;
    config.value_len = VALUE_LEN;
    config.read_block_size = BLOCK_SIZE;
    config.index_capacity = 16;
    config.direct_io = false;

    let server = Server::new(config).expect("Failed to create server");
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind TCP listener");
    let addr = listener.local_addr().unwrap();

    let registry = server.registry().clone();
    tokio::spawn(async move {
        let _ = slotkv_server::tcp::serve(listener, registry).await;
    });

    (addr, server)
}

fn header(instance: u8, action: u8) -> u8 {
    (instance << 4) | action
}

fn set_frame(instance: u8, key: u64, fill: u8) -> Vec<u8> {
    let mut frame = vec![header(instance, SET), 0, 0, 0];
    frame.extend_from_slice(&key.to_le_bytes());
    frame.extend_from_slice(&[fill; VALUE_LEN]);
    frame
}

fn read_frame(instance: u8, offset: u64) -> Vec<u8> {
    let mut frame = vec![header(instance, READ), 0, 0, 0];
    frame.extend_from_slice(&offset.to_le_bytes());
    frame
}

async fn read_byte(stream: &mut TcpStream) -> u8 {
    tokio::time::timeout(Duration::from_secs(5), stream.read_u8())
        .await
        .expect("Timed out waiting for response")
        .expect("Failed to read response")
}

/// Read a length-prefixed response, returning its header and payload.
async fn read_payload(stream: &mut TcpStream) -> (u8, Vec<u8>) {
    let mut prefix = [0u8; 8];
    tokio::time::timeout(Duration::from_secs(5), stream.read_exact(&mut prefix))
        .await
        .expect("Timed out waiting for response")
        .expect("Failed to read response prefix");
    assert_eq!(&prefix[1..4], &[0, 0, 0]);
    let len = u32::from_le_bytes(prefix[4..8].try_into().unwrap()) as usize;
    let mut payload = vec![0u8; len];
    stream.read_exact(&mut payload).await.unwrap();
    (prefix[0], payload)
}

#[tokio::test]
async fn test_init_on_fresh_partition() {
    let dir = TempDir::new().unwrap();
    let (addr, _server) = start_test_server(&dir).await;
    let mut stream = TcpStream::connect(addr).await.unwrap();

    stream.write_all(&[header(1, INIT)]).await.unwrap();
    let (hdr, payload) = read_payload(&mut stream).await;
    assert_eq!(hdr, 0x11);
    assert!(payload.is_empty());
}

#[tokio::test]
async fn test_set_read_and_index() {
    let dir = TempDir::new().unwrap();
    let (addr, _server) = start_test_server(&dir).await;
    let mut stream = TcpStream::connect(addr).await.unwrap();

    stream.write_all(&[header(0, INIT)]).await.unwrap();
    read_payload(&mut stream).await;

    for (key, fill) in [(10u64, 0xa1u8), (20, 0xa2)] {
        stream.write_all(&set_frame(0, key, fill)).await.unwrap();
        assert_eq!(read_byte(&mut stream).await, header(0, SET));
    }

    stream.write_all(&read_frame(0, 0)).await.unwrap();
    let (hdr, block) = read_payload(&mut stream).await;
    assert_eq!(hdr, header(0, READ));
    let mut expected = vec![0xa1u8; VALUE_LEN];
    expected.extend_from_slice(&[0xa2; VALUE_LEN]);
    assert_eq!(block, expected);

    // Past the end of the log
    stream.write_all(&read_frame(0, BLOCK_SIZE as u64)).await.unwrap();
    let (_, block) = read_payload(&mut stream).await;
    assert!(block.is_empty());

    stream.write_all(&[header(0, INIT)]).await.unwrap();
    let (_, index) = read_payload(&mut stream).await;
    let mut expected = 10u64.to_le_bytes().to_vec();
    expected.extend_from_slice(&20u64.to_le_bytes());
    assert_eq!(index, expected);
}

#[tokio::test]
async fn test_set_split_across_writes() {
    let dir = TempDir::new().unwrap();
    let (addr, _server) = start_test_server(&dir).await;
    let mut stream = TcpStream::connect(addr).await.unwrap();
    stream.write_all(&[header(1, INIT)]).await.unwrap();
    read_payload(&mut stream).await;

    let frame = set_frame(1, 7, 0x5a);
    for chunk in [&frame[..1], &frame[1..6], &frame[6..20], &frame[20..]] {
        stream.write_all(chunk).await.unwrap();
        stream.flush().await.unwrap();
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(read_byte(&mut stream).await, header(1, SET));

    stream.write_all(&read_frame(1, 0)).await.unwrap();
    let (_, block) = read_payload(&mut stream).await;
    assert_eq!(block, vec![0x5a; VALUE_LEN]);
}

#[tokio::test]
async fn test_flush_and_close_echo_header() {
    let dir = TempDir::new().unwrap();
    let (addr, _server) = start_test_server(&dir).await;
    let mut stream = TcpStream::connect(addr).await.unwrap();
    stream.write_all(&[header(0, INIT)]).await.unwrap();
    read_payload(&mut stream).await;

    stream.write_all(&[header(0, FLUSH)]).await.unwrap();
    assert_eq!(read_byte(&mut stream).await, 0x04);
    stream.write_all(&[header(0, CLOSE)]).await.unwrap();
    assert_eq!(read_byte(&mut stream).await, 0x05);
    // Closing again is a no-op
    stream.write_all(&[header(0, CLOSE)]).await.unwrap();
    assert_eq!(read_byte(&mut stream).await, 0x05);
}

#[tokio::test]
async fn test_unknown_action_is_dropped() {
    let dir = TempDir::new().unwrap();
    let (addr, _server) = start_test_server(&dir).await;
    let mut stream = TcpStream::connect(addr).await.unwrap();

    // Action 3 is reserved: no response, connection stays open
    stream.write_all(&[header(0, 3), header(1, 0x0f)]).await.unwrap();
    stream.write_all(&[header(0, INIT)]).await.unwrap();
    let (hdr, _) = read_payload(&mut stream).await;
    assert_eq!(hdr, header(0, INIT));
}

#[tokio::test]
async fn test_unserved_partition_is_dropped() {
    let dir = TempDir::new().unwrap();
    let (addr, _server) = start_test_server(&dir).await;
    let mut stream = TcpStream::connect(addr).await.unwrap();

    stream.write_all(&[header(9, INIT)]).await.unwrap();
    stream.write_all(&[header(1, INIT)]).await.unwrap();
    let (hdr, _) = read_payload(&mut stream).await;
    assert_eq!(hdr, header(1, INIT));
}

#[tokio::test]
async fn test_set_before_init_closes_connection() {
    let dir = TempDir::new().unwrap();
    let (addr, _server) = start_test_server(&dir).await;
    let mut stream = TcpStream::connect(addr).await.unwrap();

    stream.write_all(&set_frame(0, 1, 0)).await.unwrap();
    let mut buf = [0u8; 1];
    let read = tokio::time::timeout(Duration::from_secs(5), stream.read(&mut buf))
        .await
        .expect("Timed out waiting for close");
    assert!(matches!(read, Ok(0) | Err(_)));
}

#[tokio::test]
async fn test_concurrent_partitions() {
    let dir = TempDir::new().unwrap();
    let (addr, _server) = start_test_server(&dir).await;

    let mut tasks = Vec::new();
    for instance in 0..2u8 {
        tasks.push(tokio::spawn(async move {
            let mut stream = TcpStream::connect(addr).await.unwrap();
            stream.write_all(&[header(instance, INIT)]).await.unwrap();
            read_payload(&mut stream).await;
            for key in 0..10u64 {
                stream
                    .write_all(&set_frame(instance, key, instance + 1))
                    .await
                    .unwrap();
                assert_eq!(read_byte(&mut stream).await, header(instance, SET));
            }
            stream.write_all(&[header(instance, INIT)]).await.unwrap();
            let (_, index) = read_payload(&mut stream).await;
            assert_eq!(index.len(), 10 * 8);
        }));
    }
    for task in tasks {
        task.await.unwrap();
    }
}
