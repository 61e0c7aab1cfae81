//! Contract tests verifying compatibility with the slotkv client.
//!
//! These tests start a real server and drive it through `KvClient`, covering
//! the full path from key lookup through the block cache to the partition
//! engines on disk.

#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]

use bytes::Bytes;
use pretty_assertions::assert_eq;
use slotkv_client::{ClientConfig, KvClient};
use slotkv_server::{Server, ServerConfig};
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;
use tempfile::TempDir;
use tokio::net::TcpListener;

const VALUE_LEN: usize = 64;
const BLOCK_SIZE: usize = 8 * VALUE_LEN;

fn server_config(data_root: &Path) -> ServerConfig {
    let mut config = ServerConfig::new("127.0.0.1:0".parse().unwrap(), data_root);
    config.partitions = 4;
    config.value_len = VALUE_LEN;
    config.read_block_size = BLOCK_SIZE;
    config.index_capacity = 16;
    config.direct_io = false;
    config
}

/// Start test server on a random port.
async fn start_test_server(config: ServerConfig) -> (SocketAddr, Server) {
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

fn client(addr: SocketAddr) -> KvClient {
    let mut config = ClientConfig::new(addr.to_string());
    config.value_len = VALUE_LEN;
    config.read_block_size = BLOCK_SIZE;
    config.cache_blocks = 2;
    config.index_capacity = 16;
    config.timeout = Duration::from_secs(5);
    KvClient::new(config).expect("Failed to create client")
}

fn block(byte: u8) -> Bytes {
    Bytes::from(vec![byte; VALUE_LEN])
}

#[tokio::test]
async fn test_set_get_close_reopen() {
    let dir = TempDir::new().unwrap();
    let (addr, _server) = start_test_server(server_config(dir.path())).await;

    let mut kv = client(addr);
    kv.init(dir.path(), 0).await.unwrap();
    kv.set("1", block(0x41)).await.unwrap();
    kv.set("2", block(0x42)).await.unwrap();

    assert_eq!(kv.get("1").await.unwrap(), Some(block(0x41)));
    assert_eq!(kv.get("2").await.unwrap(), Some(block(0x42)));
    assert_eq!(kv.get("3").await.unwrap(), None);
    kv.close().await.unwrap();

    let mut kv = client(addr);
    kv.init(dir.path(), 0).await.unwrap();
    assert_eq!(kv.len(), 2);
    assert_eq!(kv.get("1").await.unwrap(), Some(block(0x41)));
    assert_eq!(kv.get("2").await.unwrap(), Some(block(0x42)));
    assert_eq!(kv.get("3").await.unwrap(), None);
}

#[tokio::test]
async fn test_many_values_across_blocks() {
    let dir = TempDir::new().unwrap();
    let (addr, _server) = start_test_server(server_config(dir.path())).await;

    let mut kv = client(addr);
    kv.init(dir.path(), 2).await.unwrap();
    for i in 0..50u8 {
        kv.set(&i.to_string(), block(i)).await.unwrap();
    }
    kv.flush().await.unwrap();

    // Walking backwards touches each of the seven blocks once
    for i in (0..50u8).rev() {
        assert_eq!(kv.get(&i.to_string()).await.unwrap(), Some(block(i)));
    }
    let stats = kv.cache().stats();
    assert_eq!(stats.misses, 7);
    assert_eq!(stats.hits, 43);
}

#[tokio::test]
async fn test_overwrite_survives_restart() {
    let dir = TempDir::new().unwrap();
    let config = server_config(dir.path());
    let (addr, server) = start_test_server(config.clone()).await;

    let mut kv = client(addr);
    kv.init(dir.path(), 1).await.unwrap();
    kv.set("99", block(1)).await.unwrap();
    kv.set("99", block(2)).await.unwrap();
    kv.set("100", block(3)).await.unwrap();
    kv.set("99", block(4)).await.unwrap();
    drop(kv);

    // Closes every partition, writing staged values out
    server.registry().shutdown().await;

    let (addr, _server) = start_test_server(config).await;
    let mut kv = client(addr);
    kv.init(dir.path(), 1).await.unwrap();
    assert_eq!(kv.next_slot(), 4);
    assert_eq!(kv.get("99").await.unwrap(), Some(block(4)));
    assert_eq!(kv.get("100").await.unwrap(), Some(block(3)));
}

#[tokio::test]
async fn test_clear_data_on_startup() {
    let dir = TempDir::new().unwrap();
    let mut config = server_config(dir.path());
    let (addr, server) = start_test_server(config.clone()).await;

    let mut kv = client(addr);
    kv.init(dir.path(), 0).await.unwrap();
    kv.set("5", block(5)).await.unwrap();
    kv.close().await.unwrap();
    server.registry().shutdown().await;

    config.clear_data = true;
    let (addr, _server) = start_test_server(config).await;
    let mut kv = client(addr);
    kv.init(dir.path(), 0).await.unwrap();
    assert!(kv.is_empty());
    assert_eq!(kv.get("5").await.unwrap(), None);
}

#[tokio::test]
async fn test_clients_on_separate_partitions() {
    let dir = TempDir::new().unwrap();
    let (addr, _server) = start_test_server(server_config(dir.path())).await;

    let mut tasks = Vec::new();
    for worker in 0..4u8 {
        tasks.push(tokio::spawn(async move {
            let mut kv = client(addr);
            kv.init("unused", worker).await.unwrap();
            for i in 0..20u8 {
                kv.set(&i.to_string(), block(worker * 20 + i)).await.unwrap();
            }
            for i in 0..20u8 {
                assert_eq!(
                    kv.get(&i.to_string()).await.unwrap(),
                    Some(block(worker * 20 + i))
                );
            }
            kv.close().await.unwrap();
        }));
    }
    for task in tasks {
        task.await.unwrap();
    }
}
