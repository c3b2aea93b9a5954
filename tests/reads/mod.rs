use d_config::ConfigKey;
use d_config::ConfigService;
use tempfile::tempdir;

use crate::common::start_client;
use crate::common::StubServer;
use crate::common::TIMEOUT;

/// Failover records are operator overrides: whatever the live tier says,
/// they are served as-is and never copied into the snapshot tier.
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn failover_record_is_served_regardless_of_the_live_tier() {
    let dir = tempdir().unwrap();
    let server = StubServer::new();
    server.put("db.properties", "DEFAULT_GROUP", "url=live");
    let client = start_client(&server, dir.path()).await;
    let key = ConfigKey::new("db.properties", "", "").unwrap();

    let path = client.local_store().failover_path(&key);
    tokio::fs::create_dir_all(path.parent().unwrap()).await.unwrap();
    tokio::fs::write(&path, "url=failover").await.unwrap();

    for reachable in [true, false] {
        server.set_reachable(reachable);
        let content = client.get_config("db.properties", "", TIMEOUT).await.unwrap();
        assert_eq!(content, "url=failover");
    }
    assert_eq!(client.local_store().get_snapshot(&key).await, None);

    // removing the record hands control back to the other tiers
    tokio::fs::remove_file(&path).await.unwrap();
    server.set_reachable(true);
    let content = client.get_config("db.properties", "", TIMEOUT).await.unwrap();
    assert_eq!(content, "url=live");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn live_read_is_mirrored_into_the_snapshot() {
    let dir = tempdir().unwrap();
    let server = StubServer::new();
    let client = start_client(&server, dir.path()).await;
    let key = ConfigKey::new("app.yaml", "infra", "").unwrap();

    for content in ["a: 1", "a: 2"] {
        server.put("app.yaml", "infra", content);
        assert_eq!(client.get_config("app.yaml", "infra", TIMEOUT).await.unwrap(), content);
        assert_eq!(client.local_store().get_snapshot(&key).await.as_deref(), Some(content));
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn outage_never_raises_on_reads() {
    let dir = tempdir().unwrap();
    let server = StubServer::new();
    server.put("known", "DEFAULT_GROUP", "cached");
    let client = start_client(&server, dir.path()).await;
    client.get_config("known", "", TIMEOUT).await.unwrap();

    server.set_reachable(false);
    assert_eq!(client.get_config("known", "", TIMEOUT).await.unwrap(), "cached");
    assert_eq!(client.get_config("unknown", "", TIMEOUT).await.unwrap(), "");

    server.set_reachable(true);
    server.force_status(Some(500));
    assert_eq!(client.get_config("known", "", TIMEOUT).await.unwrap(), "cached");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn snapshots_survive_a_client_restart() {
    let dir = tempdir().unwrap();
    let server = StubServer::new();
    server.put("test", "DEFAULT_GROUP", "v1");

    let client = start_client(&server, dir.path()).await;
    client.get_config("test", "", TIMEOUT).await.unwrap();
    client.shutdown().await;
    drop(client);

    server.set_reachable(false);
    let client = start_client(&server, dir.path()).await;
    assert_eq!(client.get_config("test", "", TIMEOUT).await.unwrap(), "v1");
}
