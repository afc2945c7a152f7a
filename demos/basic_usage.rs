//! Two-node replication walkthrough over the in-memory transport.
//!
//! Run with: `cargo run --example basic_usage`

use std::sync::Arc;
use std::time::Duration;

use registry_engine::replication::transport::memory::{MemoryHub, MemoryTransport};
use registry_engine::replication::StaticPeerProvider;
use registry_engine::{
    InstanceInfo, Interest, PeerAddress, RegistryConfig, RegistryEngine, ServicePort, Source,
    Status,
};

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .init();

    let hub = MemoryHub::new();
    let config = RegistryConfig {
        replication_reconnect_delay_ms: 500,
        heartbeat_interval_ms: 2_000,
        ..Default::default()
    };

    // Two nodes; node-a replicates to node-b.
    let node_a = RegistryEngine::new(
        "node-a",
        config.clone(),
        Arc::new(MemoryTransport::new(hub.clone())),
    );
    let node_b = RegistryEngine::new(
        "node-b",
        config,
        Arc::new(MemoryTransport::new(hub.clone())),
    );

    let addr_b = PeerAddress::new("node-b", 7002);
    let acceptor = Arc::new(node_b.acceptor());
    let mut inbound = hub.listen(addr_b.clone());
    tokio::spawn(async move {
        while let Some(connection) = inbound.recv().await {
            let acceptor = acceptor.clone();
            tokio::spawn(async move {
                let _ = acceptor.serve(Box::new(connection)).await;
            });
        }
    });

    node_a
        .start(&StaticPeerProvider::new(vec![addr_b]))
        .expect("start node-a");

    // Watch the backend application on node-b.
    let mut subscription = node_b
        .registry()
        .for_interest(Interest::for_application("backend"))
        .expect("subscribe on node-b");

    // Register on node-a; the change replicates across.
    let backend = InstanceInfo::builder("backend-1")
        .app("backend")
        .vip_address("backend.vip")
        .port(ServicePort::new(7001, false))
        .status(Status::Up)
        .build();
    node_a
        .registry()
        .update(backend.clone(), Source::local("node-a"));

    println!("--- notifications observed on node-b ---");
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_secs(1)).await;
        node_a
            .registry()
            .update(
                backend.to_builder().status(Status::OutOfService).build(),
                Source::local("node-a"),
            );
        tokio::time::sleep(Duration::from_millis(200)).await;
        node_a.registry().remove("backend-1", &Source::local("node-a"));
        tokio::time::sleep(Duration::from_millis(200)).await;
        node_a.shutdown();
    });

    while let Some(notification) = subscription.recv().await {
        match notification.data() {
            Some(data) => println!("{:?}: {} ({})", notification.kind(), data.id, data.status),
            None => println!("{:?}", notification.kind()),
        }
        if notification.kind() == registry_engine::NotificationKind::Delete {
            break;
        }
    }

    node_b.shutdown();
    println!("done");
}
