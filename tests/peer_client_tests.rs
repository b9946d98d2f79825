//! HTTP peer client against a mock administrative endpoint
//!
//! A warp server stands in for a running peer and serves the members
//! collection: list, add (201) and remove (204).

use fleetboot::peer::HttpPeerConnector;
use fleetboot::{IdentityScheme, PeerAdmin, PeerConnector, TlsConfig};
use serde_json::{json, Value};
use std::net::{Ipv4Addr, SocketAddr};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use warp::http::StatusCode;
use warp::Filter;

const LOCALHOST: Ipv4Addr = Ipv4Addr::new(127, 0, 0, 1);

fn member_list() -> Value {
    json!({
        "members": [
            {
                "id": "8e9e05c52164694d",
                "name": "etcd-0a000001",
                "peerURLs": ["https://etcd-0a000001.example.com:2380"],
                "clientURLs": ["https://etcd-0a000001.example.com:2379"]
            },
            {
                "id": "91bc3c398fb3c146",
                "name": "",
                "peerURLs": ["https://etcd-0a000002.example.com:2380"],
                "clientURLs": []
            }
        ]
    })
}

async fn serve_members(posted: Arc<Mutex<Vec<Value>>>) -> SocketAddr {
    let list = warp::path!("v2" / "members")
        .and(warp::get())
        .map(|| warp::reply::json(&member_list()));

    let add = warp::path!("v2" / "members")
        .and(warp::post())
        .and(warp::body::json())
        .map(move |body: Value| {
            posted.lock().unwrap().push(body.clone());
            warp::reply::with_status(
                warp::reply::json(&json!({"id": "a1b2c3", "peerURLs": body["peerURLs"]})),
                StatusCode::CREATED,
            )
        });

    let remove = warp::path!("v2" / "members" / String)
        .and(warp::delete())
        .map(|id: String| {
            if id == "8e9e05c52164694d" {
                StatusCode::NO_CONTENT
            } else {
                StatusCode::NOT_FOUND
            }
        });

    let (addr, server) = warp::serve(list.or(add).or(remove)).bind_ephemeral(([127, 0, 0, 1], 0));
    tokio::spawn(server);
    addr
}

async fn serve_garbage() -> SocketAddr {
    let list = warp::path!("v2" / "members")
        .and(warp::get())
        .map(|| "this is not json");
    let (addr, server) = warp::serve(list).bind_ephemeral(([127, 0, 0, 1], 0));
    tokio::spawn(server);
    addr
}

async fn serve_status(status: StatusCode) -> SocketAddr {
    let any = warp::any().map(move || status);
    let (addr, server) = warp::serve(any).bind_ephemeral(([127, 0, 0, 1], 0));
    tokio::spawn(server);
    addr
}

fn connector(port: u16) -> HttpPeerConnector {
    let identities = IdentityScheme::new("etcd", "example.com").with_ports(2380, port);
    HttpPeerConnector::new(&identities, "/v2/members", Duration::from_secs(2), &TlsConfig::default()).unwrap()
}

#[tokio::test]
async fn test_list_members() {
    let addr = serve_members(Arc::new(Mutex::new(Vec::new()))).await;
    let peer = connector(addr.port()).connect(LOCALHOST);

    let members = peer.list_members().await.unwrap();

    assert_eq!(members.len(), 2);
    assert_eq!(members[0].id, "8e9e05c52164694d");
    assert_eq!(members[0].name, "etcd-0a000001");
    assert!(members[1].name.is_empty());
    assert!(members[1]
        .peer_urls
        .contains("https://etcd-0a000002.example.com:2380"));
}

#[tokio::test]
async fn test_add_member_posts_peer_url() {
    let posted = Arc::new(Mutex::new(Vec::new()));
    let addr = serve_members(posted.clone()).await;
    let peer = connector(addr.port()).connect(LOCALHOST);

    assert!(peer.add_member("https://etcd-0a000003.example.com:2380").await);

    let bodies = posted.lock().unwrap().clone();
    assert_eq!(bodies, vec![json!({"peerURLs": ["https://etcd-0a000003.example.com:2380"]})]);
}

#[tokio::test]
async fn test_remove_member() {
    let addr = serve_members(Arc::new(Mutex::new(Vec::new()))).await;
    let peer = connector(addr.port()).connect(LOCALHOST);

    assert!(peer.remove_member("8e9e05c52164694d").await);
    assert!(!peer.remove_member("ffffffffffffffff").await);
}

#[tokio::test]
async fn test_malformed_list_is_unreachable() {
    let addr = serve_garbage().await;
    let peer = connector(addr.port()).connect(LOCALHOST);

    let err = peer.list_members().await.unwrap_err();
    assert_eq!(err.address, LOCALHOST);
    assert!(err.reason.contains("malformed"));
}

#[tokio::test]
async fn test_server_error_is_unreachable_and_false() {
    let addr = serve_status(StatusCode::SERVICE_UNAVAILABLE).await;
    let peer = connector(addr.port()).connect(LOCALHOST);

    assert!(peer.list_members().await.is_err());
    assert!(!peer.add_member("https://etcd-0a000003.example.com:2380").await);
    assert!(!peer.remove_member("8e9e05c52164694d").await);
}
