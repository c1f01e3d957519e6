use std::net::SocketAddr;

use axum::Router;

/// Server-list frontend response with three players, two of them rostered.
pub const FRONTEND_PAYLOAD: &str = r#"{
    "EndPoint": "8p75gb",
    "Data": {
        "hostname": "^3Night^7 City",
        "sv_maxclients": 64,
        "vars": {"sv_maxclients": "48"},
        "players": [
            {"id": 9, "name": "^1KLOK", "ping": 20},
            {"id": 2, "name": "Siam", "ping": 55},
            {"id": 5, "name": "Stranger", "ping": 120}
        ]
    }
}"#;

pub async fn spawn_test_server(app: Router) -> (SocketAddr, tokio::task::JoinHandle<()>) {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind test listener");
    let addr = listener.local_addr().expect("listener address");
    let handle = tokio::spawn(async move {
        axum::serve(listener, app).await.expect("serve test app");
    });
    (addr, handle)
}
