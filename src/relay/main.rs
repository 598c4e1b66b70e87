/**
 * Mindmap Relay Entry Point
 *
 * Starts the websocket relay that mind-map sessions join.
 */

#[cfg(feature = "server")]
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load environment variables from .env file if present
    dotenv::dotenv().ok();

    let env_filter = std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::new(&env_filter))
        .init();

    let hub = mindmap_collab::relay::RelayHub::new();
    let app = mindmap_collab::relay::server::create_router(hub);

    let port = std::env::var("RELAY_PORT")
        .ok()
        .and_then(|port| port.parse::<u16>().ok())
        .unwrap_or(1234);
    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], port));

    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("[Relay] Listening on {}", addr);
    axum::serve(listener, app).await?;

    Ok(())
}

#[cfg(not(feature = "server"))]
fn main() {
    eprintln!("The relay requires the 'server' feature to be enabled.");
    eprintln!("Run with: cargo run --bin mindmap-relay --features server");
    std::process::exit(1);
}
