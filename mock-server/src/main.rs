use mock_server::MockConfig;
use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), std::io::Error> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let port = std::env::var("PORT").unwrap_or_else(|_| "9763".to_string());
    let mut config = MockConfig::default();
    if let Ok(username) = std::env::var("ML_USERNAME") {
        config.username = username;
    }
    if let Ok(password) = std::env::var("ML_PASSWORD") {
        config.password = password;
    }

    let addr = format!("127.0.0.1:{port}");
    let listener = TcpListener::bind(&addr).await?;
    info!(%addr, "mock ML server listening");
    mock_server::run(listener, config).await
}
