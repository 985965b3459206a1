/// XMPP HTTP Upload
///
/// Stores files uploaded through pre-signed URLs handed out by an XMPP
/// server (XEP-0363) and serves them back to anyone holding the URL.
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use xmpp_http_upload::{config::ServerConfig, context::AppContext, error::UploadResult, server};

#[tokio::main]
async fn main() -> UploadResult<()> {
    // Load configuration
    let config = ServerConfig::from_env()?;

    // Initialize logging
    let registry = tracing_subscriber::registry().with(config.logging.env_filter());
    if config.logging.json {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }

    println!("xmpp-http-upload v{}", env!("CARGO_PKG_VERSION"));

    // Create application context
    let ctx = AppContext::new(config).await?;

    // Start server
    server::serve(ctx).await?;

    Ok(())
}
