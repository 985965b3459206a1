/// HTTP server setup and routing
use crate::{
    context::AppContext,
    error::{UploadError, UploadResult},
};
use axum::{extract::DefaultBodyLimit, Router};
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;
use tracing::info;

/// Build the main application router
pub fn build_router(ctx: AppContext) -> Router {
    Router::new()
        .merge(crate::api::routes())
        .fallback(not_found)
        .with_state(ctx)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                // Uploads are bounded by their signed Content-Length instead
                .layer(DefaultBodyLimit::disable()),
        )
}

/// 404 handler
async fn not_found() -> UploadError {
    UploadError::NotFound("no such route".to_string())
}

/// Start the HTTP server
pub async fn serve(ctx: AppContext) -> UploadResult<()> {
    let addr = ctx.config.bind_address();

    let listener = TcpListener::bind(&addr)
        .await
        .map_err(|e| UploadError::Internal(format!("Failed to bind to {}: {}", addr, e)))?;

    info!("XMPP HTTP Upload listening on {}", addr);
    info!("   Storage root: {}", ctx.resolver.root().display());

    serve_listener(listener, ctx).await
}

/// Serve on an already bound listener until Ctrl-C
pub async fn serve_listener(listener: TcpListener, ctx: AppContext) -> UploadResult<()> {
    let app = build_router(ctx);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| UploadError::Internal(format!("Server error: {}", e)))?;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("shutting down");
}
