use std::net::SocketAddr;

use axum::{routing::get, Router};
use tower_http::{cors::CorsLayer, services::ServeDir, trace::TraceLayer};

use crate::config::StorageConfig;
use crate::state::AppState;
use crate::{attributes, recipes, users};

pub fn build_app(state: AppState) -> Router {
    let mut app = Router::new()
        .merge(users::router())
        .merge(attributes::router())
        .merge(recipes::router(state.config.max_upload_bytes))
        .route("/health", get(|| async { "ok" }));

    // Uploaded files are served by the app itself only for the local backend.
    if let StorageConfig::Local { root, url_prefix } = &state.config.storage {
        let prefix = url_prefix.trim_end_matches('/');
        if prefix.starts_with('/') && prefix.len() > 1 {
            app = app.nest_service(prefix, ServeDir::new(root));
        }
    }

    app.with_state(state)
        .layer(CorsLayer::permissive())
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(|req: &axum::http::Request<_>| {
                    let method = req.method().clone();
                    let uri = req.uri().clone();
                    tracing::info_span!("http_request", %method, uri = %uri, status = tracing::field::Empty)
                })
                .on_response(
                    |res: &axum::http::Response<_>,
                     latency: std::time::Duration,
                     span: &tracing::Span| {
                        let status = res.status();
                        span.record("status", tracing::field::display(status));
                        let latency_ms = latency.as_millis() as u64;
                        if status.is_server_error() {
                            tracing::error!(%status, latency_ms, "response");
                        } else {
                            tracing::info!(%status, latency_ms, "response");
                        }
                    },
                ),
        )
}

pub async fn serve(app: Router) -> anyhow::Result<()> {
    let addr: SocketAddr = format!(
        "{}:{}",
        std::env::var("APP_HOST").unwrap_or_else(|_| "0.0.0.0".into()),
        std::env::var("APP_PORT").unwrap_or_else(|_| "8080".into())
    )
    .parse()?;

    tracing::info!("listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}
