//! HTTP server exposing `/metrics` for Prometheus and `/healthz` for
//! liveness probes.

use anyhow::{bail, Context, Result};
use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use prometheus::{Encoder, Registry, TextEncoder};
use std::future::Future;
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

pub fn router(registry: Registry) -> Router {
    Router::new()
        .route("/metrics", get(metrics_handler))
        .route("/healthz", get(healthz_handler))
        .with_state(registry)
}

/// Bind `addr` and serve until the process stops.
pub async fn serve(addr: SocketAddr, registry: Registry) -> Result<()> {
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("unable to listen on {addr}"))?;

    info!(listen_on = %addr, "starting HTTP server");
    axum::serve(listener, router(registry))
        .await
        .context("HTTP server exited")?;
    Ok(())
}

/// Drive `watching` next to the spawned `server` until `shutdown`
/// resolves. The server stopping for any reason is an error, and so is the
/// watch loop returning.
pub async fn supervise<W, S>(server: JoinHandle<Result<()>>, watching: W, shutdown: S) -> Result<()>
where
    W: Future<Output = ()>,
    S: Future<Output = ()>,
{
    tokio::select! {
        _ = watching => {
            error!("watch loop exited");
            bail!("watch loop exited")
        }
        res = server => {
            match res {
                Ok(Ok(())) => bail!("HTTP server exited"),
                Ok(Err(e)) => Err(e),
                Err(e) => Err(e).context("HTTP server task panicked"),
            }
        }
        _ = shutdown => {
            info!("shutting down");
            Ok(())
        }
    }
}

async fn metrics_handler(State(registry): State<Registry>) -> impl IntoResponse {
    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&registry.gather(), &mut buffer) {
        error!("unable to encode metrics: {}", e);
        return (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response();
    }

    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, encoder.format_type().to_string())],
        buffer,
    )
        .into_response()
}

async fn healthz_handler() -> StatusCode {
    debug!("rated-sentinel is alive");
    StatusCode::OK
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use prometheus::{Gauge, Opts};
    use tower::ServiceExt;

    #[tokio::test]
    async fn test_healthz_is_ok() {
        let resp = router(Registry::new())
            .oneshot(Request::get("/healthz").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_metrics_renders_registry() {
        let registry = Registry::new();
        let gauge = Gauge::with_opts(Opts::new("sentinel_test_gauge", "test gauge")).unwrap();
        registry.register(Box::new(gauge.clone())).unwrap();
        gauge.set(0.5);

        let resp = router(registry)
            .oneshot(Request::get("/metrics").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);

        let body = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        let text = String::from_utf8(body.to_vec()).unwrap();
        assert!(text.contains("sentinel_test_gauge 0.5"), "{text}");
    }

    #[tokio::test]
    async fn test_unknown_route_is_404() {
        let resp = router(Registry::new())
            .oneshot(Request::get("/nope").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_server_exit_is_an_error() {
        let server = tokio::spawn(async { Ok(()) });
        let err = supervise(server, std::future::pending(), std::future::pending())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("HTTP server exited"), "{err}");
    }

    #[tokio::test]
    async fn test_bind_failure_surfaces_while_watch_is_starting() {
        let taken = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = taken.local_addr().unwrap();

        let server = tokio::spawn(serve(addr, Registry::new()));
        let res = tokio::time::timeout(
            std::time::Duration::from_secs(5),
            supervise(server, std::future::pending(), std::future::pending()),
        )
        .await
        .expect("bind failure must not wait for the watch loop");

        let err = res.unwrap_err();
        assert!(format!("{err:#}").contains("unable to listen"), "{err:#}");
    }

    #[tokio::test]
    async fn test_shutdown_is_clean() {
        let server = tokio::spawn(std::future::pending::<Result<()>>());
        let res = supervise(server, std::future::pending(), async {}).await;
        assert!(res.is_ok());
    }

    #[tokio::test]
    async fn test_watch_loop_exit_is_an_error() {
        let server = tokio::spawn(std::future::pending::<Result<()>>());
        assert!(supervise(server, async {}, std::future::pending()).await.is_err());
    }
}
