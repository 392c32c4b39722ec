//!
//! The axum surface of an [`Application`].
//!
//! Every request that is not the liveness probe falls through to the front
//! controller. The body and the session are loaded up front, then the
//! request is dispatched on the blocking pool since views and the page cache
//! live on disk. Session changes are saved once the action returns.
//!
//! Layers, innermost first: sessions, body limit, request tracing, optional
//! timeout, request ids, liveness route, panic recovery.
//!

use {
    crate::{
        Application, Result,
        http::{Request, Session},
        utils::RequestIdGenerator,
    },
    axum::{
        Router,
        body::to_bytes,
        extract::{ConnectInfo, DefaultBodyLimit, State},
        http::{HeaderName, StatusCode},
        response::{IntoResponse, Response},
        routing::get,
    },
    std::{net::SocketAddr, sync::Arc, time::Duration},
    tokio::{signal, sync::watch},
    tower_http::{
        catch_panic::CatchPanicLayer,
        limit::RequestBodyLimitLayer,
        request_id::{PropagateRequestIdLayer, SetRequestIdLayer},
        timeout::TimeoutLayer,
        trace::TraceLayer,
    },
    tower_sessions::{
        Expiry, SessionManagerLayer,
        cookie::{SameSite, time::Duration as CookieDuration},
    },
};

impl Application {
    /// Wraps the application in an axum router with the standard layers.
    pub fn into_router(self) -> Router {
        let http = self.config().http.clone();
        let x_request_id = HeaderName::from_static("x-request-id");

        let session_layer = SessionManagerLayer::new(self.sessions().clone())
            .with_name(http.session_cookie.clone())
            .with_secure(false)
            .with_same_site(SameSite::Lax)
            .with_expiry(Expiry::OnInactivity(CookieDuration::seconds(
                http.session_expiry.as_secs() as i64,
            )));

        let mut router = Router::new()
            .fallback(dispatch)
            .with_state(self)
            .layer(session_layer)
            .layer(DefaultBodyLimit::disable())
            .layer(RequestBodyLimitLayer::new(
                http.max_payload_size_bytes.as_u64() as usize,
            ))
            .layer(
                TraceLayer::new_for_http().make_span_with(|request: &axum::extract::Request| {
                    let request_id = request
                        .headers()
                        .get("x-request-id")
                        .and_then(|v| v.to_str().ok())
                        .unwrap_or("unknown");
                    tracing::info_span!(
                        "http_request",
                        method = %request.method(),
                        uri = %request.uri(),
                        request_id = %request_id,
                    )
                }),
            );

        if let Some(timeout) = http.request_timeout {
            router = router.layer(TimeoutLayer::with_status_code(
                StatusCode::REQUEST_TIMEOUT,
                timeout,
            ));
        }

        router
            .layer(SetRequestIdLayer::new(
                x_request_id.clone(),
                RequestIdGenerator,
            ))
            .layer(PropagateRequestIdLayer::new(x_request_id))
            .route(&http.liveness_route, get(|| async { "OK\n" }))
            .layer(CatchPanicLayer::custom(panic_response))
    }

    ///
    /// Binds `http.bind_addr:http.bind_port` and serves until SIGINT or
    /// SIGTERM. In-flight requests get `http.shutdown_timeout` to finish.
    ///
    pub async fn start(self) -> Result<()> {
        let bind_addr = self.config().http.full_bind_addr();
        let shutdown_timeout = self.config().http.shutdown_timeout;
        let listener = tokio::net::TcpListener::bind(&bind_addr).await?;

        tracing::info!("Bound to {}", &bind_addr);
        tracing::info!("Waiting for connections");

        let service = self
            .into_router()
            .into_make_service_with_connect_info::<SocketAddr>();

        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
        let serve_future = axum::serve(listener, service).with_graceful_shutdown(async move {
            shutdown_signal(shutdown_timeout).await;
            let _ = shutdown_tx.send(true);
        });

        tokio::select! {
            result = serve_future => {
                tracing::info!("Graceful shutdown completed");
                result?;
            }
            _ = async {
                if shutdown_rx.wait_for(|started| *started).await.is_err() {
                    std::future::pending::<()>().await;
                }
                tokio::time::sleep(shutdown_timeout).await;
            } => {
                tracing::warn!("Graceful shutdown timeout expired, forcing shutdown");
            }
        }

        Ok(())
    }
}

async fn dispatch(State(app): State<Application>, request: axum::extract::Request) -> Response {
    let remote_addr = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| *addr);

    let (parts, body) = request.into_parts();
    let body = match to_bytes(body, usize::MAX).await {
        Ok(body) => body,
        Err(e) => {
            tracing::debug!(error = %e, "Request body rejected");
            return StatusCode::PAYLOAD_TOO_LARGE.into_response();
        }
    };

    let Some(handle) = parts.extensions.get::<tower_sessions::Session>().cloned() else {
        tracing::error!("Session layer is missing");
        return StatusCode::INTERNAL_SERVER_ERROR.into_response();
    };
    let session = match Session::load(&handle).await {
        Ok(session) => Arc::new(session),
        Err(e) => {
            tracing::error!(error = %e, "Session not loaded");
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };

    let request = Request::from_parts(parts, body, remote_addr);
    let action_session = session.clone();
    let response =
        match tokio::task::spawn_blocking(move || app.handle(request, action_session)).await {
            Ok(response) => response,
            Err(e) => {
                tracing::error!(error = %e, "Dispatch task failed");
                return StatusCode::INTERNAL_SERVER_ERROR.into_response();
            }
        };

    if let Err(e) = session.save(&handle).await {
        tracing::error!(error = %e, "Session not saved");
        return StatusCode::INTERNAL_SERVER_ERROR.into_response();
    }
    response.send()
}

fn panic_response(err: Box<dyn std::any::Any + Send + 'static>) -> Response {
    let msg = if let Some(s) = err.downcast_ref::<String>() {
        s.clone()
    } else if let Some(s) = err.downcast_ref::<&str>() {
        s.to_string()
    } else {
        "unknown panic payload".to_string()
    };
    tracing::error!("Service panicked: {}", msg);
    (StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error").into_response()
}

async fn shutdown_signal(timeout: Duration) {
    let ctrl_c = async {
        match signal::ctrl_c().await {
            Ok(()) => tracing::debug!("Ctrl+C signal received"),
            Err(err) => {
                tracing::warn!("Failed to install Ctrl+C handler: {}", err);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut handler) => {
                handler.recv().await;
                tracing::debug!("SIGTERM signal received");
            }
            Err(err) => {
                tracing::warn!("Failed to install SIGTERM handler: {}", err);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!(
        "Shutdown signal received, starting graceful shutdown (timeout: {}s)",
        timeout.as_secs()
    );
}
