use std::sync::Arc;

use axum::{
  http::HeaderValue, response::IntoResponse, routing::get, Json, Router,
};
use clap::Parser;
use serde_json::json;
use tower_http::{
  cors::{AllowHeaders, AllowMethods, CorsLayer},
  trace::TraceLayer,
};
use tracing::info;
use tracing_subscriber::EnvFilter;

mod config;
mod credentials;
mod error;
mod extractor;
mod filename;
mod image_proxy;
mod media;
mod relay;

pub use error::{Error, Result};

use config::Config;
use credentials::CookieResolver;
use extractor::{Extractor, Ytdlp};

#[derive(Clone)]
pub struct AppState {
  pub extractor: Arc<dyn Extractor>,
  pub cookies: Arc<CookieResolver>,
  pub http: reqwest::Client,
}

impl AppState {
  fn new(config: &Config) -> Result<Self> {
    let extractor = Ytdlp::new(
      config.ytdlp_path.clone(),
      config.ytdlp_proxy().map(String::from),
    );

    Ok(Self {
      extractor: Arc::new(extractor),
      cookies: Arc::new(CookieResolver::new(config.cookies.clone())),
      http: image_proxy::client()?,
    })
  }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
  tracing_subscriber::fmt()
    .with_env_filter(
      EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
    )
    .init();

  let config = Config::parse();
  let origin = cors_origin(&config.allowed_origin)?;
  let state = AppState::new(&config)?;

  let app = router(state, origin);

  info!("Listening on {}", config.bind);

  axum::Server::try_bind(&config.bind)?
    .serve(app.into_make_service())
    .with_graceful_shutdown(shutdown_signal())
    .await?;

  info!("server stopped");
  Ok(())
}

// credentialed cors cannot be combined with a wildcard origin
fn cors_origin(value: &str) -> Result<HeaderValue> {
  let value = value.trim();
  if value == "*" {
    return Err(Error::Config(
      "ALLOWED_ORIGIN cannot be * when credentials are allowed".into(),
    ));
  }

  HeaderValue::from_str(value)
    .map_err(|e| Error::Config(format!("invalid ALLOWED_ORIGIN: {e}")))
}

fn router(state: AppState, allowed_origin: HeaderValue) -> Router {
  let cors = CorsLayer::new()
    .allow_origin(allowed_origin)
    .allow_credentials(true)
    .allow_methods(AllowMethods::mirror_request())
    .allow_headers(AllowHeaders::mirror_request());

  Router::new()
    .route("/", get(homepage))
    .route("/health", get(health))
    .route("/stream", get(media::stream))
    .route("/download", get(media::download))
    .route("/info", get(media::info))
    .layer(cors)
    // sets its own wildcard cors header
    .route("/proxy-image", get(image_proxy::proxy_image))
    .layer(TraceLayer::new_for_http())
    .with_state(state)
}

async fn homepage() -> impl IntoResponse {
  Json(json!({ "message": "yt-dlp streaming API" }))
}

async fn health() -> impl IntoResponse {
  "ok".to_owned()
}

async fn shutdown_signal() {
  let ctrl_c = async {
    if let Err(e) = tokio::signal::ctrl_c().await {
      tracing::warn!("failed to listen for ctrl-c: {e}");
      std::future::pending::<()>().await;
    }
  };

  #[cfg(unix)]
  let terminate = async {
    use tokio::signal::unix::{signal, SignalKind};
    match signal(SignalKind::terminate()) {
      Ok(mut sig) => {
        sig.recv().await;
      }
      Err(e) => {
        tracing::warn!("failed to listen for SIGTERM: {e}");
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

  info!("shutting down");
}
