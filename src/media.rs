use axum::{
  body::{self, StreamBody},
  extract::{Query, State},
  http::Response,
  response::IntoResponse,
  Json,
};
use futures::StreamExt;
use reqwest::{header, StatusCode};
use serde::Deserialize;
use tracing::info;

use crate::{
  extractor::MediaInfo, filename::sanitize, relay::Relay, AppState, Error,
  Result,
};

#[derive(Debug, Deserialize)]
pub struct MediaQuery {
  url: Option<String>,
  title: Option<String>,
}

impl MediaQuery {
  pub fn url(&self) -> Result<&str> {
    required_url(self.url.as_deref())
  }
}

pub fn required_url(url: Option<&str>) -> Result<&str> {
  url
    .map(str::trim)
    .filter(|url| !url.is_empty())
    .ok_or(Error::MissingParam("url"))
}

/// Play the media inline.
pub async fn stream(
  State(state): State<AppState>,
  Query(query): Query<MediaQuery>,
) -> Result<impl IntoResponse> {
  relay_media(&state, query.url()?, "inline".to_string()).await
}

/// Serve the media as a file download named after `title`.
pub async fn download(
  State(state): State<AppState>,
  Query(query): Query<MediaQuery>,
) -> Result<impl IntoResponse> {
  let filename = sanitize(query.title.as_deref());
  let disposition = format!("attachment; filename=\"{filename}\"");
  relay_media(&state, query.url()?, disposition).await
}

#[axum::debug_handler]
pub async fn info(
  State(state): State<AppState>,
  Query(query): Query<MediaQuery>,
) -> Result<Json<MediaInfo>> {
  let url = query.url()?;
  let credentials = state.cookies.resolve();
  let info = state.extractor.query_info(url, &credentials).await?;
  Ok(Json(info))
}

async fn relay_media(
  state: &AppState,
  url: &str,
  disposition: String,
) -> Result<impl IntoResponse> {
  let credentials = state.cookies.resolve();
  let source = state.extractor.open_stream(url, credentials).await?;

  // fail the request if the extractor dies before sending anything
  let mut relay = Relay::new(source);
  let first = relay.first_chunk().await?;
  info!(url, "relaying media");

  let body =
    futures::stream::iter(first.map(Ok::<_, std::io::Error>)).chain(relay);

  let resp = Response::builder()
    .status(StatusCode::OK)
    .header(header::CONTENT_TYPE, "video/mp4")
    .header(header::CONTENT_DISPOSITION, disposition)
    .header(header::ACCEPT_RANGES, "bytes")
    .body(body::boxed(StreamBody::new(body)))?;

  Ok(resp)
}
