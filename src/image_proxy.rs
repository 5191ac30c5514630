use std::time::Duration;

use axum::{
  body::{self, Bytes, Full},
  extract::{Query, State},
  http::Response,
  response::IntoResponse,
};
use reqwest::{header, header::HeaderMap, Url};
use serde::Deserialize;

use crate::{media::required_url, AppState, Error, Result};

pub const FETCH_TIMEOUT: Duration = Duration::from_secs(10);

const DEFAULT_CONTENT_TYPE: &str = "image/jpeg";
const CACHE_CONTROL: &str = "public, max-age=3600";

#[derive(Debug, Deserialize)]
pub struct ImageQuery {
  url: Option<String>,
}

pub struct ProxiedImage {
  pub bytes: Bytes,
  pub content_type: String,
}

pub fn client() -> Result<reqwest::Client> {
  client_with_timeout(FETCH_TIMEOUT)
}

pub fn client_with_timeout(timeout: Duration) -> Result<reqwest::Client> {
  Ok(reqwest::Client::builder().timeout(timeout).build()?)
}

/// Re-serve a remote image so pages on other origins can use it.
pub async fn proxy_image(
  State(state): State<AppState>,
  Query(query): Query<ImageQuery>,
) -> Result<impl IntoResponse> {
  let url = required_url(query.url.as_deref())?;
  let image = fetch_and_relay(&state.http, url).await?;

  let resp = Response::builder()
    .header(header::CONTENT_TYPE, image.content_type)
    .header(header::CACHE_CONTROL, CACHE_CONTROL)
    .header(header::ACCESS_CONTROL_ALLOW_ORIGIN, "*")
    .body(body::boxed(Full::new(image.bytes)))?;

  Ok(resp)
}

pub async fn fetch_and_relay(
  client: &reqwest::Client,
  url: &str,
) -> Result<ProxiedImage> {
  let url = Url::parse(url)
    .map_err(|e| Error::InvalidParam("url", e.to_string()))?;
  if !matches!(url.scheme(), "http" | "https") {
    return Err(Error::InvalidParam(
      "url",
      "only http and https urls can be proxied".into(),
    ));
  }

  let resp = client.get(url).send().await?;
  let status = resp.status();
  if !status.is_success() {
    return Err(Error::UpstreamStatus(status));
  }

  let content_type = content_type_or_default(resp.headers());
  let bytes = resp.bytes().await?;

  Ok(ProxiedImage {
    bytes,
    content_type,
  })
}

fn content_type_or_default(headers: &HeaderMap) -> String {
  headers
    .get(header::CONTENT_TYPE)
    .and_then(|v| v.to_str().ok())
    .filter(|v| !v.is_empty())
    .unwrap_or(DEFAULT_CONTENT_TYPE)
    .to_string()
}
