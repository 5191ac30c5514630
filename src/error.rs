use axum::{
  response::{IntoResponse, Response},
  Json,
};
use reqwest::StatusCode;
use serde_json::json;
use tracing::warn;

#[derive(Debug, thiserror::Error)]
pub enum Error {
  #[error("{0} parameter is required")]
  MissingParam(&'static str),
  #[error("invalid {0} parameter: {1}")]
  InvalidParam(&'static str, String),
  #[error("failed to launch extractor: {0}")]
  Spawn(#[source] std::io::Error),
  #[error("extraction failed: {0}")]
  Extraction(String),
  #[error("malformed extractor output: {0}")]
  Json(#[from] serde_json::Error),
  #[error("upstream returned {0}")]
  UpstreamStatus(StatusCode),
  #[error("upstream fetch failed: {0}")]
  Fetch(#[from] reqwest::Error),
  #[error(transparent)]
  IO(#[from] std::io::Error),
  #[error(transparent)]
  Http(#[from] http::Error),
  #[error("invalid configuration: {0}")]
  Config(String),
  #[error("server error: {0}")]
  Server(#[from] hyper::Error),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

impl Error {
  pub fn status(&self) -> StatusCode {
    match self {
      Error::MissingParam(_) | Error::InvalidParam(..) => {
        StatusCode::BAD_REQUEST
      }
      Error::UpstreamStatus(status) => *status,
      _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
  }
}

impl IntoResponse for Error {
  fn into_response(self) -> Response {
    let status = self.status();
    if status.is_server_error() {
      warn!("request failed: {}", self);
    }

    (status, Json(json!({ "detail": self.to_string() }))).into_response()
  }
}

#[cfg(test)]
mod test {
  use super::*;

  #[test]
  fn test_status_mapping() {
    assert_eq!(Error::MissingParam("url").status(), StatusCode::BAD_REQUEST);
    assert_eq!(
      Error::InvalidParam("url", "bad scheme".into()).status(),
      StatusCode::BAD_REQUEST
    );
    assert_eq!(
      Error::UpstreamStatus(StatusCode::NOT_FOUND).status(),
      StatusCode::NOT_FOUND
    );
    assert_eq!(
      Error::Extraction("Unsupported URL".into()).status(),
      StatusCode::INTERNAL_SERVER_ERROR
    );
  }

  #[test]
  fn test_message() {
    assert_eq!(
      Error::MissingParam("url").to_string(),
      "url parameter is required"
    );
  }
}
