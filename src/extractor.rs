mod ytdlp;

use async_trait::async_trait;
use serde::Serialize;

use crate::{credentials::Credentials, relay::ByteSource, Result};

pub use ytdlp::Ytdlp;

/// Best mp4, or whatever is best when there is no mp4.
pub const BEST_FORMAT: &str = "best[ext=mp4]/best";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MediaInfo {
  pub title: Option<String>,
  pub duration: Option<f64>,
  pub thumbnail: Option<String>,
  pub formats_available: usize,
}

#[async_trait]
pub trait Extractor: Send + Sync {
  /// Start downloading `url` and hand back its output as it arrives.
  /// `credentials` stay alive until the download process has exited.
  async fn open_stream(
    &self,
    url: &str,
    credentials: Credentials,
  ) -> Result<ByteSource>;

  async fn query_info(
    &self,
    url: &str,
    credentials: &Credentials,
  ) -> Result<MediaInfo>;
}
