use std::{path::PathBuf, sync::LazyLock};

use async_trait::async_trait;
use regex::Regex;
use serde::Deserialize;
use tokio::process::Command;
use tracing::{debug, info};

use crate::{
  credentials::Credentials,
  relay::{ByteSource, ExitReport},
  Error, Result,
};

use super::{Extractor, MediaInfo, BEST_FORMAT};

// run yt-dlp command line, either dumping the info json or writing the
// media itself to stdout. requires a yt-dlp executable.
pub struct Ytdlp {
  program: PathBuf,
  proxy: Option<String>,
}

impl Ytdlp {
  pub fn new(program: impl Into<PathBuf>, proxy: Option<String>) -> Self {
    if let Some(proxy) = &proxy {
      info!("yt-dlp will use proxy: {}", redact_proxy(proxy));
    }

    Self {
      program: program.into(),
      proxy,
    }
  }

  fn command(
    &self,
    credentials: &Credentials,
    mode: &[&str],
    url: &str,
  ) -> Command {
    let mut cmd = Command::new(&self.program);

    cmd.arg("-f").arg(BEST_FORMAT).arg("--no-playlist");

    if let Some(proxy) = &self.proxy {
      cmd.arg("--proxy").arg(proxy);
    }

    cmd.args(credentials.args()).args(mode);

    // the url can never be mistaken for an option
    cmd.arg("--").arg(url);

    debug!(cookies = ?credentials.source(), ?mode, url, "running yt-dlp");
    cmd
  }
}

#[async_trait]
impl Extractor for Ytdlp {
  async fn open_stream(
    &self,
    url: &str,
    credentials: Credentials,
  ) -> Result<ByteSource> {
    // yt-dlp -f 'best[ext=mp4]/best' --no-progress -o - -- URL
    let cmd = self.command(&credentials, &["--no-progress", "-o", "-"], url);
    ByteSource::spawn(cmd, credentials)
  }

  async fn query_info(
    &self,
    url: &str,
    credentials: &Credentials,
  ) -> Result<MediaInfo> {
    let mut cmd =
      self.command(credentials, &["-J", "--quiet", "--no-warnings"], url);

    let output = cmd
      .stdin(std::process::Stdio::null())
      .kill_on_drop(true)
      .output()
      .await
      .map_err(Error::Spawn)?;

    if !output.status.success() {
      let report = ExitReport {
        status: Some(output.status),
        killed: false,
        stderr: String::from_utf8_lossy(&output.stderr)
          .lines()
          .map(String::from)
          .collect(),
      };
      return Err(Error::Extraction(report.describe()));
    }

    parse_info(&output.stdout)
  }
}

fn parse_info(stdout: &[u8]) -> Result<MediaInfo> {
  #[derive(Deserialize)]
  struct YtdlpInfo {
    title: Option<String>,
    duration: Option<f64>,
    thumbnail: Option<String>,
    #[serde(default)]
    formats: Vec<serde::de::IgnoredAny>,
  }

  if stdout.iter().all(u8::is_ascii_whitespace) {
    return Err(Error::Extraction("extractor returned no result".into()));
  }

  let info: Option<YtdlpInfo> = serde_json::from_slice(stdout)?;
  let info =
    info.ok_or_else(|| Error::Extraction("extractor returned no result".into()))?;

  Ok(MediaInfo {
    title: info.title,
    duration: info.duration,
    thumbnail: info.thumbnail,
    formats_available: info.formats.len(),
  })
}

// used to remove cred info from proxy url before printing
fn redact_proxy(proxy: &str) -> String {
  static AUTH_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"//[^:/@]+(:[^@]+)?@").unwrap());
  AUTH_REGEX.replace(proxy, "//<REDACTED>@").into_owned()
}
