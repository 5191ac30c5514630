use std::{net::SocketAddr, path::PathBuf};

use clap::{Args, Parser};

/// Process-wide settings, read once at startup.
#[derive(Parser, Clone)]
#[command(version, about = "Stream and download media through yt-dlp")]
pub struct Config {
  /// Address to listen on.
  #[arg(long, env = "BIND_ADDR", default_value = "0.0.0.0:8000")]
  pub bind: SocketAddr,

  /// Origin allowed to make cross-origin requests.
  #[arg(long, env = "ALLOWED_ORIGIN", default_value = "http://localhost:3000")]
  pub allowed_origin: String,

  /// yt-dlp executable, looked up in PATH unless absolute.
  #[arg(long, env = "YTDLP_PATH", default_value = "yt-dlp")]
  pub ytdlp_path: PathBuf,

  /// Proxy handed to yt-dlp via --proxy.
  #[arg(long, env = "YTDLP_PROXY")]
  pub ytdlp_proxy: Option<String>,

  #[command(flatten)]
  pub cookies: CookieConfig,
}

/// Where yt-dlp gets its cookies from. Sources are tried in the order
/// base64, text, file, browser.
#[derive(Args, Clone, Default)]
pub struct CookieConfig {
  /// Netscape cookie file on disk.
  #[arg(long = "cookies-file", env = "COOKIES_FILE")]
  pub file: Option<PathBuf>,

  /// Netscape cookie file contents.
  #[arg(long = "cookies-text", env = "COOKIES_TEXT", hide_env_values = true)]
  pub text: Option<String>,

  /// Netscape cookie file contents, base64 encoded.
  #[arg(
    long = "cookies-base64",
    env = "COOKIES_BASE64",
    hide_env_values = true
  )]
  pub base64: Option<String>,

  /// Browser profile to read cookies from, e.g. `chrome` or `firefox:work`.
  #[arg(long = "cookies-from-browser", env = "COOKIES_FROM_BROWSER")]
  pub browser: Option<String>,
}

impl Config {
  pub fn ytdlp_proxy(&self) -> Option<&str> {
    non_empty(&self.ytdlp_proxy)
  }
}

impl CookieConfig {
  pub fn base64(&self) -> Option<&str> {
    non_empty(&self.base64)
  }

  pub fn text(&self) -> Option<&str> {
    non_empty(&self.text)
  }

  pub fn file(&self) -> Option<&PathBuf> {
    self.file.as_ref().filter(|p| !p.as_os_str().is_empty())
  }

  pub fn browser(&self) -> Option<&str> {
    non_empty(&self.browser)
  }

  /// Names of every configured source, highest priority first.
  pub fn configured(&self) -> Vec<&'static str> {
    let mut sources = Vec::new();
    if self.base64().is_some() {
      sources.push("COOKIES_BASE64");
    }
    if self.text().is_some() {
      sources.push("COOKIES_TEXT");
    }
    if self.file().is_some() {
      sources.push("COOKIES_FILE");
    }
    if self.browser().is_some() {
      sources.push("COOKIES_FROM_BROWSER");
    }
    sources
  }
}

fn non_empty(value: &Option<String>) -> Option<&str> {
  value.as_deref().filter(|s| !s.trim().is_empty())
}

#[cfg(test)]
mod test {
  use super::*;

  #[test]
  fn test_defaults() {
    let config = Config::try_parse_from(["media-relay"]).unwrap();
    assert_eq!(config.bind.port(), 8000);
    assert_eq!(config.allowed_origin, "http://localhost:3000");
    assert_eq!(config.ytdlp_path, PathBuf::from("yt-dlp"));
  }

  #[test]
  fn test_blank_values_are_unset() {
    let config = Config::try_parse_from([
      "media-relay",
      "--cookies-text",
      "  ",
      "--cookies-from-browser",
      "firefox",
      "--ytdlp-proxy",
      "",
    ])
    .unwrap();

    assert_eq!(config.cookies.text(), None);
    assert_eq!(config.cookies.browser(), Some("firefox"));
    assert_eq!(config.cookies.configured(), vec!["COOKIES_FROM_BROWSER"]);
    assert_eq!(config.ytdlp_proxy(), None);
  }
}
