use std::{ffi::OsString, io::Write, path::PathBuf};

use base64::{engine::general_purpose::STANDARD, Engine as _};
use tempfile::TempPath;
use tracing::{debug, warn};

use crate::config::CookieConfig;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CookieSource {
  None,
  File(PathBuf),
  Browser(String),
}

/// Cookie source resolved for a single request.
///
/// Inline cookie material lives in a private temporary file that is removed
/// when this value is dropped, so it must be kept alive until the extractor
/// using it has exited.
#[derive(Debug)]
pub struct Credentials {
  source: CookieSource,
  _materialized: Option<TempPath>,
}

impl Credentials {
  pub fn none() -> Self {
    Self {
      source: CookieSource::None,
      _materialized: None,
    }
  }

  pub fn source(&self) -> &CookieSource {
    &self.source
  }

  /// Extractor flags selecting this cookie source.
  pub fn args(&self) -> Vec<OsString> {
    match &self.source {
      CookieSource::None => vec![],
      CookieSource::File(path) => {
        vec!["--cookies".into(), path.as_os_str().to_owned()]
      }
      CookieSource::Browser(profile) => {
        vec!["--cookies-from-browser".into(), profile.into()]
      }
    }
  }
}

pub struct CookieResolver {
  config: CookieConfig,
}

impl CookieResolver {
  pub fn new(config: CookieConfig) -> Self {
    let configured = config.configured();
    if configured.len() > 1 {
      warn!(
        "multiple cookie sources configured ({}), using {}",
        configured.join(", "),
        configured[0]
      );
    }

    Self { config }
  }

  pub fn resolve(&self) -> Credentials {
    if let Some(encoded) = self.config.base64() {
      // `base64` wraps at 76 columns; a bad value yields no cookies rather
      // than a failed request
      let encoded: String = encoded.split_ascii_whitespace().collect();
      return match STANDARD.decode(encoded) {
        Ok(decoded) => materialize(&decoded),
        Err(e) => {
          warn!("COOKIES_BASE64 is not valid base64, using no cookies: {e}");
          Credentials::none()
        }
      };
    }

    if let Some(text) = self.config.text() {
      return materialize(text.as_bytes());
    }

    if let Some(path) = self.config.file() {
      if path.exists() {
        return Credentials {
          source: CookieSource::File(path.clone()),
          _materialized: None,
        };
      }
      warn!("cookie file {} does not exist", path.display());
    }

    if let Some(profile) = self.config.browser() {
      return Credentials {
        source: CookieSource::Browser(profile.to_string()),
        _materialized: None,
      };
    }

    Credentials::none()
  }
}

fn materialize(contents: &[u8]) -> Credentials {
  let written = tempfile::Builder::new()
    .prefix("cookies-")
    .suffix(".txt")
    .tempfile()
    .and_then(|mut file| {
      file.write_all(contents)?;
      file.flush()?;
      Ok(file.into_temp_path())
    });

  match written {
    Ok(path) => {
      debug!("wrote request cookies to {}", path.display());
      Credentials {
        source: CookieSource::File(path.to_path_buf()),
        _materialized: Some(path),
      }
    }
    Err(e) => {
      warn!("failed to write cookie file, using no cookies: {e}");
      Credentials::none()
    }
  }
}

#[cfg(test)]
mod test {
  use super::*;

  const COOKIES: &str =
    "# Netscape HTTP Cookie File\n.example.com\tTRUE\t/\tTRUE\t0\tSID\tabc\n";

  fn resolver(config: CookieConfig) -> CookieResolver {
    CookieResolver::new(config)
  }

  fn file_contents(creds: &Credentials) -> String {
    match creds.source() {
      CookieSource::File(path) => std::fs::read_to_string(path).unwrap(),
      other => panic!("expected a cookie file, got {other:?}"),
    }
  }

  #[test]
  fn test_no_cookies() {
    let creds = resolver(CookieConfig::default()).resolve();
    assert_eq!(creds.source(), &CookieSource::None);
    assert!(creds.args().is_empty());
  }

  #[test]
  fn test_base64_wins_over_everything() {
    let creds = resolver(CookieConfig {
      base64: Some(STANDARD.encode(COOKIES)),
      text: Some("other".into()),
      browser: Some("firefox".into()),
      ..Default::default()
    })
    .resolve();

    assert_eq!(file_contents(&creds), COOKIES);
  }

  #[test]
  fn test_wrapped_base64() {
    let encoded = STANDARD.encode(COOKIES.repeat(4));
    let wrapped = encoded
      .as_bytes()
      .chunks(76)
      .map(|line| std::str::from_utf8(line).unwrap())
      .collect::<Vec<_>>()
      .join("\n");
    assert!(wrapped.contains('\n'));

    let creds = resolver(CookieConfig {
      base64: Some(format!("{wrapped}\n")),
      ..Default::default()
    })
    .resolve();

    assert_eq!(file_contents(&creds), COOKIES.repeat(4));
  }

  #[test]
  fn test_undecodable_base64_means_no_cookies() {
    let creds = resolver(CookieConfig {
      base64: Some("!!not base64!!".into()),
      browser: Some("firefox".into()),
      ..Default::default()
    })
    .resolve();

    assert_eq!(creds.source(), &CookieSource::None);
  }

  #[test]
  fn test_inline_text_is_removed_on_drop() {
    let creds = resolver(CookieConfig {
      text: Some(COOKIES.into()),
      ..Default::default()
    })
    .resolve();

    assert_eq!(file_contents(&creds), COOKIES);
    let CookieSource::File(path) = creds.source().clone() else {
      unreachable!()
    };
    drop(creds);
    assert!(!path.exists());
  }

  #[test]
  fn test_each_request_gets_its_own_file() {
    let resolver = resolver(CookieConfig {
      text: Some(COOKIES.into()),
      ..Default::default()
    });

    let a = resolver.resolve();
    let b = resolver.resolve();
    assert_ne!(a.source(), b.source());
  }

  #[test]
  fn test_existing_cookie_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("cookies.txt");
    std::fs::write(&path, COOKIES).unwrap();

    let creds = resolver(CookieConfig {
      file: Some(path.clone()),
      browser: Some("chrome".into()),
      ..Default::default()
    })
    .resolve();

    assert_eq!(creds.source(), &CookieSource::File(path.clone()));
    assert_eq!(
      creds.args(),
      vec![OsString::from("--cookies"), path.into_os_string()]
    );

    // a configured file is never deleted
    drop(creds);
    assert!(dir.path().join("cookies.txt").exists());
  }

  #[test]
  fn test_missing_cookie_file_falls_back_to_browser() {
    let creds = resolver(CookieConfig {
      file: Some("/nonexistent/cookies.txt".into()),
      browser: Some("chrome".into()),
      ..Default::default()
    })
    .resolve();

    assert_eq!(creds.source(), &CookieSource::Browser("chrome".into()));
    assert_eq!(
      creds.args(),
      vec![
        OsString::from("--cookies-from-browser"),
        OsString::from("chrome")
      ]
    );
  }
}
