use std::sync::LazyLock;

use regex::Regex;

pub const DEFAULT_FILENAME: &str = "video.mp4";
pub const MAX_FILENAME_LEN: usize = 200;

const EXTENSION: &str = ".mp4";

static UNSAFE_CHARS: LazyLock<Regex> =
  LazyLock::new(|| Regex::new(r"[^A-Za-z0-9._ -]").unwrap());

/// Turn an untrusted title into an attachment filename.
///
/// The result only contains `[A-Za-z0-9._ -]`, ends in `.mp4` and is at most
/// 200 characters long. The extension survives truncation.
pub fn sanitize(raw: Option<&str>) -> String {
  let cleaned = UNSAFE_CHARS.replace_all(raw.unwrap_or_default(), "");
  let cleaned = cleaned.trim();

  let stem = match cleaned.len().checked_sub(EXTENSION.len()) {
    Some(at) if cleaned[at..].eq_ignore_ascii_case(EXTENSION) => &cleaned[..at],
    _ => cleaned,
  };

  // only ascii survives the filter, so byte slicing is safe
  let stem = &stem[..stem.len().min(MAX_FILENAME_LEN - EXTENSION.len())];
  let stem = stem.trim_end();

  if stem.is_empty() {
    return DEFAULT_FILENAME.to_string();
  }

  format!("{stem}{EXTENSION}")
}

#[cfg(test)]
mod test {
  use super::*;

  fn assert_well_formed(name: &str) {
    let pattern = Regex::new(r"^[A-Za-z0-9._ -]*\.mp4$").unwrap();
    assert!(pattern.is_match(name), "{name:?}");
    assert!(name.len() <= MAX_FILENAME_LEN, "{name:?}");
  }

  #[test]
  fn test_defaults() {
    assert_eq!(sanitize(None), "video.mp4");
    assert_eq!(sanitize(Some("")), "video.mp4");
    assert_eq!(sanitize(Some("###")), "video.mp4");
    assert_eq!(sanitize(Some("   ")), "video.mp4");
    assert_eq!(sanitize(Some(".mp4")), "video.mp4");
  }

  #[test]
  fn test_strips_unsafe_characters() {
    assert_eq!(sanitize(Some("My Video!!")), "My Video.mp4");
    assert_eq!(sanitize(Some("../../etc/passwd")), "....etcpasswd.mp4");
    assert_eq!(sanitize(Some("a\"b\r\nc")), "abc.mp4");
    assert_eq!(sanitize(Some("日本語 title")), "title.mp4");
  }

  #[test]
  fn test_extension() {
    assert_eq!(sanitize(Some("clip.mp4")), "clip.mp4");
    assert_eq!(sanitize(Some("clip.MP4")), "clip.mp4");
    assert_eq!(sanitize(Some("clip.webm")), "clip.webm.mp4");
  }

  #[test]
  fn test_truncation_keeps_extension() {
    let name = sanitize(Some(&"a".repeat(300)));
    assert_eq!(name.len(), MAX_FILENAME_LEN);
    assert!(name.ends_with(".mp4"));
    assert_well_formed(&name);

    let name = sanitize(Some(&format!("{}.mp4", "b".repeat(250))));
    assert_eq!(name.len(), MAX_FILENAME_LEN);
    assert!(name.ends_with("b.mp4"));

    // no stray space right before the extension after cutting
    let name = sanitize(Some(&format!("{} tail", "c".repeat(195))));
    assert_eq!(name, format!("{}.mp4", "c".repeat(195)));
  }

  #[test]
  fn test_always_well_formed() {
    let inputs = [
      "",
      "plain",
      "  padded  ",
      "tab\tseparated",
      "emoji 🎬 title",
      "name.mp4.mp4",
      "-- dashes --",
      "....",
    ];

    for input in inputs {
      let name = sanitize(Some(input));
      assert_well_formed(&name);
      assert!(!name.is_empty());
    }
  }
}
