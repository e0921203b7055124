//! Helpers for turning provider and OS errors into short, safe user-facing messages.
use regex::{Regex, RegexBuilder};
use std::sync::OnceLock;

/// Longest message shown to the user anywhere in the UI or companion page.
pub const MESSAGE_CAP: usize = 100;

/// Longest provider detail embedded inside a classified error message.
pub const DETAIL_CAP: usize = 80;

/// Regex patterns for secret redaction
static SECRET_PATTERNS: OnceLock<Vec<(Regex, &'static str)>> = OnceLock::new();

fn get_secret_patterns() -> &'static Vec<(Regex, &'static str)> {
  SECRET_PATTERNS.get_or_init(|| {
    let patterns: [(&str, &str); 4] = [
      // OpenAI style keys: sk-..., sk-proj-...
      (r"\bsk-[A-Za-z0-9_\-]{8,}", "sk-[REDACTED]"),
      // api_key = "value" or api_key="value" style
      (r#"((?:api|access|auth|client|secret)[_-]?(?:key|secret|token))\s*[=:]\s*["']?[^"'\s,]+["']?"#, "$1=[REDACTED]"),
      // Bearer tokens
      (r"bearer\s+[a-zA-Z0-9\-._~+/=]+", "bearer [REDACTED]"),
      // JWT tokens (eyJ...)
      (r"eyJ[A-Za-z0-9_\-=]+\.[A-Za-z0-9_\-=]+\.[A-Za-z0-9_\-=.]+", "[REDACTED_JWT]"),
    ];
    patterns
      .iter()
      .filter_map(|(pattern, replacement)| {
        RegexBuilder::new(pattern)
          .case_insensitive(true)
          .build()
          .ok()
          .map(|re| (re, *replacement))
      })
      .collect()
  })
}

/// Redacts API keys and tokens that providers sometimes echo back in error bodies.
pub fn redact_secrets(text: &str) -> String {
  let mut result = text.to_string();
  for (re, replacement) in get_secret_patterns() {
    result = re.replace_all(&result, *replacement).to_string();
  }
  result
}

/// Returns at most `max_chars` characters of `text`, never splitting a code point.
pub fn truncate_chars(text: &str, max_chars: usize) -> &str {
  match text.char_indices().nth(max_chars) {
    Some((idx, _)) => &text[..idx],
    None => text,
  }
}

/// Collapses newlines so a message fits a single status line.
fn single_line(text: &str) -> String {
  text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Redacts, flattens and caps `text` at [`MESSAGE_CAP`] characters.
pub fn user_message(text: &str) -> String {
  let flat = single_line(&redact_secrets(text));
  truncate_chars(&flat, MESSAGE_CAP).to_string()
}

/// Redacts, flattens and caps provider detail at [`DETAIL_CAP`] characters.
pub fn detail(text: &str) -> String {
  let flat = single_line(&redact_secrets(text));
  truncate_chars(&flat, DETAIL_CAP).to_string()
}
