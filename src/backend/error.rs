use thiserror::Error;

#[derive(Error, Debug)]
pub enum BackendError {
  #[error("Access denied: {0}")]
  AccessDenied(String),

  #[error("Unauthorized - check the API key or access token")]
  Unauthorized,

  #[error("Resource not found: {0}")]
  NotFound(String),

  #[error("Rate limited - please wait before retrying")]
  RateLimited,

  #[error("Server error: {0}")]
  ServerError(String),

  #[error("Network error: {0}")]
  Network(#[from] reqwest::Error),

  #[error("Invalid response: {0}")]
  InvalidResponse(String),

  #[error("Invalid backend URL: {0}")]
  Url(#[from] url::ParseError),

  #[error("Invalid credentials: {0}")]
  InvalidCredentials(String),
}

/// Maximum length for error response bodies in error messages
const MAX_ERROR_BODY_LENGTH: usize = 500;

impl BackendError {
  /// Truncate a response body to avoid logging excessive data
  fn truncate_body(body: &str) -> String {
    if body.len() <= MAX_ERROR_BODY_LENGTH {
      return body.to_string();
    }
    let mut end = MAX_ERROR_BODY_LENGTH;
    while !body.is_char_boundary(end) {
      end -= 1;
    }
    format!(
      "{}... (truncated, {} total bytes)",
      &body[..end],
      body.len()
    )
  }

  pub fn from_status(status: reqwest::StatusCode, body: &str) -> Self {
    let truncated = Self::truncate_body(body);
    match status.as_u16() {
      401 => Self::Unauthorized,
      403 => Self::AccessDenied(truncated),
      404 => Self::NotFound(truncated),
      429 => Self::RateLimited,
      500..=599 => Self::ServerError(truncated),
      _ => Self::InvalidResponse(format!("Status {}: {}", status, truncated)),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use reqwest::StatusCode;

  #[test]
  fn test_from_status() {
    assert!(matches!(
      BackendError::from_status(StatusCode::UNAUTHORIZED, ""),
      BackendError::Unauthorized
    ));
    assert!(matches!(
      BackendError::from_status(StatusCode::SERVICE_UNAVAILABLE, "down"),
      BackendError::ServerError(body) if body == "down"
    ));
    assert!(matches!(
      BackendError::from_status(StatusCode::CONFLICT, "dup"),
      BackendError::InvalidResponse(msg) if msg.contains("409")
    ));
  }

  #[test]
  fn test_truncate_respects_char_boundaries() {
    let body = "é".repeat(400);
    let truncated = BackendError::truncate_body(&body);
    assert!(truncated.contains("(truncated, 800 total bytes)"));

    assert_eq!(BackendError::truncate_body("short"), "short");
  }
}
