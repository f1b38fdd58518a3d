/// Shared helpers for the HTTP adapters (engine, permissions, notifications, module callbacks)

use crate::error::{Error, Result};
use reqwest::{Response, StatusCode};

/// Pass 2xx responses through, turn anything else into a redacted remote error
pub(crate) async fn ensure_success(service: &'static str, response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    Err(status_error(service, response).await)
}

/// Like [`ensure_success`], but a 404 counts as done
///
/// Used on every delete path: a resource that is already gone is the goal state.
pub(crate) async fn ensure_deleted(service: &'static str, response: Response) -> Result<()> {
    if response.status() == StatusCode::NOT_FOUND {
        tracing::debug!("{} resource already gone", service);
        return Ok(());
    }
    ensure_success(service, response).await.map(|_| ())
}

/// Remote error carrying status and (truncated) body text
pub(crate) async fn status_error(service: &'static str, response: Response) -> Error {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    Error::remote(service, format!("status {}: {}", status.as_u16(), truncate(&body, 512)))
}

fn truncate(text: &str, max: usize) -> &str {
    if text.len() <= max {
        return text;
    }
    let mut end = max;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    &text[..end]
}
