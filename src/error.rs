/// Error taxonomy for the release lifecycle
///
/// Remote failures are retryable by the sweeper. Definition and input errors are
/// reported to the caller and never retried. Not-found on undeploy/delete paths is
/// absorbed by the adapters and never reaches this type.

use std::fmt;

/// Result alias used throughout relsync
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Network error, timeout or unexpected status from a remote service
    #[error("{service} request failed: {message}")]
    Remote {
        service: &'static str,
        message: String,
    },

    /// The workflow definition cannot be deployed as given
    #[error("invalid workflow definition: {0}")]
    InvalidDefinition(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// The release is still referenced by instances
    #[error("release in use: {0}")]
    InUse(String),

    #[error("{resource} not found: {id}")]
    NotFound {
        resource: &'static str,
        id: String,
    },

    #[error("access denied: {0}")]
    Forbidden(String),

    #[error("store error: {0}")]
    Store(#[from] sqlx::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("scheduler error: {0}")]
    Scheduler(String),
}

impl Error {
    pub fn not_found(resource: &'static str, id: impl fmt::Display) -> Self {
        Self::NotFound {
            resource,
            id: id.to_string(),
        }
    }

    /// Build a remote error with base URLs and credentials stripped from the message
    pub fn remote(service: &'static str, message: impl AsRef<str>) -> Self {
        Self::Remote {
            service,
            message: redact_urls(message.as_ref()),
        }
    }

    /// Whether the sweeper may retry the operation that produced this error
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Remote { .. } | Self::Store(_))
    }

    /// Definition-level failures get recorded on the release and reported to the user
    pub fn is_definition_error(&self) -> bool {
        matches!(self, Self::InvalidDefinition(_))
    }

    /// Network-level failure (connect, timeout, body decode) of a remote call
    pub fn transport(service: &'static str, err: reqwest::Error) -> Self {
        let kind = if err.is_timeout() { "timeout" } else { "transport error" };
        Self::remote(service, format!("{}: {}", kind, err.without_url()))
    }
}

/// Replace every `scheme://...` token with `<redacted>`
///
/// Engine error bodies and transport errors tend to echo internal hostnames and
/// basic-auth credentials. Callers only ever see the redacted form.
pub fn redact_urls(message: &str) -> String {
    let mut out = String::with_capacity(message.len());
    let mut rest = message;

    while let Some(pos) = rest.find("://") {
        // walk back over the scheme
        let scheme_start = rest[..pos]
            .char_indices()
            .rev()
            .find(|&(_, c)| !(c.is_ascii_alphanumeric() || c == '+' || c == '-' || c == '.'))
            .map(|(i, c)| i + c.len_utf8())
            .unwrap_or(0);
        if scheme_start == pos {
            out.push_str(&rest[..pos + 3]);
            rest = &rest[pos + 3..];
            continue;
        }
        out.push_str(&rest[..scheme_start]);
        out.push_str("<redacted>");

        let after = &rest[pos + 3..];
        let end = after
            .find(|c: char| c.is_whitespace() || c == '"' || c == '\'' || c == ')' || c == '>')
            .unwrap_or(after.len());
        rest = &after[end..];
    }
    out.push_str(rest);
    out
}
