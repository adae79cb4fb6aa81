//! Error classification shared by the HTTP-backed providers.

use std::time::Duration;

use reqwest::StatusCode;
use tracing::error;

use crate::error::RagError;

/// Map a transport failure to a retryable provider error.
pub(crate) fn transport_error(provider: &str, timeout: Duration, e: reqwest::Error) -> RagError {
    error!(provider, error = %e, "request failed");
    if e.is_timeout() {
        RagError::ProviderTimeout { provider: provider.to_string(), timeout }
    } else {
        RagError::ProviderTransient {
            provider: provider.to_string(),
            status: e.status().map(|s| s.as_u16()),
            message: format!("request failed: {e}"),
        }
    }
}

/// Whether a status indicates rate limiting or a server-side failure.
pub(crate) fn is_transient_status(status: StatusCode) -> bool {
    status == StatusCode::TOO_MANY_REQUESTS
        || status == StatusCode::REQUEST_TIMEOUT
        || status.is_server_error()
}

/// Map a non-success response to an error.
///
/// Transient statuses become [`RagError::ProviderTransient`]; everything else
/// is handed to `fatal` to build the provider-specific error.
pub(crate) fn status_error(
    provider: &str,
    status: StatusCode,
    detail: String,
    fatal: impl FnOnce(String) -> RagError,
) -> RagError {
    error!(provider, %status, "API error");
    if is_transient_status(status) {
        RagError::ProviderTransient {
            provider: provider.to_string(),
            status: Some(status.as_u16()),
            message: detail,
        }
    } else {
        fatal(format!("API returned {status}: {detail}"))
    }
}
