//! Mapping of HTTP outcomes onto the retryable / permanent split.

use demand_core::CampaignError;
use reqwest::{Response, StatusCode};

/// Longest slice of an error body kept in error messages.
const MAX_ERROR_BODY: usize = 512;

pub(crate) fn transport_error(service: &str, err: reqwest::Error) -> CampaignError {
    if err.is_timeout() || err.is_connect() || err.is_request() {
        CampaignError::transient(service, err.to_string())
    } else {
        CampaignError::rejected(service, err.to_string())
    }
}

pub(crate) fn decode_error(service: &str, err: reqwest::Error) -> CampaignError {
    CampaignError::rejected(service, format!("undecodable response: {err}"))
}

pub(crate) fn is_transient_status(status: StatusCode) -> bool {
    status == StatusCode::REQUEST_TIMEOUT
        || status == StatusCode::TOO_MANY_REQUESTS
        || status.is_server_error()
}

/// Pass successful responses through; turn everything else into a typed
/// error carrying a trimmed copy of the body.
pub(crate) async fn check_status(service: &str, response: Response) -> Result<Response, CampaignError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    let mut message = format!("HTTP {}", status.as_u16());
    if !body.is_empty() {
        let trimmed: String = body.chars().take(MAX_ERROR_BODY).collect();
        message.push_str(": ");
        message.push_str(&trimmed);
    }

    if is_transient_status(status) {
        Err(CampaignError::transient(service, message))
    } else {
        Err(CampaignError::rejected(service, message))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_classification() {
        assert!(is_transient_status(StatusCode::TOO_MANY_REQUESTS));
        assert!(is_transient_status(StatusCode::SERVICE_UNAVAILABLE));
        assert!(is_transient_status(StatusCode::REQUEST_TIMEOUT));
        assert!(!is_transient_status(StatusCode::BAD_REQUEST));
        assert!(!is_transient_status(StatusCode::UNAUTHORIZED));
        assert!(!is_transient_status(StatusCode::NOT_FOUND));
    }
}
