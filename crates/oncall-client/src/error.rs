//! Schedule API error types and their retry classification.

/// Retry classification of a failed remote call.
///
/// This is a closed set: every error crossing the client boundary maps to
/// exactly one class, derived from structured data (status codes, transport
/// error kinds), never from message text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorClass {
    /// The same request will never succeed (malformed input, auth failure).
    Permanent,
    /// The request may succeed later (rate limiting, outage, network fault).
    Transient,
    /// The addressed resource does not exist.
    NotFound,
}

impl std::fmt::Display for ErrorClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Permanent => write!(f, "permanent"),
            Self::Transient => write!(f, "transient"),
            Self::NotFound => write!(f, "not found"),
        }
    }
}

/// Errors that know their own [`ErrorClass`].
pub trait Classify {
    fn class(&self) -> ErrorClass;
}

/// Errors from schedule API calls.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// HTTP transport error (connect, timeout, reset).
    #[error("HTTP error calling {endpoint}: {source}")]
    Http {
        endpoint: String,
        source: reqwest::Error,
    },
    /// The API returned a non-2xx status.
    #[error("schedule API {endpoint} returned {status}: {body}")]
    Status {
        endpoint: String,
        status: u16,
        body: String,
    },
    /// Response deserialization failed.
    #[error("failed to deserialize response from {endpoint}: {reason}")]
    Deserialization { endpoint: String, reason: String },
    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(#[from] super::config::ConfigError),
}

impl ApiError {
    /// Build a status error; convenient for non-HTTP implementations of
    /// the client trait.
    pub fn status(endpoint: impl Into<String>, status: u16, body: impl Into<String>) -> Self {
        Self::Status {
            endpoint: endpoint.into(),
            status,
            body: body.into(),
        }
    }

    /// True when the remote service reported the resource as absent.
    pub fn is_not_found(&self) -> bool {
        self.class() == ErrorClass::NotFound
    }

    /// True when the failure proves the request was not applied: no
    /// connection was made, or the service shed it with 429 before
    /// processing. A 5xx or a timeout says nothing about whether a write
    /// landed.
    pub fn is_unapplied(&self) -> bool {
        match self {
            Self::Http { source, .. } => source.is_connect() || source.is_builder(),
            Self::Status { status, .. } => *status == 429,
            Self::Deserialization { .. } => false,
            Self::Config(_) => true,
        }
    }
}

/// Map an HTTP status code to its retry class.
pub fn classify_status(status: u16) -> ErrorClass {
    match status {
        404 | 410 => ErrorClass::NotFound,
        408 | 425 | 429 => ErrorClass::Transient,
        500..=599 => ErrorClass::Transient,
        _ => ErrorClass::Permanent,
    }
}

impl Classify for ApiError {
    fn class(&self) -> ErrorClass {
        match self {
            Self::Http { source, .. } => {
                if source.is_builder() || source.is_redirect() {
                    ErrorClass::Permanent
                } else {
                    ErrorClass::Transient
                }
            }
            Self::Status { status, .. } => classify_status(*status),
            Self::Deserialization { .. } | Self::Config(_) => ErrorClass::Permanent,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_classes() {
        assert_eq!(classify_status(404), ErrorClass::NotFound);
        assert_eq!(classify_status(410), ErrorClass::NotFound);
        assert_eq!(classify_status(429), ErrorClass::Transient);
        assert_eq!(classify_status(503), ErrorClass::Transient);
        assert_eq!(classify_status(408), ErrorClass::Transient);
        assert_eq!(classify_status(400), ErrorClass::Permanent);
        assert_eq!(classify_status(401), ErrorClass::Permanent);
        assert_eq!(classify_status(422), ErrorClass::Permanent);
    }

    #[test]
    fn deserialization_is_permanent() {
        let err = ApiError::Deserialization {
            endpoint: "GET /schedules/x".into(),
            reason: "missing field `id`".into(),
        };
        assert_eq!(err.class(), ErrorClass::Permanent);
    }

    #[test]
    fn status_helper_and_not_found() {
        let err = ApiError::status("DELETE /schedules/x", 404, "");
        assert!(err.is_not_found());
        assert!(err.to_string().contains("404"));
    }

    #[test]
    fn only_rate_limiting_proves_a_write_did_not_land() {
        assert!(ApiError::status("POST /schedules", 429, "").is_unapplied());
        for status in [500, 502, 503, 504, 408] {
            assert!(
                !ApiError::status("POST /schedules", status, "").is_unapplied(),
                "{status}"
            );
        }
    }
}
