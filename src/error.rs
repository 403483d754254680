//! Client-wide error taxonomy shared across the token, limiter, breaker, and cache layers.

// self
use crate::_prelude::*;

/// Crate-wide result type alias returning [`Error`] by default.
pub type Result<T, E = Error> = std::result::Result<T, E>;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Canonical client error exposed by public APIs.
#[derive(Debug, ThisError)]
pub enum Error {
	/// Local configuration problem.
	#[error(transparent)]
	Config(#[from] ConfigError),
	/// Transport failure (DNS, TCP, TLS).
	#[error(transparent)]
	Transport(#[from] TransportError),
	/// Response shape did not match the API contract.
	#[error(transparent)]
	Validation(#[from] ValidationError),

	/// Credentials were rejected; never retried.
	#[error("Credentials were rejected: {reason}.")]
	Auth {
		/// Server- or client-supplied reason string.
		reason: String,
	},
	/// The remote service reported rate limiting (HTTP 429 or an in-body
	/// `RATELIMIT` rejection).
	#[error("Rate limit exceeded; retry after {retry_after:?}.")]
	RateLimited {
		/// Retry-After hint from upstream, if supplied.
		retry_after: Option<StdDuration>,
	},
	/// The remote service failed with a 5xx status.
	#[error("Upstream server error with status {status}.")]
	Server {
		/// HTTP status code returned by the API.
		status: u16,
	},
	/// The request was rejected by the API for a non-retryable client-side
	/// reason (4xx other than 429, or an in-body field error).
	#[error("Request was rejected with status {status}: {reason}.")]
	Rejected {
		/// HTTP status code returned by the API.
		status: u16,
		/// Short reason extracted from the response.
		reason: String,
	},
	/// Synthetic failure emitted while the circuit breaker is open; no
	/// network attempt was made.
	#[error("Circuit breaker is open; retry in {retry_in:?}.")]
	CircuitOpen {
		/// Remaining cooldown before the next trial is admitted.
		retry_in: StdDuration,
	},
	/// Per-call deadline exceeded. Safe to retry for reads; surfaced without
	/// retry for writes because the outcome is ambiguous.
	#[error("Operation exceeded the {limit:?} deadline.")]
	Timeout {
		/// Deadline that was exceeded.
		limit: StdDuration,
	},
}
impl Error {
	/// Returns `true` when the failure qualifies as a circuit breaker
	/// failure (rate limiting or a server error).
	pub fn trips_breaker(&self) -> bool {
		matches!(self, Self::RateLimited { .. } | Self::Server { .. })
	}

	/// Returns `true` when a read operation may safely retry after backoff.
	pub fn is_retryable_read(&self) -> bool {
		matches!(
			self,
			Self::RateLimited { .. } | Self::Server { .. } | Self::Timeout { .. } | Self::Transport(_)
		)
	}
}

/// Configuration and validation failures raised while building a client.
#[derive(Debug, ThisError)]
pub enum ConfigError {
	/// Required environment variable is absent.
	#[error("Missing required environment variable `{variable}`.")]
	MissingVariable {
		/// Name of the absent variable.
		variable: &'static str,
	},
	/// HTTP client could not be constructed.
	#[error("HTTP client could not be constructed.")]
	HttpClientBuild {
		/// Underlying transport builder failure.
		#[source]
		source: BoxError,
	},
	/// Endpoint URL could not be constructed.
	#[error("Endpoint URL could not be constructed.")]
	InvalidEndpoint {
		/// Underlying parsing failure.
		#[source]
		source: url::ParseError,
	},

	/// Rate budget allows zero requests per window.
	#[error("Rate budget capacity must be greater than zero.")]
	ZeroCapacity,
	/// Pacing range is inverted.
	#[error("Pacing range minimum exceeds its maximum.")]
	InvalidPacingRange,
	/// Breaker never opens because the threshold is zero.
	#[error("Breaker threshold must be greater than zero.")]
	ZeroThreshold,
	/// Cache cannot hold a single entry.
	#[error("Cache capacity must be greater than zero.")]
	ZeroCacheCapacity,
	/// Reddit rejects requests without a User-Agent.
	#[error("User agent must not be empty.")]
	EmptyUserAgent,
	/// Write operations need the password grant.
	#[error("Write operations require account credentials (username and password).")]
	WriteRequiresAccount,
}
impl ConfigError {
	/// Wraps a transport's builder failure inside [`ConfigError`].
	pub fn http_client_build(src: impl 'static + Send + Sync + std::error::Error) -> Self {
		Self::HttpClientBuild { source: Box::new(src) }
	}
}
#[cfg(feature = "reqwest")]
impl From<ReqwestError> for ConfigError {
	fn from(e: ReqwestError) -> Self {
		Self::http_client_build(e)
	}
}

/// Transport-level failures (network, IO).
#[derive(Debug, ThisError)]
pub enum TransportError {
	/// Underlying HTTP client reported a network failure.
	#[error("Network error occurred while calling the API.")]
	Network {
		/// Transport-specific network error.
		#[source]
		source: BoxError,
	},
	/// Underlying IO failure surfaced during transport.
	#[error("I/O error occurred while calling the API.")]
	Io(#[from] std::io::Error),
}
impl TransportError {
	/// Wraps a transport-specific network error.
	pub fn network(src: impl 'static + Send + Sync + std::error::Error) -> Self {
		Self::Network { source: Box::new(src) }
	}
}
#[cfg(feature = "reqwest")]
impl From<ReqwestError> for TransportError {
	fn from(e: ReqwestError) -> Self {
		Self::network(e)
	}
}

/// Contract violations in API responses; never retried, they indicate an
/// upstream contract change rather than a transient fault.
#[derive(Debug, ThisError)]
pub enum ValidationError {
	/// Response body could not be parsed as the expected JSON shape.
	#[error("Response from the {endpoint} endpoint is malformed JSON.")]
	Malformed {
		/// Logical endpoint label.
		endpoint: &'static str,
		/// Structured parsing failure with the offending JSON path.
		#[source]
		source: serde_path_to_error::Error<serde_json::Error>,
	},
	/// Response parsed but a required field was absent.
	#[error("Response from the {endpoint} endpoint is missing `{field}`.")]
	MissingField {
		/// Logical endpoint label.
		endpoint: &'static str,
		/// Name of the absent field.
		field: &'static str,
	},
	/// Response carried a timestamp outside the representable range.
	#[error("Response from the {endpoint} endpoint carries an unrepresentable timestamp.")]
	Timestamp {
		/// Logical endpoint label.
		endpoint: &'static str,
	},
	/// Token endpoint returned a non-positive lifetime.
	#[error("Token lifetime must be positive.")]
	NonPositiveExpiry,
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn breaker_failures_are_429_and_5xx_only() {
		assert!(Error::RateLimited { retry_after: None }.trips_breaker());
		assert!(Error::Server { status: 503 }.trips_breaker());

		assert!(!Error::Rejected { status: 404, reason: "not found".into() }.trips_breaker());
		assert!(!Error::Auth { reason: "revoked".into() }.trips_breaker());
		assert!(!Error::Timeout { limit: StdDuration::from_secs(30) }.trips_breaker());
		assert!(!Error::CircuitOpen { retry_in: StdDuration::ZERO }.trips_breaker());
	}

	#[test]
	fn read_retry_classes_cover_transient_failures() {
		assert!(Error::RateLimited { retry_after: None }.is_retryable_read());
		assert!(Error::Server { status: 500 }.is_retryable_read());
		assert!(Error::Timeout { limit: StdDuration::from_secs(1) }.is_retryable_read());
		assert!(
			Error::Transport(TransportError::Io(std::io::Error::other("boom")))
				.is_retryable_read()
		);

		assert!(!Error::Auth { reason: "bad credentials".into() }.is_retryable_read());
		assert!(!Error::Rejected { status: 403, reason: "forbidden".into() }.is_retryable_read());
		assert!(!Error::CircuitOpen { retry_in: StdDuration::ZERO }.is_retryable_read());
	}

	#[test]
	fn config_errors_render_with_context() {
		let err = ConfigError::MissingVariable { variable: "REDDIT_CLIENT_ID" };

		assert!(err.to_string().contains("REDDIT_CLIENT_ID"));
	}
}
