//! Shared fixtures for the integration tests: a scripted in-memory
//! transport and configuration presets with pacing disabled.

#![allow(dead_code)]

// std
use std::{
	collections::VecDeque,
	sync::{
		Mutex,
		atomic::{AtomicUsize, Ordering},
	},
	time::Duration,
};
// self
use reddit_courier::{
	config::{ClientConfig, Credentials},
	error::TransportError,
	http::{ApiRequest, ApiResponse, RateLimitHints, Transport, TransportFuture},
	limit::{PacingRange, RateBudget},
	url::Url,
};

/// One scripted transport exchange.
pub enum Script {
	/// Answer immediately.
	Respond(ApiResponse),
	/// Answer after the delay elapses.
	RespondAfter(Duration, ApiResponse),
	/// Never answer; the caller's timeout must fire.
	Hang,
	/// Fail with a connection-level error.
	Fail,
}

/// In-memory [`Transport`] that replays a fixed script and records every
/// request it sees.
pub struct ScriptedTransport {
	script: Mutex<VecDeque<Script>>,
	calls: AtomicUsize,
	seen: Mutex<Vec<ApiRequest>>,
}
impl ScriptedTransport {
	pub fn new(script: impl IntoIterator<Item = Script>) -> Self {
		Self {
			script: Mutex::new(script.into_iter().collect()),
			calls: AtomicUsize::new(0),
			seen: Mutex::new(Vec::new()),
		}
	}

	/// Total exchanges performed so far.
	pub fn calls(&self) -> usize {
		self.calls.load(Ordering::SeqCst)
	}

	/// Requests in arrival order.
	pub fn seen(&self) -> Vec<ApiRequest> {
		self.seen.lock().expect("Request log lock should not be poisoned.").clone()
	}
}
impl Transport for ScriptedTransport {
	fn execute(&self, request: ApiRequest) -> TransportFuture<'_> {
		self.calls.fetch_add(1, Ordering::SeqCst);
		self.seen.lock().expect("Request log lock should not be poisoned.").push(request);

		let step = self
			.script
			.lock()
			.expect("Script lock should not be poisoned.")
			.pop_front()
			.expect("Transport should not be called past the end of its script.");

		Box::pin(async move {
			match step {
				Script::Respond(response) => Ok(response),
				Script::RespondAfter(delay, response) => {
					tokio::time::sleep(delay).await;

					Ok(response)
				},
				Script::Hang => std::future::pending().await,
				Script::Fail => Err(TransportError::Io(std::io::Error::new(
					std::io::ErrorKind::ConnectionReset,
					"scripted connection reset",
				))),
			}
		})
	}
}

/// An HTTP response with the given status and JSON body, no rate headers.
pub fn json_response(status: u16, body: &str) -> ApiResponse {
	ApiResponse {
		status,
		body: body.as_bytes().to_vec(),
		hints: RateLimitHints::default(),
		retry_after: None,
	}
}

/// A successful token exchange answering with a one-hour token.
pub fn token_response() -> ApiResponse {
	json_response(
		200,
		r#"{"access_token": "tok-1", "token_type": "bearer", "expires_in": 3600, "scope": "*"}"#,
	)
}

/// A one-post listing body.
pub const LISTING_BODY: &str = r#"{"kind": "Listing", "data": {"children": [
	{"kind": "t3", "data": {
		"name": "t3_abc123",
		"subreddit": "rust",
		"title": "A post",
		"author": "someone",
		"selftext": "",
		"permalink": "/r/rust/comments/abc123/a_post/",
		"score": 12,
		"num_comments": 3,
		"created_utc": 1700000000.0
	}}
]}}"#;

/// Account-credentialed configuration with pacing disabled and local URLs.
pub fn test_config() -> ClientConfig {
	ClientConfig::new(Credentials::new("client-it", "secret-it").with_account("user-it", "hunter2"))
		.with_token_endpoint(parse_url("https://auth.invalid/api/v1/access_token"))
		.with_api_base(parse_url("https://api.invalid/"))
		.with_budget(RateBudget {
			capacity: 100,
			period: Duration::from_secs(60),
			pacing: PacingRange::ZERO,
		})
}

/// Application-only configuration (no account half), pacing disabled.
pub fn app_only_config() -> ClientConfig {
	let mut config = test_config();

	config.credentials = Credentials::new("client-it", "secret-it");

	config
}

pub fn parse_url(value: &str) -> Url {
	Url::parse(value).expect("Fixture URL should parse successfully.")
}
