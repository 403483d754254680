//! Typed configuration surface: credentials, endpoints, and the budgets that
//! drive the limiter, breaker, cache, and per-call deadlines.

// std
use std::env;
// self
use crate::{
	_prelude::*,
	auth::{GrantMode, Secret},
	breaker::BreakerPolicy,
	cache::CachePolicy,
	error::ConfigError,
	limit::RateBudget,
};

const ENV_CLIENT_ID: &str = "REDDIT_CLIENT_ID";
const ENV_CLIENT_SECRET: &str = "REDDIT_CLIENT_SECRET";
const ENV_USERNAME: &str = "REDDIT_USERNAME";
const ENV_PASSWORD: &str = "REDDIT_PASSWORD";
const ENV_USER_AGENT: &str = "REDDIT_USER_AGENT";

const DEFAULT_USER_AGENT: &str = concat!("reddit-courier/", env!("CARGO_PKG_VERSION"));
const DEFAULT_TOKEN_ENDPOINT: &str = "https://www.reddit.com/api/v1/access_token";
// Trailing slash matters: relative joins replace the last path segment.
const DEFAULT_API_BASE: &str = "https://oauth.reddit.com/";

/// OAuth application credentials, optionally paired with an account for the
/// password grant.
#[derive(Clone, Debug)]
pub struct Credentials {
	/// OAuth client identifier from the app registration.
	pub client_id: String,
	/// OAuth client secret from the app registration.
	pub client_secret: Secret,
	/// Account username; enables the password grant together with `password`.
	pub username: Option<String>,
	/// Account password; enables the password grant together with `username`.
	pub password: Option<Secret>,
}
impl Credentials {
	/// Creates application-only (read-only) credentials.
	pub fn new(client_id: impl Into<String>, client_secret: impl Into<Secret>) -> Self {
		Self {
			client_id: client_id.into(),
			client_secret: client_secret.into(),
			username: None,
			password: None,
		}
	}

	/// Attaches account credentials, enabling the password grant.
	pub fn with_account(mut self, username: impl Into<String>, password: impl Into<Secret>) -> Self {
		self.username = Some(username.into());
		self.password = Some(password.into());

		self
	}

	/// Grant derived from whether account credentials are present.
	pub fn grant_mode(&self) -> GrantMode {
		if self.username.is_some() && self.password.is_some() {
			GrantMode::Password
		} else {
			GrantMode::ClientCredentials
		}
	}
}

/// Complete client configuration with conservative defaults.
///
/// Defaults stay deliberately below Reddit's stated budget: 55 requests per
/// 60 s window with 1-2 s pacing, a 60 s token safety margin, and a breaker
/// that opens after 3 consecutive qualifying failures.
#[derive(Clone, Debug)]
pub struct ClientConfig {
	/// Application (and optional account) credentials.
	pub credentials: Credentials,
	/// User-Agent sent with every request; Reddit rejects empty ones.
	pub user_agent: String,
	/// OAuth token endpoint.
	pub token_endpoint: Url,
	/// Base URL for authenticated API calls; must end with a slash.
	pub api_base: Url,
	/// Rolling-window request budget and pacing jitter.
	pub budget: RateBudget,
	/// Response cache TTL and capacity ceiling.
	pub cache: CachePolicy,
	/// Circuit breaker threshold and cooldown policy.
	pub breaker: BreakerPolicy,
	/// Deadline applied to every network exchange.
	pub call_timeout: StdDuration,
	/// Maximum attempts for a read operation, including the first.
	pub read_attempts: u32,
	/// Minimum remaining token lifetime guaranteed by `ensure_valid`.
	pub token_margin: Duration,
}
impl ClientConfig {
	/// Creates a configuration with defaults for everything but credentials.
	pub fn new(credentials: Credentials) -> Self {
		Self {
			credentials,
			user_agent: DEFAULT_USER_AGENT.into(),
			token_endpoint: default_url(DEFAULT_TOKEN_ENDPOINT),
			api_base: default_url(DEFAULT_API_BASE),
			budget: RateBudget::default(),
			cache: CachePolicy::default(),
			breaker: BreakerPolicy::default(),
			call_timeout: StdDuration::from_secs(30),
			read_attempts: 3,
			token_margin: Duration::seconds(60),
		}
	}

	/// Loads credentials (and an optional User-Agent override) from the
	/// process environment.
	pub fn from_env() -> Result<Self, ConfigError> {
		Self::from_lookup(|name| env::var(name).ok())
	}

	/// Builds a configuration from an arbitrary variable lookup.
	///
	/// `REDDIT_CLIENT_ID` and `REDDIT_CLIENT_SECRET` are required; the
	/// account pair is honored only when both halves are present, matching
	/// the original deployment's read-only fallback.
	pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
		let client_id =
			lookup(ENV_CLIENT_ID).ok_or(ConfigError::MissingVariable { variable: ENV_CLIENT_ID })?;
		let client_secret = lookup(ENV_CLIENT_SECRET)
			.ok_or(ConfigError::MissingVariable { variable: ENV_CLIENT_SECRET })?;
		let mut credentials = Credentials::new(client_id, client_secret);

		if let (Some(username), Some(password)) = (lookup(ENV_USERNAME), lookup(ENV_PASSWORD)) {
			credentials = credentials.with_account(username, password);
		}

		let mut config = Self::new(credentials);

		if let Some(user_agent) = lookup(ENV_USER_AGENT) {
			config.user_agent = user_agent;
		}

		Ok(config)
	}

	/// Overrides the User-Agent string.
	pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
		self.user_agent = user_agent.into();

		self
	}

	/// Overrides the token endpoint (useful against mock servers).
	pub fn with_token_endpoint(mut self, endpoint: Url) -> Self {
		self.token_endpoint = endpoint;

		self
	}

	/// Overrides the API base URL (useful against mock servers).
	pub fn with_api_base(mut self, base: Url) -> Self {
		self.api_base = base;

		self
	}

	/// Overrides the rate budget.
	pub fn with_budget(mut self, budget: RateBudget) -> Self {
		self.budget = budget;

		self
	}

	/// Overrides the cache policy.
	pub fn with_cache(mut self, cache: CachePolicy) -> Self {
		self.cache = cache;

		self
	}

	/// Overrides the breaker policy.
	pub fn with_breaker(mut self, breaker: BreakerPolicy) -> Self {
		self.breaker = breaker;

		self
	}

	/// Overrides the per-call deadline.
	pub fn with_call_timeout(mut self, timeout: StdDuration) -> Self {
		self.call_timeout = timeout;

		self
	}

	/// Overrides the bounded read attempt count (minimum 1).
	pub fn with_read_attempts(mut self, attempts: u32) -> Self {
		self.read_attempts = attempts.max(1);

		self
	}

	/// Overrides the token safety margin.
	pub fn with_token_margin(mut self, margin: Duration) -> Self {
		self.token_margin = if margin.is_negative() { Duration::ZERO } else { margin };

		self
	}

	/// Validates cross-field invariants before a client is constructed.
	pub fn validate(&self) -> Result<(), ConfigError> {
		if self.user_agent.trim().is_empty() {
			return Err(ConfigError::EmptyUserAgent);
		}

		self.budget.validate()?;
		self.cache.validate()?;
		self.breaker.validate()?;

		Ok(())
	}
}

fn default_url(value: &'static str) -> Url {
	Url::parse(value).expect("Built-in endpoint URL should parse.")
}
