//! OAuth token lifecycle: credential exchange, proactive refresh, and the
//! redacting [`Secret`] wrapper.
//!
//! [`TokenManager::ensure_valid`] is the single entry point. It guarantees the
//! returned token stays valid for at least the configured safety margin and
//! coalesces concurrent refreshes behind one in-flight exchange, so an
//! expiring token never triggers a stampede against the token endpoint.

// self
use crate::{
	_prelude::*,
	config::{ClientConfig, Credentials},
	error::ValidationError,
	http::{ApiRequest, ApiResponse, Authorization, Transport},
	model,
	obs::{self, CallKind, CallOutcome, CallSpan},
};

/// Redacted secret wrapper keeping credentials and tokens out of logs.
#[derive(Clone, PartialEq, Eq)]
pub struct Secret(String);
impl Secret {
	/// Wraps a new secret string.
	pub fn new(value: impl Into<String>) -> Self {
		Self(value.into())
	}

	/// Returns the inner value. Callers must avoid logging this string.
	pub fn expose(&self) -> &str {
		&self.0
	}
}
impl AsRef<str> for Secret {
	fn as_ref(&self) -> &str {
		self.expose()
	}
}
impl From<&str> for Secret {
	fn from(value: &str) -> Self {
		Self::new(value)
	}
}
impl From<String> for Secret {
	fn from(value: String) -> Self {
		Self(value)
	}
}
impl Debug for Secret {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_tuple("Secret").field(&"<redacted>").finish()
	}
}
impl Display for Secret {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str("<redacted>")
	}
}

/// Grant used for token exchanges, derived from the configured credentials.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GrantMode {
	/// Application-only access; read endpoints work, writes are rejected
	/// locally before any network traffic.
	ClientCredentials,
	/// Script-app password grant; enables write endpoints.
	Password,
}
impl GrantMode {
	/// Returns the wire-level `grant_type` value.
	pub const fn as_str(self) -> &'static str {
		match self {
			GrantMode::ClientCredentials => "client_credentials",
			GrantMode::Password => "password",
		}
	}
}

/// Access token issued by the token endpoint.
///
/// Replaced wholesale on refresh, never mutated in place.
#[derive(Clone)]
pub struct AccessToken {
	/// Bearer secret; callers must avoid logging it.
	pub secret: Secret,
	/// Token type as reported by the endpoint (Reddit always says `bearer`).
	pub token_type: String,
	/// Instant the exchange completed.
	pub issued_at: OffsetDateTime,
	/// Expiry instant derived from `issued_at` plus `expires_in`.
	pub expires_at: OffsetDateTime,
}
impl AccessToken {
	/// Remaining lifetime at the provided instant; negative once expired.
	pub fn remaining_at(&self, instant: OffsetDateTime) -> Duration {
		self.expires_at - instant
	}

	/// Returns `true` while the remaining lifetime meets the safety margin.
	pub fn is_fresh_at(&self, instant: OffsetDateTime, margin: Duration) -> bool {
		self.remaining_at(instant) >= margin
	}

	/// Builds the bearer authorization for API requests.
	pub fn authorization(&self) -> Authorization {
		Authorization::Bearer(self.secret.clone())
	}
}
impl Debug for AccessToken {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("AccessToken")
			.field("secret", &"<redacted>")
			.field("token_type", &self.token_type)
			.field("issued_at", &self.issued_at)
			.field("expires_at", &self.expires_at)
			.finish()
	}
}

#[derive(Deserialize)]
struct RawTokenResponse {
	#[serde(default)]
	access_token: Option<String>,
	#[serde(default)]
	token_type: Option<String>,
	#[serde(default)]
	expires_in: Option<i64>,
	// Reddit reports bad account credentials as `{"error": "invalid_grant"}`
	// with HTTP 200, so the field must be checked on every response.
	#[serde(default)]
	error: Option<serde_json::Value>,
}

/// Owns the OAuth credential exchange and proactive refresh.
///
/// The manager holds at most one [`AccessToken`]; the slot is replaced
/// wholesale on refresh and cleared by [`invalidate`](Self::invalidate).
pub struct TokenManager<T>
where
	T: ?Sized + Transport,
{
	transport: Arc<T>,
	credentials: Credentials,
	user_agent: String,
	token_endpoint: Url,
	margin: Duration,
	call_timeout: StdDuration,
	current: Mutex<Option<AccessToken>>,
	exchange_guard: AsyncMutex<()>,
}
impl<T> TokenManager<T>
where
	T: ?Sized + Transport,
{
	/// Creates a manager bound to the shared transport and configuration.
	pub fn new(transport: Arc<T>, config: &ClientConfig) -> Self {
		Self {
			transport,
			credentials: config.credentials.clone(),
			user_agent: config.user_agent.clone(),
			token_endpoint: config.token_endpoint.clone(),
			margin: config.token_margin,
			call_timeout: config.call_timeout,
			current: Mutex::new(None),
			exchange_guard: AsyncMutex::new(()),
		}
	}

	/// Grant derived from the configured credentials.
	pub fn grant_mode(&self) -> GrantMode {
		self.credentials.grant_mode()
	}

	/// Returns a token guaranteed valid for at least the safety margin.
	///
	/// Concurrent callers observing an expiring token await the single
	/// in-flight exchange instead of issuing redundant ones. Rejected
	/// credentials surface as [`Error::Auth`] and are never retried here.
	pub async fn ensure_valid(&self) -> Result<AccessToken> {
		if let Some(token) = self.fresh_token() {
			return Ok(token);
		}

		let _exchange = self.exchange_guard.lock().await;

		// Another caller may have refreshed while this one awaited the guard.
		if let Some(token) = self.fresh_token() {
			return Ok(token);
		}

		let token = self.exchange().await?;

		*self.current.lock() = Some(token.clone());

		Ok(token)
	}

	/// Drops the held token; the next call performs a fresh exchange.
	pub fn invalidate(&self) {
		*self.current.lock() = None;
	}

	fn fresh_token(&self) -> Option<AccessToken> {
		let now = OffsetDateTime::now_utc();

		self.current.lock().as_ref().filter(|token| token.is_fresh_at(now, self.margin)).cloned()
	}

	async fn exchange(&self) -> Result<AccessToken> {
		const KIND: CallKind = CallKind::TokenExchange;

		let span = CallSpan::new(KIND, "exchange");

		obs::record_call_outcome(KIND, CallOutcome::Attempt);

		let result = span
			.instrument(async {
				let request = ApiRequest::post_form(
					self.token_endpoint.clone(),
					Authorization::Basic {
						username: self.credentials.client_id.clone(),
						secret: self.credentials.client_secret.clone(),
					},
					self.user_agent.clone(),
					self.grant_form(),
				);
				let response =
					match tokio::time::timeout(self.call_timeout, self.transport.execute(request))
						.await
					{
						Ok(Ok(response)) => response,
						Ok(Err(err)) => return Err(err.into()),
						Err(_) => return Err(Error::Timeout { limit: self.call_timeout }),
					};
				let result = Self::interpret(response);

				if matches!(result, Err(Error::Auth { .. })) {
					self.invalidate();
				}

				result
			})
			.await;

		match &result {
			Ok(_) => obs::record_call_outcome(KIND, CallOutcome::Success),
			Err(_) => obs::record_call_outcome(KIND, CallOutcome::Failure),
		}

		result
	}

	fn grant_form(&self) -> Vec<(String, String)> {
		let grant = self.credentials.grant_mode();
		let mut form = vec![("grant_type".into(), grant.as_str().into())];

		if let (GrantMode::Password, Some(username), Some(password)) =
			(grant, self.credentials.username.as_ref(), self.credentials.password.as_ref())
		{
			form.push(("username".into(), username.clone()));
			form.push(("password".into(), password.expose().into()));
		}

		form
	}

	fn interpret(response: ApiResponse) -> Result<AccessToken> {
		const ENDPOINT: &str = "token";

		match response.status {
			429 => return Err(Error::RateLimited { retry_after: response.retry_after }),
			status @ 500..=599 => return Err(Error::Server { status }),
			_ => {},
		}

		let raw: RawTokenResponse = model::deserialize_json(&response.body, ENDPOINT)?;

		if let Some(error) = raw.error {
			let reason = error.as_str().map(str::to_owned).unwrap_or_else(|| error.to_string());

			return Err(Error::Auth { reason });
		}
		if !(200..300).contains(&response.status) {
			return Err(Error::Auth {
				reason: format!("token endpoint returned status {}", response.status),
			});
		}

		let access_token = raw
			.access_token
			.ok_or(ValidationError::MissingField { endpoint: ENDPOINT, field: "access_token" })?;
		let expires_in = raw
			.expires_in
			.ok_or(ValidationError::MissingField { endpoint: ENDPOINT, field: "expires_in" })?;

		if expires_in <= 0 {
			return Err(ValidationError::NonPositiveExpiry.into());
		}

		let issued_at = OffsetDateTime::now_utc();

		Ok(AccessToken {
			secret: Secret::new(access_token),
			token_type: raw.token_type.unwrap_or_else(|| "bearer".into()),
			issued_at,
			expires_at: issued_at + Duration::seconds(expires_in),
		})
	}
}
impl<T> Debug for TokenManager<T>
where
	T: ?Sized + Transport,
{
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("TokenManager")
			.field("grant_mode", &self.credentials.grant_mode())
			.field("token_endpoint", &self.token_endpoint.as_str())
			.field("margin", &self.margin)
			.finish()
	}
}
