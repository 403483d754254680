//! Transport abstraction and the default reqwest-backed implementation.

// self
use crate::{_prelude::*, auth::Secret, error::TransportError};

/// HTTP methods the API surface uses.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Method {
	/// Read.
	Get,
	/// Write (form-encoded body).
	Post,
}
impl Method {
	/// Wire name.
	pub fn as_str(&self) -> &'static str {
		match self {
			Self::Get => "GET",
			Self::Post => "POST",
		}
	}
}

/// Credential carried on a request.
#[derive(Clone, Debug)]
pub enum Authorization {
	/// HTTP Basic, for the token endpoint.
	Basic {
		/// Username half (the application client id).
		username: String,
		/// Password half.
		secret: Secret,
	},
	/// OAuth2 bearer token, for API calls.
	Bearer(Secret),
}
impl Authorization {
	/// Renders the `Authorization` header value.
	pub fn header_value(&self) -> String {
		// crates.io
		use base64::prelude::*;

		match self {
			Self::Basic { username, secret } => format!(
				"Basic {}",
				BASE64_STANDARD.encode(format!("{username}:{}", secret.expose()))
			),
			Self::Bearer(secret) => format!("Bearer {}", secret.expose()),
		}
	}
}

/// A prepared request for the [`Transport`] to execute.
#[derive(Clone, Debug)]
pub struct ApiRequest {
	/// Method.
	pub method: Method,
	/// Fully resolved URL, query included.
	pub url: Url,
	/// Credential; every endpoint this crate talks to requires one.
	pub authorization: Authorization,
	/// Form-encoded body pairs; only sent for [`Method::Post`].
	pub form: Vec<(String, String)>,
	/// Mandatory `User-Agent` value.
	pub user_agent: String,
}
impl ApiRequest {
	/// Builds a GET request.
	pub fn get(url: Url, authorization: Authorization, user_agent: impl Into<String>) -> Self {
		Self {
			method: Method::Get,
			url,
			authorization,
			form: Vec::new(),
			user_agent: user_agent.into(),
		}
	}

	/// Builds a form-encoded POST request.
	pub fn post_form(
		url: Url,
		authorization: Authorization,
		user_agent: impl Into<String>,
		form: Vec<(String, String)>,
	) -> Self {
		Self { method: Method::Post, url, authorization, form, user_agent: user_agent.into() }
	}
}

/// Rate limit usage reported by `x-ratelimit-*` response headers.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct RateLimitHints {
	/// Calls left in the server's current window; fractional on the wire.
	pub remaining: Option<f64>,
	/// Calls consumed in the server's current window.
	pub used: Option<u32>,
	/// Time until the server's window resets.
	pub reset_in: Option<StdDuration>,
}

/// A transport-level response, body still unparsed.
#[derive(Clone, Debug)]
pub struct ApiResponse {
	/// HTTP status code.
	pub status: u16,
	/// Raw body bytes.
	pub body: Vec<u8>,
	/// Parsed rate limit headers.
	pub hints: RateLimitHints,
	/// Parsed `Retry-After` header.
	pub retry_after: Option<StdDuration>,
}
impl ApiResponse {
	/// Whether the status is in the 2xx range.
	pub fn is_success(&self) -> bool {
		(200..300).contains(&self.status)
	}
}

/// Boxed response future returned by [`Transport::execute`].
pub type TransportFuture<'a> =
	Pin<Box<dyn Future<Output = Result<ApiResponse, TransportError>> + Send + 'a>>;

/// Executes prepared requests; the seam test doubles plug into.
pub trait Transport: Send + Sync {
	/// Performs one HTTP exchange.
	fn execute(&self, request: ApiRequest) -> TransportFuture<'_>;
}

/// Parses a `Retry-After` value, either delta-seconds or an HTTP-date.
pub(crate) fn parse_retry_after(value: &str) -> Option<StdDuration> {
	if let Ok(secs) = value.trim().parse::<u64>() {
		return Some(StdDuration::from_secs(secs));
	}

	let at = OffsetDateTime::parse(value.trim(), &time::format_description::well_known::Rfc2822)
		.ok()?;
	let delta = at - OffsetDateTime::now_utc();

	delta.try_into().ok()
}

#[cfg(feature = "reqwest")]
pub use reqwest_transport::ReqwestTransport;
#[cfg(feature = "reqwest")]
mod reqwest_transport {
	// self
	use super::*;

	/// [`Transport`] backed by a shared [`reqwest::Client`].
	#[derive(Clone, Debug)]
	pub struct ReqwestTransport(pub ReqwestClient);
	impl ReqwestTransport {
		/// Wraps an existing client.
		pub fn with_client(client: ReqwestClient) -> Self {
			Self(client)
		}

		async fn perform(
			&self,
			request: ApiRequest,
		) -> Result<ApiResponse, TransportError> {
			let mut builder = match request.method {
				Method::Get => self.0.get(request.url),
				Method::Post => self.0.post(request.url).form(&request.form),
			};

			builder = builder
				.header(reqwest::header::USER_AGENT, &request.user_agent)
				.header(reqwest::header::AUTHORIZATION, request.authorization.header_value());

			let response = builder.send().await?;
			let status = response.status().as_u16();
			let hints = hints_of(response.headers());
			let retry_after = response
				.headers()
				.get(reqwest::header::RETRY_AFTER)
				.and_then(|v| v.to_str().ok())
				.and_then(parse_retry_after);
			let body = response.bytes().await?.to_vec();

			Ok(ApiResponse { status, body, hints, retry_after })
		}
	}
	impl Transport for ReqwestTransport {
		fn execute(&self, request: ApiRequest) -> TransportFuture<'_> {
			Box::pin(self.perform(request))
		}
	}
	impl AsRef<ReqwestClient> for ReqwestTransport {
		fn as_ref(&self) -> &ReqwestClient {
			&self.0
		}
	}

	fn hints_of(headers: &reqwest::header::HeaderMap) -> RateLimitHints {
		fn parse<T>(headers: &reqwest::header::HeaderMap, name: &str) -> Option<T>
		where
			T: std::str::FromStr,
		{
			headers.get(name)?.to_str().ok()?.trim().parse().ok()
		}

		RateLimitHints {
			remaining: parse(headers, "x-ratelimit-remaining"),
			used: parse(headers, "x-ratelimit-used"),
			reset_in: parse::<u64>(headers, "x-ratelimit-reset").map(StdDuration::from_secs),
		}
	}
}
