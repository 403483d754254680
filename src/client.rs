//! The shared client that threads every call through the resilience stack.
//!
//! Call order is fixed: breaker admission, limiter grant, token check, then
//! the network exchange. Reads are cached and retried with exponential
//! backoff; writes get exactly one network attempt so an ambiguous failure
//! never double-posts.

// self
use crate::{
	_prelude::*,
	auth::{GrantMode, TokenManager},
	breaker::{BreakerPermit, BreakerState, CircuitBreaker},
	cache::{CacheKey, ResponseCache},
	config::ClientConfig,
	error::ConfigError,
	http::{ApiRequest, ApiResponse, Method, Transport},
	limit::RateLimiter,
	model::{self, Comment, Post, SubmitOutcome, SubmitReceipt},
	obs::{self, CallKind, CallOutcome, CallSpan},
};
#[cfg(feature = "reqwest")] use crate::http::ReqwestTransport;

const BACKOFF_BASE: StdDuration = StdDuration::from_millis(500);
const BACKOFF_CAP: StdDuration = StdDuration::from_secs(30);

/// Listing orderings the API understands.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ListingSort {
	/// Front-page style ranking.
	Hot,
	/// Newest first.
	New,
	/// Recently surging posts.
	Rising,
	/// Highest scored within a time window.
	Top(TimeFilter),
}
impl ListingSort {
	fn path(self) -> &'static str {
		match self {
			Self::Hot => "hot",
			Self::New => "new",
			Self::Rising => "rising",
			Self::Top(_) => "top",
		}
	}

	fn time_filter(self) -> Option<TimeFilter> {
		match self {
			Self::Top(filter) => Some(filter),
			_ => None,
		}
	}
}

/// Time window for [`ListingSort::Top`] and search.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TimeFilter {
	/// Past hour.
	Hour,
	/// Past day.
	Day,
	/// Past week.
	Week,
	/// Past month.
	Month,
	/// Past year.
	Year,
	/// All time.
	All,
}
impl TimeFilter {
	/// Wire value for the `t` query parameter.
	pub const fn as_str(self) -> &'static str {
		match self {
			Self::Hour => "hour",
			Self::Day => "day",
			Self::Week => "week",
			Self::Month => "month",
			Self::Year => "year",
			Self::All => "all",
		}
	}
}

/// Shared, concurrency-safe Reddit API client.
///
/// One instance per process; every operation flows through the same token
/// manager, rate limiter, circuit breaker, and response caches, so the
/// process as a whole honors the upstream budget no matter how many tasks
/// borrow the client.
pub struct RedditClient<T>
where
	T: ?Sized + Transport,
{
	transport: Arc<T>,
	tokens: TokenManager<T>,
	limiter: RateLimiter,
	breaker: CircuitBreaker,
	listings: ResponseCache<Vec<Post>>,
	comments: ResponseCache<Vec<Comment>>,
	api_base: Url,
	user_agent: String,
	call_timeout: StdDuration,
	read_attempts: u32,
}
#[cfg(feature = "reqwest")]
impl RedditClient<ReqwestTransport> {
	/// Creates a client backed by a fresh [`reqwest::Client`].
	///
	/// The per-call deadline is enforced around [`Transport::execute`] so an
	/// elapsed timer always classifies as [`Error::Timeout`]; the transport
	/// itself carries no timer of its own.
	pub fn new(config: ClientConfig) -> Result<Self> {
		let client = ReqwestClient::builder().build().map_err(ConfigError::from)?;

		Self::with_transport(config, ReqwestTransport::with_client(client))
	}
}
impl<T> RedditClient<T>
where
	T: ?Sized + Transport,
{
	/// Creates a client on an existing transport; validates the configuration.
	pub fn with_transport(config: ClientConfig, transport: impl Into<Arc<T>>) -> Result<Self> {
		config.validate()?;

		let transport = transport.into();

		Ok(Self {
			tokens: TokenManager::new(transport.clone(), &config),
			limiter: RateLimiter::new(config.budget.clone()),
			breaker: CircuitBreaker::new(config.breaker.clone()),
			listings: ResponseCache::new(config.cache.clone()),
			comments: ResponseCache::new(config.cache),
			api_base: config.api_base,
			user_agent: config.user_agent,
			call_timeout: config.call_timeout,
			read_attempts: config.read_attempts.max(1),
			transport,
		})
	}

	/// Fetches a subreddit listing, newest cache entry winning within the TTL.
	pub async fn fetch_listing(
		&self,
		subreddit: &str,
		sort: ListingSort,
		limit: u32,
	) -> Result<Vec<Post>> {
		let mut url = self.api_url(&format!("r/{subreddit}/{}", sort.path()))?;

		{
			let mut query = url.query_pairs_mut();

			query.append_pair("limit", &limit.to_string()).append_pair("raw_json", "1");

			if let Some(filter) = sort.time_filter() {
				query.append_pair("t", filter.as_str());
			}
		}

		self.cached_read(CallKind::FetchListing, &self.listings, url, "listing", model::parse_listing)
			.await
	}

	/// Searches within a subreddit, ordered by relevance over `window`.
	pub async fn search_posts(
		&self,
		subreddit: &str,
		query: &str,
		window: TimeFilter,
		limit: u32,
	) -> Result<Vec<Post>> {
		let mut url = self.api_url(&format!("r/{subreddit}/search"))?;

		url.query_pairs_mut()
			.append_pair("q", query)
			.append_pair("restrict_sr", "1")
			.append_pair("t", window.as_str())
			.append_pair("limit", &limit.to_string())
			.append_pair("raw_json", "1");

		self.cached_read(CallKind::SearchPosts, &self.listings, url, "search", model::parse_listing)
			.await
	}

	/// Fetches the top-level comments of a post; `article` may be a bare id
	/// or a `t3_` fullname.
	pub async fn fetch_comments(&self, article: &str, limit: u32) -> Result<Vec<Comment>> {
		let mut url = self.api_url(&format!("comments/{}", model::article_id(article)))?;

		url.query_pairs_mut()
			.append_pair("limit", &limit.to_string())
			.append_pair("raw_json", "1");

		self.cached_read(
			CallKind::FetchComments,
			&self.comments,
			url,
			"comments",
			model::parse_comment_tree,
		)
		.await
	}

	/// Submits a comment under a post or comment.
	///
	/// Exactly one network attempt; an ambiguous failure surfaces instead of
	/// risking a duplicate. In-body `RATELIMIT` rejections arrive with HTTP
	/// 200 and are mapped to [`Error::RateLimited`] with the advertised wait.
	pub async fn submit_comment(&self, parent: &str, text: &str) -> Result<SubmitReceipt> {
		const KIND: CallKind = CallKind::SubmitComment;

		if self.tokens.grant_mode() != GrantMode::Password {
			return Err(ConfigError::WriteRequiresAccount.into());
		}

		let span = CallSpan::new(KIND, "submit");

		obs::record_call_outcome(KIND, CallOutcome::Attempt);

		let result = span
			.instrument(async {
				let url = self.api_url("api/comment")?;
				let form = vec![
					("api_type".into(), "json".into()),
					("thing_id".into(), model::link_fullname(parent)),
					("text".into(), text.into()),
				];
				let (response, permit) = self.guarded_call(KIND, Method::Post, url, form).await?;

				match model::parse_submit_envelope(&response.body, "comment")? {
					SubmitOutcome::Created(receipt) => {
						permit.record_success();

						Ok(receipt)
					},
					SubmitOutcome::Rejected { code, message } if code == "RATELIMIT" => {
						let retry_after = model::ratelimit_delay(&message);

						permit.record_failure();

						Err(Error::RateLimited { retry_after })
					},
					SubmitOutcome::Rejected { code, message } => Err(Error::Rejected {
						status: response.status,
						reason: format!("{code}: {message}"),
					}),
				}
			})
			.await;

		match &result {
			Ok(_) => obs::record_call_outcome(KIND, CallOutcome::Success),
			Err(_) => obs::record_call_outcome(KIND, CallOutcome::Failure),
		}

		result
	}

	/// Drops the held token and cached responses; the next call re-exchanges.
	pub fn logout(&self) {
		self.tokens.invalidate();
		self.listings.clear();
		self.comments.clear();
	}

	/// Current breaker state, for health reporting.
	pub fn breaker_state(&self) -> BreakerState {
		self.breaker.state()
	}

	/// Locally tracked calls in the current rate window.
	pub async fn calls_in_window(&self) -> usize {
		self.limiter.in_window().await
	}

	/// The underlying transport.
	pub fn transport(&self) -> &Arc<T> {
		&self.transport
	}

	fn api_url(&self, path: &str) -> Result<Url> {
		Ok(self.api_base.join(path).map_err(|source| ConfigError::InvalidEndpoint { source })?)
	}

	async fn cached_read<V, P>(
		&self,
		kind: CallKind,
		cache: &ResponseCache<V>,
		url: Url,
		endpoint: &'static str,
		parse: P,
	) -> Result<V>
	where
		V: Clone,
		P: Fn(&[u8], &'static str) -> Result<V>,
	{
		let span = CallSpan::new(kind, "read");

		obs::record_call_outcome(kind, CallOutcome::Attempt);

		let result = span
			.instrument(async {
				let key = CacheKey::from_parts(Method::Get, &url);

				cache
					.get_or_fetch(key, || async {
						let (response, permit) =
							self.guarded_call(kind, Method::Get, url.clone(), Vec::new()).await?;

						// The server answered 2xx; a decode failure is ours,
						// not the upstream's.
						permit.record_success();

						parse(&response.body, endpoint)
					})
					.await
			})
			.await;

		match &result {
			Ok(_) => obs::record_call_outcome(kind, CallOutcome::Success),
			Err(_) => obs::record_call_outcome(kind, CallOutcome::Failure),
		}

		result
	}

	/// Runs one API call through breaker, limiter, token, and transport.
	///
	/// On a 2xx the caller receives the still-unresolved [`BreakerPermit`]
	/// so it can grade the response body (submit envelopes report failures
	/// inside a 200). Non-qualifying failures drop the permit unresolved.
	async fn guarded_call(
		&self,
		kind: CallKind,
		method: Method,
		url: Url,
		form: Vec<(String, String)>,
	) -> Result<(ApiResponse, BreakerPermit)> {
		let max_attempts = if kind.is_read() { self.read_attempts } else { 1 };
		let mut attempt = 0;

		loop {
			attempt += 1;

			let retriable = kind.is_read() && attempt < max_attempts;
			let permit = self.breaker.try_acquire()?;

			self.limiter.acquire().await;

			let token = match self.tokens.ensure_valid().await {
				Ok(token) => token,
				Err(err) => {
					if err.trips_breaker() {
						permit.record_failure();
					} else {
						drop(permit);
					}
					if retriable && err.is_retryable_read() {
						self.backoff(attempt, None).await;

						continue;
					}

					return Err(err);
				},
			};
			let request = match method {
				Method::Get =>
					ApiRequest::get(url.clone(), token.authorization(), self.user_agent.clone()),
				Method::Post => ApiRequest::post_form(
					url.clone(),
					token.authorization(),
					self.user_agent.clone(),
					form.clone(),
				),
			};
			let response =
				match tokio::time::timeout(self.call_timeout, self.transport.execute(request))
					.await
				{
					Ok(Ok(response)) => response,
					Ok(Err(err)) => {
						drop(permit);

						if retriable {
							self.backoff(attempt, None).await;

							continue;
						}

						return Err(err.into());
					},
					Err(_) => {
						drop(permit);

						if retriable {
							continue;
						}

						return Err(Error::Timeout { limit: self.call_timeout });
					},
				};

			self.limiter.note_hints(&response.hints).await;

			match response.status {
				_ if response.is_success() => return Ok((response, permit)),
				401 => {
					self.tokens.invalidate();
					drop(permit);

					return Err(Error::Auth { reason: "access token rejected (401)".into() });
				},
				429 => {
					permit.record_failure();

					if retriable {
						self.backoff(attempt, response.retry_after).await;

						continue;
					}

					return Err(Error::RateLimited { retry_after: response.retry_after });
				},
				status @ 500..=599 => {
					permit.record_failure();

					if retriable {
						self.backoff(attempt, None).await;

						continue;
					}

					return Err(Error::Server { status });
				},
				status => {
					drop(permit);

					return Err(Error::Rejected { status, reason: body_snippet(&response.body) });
				},
			}
		}
	}

	async fn backoff(&self, attempt: u32, hint: Option<StdDuration>) {
		let base = BACKOFF_BASE
			.saturating_mul(1_u32 << attempt.saturating_sub(1).min(16))
			.min(BACKOFF_CAP);

		tokio::time::sleep(hint.unwrap_or(base).min(BACKOFF_CAP)).await;
	}
}
impl<T> Debug for RedditClient<T>
where
	T: ?Sized + Transport,
{
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("RedditClient")
			.field("api_base", &self.api_base.as_str())
			.field("breaker", &self.breaker)
			.finish()
	}
}

fn body_snippet(body: &[u8]) -> String {
	const LIMIT: usize = 200;

	let text = String::from_utf8_lossy(body);
	let text = text.trim();

	match text.char_indices().nth(LIMIT) {
		Some((cut, _)) => format!("{}…", &text[..cut]),
		None => text.into(),
	}
}
