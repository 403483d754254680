//! TTL response cache with single-flight fetch coalescing.
//!
//! A miss takes a per-key flight guard before fetching, so concurrent
//! requests for the same key resolve with one upstream call. Only successful
//! fetches are stored; a failed fetch leaves the key empty and the next
//! waiter retries.

// self
use crate::{_prelude::*, error::ConfigError, http::Method};

/// TTL and capacity policy for a [`ResponseCache`].
#[derive(Clone, Debug)]
pub struct CachePolicy {
	/// Default freshness window for stored entries.
	pub ttl: StdDuration,
	/// Maximum number of live entries before the oldest is evicted.
	pub capacity: usize,
}
impl CachePolicy {
	/// Validates the policy invariants.
	pub fn validate(&self) -> Result<(), ConfigError> {
		if self.capacity == 0 {
			return Err(ConfigError::ZeroCacheCapacity);
		}

		Ok(())
	}
}
impl Default for CachePolicy {
	fn default() -> Self {
		Self { ttl: StdDuration::from_secs(60), capacity: 128 }
	}
}

/// Cache key derived from the request method and canonicalized URL.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct CacheKey {
	fingerprint: String,
}
impl CacheKey {
	/// Fingerprints a request; query pairs are sorted so parameter order
	/// never splits the key space.
	pub fn from_parts(method: Method, url: &Url) -> Self {
		// crates.io
		use base64::prelude::*;
		use sha2::{Digest, Sha256};

		let mut pairs =
			url.query_pairs().map(|(k, v)| format!("{k}={v}")).collect::<Vec<_>>();

		pairs.sort_unstable();

		let mut hasher = Sha256::new();

		hasher.update(method.as_str());
		hasher.update(b" ");
		hasher.update(url.path());
		hasher.update(b"?");
		hasher.update(pairs.join("&"));

		Self { fingerprint: BASE64_STANDARD_NO_PAD.encode(hasher.finalize()) }
	}
}
impl Display for CacheKey {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		write!(f, "{}", self.fingerprint)
	}
}

struct CacheEntry<V> {
	value: V,
	stored_at: Instant,
	ttl: StdDuration,
}
impl<V> CacheEntry<V> {
	fn is_fresh(&self) -> bool {
		self.stored_at.elapsed() < self.ttl
	}
}

/// Parsed-response cache; values are cloned out on hits.
pub struct ResponseCache<V> {
	policy: CachePolicy,
	entries: Mutex<HashMap<CacheKey, CacheEntry<V>>>,
	flights: Mutex<HashMap<CacheKey, Arc<AsyncMutex<()>>>>,
}
impl<V> ResponseCache<V>
where
	V: Clone,
{
	/// Creates an empty cache for the provided policy.
	pub fn new(policy: CachePolicy) -> Self {
		Self { policy, entries: Mutex::new(HashMap::new()), flights: Mutex::new(HashMap::new()) }
	}

	/// Returns the cached value or runs `fetch` once across concurrent
	/// callers, storing the result under the policy TTL.
	pub async fn get_or_fetch<F, Fut>(&self, key: CacheKey, fetch: F) -> Result<V>
	where
		F: FnOnce() -> Fut,
		Fut: Future<Output = Result<V>>,
	{
		self.get_or_fetch_with_ttl(key, self.policy.ttl, fetch).await
	}

	/// [`Self::get_or_fetch`] with a per-call TTL override.
	pub async fn get_or_fetch_with_ttl<F, Fut>(
		&self,
		key: CacheKey,
		ttl: StdDuration,
		fetch: F,
	) -> Result<V>
	where
		F: FnOnce() -> Fut,
		Fut: Future<Output = Result<V>>,
	{
		if let Some(value) = self.lookup(&key) {
			return Ok(value);
		}

		let flight = self.flight(&key);
		let _guard = flight.lock().await;

		// Another flight may have landed while this one waited for the guard.
		if let Some(value) = self.lookup(&key) {
			self.forget_flight(&key, &flight);

			return Ok(value);
		}

		let fetched = fetch().await;

		if let Ok(value) = &fetched {
			self.store(key.clone(), value.clone(), ttl);
		}

		self.forget_flight(&key, &flight);

		fetched
	}

	/// Drops a single entry.
	pub fn purge(&self, key: &CacheKey) {
		self.entries.lock().remove(key);
	}

	/// Drops every entry.
	pub fn clear(&self) {
		self.entries.lock().clear();
	}

	/// Drops every expired entry.
	pub fn sweep(&self) {
		self.entries.lock().retain(|_, entry| entry.is_fresh());
	}

	/// Live (fresh) entry count.
	pub fn len(&self) -> usize {
		self.entries.lock().values().filter(|entry| entry.is_fresh()).count()
	}

	/// Whether no fresh entries are stored.
	pub fn is_empty(&self) -> bool {
		self.len() == 0
	}

	fn lookup(&self, key: &CacheKey) -> Option<V> {
		let entries = self.entries.lock();
		let entry = entries.get(key)?;

		entry.is_fresh().then(|| entry.value.clone())
	}

	fn store(&self, key: CacheKey, value: V, ttl: StdDuration) {
		let mut entries = self.entries.lock();

		entries.retain(|_, entry| entry.is_fresh());

		if entries.len() >= self.policy.capacity
			&& let Some(oldest) =
				entries.iter().min_by_key(|(_, entry)| entry.stored_at).map(|(k, _)| k.clone())
		{
			entries.remove(&oldest);
		}

		entries.insert(key, CacheEntry { value, stored_at: Instant::now(), ttl });
	}

	fn flight(&self, key: &CacheKey) -> Arc<AsyncMutex<()>> {
		self.flights.lock().entry(key.clone()).or_default().clone()
	}

	fn forget_flight(&self, key: &CacheKey, flight: &Arc<AsyncMutex<()>>) {
		let mut flights = self.flights.lock();

		if flights.get(key).map(|f| Arc::ptr_eq(f, flight)).unwrap_or_default() {
			flights.remove(key);
		}
	}
}
impl<V> Debug for ResponseCache<V> {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("ResponseCache")
			.field("policy", &self.policy)
			.field("entries", &self.entries.lock().len())
			.finish()
	}
}

#[cfg(test)]
mod tests {
	// std
	use std::sync::atomic::{AtomicUsize, Ordering};

	// self
	use super::*;

	fn key(query: &str) -> CacheKey {
		let url = Url::parse(&format!("https://oauth.reddit.com/r/rust/hot?{query}"))
			.expect("Test URL should parse.");

		CacheKey::from_parts(Method::Get, &url)
	}

	#[test]
	fn key_ignores_query_parameter_order() {
		assert_eq!(key("limit=25&raw_json=1"), key("raw_json=1&limit=25"));
		assert_ne!(key("limit=25"), key("limit=50"));
	}

	#[tokio::test(start_paused = true)]
	async fn expired_entries_are_refetched() {
		let cache = ResponseCache::new(CachePolicy {
			ttl: StdDuration::from_secs(60),
			..Default::default()
		});
		let fetches = AtomicUsize::new(0);
		let fetch = || async {
			fetches.fetch_add(1, Ordering::SeqCst);

			Ok(1_u8)
		};

		cache.get_or_fetch(key("a=1"), fetch).await.expect("Fetch should succeed.");
		cache.get_or_fetch(key("a=1"), fetch).await.expect("Hit should succeed.");

		assert_eq!(fetches.load(Ordering::SeqCst), 1);

		tokio::time::advance(StdDuration::from_secs(61)).await;
		cache.get_or_fetch(key("a=1"), fetch).await.expect("Refetch should succeed.");

		assert_eq!(fetches.load(Ordering::SeqCst), 2);
	}

	#[tokio::test]
	async fn concurrent_misses_fetch_once() {
		let cache = Arc::new(ResponseCache::new(CachePolicy::default()));
		let fetches = Arc::new(AtomicUsize::new(0));
		let fetch = |fetches: Arc<AtomicUsize>| async move {
			fetches.fetch_add(1, Ordering::SeqCst);
			tokio::time::sleep(StdDuration::from_millis(10)).await;

			Ok(7_u8)
		};
		let (a, b, c) = tokio::join!(
			cache.get_or_fetch(key("a=1"), || fetch(fetches.clone())),
			cache.get_or_fetch(key("a=1"), || fetch(fetches.clone())),
			cache.get_or_fetch(key("a=1"), || fetch(fetches.clone())),
		);

		assert_eq!(
			(
				a.expect("First caller should succeed."),
				b.expect("Second caller should succeed."),
				c.expect("Third caller should succeed.")
			),
			(7, 7, 7)
		);
		assert_eq!(fetches.load(Ordering::SeqCst), 1);
	}

	#[tokio::test]
	async fn failed_fetches_are_not_cached() {
		let cache = ResponseCache::<u8>::new(CachePolicy::default());
		let err = cache
			.get_or_fetch(key("a=1"), || async { Err(Error::Server { status: 502 }) })
			.await
			.expect_err("Failed fetch should surface.");

		assert!(matches!(err, Error::Server { status: 502 }));
		assert!(cache.is_empty());

		cache
			.get_or_fetch(key("a=1"), || async { Ok(9_u8) })
			.await
			.expect("Retry after failure should succeed.");

		assert_eq!(cache.len(), 1);
	}

	#[tokio::test(start_paused = true)]
	async fn capacity_evicts_the_oldest_entry() {
		let cache = ResponseCache::new(CachePolicy { capacity: 2, ..Default::default() });

		for (i, query) in ["a=1", "b=2", "c=3"].into_iter().enumerate() {
			cache
				.get_or_fetch(key(query), || async move { Ok(i as u8) })
				.await
				.expect("Fetch should succeed.");
			tokio::time::advance(StdDuration::from_millis(1)).await;
		}

		assert_eq!(cache.len(), 2);

		// The oldest key was evicted, so it fetches again.
		let fetches = AtomicUsize::new(0);

		cache
			.get_or_fetch(key("a=1"), || async {
				fetches.fetch_add(1, Ordering::SeqCst);

				Ok(0_u8)
			})
			.await
			.expect("Refetch should succeed.");

		assert_eq!(fetches.load(Ordering::SeqCst), 1);
	}
}
