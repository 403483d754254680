//! Parsed API payloads and the envelope decoding that produces them.
//!
//! Reddit wraps everything in `kind`/`data` things; decoding tolerates
//! fields it does not know, validates the ones callers rely on, and reports
//! malformed payloads with the JSON path that failed.

// crates.io
use serde::de::DeserializeOwned;
use serde_json::Value;
// self
use crate::{_prelude::*, error::ValidationError};

/// A submission (link or self post) from a listing.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Post {
	/// Fullname, e.g. `t3_abc123`.
	pub id: String,
	/// Subreddit the post lives in, without the `r/` prefix.
	pub subreddit: String,
	/// Title.
	pub title: String,
	/// Author username; `[deleted]` when the account is gone.
	pub author: String,
	/// Self-text body; empty for link posts.
	pub selftext: String,
	/// External URL for link posts.
	pub url: Option<String>,
	/// Absolute permalink.
	pub permalink: String,
	/// Net vote score.
	pub score: i64,
	/// Comment count at fetch time.
	pub num_comments: u64,
	/// Creation time.
	#[serde(with = "time::serde::rfc3339")]
	pub created_at: OffsetDateTime,
}

/// A comment from a thread.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Comment {
	/// Fullname, e.g. `t1_def456`.
	pub id: String,
	/// Author username; `[deleted]` when the account is gone.
	pub author: String,
	/// Markdown body.
	pub body: String,
	/// Net vote score.
	pub score: i64,
	/// Creation time.
	#[serde(with = "time::serde::rfc3339")]
	pub created_at: OffsetDateTime,
}

/// Identifiers of a successfully created comment.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SubmitReceipt {
	/// Bare id, e.g. `def456`.
	pub id: String,
	/// Fullname, e.g. `t1_def456`.
	pub name: String,
	/// Permalink when the API reports one.
	pub permalink: Option<String>,
}

/// Outcome of a submit envelope; in-body errors arrive with HTTP 200.
#[derive(Clone, Debug, PartialEq)]
pub enum SubmitOutcome {
	/// The comment was created.
	Created(SubmitReceipt),
	/// The API refused the submission.
	Rejected {
		/// Machine-readable error code, e.g. `RATELIMIT`.
		code: String,
		/// Human-readable explanation.
		message: String,
	},
}

#[derive(Deserialize)]
struct RawThing {
	kind: String,
	data: Value,
}
#[derive(Deserialize)]
struct RawListing {
	data: RawListingData,
}
#[derive(Deserialize)]
struct RawListingData {
	children: Vec<RawThing>,
}
#[derive(Deserialize)]
struct RawPost {
	name: Option<String>,
	id: Option<String>,
	#[serde(default)]
	subreddit: String,
	#[serde(default)]
	title: String,
	author: Option<String>,
	#[serde(default)]
	selftext: String,
	url: Option<String>,
	#[serde(default)]
	permalink: String,
	#[serde(default)]
	score: i64,
	#[serde(default)]
	num_comments: u64,
	created_utc: f64,
}
#[derive(Deserialize)]
struct RawComment {
	name: Option<String>,
	id: Option<String>,
	author: Option<String>,
	#[serde(default)]
	body: String,
	#[serde(default)]
	score: i64,
	created_utc: f64,
}
#[derive(Deserialize)]
struct RawEnvelope {
	json: RawEnvelopeJson,
}
#[derive(Deserialize)]
struct RawEnvelopeJson {
	#[serde(default)]
	errors: Vec<Vec<Value>>,
	data: Option<RawEnvelopeData>,
}
#[derive(Deserialize)]
struct RawEnvelopeData {
	#[serde(default)]
	things: Vec<RawThing>,
}
#[derive(Deserialize)]
struct RawCreated {
	id: String,
	name: String,
	permalink: Option<String>,
}

/// Deserializes a body, reporting the failing JSON path on error.
pub(crate) fn deserialize_json<T>(
	bytes: &[u8],
	endpoint: &'static str,
) -> Result<T, ValidationError>
where
	T: DeserializeOwned,
{
	let mut deserializer = serde_json::Deserializer::from_slice(bytes);

	serde_path_to_error::deserialize(&mut deserializer)
		.map_err(|source| ValidationError::Malformed { endpoint, source })
}

fn thing_data<T>(value: Value, endpoint: &'static str) -> Result<T, ValidationError>
where
	T: DeserializeOwned,
{
	serde_path_to_error::deserialize(value)
		.map_err(|source| ValidationError::Malformed { endpoint, source })
}

fn timestamp(created_utc: f64, endpoint: &'static str) -> Result<OffsetDateTime, ValidationError> {
	if !created_utc.is_finite() {
		return Err(ValidationError::Timestamp { endpoint });
	}

	OffsetDateTime::from_unix_timestamp(created_utc as _)
		.map_err(|_| ValidationError::Timestamp { endpoint })
}

fn fullname(
	name: Option<String>,
	id: Option<String>,
	prefix: &str,
	endpoint: &'static str,
) -> Result<String, ValidationError> {
	name.or_else(|| id.map(|id| format!("{prefix}{id}")))
		.ok_or(ValidationError::MissingField { endpoint, field: "name" })
}

fn author_or_deleted(author: Option<String>) -> String {
	author.filter(|author| !author.is_empty()).unwrap_or_else(|| "[deleted]".into())
}

fn absolutize(permalink: &str) -> String {
	if permalink.starts_with("http") {
		permalink.into()
	} else {
		format!("https://reddit.com{permalink}")
	}
}

/// Decodes a listing body into posts, skipping non-`t3` children.
pub(crate) fn parse_listing(bytes: &[u8], endpoint: &'static str) -> Result<Vec<Post>> {
	let listing = deserialize_json::<RawListing>(bytes, endpoint)?;
	let mut posts = Vec::with_capacity(listing.data.children.len());

	for thing in listing.data.children {
		if thing.kind != "t3" {
			continue;
		}

		let raw = thing_data::<RawPost>(thing.data, endpoint)?;

		posts.push(Post {
			id: fullname(raw.name, raw.id, "t3_", endpoint)?,
			subreddit: raw.subreddit,
			title: raw.title,
			author: author_or_deleted(raw.author),
			selftext: raw.selftext,
			url: raw.url.filter(|url| !url.is_empty()),
			permalink: absolutize(&raw.permalink),
			score: raw.score,
			num_comments: raw.num_comments,
			created_at: timestamp(raw.created_utc, endpoint)?,
		});
	}

	Ok(posts)
}

/// Decodes a comments body—listing pair of `[post, comments]`—into the
/// top-level comments, skipping `more` stubs.
pub(crate) fn parse_comment_tree(bytes: &[u8], endpoint: &'static str) -> Result<Vec<Comment>> {
	let listings = deserialize_json::<Vec<RawListing>>(bytes, endpoint)?;
	let comments_listing = listings
		.into_iter()
		.nth(1)
		.ok_or(ValidationError::MissingField { endpoint, field: "comments listing" })?;
	let mut comments = Vec::with_capacity(comments_listing.data.children.len());

	for thing in comments_listing.data.children {
		if thing.kind != "t1" {
			continue;
		}

		let raw = thing_data::<RawComment>(thing.data, endpoint)?;

		comments.push(Comment {
			id: fullname(raw.name, raw.id, "t1_", endpoint)?,
			author: author_or_deleted(raw.author),
			body: raw.body,
			score: raw.score,
			created_at: timestamp(raw.created_utc, endpoint)?,
		});
	}

	Ok(comments)
}

/// Decodes a submit envelope; in-body errors win over `things`.
pub(crate) fn parse_submit_envelope(
	bytes: &[u8],
	endpoint: &'static str,
) -> Result<SubmitOutcome> {
	let envelope = deserialize_json::<RawEnvelope>(bytes, endpoint)?;

	if let Some(error) = envelope.json.errors.first() {
		let part = |i: usize| {
			error.get(i).and_then(Value::as_str).unwrap_or_default().to_owned()
		};

		return Ok(SubmitOutcome::Rejected { code: part(0), message: part(1) });
	}

	let thing = envelope
		.json
		.data
		.and_then(|data| data.things.into_iter().next())
		.ok_or(ValidationError::MissingField { endpoint, field: "json.data.things" })?;
	let raw = thing_data::<RawCreated>(thing.data, endpoint)?;

	Ok(SubmitOutcome::Created(SubmitReceipt {
		id: raw.id,
		name: raw.name,
		permalink: raw.permalink.map(|permalink| absolutize(&permalink)),
	}))
}

/// Normalizes an article reference to a link fullname (`t3_` prefixed).
pub(crate) fn link_fullname(article: &str) -> String {
	if article.starts_with("t3_") || article.starts_with("t1_") {
		article.into()
	} else {
		format!("t3_{article}")
	}
}

/// Normalizes an article reference to a bare id for URL paths.
pub(crate) fn article_id(article: &str) -> &str {
	article.strip_prefix("t3_").unwrap_or(article)
}

/// Extracts the advertised wait from a `RATELIMIT` message, e.g.
/// "you are doing that too much. try again in 9 minutes.".
pub(crate) fn ratelimit_delay(message: &str) -> Option<StdDuration> {
	let mut words = message.split_whitespace().peekable();

	while let Some(word) = words.next() {
		let Ok(amount) = word.parse::<u64>() else {
			continue;
		};
		let Some(unit) = words.peek() else {
			continue;
		};

		if unit.starts_with("minute") {
			return Some(StdDuration::from_secs(amount * 60));
		}
		if unit.starts_with("second") {
			return Some(StdDuration::from_secs(amount));
		}
	}

	None
}
