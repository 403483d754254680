//! Optional observability helpers for API calls.
//!
//! # Feature Flags
//!
//! - Enable `tracing` to emit structured spans named `reddit_courier.call` with the `call`
//!   (operation) and `stage` (call site) fields.
//! - Enable `metrics` to increment the `reddit_courier_call_total` counter for every
//!   attempt/success/failure, labeled by `call` + `outcome`.

mod metrics;
mod tracing;

pub use metrics::*;
pub use tracing::*;

// self
use crate::_prelude::*;

/// API operations observed by the client.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CallKind {
	/// Credential exchange against the token endpoint.
	TokenExchange,
	/// Subreddit listing read.
	FetchListing,
	/// Subreddit-scoped search read.
	SearchPosts,
	/// Comment thread read.
	FetchComments,
	/// Comment submission write.
	SubmitComment,
}
impl CallKind {
	/// Returns a stable label suitable for span or metric fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			CallKind::TokenExchange => "token_exchange",
			CallKind::FetchListing => "fetch_listing",
			CallKind::SearchPosts => "search_posts",
			CallKind::FetchComments => "fetch_comments",
			CallKind::SubmitComment => "submit_comment",
		}
	}

	/// Whether the operation is an idempotent read.
	pub const fn is_read(self) -> bool {
		!matches!(self, CallKind::SubmitComment)
	}
}
impl Display for CallKind {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// Outcome labels recorded for each attempt.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CallOutcome {
	/// Entry to a client operation.
	Attempt,
	/// Successful completion.
	Success,
	/// Failure propagated back to the caller.
	Failure,
}
impl CallOutcome {
	/// Returns a stable label suitable for span or metric fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			CallOutcome::Attempt => "attempt",
			CallOutcome::Success => "success",
			CallOutcome::Failure => "failure",
		}
	}
}
impl Display for CallOutcome {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}
