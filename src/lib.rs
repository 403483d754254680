//! Resilient Reddit API client—OAuth token lifecycle, human-paced rate limiting, circuit
//! breaking, and single-flight response caching behind one shared client.

#![deny(clippy::all, missing_docs, unused_crate_dependencies)]

pub mod auth;
pub mod breaker;
pub mod cache;
pub mod client;
pub mod config;
pub mod error;
pub mod http;
pub mod limit;
pub mod model;
pub mod obs;

mod _prelude {
	pub use std::{
		collections::{HashMap, VecDeque},
		fmt::{Debug, Display, Formatter, Result as FmtResult},
		future::Future,
		pin::Pin,
		sync::Arc,
		time::Duration as StdDuration,
	};

	pub use async_lock::Mutex as AsyncMutex;
	pub use parking_lot::Mutex;
	#[cfg(feature = "reqwest")]
	pub use reqwest::{Client as ReqwestClient, Error as ReqwestError};
	pub use serde::{Deserialize, Serialize};
	pub use thiserror::Error as ThisError;
	pub use time::{Duration, OffsetDateTime};
	pub use tokio::time::Instant;
	pub use url::Url;

	pub use crate::error::{Error, Result};
}

#[cfg(feature = "reqwest")] pub use reqwest;
pub use url;
#[cfg(test)] use {color_eyre as _, httpmock as _};
