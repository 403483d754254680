mod common;

// std
use std::{sync::Arc, time::Duration};
// self
use common::{
	Script, ScriptedTransport, app_only_config, json_response, test_config, token_response,
};
use reddit_courier::{
	client::RedditClient,
	error::{ConfigError, Error},
	http::Method,
};

const CREATED: &str = r#"{"json": {"errors": [], "data": {"things": [
	{"kind": "t1", "data": {"id": "xyz", "name": "t1_xyz", "permalink": "/r/rust/comments/abc123/a_post/xyz/"}}
]}}}"#;
const RATELIMITED: &str = r#"{"json": {"errors": [
	["RATELIMIT", "you are doing that too much. try again in 9 minutes.", "ratelimit"]
]}}"#;

fn client(
	script: impl IntoIterator<Item = Script>,
) -> (RedditClient<ScriptedTransport>, Arc<ScriptedTransport>) {
	let transport = Arc::new(ScriptedTransport::new(script));
	let client = RedditClient::with_transport(test_config(), transport.clone())
		.expect("Client should build successfully.");

	(client, transport)
}

#[tokio::test(start_paused = true)]
async fn submit_posts_the_form_and_returns_the_receipt() {
	let (client, transport) = client([
		Script::Respond(token_response()),
		Script::Respond(json_response(200, CREATED)),
	]);
	let receipt =
		client.submit_comment("abc123", "nice post").await.expect("Submit should succeed.");

	assert_eq!(receipt.name, "t1_xyz");
	assert_eq!(
		receipt.permalink.as_deref(),
		Some("https://reddit.com/r/rust/comments/abc123/a_post/xyz/")
	);

	let request = transport.seen().pop().expect("A submit request should have been sent.");

	assert_eq!(request.method, Method::Post);
	assert_eq!(request.url.path(), "/api/comment");
	assert!(request.form.contains(&("api_type".into(), "json".into())));
	assert!(request.form.contains(&("thing_id".into(), "t3_abc123".into())));
	assert!(request.form.contains(&("text".into(), "nice post".into())));
}

#[tokio::test(start_paused = true)]
async fn in_body_ratelimit_maps_to_the_advertised_wait() {
	let (client, _) = client([
		Script::Respond(token_response()),
		Script::Respond(json_response(200, RATELIMITED)),
	]);
	let err = client
		.submit_comment("abc123", "again")
		.await
		.expect_err("A RATELIMIT envelope should surface as rate limiting.");
	let Error::RateLimited { retry_after } = err else {
		panic!("A RATELIMIT envelope should map to Error::RateLimited.");
	};

	assert_eq!(retry_after, Some(Duration::from_secs(540)));
}

#[tokio::test(start_paused = true)]
async fn writes_get_exactly_one_network_attempt() {
	let (client, transport) = client([
		Script::Respond(token_response()),
		Script::Respond(json_response(503, "unavailable")),
	]);
	let err = client
		.submit_comment("abc123", "once")
		.await
		.expect_err("A failed write should surface without retrying.");

	assert!(matches!(err, Error::Server { status: 503 }));
	assert_eq!(transport.calls(), 2, "The write must not be re-sent.");
}

#[tokio::test(start_paused = true)]
async fn non_ratelimit_rejections_carry_code_and_message() {
	const REJECTED: &str = r#"{"json": {"errors": [
		["TOO_LONG", "this is too long (max: 10000)", "text"]
	]}}"#;

	let (client, _) = client([
		Script::Respond(token_response()),
		Script::Respond(json_response(200, REJECTED)),
	]);
	let err = client
		.submit_comment("abc123", "a very long comment")
		.await
		.expect_err("A rejected submission should surface.");
	let Error::Rejected { reason, .. } = err else {
		panic!("A rejection envelope should map to Error::Rejected.");
	};

	assert!(reason.contains("TOO_LONG"));
}

#[tokio::test(start_paused = true)]
async fn writes_require_account_credentials() {
	let transport = Arc::new(ScriptedTransport::new(Vec::new()));
	let client: RedditClient<ScriptedTransport> =
		RedditClient::with_transport(app_only_config(), transport.clone())
		.expect("Client should build successfully.");
	let err = client
		.submit_comment("abc123", "hi")
		.await
		.expect_err("Application-only credentials must not submit.");

	assert!(matches!(err, Error::Config(ConfigError::WriteRequiresAccount)));
	assert_eq!(transport.calls(), 0, "No network call should be attempted.");
}
