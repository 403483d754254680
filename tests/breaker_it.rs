mod common;

// std
use std::{sync::Arc, time::Duration};
// self
use common::{LISTING_BODY, Script, ScriptedTransport, json_response, test_config, token_response};
use reddit_courier::{
	breaker::BreakerState,
	client::{ListingSort, RedditClient},
	config::ClientConfig,
	error::Error,
};

fn config(read_attempts: u32) -> ClientConfig {
	let mut config = test_config();

	config.read_attempts = read_attempts;
	config.breaker.threshold = 3;
	config.breaker.cooldown = Duration::from_secs(2);
	config.cache.ttl = Duration::ZERO;

	config
}

fn client(
	config: ClientConfig,
	script: impl IntoIterator<Item = Script>,
) -> (RedditClient<ScriptedTransport>, Arc<ScriptedTransport>) {
	let transport = Arc::new(ScriptedTransport::new(script));
	let client = RedditClient::with_transport(config, transport.clone())
		.expect("Client should build successfully.");

	(client, transport)
}

#[tokio::test(start_paused = true)]
async fn sustained_server_errors_open_the_circuit() {
	let (client, transport) = client(config(3), [
		Script::Respond(token_response()),
		Script::Respond(json_response(500, "boom")),
		Script::Respond(json_response(500, "boom")),
		Script::Respond(json_response(500, "boom")),
	]);
	let err = client
		.fetch_listing("rust", ListingSort::Hot, 25)
		.await
		.expect_err("Three straight server errors should exhaust the attempts.");

	assert!(matches!(err, Error::Server { status: 500 }));
	assert_eq!(client.breaker_state(), BreakerState::Open);

	// The next call fails fast without reaching the transport.
	let err = client
		.fetch_listing("rust", ListingSort::New, 25)
		.await
		.expect_err("An open circuit should fail fast.");

	assert!(matches!(err, Error::CircuitOpen { .. }));
	assert_eq!(transport.calls(), 4);
}

#[tokio::test(start_paused = true)]
async fn a_successful_trial_closes_the_circuit() {
	let (client, _) = client(config(3), [
		Script::Respond(token_response()),
		Script::Respond(json_response(500, "boom")),
		Script::Respond(json_response(500, "boom")),
		Script::Respond(json_response(500, "boom")),
		Script::Respond(json_response(200, LISTING_BODY)),
	]);

	client
		.fetch_listing("rust", ListingSort::Hot, 25)
		.await
		.expect_err("The opening burst should fail.");
	tokio::time::advance(Duration::from_millis(2_100)).await;

	let posts = client
		.fetch_listing("rust", ListingSort::Hot, 25)
		.await
		.expect("The half-open trial should succeed.");

	assert_eq!(posts.len(), 1);
	assert_eq!(client.breaker_state(), BreakerState::Closed);
}

#[tokio::test(start_paused = true)]
async fn a_failed_trial_reopens_the_circuit() {
	let (client, _) = client(config(1), [
		Script::Respond(token_response()),
		Script::Respond(json_response(500, "boom")),
		Script::Respond(json_response(500, "boom")),
		Script::Respond(json_response(500, "boom")),
		Script::Respond(json_response(502, "still down")),
	]);

	for _ in 0..3 {
		client
			.fetch_listing("rust", ListingSort::Hot, 25)
			.await
			.expect_err("Each attempt should fail while the upstream is down.");
	}

	assert_eq!(client.breaker_state(), BreakerState::Open);
	tokio::time::advance(Duration::from_millis(2_100)).await;
	client
		.fetch_listing("rust", ListingSort::Hot, 25)
		.await
		.expect_err("The trial should fail against a still-broken upstream.");

	assert_eq!(client.breaker_state(), BreakerState::Open);

	// The doubled cooldown holds where the base one would have expired.
	tokio::time::advance(Duration::from_millis(2_100)).await;

	assert!(matches!(
		client
			.fetch_listing("rust", ListingSort::Hot, 25)
			.await
			.expect_err("The doubled cooldown should still fail fast."),
		Error::CircuitOpen { .. }
	));
}

#[tokio::test(start_paused = true)]
async fn local_rate_limit_waits_do_not_trip_the_breaker() {
	let mut config = config(1);

	config.budget.capacity = 2;
	config.budget.period = Duration::from_secs(1);

	let (client, _) = client(config, [
		Script::Respond(token_response()),
		Script::Respond(json_response(200, LISTING_BODY)),
		Script::Respond(json_response(200, LISTING_BODY)),
		Script::Respond(json_response(200, LISTING_BODY)),
	]);

	// Three reads against a two-per-second budget: the third waits for the
	// window instead of failing, and the breaker never budges.
	for sort in [ListingSort::Hot, ListingSort::New, ListingSort::Rising] {
		client.fetch_listing("rust", sort, 25).await.expect("Each paced read should succeed.");
	}

	assert_eq!(client.breaker_state(), BreakerState::Closed);
}
