//! Fixtures shared by the integration suites: a scripted in-process transport and helpers
//! wiring adapters to `httpmock` servers.

#![allow(dead_code)]

// std
use std::{
	collections::{HashMap, VecDeque},
	sync::Arc,
};
// crates.io
use parking_lot::Mutex;
use provider_broker::{
	auth::{Credential, ProviderId},
	error::TransportError,
	http::{HttpTransport, RawResponse, ReqwestTransport, SignedRequest, TransportFuture},
	provider::{ProviderAdapter, ProviderDescriptor},
	reqwest::Client as ReqwestClient,
	store::{MemoryStore, TokenStore},
	token::TokenManager,
};
use time::Duration;
use tokio::time::Instant;

/// Path the scripted token endpoint listens on.
pub const TOKEN_PATH: &str = "/oauth/token";

/// How the scripted transport answers one send.
#[derive(Clone, Debug)]
pub enum Reply {
	/// Answers immediately.
	Respond(RawResponse),
	/// Answers after sleeping on the tokio clock.
	After(std::time::Duration, RawResponse),
	/// Fails with a transport timeout.
	Timeout,
	/// Never answers.
	Hang,
}

/// One request observed by [`ScriptedTransport`].
#[derive(Clone, Debug)]
pub struct Sent {
	/// Tokio instant the send started at.
	pub at: Instant,
	/// Request as signed by the client.
	pub request: SignedRequest,
}

/// Transport answering from per-path reply queues.
///
/// The last reply of a queue repeats forever, so a single token reply serves every refresh.
#[derive(Debug, Default)]
pub struct ScriptedTransport {
	routes: Mutex<HashMap<String, VecDeque<Reply>>>,
	sent: Mutex<Vec<Sent>>,
}
impl ScriptedTransport {
	pub fn on<I>(self, path: &str, replies: I) -> Self
	where
		I: IntoIterator<Item = Reply>,
	{
		self.routes.lock().insert(path.to_owned(), replies.into_iter().collect());

		self
	}

	pub fn sent_to(&self, path: &str) -> Vec<Sent> {
		self.sent.lock().iter().filter(|sent| sent.request.url.path() == path).cloned().collect()
	}

	pub fn calls(&self, path: &str) -> usize {
		self.sent_to(path).len()
	}

	fn next_reply(&self, path: &str) -> Reply {
		let mut routes = self.routes.lock();
		let Some(queue) = routes.get_mut(path) else {
			return Reply::Respond(RawResponse::new(404, format!("No route for {path}.")));
		};

		if queue.len() > 1 {
			queue.pop_front().expect("Queue with several replies should pop.")
		} else {
			queue.front().cloned().expect("Route should keep at least one reply.")
		}
	}
}
impl HttpTransport for ScriptedTransport {
	fn send(&self, request: SignedRequest, _: Duration) -> TransportFuture<'_> {
		let reply = self.next_reply(request.url.path());

		self.sent.lock().push(Sent { at: Instant::now(), request });

		Box::pin(async move {
			match reply {
				Reply::Respond(response) => Ok(response),
				Reply::After(delay, response) => {
					tokio::time::sleep(delay).await;

					Ok(response)
				},
				Reply::Timeout => Err(TransportError::Timeout),
				Reply::Hang => std::future::pending().await,
			}
		})
	}
}

pub fn provider(id: &str) -> ProviderId {
	ProviderId::new(id).expect("Provider fixture should be valid.")
}

pub fn url(value: &str) -> url::Url {
	url::Url::parse(value).expect("URL fixture should parse.")
}

/// Successful token endpoint response.
pub fn token_reply(value: &str, expires_in: i64) -> Reply {
	Reply::Respond(json(
		200,
		&format!(r#"{{"access_token":"{value}","token_type":"bearer","expires_in":{expires_in}}}"#),
	))
}

pub fn json(status: u16, body: &str) -> RawResponse {
	RawResponse::new(status, body).with_header("Content-Type", "application/json")
}

pub fn status(status: u16) -> Reply {
	Reply::Respond(RawResponse::new(status, ""))
}

/// Builds an adapter sending through `transport` with a fresh in-memory token cache.
pub fn scripted_adapter(
	descriptor: ProviderDescriptor,
	credential: Credential,
	transport: Arc<ScriptedTransport>,
) -> (ProviderAdapter, Arc<TokenManager>) {
	let transport: Arc<dyn HttpTransport> = transport;
	let tokens = Arc::new(TokenManager::in_memory(transport.clone()));
	let adapter = ProviderAdapter::with_transport(descriptor, credential, transport, tokens.clone())
		.expect("Scripted adapter should accept its descriptor and credential.");

	(adapter, tokens)
}

/// Builds a reqwest transport that accepts the self-signed certificates produced by
/// `httpmock`.
pub fn test_reqwest_transport() -> ReqwestTransport {
	let client = ReqwestClient::builder()
		.danger_accept_invalid_certs(true)
		.danger_accept_invalid_hostnames(true)
		.build()
		.expect("Failed to build insecure Reqwest client for tests.");

	ReqwestTransport::with_client(client)
}

/// Constructs a [`ProviderAdapter`] backed by an in-memory token cache and the reqwest
/// transport used across integration tests.
pub fn build_reqwest_test_adapter(
	descriptor: ProviderDescriptor,
	credential: Credential,
) -> (ProviderAdapter, Arc<TokenManager>, Arc<MemoryStore>) {
	let store_backend = Arc::new(MemoryStore::default());
	let store: Arc<dyn TokenStore> = store_backend.clone();
	let transport: Arc<dyn HttpTransport> = Arc::new(test_reqwest_transport());
	let tokens = Arc::new(TokenManager::new(transport.clone(), store));
	let adapter = ProviderAdapter::with_transport(descriptor, credential, transport, tokens.clone())
		.expect("Test adapter should accept its descriptor and credential.");

	(adapter, tokens, store_backend)
}
