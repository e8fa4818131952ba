//! Scripted in-process transport shared by the integration tests.

#![allow(dead_code)]

// std
use std::{
	collections::{HashMap, VecDeque},
	future::Future,
	io,
	pin::Pin,
	sync::{
		Arc,
		atomic::{AtomicUsize, Ordering},
	},
};
// crates.io
use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use parking_lot::Mutex;
// self
use oidc_broker::{
	authority::{AuthorityConfig, AuthorityStrategy},
	broker::TokenBroker,
	config::ClientConfig,
	error::{Error, TransportError},
	http::{ResponseMetadata, ResponseMetadataSlot, TokenHttpClient},
	oauth::{
		GrantType, TransportErrorMapper,
		oauth2::{AsyncHttpClient, HttpClientError, HttpRequest, HttpResponse, http::StatusCode},
	},
	url::{Url, form_urlencoded},
};

pub type ScriptedBroker = TokenBroker<ScriptedHttpClient, ScriptedMapper>;

pub const CLIENT_ID: &str = "11111111-2222-3333-4444-555555555555";
pub const AUTHORITY: &str = "https://login.microsoftonline.com/contoso";

/// One scripted reply.
#[derive(Clone, Debug)]
pub enum Reply {
	/// HTTP response with a JSON body.
	Json { status: u16, body: String },
	/// Connection-level failure.
	Network,
}
impl Reply {
	pub fn ok(body: impl Into<String>) -> Self {
		Self::Json { status: 200, body: body.into() }
	}

	pub fn error(status: u16, body: impl Into<String>) -> Self {
		Self::Json { status, body: body.into() }
	}
}

/// Request observed by the fake transport.
#[derive(Clone, Debug)]
pub struct Captured {
	pub url: String,
	pub form: HashMap<String, String>,
	pub headers: HashMap<String, String>,
}

/// Fake transport that answers from a queue and records every request.
#[derive(Clone, Debug, Default)]
pub struct ScriptedHttpClient {
	replies: Arc<Mutex<VecDeque<Reply>>>,
	captured: Arc<Mutex<Vec<Captured>>>,
	calls: Arc<AtomicUsize>,
}
impl ScriptedHttpClient {
	pub fn new(replies: impl IntoIterator<Item = Reply>) -> Self {
		let client = Self::default();

		client.replies.lock().extend(replies);

		client
	}

	pub fn push(&self, reply: Reply) {
		self.replies.lock().push_back(reply);
	}

	pub fn calls(&self) -> usize {
		self.calls.load(Ordering::SeqCst)
	}

	pub fn captured(&self) -> Vec<Captured> {
		self.captured.lock().clone()
	}

	pub fn last_form(&self) -> HashMap<String, String> {
		self.captured.lock().last().map(|captured| captured.form.clone()).unwrap_or_default()
	}
}
impl TokenHttpClient for ScriptedHttpClient {
	type Handle = ScriptedHandle;
	type TransportError = io::Error;

	fn with_metadata(&self, slot: ResponseMetadataSlot) -> Self::Handle {
		ScriptedHandle { client: self.clone(), slot }
	}
}

pub struct ScriptedHandle {
	client: ScriptedHttpClient,
	slot: ResponseMetadataSlot,
}
impl<'c> AsyncHttpClient<'c> for ScriptedHandle {
	type Error = HttpClientError<io::Error>;
	type Future =
		Pin<Box<dyn Future<Output = Result<HttpResponse, Self::Error>> + 'c + Send + Sync>>;

	fn call(&'c self, request: HttpRequest) -> Self::Future {
		Box::pin(async move {
			self.slot.take();
			self.client.calls.fetch_add(1, Ordering::SeqCst);

			let form = form_urlencoded::parse(request.body()).into_owned().collect();
			let headers = request
				.headers()
				.iter()
				.map(|(name, value)| {
					(name.as_str().to_owned(), value.to_str().unwrap_or_default().to_owned())
				})
				.collect();

			self.client.captured.lock().push(Captured {
				url: request.uri().to_string(),
				form,
				headers,
			});

			let reply = self.client.replies.lock().pop_front();
			let (status, body) = match reply {
				Some(Reply::Json { status, body }) => (status, body),
				Some(Reply::Network) | None =>
					return Err(HttpClientError::Io(io::Error::new(
						io::ErrorKind::ConnectionReset,
						"scripted connection reset",
					))),
			};

			self.slot.store(ResponseMetadata { status: Some(status), retry_after: None });

			let mut response = HttpResponse::new(body.into_bytes());

			*response.status_mut() =
				StatusCode::from_u16(status).expect("Scripted status should be valid.");

			Ok(response)
		})
	}
}

/// Maps scripted I/O failures onto [`TransportError`].
#[derive(Debug, Default)]
pub struct ScriptedMapper;
impl TransportErrorMapper<io::Error> for ScriptedMapper {
	fn map_transport_error(
		&self,
		_strategy: &dyn AuthorityStrategy,
		_grant: GrantType,
		_metadata: Option<&ResponseMetadata>,
		error: HttpClientError<io::Error>,
	) -> Error {
		match error {
			HttpClientError::Io(inner) => TransportError::from(inner).into(),
			other => TransportError::network(other).into(),
		}
	}
}

pub fn authority() -> AuthorityConfig {
	AuthorityConfig::uri(Url::parse(AUTHORITY).expect("Authority fixture should parse."))
}

pub fn config() -> ClientConfig {
	ClientConfig::new(CLIENT_ID.parse().expect("Client id fixture should be valid."))
		.with_authority(authority())
}

pub fn broker(config: ClientConfig, http: &ScriptedHttpClient) -> ScriptedBroker {
	TokenBroker::with_http_client(config, http.clone(), ScriptedMapper)
}

/// Unsigned id token carrying the claims the broker reads.
pub fn id_token(oid: &str, tid: &str, username: &str) -> String {
	let claims = format!(r#"{{"oid":"{oid}","tid":"{tid}","preferred_username":"{username}"}}"#);

	format!(
		"{}.{}.sig",
		URL_SAFE_NO_PAD.encode(r#"{"alg":"none","typ":"JWT"}"#),
		URL_SAFE_NO_PAD.encode(claims)
	)
}

pub fn token_body(access_token: &str, expires_in: u32) -> String {
	format!(r#"{{"access_token":"{access_token}","token_type":"Bearer","expires_in":{expires_in}}}"#)
}

pub fn user_token_body(access_token: &str, refresh_token: &str, id_token: &str) -> String {
	format!(
		r#"{{"access_token":"{access_token}","token_type":"Bearer","expires_in":3600,"refresh_token":"{refresh_token}","id_token":"{id_token}"}}"#
	)
}
