//! Token endpoint wire layer: form requests, response parsing, and error mapping.
//!
//! [`TokenEndpointClient`] posts one `application/x-www-form-urlencoded` request through a
//! [`TokenHttpClient`], enforces the per-call timeout, and turns the reply into either a
//! typed payload or a classified [`Error`]. Authority error bodies go through the
//! configured [`AuthorityStrategy`]; transport failures go through a
//! [`TransportErrorMapper`].

pub mod grant;
pub mod response;

pub use grant::*;
pub use response::*;

pub use oauth2;

// crates.io
use oauth2::{
	AsyncHttpClient, HttpClientError, HttpRequest,
	http::{
		Method, Request,
		header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE},
	},
};
use serde::de::DeserializeOwned;
use url::form_urlencoded;
// self
use crate::{
	_prelude::*,
	auth::Secret,
	authority::{AuthorityErrorContext, AuthorityErrorKind, AuthorityStrategy},
	error::{AuthenticationError, ConfigError, TransientError, TransportError},
	http::{ResponseMetadata, ResponseMetadataSlot, TokenHttpClient},
};

/// Request header carrying the broker's correlation id.
pub const CLIENT_REQUEST_ID: &str = "client-request-id";
/// Request header asking the authority to echo the correlation id.
pub const RETURN_CLIENT_REQUEST_ID: &str = "return-client-request-id";

/// Maps HTTP transport failures into broker [`Error`] values.
pub trait TransportErrorMapper<E>
where
	Self: 'static + Send + Sync,
	E: 'static + Send + Sync + StdError,
{
	/// Converts an [`HttpClientError`] emitted by the transport into a broker error.
	fn map_transport_error(
		&self,
		strategy: &dyn AuthorityStrategy,
		grant: GrantType,
		metadata: Option<&ResponseMetadata>,
		error: HttpClientError<E>,
	) -> Error;
}

/// Default mapper for reqwest-backed transports.
#[cfg(feature = "reqwest")]
#[derive(Clone, Debug, Default)]
pub struct ReqwestTransportErrorMapper;
#[cfg(feature = "reqwest")]
impl TransportErrorMapper<ReqwestError> for ReqwestTransportErrorMapper {
	fn map_transport_error(
		&self,
		_strategy: &dyn AuthorityStrategy,
		_grant: GrantType,
		meta: Option<&ResponseMetadata>,
		err: HttpClientError<ReqwestError>,
	) -> Error {
		match err {
			HttpClientError::Reqwest(inner) if inner.is_builder() =>
				ConfigError::from(*inner).into(),
			HttpClientError::Reqwest(inner) => TransportError::from(*inner).into(),
			HttpClientError::Http(inner) => ConfigError::from(inner).into(),
			HttpClientError::Io(inner) => TransportError::from(inner).into(),
			HttpClientError::Other(message) => map_generic_transport_error(meta, message),
			_ => map_generic_transport_error(meta, "unknown HTTP client failure"),
		}
	}
}

/// Form-encoded token or device authorization request.
#[derive(Clone)]
pub(crate) struct FormRequest {
	pub(crate) endpoint: Url,
	pub(crate) form: BTreeMap<String, String>,
	pub(crate) authorization: Option<Secret>,
}
impl FormRequest {
	pub(crate) fn new(endpoint: Url) -> Self {
		Self { endpoint, form: BTreeMap::new(), authorization: None }
	}

	pub(crate) fn param(mut self, key: &str, value: impl Into<String>) -> Self {
		self.form.insert(key.to_owned(), value.into());

		self
	}

	fn encode(&self) -> String {
		form_urlencoded::Serializer::new(String::new()).extend_pairs(self.form.iter()).finish()
	}

	fn into_http(self, correlation_id: &str) -> Result<HttpRequest> {
		let body = self.encode().into_bytes();
		let mut builder = Request::builder()
			.method(Method::POST)
			.uri(self.endpoint.as_str())
			.header(CONTENT_TYPE, "application/x-www-form-urlencoded")
			.header(ACCEPT, "application/json")
			.header(CLIENT_REQUEST_ID, correlation_id)
			.header(RETURN_CLIENT_REQUEST_ID, "true");

		if let Some(authorization) = &self.authorization {
			builder = builder.header(AUTHORIZATION, authorization.expose());
		}

		Ok(builder.body(body).map_err(ConfigError::from)?)
	}
}
impl Debug for FormRequest {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("FormRequest")
			.field("endpoint", &self.endpoint.as_str())
			.field("fields", &self.form.keys().collect::<Vec<_>>())
			.field("authorization", &self.authorization.is_some())
			.finish()
	}
}

/// Sends form requests to authority endpoints and classifies the replies.
pub(crate) struct TokenEndpointClient<C, M>
where
	C: ?Sized + TokenHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	pub(crate) http_client: Arc<C>,
	pub(crate) mapper: Arc<M>,
	pub(crate) strategy: Arc<dyn AuthorityStrategy>,
	pub(crate) timeout: std::time::Duration,
}
impl<C, M> TokenEndpointClient<C, M>
where
	C: ?Sized + TokenHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	/// Sends one request and decodes a successful reply as `T`.
	///
	/// No retries happen here; the caller owns the retry policy.
	pub(crate) async fn send<T>(
		&self,
		grant: GrantType,
		mut request: FormRequest,
		correlation_id: &str,
	) -> Result<T>
	where
		T: DeserializeOwned,
	{
		self.strategy.augment_token_request(grant, &mut request.form);

		let http_request = request.into_http(correlation_id)?;
		let slot = ResponseMetadataSlot::default();
		let handle = self.http_client.with_metadata(slot.clone());
		let response = match tokio::time::timeout(self.timeout, handle.call(http_request)).await {
			Ok(Ok(response)) => response,
			Ok(Err(err)) =>
				return Err(self.mapper.map_transport_error(
					self.strategy.as_ref(),
					grant,
					slot.take().as_ref(),
					err,
				)),
			Err(_) =>
				return Err(
					TransportError::Timeout { timeout: self.timeout, correlation_id: None }.into()
				),
		};
		let meta = slot.take();
		let status = response.status().as_u16();
		let body = response.body();

		if !response.status().is_success() {
			let retry_after = meta.and_then(|meta| meta.retry_after);

			return Err(map_error_response(
				self.strategy.as_ref(),
				grant,
				status,
				retry_after,
				body,
			));
		}

		let mut deserializer = serde_json::Deserializer::from_slice(body);

		serde_path_to_error::deserialize(&mut deserializer).map_err(|e| {
			TransientError::TokenResponseParse {
				source: Arc::new(e),
				status: Some(status),
				correlation_id: None,
			}
			.into()
		})
	}
}
impl<C, M> Clone for TokenEndpointClient<C, M>
where
	C: ?Sized + TokenHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	fn clone(&self) -> Self {
		Self {
			http_client: self.http_client.clone(),
			mapper: self.mapper.clone(),
			strategy: self.strategy.clone(),
			timeout: self.timeout,
		}
	}
}

fn map_error_response(
	strategy: &dyn AuthorityStrategy,
	grant: GrantType,
	status: u16,
	retry_after: Option<Duration>,
	body: &[u8],
) -> Error {
	let ctx = AuthorityErrorContext::new(grant).with_http_status(status);
	let parsed = serde_json::from_slice::<OAuthErrorResponse>(body)
		.ok()
		.filter(|response| !response.error.is_empty());
	let Some(response) = parsed else {
		let ctx = ctx.with_body_preview(String::from_utf8_lossy(body));

		return match strategy.classify_error(&ctx) {
			AuthorityErrorKind::Transient => TransientError::TokenEndpoint {
				message: format!("HTTP {status}"),
				status: Some(status),
				retry_after,
				correlation_id: None,
			}
			.into(),
			_ => Error::Authentication(AuthenticationError {
				code: "unexpected_response".into(),
				description: ctx.body_preview,
				http_status: Some(status),
				..Default::default()
			}),
		};
	};
	let mut ctx = ctx
		.with_oauth_error(response.error.clone())
		.with_error_codes(response.error_codes.iter().copied());

	if let Some(description) = &response.error_description {
		ctx = ctx.with_error_description(description.clone());
	}
	if let Some(suberror) = &response.suberror {
		ctx = ctx.with_suberror(suberror.clone());
	}

	let details = AuthenticationError {
		code: response.error,
		description: response.error_description,
		error_codes: response.error_codes,
		suberror: response.suberror,
		correlation_id: response.correlation_id,
		http_status: Some(status),
	};

	match strategy.classify_error(&ctx) {
		AuthorityErrorKind::InvalidGrant => Error::InvalidGrant(details),
		AuthorityErrorKind::InteractionRequired => Error::InteractionRequired(details),
		AuthorityErrorKind::AccessDenied => Error::AccessDenied(details),
		AuthorityErrorKind::Transient => TransientError::TokenEndpoint {
			message: details.to_string(),
			status: Some(status),
			retry_after,
			correlation_id: details.correlation_id,
		}
		.into(),
		AuthorityErrorKind::Other => Error::Authentication(details),
	}
}

#[cfg_attr(not(feature = "reqwest"), allow(dead_code))]
fn map_generic_transport_error(meta: Option<&ResponseMetadata>, message: impl Display) -> Error {
	TransientError::TokenEndpoint {
		message: format!("HTTP client error occurred while calling the token endpoint: {message}"),
		status: meta.and_then(|value| value.status),
		retry_after: meta.and_then(|value| value.retry_after),
		correlation_id: None,
	}
	.into()
}
