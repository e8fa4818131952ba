//! Client credential material and the authentication parameters it produces.
//!
//! [`CredentialMaterial`] is constructed once, validated eagerly, and then only read.
//! At exchange time [`CredentialMaterial::client_auth`] turns it into the form fields
//! (and optional `Authorization` header) that prove the client's identity.

pub mod certificate;

pub use certificate::ClientCertificate;

// crates.io
use base64::{Engine as _, engine::general_purpose::STANDARD};
use url::form_urlencoded;
// self
use crate::{
	_prelude::*,
	auth::{ClientId, Secret},
};

/// `client_assertion_type` value for JWT client assertions (RFC 7523).
pub const CLIENT_ASSERTION_TYPE: &str = "urn:ietf:params:oauth:client-assertion-type:jwt-bearer";

/// Failures raised while validating or using credential material.
#[derive(Clone, Debug, ThisError)]
pub enum CredentialError {
	/// A secret or assertion string was empty.
	#[error("The {kind} must not be empty.")]
	Empty {
		/// Credential kind (`client secret`, `client assertion`).
		kind: &'static str,
	},
	/// The PEM bundle contains no certificate.
	#[error("Certificate bundle contains no certificate.")]
	MissingCertificate,
	/// The PEM bundle contains no private key.
	#[error("Certificate bundle contains no private key.")]
	MissingPrivateKey,
	/// The PEM bundle could not be parsed.
	#[error("Certificate bundle is not valid PEM: {message}.")]
	Pem {
		/// Parser failure message.
		message: String,
	},
	/// The private key is neither an RSA nor an EC key.
	#[error("Certificate private key is unsupported.")]
	UnsupportedKey {
		/// Key decoding failure.
		#[source]
		source: Arc<jsonwebtoken::errors::Error>,
	},
	/// Signing the client assertion failed.
	#[error("Client assertion could not be signed.")]
	Signing {
		/// Signing failure.
		#[source]
		source: Arc<jsonwebtoken::errors::Error>,
	},
}

/// How shared secrets are presented to the token endpoint.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClientAuthMethod {
	/// `client_id` + `client_secret` form fields.
	#[default]
	ClientSecretPost,
	/// HTTP Basic `Authorization` header.
	ClientSecretBasic,
}

/// Client proof of identity. Never logged or serialized in cleartext.
#[derive(Clone)]
pub enum CredentialMaterial {
	/// Shared client secret.
	ClientSecret(Secret),
	/// Certificate with private key; signs a fresh client assertion per exchange.
	ClientCertificate(Arc<ClientCertificate>),
	/// Caller pre-signed client assertion (for example a federated workload token).
	Assertion(Secret),
}
impl CredentialMaterial {
	/// Validates and wraps a client secret.
	pub fn client_secret(secret: impl Into<String>) -> Result<Self, CredentialError> {
		let secret = Secret::new(secret);

		if secret.is_blank() {
			return Err(CredentialError::Empty { kind: "client secret" });
		}

		Ok(Self::ClientSecret(secret))
	}

	/// Loads certificate material from a PEM bundle (leaf certificate first).
	pub fn certificate_pem(pem: impl AsRef<[u8]>) -> Result<Self, CredentialError> {
		Ok(Self::ClientCertificate(Arc::new(ClientCertificate::from_pem(pem)?)))
	}

	/// Wraps already loaded certificate material.
	pub fn certificate(certificate: ClientCertificate) -> Self {
		Self::ClientCertificate(Arc::new(certificate))
	}

	/// Validates and wraps a pre-signed client assertion.
	pub fn assertion(assertion: impl Into<String>) -> Result<Self, CredentialError> {
		let assertion = Secret::new(assertion);

		if assertion.is_blank() {
			return Err(CredentialError::Empty { kind: "client assertion" });
		}

		Ok(Self::Assertion(assertion))
	}

	/// Stable label used in logs.
	pub fn kind(&self) -> &'static str {
		match self {
			Self::ClientSecret(_) => "client_secret",
			Self::ClientCertificate(_) => "client_certificate",
			Self::Assertion(_) => "client_assertion",
		}
	}

	/// Produces the authentication parameters for one exchange against `token_endpoint`.
	pub fn client_auth(
		&self,
		client_id: &ClientId,
		token_endpoint: &Url,
		method: ClientAuthMethod,
	) -> Result<ClientAuth, CredentialError> {
		match self {
			Self::ClientSecret(secret) => match method {
				ClientAuthMethod::ClientSecretPost => Ok(ClientAuth {
					form: vec![("client_secret", secret.clone())],
					authorization: None,
				}),
				ClientAuthMethod::ClientSecretBasic => Ok(ClientAuth {
					form: Vec::new(),
					authorization: Some(basic_authorization(client_id, secret)),
				}),
			},
			Self::ClientCertificate(certificate) => {
				let assertion = certificate.sign_assertion(
					client_id,
					token_endpoint.as_str(),
					OffsetDateTime::now_utc(),
				)?;

				Ok(ClientAuth::assertion(Secret::new(assertion)))
			},
			Self::Assertion(assertion) => Ok(ClientAuth::assertion(assertion.clone())),
		}
	}
}
impl Debug for CredentialMaterial {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		match self {
			Self::ClientSecret(_) => f.write_str("ClientSecret(<redacted>)"),
			Self::ClientCertificate(certificate) =>
				f.debug_tuple("ClientCertificate").field(certificate).finish(),
			Self::Assertion(_) => f.write_str("Assertion(<redacted>)"),
		}
	}
}

/// Client authentication parameters for a single token request.
#[derive(Clone, Debug, Default)]
pub struct ClientAuth {
	/// Form fields appended to the request body.
	pub form: Vec<(&'static str, Secret)>,
	/// `Authorization` header value, for `client_secret_basic`.
	pub authorization: Option<Secret>,
}
impl ClientAuth {
	fn assertion(assertion: Secret) -> Self {
		Self {
			form: vec![
				("client_assertion_type", Secret::new(CLIENT_ASSERTION_TYPE)),
				("client_assertion", assertion),
			],
			authorization: None,
		}
	}
}

// RFC 6749 §2.3.1 form-encodes both halves before joining them.
fn basic_authorization(client_id: &ClientId, secret: &Secret) -> Secret {
	let id = form_urlencoded::byte_serialize(client_id.as_bytes()).collect::<String>();
	let secret = form_urlencoded::byte_serialize(secret.expose().as_bytes()).collect::<String>();

	Secret::new(format!("Basic {}", STANDARD.encode(format!("{id}:{secret}"))))
}
