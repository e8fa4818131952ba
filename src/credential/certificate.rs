//! Certificate credentials that sign RFC 7523 client assertions.

// crates.io
use base64::{
	Engine as _,
	engine::general_purpose::{STANDARD, URL_SAFE_NO_PAD},
};
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use sha2::{Digest, Sha256};
// self
use crate::{_prelude::*, auth::ClientId, credential::CredentialError};

const ASSERTION_LIFETIME: Duration = Duration::minutes(10);

/// Client certificate plus private key, loaded from a PEM bundle.
#[derive(Clone)]
pub struct ClientCertificate {
	key: EncodingKey,
	algorithm: Algorithm,
	thumbprint_s256: String,
	chain: Vec<String>,
	send_certificate_chain: bool,
}
impl ClientCertificate {
	/// Parses a PEM bundle holding the leaf certificate, optional chain, and private key.
	///
	/// RSA keys (PKCS#1 or PKCS#8) sign with RS256, PKCS#8 EC keys with ES256.
	pub fn from_pem(pem: impl AsRef<[u8]>) -> Result<Self, CredentialError> {
		let entries = pem::parse_many(pem.as_ref())
			.map_err(|e| CredentialError::Pem { message: e.to_string() })?;
		let chain = entries
			.iter()
			.filter(|entry| entry.tag() == "CERTIFICATE")
			.map(|entry| entry.contents())
			.collect::<Vec<_>>();
		let leaf = chain.first().ok_or(CredentialError::MissingCertificate)?;
		let key_entry = entries
			.iter()
			.find(|entry| entry.tag().ends_with("PRIVATE KEY"))
			.ok_or(CredentialError::MissingPrivateKey)?;
		let (key, algorithm) = decode_key(&pem::encode(key_entry))?;
		let thumbprint_s256 = URL_SAFE_NO_PAD.encode(Sha256::digest(leaf));
		let chain = chain.iter().map(|der| STANDARD.encode(der)).collect();

		Ok(Self { key, algorithm, thumbprint_s256, chain, send_certificate_chain: false })
	}

	/// Includes the certificate chain as the `x5c` header (subject-name/issuer auth).
	pub fn with_certificate_chain(mut self, send: bool) -> Self {
		self.send_certificate_chain = send;

		self
	}

	/// Base64url SHA-256 thumbprint of the leaf certificate (`x5t#S256`).
	pub fn thumbprint_s256(&self) -> &str {
		&self.thumbprint_s256
	}

	/// Signing algorithm derived from the private key.
	pub fn algorithm(&self) -> Algorithm {
		self.algorithm
	}

	/// Signs a client assertion for `audience` (the token endpoint) valid for ten minutes.
	pub fn sign_assertion(
		&self,
		client_id: &ClientId,
		audience: &str,
		now: OffsetDateTime,
	) -> Result<String, CredentialError> {
		let mut header = Header::new(self.algorithm);

		header.x5t_s256 = Some(self.thumbprint_s256.clone());

		if self.send_certificate_chain {
			header.x5c = Some(self.chain.clone());
		}

		let issued = now.unix_timestamp();
		let claims = AssertionClaims {
			aud: audience,
			iss: client_id.as_str(),
			sub: client_id.as_str(),
			jti: Uuid::new_v4().to_string(),
			nbf: issued,
			iat: issued,
			exp: (now + ASSERTION_LIFETIME).unix_timestamp(),
		};

		jsonwebtoken::encode(&header, &claims, &self.key)
			.map_err(|e| CredentialError::Signing { source: Arc::new(e) })
	}
}
impl Debug for ClientCertificate {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("ClientCertificate")
			.field("algorithm", &self.algorithm)
			.field("thumbprint_s256", &self.thumbprint_s256)
			.field("chain_len", &self.chain.len())
			.field("send_certificate_chain", &self.send_certificate_chain)
			.finish_non_exhaustive()
	}
}

#[derive(Serialize)]
struct AssertionClaims<'a> {
	aud: &'a str,
	iss: &'a str,
	sub: &'a str,
	jti: String,
	nbf: i64,
	iat: i64,
	exp: i64,
}

fn decode_key(pem: &str) -> Result<(EncodingKey, Algorithm), CredentialError> {
	match EncodingKey::from_rsa_pem(pem.as_bytes()) {
		Ok(key) => Ok((key, Algorithm::RS256)),
		Err(rsa_err) => EncodingKey::from_ec_pem(pem.as_bytes())
			.map(|key| (key, Algorithm::ES256))
			.map_err(|_| CredentialError::UnsupportedKey { source: Arc::new(rsa_err) }),
	}
}
