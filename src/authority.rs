//! Authority resolution: tenant and cloud configuration into concrete endpoints.
//!
//! `cloud` enumerates the login hosts, `strategy` defines [`AuthorityStrategy`], the
//! HTTP-client-agnostic hook flows use to classify token endpoint errors and decorate
//! outgoing requests.

pub mod cloud;
pub mod strategy;

pub use cloud::*;
pub use strategy::*;

// self
use crate::{
	_prelude::*,
	auth::{IdentifierError, TenantId},
};

/// Errors raised while resolving an authority.
#[derive(Clone, Debug, PartialEq, Eq, ThisError)]
pub enum AuthorityError {
	/// Nothing in the request or client configuration names an authority.
	#[error("No authority was supplied and the client has no default authority.")]
	NoDefault,
	/// An explicit authority URI was rejected.
	#[error("Authority URI {uri} is invalid: {reason}.")]
	InvalidUri {
		/// Offending URI.
		uri: String,
		/// Rejection reason.
		reason: &'static str,
	},
	/// The tenant segment is not a valid identifier.
	#[error("Authority tenant is invalid.")]
	InvalidTenant(#[from] IdentifierError),
	/// Endpoint URLs could not be derived.
	#[error("Authority endpoint could not be derived: {0}.")]
	Endpoint(#[from] url::ParseError),
}

/// Authority inputs; every field is optional and resolution falls back field by field.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthorityConfig {
	/// Cloud instance hosting the tenant.
	pub cloud_instance: Option<CloudInstance>,
	/// Tenant id, domain, or default audience (`common`, `organizations`, `consumers`).
	pub tenant: Option<TenantId>,
	/// Explicit authority URI (`https://host/tenant`); wins over every other input.
	pub authority_uri: Option<Url>,
}
impl AuthorityConfig {
	/// Config naming an explicit authority URI.
	pub fn uri(authority_uri: Url) -> Self {
		Self { authority_uri: Some(authority_uri), ..Default::default() }
	}

	/// Config naming a cloud instance and tenant.
	pub fn tenant_in(cloud_instance: CloudInstance, tenant: TenantId) -> Self {
		Self { cloud_instance: Some(cloud_instance), tenant: Some(tenant), authority_uri: None }
	}

	/// Sets the tenant.
	pub fn with_tenant(mut self, tenant: TenantId) -> Self {
		self.tenant = Some(tenant);

		self
	}

	/// Sets the cloud instance.
	pub fn with_cloud_instance(mut self, cloud_instance: CloudInstance) -> Self {
		self.cloud_instance = Some(cloud_instance);

		self
	}

	/// Returns `true` when no field is set.
	pub fn is_empty(&self) -> bool {
		self.cloud_instance.is_none() && self.tenant.is_none() && self.authority_uri.is_none()
	}

	fn cloud_hint(&self) -> Option<CloudInstance> {
		self.cloud_instance
			.clone()
			.or_else(|| self.authority_uri.as_ref().map(CloudInstance::from_url))
	}
}

/// Resolved endpoint set for one tenant on one cloud instance.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Authority {
	/// Canonical authority string (`https://host/tenant`), the memoization and cache key.
	pub canonical: String,
	/// Cloud instance hosting the tenant.
	pub cloud_instance: CloudInstance,
	/// Tenant segment.
	pub tenant: TenantId,
	/// OAuth 2.0 token endpoint.
	pub token_endpoint: Url,
	/// OAuth 2.0 authorization endpoint.
	pub authorize_endpoint: Url,
	/// RFC 8628 device authorization endpoint.
	pub device_code_endpoint: Url,
	/// OpenID Connect issuer.
	pub issuer: Url,
}
impl Authority {
	fn build(cloud_instance: CloudInstance, tenant: TenantId) -> Result<Self, AuthorityError> {
		let origin = cloud_instance.origin()?;
		let base = origin.join(&format!("{tenant}/"))?;
		let canonical = base.as_str().trim_end_matches('/').to_owned();

		Ok(Self {
			canonical,
			token_endpoint: base.join("oauth2/v2.0/token")?,
			authorize_endpoint: base.join("oauth2/v2.0/authorize")?,
			device_code_endpoint: base.join("oauth2/v2.0/devicecode")?,
			issuer: base.join("v2.0")?,
			cloud_instance,
			tenant,
		})
	}
}

/// Resolves [`AuthorityConfig`] inputs into memoized [`Authority`] values.
///
/// Resolution order: explicit URI, then cloud instance plus tenant (tenant defaults to
/// `common`, cloud defaults to the client default's cloud), then the client default.
#[derive(Debug, Default)]
pub struct AuthorityResolver {
	default: Option<AuthorityConfig>,
	resolved: Mutex<HashMap<String, Arc<Authority>>>,
}
impl AuthorityResolver {
	/// Creates a resolver with an optional client-level default.
	pub fn new(default: Option<AuthorityConfig>) -> Self {
		Self { default: default.filter(|config| !config.is_empty()), resolved: Default::default() }
	}

	/// Client-level default authority, if configured.
	pub fn default_config(&self) -> Option<&AuthorityConfig> {
		self.default.as_ref()
	}

	/// Resolves request-level inputs, falling back to the client default.
	pub fn resolve(&self, request: &AuthorityConfig) -> Result<Arc<Authority>, AuthorityError> {
		if let Some(uri) = &request.authority_uri {
			return self.resolve_uri(uri);
		}
		if request.cloud_instance.is_some() || request.tenant.is_some() {
			let cloud = request
				.cloud_instance
				.clone()
				.or_else(|| self.default.as_ref().and_then(AuthorityConfig::cloud_hint))
				.unwrap_or_default();
			let tenant = request.tenant.clone().unwrap_or_else(TenantId::common);

			return self.memoize(cloud, tenant);
		}

		match &self.default {
			Some(default) if default.authority_uri.is_some() || default.tenant.is_some() =>
				self.resolve_default(default),
			Some(default) =>
				self.memoize(default.cloud_hint().unwrap_or_default(), TenantId::common()),
			None => Err(AuthorityError::NoDefault),
		}
	}

	fn resolve_default(&self, default: &AuthorityConfig) -> Result<Arc<Authority>, AuthorityError> {
		match &default.authority_uri {
			Some(uri) => self.resolve_uri(uri),
			None => self.memoize(
				default.cloud_instance.clone().unwrap_or_default(),
				default.tenant.clone().unwrap_or_else(TenantId::common),
			),
		}
	}

	fn resolve_uri(&self, uri: &Url) -> Result<Arc<Authority>, AuthorityError> {
		let invalid = |reason| AuthorityError::InvalidUri { uri: uri.to_string(), reason };

		match uri.scheme() {
			"https" => (),
			"http" if cloud::is_loopback(uri) => (),
			_ => return Err(invalid("scheme must be https")),
		}

		if uri.cannot_be_a_base() || uri.host_str().is_none() {
			return Err(invalid("URI has no host"));
		}
		if uri.query().is_some() || uri.fragment().is_some() {
			return Err(invalid("query and fragment are not allowed"));
		}

		let mut segments = uri.path().split('/').filter(|segment| !segment.is_empty());
		let tenant = segments.next().ok_or_else(|| invalid("tenant path segment is missing"))?;

		if segments.next().is_some() {
			return Err(invalid("only the tenant path segment is allowed"));
		}

		self.memoize(CloudInstance::from_url(uri), TenantId::new(tenant)?)
	}

	fn memoize(
		&self,
		cloud: CloudInstance,
		tenant: TenantId,
	) -> Result<Arc<Authority>, AuthorityError> {
		let origin = cloud.origin()?;
		let memo_key = format!("{}{tenant}", origin.as_str());

		if let Some(hit) = self.resolved.lock().get(&memo_key) {
			return Ok(hit.clone());
		}

		let authority = Arc::new(Authority::build(cloud, tenant)?);

		Ok(self.resolved.lock().entry(memo_key).or_insert(authority).clone())
	}
}
