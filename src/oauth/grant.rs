//! Grant type vocabulary shared by the token endpoint client and the flows.

// self
use crate::_prelude::*;

/// `grant_type` of the JWT bearer grant; the default on-behalf-of assertion type.
pub const JWT_BEARER_GRANT: &str = "urn:ietf:params:oauth:grant-type:jwt-bearer";
/// `grant_type` used while polling the RFC 8628 device authorization grant.
pub const DEVICE_CODE_GRANT: &str = "urn:ietf:params:oauth:grant-type:device_code";

/// OAuth 2.0 grant types the broker can execute.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GrantType {
	/// App-only client credentials grant.
	ClientCredentials,
	/// On-behalf-of exchange of an inbound user assertion.
	OnBehalfOf,
	/// Authorization code grant (PKCE recommended).
	AuthorizationCode,
	/// Resource owner password credentials grant.
	Password,
	/// Device authorization grant.
	DeviceCode,
	/// Refresh token grant.
	RefreshToken,
}
impl GrantType {
	/// Returns the `grant_type` form value.
	///
	/// On-behalf-of requests may override this with a custom assertion type.
	pub fn as_str(self) -> &'static str {
		match self {
			GrantType::ClientCredentials => "client_credentials",
			GrantType::OnBehalfOf => JWT_BEARER_GRANT,
			GrantType::AuthorizationCode => "authorization_code",
			GrantType::Password => "password",
			GrantType::DeviceCode => DEVICE_CODE_GRANT,
			GrantType::RefreshToken => "refresh_token",
		}
	}

	/// Returns `true` when repeating the exchange cannot consume a one-time artifact.
	///
	/// Only idempotent exchanges are retried on transport or transient failures.
	pub fn is_idempotent(self) -> bool {
		matches!(
			self,
			GrantType::ClientCredentials | GrantType::DeviceCode | GrantType::RefreshToken
		)
	}
}
impl Display for GrantType {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}
