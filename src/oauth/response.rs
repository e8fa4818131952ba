//! JSON payloads returned by token and device authorization endpoints.

// crates.io
use serde::de::{self, Deserializer, Visitor};
// self
use crate::{_prelude::*, auth::Secret};

/// Successful token endpoint response.
#[derive(Clone, Debug, Deserialize)]
pub struct TokenEndpointResponse {
	/// Issued access token.
	pub access_token: Secret,
	/// Token type, usually `Bearer`.
	#[serde(default)]
	pub token_type: Option<String>,
	/// Lifetime in seconds; authorities send either a number or a numeric string.
	#[serde(default, deserialize_with = "lenient_seconds")]
	pub expires_in: Option<i64>,
	/// Space-delimited granted scopes.
	#[serde(default)]
	pub scope: Option<String>,
	/// Refresh token, when issued.
	#[serde(default)]
	pub refresh_token: Option<Secret>,
	/// OpenID Connect id token, when issued.
	#[serde(default)]
	pub id_token: Option<Secret>,
}

/// OAuth error response (RFC 6749 §5.2) with Entra extensions.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct OAuthErrorResponse {
	/// OAuth `error` code.
	pub error: String,
	/// Human-readable description.
	#[serde(default)]
	pub error_description: Option<String>,
	/// Numeric `AADSTS` codes.
	#[serde(default)]
	pub error_codes: Vec<u32>,
	/// Entra `suberror` hint.
	#[serde(default)]
	pub suberror: Option<String>,
	/// Authority-side correlation id.
	#[serde(default)]
	pub correlation_id: Option<String>,
}

/// Device authorization response (RFC 8628 §3.2).
#[derive(Clone, Debug, Deserialize)]
pub struct DeviceCodeResponse {
	/// Secret polling handle.
	pub device_code: Secret,
	/// Code the user enters at the verification URI.
	pub user_code: String,
	/// Page where the user enters the code.
	#[serde(alias = "verification_url")]
	pub verification_uri: Url,
	/// Seconds until the device code expires.
	#[serde(deserialize_with = "required_seconds")]
	pub expires_in: i64,
	/// Minimum seconds between polls.
	#[serde(default = "default_interval", deserialize_with = "required_seconds")]
	pub interval: i64,
	/// Ready-made instruction text, when the authority supplies one.
	#[serde(default)]
	pub message: Option<String>,
}

fn default_interval() -> i64 {
	5
}

fn lenient_seconds<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
where
	D: Deserializer<'de>,
{
	deserializer.deserialize_any(SecondsVisitor)
}

fn required_seconds<'de, D>(deserializer: D) -> Result<i64, D::Error>
where
	D: Deserializer<'de>,
{
	deserializer
		.deserialize_any(SecondsVisitor)?
		.ok_or_else(|| de::Error::custom("expected a number of seconds"))
}

struct SecondsVisitor;
impl<'de> Visitor<'de> for SecondsVisitor {
	type Value = Option<i64>;

	fn expecting(&self, f: &mut Formatter) -> FmtResult {
		f.write_str("a number of seconds as an integer or a numeric string")
	}

	fn visit_i64<E>(self, v: i64) -> Result<Self::Value, E>
	where
		E: de::Error,
	{
		Ok(Some(v))
	}

	fn visit_u64<E>(self, v: u64) -> Result<Self::Value, E>
	where
		E: de::Error,
	{
		i64::try_from(v).map(Some).map_err(|_| E::custom("seconds out of range"))
	}

	fn visit_f64<E>(self, v: f64) -> Result<Self::Value, E>
	where
		E: de::Error,
	{
		if v.is_finite() && v.fract() == 0.0 && v.abs() < i64::MAX as f64 {
			Ok(Some(v as i64))
		} else {
			Err(E::custom("seconds must be a whole number"))
		}
	}

	fn visit_str<E>(self, v: &str) -> Result<Self::Value, E>
	where
		E: de::Error,
	{
		v.trim().parse().map(Some).map_err(|_| E::invalid_value(de::Unexpected::Str(v), &self))
	}

	fn visit_unit<E>(self) -> Result<Self::Value, E>
	where
		E: de::Error,
	{
		Ok(None)
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn expires_in_accepts_numbers_and_strings() {
		let numeric: TokenEndpointResponse =
			serde_json::from_str(r#"{"access_token":"a","expires_in":3599}"#)
				.expect("Numeric expires_in should parse.");
		let string: TokenEndpointResponse =
			serde_json::from_str(r#"{"access_token":"a","expires_in":"3599"}"#)
				.expect("String expires_in should parse.");
		let missing: TokenEndpointResponse = serde_json::from_str(r#"{"access_token":"a"}"#)
			.expect("Missing expires_in should parse.");

		assert_eq!(numeric.expires_in, Some(3599));
		assert_eq!(string.expires_in, Some(3599));
		assert_eq!(missing.expires_in, None);
		assert!(
			serde_json::from_str::<TokenEndpointResponse>(
				r#"{"access_token":"a","expires_in":"soon"}"#
			)
			.is_err()
		);
	}

	#[test]
	fn device_code_interval_defaults_to_five_seconds() {
		let response: DeviceCodeResponse = serde_json::from_str(
			r#"{
				"device_code": "dc",
				"user_code": "ABCD-EFGH",
				"verification_uri": "https://microsoft.com/devicelogin",
				"expires_in": "900"
			}"#,
		)
		.expect("Device code fixture should parse.");

		assert_eq!(response.interval, 5);
		assert_eq!(response.expires_in, 900);
		assert_eq!(response.device_code.expose(), "dc");
	}

	#[test]
	fn error_response_keeps_entra_extensions() {
		let response: OAuthErrorResponse = serde_json::from_str(
			r#"{
				"error": "invalid_grant",
				"error_description": "AADSTS70008: The code has expired.",
				"error_codes": [70008],
				"correlation_id": "c0ffee"
			}"#,
		)
		.expect("Error fixture should parse.");

		assert_eq!(response.error_codes, vec![70008]);
		assert_eq!(response.correlation_id.as_deref(), Some("c0ffee"));
		assert!(response.suberror.is_none());
	}
}
