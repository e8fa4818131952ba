//! RFC 8628 device authorization: initiate, then poll the token endpoint until the user
//! finishes, declines, or the code expires.

// std
use std::time::Duration as StdDuration;
// crates.io
use tokio::time::Instant;
// self
use crate::{
	_prelude::*,
	auth::{CachedToken, ScopeSet, Secret},
	authority::Authority,
	error::{AuthenticationError, ConfigError},
	flows::{
		FlowExecutor,
		common::{self, ClientProof},
	},
	http::TokenHttpClient,
	oauth::{DeviceCodeResponse, FormRequest, GrantType, TransportErrorMapper},
	obs,
};

/// Polling interval increase mandated by a `slow_down` reply.
const SLOW_DOWN_STEP: StdDuration = StdDuration::from_secs(5);

/// User-facing half of a device authorization.
///
/// The secret `device_code` stays inside; only the code and URI to show the user are public.
#[derive(Clone)]
pub struct DeviceCodeInfo {
	/// Code the user types at [`DeviceCodeInfo::verification_uri`].
	pub user_code: String,
	/// Page where the user enters the code.
	pub verification_uri: Url,
	/// Wall-clock instant after which the code is useless.
	pub expires_at: OffsetDateTime,
	/// Minimum delay between polls.
	pub interval: StdDuration,
	/// Instruction text supplied by the authority, if any.
	pub message: Option<String>,
	device_code: Secret,
	deadline: Instant,
}
impl DeviceCodeInfo {
	fn from_response(response: DeviceCodeResponse, now: OffsetDateTime) -> Result<Self> {
		if response.expires_in <= 0 {
			return Err(ConfigError::NonPositiveExpiresIn.into());
		}
		if response.expires_in > common::MAX_EXPIRES_IN {
			return Err(ConfigError::ExpiresInOutOfRange.into());
		}

		let lifetime = StdDuration::from_secs(response.expires_in.unsigned_abs());
		// An interval longer than the lifetime still ends in `expired_token`, never a panic.
		let interval = response.interval.clamp(1, response.expires_in);
		let expires_at = now
			.checked_add(Duration::seconds(response.expires_in))
			.ok_or(ConfigError::ExpiresInOutOfRange)?;
		let deadline =
			Instant::now().checked_add(lifetime).ok_or(ConfigError::ExpiresInOutOfRange)?;

		Ok(Self {
			user_code: response.user_code,
			verification_uri: response.verification_uri,
			expires_at,
			interval: StdDuration::from_secs(interval.unsigned_abs()),
			message: response.message,
			device_code: response.device_code,
			deadline,
		})
	}

	/// Text to show the user: the authority's message, or a generated one.
	pub fn instructions(&self) -> String {
		match &self.message {
			Some(message) => message.clone(),
			None => format!(
				"To sign in, open {} and enter the code {}.",
				self.verification_uri, self.user_code
			),
		}
	}
}
impl Debug for DeviceCodeInfo {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("DeviceCodeInfo")
			.field("user_code", &self.user_code)
			.field("verification_uri", &self.verification_uri.as_str())
			.field("expires_at", &self.expires_at)
			.field("interval", &self.interval)
			.finish_non_exhaustive()
	}
}

impl<C, M> FlowExecutor<C, M>
where
	C: ?Sized + TokenHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	/// Requests a device code for `scopes` (plus the reserved OIDC scopes).
	pub async fn initiate_device_code(
		&self,
		authority: &Authority,
		scopes: &ScopeSet,
		correlation_id: &str,
	) -> Result<DeviceCodeInfo> {
		let request = FormRequest::new(authority.device_code_endpoint.clone())
			.param("client_id", self.client_id.as_str())
			.param("scope", scopes.with_reserved().normalized());
		let response = self
			.endpoint
			.send::<DeviceCodeResponse>(GrantType::DeviceCode, request, correlation_id)
			.await
			.map_err(|e| e.with_correlation_id(correlation_id))?;

		DeviceCodeInfo::from_response(response, OffsetDateTime::now_utc())
	}

	/// Polls until the user completes sign-in.
	///
	/// Waits `interval` before every poll, adds five seconds per `slow_down`, and gives up
	/// with `expired_token` once the next poll would land after the code's expiry.
	/// Retryable failures are polled through up to the retry policy's attempt budget.
	pub async fn poll_device_code(
		&self,
		authority: &Authority,
		scopes: &ScopeSet,
		info: &DeviceCodeInfo,
		correlation_id: &str,
	) -> Result<CachedToken> {
		let params = [("device_code", info.device_code.expose().to_owned())];
		let mut interval = info.interval;
		let mut failures = 0;

		loop {
			if Instant::now().checked_add(interval).is_none_or(|next| next > info.deadline) {
				return Err(Error::Authentication(
					AuthenticationError::new("expired_token")
						.with_description("Device code expired before the user signed in")
						.with_correlation_id(correlation_id),
				));
			}

			tokio::time::sleep(interval).await;

			let err = match self
				.exchange_once(
					authority,
					GrantType::DeviceCode,
					ClientProof::IfConfigured,
					&params,
					correlation_id,
				)
				.await
			{
				Ok(response) =>
					return common::build_token(
						response,
						scopes,
						correlation_id,
						OffsetDateTime::now_utc(),
					),
				Err(e) => e,
			};

			match err.authentication().map(|details| details.code.as_str()) {
				Some("authorization_pending") => {
					failures = 0;

					obs::poll_event("authorization_pending", interval);
				},
				Some("slow_down") => {
					failures = 0;
					interval = interval.saturating_add(SLOW_DOWN_STEP);

					obs::poll_event("slow_down", interval);
				},
				_ if err.is_retryable() && failures + 1 < self.retry.max_attempts => {
					failures += 1;

					obs::retry_event(failures, interval, &err);
				},
				_ => return Err(err),
			}
		}
	}
}
