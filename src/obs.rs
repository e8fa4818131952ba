//! Optional observability helpers for broker flows and the token cache.
//!
//! # Feature Flags
//!
//! - Enable `tracing` to emit spans named `oidc_broker.flow` with the `flow` (grant), `stage`
//!   (call site), and `correlation_id` fields, plus debug events for cache outcomes, retries,
//!   and device-code polling.
//! - Enable `metrics` to increment `oidc_broker_flow_total` (labeled by `flow` + `outcome`) and
//!   `oidc_broker_cache_total` (labeled by `outcome`).

mod metrics;
mod tracing;

pub use metrics::*;
pub use tracing::*;

// self
use crate::_prelude::*;

/// Flow kinds observed by the broker.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FlowKind {
	/// App-only client credentials grant.
	ClientCredentials,
	/// On-behalf-of (JWT bearer assertion) grant.
	OnBehalfOf,
	/// Authorization code grant.
	AuthorizationCode,
	/// Resource owner password credentials grant.
	UsernamePassword,
	/// Device authorization grant.
	DeviceCode,
	/// Cache lookup followed by a refresh token exchange.
	Silent,
	/// Explicit refresh token exchange.
	RefreshToken,
}
impl FlowKind {
	/// Returns a stable label suitable for span or metric fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			FlowKind::ClientCredentials => "client_credentials",
			FlowKind::OnBehalfOf => "on_behalf_of",
			FlowKind::AuthorizationCode => "authorization_code",
			FlowKind::UsernamePassword => "username_password",
			FlowKind::DeviceCode => "device_code",
			FlowKind::Silent => "silent",
			FlowKind::RefreshToken => "refresh_token",
		}
	}
}
impl Display for FlowKind {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// Outcome labels recorded for each attempt.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FlowOutcome {
	/// Entry to a broker operation.
	Attempt,
	/// Successful completion.
	Success,
	/// Failure propagated back to the caller.
	Failure,
}
impl FlowOutcome {
	/// Returns a stable label suitable for span or metric fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			FlowOutcome::Attempt => "attempt",
			FlowOutcome::Success => "success",
			FlowOutcome::Failure => "failure",
		}
	}
}
impl Display for FlowOutcome {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// Token cache lookup outcomes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CacheOutcome {
	/// A valid token covering the requested scopes was returned.
	Hit,
	/// The partition holds no entries.
	NotFound,
	/// Only expired (or within-skew) entries exist.
	Expired,
	/// Valid entries exist but none cover the requested scopes.
	InsufficientScope,
	/// The caller forced a refresh.
	Bypassed,
}
impl CacheOutcome {
	/// Returns a stable label suitable for span or metric fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			CacheOutcome::Hit => "hit",
			CacheOutcome::NotFound => "not_found",
			CacheOutcome::Expired => "expired",
			CacheOutcome::InsufficientScope => "insufficient_scope",
			CacheOutcome::Bypassed => "bypassed",
		}
	}
}
impl Display for CacheOutcome {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}
