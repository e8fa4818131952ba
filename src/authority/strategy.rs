//! Authority strategy hooks that customize token exchanges.
//!
//! Implementations decorate outgoing token requests and classify error responses
//! without tying flows to any particular HTTP client.

// self
use crate::{_prelude::*, oauth::GrantType};

/// `suberror` values Entra attaches to `invalid_grant` when the user must act.
const INTERACTION_SUBERRORS: [&str; 5] = [
	"consent_required",
	"basic_action",
	"additional_action",
	"message_only",
	"user_password_expired",
];
/// `AADSTS` codes that require MFA enrollment, consent, a password change, or re-login.
const INTERACTION_ERROR_CODES: [u32; 7] = [50055, 50072, 50074, 50076, 50079, 50158, 65001];

/// Strategy hook that lets authorities decorate requests and classify errors.
///
/// Hooks use crate-owned data only so downstream crates never depend on reqwest types.
/// `augment_token_request` defaults to a no-op.
pub trait AuthorityStrategy: Send + Sync {
	/// Maps an error response into the broker taxonomy for a token request.
	fn classify_error(&self, ctx: &AuthorityErrorContext) -> AuthorityErrorKind;

	/// Adds authority-specific form parameters before dispatching.
	fn augment_token_request(&self, _grant: GrantType, _form: &mut BTreeMap<String, String>) {}
}

/// Canonical error categories produced by strategies.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AuthorityErrorKind {
	/// The grant (code, refresh token, assertion) was rejected.
	InvalidGrant,
	/// The user must interact before a token can be issued.
	InteractionRequired,
	/// The user or the authority declined the request.
	AccessDenied,
	/// Temporary failure; idempotent exchanges may retry.
	Transient,
	/// Any other rejection, surfaced verbatim.
	Other,
}

/// Context passed to strategies when classifying token endpoint errors.
///
/// Only primitive data is kept (status, OAuth fields, body preview) so strategies stay
/// decoupled from the HTTP client.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AuthorityErrorContext {
	/// Grant type of the failing request.
	pub grant_type: GrantType,
	/// HTTP status code, when available.
	pub http_status: Option<u16>,
	/// OAuth `error` field.
	pub oauth_error: Option<String>,
	/// OAuth `error_description` field.
	pub error_description: Option<String>,
	/// Numeric authority error codes (`AADSTS` codes).
	pub error_codes: Vec<u32>,
	/// Authority `suberror` field.
	pub suberror: Option<String>,
	/// Preview of a non-JSON response body.
	pub body_preview: Option<String>,
}
impl AuthorityErrorContext {
	const BODY_PREVIEW_LIMIT: usize = 256;

	/// Creates a new context scoped to the provided grant type.
	pub fn new(grant_type: GrantType) -> Self {
		Self {
			grant_type,
			http_status: None,
			oauth_error: None,
			error_description: None,
			error_codes: Vec::new(),
			suberror: None,
			body_preview: None,
		}
	}

	/// Adds an HTTP status code.
	pub fn with_http_status(mut self, status: u16) -> Self {
		self.http_status = Some(status);

		self
	}

	/// Adds the OAuth error code.
	pub fn with_oauth_error(mut self, error: impl Into<String>) -> Self {
		self.oauth_error = Some(error.into());

		self
	}

	/// Adds the OAuth `error_description`.
	pub fn with_error_description(mut self, description: impl Into<String>) -> Self {
		self.error_description = Some(description.into());

		self
	}

	/// Adds authority error codes.
	pub fn with_error_codes(mut self, codes: impl IntoIterator<Item = u32>) -> Self {
		self.error_codes.extend(codes);

		self
	}

	/// Adds the authority `suberror`.
	pub fn with_suberror(mut self, suberror: impl Into<String>) -> Self {
		self.suberror = Some(suberror.into());

		self
	}

	/// Adds a truncated body preview for non-JSON payloads.
	pub fn with_body_preview(mut self, body: impl Into<String>) -> Self {
		self.body_preview = Some(truncate_preview(body.into()));

		self
	}
}

/// Default strategy covering RFC 6749, RFC 8628, and Entra ID error conventions.
///
/// Structured OAuth fields win; the HTTP status is the fallback for bodies without them.
#[derive(Debug, Default)]
pub struct DefaultAuthorityStrategy;
impl Display for DefaultAuthorityStrategy {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str("default-authority-strategy")
	}
}
impl AuthorityStrategy for DefaultAuthorityStrategy {
	fn classify_error(&self, ctx: &AuthorityErrorContext) -> AuthorityErrorKind {
		if requires_interaction(ctx) {
			return AuthorityErrorKind::InteractionRequired;
		}

		match ctx.oauth_error.as_deref().map(str::to_ascii_lowercase).as_deref() {
			Some("interaction_required" | "login_required" | "consent_required") =>
				AuthorityErrorKind::InteractionRequired,
			Some("access_denied" | "authorization_declined") => AuthorityErrorKind::AccessDenied,
			Some("invalid_grant") => AuthorityErrorKind::InvalidGrant,
			Some("temporarily_unavailable" | "server_error") => AuthorityErrorKind::Transient,
			Some(_) => AuthorityErrorKind::Other,
			None => classify_status(ctx.http_status),
		}
	}
}

fn requires_interaction(ctx: &AuthorityErrorContext) -> bool {
	let suberror = ctx.suberror.as_deref().is_some_and(|suberror| {
		INTERACTION_SUBERRORS.iter().any(|known| known.eq_ignore_ascii_case(suberror))
	});
	let code = ctx.error_codes.iter().any(|code| INTERACTION_ERROR_CODES.contains(code));

	(suberror || code) && !matches!(ctx.oauth_error.as_deref(), Some("authorization_pending"))
}

fn classify_status(status: Option<u16>) -> AuthorityErrorKind {
	match status {
		Some(429) => AuthorityErrorKind::Transient,
		Some(code) if code >= 500 => AuthorityErrorKind::Transient,
		_ => AuthorityErrorKind::Other,
	}
}

fn truncate_preview(body: String) -> String {
	if body.chars().count() <= AuthorityErrorContext::BODY_PREVIEW_LIMIT {
		return body;
	}

	let mut buf =
		body.chars().take(AuthorityErrorContext::BODY_PREVIEW_LIMIT).collect::<String>();

	buf.push('…');

	buf
}
