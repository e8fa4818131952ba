//! Caller-supplied fallback chains.

// self
use crate::{
	_prelude::*,
	auth::CachedToken,
	broker::{AcquisitionRequest, TokenBroker},
	error::ConfigError,
	http::TokenHttpClient,
	oauth::TransportErrorMapper,
};

impl<C, M> TokenBroker<C, M>
where
	C: ?Sized + TokenHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	/// Tries each request in order, moving on only when one needs user interaction.
	///
	/// A typical chain is silent first, then device code. Any other failure ends the chain;
	/// when every request needs interaction the last such error is returned.
	pub async fn acquire_with_fallback<I>(&self, requests: I) -> Result<CachedToken>
	where
		I: IntoIterator<Item = AcquisitionRequest>,
	{
		let mut last = None;

		for request in requests {
			match self.acquire_token(request).await {
				Err(e) if e.is_interaction_required() => last = Some(e),
				result => return result,
			}
		}

		Err(last.unwrap_or_else(|| ConfigError::invalid_request("fallback chain is empty").into()))
	}
}
