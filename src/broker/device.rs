//! Background device-code sign-in.

// crates.io
use tokio::task::JoinHandle;
// self
use crate::{
	_prelude::*,
	auth::CachedToken,
	broker::{AcquisitionRequest, GrantRequest, TokenBroker},
	error::ConfigError,
	flows::DeviceCodeInfo,
	http::TokenHttpClient,
	oauth::TransportErrorMapper,
	obs::{self, FlowKind, FlowOutcome, FlowSpan},
};

/// Running device-code sign-in.
///
/// Polling runs on a tokio task. Dropping the handle detaches the task; call
/// [`DeviceCodeHandle::cancel`] to stop it. A cancelled poll stores nothing.
pub struct DeviceCodeHandle {
	info: DeviceCodeInfo,
	task: JoinHandle<Result<CachedToken>>,
}
impl DeviceCodeHandle {
	/// Code and verification URI to show the user.
	pub fn info(&self) -> &DeviceCodeInfo {
		&self.info
	}

	/// Returns `true` once polling has stopped.
	pub fn is_finished(&self) -> bool {
		self.task.is_finished()
	}

	/// Stops polling; [`DeviceCodeHandle::wait`] then yields [`Error::Cancelled`].
	pub fn cancel(&self) {
		self.task.abort();
	}

	/// Waits for the sign-in to finish.
	pub async fn wait(self) -> Result<CachedToken> {
		match self.task.await {
			Ok(result) => result,
			Err(e) if e.is_panic() => std::panic::resume_unwind(e.into_panic()),
			Err(_) => Err(Error::Cancelled),
		}
	}
}
impl Debug for DeviceCodeHandle {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("DeviceCodeHandle")
			.field("info", &self.info)
			.field("finished", &self.task.is_finished())
			.finish()
	}
}

impl<C, M> TokenBroker<C, M>
where
	C: ?Sized + TokenHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	/// Requests a device code and polls for the token in the background.
	///
	/// The request's prompt, if any, is called with the code before polling starts. The
	/// returned handle exposes the same code for callers that render it themselves.
	pub async fn start_device_code(&self, request: AcquisitionRequest) -> Result<DeviceCodeHandle> {
		const KIND: FlowKind = FlowKind::DeviceCode;

		let GrantRequest::DeviceCode { prompt } = &request.grant else {
			return Err(ConfigError::invalid_request("start_device_code needs a device code grant")
				.into());
		};
		let span = FlowSpan::new(KIND, "start_device_code", request.correlation_id);
		let authority = self.resolve_authority(request.authority.as_ref())?;
		let correlation_id = request.correlation_id.to_string();
		let info = span
			.instrument(self.executor().initiate_device_code(
				&authority,
				&request.scopes,
				&correlation_id,
			))
			.await;
		let info = match info {
			Ok(info) => info,
			Err(e) => {
				obs::record_flow_outcome(KIND, FlowOutcome::Failure);

				return Err(e);
			},
		};

		if let Some(prompt) = prompt {
			prompt(&info);
		}

		let broker = self.clone();
		let poll_info = info.clone();
		let scopes = request.scopes;
		let poll_span = FlowSpan::new(KIND, "poll_device_code", request.correlation_id);
		let task = tokio::spawn(poll_span.instrument(async move {
			obs::record_flow_outcome(KIND, FlowOutcome::Attempt);

			let result = match broker
				.executor()
				.poll_device_code(&authority, &scopes, &poll_info, &correlation_id)
				.await
			{
				Ok(token) => broker.store_for_account(KIND, &authority, &scopes, token).await,
				Err(e) => Err(e),
			};

			super::record_outcome(KIND, &result);

			result
		}));

		Ok(DeviceCodeHandle { info, task })
	}
}
