//! Token acquisition facade.
//!
//! [`TokenBroker`] resolves the authority, computes the cache key, consults the
//! [`TokenCache`], and dispatches the grant to the [`FlowExecutor`]. It holds no
//! process-wide state; every broker is built from an explicit [`ClientConfig`] and clones
//! share one cache and transport.

pub mod device;
pub mod request;

mod fallback;

pub use device::*;
pub use request::*;

// self
use crate::{
	_prelude::*,
	auth::{Account, CachedToken, ClientId, ScopeSet},
	authority::{Authority, AuthorityConfig, AuthorityResolver},
	cache::{CacheKey, CachePartition, CacheSubject, TokenCache},
	config::ClientConfig,
	error::{AuthenticationError, ConfigError},
	flows::{AuthorizationSession, FlowExecutor},
	http::TokenHttpClient,
	oauth::TransportErrorMapper,
	obs::{self, FlowKind, FlowOutcome, FlowSpan},
};
#[cfg(feature = "reqwest")]
use crate::{http::ReqwestHttpClient, oauth::ReqwestTransportErrorMapper};

/// Broker specialized for the crate's default reqwest transport stack.
#[cfg(feature = "reqwest")]
pub type ReqwestTokenBroker = TokenBroker<ReqwestHttpClient, ReqwestTransportErrorMapper>;

/// Acquires, caches, and refreshes tokens for one client application.
pub struct TokenBroker<C, M>
where
	C: ?Sized + TokenHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	inner: Arc<BrokerInner<C, M>>,
}
impl<C, M> TokenBroker<C, M>
where
	C: ?Sized + TokenHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	/// Creates a broker that reuses the caller-provided transport and mapper pair.
	pub fn with_http_client(
		config: ClientConfig,
		http_client: impl Into<Arc<C>>,
		mapper: impl Into<Arc<M>>,
	) -> Self {
		let executor = FlowExecutor::new(&config, http_client, mapper);
		let resolver = AuthorityResolver::new(config.default_authority().cloned());
		let cache = TokenCache::new(config.store.clone(), config.settings.clock_skew());

		Self { inner: Arc::new(BrokerInner { resolver, cache, executor }) }
	}

	/// Client the broker acquires tokens for.
	pub fn client_id(&self) -> &ClientId {
		self.inner.executor.client_id()
	}

	/// Shared token cache.
	pub fn cache(&self) -> &TokenCache {
		&self.inner.cache
	}

	/// Grant executor, for callers that need an uncached exchange.
	pub fn executor(&self) -> &FlowExecutor<C, M> {
		&self.inner.executor
	}

	/// Resolves `authority`, or the client default when `None`.
	pub fn resolve_authority(&self, authority: Option<&AuthorityConfig>) -> Result<Arc<Authority>> {
		let fallback = AuthorityConfig::default();

		Ok(self.inner.resolver.resolve(authority.unwrap_or(&fallback))?)
	}

	/// Returns a token for `request`.
	///
	/// App and on-behalf-of tokens are served from the cache unless `force_refresh` is set,
	/// and concurrent misses for the same key share one exchange. User grants always run
	/// their exchange and cache the result under the signed-in account. Silent requests
	/// never prompt: they fail with [`Error::InteractionRequired`] when neither a cached
	/// token nor a usable refresh token exists.
	pub async fn acquire_token(&self, request: AcquisitionRequest) -> Result<CachedToken> {
		let kind = request.grant.flow_kind();
		let span = FlowSpan::new(kind, "acquire_token", request.correlation_id);

		obs::record_flow_outcome(kind, FlowOutcome::Attempt);

		let result = span.instrument(self.dispatch(request)).await;

		record_outcome(kind, &result);

		result
	}

	/// Starts an authorization code sign-in: builds the authorize URL with `state` and PKCE.
	pub fn start_authorization<I, S>(
		&self,
		scopes: I,
		redirect_uri: Url,
		authority: Option<&AuthorityConfig>,
	) -> Result<AuthorizationSession>
	where
		I: IntoIterator<Item = S>,
		S: Into<String>,
	{
		let scopes = ScopeSet::new(scopes).map_err(ConfigError::from)?;

		if scopes.is_empty() {
			return Err(ConfigError::invalid_request("at least one scope is required").into());
		}

		let authority = self.resolve_authority(authority)?;

		self.inner.executor.start_authorization(&authority, &scopes, redirect_uri)
	}

	/// Accounts with cached tokens.
	pub async fn accounts(&self) -> Result<Vec<Account>> {
		self.inner.cache.accounts().await
	}

	/// Forgets every cached token of `account`; returns how many entries were dropped.
	pub async fn remove_account(&self, account: &Account) -> Result<usize> {
		self.inner.cache.remove_account(account).await
	}

	/// Drops every cached token.
	pub async fn clear_cache(&self) -> Result<()> {
		self.inner.cache.clear().await
	}

	async fn dispatch(&self, request: AcquisitionRequest) -> Result<CachedToken> {
		let authority = self.resolve_authority(request.authority.as_ref())?;
		let correlation_id = request.correlation_id.to_string();
		let AcquisitionRequest { scopes, grant, force_refresh, .. } = request;
		let kind = grant.flow_kind();
		let executor = &self.inner.executor;

		match grant {
			GrantRequest::ClientCredentials => {
				let key = self.key(&authority, CacheSubject::App, &scopes);

				self.cached(&key, force_refresh, || {
					executor.client_credentials(&authority, &scopes, &correlation_id)
				})
				.await
			},
			GrantRequest::OnBehalfOf { assertion, assertion_type } => {
				let subject = CacheSubject::for_assertion(assertion.expose());
				let key = self.key(&authority, subject, &scopes);

				self.cached(&key, force_refresh, || {
					executor.on_behalf_of(
						&authority,
						&scopes,
						&assertion,
						&assertion_type,
						&correlation_id,
					)
				})
				.await
			},
			GrantRequest::Silent { account } =>
				self.silent(&authority, &scopes, &account, force_refresh, &correlation_id).await,
			GrantRequest::AuthorizationCode { code, redirect_uri, pkce_verifier } => {
				let token = executor
					.authorization_code(
						&authority,
						&scopes,
						&code,
						&redirect_uri,
						pkce_verifier.as_ref(),
						&correlation_id,
					)
					.await?;

				self.store_for_account(kind, &authority, &scopes, token).await
			},
			GrantRequest::UsernamePassword { username, password } => {
				let token = executor
					.username_password(&authority, &scopes, &username, &password, &correlation_id)
					.await?;

				self.store_for_account(kind, &authority, &scopes, token).await
			},
			GrantRequest::RefreshToken { refresh_token } => {
				let token = executor
					.refresh_token(&authority, &scopes, &refresh_token, &correlation_id)
					.await?;

				self.store_for_account(kind, &authority, &scopes, token).await
			},
			GrantRequest::DeviceCode { prompt } => {
				let prompt = prompt.ok_or_else(|| {
					ConfigError::invalid_request(
						"device code acquisition needs a prompt; use start_device_code instead",
					)
				})?;
				let info =
					executor.initiate_device_code(&authority, &scopes, &correlation_id).await?;

				prompt(&info);

				let token =
					executor.poll_device_code(&authority, &scopes, &info, &correlation_id).await?;

				self.store_for_account(kind, &authority, &scopes, token).await
			},
		}
	}

	async fn silent(
		&self,
		authority: &Authority,
		scopes: &ScopeSet,
		account: &Account,
		force_refresh: bool,
		correlation_id: &str,
	) -> Result<CachedToken> {
		let subject = CacheSubject::Account(account.home_account_id.clone());
		let key = self.key(authority, subject, scopes);
		let partition = &key.partition;
		let cache = &self.inner.cache;

		self.cached(&key, force_refresh, move || async move {
			let Some(refresh_token) = cache.refresh_token_for(partition).await? else {
				return Err(Error::InteractionRequired(
					AuthenticationError::new("no_refresh_token")
						.with_description("No cached token or refresh token for the account")
						.with_correlation_id(correlation_id),
				));
			};

			match self
				.inner
				.executor
				.refresh_token(authority, scopes, &refresh_token, correlation_id)
				.await
			{
				Ok(mut token) => {
					if token.account.is_none() {
						token.account = Some(account.clone());
					}

					Ok(token)
				},
				Err(Error::InvalidGrant(details)) => {
					cache.forget_refresh_token(partition, &refresh_token).await?;

					Err(Error::InteractionRequired(details))
				},
				Err(e) => Err(e),
			}
		})
		.await
	}

	async fn cached<F, Fut>(
		&self,
		key: &CacheKey,
		force_refresh: bool,
		supplier: F,
	) -> Result<CachedToken>
	where
		F: FnOnce() -> Fut,
		Fut: Future<Output = Result<CachedToken>>,
	{
		if force_refresh {
			self.inner.cache.refresh_with(key, supplier).await
		} else {
			self.inner.cache.get_or_acquire(key, supplier).await
		}
	}

	/// Caches a user token under the account it was issued to, when one is known.
	async fn store_for_account(
		&self,
		kind: FlowKind,
		authority: &Authority,
		scopes: &ScopeSet,
		token: CachedToken,
	) -> Result<CachedToken> {
		let Some(home_account_id) =
			token.account.as_ref().map(|account| account.home_account_id.clone())
		else {
			obs::uncached_event(kind, "response identified no account");

			return Ok(token);
		};
		let subject = CacheSubject::Account(home_account_id);
		let key = self.key(authority, subject, scopes);

		self.inner.cache.store(&key, token.clone()).await?;

		Ok(token)
	}

	fn key(&self, authority: &Authority, subject: CacheSubject, scopes: &ScopeSet) -> CacheKey {
		let partition = CachePartition::new(
			self.client_id().clone(),
			authority.tenant.clone(),
			authority.canonical.clone(),
			subject,
		);

		CacheKey::new(partition, scopes.clone())
	}
}
#[cfg(feature = "reqwest")]
impl TokenBroker<ReqwestHttpClient, ReqwestTransportErrorMapper> {
	/// Creates a broker with its own reqwest transport, honoring the configured timeout.
	pub fn new(config: ClientConfig) -> Result<Self> {
		let http_client = ReqwestHttpClient::new(config.settings.http_timeout())?;

		Ok(Self::with_http_client(config, http_client, ReqwestTransportErrorMapper))
	}
}
impl<C, M> Clone for TokenBroker<C, M>
where
	C: ?Sized + TokenHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	fn clone(&self) -> Self {
		Self { inner: self.inner.clone() }
	}
}
impl<C, M> Debug for TokenBroker<C, M>
where
	C: ?Sized + TokenHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("TokenBroker")
			.field("executor", &self.inner.executor)
			.field("resolver", &self.inner.resolver)
			.field("cache", &self.inner.cache)
			.finish()
	}
}

struct BrokerInner<C, M>
where
	C: ?Sized + TokenHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	resolver: AuthorityResolver,
	cache: TokenCache,
	executor: FlowExecutor<C, M>,
}

fn record_outcome<T>(kind: FlowKind, result: &Result<T>) {
	match result {
		Ok(_) => obs::record_flow_outcome(kind, FlowOutcome::Success),
		Err(_) => obs::record_flow_outcome(kind, FlowOutcome::Failure),
	}
}
