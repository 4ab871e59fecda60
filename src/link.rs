//! Linking Coordinator: turns completed authorizations into sessions or linked credentials.
//!
//! [`Linker::complete`] runs the provider adapter (state check, then code exchange), resolves the
//! active session, evaluates a [`LinkDecision`], and applies it. Applying is transactional per
//! attempt: the vault write happens only after a successful exchange, and if opening quota
//! counters or issuing the session fails afterwards, the previous credential (or its absence) is
//! restored before the error propagates.
//!
//! Concurrent links for the same identity/provider pair are serialized through a per-key
//! singleflight guard so the last writer wins deterministically.

pub mod decision;

pub use decision::*;

// self
use crate::{
	_prelude::*,
	auth::{Identity, LinkedCredential, ProviderId, StateScope, TokenSecret},
	csrf::StateStore,
	obs::{self, FlowKind, FlowOutcome, FlowSpan},
	provider::{AuthorizationGrant, AuthorizationStart, CallbackParams, ProviderAdapter},
	quota::{QuotaGate, QuotaLedger, QuotaPolicy},
	session::{RequestContext, SessionAuthority},
	store::{CredentialKey, TokenVault},
};

/// Orchestrates adapters, the Token Vault, the Quota Ledger, and the Session Authority.
#[derive(Clone)]
pub struct Linker {
	vault: Arc<dyn TokenVault>,
	quotas: QuotaGate,
	states: Arc<dyn StateStore>,
	sessions: Arc<dyn SessionAuthority>,
	adapters: BTreeMap<ProviderId, Arc<dyn ProviderAdapter>>,
	flow_guards: Arc<Mutex<HashMap<CredentialKey, Arc<AsyncMutex<()>>>>>,
}
impl Linker {
	/// Wires the coordinator to its stores; register providers with [`Linker::with_adapter`].
	pub fn new(
		vault: Arc<dyn TokenVault>,
		ledger: Arc<dyn QuotaLedger>,
		policy: QuotaPolicy,
		states: Arc<dyn StateStore>,
		sessions: Arc<dyn SessionAuthority>,
	) -> Self {
		let quotas = QuotaGate::new(ledger, policy, sessions.clone(), vault.clone());

		Self {
			vault,
			quotas,
			states,
			sessions,
			adapters: BTreeMap::new(),
			flow_guards: Default::default(),
		}
	}

	/// Registers (or replaces) the adapter for the adapter's provider.
	pub fn with_adapter(mut self, adapter: Arc<dyn ProviderAdapter>) -> Self {
		self.adapters.insert(adapter.provider(), adapter);

		self
	}

	/// Providers with a registered adapter.
	pub fn providers(&self) -> impl Iterator<Item = ProviderId> + '_ {
		self.adapters.keys().copied()
	}

	/// Adapter registered for `provider`.
	pub fn adapter(&self, provider: ProviderId) -> Result<&Arc<dyn ProviderAdapter>> {
		self.adapters
			.get(&provider)
			.ok_or_else(|| Error::UnsupportedProvider { provider: provider.to_string() })
	}

	/// Token Vault backing the coordinator.
	pub fn vault(&self) -> &Arc<dyn TokenVault> {
		&self.vault
	}

	/// Quota facade sharing the coordinator's vault and Session Authority.
	pub fn quotas(&self) -> &QuotaGate {
		&self.quotas
	}

	/// Session Authority consulted on every link.
	pub fn sessions(&self) -> &Arc<dyn SessionAuthority> {
		&self.sessions
	}

	/// Starts an authorization for the client bound to `scope`.
	pub async fn begin(
		&self,
		provider: ProviderId,
		scope: &StateScope,
		redirect_uri: &Url,
	) -> Result<AuthorizationStart> {
		const KIND: FlowKind = FlowKind::Begin;

		let span = FlowSpan::new(KIND, "begin");

		obs::record_flow_outcome(KIND, FlowOutcome::Attempt);

		let result = span
			.instrument(async move { self.adapter(provider)?.begin(scope, redirect_uri).await })
			.await;

		obs::record_result(KIND, &result);

		result
	}

	/// Handles a provider callback end to end.
	///
	/// The adapter validates the callback (provider error, then state, then code) before any
	/// network call; no credential is touched unless the exchange succeeds.
	pub async fn complete(
		&self,
		provider: ProviderId,
		scope: &StateScope,
		params: &CallbackParams,
		redirect_uri: &Url,
		ctx: &RequestContext,
	) -> Result<LinkOutcome> {
		const KIND: FlowKind = FlowKind::Complete;

		let span = FlowSpan::new(KIND, "complete");

		obs::record_flow_outcome(KIND, FlowOutcome::Attempt);

		let result = span
			.instrument(async move {
				let grant = self.adapter(provider)?.complete(scope, params, redirect_uri).await?;

				self.link(grant, ctx).await
			})
			.await;

		obs::record_result(KIND, &result);

		result
	}

	/// Resolves the active session for `ctx` and applies the resulting decision to `grant`.
	pub async fn link(
		&self,
		grant: AuthorizationGrant,
		ctx: &RequestContext,
	) -> Result<LinkOutcome> {
		let active = self.sessions.current_session(ctx).await?.map(|session| session.identity);

		self.link_with_active_at(grant, active.as_ref(), OffsetDateTime::now_utc()).await
	}

	/// Applies the link decision for `grant` given an already-resolved active identity.
	pub async fn link_with_active_at(
		&self,
		grant: AuthorizationGrant,
		active: Option<&Identity>,
		at: OffsetDateTime,
	) -> Result<LinkOutcome> {
		const KIND: FlowKind = FlowKind::Link;

		let span = FlowSpan::new(KIND, "apply");

		obs::record_flow_outcome(KIND, FlowOutcome::Attempt);

		let decision = LinkDecision::decide(grant.provider, active, grant.identity_hint.as_ref());
		let result = span.instrument(self.apply(decision, grant, at)).await;

		obs::record_result(KIND, &result);

		result
	}

	/// Removes the credential linked for `provider`, returning it when one existed.
	pub async fn unlink(
		&self,
		identity: &Identity,
		provider: ProviderId,
	) -> Result<Option<LinkedCredential>> {
		let guard = self.flow_guard(&CredentialKey::new(identity, provider));
		let _singleflight = guard.lock().await;

		Ok(self.vault.delete(identity, provider).await?)
	}

	/// Every credential linked to `identity`.
	pub async fn credentials(&self, identity: &Identity) -> Result<Vec<LinkedCredential>> {
		Ok(self.vault.list(identity).await?)
	}

	/// Drops abandoned custom-flow states, returning how many were reclaimed.
	pub async fn purge_expired_states(&self) -> Result<usize> {
		Ok(self.states.purge_expired(OffsetDateTime::now_utc()).await?)
	}

	async fn apply(
		&self,
		decision: LinkDecision,
		grant: AuthorizationGrant,
		at: OffsetDateTime,
	) -> Result<LinkOutcome> {
		let Some(identity) = decision.identity().cloned() else {
			return Err(Error::UnresolvableIdentity);
		};
		let provider = grant.provider;
		let guard = self.flow_guard(&CredentialKey::new(&identity, provider));
		let _singleflight = guard.lock().await;
		let prior = self.vault.get(&identity, provider).await?;
		let credential =
			LinkedCredential::new(identity.clone(), provider, grant.tokens, grant.subject, at);

		self.vault.upsert(credential).await?;

		match self.finish(&decision, &identity, provider, at).await {
			Ok(Some(session_token)) =>
				Ok(LinkOutcome::NewSession { identity, provider, session_token }),
			Ok(None) => Ok(LinkOutcome::PreserveSession { identity, provider }),
			Err(e) => {
				// A failed rollback leaves the new credential behind; report the storage error.
				self.restore(&identity, provider, prior).await?;

				Err(e)
			},
		}
	}

	async fn finish(
		&self,
		decision: &LinkDecision,
		identity: &Identity,
		provider: ProviderId,
		at: OffsetDateTime,
	) -> Result<Option<TokenSecret>> {
		self.quotas.initialize_at(identity, provider, at).await?;

		if decision.issues_session() {
			Ok(Some(self.sessions.issue_session(identity).await?))
		} else {
			Ok(None)
		}
	}

	async fn restore(
		&self,
		identity: &Identity,
		provider: ProviderId,
		prior: Option<LinkedCredential>,
	) -> Result<()> {
		let stage = decision_stage(prior.is_some());

		obs::warn_rollback(stage);

		let restored = match prior {
			Some(credential) => self.vault.upsert(credential).await,
			None => self.vault.delete(identity, provider).await.map(|_| ()),
		};

		restored.map_err(|e| {
			let e = Error::from(e);

			obs::warn_rollback_failed(stage, &e);

			e
		})
	}

	fn flow_guard(&self, key: &CredentialKey) -> Arc<AsyncMutex<()>> {
		let mut guards = self.flow_guards.lock();

		guards.entry(key.clone()).or_insert_with(|| Arc::new(AsyncMutex::new(()))).clone()
	}
}
impl Debug for Linker {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("Linker")
			.field("providers", &self.adapters.keys().collect::<Vec<_>>())
			.field("quotas", &self.quotas)
			.finish()
	}
}

fn decision_stage(had_prior: bool) -> &'static str {
	if had_prior { "restore_prior_credential" } else { "delete_new_credential" }
}
