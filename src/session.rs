//! Session Authority contract plus an in-memory implementation.
//!
//! The linker reads the active session through [`SessionAuthority::current_session`] and only
//! ever mutates sessions by delegating [`SessionAuthority::issue_session`]. Plan tiers and roles
//! travel as [`Claims`] so capability checks never compare e-mail addresses.

// self
use crate::{
	_prelude::*,
	auth::{Identity, TokenSecret},
	csrf,
	quota::PlanTier,
};

/// Boxed future returned by [`SessionAuthority`] calls.
pub type SessionFuture<'a, T> =
	Pin<Box<dyn Future<Output = Result<T, SessionError>> + 'a + Send>>;

/// Capability role carried in the session claims.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
	/// Regular dashboard user.
	#[default]
	Member,
	/// Operator allowed to inspect other identities' data.
	Admin,
}

/// Claims resolved for an identity by the Session Authority.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Claims {
	/// Billing plan that selects quota limits.
	pub plan: PlanTier,
	/// Capability role.
	pub role: Role,
}
impl Claims {
	/// Claims for `plan` with the member role.
	pub fn for_plan(plan: PlanTier) -> Self {
		Self { plan, role: Role::Member }
	}

	/// Overrides the role.
	pub fn with_role(mut self, role: Role) -> Self {
		self.role = role;

		self
	}

	/// Returns true for operators.
	pub fn is_admin(&self) -> bool {
		matches!(self.role, Role::Admin)
	}
}

/// Authenticated session as reported by the Session Authority.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
	/// Identity the session belongs to.
	pub identity: Identity,
	/// Issue instant.
	pub issued_at: OffsetDateTime,
	/// Claims resolved at issue time.
	pub claims: Claims,
}

/// Request-scoped inputs the Session Authority needs to resolve the caller.
#[derive(Clone, Debug, Default)]
pub struct RequestContext {
	/// Session token presented by the client, if any.
	pub session_token: Option<TokenSecret>,
}
impl RequestContext {
	/// Context for an unauthenticated request.
	pub fn anonymous() -> Self {
		Self::default()
	}

	/// Context carrying the provided session token.
	pub fn with_session_token(token: impl Into<String>) -> Self {
		Self { session_token: Some(TokenSecret::new(token)) }
	}
}

/// Session issuance and validation collaborator.
pub trait SessionAuthority
where
	Self: Send + Sync,
{
	/// Resolves the active session for the request, if any.
	fn current_session<'a>(&'a self, ctx: &'a RequestContext)
	-> SessionFuture<'a, Option<Session>>;

	/// Issues a new session for `identity`, registering the identity on first sight.
	fn issue_session<'a>(&'a self, identity: &'a Identity) -> SessionFuture<'a, TokenSecret>;

	/// Resolves the current claims for `identity` (defaults for unknown identities).
	fn claims<'a>(&'a self, identity: &'a Identity) -> SessionFuture<'a, Claims>;
}

/// Errors produced by Session Authority implementations.
#[derive(Clone, Debug, PartialEq, Eq, ThisError)]
pub enum SessionError {
	/// Backend failure while reading or issuing a session.
	#[error("Session backend failure: {message}.")]
	Backend {
		/// Human-readable error payload.
		message: String,
	},
}

/// In-process Session Authority keyed by opaque random session tokens.
#[derive(Clone, Debug, Default)]
pub struct MemorySessionAuthority {
	sessions: Arc<RwLock<HashMap<String, Session>>>,
	claims: Arc<RwLock<HashMap<Identity, Claims>>>,
}
impl MemorySessionAuthority {
	/// Registers `identity` with the provided claims.
	pub fn with_claims(self, identity: Identity, claims: Claims) -> Self {
		self.set_claims(identity, claims);

		self
	}

	/// Replaces the claims for `identity`; existing sessions keep the claims they were issued with.
	pub fn set_claims(&self, identity: Identity, claims: Claims) {
		self.claims.write().insert(identity, claims);
	}

	/// Returns true once the identity has been registered.
	pub fn is_known(&self, identity: &Identity) -> bool {
		self.claims.read().contains_key(identity)
	}

	/// Looks up a session by its raw token.
	pub fn session(&self, token: &str) -> Option<Session> {
		self.sessions.read().get(token).cloned()
	}

	/// Number of issued sessions.
	pub fn session_count(&self) -> usize {
		self.sessions.read().len()
	}

	/// Invalidates a session token.
	pub fn revoke(&self, token: &str) -> Option<Session> {
		self.sessions.write().remove(token)
	}
}
impl SessionAuthority for MemorySessionAuthority {
	fn current_session<'a>(
		&'a self,
		ctx: &'a RequestContext,
	) -> SessionFuture<'a, Option<Session>> {
		Box::pin(async move {
			Ok(ctx.session_token.as_ref().and_then(|token| self.session(token.expose())))
		})
	}

	fn issue_session<'a>(&'a self, identity: &'a Identity) -> SessionFuture<'a, TokenSecret> {
		Box::pin(async move {
			let claims = *self.claims.write().entry(identity.clone()).or_default();
			let token = csrf::mint_token();
			let issued_at = OffsetDateTime::now_utc();
			let session = Session { identity: identity.clone(), issued_at, claims };

			self.sessions.write().insert(token.clone(), session);

			Ok(TokenSecret::new(token))
		})
	}

	fn claims<'a>(&'a self, identity: &'a Identity) -> SessionFuture<'a, Claims> {
		Box::pin(async move { Ok(self.claims.read().get(identity).copied().unwrap_or_default()) })
	}
}

#[cfg(test)]
mod tests {
	// crates.io
	use tokio::runtime::Runtime;
	// self
	use super::*;

	#[test]
	fn issued_sessions_resolve_and_register_identities() {
		let rt = Runtime::new().expect("Failed to build Tokio runtime for session test.");
		let authority = MemorySessionAuthority::default();
		let identity = Identity::new("a@x.com").expect("Identity fixture should be valid.");

		assert!(!authority.is_known(&identity));

		let token =
			rt.block_on(authority.issue_session(&identity)).expect("Issuing should succeed.");
		let ctx = RequestContext::with_session_token(token.expose());
		let session = rt
			.block_on(authority.current_session(&ctx))
			.expect("Lookup should succeed.")
			.expect("Issued session should resolve.");

		assert_eq!(session.identity, identity);
		assert_eq!(session.claims, Claims::default());
		assert!(authority.is_known(&identity));
		assert!(
			rt.block_on(authority.current_session(&RequestContext::anonymous()))
				.expect("Lookup should succeed.")
				.is_none()
		);
	}

	#[test]
	fn claims_follow_registration() {
		let rt = Runtime::new().expect("Failed to build Tokio runtime for session test.");
		let admin = Identity::new("ops@x.com").expect("Identity fixture should be valid.");
		let authority = MemorySessionAuthority::default()
			.with_claims(admin.clone(), Claims::for_plan(PlanTier::Teams).with_role(Role::Admin));
		let claims = rt.block_on(authority.claims(&admin)).expect("Claims should resolve.");

		assert!(claims.is_admin());
		assert_eq!(claims.plan, PlanTier::Teams);

		let stranger = Identity::new("new@x.com").expect("Identity fixture should be valid.");

		assert_eq!(
			rt.block_on(authority.claims(&stranger)).expect("Claims should resolve."),
			Claims::default()
		);
	}
}
