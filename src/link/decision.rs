//! The NewSession-vs-LinkToExisting decision, evaluated once per completed authorization.

// self
use crate::{
	_prelude::*,
	auth::{Identity, ProviderId, TokenSecret},
	provider::ProviderRole,
};

/// What a completed authorization turns into.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LinkDecision {
	/// Primary provider disclosed an identity: (re)issue a session for it, replacing any active
	/// session.
	Bootstrap {
		/// Identity disclosed by the primary provider.
		identity: Identity,
	},
	/// Secondary provider while a session is active: attach the credential and leave the session
	/// alone.
	LinkExisting {
		/// Identity of the active session; the credential is stored under it.
		identity: Identity,
		/// Identity the secondary provider disclosed, if any. Informational only.
		disclosed: Option<Identity>,
	},
	/// Secondary provider without a session but with a disclosed identity.
	BootstrapFromSecondary {
		/// Identity disclosed by the secondary provider.
		identity: Identity,
	},
	/// Nobody to attach the credential to.
	Reject,
}
impl LinkDecision {
	/// Applies the linking policy in order: primary always wins, then an active session keeps its
	/// identity, then a disclosed identity may bootstrap.
	pub fn decide(
		provider: ProviderId,
		active: Option<&Identity>,
		disclosed: Option<&Identity>,
	) -> Self {
		match (provider.role(), active, disclosed) {
			(ProviderRole::Primary, _, Some(identity)) =>
				Self::Bootstrap { identity: identity.clone() },
			(ProviderRole::Primary, _, None) => Self::Reject,
			(ProviderRole::Secondary, Some(identity), disclosed) => Self::LinkExisting {
				identity: identity.clone(),
				disclosed: disclosed.cloned(),
			},
			(ProviderRole::Secondary, None, Some(identity)) =>
				Self::BootstrapFromSecondary { identity: identity.clone() },
			(ProviderRole::Secondary, None, None) => Self::Reject,
		}
	}

	/// Identity the credential will be stored under.
	pub fn identity(&self) -> Option<&Identity> {
		match self {
			Self::Bootstrap { identity }
			| Self::LinkExisting { identity, .. }
			| Self::BootstrapFromSecondary { identity } => Some(identity),
			Self::Reject => None,
		}
	}

	/// Returns true when applying the decision issues a new session.
	pub fn issues_session(&self) -> bool {
		matches!(self, Self::Bootstrap { .. } | Self::BootstrapFromSecondary { .. })
	}

	/// Stable label for logs.
	pub const fn as_str(&self) -> &'static str {
		match self {
			Self::Bootstrap { .. } => "bootstrap",
			Self::LinkExisting { .. } => "link_existing",
			Self::BootstrapFromSecondary { .. } => "bootstrap_from_secondary",
			Self::Reject => "reject",
		}
	}
}

/// Result of a successfully applied link.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LinkOutcome {
	/// A session was issued; the caller must hand `session_token` to the client.
	NewSession {
		/// Identity of the new session.
		identity: Identity,
		/// Provider whose credential was stored.
		provider: ProviderId,
		/// Freshly issued session token.
		session_token: TokenSecret,
	},
	/// The active session is untouched; redirect back into the authenticated area.
	PreserveSession {
		/// Identity of the active session.
		identity: Identity,
		/// Provider whose credential was stored.
		provider: ProviderId,
	},
}
impl LinkOutcome {
	/// Identity the credential was stored under.
	pub fn identity(&self) -> &Identity {
		match self {
			Self::NewSession { identity, .. } | Self::PreserveSession { identity, .. } => identity,
		}
	}

	/// Provider whose credential was stored.
	pub fn provider(&self) -> ProviderId {
		match self {
			Self::NewSession { provider, .. } | Self::PreserveSession { provider, .. } => *provider,
		}
	}

	/// Session token to deliver, when one was issued.
	pub fn session_token(&self) -> Option<&TokenSecret> {
		match self {
			Self::NewSession { session_token, .. } => Some(session_token),
			Self::PreserveSession { .. } => None,
		}
	}
}
