//! Credentials linked to an identity for one provider.

// self
use crate::{
	_prelude::*,
	auth::{Identity, ProviderId, TokenSet},
};

/// Token set persisted under an (identity, provider) pair.
///
/// Only the Token Vault writes these; a second link for the same pair replaces the record
/// wholesale.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkedCredential {
	/// Identity that owns the credential.
	pub identity: Identity,
	/// Provider that issued the tokens.
	pub provider: ProviderId,
	/// Tokens returned by the provider's token endpoint.
	pub tokens: TokenSet,
	/// Provider-side account identifier (e.g. an `open_id`), when disclosed.
	pub subject: Option<String>,
	/// Instant the credential was linked.
	pub linked_at: OffsetDateTime,
}
impl LinkedCredential {
	/// Creates a credential linked at `linked_at`.
	pub fn new(
		identity: Identity,
		provider: ProviderId,
		tokens: TokenSet,
		subject: Option<String>,
		linked_at: OffsetDateTime,
	) -> Self {
		Self { identity, provider, tokens, subject, linked_at }
	}
}
