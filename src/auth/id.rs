//! Strongly typed identifiers enforced across the linking domain.

// std
use std::{borrow::Borrow, ops::Deref};
// self
use crate::{
	_prelude::*,
	provider::{FlowStyle, ProviderRole},
};

macro_rules! def_id {
	($name:ident, $doc:literal, $kind:literal, $normalize:path) => {
		#[doc = $doc]
		#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
		#[serde(try_from = "String", into = "String")]
		pub struct $name(String);
		impl $name {
			/// Creates a new identifier after normalization and validation.
			pub fn new(value: impl AsRef<str>) -> Result<Self, IdentifierError> {
				Ok(Self($normalize($kind, value.as_ref())?))
			}
		}
		impl Deref for $name {
			type Target = str;

			fn deref(&self) -> &Self::Target {
				&self.0
			}
		}
		impl AsRef<str> for $name {
			fn as_ref(&self) -> &str {
				&self.0
			}
		}
		impl From<$name> for String {
			fn from(value: $name) -> Self {
				value.0
			}
		}
		impl TryFrom<String> for $name {
			type Error = IdentifierError;

			fn try_from(value: String) -> Result<Self, Self::Error> {
				Self::new(value)
			}
		}
		impl Borrow<str> for $name {
			fn borrow(&self) -> &str {
				&self.0
			}
		}
		impl Debug for $name {
			fn fmt(&self, f: &mut Formatter) -> FmtResult {
				write!(f, concat!($kind, "({})"), self.0)
			}
		}
		impl Display for $name {
			fn fmt(&self, f: &mut Formatter) -> FmtResult {
				f.write_str(&self.0)
			}
		}
		impl FromStr for $name {
			type Err = IdentifierError;

			fn from_str(s: &str) -> Result<Self, Self::Err> {
				Self::new(s)
			}
		}
	};
}

const IDENTIFIER_MAX_LEN: usize = 254;

/// Error returned when identifier validation fails.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, ThisError)]
pub enum IdentifierError {
	/// The identifier was empty or whitespace.
	#[error("{kind} identifier cannot be empty.")]
	Empty {
		/// Kind of identifier (identity, scope).
		kind: &'static str,
	},
	/// The identifier contains whitespace characters.
	#[error("{kind} identifier contains whitespace.")]
	ContainsWhitespace {
		/// Kind of identifier (identity, scope).
		kind: &'static str,
	},
	/// The identifier exceeded the allowed character count.
	#[error("{kind} identifier exceeds {max} characters.")]
	TooLong {
		/// Kind of identifier (identity, scope).
		kind: &'static str,
		/// Maximum permitted character count.
		max: usize,
	},
	/// The identity is not shaped like an e-mail address.
	#[error("Identity `{value}` is not an e-mail address.")]
	NotAnEmail {
		/// Offending value after trimming.
		value: String,
	},
	/// The provider is not part of the supported set.
	#[error("Provider `{value}` is not supported.")]
	UnknownProvider {
		/// Offending provider label.
		value: String,
	},
}

def_id! {
	Identity,
	"Canonical user key: a trimmed, lower-cased e-mail address.",
	"Identity",
	normalize_email
}
def_id! {
	StateScope,
	"Binding that ties a pending authorization to the client that started it.",
	"Scope",
	normalize_opaque
}
impl StateScope {
	/// Builds the scope for `provider` as started by the client holding `client_binding`.
	pub fn for_client(provider: ProviderId, client_binding: &str) -> Result<Self, IdentifierError> {
		Self::new(format!("{provider}:{client_binding}"))
	}
}

/// Closed set of OAuth providers a credential can be linked from.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderId {
	/// Primary identity provider; the only one trusted to bootstrap identity over an active
	/// session.
	Google,
	/// Discussion platform linked for API access.
	Reddit,
	/// Micro-blogging platform linked for API access; quota-tracked.
	Twitter,
	/// Short-video platform without library support; runs the custom authorization flow.
	TikTok,
}
impl ProviderId {
	/// Every supported provider, primary first.
	pub const ALL: [ProviderId; 4] =
		[ProviderId::Google, ProviderId::Reddit, ProviderId::Twitter, ProviderId::TikTok];

	/// Returns the stable lowercase label used in URLs, cookies, and storage keys.
	pub const fn as_str(self) -> &'static str {
		match self {
			ProviderId::Google => "google",
			ProviderId::Reddit => "reddit",
			ProviderId::Twitter => "twitter",
			ProviderId::TikTok => "tiktok",
		}
	}

	/// Role the provider plays in identity resolution.
	pub const fn role(self) -> ProviderRole {
		match self {
			ProviderId::Google => ProviderRole::Primary,
			ProviderId::Reddit | ProviderId::Twitter | ProviderId::TikTok =>
				ProviderRole::Secondary,
		}
	}

	/// Returns true for the primary identity provider.
	pub const fn is_primary(self) -> bool {
		matches!(self.role(), ProviderRole::Primary)
	}

	/// Authorization style the provider supports.
	pub const fn flow_style(self) -> FlowStyle {
		match self {
			ProviderId::TikTok => FlowStyle::Custom,
			ProviderId::Google | ProviderId::Reddit | ProviderId::Twitter => FlowStyle::Library,
		}
	}

	/// Returns true when the provider runs the hand-rolled flow.
	pub const fn is_custom_flow(self) -> bool {
		matches!(self.flow_style(), FlowStyle::Custom)
	}
}
impl Display for ProviderId {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}
impl FromStr for ProviderId {
	type Err = IdentifierError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		Self::ALL
			.into_iter()
			.find(|provider| provider.as_str().eq_ignore_ascii_case(s))
			.ok_or_else(|| IdentifierError::UnknownProvider { value: s.to_owned() })
	}
}

fn normalize_opaque(kind: &'static str, view: &str) -> Result<String, IdentifierError> {
	if view.is_empty() {
		return Err(IdentifierError::Empty { kind });
	}
	if view.chars().any(char::is_whitespace) {
		return Err(IdentifierError::ContainsWhitespace { kind });
	}
	if view.len() > IDENTIFIER_MAX_LEN {
		return Err(IdentifierError::TooLong { kind, max: IDENTIFIER_MAX_LEN });
	}

	Ok(view.to_owned())
}

fn normalize_email(kind: &'static str, view: &str) -> Result<String, IdentifierError> {
	let normalized = normalize_opaque(kind, view.trim())?.to_lowercase();
	let well_formed = match normalized.split_once('@') {
		Some((local, domain)) =>
			!local.is_empty() && !domain.is_empty() && !domain.contains('@'),
		None => false,
	};

	if !well_formed {
		return Err(IdentifierError::NotAnEmail { value: normalized });
	}

	Ok(normalized)
}
