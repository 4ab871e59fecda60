//! Provider descriptor data structures and presets for the supported provider set.
//!
//! The module exposes validated metadata, supporting builder utilities, and provider quirks so
//! adapters can describe each provider's authorization surface in a transport-agnostic way.

/// Builder API for assembling provider descriptors.
pub mod builder;
/// Provider-specific quirk toggles.
pub mod quirks;

pub use builder::*;
pub use quirks::*;

// self
use crate::{_prelude::*, auth::ProviderId};

/// Role a provider plays in identity resolution.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderRole {
	/// Trusted to bootstrap (and replace) the session identity.
	Primary,
	/// Grants API access only; never changes an active session.
	Secondary,
}

/// How the authorization-code exchange is performed.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlowStyle {
	/// Delegated to the `oauth2` client library.
	Library,
	/// Hand-rolled exchange guarded by the CSRF State Store.
	Custom,
}

/// Preferred client authentication modes for token endpoint calls.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClientAuthMethod {
	#[default]
	/// HTTP Basic with `client_id`/`client_secret`.
	ClientSecretBasic,
	/// Form POST body parameters for `client_id`/`client_secret`.
	ClientSecretPost,
}

/// Endpoint set declared by a provider descriptor.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderEndpoints {
	/// Authorization endpoint the browser is redirected to.
	pub authorization: Url,
	/// Token endpoint used for the code exchange.
	pub token: Url,
	/// Profile endpoint queried with the fresh access token to discover the e-mail, if any.
	pub userinfo: Option<Url>,
}

/// Immutable provider descriptor consumed by adapters.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderDescriptor {
	/// Provider this descriptor configures.
	pub id: ProviderId,
	/// Endpoint definitions exposed by the provider.
	pub endpoints: ProviderEndpoints,
	/// Scopes requested on every authorization.
	pub scopes: Vec<String>,
	/// Extra query parameters appended to the authorization URL.
	pub extra_authorize_params: BTreeMap<String, String>,
	/// Preferred client authentication mechanism.
	pub client_auth: ClientAuthMethod,
	/// Provider-specific quirks.
	pub quirks: ProviderQuirks,
}
impl ProviderDescriptor {
	/// Creates an empty builder for the provided identifier.
	pub fn builder(id: ProviderId) -> ProviderDescriptorBuilder {
		ProviderDescriptorBuilder::new(id)
	}

	/// Creates a builder pre-populated with the provider's public endpoints, scopes, and quirks.
	pub fn preset(id: ProviderId) -> ProviderDescriptorBuilder {
		ProviderDescriptorBuilder::preset(id)
	}

	/// Role of the provider.
	pub fn role(&self) -> ProviderRole {
		self.id.role()
	}

	/// Authorization style of the provider.
	pub fn flow_style(&self) -> FlowStyle {
		self.id.flow_style()
	}

	/// Returns true when the provider runs the hand-rolled flow.
	pub fn is_custom_flow(&self) -> bool {
		matches!(self.flow_style(), FlowStyle::Custom)
	}

	/// Scopes joined with the provider's delimiter, or `None` when no scope is requested.
	pub fn scope_param(&self) -> Option<String> {
		if self.scopes.is_empty() {
			return None;
		}

		let mut buf = String::new();

		for (idx, value) in self.scopes.iter().enumerate() {
			if idx > 0 {
				buf.push(self.quirks.scope_delimiter);
			}

			buf.push_str(value);
		}

		Some(buf)
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn presets_cover_every_provider() {
		for provider in ProviderId::ALL {
			let descriptor = ProviderDescriptor::preset(provider)
				.build()
				.expect("Every preset should validate.");

			assert_eq!(descriptor.id, provider);
			assert_eq!(descriptor.is_custom_flow(), provider == ProviderId::TikTok);
		}
	}

	#[test]
	fn scope_formatting_handles_custom_delimiters() {
		let tiktok =
			ProviderDescriptor::preset(ProviderId::TikTok).build().expect("Preset should build.");
		let google =
			ProviderDescriptor::preset(ProviderId::Google).build().expect("Preset should build.");

		assert_eq!(tiktok.scope_param(), Some("user.info.basic,video.list".into()));
		assert_eq!(google.scope_param(), Some("openid email profile".into()));
		assert_eq!(tiktok.quirks.client_id_param, "client_key");
	}
}
