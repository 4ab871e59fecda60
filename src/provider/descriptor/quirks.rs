// self
use crate::_prelude::*;

/// Provider-specific quirks that influence how adapters behave.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderQuirks {
	/// Indicates whether PKCE must be supplied even for confidential clients.
	pub pkce_required: bool,
	/// Character used to join scopes when constructing `scope` parameters.
	pub scope_delimiter: char,
	/// Name of the client identifier parameter (`client_key` on some platforms).
	pub client_id_param: String,
}
impl Default for ProviderQuirks {
	fn default() -> Self {
		Self { pkce_required: false, scope_delimiter: ' ', client_id_param: "client_id".into() }
	}
}
