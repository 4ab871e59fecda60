//! Token secrets, normalized token sets, and the credentials linked to an identity.

pub mod credential;
pub mod secret;
pub mod set;
