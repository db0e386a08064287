//! SAML object layer (spec §4.3): typed wrappers over `xml::Dom` for the protocol
//! messages the hub mediates, plus envelope signing/verification and assertion
//! encryption.

pub mod encrypt;
pub mod envelope;
pub mod model;
pub mod receive;

pub use model::{AuthnRequest, LogoutRequest, LogoutResponse, Response};
