//! Credential material: the inbound assertion and the outbound access token.

pub mod access;
pub mod assertion;
pub mod secret;
