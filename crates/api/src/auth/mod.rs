//! Bearer-token primitives. Tokens are issued by the identity service; this
//! crate only verifies them.

pub mod jwt;
