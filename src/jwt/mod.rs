//! HS256 entitlement tokens handed to the desktop client on activation.

mod claims;
mod signing;

pub use claims::*;
pub use signing::*;
