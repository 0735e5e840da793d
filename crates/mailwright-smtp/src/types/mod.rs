//! Core SMTP types.

mod address;
mod envelope;
mod extension;
mod reply;

pub use address::Address;
pub use envelope::{Dsn, DsnNotify, DsnReturn, Envelope, SendInfo, encode_xtext};
pub use extension::{AuthMechanism, Extension};
pub use reply::{EnhancedStatus, Reply, ReplyClass, ReplyCode};
