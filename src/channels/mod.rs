//! Messaging-platform integration — LINE event decoding and replies.

pub mod line;
pub mod traits;

pub use line::{extract_event, LineClient};
pub use traits::{InboundEvent, ReplySender};
