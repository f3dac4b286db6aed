//! Wire-level protocol: framing, field layout, encryption envelope and
//! sequence numbers.

pub mod envelope;
pub mod fields;
pub mod frame;
pub mod message;
pub mod stan;
