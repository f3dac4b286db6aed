//! Application layer: the batch state machine and the gateway that drives
//! transactions and batch closes through the protocol stack.

pub mod batch;
pub mod gateway;
