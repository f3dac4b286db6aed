//! Transport adapters: TCP to real hosts, an in-memory host for tests, and
//! primary/secondary endpoint selection on top of either.

pub mod endpoint;
pub mod in_memory;
pub mod tcp;
