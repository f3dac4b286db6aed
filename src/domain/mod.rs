pub mod acceptor;
pub mod amount;
pub mod batch;
pub mod ports;
pub mod transaction;
