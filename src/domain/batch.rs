use super::amount::Balance;
use serde::{Deserialize, Serialize};

/// Running or finalized totals of one settlement batch.
///
/// Serializable so callers can persist the open batch across restarts; the
/// engine itself keeps it in memory only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchSummary {
    pub sequence_number: u32,
    pub transaction_count: u32,
    pub total_amount: Balance,
    pub is_balanced: bool,
    /// Filled in at close from the host's reconciliation response.
    pub host_transaction_count: Option<u32>,
    pub host_total_amount: Option<Balance>,
    pub response_code: Option<String>,
}

impl BatchSummary {
    pub fn new(sequence_number: u32) -> Self {
        Self {
            sequence_number,
            transaction_count: 0,
            total_amount: Balance::ZERO,
            is_balanced: false,
            host_transaction_count: None,
            host_total_amount: None,
            response_code: None,
        }
    }

    pub fn record(&mut self, amount: Balance) {
        self.transaction_count += 1;
        self.total_amount += amount;
    }
}

/// Counts and totals the host reports when closing a batch.
#[derive(Debug, Clone, PartialEq)]
pub struct HostTotals {
    pub transaction_count: u32,
    pub total_amount: Balance,
    pub response_code: String,
}
