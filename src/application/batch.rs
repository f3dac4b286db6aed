use crate::domain::batch::{BatchSummary, HostTotals};
use crate::domain::transaction::TransactionResponse;
use crate::error::{GatewayError, Result};
use tracing::{debug, info, warn};

const MAX_BATCH_NUMBER: u32 = 999_999;

/// Lifecycle of the current settlement batch.
#[derive(Debug, Clone, PartialEq)]
pub enum BatchState {
    NoBatch,
    Open(BatchSummary),
    /// Close sent (or about to be); holds the totals being reconciled.
    Closing(BatchSummary),
}

/// Tracks the open batch and reconciles it against the host at close.
///
/// Transitions only happen through the named operations. Access must be
/// serialized by the caller; the gateway keeps it behind a mutex.
#[derive(Debug)]
pub struct BatchManager {
    state: BatchState,
    next_sequence: u32,
    // Sends that passed `reserve` and have not been recorded or released.
    in_flight: u32,
}

impl Default for BatchManager {
    fn default() -> Self {
        Self::new(1)
    }
}

impl BatchManager {
    pub fn new(first_sequence: u32) -> Self {
        Self {
            state: BatchState::NoBatch,
            next_sequence: first_sequence.clamp(1, MAX_BATCH_NUMBER),
            in_flight: 0,
        }
    }

    /// Restores a previously persisted open batch.
    pub fn resume(summary: BatchSummary) -> Self {
        let next_sequence = next_batch_number(summary.sequence_number);
        Self {
            state: BatchState::Open(summary),
            next_sequence,
            in_flight: 0,
        }
    }

    pub fn state(&self) -> &BatchState {
        &self.state
    }

    /// Sequence number the next batch opened will carry.
    pub fn next_sequence(&self) -> u32 {
        self.next_sequence
    }

    /// Running totals of the open batch, if any.
    pub fn current(&self) -> Option<&BatchSummary> {
        match &self.state {
            BatchState::Open(summary) | BatchState::Closing(summary) => Some(summary),
            BatchState::NoBatch => None,
        }
    }

    /// Fails while a close is outstanding.
    pub fn ensure_accepting(&self) -> Result<()> {
        match self.state {
            BatchState::Closing(_) => Err(GatewayError::BatchInProgress),
            _ => Ok(()),
        }
    }

    /// Number of reserved sends still waiting for the host.
    pub fn in_flight(&self) -> u32 {
        self.in_flight
    }

    /// Claims a slot for a send about to go to the host. A close cannot
    /// begin until every slot is recorded or released, so the response is
    /// always accepted into the batch it was sent under.
    pub fn reserve(&mut self) -> Result<()> {
        self.ensure_accepting()?;
        self.in_flight += 1;
        Ok(())
    }

    /// Returns a slot whose send failed without a response to record.
    pub fn release(&mut self) {
        self.in_flight = self.in_flight.saturating_sub(1);
    }

    /// Records a host response against the open batch, opening one first if
    /// needed, and returns any slot reserved for it. Responses that do not
    /// settle leave the totals untouched.
    pub fn add_transaction(&mut self, response: &TransactionResponse) -> Result<()> {
        self.ensure_accepting()?;
        self.release();
        let Some(amount) = response.settled_amount() else {
            debug!(stan = response.stan, "response does not settle; batch unchanged");
            return Ok(());
        };

        if let BatchState::NoBatch = self.state {
            self.state = BatchState::Open(self.open_summary());
        }
        if let BatchState::Open(summary) = &mut self.state {
            summary.record(amount);
            debug!(
                batch = summary.sequence_number,
                count = summary.transaction_count,
                "recorded transaction"
            );
        }
        Ok(())
    }

    /// Moves to `Closing` and returns the totals to send.
    ///
    /// Calling it again while already closing returns the same pending
    /// totals so a failed close can be retried. Closing with no open batch
    /// closes an empty one. Refused while sends are in flight.
    pub fn begin_close(&mut self) -> Result<BatchSummary> {
        if self.in_flight > 0 && !matches!(self.state, BatchState::Closing(_)) {
            return Err(GatewayError::TransactionsInFlight(self.in_flight));
        }
        let summary = match std::mem::replace(&mut self.state, BatchState::NoBatch) {
            BatchState::NoBatch => self.open_summary(),
            BatchState::Open(summary) | BatchState::Closing(summary) => summary,
        };
        info!(
            batch = summary.sequence_number,
            count = summary.transaction_count,
            "closing batch"
        );
        self.state = BatchState::Closing(summary.clone());
        Ok(summary)
    }

    /// Finalizes the pending close against the host's totals and returns to
    /// `NoBatch`. An imbalance is reported in the summary, not raised.
    pub fn complete_close(&mut self, host: HostTotals) -> Result<BatchSummary> {
        let BatchState::Closing(mut summary) =
            std::mem::replace(&mut self.state, BatchState::NoBatch)
        else {
            return Err(GatewayError::Validation(
                "no batch close is pending".to_string(),
            ));
        };

        summary.is_balanced = summary.transaction_count == host.transaction_count
            && summary.total_amount == host.total_amount;
        summary.host_transaction_count = Some(host.transaction_count);
        summary.host_total_amount = Some(host.total_amount);
        summary.response_code = Some(host.response_code);

        if summary.is_balanced {
            info!(batch = summary.sequence_number, "batch closed in balance");
        } else {
            warn!(
                batch = summary.sequence_number,
                local_count = summary.transaction_count,
                host_count = host.transaction_count,
                "batch closed out of balance"
            );
        }
        Ok(summary)
    }

    fn open_summary(&mut self) -> BatchSummary {
        let summary = BatchSummary::new(self.next_sequence);
        self.next_sequence = next_batch_number(self.next_sequence);
        summary
    }
}

fn next_batch_number(current: u32) -> u32 {
    if current >= MAX_BATCH_NUMBER { 1 } else { current + 1 }
}
