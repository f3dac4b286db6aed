use super::batch::{BatchManager, BatchState};
use crate::config::GatewayConfig;
use crate::domain::batch::BatchSummary;
use crate::domain::ports::TransportBox;
use crate::domain::transaction::{TransactionRequest, TransactionResponse};
use crate::error::{GatewayError, Result};
use crate::infrastructure::endpoint::EndpointSelector;
use crate::infrastructure::tcp::TcpTransport;
use crate::protocol::frame::FrameCodec;
use crate::protocol::message::TransactionCodec;
use crate::protocol::stan::StanCounter;
use tokio::sync::Mutex;
use tracing::{info, instrument};

/// Entry point for submitting transactions and closing batches against one
/// acquirer host pair.
///
/// Owns its STAN sequence and batch state for its whole lifetime. The batch
/// lock is never held while talking to the host.
pub struct NetworkGateway {
    codec: TransactionCodec,
    frames: FrameCodec,
    selector: EndpointSelector,
    stan: StanCounter,
    batch: Mutex<BatchManager>,
}

impl NetworkGateway {
    /// Builds a gateway that reaches the host through `transport`.
    pub fn new(config: &GatewayConfig, transport: TransportBox) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            codec: TransactionCodec::new(config.terminal_profile(), config.envelope()),
            frames: config.frame_codec(),
            selector: EndpointSelector::new(
                config.primary.clone(),
                config.secondary.clone(),
                transport,
            ),
            stan: StanCounter::starting_at(config.starting_stan),
            batch: Mutex::new(BatchManager::new(config.starting_batch)),
        })
    }

    /// Builds a gateway speaking TCP to the configured endpoints.
    pub fn connect(config: &GatewayConfig) -> Result<Self> {
        let transport = TcpTransport::new(
            config.frame_codec(),
            config.connect_timeout(),
            config.response_timeout(),
        );
        Self::new(config, Box::new(transport))
    }

    /// Restores an open batch persisted by an earlier process.
    pub async fn resume_batch(&self, summary: BatchSummary) -> Result<()> {
        let mut batch = self.batch.lock().await;
        if !matches!(batch.state(), BatchState::NoBatch) {
            return Err(GatewayError::Validation(
                "a batch is already open".to_string(),
            ));
        }
        *batch = BatchManager::resume(summary);
        Ok(())
    }

    /// Sends one transaction and records it in the open batch.
    ///
    /// Fails with [`GatewayError::BatchInProgress`] while a close is
    /// outstanding. Once accepted, the send holds a slot in the open batch
    /// that blocks any close until its response is recorded, so a host
    /// answer is never dropped. Timeouts after the request was written are
    /// returned as is; reversing a possibly processed transaction is up to
    /// the caller.
    #[instrument(skip_all, fields(transaction = %request.r#type))]
    pub async fn send(&self, request: &TransactionRequest) -> Result<TransactionResponse> {
        self.codec.validate(request)?;
        self.batch.lock().await.reserve()?;

        let outcome = self.round_trip(request).await;
        let mut batch = self.batch.lock().await;
        match outcome {
            Ok(response) => {
                batch.add_transaction(&response)?;
                Ok(response)
            }
            Err(err) => {
                batch.release();
                Err(err)
            }
        }
    }

    async fn round_trip(&self, request: &TransactionRequest) -> Result<TransactionResponse> {
        let stan = self.stan.next();
        let payload = self.codec.serialize(request, stan)?;
        let reply = self.exchange(&payload).await?;
        let response = self.codec.deserialize(&reply)?;

        if response.stan != stan || response.r#type != request.r#type {
            return Err(GatewayError::UnexpectedResponse(format!(
                "sent {} with STAN {:06}, host answered {} with STAN {:06}",
                request.r#type, stan, response.r#type, response.stan
            )));
        }
        info!(
            stan,
            code = %response.response_code,
            approved = response.response_code.is_approved(),
            "transaction completed"
        );
        Ok(response)
    }

    /// Reconciles the open batch with the host.
    ///
    /// Refused with [`GatewayError::TransactionsInFlight`] while sends are
    /// still waiting for the host. Once the close is sent, any failure
    /// leaves the batch closing and further transactions are rejected;
    /// calling this again resends the same totals.
    pub async fn close_batch(&self) -> Result<BatchSummary> {
        let pending = self.batch.lock().await.begin_close()?;

        let stan = self.stan.next();
        let payload = self.codec.serialize_batch_close(&pending, stan)?;
        let reply = self.exchange(&payload).await?;
        let response = self.codec.deserialize_batch_close(&reply)?;

        if response.stan != stan || response.batch_number != pending.sequence_number {
            return Err(GatewayError::UnexpectedResponse(format!(
                "closed batch {} with STAN {:06}, host answered batch {} with STAN {:06}",
                pending.sequence_number, stan, response.batch_number, response.stan
            )));
        }
        self.batch.lock().await.complete_close(response.totals)
    }

    pub async fn batch_state(&self) -> BatchState {
        self.batch.lock().await.state().clone()
    }

    /// Running totals of the open batch, for persistence.
    pub async fn current_batch(&self) -> Option<BatchSummary> {
        self.batch.lock().await.current().cloned()
    }

    /// Last STAN issued, for persistence.
    pub fn last_stan(&self) -> Option<u32> {
        self.stan.peek()
    }

    pub fn codec(&self) -> &TransactionCodec {
        &self.codec
    }

    async fn exchange(&self, payload: &[u8]) -> Result<Vec<u8>> {
        let frame = self.frames.encode(payload)?;
        let reply = self.selector.send(&frame).await?;
        Ok(self.frames.decode(&reply)?.to_vec())
    }
}
