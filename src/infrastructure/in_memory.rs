use crate::domain::amount::Balance;
use crate::domain::batch::HostTotals;
use crate::domain::ports::{Endpoint, Transport};
use crate::domain::transaction::{
    CardData, ResponseCode, TransactionRequest, TransactionResponse, TransactionType,
};
use crate::error::{GatewayError, IoStage, Result};
use crate::protocol::frame::FrameCodec;
use crate::protocol::message::{BatchCloseResponse, HostRequest, TransactionCodec};
use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, RwLock};
use tracing::debug;

#[derive(Debug, Default)]
struct HostLedger {
    transaction_count: u32,
    total_amount: Balance,
    next_reference: u64,
    scripted_codes: VecDeque<ResponseCode>,
    total_skew: Balance,
}

/// An acquirer host kept entirely in memory.
///
/// Approves transactions, keeps its own settlement totals and answers batch
/// closes with them. Decodes requests with the same codec the gateway uses,
/// so both sides must share control codes and encryption identity.
pub struct SimulatedHost {
    codec: TransactionCodec,
    frames: FrameCodec,
    ledger: Mutex<HostLedger>,
}

impl SimulatedHost {
    pub fn new(codec: TransactionCodec, frames: FrameCodec) -> Self {
        Self {
            codec,
            frames,
            ledger: Mutex::new(HostLedger::default()),
        }
    }

    /// Answers the next transaction with `code` instead of approving it.
    pub async fn script_response(&self, code: ResponseCode) {
        self.ledger.lock().await.scripted_codes.push_back(code);
    }

    /// Offsets the totals reported at the next batch close.
    pub async fn skew_totals(&self, by: Balance) {
        self.ledger.lock().await.total_skew = by;
    }

    pub async fn totals(&self) -> HostTotals {
        let ledger = self.ledger.lock().await;
        HostTotals {
            transaction_count: ledger.transaction_count,
            total_amount: ledger.total_amount,
            response_code: String::new(),
        }
    }

    /// Processes one request frame and returns the response frame.
    pub async fn respond(&self, frame: &[u8]) -> Result<Vec<u8>> {
        let payload = self.frames.decode(frame)?;
        let reply = match self.codec.deserialize_request(payload)? {
            HostRequest::Transaction { stan, request } => {
                let response = self.authorize(stan, &request).await;
                self.codec.serialize_response(&response)?
            }
            HostRequest::BatchClose {
                stan,
                batch_number,
                transaction_count,
                total_amount,
            } => {
                let totals = self.settle(transaction_count, total_amount).await;
                debug!(batch = batch_number, code = %totals.response_code, "host settled batch");
                self.codec
                    .serialize_batch_close_response(&BatchCloseResponse {
                        stan,
                        batch_number,
                        totals,
                    })?
            }
        };
        self.frames.encode(&reply)
    }

    async fn authorize(&self, stan: u32, request: &TransactionRequest) -> TransactionResponse {
        let mut ledger = self.ledger.lock().await;
        ledger.next_reference += 1;
        let host_reference = format!("{:012}", ledger.next_reference);

        let response_code = ledger
            .scripted_codes
            .pop_front()
            .unwrap_or(match request.r#type {
                TransactionType::Void | TransactionType::Reversal => ResponseCode::Accepted,
                _ => ResponseCode::Approved,
            });
        let approved = response_code.is_approved();

        let mut response = TransactionResponse {
            r#type: request.r#type,
            stan,
            response_message: Some(if approved { "APPROVAL" } else { "DECLINED" }.to_string()),
            host_reference: Some(host_reference),
            approved_amount: approved.then_some(request.amount),
            card_token: None,
            response_code,
        };
        if let (true, CardData::Manual { number, .. }) = (approved, &request.card) {
            response.card_token = Some(format!("tok{}", &number[number.len().saturating_sub(4)..]));
        }
        if let Some(amount) = response.settled_amount() {
            ledger.transaction_count += 1;
            ledger.total_amount += amount;
        }
        response
    }

    async fn settle(&self, transaction_count: u32, total_amount: Balance) -> HostTotals {
        let mut ledger = self.ledger.lock().await;
        let reported = ledger.total_amount + ledger.total_skew;
        let balanced = ledger.transaction_count == transaction_count && reported == total_amount;
        let totals = HostTotals {
            transaction_count: ledger.transaction_count,
            total_amount: reported,
            response_code: if balanced {
                ResponseCode::ReconciledInBalance
            } else {
                ResponseCode::ReconciledOutOfBalance
            }
            .code()
            .to_string(),
        };
        ledger.transaction_count = 0;
        ledger.total_amount = Balance::ZERO;
        ledger.total_skew = Balance::ZERO;
        totals
    }
}

/// Failure injected into a single in-memory exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fault {
    Refuse,
    ConnectTimeout,
    /// The host processes the request but the answer never arrives.
    ResponseTimeout,
    /// The host processes the request and the reply arrives with a bad LRC.
    CorruptChecksum,
    /// The exchange succeeds after a pause.
    Delay(Duration),
}

/// Transport that hands frames straight to a [`SimulatedHost`].
///
/// Every endpoint routes to the same host; faults are queued per endpoint
/// and consumed one per exchange.
#[derive(Clone)]
pub struct InMemoryTransport {
    host: Arc<SimulatedHost>,
    faults: Arc<RwLock<HashMap<String, VecDeque<Fault>>>>,
    calls: Arc<RwLock<Vec<Endpoint>>>,
}

impl InMemoryTransport {
    pub fn new(host: Arc<SimulatedHost>) -> Self {
        Self {
            host,
            faults: Arc::default(),
            calls: Arc::default(),
        }
    }

    pub fn host(&self) -> &Arc<SimulatedHost> {
        &self.host
    }

    pub async fn inject(&self, endpoint: &Endpoint, fault: Fault) {
        let mut faults = self.faults.write().await;
        faults.entry(endpoint.to_string()).or_default().push_back(fault);
    }

    /// Endpoints contacted so far, in order.
    pub async fn calls(&self) -> Vec<Endpoint> {
        self.calls.read().await.clone()
    }
}

#[async_trait]
impl Transport for InMemoryTransport {
    async fn exchange(&self, endpoint: &Endpoint, frame: &[u8]) -> Result<Vec<u8>> {
        self.calls.write().await.push(endpoint.clone());
        let fault = self
            .faults
            .write()
            .await
            .get_mut(&endpoint.to_string())
            .and_then(VecDeque::pop_front);

        match fault {
            Some(Fault::Refuse) => Err(GatewayError::ConnectionRefused {
                endpoint: endpoint.to_string(),
                source: std::io::ErrorKind::ConnectionRefused.into(),
            }),
            Some(Fault::ConnectTimeout) => Err(GatewayError::Timeout {
                endpoint: endpoint.to_string(),
                stage: IoStage::Connect,
            }),
            Some(Fault::ResponseTimeout) => {
                self.host.respond(frame).await?;
                Err(GatewayError::Timeout {
                    endpoint: endpoint.to_string(),
                    stage: IoStage::Response,
                })
            }
            Some(Fault::CorruptChecksum) => {
                let mut reply = self.host.respond(frame).await?;
                if let Some(lrc) = reply.last_mut() {
                    *lrc ^= 0xFF;
                }
                Ok(reply)
            }
            Some(Fault::Delay(pause)) => {
                tokio::time::sleep(pause).await;
                self.host.respond(frame).await
            }
            None => self.host.respond(frame).await,
        }
    }
}
