use super::envelope::{EncryptionData, EncryptionEnvelope};
use super::fields::{FieldId, Message, MessageType, decode_message, encode_message};
use crate::domain::acceptor::AcceptorConfig;
use crate::domain::amount::{Amount, Balance};
use crate::domain::batch::{BatchSummary, HostTotals};
use crate::domain::transaction::{
    CardData, OriginalTransaction, ResponseCode, TransactionRequest, TransactionResponse,
    TransactionType,
};
use crate::error::{GatewayError, Result};
use tracing::warn;

/// Terminal identity and capability snapshot stamped on every request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TerminalProfile {
    pub company_id: String,
    pub terminal_id: String,
    pub acceptor: AcceptorConfig,
}

/// Host answer to a batch close.
#[derive(Debug, Clone, PartialEq)]
pub struct BatchCloseResponse {
    pub stan: u32,
    pub batch_number: u32,
    pub totals: HostTotals,
}

/// A request as seen by the receiving host.
#[derive(Debug, Clone, PartialEq)]
pub enum HostRequest {
    Transaction {
        stan: u32,
        request: TransactionRequest,
    },
    BatchClose {
        stan: u32,
        batch_number: u32,
        transaction_count: u32,
        total_amount: Balance,
    },
}

/// Maps transactions and batch closes to and from message payloads.
#[derive(Debug, Clone)]
pub struct TransactionCodec {
    terminal: TerminalProfile,
    envelope: EncryptionEnvelope,
}

impl TransactionCodec {
    pub fn new(terminal: TerminalProfile, envelope: EncryptionEnvelope) -> Self {
        Self { terminal, envelope }
    }

    pub fn terminal(&self) -> &TerminalProfile {
        &self.terminal
    }

    pub fn envelope(&self) -> &EncryptionEnvelope {
        &self.envelope
    }

    /// Request message type for a transaction.
    pub fn message_type(r#type: TransactionType) -> MessageType {
        match r#type {
            TransactionType::Authorization => MessageType::AuthorizationRequest,
            TransactionType::Sale | TransactionType::Refund => MessageType::FinancialRequest,
            TransactionType::Void | TransactionType::Reversal => MessageType::ReversalRequest,
        }
    }

    /// Checks a request for problems the host would reject outright.
    pub fn validate(&self, request: &TransactionRequest) -> Result<()> {
        validate_request(request)
    }

    pub fn serialize(&self, request: &TransactionRequest, stan: u32) -> Result<Vec<u8>> {
        validate_request(request)?;
        let acceptor = &self.terminal.acceptor;

        let mut msg = Message::new(Self::message_type(request.r#type));
        msg.set(FieldId::TransactionCode, transaction_code(request.r#type))
            .set(FieldId::CompanyId, &self.terminal.company_id)
            .set(FieldId::TerminalId, &self.terminal.terminal_id)
            .set(
                FieldId::InputCapability,
                acceptor.card_data_input_capability.code(),
            )
            .set(
                FieldId::OutputCapability,
                acceptor.terminal_output_capability.code(),
            )
            .set(
                FieldId::SupportFlags,
                format!("{:02X}", acceptor.support_flags()),
            )
            .set(FieldId::HardwareLevel, &acceptor.hardware_level)
            .set(FieldId::SoftwareLevel, &acceptor.software_level)
            .set(FieldId::Stan, format!("{:06}", stan))
            .set(FieldId::Amount, request.amount.to_minor_units()?.to_string())
            .set(FieldId::Currency, &request.currency);

        match &request.card {
            CardData::Manual {
                number,
                expiry,
                cvn,
            } => {
                msg.set(FieldId::Pan, number)
                    .set(FieldId::Expiry, expiry)
                    .set_opt(FieldId::Cvn, cvn.as_ref());
            }
            CardData::Track { value } => {
                msg.set(FieldId::Track, value);
            }
        }
        msg.set_opt(FieldId::PinBlock, request.pin_block.as_ref())
            .set_opt(FieldId::CardholderName, request.cardholder_name.as_ref());

        if self.envelope.scheme().is_encrypted() {
            msg.set(FieldId::EncryptionScheme, self.envelope.scheme().tag());
        }
        if let Some(data) = &request.encryption_data {
            msg.set(FieldId::EncryptionVersion, &data.version)
                .set(FieldId::EncryptionKtb, &data.ktb);
        }
        if let Some(original) = &request.original {
            msg.set(FieldId::OriginalStan, format!("{:06}", original.stan))
                .set_opt(
                    FieldId::OriginalHostReference,
                    original.host_reference.as_ref(),
                );
        }

        encode_message(&msg, &self.envelope)
    }

    pub fn deserialize(&self, payload: &[u8]) -> Result<TransactionResponse> {
        let msg = decode_message(payload, &self.envelope)?;
        match msg.message_type() {
            MessageType::AuthorizationResponse
            | MessageType::FinancialResponse
            | MessageType::ReversalResponse => {}
            other => {
                return Err(GatewayError::UnexpectedResponse(format!(
                    "expected a transaction response, got message type {}",
                    other.code()
                )));
            }
        }

        let r#type = transaction_type(msg.require(FieldId::TransactionCode)?)?;
        let response_code = ResponseCode::from_code(msg.require(FieldId::ResponseCode)?);
        if !response_code.is_known() {
            warn!(code = response_code.code(), "host returned unknown response code");
        }
        let approved_minor: u64 = msg.require_number(FieldId::Amount)?;
        let approved_amount = match approved_minor {
            0 => None,
            units => Some(Amount::from_minor_units(units)?),
        };

        Ok(TransactionResponse {
            r#type,
            stan: msg.require_number(FieldId::Stan)?,
            response_code,
            response_message: msg.get(FieldId::ResponseMessage).map(str::to_string),
            host_reference: msg.get(FieldId::HostReference).map(str::to_string),
            approved_amount,
            card_token: msg.get(FieldId::CardToken).map(str::to_string),
        })
    }

    pub fn serialize_batch_close(&self, summary: &BatchSummary, stan: u32) -> Result<Vec<u8>> {
        let mut msg = Message::new(MessageType::ReconciliationRequest);
        msg.set(FieldId::CompanyId, &self.terminal.company_id)
            .set(FieldId::TerminalId, &self.terminal.terminal_id)
            .set(FieldId::Stan, format!("{:06}", stan))
            .set(
                FieldId::BatchNumber,
                format!("{:06}", summary.sequence_number),
            )
            .set(
                FieldId::TransactionCount,
                summary.transaction_count.to_string(),
            );
        set_total(&mut msg, summary.total_amount)?;
        encode_message(&msg, &self.envelope)
    }

    pub fn deserialize_batch_close(&self, payload: &[u8]) -> Result<BatchCloseResponse> {
        let msg = decode_message(payload, &self.envelope)?;
        if msg.message_type() != MessageType::ReconciliationResponse {
            return Err(GatewayError::UnexpectedResponse(format!(
                "expected a batch close response, got message type {}",
                msg.message_type().code()
            )));
        }

        Ok(BatchCloseResponse {
            stan: msg.require_number(FieldId::Stan)?,
            batch_number: msg.require_number(FieldId::BatchNumber)?,
            totals: HostTotals {
                transaction_count: msg.require_number(FieldId::TransactionCount)?,
                total_amount: read_total(&msg)?,
                response_code: msg.require(FieldId::ResponseCode)?.to_string(),
            },
        })
    }

    /// Parses a request the way the receiving host would.
    pub fn deserialize_request(&self, payload: &[u8]) -> Result<HostRequest> {
        let msg = decode_message(payload, &self.envelope)?;
        let stan = msg.require_number(FieldId::Stan)?;

        if msg.message_type() == MessageType::ReconciliationRequest {
            return Ok(HostRequest::BatchClose {
                stan,
                batch_number: msg.require_number(FieldId::BatchNumber)?,
                transaction_count: msg.require_number(FieldId::TransactionCount)?,
                total_amount: read_total(&msg)?,
            });
        }
        if msg.message_type().response_type().is_none() {
            return Err(GatewayError::Encoding(format!(
                "message type {} is not a request",
                msg.message_type().code()
            )));
        }

        let card = if let Some(number) = msg.get(FieldId::Pan) {
            CardData::Manual {
                number: number.to_string(),
                expiry: msg.require(FieldId::Expiry)?.to_string(),
                cvn: msg.get(FieldId::Cvn).map(str::to_string),
            }
        } else {
            CardData::Track {
                value: msg.require(FieldId::Track)?.to_string(),
            }
        };

        let encryption_data = match (
            msg.get(FieldId::EncryptionVersion),
            msg.get(FieldId::EncryptionKtb),
        ) {
            (Some(version), Some(ktb)) => Some(EncryptionData {
                version: version.to_string(),
                ktb: ktb.to_string(),
            }),
            _ => None,
        };
        let original = match msg.get(FieldId::OriginalStan) {
            Some(_) => Some(OriginalTransaction {
                stan: msg.require_number(FieldId::OriginalStan)?,
                host_reference: msg
                    .get(FieldId::OriginalHostReference)
                    .map(str::to_string),
            }),
            None => None,
        };

        let request = TransactionRequest {
            r#type: transaction_type(msg.require(FieldId::TransactionCode)?)?,
            amount: Amount::from_minor_units(msg.require_number(FieldId::Amount)?)?,
            currency: msg.require(FieldId::Currency)?.to_string(),
            card,
            pin_block: msg.get(FieldId::PinBlock).map(str::to_string),
            cardholder_name: msg.get(FieldId::CardholderName).map(str::to_string),
            encryption_data,
            original,
        };
        Ok(HostRequest::Transaction { stan, request })
    }

    /// Encodes a host reply to a transaction.
    pub fn serialize_response(&self, response: &TransactionResponse) -> Result<Vec<u8>> {
        let message_type = Self::message_type(response.r#type)
            .response_type()
            .ok_or_else(|| GatewayError::Encoding("no response type".to_string()))?;

        let approved_minor = match response.approved_amount {
            Some(amount) => amount.to_minor_units()?,
            None => 0,
        };

        let mut msg = Message::new(message_type);
        msg.set(FieldId::TransactionCode, transaction_code(response.r#type))
            .set(FieldId::Stan, format!("{:06}", response.stan))
            .set(FieldId::ResponseCode, response.response_code.code())
            .set(FieldId::Amount, approved_minor.to_string())
            .set_opt(FieldId::ResponseMessage, response.response_message.as_ref())
            .set_opt(FieldId::HostReference, response.host_reference.as_ref())
            .set_opt(FieldId::CardToken, response.card_token.as_ref());
        encode_message(&msg, &self.envelope)
    }

    /// Encodes a host reply to a batch close.
    pub fn serialize_batch_close_response(&self, response: &BatchCloseResponse) -> Result<Vec<u8>> {
        let mut msg = Message::new(MessageType::ReconciliationResponse);
        msg.set(FieldId::Stan, format!("{:06}", response.stan))
            .set(FieldId::ResponseCode, &response.totals.response_code)
            .set(FieldId::BatchNumber, response.batch_number.to_string())
            .set(
                FieldId::TransactionCount,
                response.totals.transaction_count.to_string(),
            );
        set_total(&mut msg, response.totals.total_amount)?;
        encode_message(&msg, &self.envelope)
    }
}

fn transaction_code(r#type: TransactionType) -> &'static str {
    match r#type {
        TransactionType::Authorization => "AU",
        TransactionType::Sale => "SA",
        TransactionType::Refund => "RF",
        TransactionType::Void => "VD",
        TransactionType::Reversal => "RV",
    }
}

fn transaction_type(code: &str) -> Result<TransactionType> {
    match code {
        "AU" => Ok(TransactionType::Authorization),
        "SA" => Ok(TransactionType::Sale),
        "RF" => Ok(TransactionType::Refund),
        "VD" => Ok(TransactionType::Void),
        "RV" => Ok(TransactionType::Reversal),
        other => Err(GatewayError::Encoding(format!(
            "unknown transaction code {:?}",
            other
        ))),
    }
}

fn set_total(msg: &mut Message, total: Balance) -> Result<()> {
    let minor = total.to_minor_units()?;
    msg.set(FieldId::TotalSign, if minor < 0 { "-" } else { "+" })
        .set(FieldId::TotalAmount, minor.unsigned_abs().to_string());
    Ok(())
}

fn read_total(msg: &Message) -> Result<Balance> {
    let minor: i64 = msg.require_number(FieldId::TotalAmount)?;
    match msg.require(FieldId::TotalSign)? {
        "+" => Ok(Balance::from_minor_units(minor)),
        "-" => Ok(Balance::from_minor_units(-minor)),
        other => Err(GatewayError::Encoding(format!(
            "invalid total sign {:?}",
            other
        ))),
    }
}

fn validate_request(request: &TransactionRequest) -> Result<()> {
    if request.currency.len() != 3 || !request.currency.bytes().all(|b| b.is_ascii_uppercase()) {
        return Err(GatewayError::Validation(format!(
            "currency must be a three-letter ISO code, got {:?}",
            request.currency
        )));
    }
    if request.r#type.requires_original() && request.original.is_none() {
        return Err(GatewayError::Validation(format!(
            "{} requires the original transaction reference",
            request.r#type
        )));
    }
    if let CardData::Manual { number, expiry, .. } = &request.card {
        if !(12..=19).contains(&number.len()) || !number.bytes().all(|b| b.is_ascii_digit()) {
            return Err(GatewayError::Validation(
                "card number must be 12 to 19 digits".to_string(),
            ));
        }
        if expiry.len() != 4 || !expiry.bytes().all(|b| b.is_ascii_digit()) {
            return Err(GatewayError::Validation(
                "expiry must be YYMM".to_string(),
            ));
        }
    }
    Ok(())
}
