//! Field layout of the network message payload.
//!
//! A payload is a run of fixed-width ASCII fields at constant offsets,
//! selected by the message type in the first four bytes, followed by any
//! number of variable fields:
//!
//! `[id: 2 digits][attribute: 1 digit][length: 3 digits][data]`
//!
//! An attribute of `1` marks data sealed by the encryption envelope. Every
//! field is described by a [`FieldKind`] and handled by the same
//! [`encode_message`] / [`decode_message`] pair.

use super::envelope::EncryptionEnvelope;
use super::frame::FrameReader;
use crate::error::{GatewayError, Result};
use tracing::warn;

const VARIABLE_ID_LEN: usize = 2;
const VARIABLE_LEN_DIGITS: usize = 3;
const MAX_VARIABLE_LEN: usize = 999;
const ATTR_CLEAR: u8 = b'0';
const ATTR_ENCRYPTED: u8 = b'1';

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FixedFormat {
    /// Digits only, zero-padded on the left.
    Numeric,
    /// Printable ASCII, space-padded on the right.
    Alphanumeric,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sensitivity {
    Cleartext,
    /// Sealed by the envelope whenever the envelope's scheme encrypts.
    Encrypted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Fixed { width: usize, format: FixedFormat },
    Variable { id: u8, sensitivity: Sensitivity },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FieldId {
    MessageType,
    TransactionCode,
    CompanyId,
    TerminalId,
    InputCapability,
    OutputCapability,
    SupportFlags,
    HardwareLevel,
    SoftwareLevel,
    Stan,
    Amount,
    Currency,
    ResponseCode,
    BatchNumber,
    TransactionCount,
    TotalSign,
    TotalAmount,
    Pan,
    Expiry,
    Cvn,
    Track,
    PinBlock,
    CardholderName,
    EncryptionScheme,
    EncryptionVersion,
    EncryptionKtb,
    OriginalStan,
    OriginalHostReference,
    ResponseMessage,
    HostReference,
    CardToken,
}

const VARIABLE_FIELDS: [FieldId; 14] = [
    FieldId::Pan,
    FieldId::Expiry,
    FieldId::Cvn,
    FieldId::Track,
    FieldId::PinBlock,
    FieldId::CardholderName,
    FieldId::EncryptionScheme,
    FieldId::EncryptionVersion,
    FieldId::EncryptionKtb,
    FieldId::OriginalStan,
    FieldId::OriginalHostReference,
    FieldId::ResponseMessage,
    FieldId::HostReference,
    FieldId::CardToken,
];

impl FieldId {
    pub fn kind(&self) -> FieldKind {
        use FixedFormat::*;
        use Sensitivity::*;

        let fixed = |width, format| FieldKind::Fixed { width, format };
        let variable = |id, sensitivity| FieldKind::Variable { id, sensitivity };
        match self {
            Self::MessageType => fixed(4, Numeric),
            Self::TransactionCode => fixed(2, Alphanumeric),
            Self::CompanyId => fixed(4, Alphanumeric),
            Self::TerminalId => fixed(15, Alphanumeric),
            Self::InputCapability => fixed(1, Alphanumeric),
            Self::OutputCapability => fixed(1, Alphanumeric),
            Self::SupportFlags => fixed(2, Alphanumeric),
            Self::HardwareLevel => fixed(2, Alphanumeric),
            Self::SoftwareLevel => fixed(8, Alphanumeric),
            Self::Stan => fixed(6, Numeric),
            Self::Amount => fixed(12, Numeric),
            Self::Currency => fixed(3, Alphanumeric),
            Self::ResponseCode => fixed(3, Alphanumeric),
            Self::BatchNumber => fixed(6, Numeric),
            Self::TransactionCount => fixed(6, Numeric),
            Self::TotalSign => fixed(1, Alphanumeric),
            Self::TotalAmount => fixed(12, Numeric),
            Self::Pan => variable(10, Encrypted),
            Self::Expiry => variable(11, Cleartext),
            Self::Cvn => variable(12, Encrypted),
            Self::Track => variable(13, Encrypted),
            Self::PinBlock => variable(14, Encrypted),
            Self::CardholderName => variable(15, Cleartext),
            Self::EncryptionScheme => variable(20, Cleartext),
            Self::EncryptionVersion => variable(21, Cleartext),
            Self::EncryptionKtb => variable(22, Cleartext),
            Self::OriginalStan => variable(30, Cleartext),
            Self::OriginalHostReference => variable(31, Cleartext),
            Self::ResponseMessage => variable(40, Cleartext),
            Self::HostReference => variable(41, Cleartext),
            Self::CardToken => variable(42, Encrypted),
        }
    }

    fn from_variable_id(wire_id: u8) -> Option<Self> {
        VARIABLE_FIELDS
            .into_iter()
            .find(|field| matches!(field.kind(), FieldKind::Variable { id, .. } if id == wire_id))
    }
}

/// Message type indicator carried in the first fixed field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageType {
    AuthorizationRequest,
    AuthorizationResponse,
    FinancialRequest,
    FinancialResponse,
    ReversalRequest,
    ReversalResponse,
    ReconciliationRequest,
    ReconciliationResponse,
}

const FINANCIAL_REQUEST_LAYOUT: &[FieldId] = &[
    FieldId::MessageType,
    FieldId::TransactionCode,
    FieldId::CompanyId,
    FieldId::TerminalId,
    FieldId::InputCapability,
    FieldId::OutputCapability,
    FieldId::SupportFlags,
    FieldId::HardwareLevel,
    FieldId::SoftwareLevel,
    FieldId::Stan,
    FieldId::Amount,
    FieldId::Currency,
];

const FINANCIAL_RESPONSE_LAYOUT: &[FieldId] = &[
    FieldId::MessageType,
    FieldId::TransactionCode,
    FieldId::Stan,
    FieldId::ResponseCode,
    FieldId::Amount,
];

const RECONCILIATION_REQUEST_LAYOUT: &[FieldId] = &[
    FieldId::MessageType,
    FieldId::CompanyId,
    FieldId::TerminalId,
    FieldId::Stan,
    FieldId::BatchNumber,
    FieldId::TransactionCount,
    FieldId::TotalSign,
    FieldId::TotalAmount,
];

const RECONCILIATION_RESPONSE_LAYOUT: &[FieldId] = &[
    FieldId::MessageType,
    FieldId::Stan,
    FieldId::ResponseCode,
    FieldId::BatchNumber,
    FieldId::TransactionCount,
    FieldId::TotalSign,
    FieldId::TotalAmount,
];

impl MessageType {
    pub fn code(&self) -> &'static str {
        match self {
            MessageType::AuthorizationRequest => "1100",
            MessageType::AuthorizationResponse => "1110",
            MessageType::FinancialRequest => "1200",
            MessageType::FinancialResponse => "1210",
            MessageType::ReversalRequest => "1420",
            MessageType::ReversalResponse => "1430",
            MessageType::ReconciliationRequest => "1520",
            MessageType::ReconciliationResponse => "1530",
        }
    }

    pub fn from_code(code: &str) -> Option<Self> {
        match code {
            "1100" => Some(MessageType::AuthorizationRequest),
            "1110" => Some(MessageType::AuthorizationResponse),
            "1200" => Some(MessageType::FinancialRequest),
            "1210" => Some(MessageType::FinancialResponse),
            "1420" => Some(MessageType::ReversalRequest),
            "1430" => Some(MessageType::ReversalResponse),
            "1520" => Some(MessageType::ReconciliationRequest),
            "1530" => Some(MessageType::ReconciliationResponse),
            _ => None,
        }
    }

    /// The message type a host answers this request with.
    pub fn response_type(&self) -> Option<Self> {
        match self {
            MessageType::AuthorizationRequest => Some(MessageType::AuthorizationResponse),
            MessageType::FinancialRequest => Some(MessageType::FinancialResponse),
            MessageType::ReversalRequest => Some(MessageType::ReversalResponse),
            MessageType::ReconciliationRequest => Some(MessageType::ReconciliationResponse),
            _ => None,
        }
    }

    pub fn layout(&self) -> &'static [FieldId] {
        match self {
            MessageType::AuthorizationRequest
            | MessageType::FinancialRequest
            | MessageType::ReversalRequest => FINANCIAL_REQUEST_LAYOUT,
            MessageType::AuthorizationResponse
            | MessageType::FinancialResponse
            | MessageType::ReversalResponse => FINANCIAL_RESPONSE_LAYOUT,
            MessageType::ReconciliationRequest => RECONCILIATION_REQUEST_LAYOUT,
            MessageType::ReconciliationResponse => RECONCILIATION_RESPONSE_LAYOUT,
        }
    }
}

/// Field values of one payload, in wire order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    message_type: MessageType,
    fields: Vec<(FieldId, String)>,
}

impl Message {
    pub fn new(message_type: MessageType) -> Self {
        Self {
            message_type,
            fields: vec![(FieldId::MessageType, message_type.code().to_string())],
        }
    }

    pub fn message_type(&self) -> MessageType {
        self.message_type
    }

    /// Sets a field, replacing any earlier value.
    pub fn set(&mut self, id: FieldId, value: impl Into<String>) -> &mut Self {
        let value = value.into();
        match self.fields.iter_mut().find(|(existing, _)| *existing == id) {
            Some(slot) => slot.1 = value,
            None => self.fields.push((id, value)),
        }
        self
    }

    pub fn set_opt(&mut self, id: FieldId, value: Option<impl Into<String>>) -> &mut Self {
        if let Some(value) = value {
            self.set(id, value);
        }
        self
    }

    pub fn get(&self, id: FieldId) -> Option<&str> {
        self.fields
            .iter()
            .find(|(existing, _)| *existing == id)
            .map(|(_, value)| value.as_str())
    }

    pub fn require(&self, id: FieldId) -> Result<&str> {
        self.get(id)
            .ok_or_else(|| GatewayError::Encoding(format!("missing field {:?}", id)))
    }

    pub fn require_number<T: std::str::FromStr>(&self, id: FieldId) -> Result<T> {
        let raw = self.require(id)?;
        raw.parse()
            .map_err(|_| GatewayError::Encoding(format!("field {:?} is not numeric: {:?}", id, raw)))
    }
}

/// Serializes `message`: its layout's fixed fields, then every variable field
/// it carries, sealing sensitive ones through `envelope`.
pub fn encode_message(message: &Message, envelope: &EncryptionEnvelope) -> Result<Vec<u8>> {
    let mut out = Vec::with_capacity(128);
    for id in message.message_type.layout() {
        write_field(&mut out, *id, message.require(*id)?, envelope)?;
    }
    for (id, value) in &message.fields {
        if matches!(id.kind(), FieldKind::Variable { .. }) {
            write_field(&mut out, *id, value, envelope)?;
        }
    }
    Ok(out)
}

/// Parses a payload produced by [`encode_message`], opening sealed fields.
///
/// Variable fields with an unrecognised id are skipped.
pub fn decode_message(payload: &[u8], envelope: &EncryptionEnvelope) -> Result<Message> {
    let mut reader = FrameReader::new(payload);
    let code = read_fixed(&mut reader, FieldId::MessageType)?;
    let message_type = MessageType::from_code(&code)
        .ok_or_else(|| GatewayError::Encoding(format!("unknown message type {:?}", code)))?;

    let mut message = Message::new(message_type);
    for id in message_type.layout().iter().skip(1) {
        let value = read_fixed(&mut reader, *id)?;
        message.set(*id, value);
    }

    while !reader.is_empty() {
        let wire_id: u8 = read_digits(&mut reader, VARIABLE_ID_LEN)? as u8;
        let attribute = reader
            .read_code()
            .ok_or_else(|| GatewayError::Encoding("truncated field attribute".to_string()))?;
        let len = read_digits(&mut reader, VARIABLE_LEN_DIGITS)? as usize;
        let data = ascii(reader.read_exact(len)?)?;

        let Some(id) = FieldId::from_variable_id(wire_id) else {
            warn!(field = wire_id, "skipping unrecognised variable field");
            continue;
        };
        let value = match attribute {
            ATTR_CLEAR => data,
            ATTR_ENCRYPTED if !envelope.scheme().is_encrypted() => {
                return Err(GatewayError::Decryption(format!(
                    "field {:?} is sealed but no encryption scheme is configured",
                    id
                )));
            }
            ATTR_ENCRYPTED => envelope.open_field(&data)?,
            other => {
                return Err(GatewayError::Encoding(format!(
                    "invalid attribute {:#04x} on field {:?}",
                    other, id
                )));
            }
        };
        message.set(id, value);
    }

    Ok(message)
}

fn write_field(
    out: &mut Vec<u8>,
    id: FieldId,
    value: &str,
    envelope: &EncryptionEnvelope,
) -> Result<()> {
    match id.kind() {
        FieldKind::Fixed { width, format } => {
            check_printable(id, value)?;
            if value.len() > width {
                return Err(GatewayError::Encoding(format!(
                    "field {:?} value {:?} exceeds {} characters",
                    id, value, width
                )));
            }
            let padded = match format {
                FixedFormat::Numeric => {
                    if !value.bytes().all(|b| b.is_ascii_digit()) {
                        return Err(GatewayError::Encoding(format!(
                            "field {:?} must be numeric, got {:?}",
                            id, value
                        )));
                    }
                    format!("{:0>width$}", value, width = width)
                }
                FixedFormat::Alphanumeric => format!("{:<width$}", value, width = width),
            };
            out.extend_from_slice(padded.as_bytes());
        }
        FieldKind::Variable { id: wire_id, sensitivity } => {
            check_printable(id, value)?;
            let seal = sensitivity == Sensitivity::Encrypted && envelope.scheme().is_encrypted();
            let data = if seal {
                envelope.seal_field(value)?
            } else {
                value.to_string()
            };
            if data.len() > MAX_VARIABLE_LEN {
                return Err(GatewayError::Encoding(format!(
                    "field {:?} is {} bytes, limit is {}",
                    id,
                    data.len(),
                    MAX_VARIABLE_LEN
                )));
            }
            out.extend_from_slice(format!("{:02}", wire_id).as_bytes());
            out.push(if seal { ATTR_ENCRYPTED } else { ATTR_CLEAR });
            out.extend_from_slice(format!("{:03}", data.len()).as_bytes());
            out.extend_from_slice(data.as_bytes());
        }
    }
    Ok(())
}

fn read_fixed(reader: &mut FrameReader<'_>, id: FieldId) -> Result<String> {
    let FieldKind::Fixed { width, format } = id.kind() else {
        return Err(GatewayError::Encoding(format!(
            "field {:?} is not fixed-width",
            id
        )));
    };
    let raw = ascii(reader.read_exact(width)?)?;
    match format {
        FixedFormat::Numeric => {
            if !raw.bytes().all(|b| b.is_ascii_digit()) {
                return Err(GatewayError::Encoding(format!(
                    "field {:?} must be numeric, got {:?}",
                    id, raw
                )));
            }
            Ok(raw)
        }
        FixedFormat::Alphanumeric => Ok(raw.trim_end_matches(' ').to_string()),
    }
}

fn read_digits(reader: &mut FrameReader<'_>, len: usize) -> Result<u32> {
    let raw = ascii(reader.read_exact(len)?)?;
    raw.parse()
        .map_err(|_| GatewayError::Encoding(format!("expected {} digits, got {:?}", len, raw)))
}

fn ascii(bytes: &[u8]) -> Result<String> {
    if !bytes.is_ascii() {
        return Err(GatewayError::Encoding("non-ASCII bytes in payload".to_string()));
    }
    Ok(String::from_utf8_lossy(bytes).into_owned())
}

// Control codes would collide with the frame markers.
fn check_printable(id: FieldId, value: &str) -> Result<()> {
    if value.bytes().any(|b| !(0x20..0x7F).contains(&b)) {
        return Err(GatewayError::Encoding(format!(
            "field {:?} contains non-printable characters",
            id
        )));
    }
    Ok(())
}
