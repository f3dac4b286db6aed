use crate::domain::amount::Amount;
use crate::domain::transaction::{CardData, OriginalTransaction, TransactionRequest, TransactionType};
use crate::error::{GatewayError, Result};
use crate::protocol::envelope::EncryptionData;
use serde::Deserialize;
use std::io::Read;

/// One row of the request file.
///
/// Manual entry uses `card_number`/`expiry`/`cvn`; swiped cards use `track`.
/// Voids and reversals reference the original through `original_stan`.
#[derive(Debug, Deserialize)]
pub struct TransactionRecord {
    pub r#type: TransactionType,
    pub amount: Amount,
    pub currency: Option<String>,
    pub card_number: Option<String>,
    pub expiry: Option<String>,
    pub cvn: Option<String>,
    pub track: Option<String>,
    pub pin_block: Option<String>,
    pub cardholder_name: Option<String>,
    pub ktb: Option<String>,
    pub original_stan: Option<u32>,
    pub original_reference: Option<String>,
}

impl TryFrom<TransactionRecord> for TransactionRequest {
    type Error = GatewayError;

    fn try_from(record: TransactionRecord) -> Result<Self> {
        let card = match (record.card_number, record.track) {
            (Some(number), None) => CardData::Manual {
                number,
                expiry: record.expiry.ok_or_else(|| {
                    GatewayError::Validation("manual entry requires an expiry".to_string())
                })?,
                cvn: record.cvn,
            },
            (None, Some(value)) => CardData::Track { value },
            _ => {
                return Err(GatewayError::Validation(
                    "exactly one of card_number or track is required".to_string(),
                ));
            }
        };

        let mut request = TransactionRequest::new(record.r#type, record.amount, card);
        if let Some(currency) = record.currency {
            request = request.with_currency(currency);
        }
        request.pin_block = record.pin_block;
        request.cardholder_name = record.cardholder_name;
        request.encryption_data = record.ktb.map(EncryptionData::version2);
        request.original = record.original_stan.map(|stan| OriginalTransaction {
            stan,
            host_reference: record.original_reference,
        });
        Ok(request)
    }
}

/// Reads transaction requests from a CSV source.
///
/// Whitespace around fields is trimmed and trailing columns may be omitted.
pub struct TransactionReader<R: Read> {
    reader: csv::Reader<R>,
}

impl<R: Read> TransactionReader<R> {
    pub fn new(source: R) -> Self {
        let reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .flexible(true)
            .from_reader(source);
        Self { reader }
    }

    /// Lazily reads and converts each row; a bad row does not stop the stream.
    pub fn transactions(self) -> impl Iterator<Item = Result<TransactionRequest>> {
        self.reader
            .into_deserialize::<TransactionRecord>()
            .map(|result| -> Result<TransactionRequest> { result?.try_into() })
    }
}
