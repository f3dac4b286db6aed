use super::amount::{Amount, Balance};
use crate::protocol::envelope::EncryptionData;
use serde::Deserialize;
use std::fmt;

#[derive(Debug, Deserialize, PartialEq, Eq, Clone, Copy)]
#[serde(rename_all = "lowercase")]
pub enum TransactionType {
    Authorization,
    Sale,
    Refund,
    Void,
    Reversal,
}

impl TransactionType {
    /// Effect on the open batch total: `Some(1)` adds, `Some(-1)` subtracts,
    /// `None` means the transaction does not settle.
    pub fn settlement_sign(&self) -> Option<i8> {
        match self {
            TransactionType::Sale => Some(1),
            TransactionType::Refund => Some(-1),
            TransactionType::Authorization | TransactionType::Void | TransactionType::Reversal => {
                None
            }
        }
    }

    pub fn requires_original(&self) -> bool {
        matches!(self, TransactionType::Void | TransactionType::Reversal)
    }
}

impl fmt::Display for TransactionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TransactionType::Authorization => "authorization",
            TransactionType::Sale => "sale",
            TransactionType::Refund => "refund",
            TransactionType::Void => "void",
            TransactionType::Reversal => "reversal",
        };
        f.write_str(name)
    }
}

/// Card data as captured by the terminal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CardData {
    Manual {
        number: String,
        /// `YYMM`
        expiry: String,
        cvn: Option<String>,
    },
    Track {
        value: String,
    },
}

/// Reference to an earlier transaction being voided or reversed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OriginalTransaction {
    pub stan: u32,
    pub host_reference: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TransactionRequest {
    pub r#type: TransactionType,
    pub amount: Amount,
    /// ISO 4217 alphabetic code.
    pub currency: String,
    pub card: CardData,
    pub pin_block: Option<String>,
    pub cardholder_name: Option<String>,
    pub encryption_data: Option<EncryptionData>,
    pub original: Option<OriginalTransaction>,
}

impl TransactionRequest {
    pub fn new(r#type: TransactionType, amount: Amount, card: CardData) -> Self {
        Self {
            r#type,
            amount,
            currency: "USD".to_string(),
            card,
            pin_block: None,
            cardholder_name: None,
            encryption_data: None,
            original: None,
        }
    }

    pub fn with_currency(mut self, currency: impl Into<String>) -> Self {
        self.currency = currency.into();
        self
    }

    pub fn with_pin_block(mut self, pin_block: impl Into<String>) -> Self {
        self.pin_block = Some(pin_block.into());
        self
    }

    pub fn with_cardholder_name(mut self, name: impl Into<String>) -> Self {
        self.cardholder_name = Some(name.into());
        self
    }

    pub fn with_encryption_data(mut self, data: EncryptionData) -> Self {
        self.encryption_data = Some(data);
        self
    }

    pub fn with_original(mut self, original: OriginalTransaction) -> Self {
        self.original = Some(original);
        self
    }

    /// Void or reversal of this request, referencing the host's answer to it.
    pub fn follow_up(&self, r#type: TransactionType, response: &TransactionResponse) -> Self {
        Self {
            r#type,
            original: Some(OriginalTransaction {
                stan: response.stan,
                host_reference: response.host_reference.clone(),
            }),
            ..self.clone()
        }
    }
}

/// Host action code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResponseCode {
    Approved,
    PartiallyApproved,
    DoNotHonour,
    ExpiredCard,
    PinTriesExceeded,
    InsufficientFunds,
    IncorrectPin,
    Accepted,
    ReconciledInBalance,
    ReconciledOutOfBalance,
    InvalidTransaction,
    FormatError,
    SystemMalfunction,
    IssuerUnavailable,
    /// Code outside the known table, kept verbatim for diagnostics.
    Unknown(String),
}

impl ResponseCode {
    pub fn from_code(code: &str) -> Self {
        match code {
            "000" => ResponseCode::Approved,
            "002" => ResponseCode::PartiallyApproved,
            "100" => ResponseCode::DoNotHonour,
            "101" => ResponseCode::ExpiredCard,
            "106" => ResponseCode::PinTriesExceeded,
            "116" => ResponseCode::InsufficientFunds,
            "117" => ResponseCode::IncorrectPin,
            "400" => ResponseCode::Accepted,
            "500" => ResponseCode::ReconciledInBalance,
            "501" => ResponseCode::ReconciledOutOfBalance,
            "902" => ResponseCode::InvalidTransaction,
            "904" => ResponseCode::FormatError,
            "909" => ResponseCode::SystemMalfunction,
            "911" => ResponseCode::IssuerUnavailable,
            other => ResponseCode::Unknown(other.to_string()),
        }
    }

    pub fn code(&self) -> &str {
        match self {
            ResponseCode::Approved => "000",
            ResponseCode::PartiallyApproved => "002",
            ResponseCode::DoNotHonour => "100",
            ResponseCode::ExpiredCard => "101",
            ResponseCode::PinTriesExceeded => "106",
            ResponseCode::InsufficientFunds => "116",
            ResponseCode::IncorrectPin => "117",
            ResponseCode::Accepted => "400",
            ResponseCode::ReconciledInBalance => "500",
            ResponseCode::ReconciledOutOfBalance => "501",
            ResponseCode::InvalidTransaction => "902",
            ResponseCode::FormatError => "904",
            ResponseCode::SystemMalfunction => "909",
            ResponseCode::IssuerUnavailable => "911",
            ResponseCode::Unknown(raw) => raw,
        }
    }

    pub fn is_approved(&self) -> bool {
        matches!(
            self,
            ResponseCode::Approved | ResponseCode::PartiallyApproved | ResponseCode::Accepted
        )
    }

    pub fn is_known(&self) -> bool {
        !matches!(self, ResponseCode::Unknown(_))
    }
}

impl fmt::Display for ResponseCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TransactionResponse {
    pub r#type: TransactionType,
    pub stan: u32,
    pub response_code: ResponseCode,
    pub response_message: Option<String>,
    pub host_reference: Option<String>,
    pub approved_amount: Option<Amount>,
    /// Card-on-file token, returned sealed and opened on receipt.
    pub card_token: Option<String>,
}

impl TransactionResponse {
    /// Signed amount this response contributes to the batch, if it settles.
    pub fn settled_amount(&self) -> Option<Balance> {
        if !self.response_code.is_approved() {
            return None;
        }
        let sign = self.r#type.settlement_sign()?;
        let amount = Balance::from(self.approved_amount?);
        Some(if sign < 0 { -amount } else { amount })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn response(r#type: TransactionType, code: &str) -> TransactionResponse {
        TransactionResponse {
            r#type,
            stan: 1,
            response_code: ResponseCode::from_code(code),
            response_message: None,
            host_reference: None,
            approved_amount: Some(Amount::new(dec!(10.00)).unwrap()),
            card_token: None,
        }
    }

    #[test]
    fn test_response_code_table() {
        assert_eq!(ResponseCode::from_code("000"), ResponseCode::Approved);
        assert_eq!(ResponseCode::from_code("400").code(), "400");
        let unknown = ResponseCode::from_code("7Z7");
        assert_eq!(unknown, ResponseCode::Unknown("7Z7".to_string()));
        assert_eq!(unknown.code(), "7Z7");
        assert!(!unknown.is_known());
        assert!(!unknown.is_approved());
    }

    #[test]
    fn test_settled_amount() {
        assert_eq!(
            response(TransactionType::Sale, "000").settled_amount(),
            Some(Balance::new(dec!(10.00)))
        );
        assert_eq!(
            response(TransactionType::Refund, "000").settled_amount(),
            Some(Balance::new(dec!(-10.00)))
        );
        assert_eq!(
            response(TransactionType::Authorization, "000").settled_amount(),
            None
        );
        assert_eq!(response(TransactionType::Sale, "100").settled_amount(), None);
    }

    #[test]
    fn test_transaction_type_deserialization() {
        let csv = "type\nsale\nrefund";
        let mut reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .from_reader(csv.as_bytes());
        let types: Vec<TransactionType> = reader
            .deserialize::<(TransactionType,)>()
            .map(|r| r.unwrap().0)
            .collect();
        assert_eq!(types, vec![TransactionType::Sale, TransactionType::Refund]);
    }
}
