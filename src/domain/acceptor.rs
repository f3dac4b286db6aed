use crate::error::GatewayError;
use crate::protocol::envelope::EncryptionScheme;
use serde::Deserialize;

/// How the terminal can read card data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CardDataInputCapability {
    Unknown,
    KeyEntry,
    MagStripe,
    MagStripeKeyEntry,
    ContactEmv,
    #[default]
    ContactEmvContactlessMsdMagStripeKeyEntry,
    ContactlessEmv,
}

impl CardDataInputCapability {
    pub fn code(&self) -> char {
        match self {
            CardDataInputCapability::Unknown => '0',
            CardDataInputCapability::KeyEntry => '1',
            CardDataInputCapability::MagStripe => '2',
            CardDataInputCapability::MagStripeKeyEntry => '3',
            CardDataInputCapability::ContactEmv => '4',
            CardDataInputCapability::ContactEmvContactlessMsdMagStripeKeyEntry => '5',
            CardDataInputCapability::ContactlessEmv => '6',
        }
    }
}

/// What the terminal can present to the cardholder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TerminalOutputCapability {
    None,
    Printing,
    Display,
    #[default]
    PrintingDisplay,
}

impl TerminalOutputCapability {
    pub fn code(&self) -> char {
        match self {
            TerminalOutputCapability::None => '0',
            TerminalOutputCapability::Printing => '1',
            TerminalOutputCapability::Display => '2',
            TerminalOutputCapability::PrintingDisplay => '3',
        }
    }
}

/// Terminal capability profile sent with every financial request.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct AcceptorConfig {
    pub card_data_input_capability: CardDataInputCapability,
    pub terminal_output_capability: TerminalOutputCapability,
    pub hardware_level: String,
    pub software_level: String,
    pub supports_partial_approval: bool,
    pub supports_shut_off_amount: bool,
    pub supports_return_balance: bool,
    pub supports_avs_cvn_void_referrals: bool,
    pub supports_network_reference_id: bool,
    pub supported_encryption: EncryptionScheme,
}

impl Default for AcceptorConfig {
    fn default() -> Self {
        Self {
            card_data_input_capability: CardDataInputCapability::default(),
            terminal_output_capability: TerminalOutputCapability::default(),
            hardware_level: "00".to_string(),
            software_level: "00000000".to_string(),
            supports_partial_approval: false,
            supports_shut_off_amount: false,
            supports_return_balance: false,
            supports_avs_cvn_void_referrals: false,
            supports_network_reference_id: false,
            supported_encryption: EncryptionScheme::None,
        }
    }
}

impl AcceptorConfig {
    pub const HARDWARE_LEVEL_LEN: usize = 2;
    pub const SOFTWARE_LEVEL_LEN: usize = 8;

    pub fn validate(&self) -> Result<(), GatewayError> {
        check_level("hardware_level", &self.hardware_level, Self::HARDWARE_LEVEL_LEN)?;
        check_level("software_level", &self.software_level, Self::SOFTWARE_LEVEL_LEN)
    }

    /// Support flags packed as a bitmap, in declaration order.
    pub fn support_flags(&self) -> u8 {
        [
            self.supports_partial_approval,
            self.supports_shut_off_amount,
            self.supports_return_balance,
            self.supports_avs_cvn_void_referrals,
            self.supports_network_reference_id,
        ]
        .iter()
        .enumerate()
        .fold(0u8, |acc, (bit, set)| if *set { acc | (1 << bit) } else { acc })
    }
}

fn check_level(name: &str, value: &str, max: usize) -> Result<(), GatewayError> {
    if value.is_empty() || value.len() > max || !value.bytes().all(|b| b.is_ascii_graphic()) {
        return Err(GatewayError::Config(format!(
            "acceptor {} must be 1 to {} printable characters, got {:?}",
            name, max, value
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_support_flags_bitmap() {
        let mut acceptor = AcceptorConfig::default();
        assert_eq!(acceptor.support_flags(), 0);

        acceptor.supports_partial_approval = true;
        acceptor.supports_network_reference_id = true;
        assert_eq!(acceptor.support_flags(), 0b1_0001);
    }

    #[test]
    fn test_level_validation() {
        let mut acceptor = AcceptorConfig {
            hardware_level: "34".to_string(),
            software_level: "21205710".to_string(),
            ..Default::default()
        };
        assert!(acceptor.validate().is_ok());

        acceptor.software_level = "212057101".to_string();
        assert!(matches!(acceptor.validate(), Err(GatewayError::Config(_))));

        acceptor.software_level = String::new();
        assert!(acceptor.validate().is_err());

        // a control code would terminate the frame early
        acceptor.software_level = "2120\u{3}".to_string();
        assert!(matches!(acceptor.validate(), Err(GatewayError::Config(_))));

        acceptor.software_level = "21205710".to_string();
        acceptor.hardware_level = "3 ".to_string();
        assert!(acceptor.validate().is_err());
    }

    #[test]
    fn test_capability_from_toml() {
        let acceptor: AcceptorConfig = toml::from_str(
            r#"
            card_data_input_capability = "mag_stripe_key_entry"
            terminal_output_capability = "display"
            hardware_level = "34"
            supported_encryption = "tep2"
            "#,
        )
        .unwrap();
        assert_eq!(acceptor.card_data_input_capability.code(), '3');
        assert_eq!(acceptor.terminal_output_capability.code(), '2');
        assert_eq!(acceptor.supported_encryption, EncryptionScheme::Tep2);
        assert_eq!(acceptor.software_level, "00000000");
    }
}
