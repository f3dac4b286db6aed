use crate::error::GatewayError;
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use serde::{Deserialize, Serialize};
use std::ops::{Add, AddAssign, Neg, Sub};

/// Currency exponent used for minor-unit encoding on the wire.
pub const MINOR_UNIT_SCALE: u32 = 2;

/// Largest amount the 12-digit wire field can carry, in minor units.
pub const MAX_MINOR_UNITS: u64 = 999_999_999_999;

/// Represents a positive transaction amount with at most two decimal places.
///
/// Equality ignores scale, so `15.6` and `15.60` compare equal.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize, Deserialize)]
#[serde(try_from = "Decimal", into = "Decimal")]
pub struct Amount(Decimal);

impl Amount {
    pub fn new(value: Decimal) -> Result<Self, GatewayError> {
        if value <= Decimal::ZERO {
            return Err(GatewayError::Validation(
                "Amount must be positive".to_string(),
            ));
        }
        if value.normalize().scale() > MINOR_UNIT_SCALE {
            return Err(GatewayError::Validation(format!(
                "Amount {} has more than {} decimal places",
                value, MINOR_UNIT_SCALE
            )));
        }
        if value > Decimal::new(MAX_MINOR_UNITS as i64, MINOR_UNIT_SCALE) {
            return Err(GatewayError::Validation(format!(
                "Amount {} exceeds the maximum of {} minor units",
                value, MAX_MINOR_UNITS
            )));
        }
        Ok(Self(value))
    }

    pub fn value(&self) -> Decimal {
        self.0
    }

    /// Amount in minor units (cents).
    pub fn to_minor_units(&self) -> Result<u64, GatewayError> {
        Ok(to_minor(self.0)?.unsigned_abs())
    }

    pub fn from_minor_units(units: u64) -> Result<Self, GatewayError> {
        if units > MAX_MINOR_UNITS {
            return Err(GatewayError::Validation(format!(
                "{} minor units exceeds the maximum of {}",
                units, MAX_MINOR_UNITS
            )));
        }
        Self::new(Decimal::new(units as i64, MINOR_UNIT_SCALE))
    }
}

impl TryFrom<Decimal> for Amount {
    type Error = GatewayError;

    fn try_from(value: Decimal) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Amount> for Decimal {
    fn from(amount: Amount) -> Self {
        amount.0
    }
}

/// Signed running total, e.g. the net of a batch.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Default, Serialize, Deserialize)]
pub struct Balance(pub Decimal);

impl Balance {
    pub const ZERO: Self = Self(Decimal::ZERO);

    pub fn new(amount: Decimal) -> Self {
        Self(amount)
    }

    pub fn to_minor_units(&self) -> Result<i64, GatewayError> {
        to_minor(self.0)
    }

    pub fn from_minor_units(units: i64) -> Self {
        Self(Decimal::new(units, MINOR_UNIT_SCALE))
    }
}

impl From<Amount> for Balance {
    fn from(amount: Amount) -> Self {
        Self(amount.0)
    }
}

impl Add for Balance {
    type Output = Self;
    fn add(self, rhs: Self) -> Self::Output {
        Self(self.0 + rhs.0)
    }
}

impl Sub for Balance {
    type Output = Self;
    fn sub(self, rhs: Self) -> Self::Output {
        Self(self.0 - rhs.0)
    }
}

impl AddAssign for Balance {
    fn add_assign(&mut self, rhs: Self) {
        self.0 += rhs.0;
    }
}

impl Neg for Balance {
    type Output = Self;
    fn neg(self) -> Self::Output {
        Self(-self.0)
    }
}

fn to_minor(value: Decimal) -> Result<i64, GatewayError> {
    value
        .checked_mul(Decimal::from(10u64.pow(MINOR_UNIT_SCALE)))
        .and_then(|scaled| scaled.trunc().to_i64())
        .ok_or_else(|| {
            GatewayError::Encoding(format!("{} does not fit in minor units", value))
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_amount_validation() {
        assert!(Amount::new(dec!(1.0)).is_ok());
        assert!(Amount::new(dec!(10.50)).is_ok());
        assert!(matches!(
            Amount::new(dec!(0.0)),
            Err(GatewayError::Validation(_))
        ));
        assert!(matches!(
            Amount::new(dec!(-1.0)),
            Err(GatewayError::Validation(_))
        ));
        assert!(matches!(
            Amount::new(dec!(1.005)),
            Err(GatewayError::Validation(_))
        ));
        // trailing zeros beyond the exponent are fine
        assert!(Amount::new(dec!(1.5000)).is_ok());
    }

    #[test]
    fn test_amount_equality_ignores_scale() {
        assert_eq!(
            Amount::new(dec!(15.6)).unwrap(),
            Amount::new(dec!(15.60)).unwrap()
        );
    }

    #[test]
    fn test_minor_units() {
        let amount = Amount::new(dec!(10.5)).unwrap();
        assert_eq!(amount.to_minor_units().unwrap(), 1050);
        assert_eq!(Amount::from_minor_units(1050).unwrap(), amount);
        assert!(Amount::from_minor_units(0).is_err());

        assert_eq!(Balance::new(dec!(-3.25)).to_minor_units().unwrap(), -325);
        assert_eq!(Balance::from_minor_units(-325), Balance::new(dec!(-3.25)));
    }

    #[test]
    fn test_amount_bounded_by_wire_width() {
        let max = Amount::new(dec!(9999999999.99)).unwrap();
        assert_eq!(max.to_minor_units().unwrap(), MAX_MINOR_UNITS);
        assert_eq!(Amount::from_minor_units(MAX_MINOR_UNITS).unwrap(), max);

        assert!(matches!(
            Amount::new(dec!(10000000000.00)),
            Err(GatewayError::Validation(_))
        ));
        assert!(Amount::from_minor_units(MAX_MINOR_UNITS + 1).is_err());
        // values that used to wrap around to a small amount
        assert!(Amount::new(dec!(184467440737095526.16)).is_err());
        assert!(Amount::new(dec!(792281625142643375935439503.35)).is_err());
    }

    #[test]
    fn test_balance_minor_units_overflow() {
        assert!(matches!(
            Balance::new(Decimal::MAX).to_minor_units(),
            Err(GatewayError::Encoding(_))
        ));
        assert!(Balance::new(dec!(184467440737095526.16)).to_minor_units().is_err());
    }

    #[test]
    fn test_balance_arithmetic() {
        let b1 = Balance::new(dec!(10.0));
        let b2 = Balance::new(dec!(5.0));
        assert_eq!(b1 + b2, Balance::new(dec!(15.0)));
        assert_eq!(b1 - b2, Balance::new(dec!(5.0)));
        assert_eq!(-b2, Balance::new(dec!(-5.0)));
    }
}
