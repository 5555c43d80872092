//! Validation of transfer amounts received as text.

use crate::errors::LedgerError;
use rust_decimal::Decimal;
use std::fmt;
use std::ops::Deref;

/// Most digits a whole number can have and still fit in a `Decimal`.
const MAX_INTEGER_DIGITS: usize = 29;

/// A transfer amount that is known to be a positive whole number of tokens.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Amount(Decimal);

impl Amount {
    pub fn value(&self) -> Decimal {
        self.0
    }
}

impl Deref for Amount {
    type Target = Decimal;
    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl From<Amount> for Decimal {
    fn from(this: Amount) -> Self {
        this.0
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.normalize())
    }
}

impl TryFrom<Decimal> for Amount {
    type Error = LedgerError;

    fn try_from(value: Decimal) -> Result<Self, Self::Error> {
        if value <= Decimal::ZERO {
            return Err(LedgerError::NotPositive);
        }
        if !value.fract().is_zero() {
            return Err(LedgerError::NotInteger);
        }
        Ok(Self(value))
    }
}

/// A number in plain or scientific notation, reduced to its significant
/// digits so that `value = digits * 10^exponent`.
struct DecimalText {
    negative: bool,
    digits: String,
    exponent: i64,
}

impl DecimalText {
    /// Accepts `[+-]digits[.digits][(e|E)[+-]digits]` and nothing else.
    fn split(text: &str) -> Option<Self> {
        let (negative, unsigned) = match text.as_bytes().first() {
            Some(b'-') => (true, &text[1..]),
            Some(b'+') => (false, &text[1..]),
            _ => (false, text),
        };
        let (mantissa, exponent) = match unsigned.split_once(['e', 'E']) {
            Some((mantissa, exponent)) => (mantissa, exponent.parse::<i64>().ok()?),
            None => (unsigned, 0),
        };
        let (whole, fraction) = mantissa.split_once('.').unwrap_or((mantissa, ""));
        let is_digits = |part: &str| part.bytes().all(|b| b.is_ascii_digit());
        if (whole.is_empty() && fraction.is_empty()) || !is_digits(whole) || !is_digits(fraction) {
            return None;
        }

        let all = format!("{whole}{fraction}");
        let significant = all.trim_start_matches('0');
        let digits = significant.trim_end_matches('0');
        let exponent = if digits.is_empty() {
            0
        } else {
            exponent
                .checked_sub(fraction.len() as i64)?
                .checked_add((significant.len() - digits.len()) as i64)?
        };

        Some(Self {
            negative,
            digits: digits.to_string(),
            exponent,
        })
    }

    fn is_integer(&self) -> bool {
        self.exponent >= 0
    }

    /// Exact value of a whole number, `None` when it does not fit a `Decimal`.
    fn to_integer(&self) -> Option<Decimal> {
        if self.digits.is_empty() {
            return Some(Decimal::ZERO);
        }
        let zeros = usize::try_from(self.exponent).ok()?;
        if self.digits.len().saturating_add(zeros) > MAX_INTEGER_DIGITS {
            return None;
        }
        let magnitude = Decimal::from_str_exact(&format!("{}{}", self.digits, "0".repeat(zeros))).ok()?;
        Some(if self.negative { -magnitude } else { magnitude })
    }
}

/// Parse and validate an amount from its exact decimal text.
///
/// Checks run in a fixed order: format, then sign, then integrality, so
/// `"-0.5"` reports [`LedgerError::NotPositive`]. Nothing is rounded: a
/// fractional digit anywhere, however far past the point, makes the amount
/// a non-integer.
pub fn parse_amount(text: &str) -> Result<Amount, LedgerError> {
    let number = DecimalText::split(text).ok_or_else(|| LedgerError::InvalidFormat(text.to_string()))?;

    if !number.is_integer() {
        return Err(if number.negative {
            LedgerError::NotPositive
        } else {
            LedgerError::NotInteger
        });
    }
    let value = number
        .to_integer()
        .ok_or_else(|| LedgerError::AmountOutOfRange(text.to_string()))?;
    Amount::try_from(value)
}
