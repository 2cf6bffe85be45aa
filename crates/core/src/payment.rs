//! Payment card helpers for the checkout form.
//!
//! Card details are classified and validated only. Nothing here stores or
//! charges a card; the order keeps just the brand name as its payment method.

use core::fmt;

use serde::{Deserialize, Serialize};

/// Card network, detected from the number prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CardBrand {
    Visa,
    Mastercard,
    Amex,
    Discover,
    Unknown,
}

impl CardBrand {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Visa => "visa",
            Self::Mastercard => "mastercard",
            Self::Amex => "amex",
            Self::Discover => "discover",
            Self::Unknown => "unknown",
        }
    }

    /// Digit group sizes used when displaying a number of this brand.
    #[must_use]
    pub const fn groups(&self) -> &'static [usize] {
        match self {
            Self::Amex => &[4, 6, 5],
            _ => &[4, 4, 4, 4],
        }
    }

    /// Expected card verification code length.
    #[must_use]
    pub const fn cvc_len(&self) -> usize {
        match self {
            Self::Amex => 4,
            _ => 3,
        }
    }
}

impl fmt::Display for CardBrand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

fn digits(input: &str) -> String {
    input.chars().filter(char::is_ascii_digit).collect()
}

fn prefix_in(digits: &str, len: usize, range: std::ops::RangeInclusive<u32>) -> bool {
    digits
        .get(..len)
        .and_then(|p| p.parse::<u32>().ok())
        .is_some_and(|p| range.contains(&p))
}

/// Detect the card brand from a (possibly formatted) card number.
///
/// ```
/// use shopkeep_core::payment::{card_brand, CardBrand};
///
/// assert_eq!(card_brand("4111 1111 1111 1111"), CardBrand::Visa);
/// assert_eq!(card_brand("9999"), CardBrand::Unknown);
/// ```
#[must_use]
pub fn card_brand(number: &str) -> CardBrand {
    let digits = digits(number);

    if digits.starts_with('4') {
        CardBrand::Visa
    } else if prefix_in(&digits, 2, 51..=55) || prefix_in(&digits, 2, 22..=27) {
        CardBrand::Mastercard
    } else if digits.starts_with("34") || digits.starts_with("37") {
        CardBrand::Amex
    } else if digits.starts_with("6011") || digits.starts_with("65") {
        CardBrand::Discover
    } else {
        CardBrand::Unknown
    }
}

/// Format a card number for display as the user types.
///
/// Non-digits are dropped, digits are grouped 4-6-5 for amex and 4-4-4-4
/// otherwise, and anything past the last group is discarded.
#[must_use]
pub fn format_card_number(input: &str) -> String {
    let digits = digits(input);
    let groups = card_brand(&digits).groups();

    let mut parts = Vec::with_capacity(groups.len());
    let mut rest = digits.as_str();
    for &size in groups {
        if rest.is_empty() {
            break;
        }
        let (head, tail) = rest.split_at(size.min(rest.len()));
        parts.push(head);
        rest = tail;
    }
    parts.join(" ")
}

/// Format a card expiry as `MM/YY`.
///
/// With two or more digits, a month above 12 is clamped to `12` and a `/`
/// separates the month from the remaining digits. Shorter input is returned
/// as typed (digits only).
#[must_use]
pub fn format_expiry(input: &str) -> String {
    let digits = digits(input);
    if digits.len() < 2 {
        return digits;
    }

    let (month, rest) = digits.split_at(2);
    let month = if month.parse::<u32>().is_ok_and(|m| m > 12) {
        "12"
    } else {
        month
    };

    if rest.is_empty() {
        month.to_owned()
    } else {
        format!("{month}/{rest}")
    }
}

/// Luhn checksum over the digits of `number`.
#[must_use]
pub fn luhn_valid(number: &str) -> bool {
    let digits = digits(number);
    if digits.len() < 12 {
        return false;
    }

    let sum: u32 = digits
        .bytes()
        .rev()
        .map(|b| u32::from(b - b'0'))
        .enumerate()
        .map(|(i, d)| {
            if i % 2 == 1 {
                let doubled = d * 2;
                if doubled > 9 { doubled - 9 } else { doubled }
            } else {
                d
            }
        })
        .sum();

    sum % 10 == 0
}

/// Errors returned by [`validate_card`].
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum CardError {
    #[error("card number is invalid")]
    InvalidNumber,
    #[error("card type is not supported")]
    UnsupportedBrand,
    #[error("expiry date must be MM/YY")]
    InvalidExpiry,
    #[error("security code is invalid")]
    InvalidCvc,
}

/// Payment method recorded on an order: the card brand, never the number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PaymentMethod(CardBrand);

impl PaymentMethod {
    #[must_use]
    pub const fn brand(&self) -> CardBrand {
        self.0
    }

    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        self.0.as_str()
    }
}

impl fmt::Display for PaymentMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Validate checkout card fields.
///
/// # Errors
///
/// Returns a `CardError` for an unknown brand, a number with more digits than
/// its brand's groups hold, a failed Luhn check, an expiry that is not `MM/YY`
/// with a month in 1..=12, or a CVC of the wrong length.
pub fn validate_card(number: &str, expiry: &str, cvc: &str) -> Result<PaymentMethod, CardError> {
    let brand = card_brand(number);
    if brand == CardBrand::Unknown {
        return Err(CardError::UnsupportedBrand);
    }
    // The form shows at most what `format_card_number` keeps.
    if digits(&format_card_number(number)).len() != digits(number).len() {
        return Err(CardError::InvalidNumber);
    }
    if !luhn_valid(number) {
        return Err(CardError::InvalidNumber);
    }

    let expiry = format_expiry(expiry);
    let valid_expiry = expiry.split_once('/').is_some_and(|(month, year)| {
        month.parse::<u32>().is_ok_and(|m| (1..=12).contains(&m))
            && year.len() == 2
    });
    if !valid_expiry {
        return Err(CardError::InvalidExpiry);
    }

    let cvc = cvc.trim();
    if cvc.len() != brand.cvc_len() || !cvc.bytes().all(|b| b.is_ascii_digit()) {
        return Err(CardError::InvalidCvc);
    }

    Ok(PaymentMethod(brand))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_card_brand_detection() {
        assert_eq!(card_brand("4111111111111111"), CardBrand::Visa);
        assert_eq!(card_brand("5500000000000004"), CardBrand::Mastercard);
        assert_eq!(card_brand("2221000000000009"), CardBrand::Mastercard);
        assert_eq!(card_brand("340000000000009"), CardBrand::Amex);
        assert_eq!(card_brand("3700 000000 00002"), CardBrand::Amex);
        assert_eq!(card_brand("6011000000000004"), CardBrand::Discover);
        assert_eq!(card_brand("6500000000000002"), CardBrand::Discover);
        assert_eq!(card_brand("5600000000000000"), CardBrand::Unknown);
        assert_eq!(card_brand("2800000000000000"), CardBrand::Unknown);
        assert_eq!(card_brand(""), CardBrand::Unknown);
    }

    #[test]
    fn test_format_card_number_groups() {
        assert_eq!(format_card_number("4111111111111111"), "4111 1111 1111 1111");
        assert_eq!(format_card_number("340000000000009"), "3400 000000 00009");
        assert_eq!(format_card_number("4111-1111"), "4111 1111");
        assert_eq!(format_card_number("41111111111111119999"), "4111 1111 1111 1111");
        assert_eq!(format_card_number("abc"), "");
    }

    #[test]
    fn test_format_expiry() {
        assert_eq!(format_expiry("13"), "12");
        assert_eq!(format_expiry("0125"), "01/25");
        assert_eq!(format_expiry("1"), "1");
        assert_eq!(format_expiry("99/30"), "12/30");
        assert_eq!(format_expiry("07"), "07");
    }

    #[test]
    fn test_luhn() {
        assert!(luhn_valid("4111 1111 1111 1111"));
        assert!(luhn_valid("340000000000009"));
        assert!(!luhn_valid("4111111111111112"));
        assert!(!luhn_valid("4242"));
    }

    #[test]
    fn test_validate_card() {
        let method = validate_card("4111111111111111", "12/30", "123").unwrap();
        assert_eq!(method.as_str(), "visa");

        let amex = validate_card("340000000000009", "0129", "1234").unwrap();
        assert_eq!(amex.brand(), CardBrand::Amex);

        assert_eq!(
            validate_card("9999999999999995", "12/30", "123"),
            Err(CardError::UnsupportedBrand)
        );
        assert_eq!(
            validate_card("4111111111111112", "12/30", "123"),
            Err(CardError::InvalidNumber)
        );
        assert_eq!(
            validate_card("4111 1111 1111 1111 1", "12/30", "123"),
            Err(CardError::InvalidNumber)
        );
        assert_eq!(
            validate_card("3400 000000 00009 0", "12/30", "1234"),
            Err(CardError::InvalidNumber)
        );
        assert_eq!(
            validate_card("4111111111111111", "00/30", "123"),
            Err(CardError::InvalidExpiry)
        );
        assert_eq!(
            validate_card("4111111111111111", "12/30", "12"),
            Err(CardError::InvalidCvc)
        );
    }
}
