//! Shipping address captured at checkout.

use serde::{Deserialize, Serialize};

/// Errors returned by [`ShippingAddress::validate`].
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum AddressError {
    /// A required field is blank.
    #[error("{0} is required")]
    Missing(&'static str),
}

/// A US-style postal address. Every field is required.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShippingAddress {
    pub street: String,
    pub city: String,
    pub state: String,
    pub zip: String,
}

impl ShippingAddress {
    /// Trim every field and reject blank ones.
    ///
    /// # Errors
    ///
    /// Returns `AddressError::Missing` naming the first blank field.
    pub fn validate(self) -> Result<Self, AddressError> {
        let address = Self {
            street: self.street.trim().to_owned(),
            city: self.city.trim().to_owned(),
            state: self.state.trim().to_owned(),
            zip: self.zip.trim().to_owned(),
        };

        for (field, value) in [
            ("street", &address.street),
            ("city", &address.city),
            ("state", &address.state),
            ("zip", &address.zip),
        ] {
            if value.is_empty() {
                return Err(AddressError::Missing(field));
            }
        }

        Ok(address)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn address() -> ShippingAddress {
        ShippingAddress {
            street: " 1 Main St ".to_owned(),
            city: "Springfield".to_owned(),
            state: "IL".to_owned(),
            zip: "62701".to_owned(),
        }
    }

    #[test]
    fn test_validate_trims_fields() {
        let valid = address().validate().unwrap();
        assert_eq!(valid.street, "1 Main St");
    }

    #[test]
    fn test_validate_names_blank_field() {
        let mut blank = address();
        blank.city = "   ".to_owned();
        assert_eq!(blank.validate(), Err(AddressError::Missing("city")));
    }
}
