//! Mobile-money phone number normalization.
//!
//! Numbers are accepted in local form (trunk prefix followed by the
//! subscriber number) or international form (country calling code followed
//! by the subscriber number) and always come out in international form
//! without a leading `+`.

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid phone number: {0:?}")]
pub struct InvalidPhoneNumber(pub String);

/// Country-specific digit pattern for a mobile-money market.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PhoneNumberRules {
    /// Calling code without `+`, e.g. `"233"`.
    pub country_code: String,
    /// National trunk prefix, e.g. `"0"`.
    pub trunk_prefix: String,
    /// Digits after the trunk prefix or calling code.
    pub subscriber_digits: usize,
}

impl Default for PhoneNumberRules {
    /// Ghana.
    fn default() -> Self {
        Self {
            country_code: "233".to_string(),
            trunk_prefix: "0".to_string(),
            subscriber_digits: 9,
        }
    }
}

impl PhoneNumberRules {
    pub fn normalize(&self, raw: &str) -> Result<String, InvalidPhoneNumber> {
        let digits: String = raw
            .chars()
            .filter(|c| !c.is_whitespace() && *c != '-' && *c != '+')
            .collect();
        let invalid = || InvalidPhoneNumber(raw.to_string());

        if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_digit()) {
            return Err(invalid());
        }

        let fits = |subscriber: &&str| subscriber.len() == self.subscriber_digits;

        if digits
            .strip_prefix(self.country_code.as_str())
            .filter(fits)
            .is_some()
        {
            return Ok(digits);
        }

        match digits.strip_prefix(self.trunk_prefix.as_str()).filter(fits) {
            Some(subscriber) => Ok(format!("{}{}", self.country_code, subscriber)),
            None => Err(invalid()),
        }
    }
}
