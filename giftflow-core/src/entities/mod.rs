pub mod donation;

use giftflow_sdk::objects::{
    Currency as SdkCurrency, DonationState as SdkDonationState,
    PaymentProvider as SdkPaymentProvider,
};
use rust_decimal::Decimal;

/// Donation state for database operations.
///
/// This is the sqlx::Type version. For API/DTO use, see `giftflow_sdk::objects::DonationState`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, sqlx::Type)]
#[sqlx(rename_all = "lowercase", type_name = "donation_state")]
pub enum DonationState {
    Pending,
    Paid,
    Cancelled,
    Failed,
}

impl DonationState {
    /// `paid`, `cancelled` and `failed` have no outgoing transitions.
    pub fn is_terminal(self) -> bool {
        !matches!(self, DonationState::Pending)
    }
}

impl std::fmt::Display for DonationState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", SdkDonationState::from(*self))
    }
}

impl From<DonationState> for SdkDonationState {
    fn from(value: DonationState) -> Self {
        match value {
            DonationState::Pending => SdkDonationState::Pending,
            DonationState::Paid => SdkDonationState::Paid,
            DonationState::Cancelled => SdkDonationState::Cancelled,
            DonationState::Failed => SdkDonationState::Failed,
        }
    }
}

impl From<SdkDonationState> for DonationState {
    fn from(value: SdkDonationState) -> Self {
        match value {
            SdkDonationState::Pending => DonationState::Pending,
            SdkDonationState::Paid => DonationState::Paid,
            SdkDonationState::Cancelled => DonationState::Cancelled,
            SdkDonationState::Failed => DonationState::Failed,
        }
    }
}

/// Currency for database operations.
///
/// This is the sqlx::Type version. For API/DTO use, see `giftflow_sdk::objects::Currency`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, sqlx::Type)]
#[sqlx(rename_all = "UPPERCASE", type_name = "currency_code")]
pub enum Currency {
    Usd,
    Eur,
    Ghs,
}

impl Currency {
    /// Number of fractional digits of the currency's minor unit.
    pub const fn minor_unit_exponent(self) -> u32 {
        match self {
            Currency::Usd | Currency::Eur | Currency::Ghs => 2,
        }
    }

    /// Lowercase ISO 4217 code, as card gateways expect it.
    pub fn code_lowercase(self) -> &'static str {
        match self {
            Currency::Usd => "usd",
            Currency::Eur => "eur",
            Currency::Ghs => "ghs",
        }
    }

    /// Converts a major-unit amount into integer minor units.
    ///
    /// Returns `None` when the amount has more precision than the currency
    /// allows or does not fit an `i64`.
    pub fn to_minor_units(self, amount: Decimal) -> Option<i64> {
        let exponent = self.minor_unit_exponent();
        if amount.normalize().scale() > exponent {
            return None;
        }
        let scaled = amount.checked_mul(Decimal::from(10_i64.pow(exponent)))?;
        i64::try_from(scaled.trunc()).ok()
    }
}

impl std::fmt::Display for Currency {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", SdkCurrency::from(*self))
    }
}

impl From<Currency> for SdkCurrency {
    fn from(value: Currency) -> Self {
        match value {
            Currency::Usd => SdkCurrency::Usd,
            Currency::Eur => SdkCurrency::Eur,
            Currency::Ghs => SdkCurrency::Ghs,
        }
    }
}

impl From<SdkCurrency> for Currency {
    fn from(value: SdkCurrency) -> Self {
        match value {
            SdkCurrency::Usd => Currency::Usd,
            SdkCurrency::Eur => Currency::Eur,
            SdkCurrency::Ghs => Currency::Ghs,
        }
    }
}

/// Payment rail for database operations.
///
/// This is the sqlx::Type version. For API/DTO use, see `giftflow_sdk::objects::PaymentProvider`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, sqlx::Type)]
#[sqlx(rename_all = "snake_case", type_name = "payment_provider")]
pub enum PaymentProvider {
    Card,
    MobileMoney,
}

impl std::fmt::Display for PaymentProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", SdkPaymentProvider::from(*self))
    }
}

impl From<PaymentProvider> for SdkPaymentProvider {
    fn from(value: PaymentProvider) -> Self {
        match value {
            PaymentProvider::Card => SdkPaymentProvider::Card,
            PaymentProvider::MobileMoney => SdkPaymentProvider::MobileMoney,
        }
    }
}

impl From<SdkPaymentProvider> for PaymentProvider {
    fn from(value: SdkPaymentProvider) -> Self {
        match value {
            SdkPaymentProvider::Card => PaymentProvider::Card,
            SdkPaymentProvider::MobileMoney => PaymentProvider::MobileMoney,
        }
    }
}
