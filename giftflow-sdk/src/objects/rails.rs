use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
/// Currencies a donation can be made in.
#[serde(rename_all = "UPPERCASE")]
pub enum Currency {
    Usd,
    Eur,
    Ghs,
}

impl std::fmt::Display for Currency {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Currency::Usd => write!(f, "USD"),
            Currency::Eur => write!(f, "EUR"),
            Currency::Ghs => write!(f, "GHS"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
/// Payment rails a donation can be routed through.
#[serde(rename_all = "snake_case")]
pub enum PaymentProvider {
    /// Hosted card checkout (redirect based).
    Card,
    /// Mobile-money push payment (approved on the payer's handset).
    MobileMoney,
}

impl std::fmt::Display for PaymentProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PaymentProvider::Card => write!(f, "card"),
            PaymentProvider::MobileMoney => write!(f, "mobile_money"),
        }
    }
}
