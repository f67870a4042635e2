//! Shared types for the exit kiosk

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Ticket identifier as printed on the entry ticket.
///
/// The backend keys tickets by integer, but the terminal also accepts typed
/// identifiers such as `T-42`, so the raw text is kept.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TicketId(String);

impl TicketId {
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into().trim().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// All ASCII digits, i.e. the backend's native integer key
    pub fn is_numeric(&self) -> bool {
        !self.0.is_empty() && self.0.bytes().all(|b| b.is_ascii_digit())
    }
}

impl std::fmt::Display for TicketId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TicketId {
    fn from(raw: &str) -> Self {
        Self::new(raw)
    }
}

impl From<u64> for TicketId {
    fn from(raw: u64) -> Self {
        Self(raw.to_string())
    }
}

impl Serialize for TicketId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self.0.parse::<u64>() {
            Ok(n) if self.is_numeric() => serializer.serialize_u64(n),
            _ => serializer.serialize_str(&self.0),
        }
    }
}

impl<'de> Deserialize<'de> for TicketId {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        use serde::de::{self, Visitor};

        struct TicketIdVisitor;

        impl<'de> Visitor<'de> for TicketIdVisitor {
            type Value = TicketId;

            fn expecting(&self, formatter: &mut std::fmt::Formatter) -> std::fmt::Result {
                formatter.write_str("a string or integer ticket id")
            }

            fn visit_str<E>(self, value: &str) -> Result<TicketId, E>
            where
                E: de::Error,
            {
                Ok(TicketId::new(value))
            }

            fn visit_u64<E>(self, value: u64) -> Result<TicketId, E>
            where
                E: de::Error,
            {
                Ok(TicketId::from(value))
            }

            fn visit_i64<E>(self, value: i64) -> Result<TicketId, E>
            where
                E: de::Error,
            {
                u64::try_from(value)
                    .map(TicketId::from)
                    .map_err(|_| E::custom(format!("negative ticket id {value}")))
            }
        }

        deserializer.deserialize_any(TicketIdVisitor)
    }
}

/// Monetary amount in minor units (paise)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
#[repr(transparent)]
pub struct Amount(pub i64);

impl Amount {
    /// Convert a decimal major-unit value (as sent by the backend), rounding to the nearest paisa
    pub fn from_major(value: f64) -> Self {
        Self((value * 100.0).round() as i64)
    }

    pub fn as_major(&self) -> f64 {
        self.0 as f64 / 100.0
    }

    pub fn minor_units(&self) -> i64 {
        self.0
    }
}

impl std::fmt::Display for Amount {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        let abs = self.0.unsigned_abs();
        write!(f, "{}{}.{:02}", sign, abs / 100, abs % 100)
    }
}

impl Serialize for Amount {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(self.as_major())
    }
}

impl<'de> Deserialize<'de> for Amount {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        f64::deserialize(deserializer).map(Amount::from_major)
    }
}

/// Payment methods offered on the exit terminal
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentMethod {
    Cash,
    Card,
    Upi,
}

impl PaymentMethod {
    #[inline]
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentMethod::Cash => "cash",
            PaymentMethod::Card => "card",
            PaymentMethod::Upi => "upi",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            PaymentMethod::Cash => "Cash",
            PaymentMethod::Card => "Card",
            PaymentMethod::Upi => "UPI",
        }
    }
}

impl std::fmt::Display for PaymentMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Ticket data returned by the validation service. Immutable for a session.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct TicketDetails {
    pub ticket_id: TicketId,
    #[serde(deserialize_with = "deserialize_utc")]
    pub entry_time: DateTime<Utc>,
    #[serde(default)]
    pub spot_number: Option<String>,
    #[serde(default)]
    pub vehicle_number: Option<String>,
    /// Parking duration as computed by the backend at lookup time
    #[serde(default)]
    pub duration_minutes: Option<i64>,
}

/// Validation response: ticket details plus the fee owed
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct TicketQuote {
    #[serde(flatten)]
    pub details: TicketDetails,
    pub calculated_fee: Amount,
}

/// Body of the settlement request. Always carries the full amount.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SettlementRequestBody {
    pub ticket_id: TicketId,
    pub amount_paid: Amount,
    pub payment_method: PaymentMethod,
}

/// Settlement response from the payment service
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SettlementResponse {
    pub payment_status: String,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub payment_id: Option<i64>,
}

impl SettlementResponse {
    pub fn is_successful(&self) -> bool {
        self.payment_status.eq_ignore_ascii_case("successful")
    }
}

/// Accept RFC 3339, or a naive ISO timestamp which the backend emits in UTC
fn deserialize_utc<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    parse_utc(&raw).ok_or_else(|| serde::de::Error::custom(format!("invalid timestamp {raw}")))
}

pub fn parse_utc(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
        .or_else(|_| NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S%.f"))
        .ok()
        .map(|naive| naive.and_utc())
}

/// Human readable parking duration: at least one minute, `2h 5m` style
pub fn format_duration(minutes: i64) -> String {
    let total = minutes.max(1);
    let (h, m) = (total / 60, total % 60);
    if h > 0 {
        format!("{h}h {m}m")
    } else {
        format!("{m}m")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ticket_id_serializes_numeric_as_integer() {
        assert_eq!(serde_json::to_string(&TicketId::from("42")).unwrap(), "42");
        assert_eq!(serde_json::to_string(&TicketId::from("T-42")).unwrap(), "\"T-42\"");
    }

    #[test]
    fn test_ticket_id_deserializes_string_or_integer() {
        let a: TicketId = serde_json::from_str("17").unwrap();
        let b: TicketId = serde_json::from_str("\" T-9 \"").unwrap();
        assert_eq!(a.as_str(), "17");
        assert_eq!(b.as_str(), "T-9");
        assert!(serde_json::from_str::<TicketId>("-3").is_err());
    }

    #[test]
    fn test_amount_rounding_and_display() {
        assert_eq!(Amount::from_major(75.5), Amount(7550));
        assert_eq!(Amount::from_major(40.0).to_string(), "40.00");
        assert_eq!(Amount::from_major(0.1 + 0.2), Amount(30));
        assert_eq!(Amount(-5).to_string(), "-0.05");
    }

    #[test]
    fn test_quote_from_backend_json() {
        let json = r#"{
            "ticket_id": 7,
            "vehicle_number": "MH12AB1234",
            "entry_time": "2024-05-01T08:30:00",
            "current_time": "2024-05-01T10:00:00",
            "duration_minutes": 90,
            "calculated_fee": 75.5
        }"#;
        let quote: TicketQuote = serde_json::from_str(json).unwrap();
        assert_eq!(quote.details.ticket_id.as_str(), "7");
        assert_eq!(quote.calculated_fee, Amount(7550));
        assert_eq!(quote.details.spot_number, None);
        assert_eq!(quote.details.entry_time.to_rfc3339(), "2024-05-01T08:30:00+00:00");
    }

    #[test]
    fn test_parse_utc_variants() {
        assert!(parse_utc("2024-05-01T08:30:00Z").is_some());
        assert!(parse_utc("2024-05-01T08:30:00.123456").is_some());
        assert!(parse_utc("2024-05-01 08:30:00").is_some());
        assert!(parse_utc("yesterday").is_none());
    }

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(0), "1m");
        assert_eq!(format_duration(59), "59m");
        assert_eq!(format_duration(125), "2h 5m");
    }

    #[test]
    fn test_settlement_status() {
        let ok: SettlementResponse =
            serde_json::from_str(r#"{"payment_status":"successful","message":"ok"}"#).unwrap();
        let bad: SettlementResponse =
            serde_json::from_str(r#"{"payment_status":"failed"}"#).unwrap();
        assert!(ok.is_successful());
        assert!(!bad.is_successful());
    }
}
