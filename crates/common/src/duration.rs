use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// How long a borrow entitlement lasts.
///
/// The canonical wire form is the space-separated token (`"1 month"`).
/// Incoming tokens may use hyphens as word separators; parsing
/// normalizes them before matching. `Forever` denotes a permanent
/// purchase rather than a time-boxed borrow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BorrowDuration {
    OneMonth,
    ThreeMonths,
    SixMonths,
    OneYear,
    Forever,
}

/// Error for a duration token outside the supported set.
#[derive(Debug, Clone, thiserror::Error)]
#[error("unrecognized borrow duration: {token}")]
pub struct ParseDurationError {
    pub token: String,
}

impl BorrowDuration {
    pub const ALL: [BorrowDuration; 5] = [
        BorrowDuration::OneMonth,
        BorrowDuration::ThreeMonths,
        BorrowDuration::SixMonths,
        BorrowDuration::OneYear,
        BorrowDuration::Forever,
    ];

    /// Canonical space-separated token.
    pub fn as_str(&self) -> &'static str {
        match self {
            BorrowDuration::OneMonth => "1 month",
            BorrowDuration::ThreeMonths => "3 months",
            BorrowDuration::SixMonths => "6 months",
            BorrowDuration::OneYear => "1 year",
            BorrowDuration::Forever => "forever",
        }
    }

    /// The borrow term, or `None` for a permanent purchase.
    pub fn term(&self) -> Option<chrono::Duration> {
        let days = match self {
            BorrowDuration::OneMonth => 30,
            BorrowDuration::ThreeMonths => 90,
            BorrowDuration::SixMonths => 180,
            BorrowDuration::OneYear => 365,
            BorrowDuration::Forever => return None,
        };
        Some(chrono::Duration::days(days))
    }

    /// Whether this duration grants the book outright.
    pub fn is_purchase(&self) -> bool {
        matches!(self, BorrowDuration::Forever)
    }
}

impl std::str::FromStr for BorrowDuration {
    type Err = ParseDurationError;

    fn from_str(token: &str) -> Result<Self, Self::Err> {
        // Clients disagree on the word separator; treat hyphens as spaces.
        let normalized = token.trim().to_ascii_lowercase().replace('-', " ");
        BorrowDuration::ALL
            .into_iter()
            .find(|d| d.as_str() == normalized)
            .ok_or_else(|| ParseDurationError {
                token: token.to_string(),
            })
    }
}

impl std::fmt::Display for BorrowDuration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for BorrowDuration {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for BorrowDuration {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let token = String::deserialize(deserializer)?;
        token.parse().map_err(serde::de::Error::custom)
    }
}
