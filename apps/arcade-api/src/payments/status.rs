//! Payment session lifecycle.
//!
//! ```text
//! created ──► prepared ──► paid
//!    │            │
//!    ├────────────┴──► failed
//!    └────────────┴──► cancelled
//! ```
//!
//! `paid`, `failed` and `cancelled` are terminal. Statuses are stored as
//! lowercase text.

use std::fmt;
use std::str::FromStr;

use diesel::deserialize::{self, FromSql, FromSqlRow};
use diesel::expression::AsExpression;
use diesel::pg::{Pg, PgValue};
use diesel::serialize::{self, Output, ToSql};
use diesel::sql_types::Text;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema, AsExpression, FromSqlRow,
)]
#[diesel(sql_type = Text)]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus {
    Created,
    Prepared,
    Paid,
    Failed,
    Cancelled,
}

impl PaymentStatus {
    /// Statuses a session can be finalized from.
    pub const OPEN: [PaymentStatus; 2] = [PaymentStatus::Created, PaymentStatus::Prepared];

    pub fn as_str(self) -> &'static str {
        match self {
            PaymentStatus::Created => "created",
            PaymentStatus::Prepared => "prepared",
            PaymentStatus::Paid => "paid",
            PaymentStatus::Failed => "failed",
            PaymentStatus::Cancelled => "cancelled",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            PaymentStatus::Paid | PaymentStatus::Failed | PaymentStatus::Cancelled
        )
    }

    /// Transition table. Self-transitions are not moves and are rejected.
    pub fn can_transition_to(self, next: PaymentStatus) -> bool {
        use PaymentStatus::*;
        matches!(
            (self, next),
            (Created, Prepared)
                | (Created, Paid)
                | (Created, Failed)
                | (Created, Cancelled)
                | (Prepared, Paid)
                | (Prepared, Failed)
                | (Prepared, Cancelled)
        )
    }
}

impl fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PaymentStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "created" => Ok(PaymentStatus::Created),
            "prepared" => Ok(PaymentStatus::Prepared),
            "paid" => Ok(PaymentStatus::Paid),
            "failed" => Ok(PaymentStatus::Failed),
            "cancelled" => Ok(PaymentStatus::Cancelled),
            other => Err(format!("unknown payment status: {other}")),
        }
    }
}

impl ToSql<Text, Pg> for PaymentStatus {
    fn to_sql<'b>(&'b self, out: &mut Output<'b, '_, Pg>) -> serialize::Result {
        <str as ToSql<Text, Pg>>::to_sql(self.as_str(), &mut out.reborrow())
    }
}

impl FromSql<Text, Pg> for PaymentStatus {
    fn from_sql(bytes: PgValue<'_>) -> deserialize::Result<Self> {
        let raw = <String as FromSql<Text, Pg>>::from_sql(bytes)?;
        raw.parse().map_err(Into::into)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use PaymentStatus::*;

    const ALL: [PaymentStatus; 5] = [Created, Prepared, Paid, Failed, Cancelled];

    #[test]
    fn terminal_statuses_have_no_exits() {
        for from in [Paid, Failed, Cancelled] {
            for to in ALL {
                assert!(!from.can_transition_to(to), "{from} -> {to} should be illegal");
            }
        }
    }

    #[test]
    fn nothing_returns_to_created() {
        for from in ALL {
            assert!(!from.can_transition_to(Created));
        }
    }

    #[test]
    fn open_statuses_can_finalize() {
        for from in PaymentStatus::OPEN {
            assert!(from.can_transition_to(Paid));
            assert!(from.can_transition_to(Failed));
            assert!(from.can_transition_to(Cancelled));
        }
        assert!(Created.can_transition_to(Prepared));
        assert!(!Prepared.can_transition_to(Prepared));
    }

    #[test]
    fn parses_stored_text() {
        for status in ALL {
            assert_eq!(status.as_str().parse::<PaymentStatus>(), Ok(status));
        }
        assert!("ready".parse::<PaymentStatus>().is_err());
    }

    #[test]
    fn serializes_lowercase() {
        assert_eq!(serde_json::to_value(Cancelled).unwrap(), "cancelled");
    }
}
