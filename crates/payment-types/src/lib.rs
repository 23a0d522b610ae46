use chrono::{DateTime, FixedOffset};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

pub mod extract;

pub use extract::{extract_payment, parse_body, PaymentDetails};

/// A message fetched from the mail provider, reduced to what extraction needs
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MailMessage {
    pub id: String,
    pub body: String,
    /// Taken from message metadata (Date header or provider receive time)
    pub date: Option<DateTime<FixedOffset>>,
}

impl MailMessage {
    pub fn new(id: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            body: body.into(),
            date: None,
        }
    }

    pub fn with_date(mut self, date: DateTime<FixedOffset>) -> Self {
        self.date = Some(date);
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Direction {
    Incoming,
    Outgoing,
}

impl Direction {
    pub fn as_str(&self) -> &str {
        match self {
            Direction::Incoming => "incoming",
            Direction::Outgoing => "outgoing",
        }
    }
}

/// A single payment derived from exactly one notification email.
///
/// `amount` is signed: money received is positive, money sent is negative.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Payment {
    pub name: String,
    pub amount: Decimal,
    pub date: Option<DateTime<FixedOffset>>,
    pub memo: String,
}

impl Payment {
    pub fn direction(&self) -> Direction {
        if self.amount.is_sign_negative() {
            Direction::Outgoing
        } else {
            Direction::Incoming
        }
    }

    pub fn is_outgoing(&self) -> bool {
        self.direction() == Direction::Outgoing
    }

    /// Amount received, if this payment is incoming
    pub fn amount_in(&self) -> Option<Decimal> {
        (!self.is_outgoing()).then_some(self.amount)
    }

    /// Magnitude of the amount sent, if this payment is outgoing
    pub fn amount_out(&self) -> Option<Decimal> {
        self.is_outgoing().then(|| self.amount.abs())
    }

    /// One-line human summary, e.g. `Alice paid you $20.00 - "for lunch"`
    pub fn summary(&self) -> String {
        let amount = self.amount.abs().round_dp(2);
        let mut line = match self.direction() {
            Direction::Incoming => format!("{} paid you ${:.2}", self.name, amount),
            Direction::Outgoing => format!("You paid {} ${:.2}", self.name, amount),
        };
        if !self.memo.is_empty() {
            line.push_str(&format!(" - \"{}\"", self.memo));
        }
        line
    }
}
