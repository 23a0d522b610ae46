//! Pattern matching over Venmo notification text.
//!
//! Two templates are recognized:
//!
//! - `<Name> paid you $<Amount>` (incoming, positive amount)
//! - `You paid <Name> $<Amount>` (outgoing, negative amount)
//!
//! The incoming template is always tried first. A body that happens to
//! contain both phrases is classified as incoming; this is a known
//! imprecision of the template approach, kept deterministic on purpose.

use std::str::FromStr;
use std::sync::OnceLock;

use regex::{Captures, Regex};
use rust_decimal::Decimal;

use crate::{Direction, MailMessage, Payment};

/// Name and amount fragments shared by both templates. Name words are
/// joined by spaces or tabs only, so a name never spans lines.
const NAME: &str = r"([A-Z][A-Za-z'\-]+(?:[ \t]+[A-Z][A-Za-z'\-]+)*)";
const AMOUNT: &str = r"\$((?:\d{1,3}(?:,\d{3})+|\d+)(?:\.\d{2})?)";

fn incoming_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(&format!(r"{NAME}\s+paid you\s+{AMOUNT}")).expect("invalid incoming regex")
    })
}

fn outgoing_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(&format!(r"You paid\s+{NAME}\s+{AMOUNT}")).expect("invalid outgoing regex")
    })
}

fn quoted_note_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new("[\"\u{201c}]([^\"\u{201d}]+)[\"\u{201d}]").expect("invalid note regex")
    })
}

/// What the body text alone yields; the date comes from message metadata
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentDetails {
    pub name: String,
    pub amount: Decimal,
    pub memo: String,
}

impl PaymentDetails {
    pub fn direction(&self) -> Direction {
        if self.amount.is_sign_negative() {
            Direction::Outgoing
        } else {
            Direction::Incoming
        }
    }
}

/// Classify a message body and pull out name, signed amount and memo.
///
/// Returns `None` when the body matches neither template.
pub fn parse_body(body: &str) -> Option<PaymentDetails> {
    let (caps, direction) = match incoming_re().captures(body) {
        Some(caps) => (caps, Direction::Incoming),
        None => (outgoing_re().captures(body)?, Direction::Outgoing),
    };

    let name = caps.get(1)?.as_str().to_string();
    let magnitude = parse_amount(caps.get(2)?.as_str())?;
    if magnitude.is_zero() {
        tracing::debug!("Ignoring zero-amount payment to/from {}", name);
        return None;
    }

    let amount = match direction {
        Direction::Incoming => magnitude,
        Direction::Outgoing => -magnitude,
    };

    Some(PaymentDetails {
        name,
        amount,
        memo: find_memo(body, &caps),
    })
}

/// Turn a fetched message into a payment, or `None` if it is not one
pub fn extract_payment(message: &MailMessage) -> Option<Payment> {
    let details = parse_body(&message.body)?;

    Some(Payment {
        name: details.name,
        amount: details.amount,
        date: message.date,
        memo: details.memo,
    })
}

fn parse_amount(raw: &str) -> Option<Decimal> {
    Decimal::from_str(&raw.replace(',', "")).ok()
}

/// A quoted note anywhere in the body wins; otherwise whatever follows the
/// amount on the same line.
fn find_memo(body: &str, caps: &Captures<'_>) -> String {
    if let Some(note) = quoted_note_re()
        .captures(body)
        .and_then(|c| c.get(1))
        .and_then(|m| usable_note(m.as_str()))
    {
        return note;
    }

    let tail_start = caps.get(0).map(|m| m.end()).unwrap_or(body.len());
    let tail = body[tail_start..].lines().next().unwrap_or_default();
    let tail = tail
        .trim()
        .trim_start_matches(['-', '\u{2013}', '\u{2014}', ':'])
        .trim();

    usable_note(tail).unwrap_or_default()
}

fn usable_note(candidate: &str) -> Option<String> {
    let note = candidate.trim();
    if note.chars().count() > 1 && !note.starts_with("http") {
        Some(note.to_string())
    } else {
        None
    }
}
