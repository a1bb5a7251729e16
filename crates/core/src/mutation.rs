//! Offline mutations: user writes recorded while the server is unreachable.
//!
//! Payloads are a closed tagged union so batch construction and result
//! dispatch can match exhaustively on the kind.

use chrono::{NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};

use crate::error::{DomainError, DomainResult};

/// Kind of offline mutation (one queue partition and one upload list per kind).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MutationKind {
    Bid,
    Booking,
    Message,
}

impl MutationKind {
    pub const ALL: [MutationKind; 3] = [MutationKind::Bid, MutationKind::Booking, MutationKind::Message];

    /// Prefix used in client temp ids.
    pub fn prefix(&self) -> &'static str {
        match self {
            MutationKind::Bid => "bid",
            MutationKind::Booking => "booking",
            MutationKind::Message => "message",
        }
    }

    pub fn from_prefix(prefix: &str) -> Option<Self> {
        match prefix {
            "bid" => Some(MutationKind::Bid),
            "booking" => Some(MutationKind::Booking),
            "message" => Some(MutationKind::Message),
            _ => None,
        }
    }
}

impl core::fmt::Display for MutationKind {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.prefix())
    }
}

/// A bid on a service request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BidMutation {
    pub service_id: String,
    pub amount: f64,
    pub message: String,
    /// Proposed duration in days.
    pub duration_days: u32,
}

/// A booking of a provider's service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BookingMutation {
    pub service_id: String,
    pub provider_id: String,
    pub date: NaiveDate,
    pub time: NaiveTime,
    pub amount: f64,
    pub address: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageType {
    Text,
    Image,
    File,
    /// Generated by the platform (status changes, booking notices).
    System,
}

/// A chat message in a conversation thread.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageMutation {
    pub thread_id: String,
    pub content: String,
    pub message_type: MessageType,
}

/// Any offline write.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "payload", rename_all = "lowercase")]
pub enum OfflineMutation {
    Bid(BidMutation),
    Booking(BookingMutation),
    Message(MessageMutation),
}

impl OfflineMutation {
    pub fn kind(&self) -> MutationKind {
        match self {
            OfflineMutation::Bid(_) => MutationKind::Bid,
            OfflineMutation::Booking(_) => MutationKind::Booking,
            OfflineMutation::Message(_) => MutationKind::Message,
        }
    }

    /// Reject payloads the server would refuse for structural reasons.
    ///
    /// Business validation (e.g. bid amount vs. budget) stays server-side and
    /// surfaces as a per-item upload failure.
    pub fn validate(&self) -> DomainResult<()> {
        match self {
            OfflineMutation::Bid(bid) => {
                require_text("bid service id", &bid.service_id)?;
                require_positive_amount("bid amount", bid.amount)?;
                if bid.duration_days == 0 {
                    return Err(DomainError::validation("bid duration must be at least one day"));
                }
                Ok(())
            }
            OfflineMutation::Booking(booking) => {
                require_text("booking service id", &booking.service_id)?;
                require_text("booking provider id", &booking.provider_id)?;
                require_text("booking address", &booking.address)?;
                require_positive_amount("booking amount", booking.amount)
            }
            OfflineMutation::Message(message) => {
                require_text("message thread id", &message.thread_id)?;
                require_text("message content", &message.content)
            }
        }
    }
}

fn require_text(field: &str, value: &str) -> DomainResult<()> {
    if value.trim().is_empty() {
        return Err(DomainError::validation(format!("{field} must not be empty")));
    }
    Ok(())
}

fn require_positive_amount(field: &str, amount: f64) -> DomainResult<()> {
    if !amount.is_finite() || amount <= 0.0 {
        return Err(DomainError::validation(format!(
            "{field} must be a positive number, got {amount}"
        )));
    }
    Ok(())
}

impl From<BidMutation> for OfflineMutation {
    fn from(value: BidMutation) -> Self {
        OfflineMutation::Bid(value)
    }
}

impl From<BookingMutation> for OfflineMutation {
    fn from(value: BookingMutation) -> Self {
        OfflineMutation::Booking(value)
    }
}

impl From<MessageMutation> for OfflineMutation {
    fn from(value: MessageMutation) -> Self {
        OfflineMutation::Message(value)
    }
}
