use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::pii::Masked;

/// Trip and seat details rendered into every passenger e-mail.
///
/// `destination` already has the surprise-trip masking applied by the sender;
/// consumers must not try to look the real city up.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TicketPayload {
    pub reservation_id: Uuid,
    pub origin: String,
    pub destination: String,
    pub distance_km: Option<f64>,
    pub departure_time: DateTime<Utc>,
    pub arrival_time: DateTime<Utc>,
    pub bus_plate: String,
    pub carrier_name: String,
    pub seats: Vec<u32>,
    pub amount_cents: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Notification {
    BookingConfirmation {
        recipient: Masked<String>,
        recipient_name: String,
        ticket: TicketPayload,
        expires_at: Option<DateTime<Utc>>,
    },
    Cancellation {
        recipient: Masked<String>,
        recipient_name: String,
        ticket: TicketPayload,
        refund_cents: i64,
    },
    ScheduleChange {
        recipient: Masked<String>,
        recipient_name: String,
        ticket: TicketPayload,
        previous_departure_time: DateTime<Utc>,
        previous_arrival_time: DateTime<Utc>,
    },
    CancellationByCarrier {
        recipient: Masked<String>,
        recipient_name: String,
        ticket: TicketPayload,
        refund_cents: i64,
    },
    SurpriseReminder {
        recipient: Masked<String>,
        recipient_name: String,
        ticket: TicketPayload,
    },
}

impl Notification {
    pub fn kind(&self) -> &'static str {
        match self {
            Notification::BookingConfirmation { .. } => "booking_confirmation",
            Notification::Cancellation { .. } => "cancellation",
            Notification::ScheduleChange { .. } => "schedule_change",
            Notification::CancellationByCarrier { .. } => "cancellation_by_carrier",
            Notification::SurpriseReminder { .. } => "surprise_reminder",
        }
    }

    pub fn recipient(&self) -> &Masked<String> {
        match self {
            Notification::BookingConfirmation { recipient, .. }
            | Notification::Cancellation { recipient, .. }
            | Notification::ScheduleChange { recipient, .. }
            | Notification::CancellationByCarrier { recipient, .. }
            | Notification::SurpriseReminder { recipient, .. } => recipient,
        }
    }

    pub fn ticket(&self) -> &TicketPayload {
        match self {
            Notification::BookingConfirmation { ticket, .. }
            | Notification::Cancellation { ticket, .. }
            | Notification::ScheduleChange { ticket, .. }
            | Notification::CancellationByCarrier { ticket, .. }
            | Notification::SurpriseReminder { ticket, .. } => ticket,
        }
    }
}
