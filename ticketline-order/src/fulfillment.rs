use chrono::{DateTime, Utc};

use crate::models::{Order, TicketIssuance, TicketedPassenger};

/// Synthesizes the travel document for a paid order
#[derive(Debug, Clone)]
pub struct TicketIssuer {
    prefix: String,
}

impl TicketIssuer {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self { prefix: prefix.into() }
    }

    pub fn issue(&self, order: &Order, issued_at: DateTime<Utc>) -> TicketIssuance {
        TicketIssuance {
            ticket_number: self.ticket_number(order, issued_at),
            order_id: order.id,
            train_id: order.train_id.clone(),
            travel_date: order.travel_date,
            origin: order.origin.clone(),
            destination: order.destination.clone(),
            passengers: order
                .passengers
                .iter()
                .map(|p| TicketedPassenger {
                    name: p.name.clone(),
                    id_number: p.id_number.redacted(),
                    seat_class: p.seat_class,
                })
                .collect(),
            issued_at,
        }
    }

    /// Format: {prefix}-{train}-{yyyymmdd}-{first 8 of order id}
    fn ticket_number(&self, order: &Order, issued_at: DateTime<Utc>) -> String {
        let simple = order.id.simple().to_string();
        format!(
            "{}-{}-{}-{}",
            self.prefix,
            order.train_id,
            issued_at.format("%Y%m%d"),
            simple[..8].to_uppercase()
        )
    }

    /// Compact JSON for a gate-scannable QR code
    pub fn qr_data(&self, ticket: &TicketIssuance) -> String {
        serde_json::json!({
            "ticket": ticket.ticket_number,
            "train": ticket.train_id,
            "date": ticket.travel_date,
            "from": ticket.origin,
            "to": ticket.destination,
            "passengers": ticket.passengers.len(),
        })
        .to_string()
    }
}

impl Default for TicketIssuer {
    fn default() -> Self {
        Self::new("TL")
    }
}
