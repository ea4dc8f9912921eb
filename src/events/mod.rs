use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::entities::stock_movement::MovementType;

#[derive(Debug, Clone)]
pub struct EventSender {
    sender: mpsc::Sender<Event>,
}

impl EventSender {
    /// Creates a new EventSender
    pub fn new(sender: mpsc::Sender<Event>) -> Self {
        Self { sender }
    }

    /// Sends an event asynchronously
    pub async fn send(&self, event: Event) -> Result<(), String> {
        self.sender
            .send(event)
            .await
            .map_err(|e| format!("Failed to send event: {}", e))
    }

    /// Sends an event after the originating transaction committed.
    /// A closed or saturated channel never fails the operation that produced it.
    pub async fn send_or_log(&self, event: Event) {
        let name = event.name();
        if let Err(e) = self.send(event).await {
            warn!(event = name, error = %e, "Dropping domain event");
        }
    }
}

/// Facts published once a stock operation has committed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    MovementRecorded {
        movement_id: Uuid,
        sku_id: Uuid,
        location_id: Uuid,
        movement_type: MovementType,
        quantity_changed: i32,
        quantity_after: i32,
    },
    StockReserved {
        sku_id: Uuid,
        location_id: Uuid,
        quantity: i32,
        reserved_quantity: i32,
    },
    ReservationReleased {
        sku_id: Uuid,
        location_id: Uuid,
        quantity: i32,
        reserved_quantity: i32,
    },
    ReservationConsumed {
        sku_id: Uuid,
        location_id: Uuid,
        quantity: i32,
        movement_id: Uuid,
        order_ref: Option<Uuid>,
    },
    AuditOpened {
        audit_id: Uuid,
        sku_id: Uuid,
        location_id: Uuid,
        quantity_before_audit: i32,
    },
    AuditCompleted {
        audit_id: Uuid,
        sku_id: Uuid,
        location_id: Uuid,
        discrepancy: i32,
        adjustment_movement_id: Option<Uuid>,
    },
}

impl Event {
    pub fn name(&self) -> &'static str {
        match self {
            Event::MovementRecorded { .. } => "movement_recorded",
            Event::StockReserved { .. } => "stock_reserved",
            Event::ReservationReleased { .. } => "reservation_released",
            Event::ReservationConsumed { .. } => "reservation_consumed",
            Event::AuditOpened { .. } => "audit_opened",
            Event::AuditCompleted { .. } => "audit_completed",
        }
    }
}

/// Drains the event channel until every sender is dropped.
pub async fn process_events(mut rx: mpsc::Receiver<Event>) {
    info!("Starting event processing loop");

    while let Some(event) = rx.recv().await {
        match &event {
            Event::MovementRecorded {
                movement_id,
                sku_id,
                location_id,
                movement_type,
                quantity_changed,
                quantity_after,
            } => info!(
                %movement_id,
                %sku_id,
                %location_id,
                %movement_type,
                quantity_changed,
                quantity_after,
                "Stock movement recorded"
            ),
            Event::StockReserved {
                sku_id,
                location_id,
                quantity,
                reserved_quantity,
            } => info!(%sku_id, %location_id, quantity, reserved_quantity, "Stock reserved"),
            Event::ReservationReleased {
                sku_id,
                location_id,
                quantity,
                reserved_quantity,
            } => info!(%sku_id, %location_id, quantity, reserved_quantity, "Reservation released"),
            Event::ReservationConsumed {
                sku_id,
                location_id,
                quantity,
                movement_id,
                order_ref,
            } => info!(
                %sku_id,
                %location_id,
                quantity,
                %movement_id,
                order_ref = ?order_ref,
                "Reservation consumed"
            ),
            Event::AuditOpened {
                audit_id,
                sku_id,
                location_id,
                quantity_before_audit,
            } => info!(%audit_id, %sku_id, %location_id, quantity_before_audit, "Stock audit opened"),
            Event::AuditCompleted {
                audit_id,
                sku_id,
                location_id,
                discrepancy,
                adjustment_movement_id,
            } => {
                if *discrepancy != 0 {
                    warn!(
                        %audit_id,
                        %sku_id,
                        %location_id,
                        discrepancy,
                        adjustment_movement_id = ?adjustment_movement_id,
                        "Stock audit completed with discrepancy"
                    );
                } else {
                    info!(%audit_id, %sku_id, %location_id, "Stock audit completed");
                }
            }
        }
    }

    info!("Event processing loop stopped");
}
