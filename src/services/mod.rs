pub mod movement_ledger;
pub mod reconciliation;
pub mod reservations;
pub mod stock_records;

use std::sync::Arc;

use sea_orm::DatabaseConnection;

use crate::{errors::ServiceError, events::EventSender};

pub use movement_ledger::{LedgerCheck, MovementFilter, MovementLedgerService, NewMovement};
pub use reconciliation::{AuditCompletion, AuditFilter, OpenAudit, ReconciliationService};
pub use reservations::{ConsumeOutcome, ReservationService};
pub use stock_records::StockRecordService;

/// Largest page any list operation will serve.
pub const MAX_PAGE_SIZE: u64 = 1000;

/// The four stock components sharing one connection pool and event channel.
#[derive(Clone)]
pub struct StockServices {
    pub records: Arc<StockRecordService>,
    pub ledger: Arc<MovementLedgerService>,
    pub reservations: Arc<ReservationService>,
    pub reconciliation: Arc<ReconciliationService>,
}

impl StockServices {
    pub fn new(db: Arc<DatabaseConnection>, event_sender: Option<EventSender>) -> Self {
        Self {
            records: Arc::new(StockRecordService::new(db.clone())),
            ledger: Arc::new(MovementLedgerService::new(
                db.clone(),
                event_sender.clone(),
            )),
            reservations: Arc::new(ReservationService::new(db.clone(), event_sender.clone())),
            reconciliation: Arc::new(ReconciliationService::new(db, event_sender)),
        }
    }
}

pub(crate) fn validate_page(page: u64, limit: u64) -> Result<(), ServiceError> {
    if page == 0 {
        return Err(ServiceError::ValidationError(
            "Page number must be greater than 0".to_string(),
        ));
    }
    if limit == 0 || limit > MAX_PAGE_SIZE {
        return Err(ServiceError::ValidationError(format!(
            "Limit must be between 1 and {}",
            MAX_PAGE_SIZE
        )));
    }
    Ok(())
}

pub(crate) fn validate_amount(amount: i32) -> Result<(), ServiceError> {
    if amount <= 0 {
        return Err(ServiceError::ValidationError(format!(
            "Amount must be positive, got {}",
            amount
        )));
    }
    Ok(())
}

pub(crate) async fn publish(sender: &Option<EventSender>, event: crate::events::Event) {
    if let Some(sender) = sender {
        sender.send_or_log(event).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn page_bounds_are_enforced() {
        assert!(validate_page(1, 20).is_ok());
        assert!(validate_page(3, MAX_PAGE_SIZE).is_ok());
        assert_matches!(validate_page(0, 20), Err(ServiceError::ValidationError(_)));
        assert_matches!(validate_page(1, 0), Err(ServiceError::ValidationError(_)));
        assert_matches!(
            validate_page(1, MAX_PAGE_SIZE + 1),
            Err(ServiceError::ValidationError(_))
        );
    }

    #[test]
    fn amounts_must_be_positive() {
        assert!(validate_amount(1).is_ok());
        assert_matches!(validate_amount(0), Err(ServiceError::ValidationError(_)));
        assert_matches!(validate_amount(-4), Err(ServiceError::ValidationError(_)));
    }
}
