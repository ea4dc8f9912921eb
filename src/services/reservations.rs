use std::sync::Arc;

use chrono::Utc;
use metrics::counter;
use sea_orm::{
    sea_query::{Expr, SimpleExpr},
    ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait, QueryFilter, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::{
    db::commit_or_rollback,
    entities::{
        stock_movement::{self, CauseType, MovementType},
        stock_record::{self, Entity as StockRecordEntity},
    },
    errors::ServiceError,
    events::{Event, EventSender},
    services::{
        movement_ledger::{insert_entry_in, NewMovement},
        stock_records::{find_by_id_in, get_or_create_in},
    },
};

/// Record state and the sale movement produced by a consume.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsumeOutcome {
    pub record: stock_record::Model,
    pub movement: stock_movement::Model,
}

async fn reserve_in<C: ConnectionTrait>(
    conn: &C,
    sku_id: Uuid,
    location_id: Uuid,
    amount: i32,
) -> Result<stock_record::Model, ServiceError> {
    let record = get_or_create_in(conn, sku_id, location_id).await?;

    let result = StockRecordEntity::update_many()
        .col_expr(
            stock_record::Column::ReservedQuantity,
            Expr::col(stock_record::Column::ReservedQuantity).add(amount),
        )
        .col_expr(stock_record::Column::UpdatedAt, Expr::value(Utc::now()))
        .filter(stock_record::Column::Id.eq(record.id))
        .filter(
            Expr::expr(
                Expr::col(stock_record::Column::Quantity)
                    .sub(Expr::col(stock_record::Column::ReservedQuantity)),
            )
            .gte(amount),
        )
        .exec(conn)
        .await
        .map_err(ServiceError::db_error)?;

    if result.rows_affected == 0 {
        let current = find_by_id_in(conn, record.id).await?;
        return Err(ServiceError::InsufficientAvailable {
            sku_id,
            location_id,
            available: current.available_quantity(),
            requested: amount,
        });
    }

    find_by_id_in(conn, record.id).await
}

async fn release_in<C: ConnectionTrait>(
    conn: &C,
    sku_id: Uuid,
    location_id: Uuid,
    amount: i32,
) -> Result<stock_record::Model, ServiceError> {
    let record = get_or_create_in(conn, sku_id, location_id).await?;

    // Releasing more than is reserved clamps at zero.
    let released = SimpleExpr::Case(Box::new(
        Expr::case(
            Expr::col(stock_record::Column::ReservedQuantity).gt(amount),
            Expr::col(stock_record::Column::ReservedQuantity).sub(amount),
        )
        .finally(0),
    ));

    StockRecordEntity::update_many()
        .col_expr(stock_record::Column::ReservedQuantity, released)
        .col_expr(stock_record::Column::UpdatedAt, Expr::value(Utc::now()))
        .filter(stock_record::Column::Id.eq(record.id))
        .exec(conn)
        .await
        .map_err(ServiceError::db_error)?;

    find_by_id_in(conn, record.id).await
}

async fn consume_in<C: ConnectionTrait>(
    conn: &C,
    sku_id: Uuid,
    location_id: Uuid,
    amount: i32,
    order_ref: Option<Uuid>,
) -> Result<ConsumeOutcome, ServiceError> {
    let record = get_or_create_in(conn, sku_id, location_id).await?;

    let result = StockRecordEntity::update_many()
        .col_expr(
            stock_record::Column::ReservedQuantity,
            Expr::col(stock_record::Column::ReservedQuantity).sub(amount),
        )
        .col_expr(
            stock_record::Column::Quantity,
            Expr::col(stock_record::Column::Quantity).sub(amount),
        )
        .col_expr(
            stock_record::Column::LedgerSequence,
            Expr::col(stock_record::Column::LedgerSequence).add(1),
        )
        .col_expr(stock_record::Column::UpdatedAt, Expr::value(Utc::now()))
        .filter(stock_record::Column::Id.eq(record.id))
        .filter(stock_record::Column::ReservedQuantity.gte(amount))
        .filter(stock_record::Column::Quantity.gte(amount))
        .exec(conn)
        .await
        .map_err(ServiceError::db_error)?;

    if result.rows_affected == 0 {
        let current = find_by_id_in(conn, record.id).await?;
        let err = if current.reserved_quantity < amount {
            ServiceError::OverConsumption {
                sku_id,
                location_id,
                reserved: current.reserved_quantity,
                requested: amount,
            }
        } else {
            ServiceError::NegativeStock {
                sku_id,
                location_id,
                quantity: current.quantity,
                delta: -amount,
            }
        };
        return Err(err);
    }

    let updated = find_by_id_in(conn, record.id).await?;

    let mut sale = NewMovement::new(sku_id, location_id, -amount, MovementType::Sale);
    if let Some(order_id) = order_ref {
        sale = sale.with_cause(CauseType::Order, Some(order_id));
    }
    let movement = insert_entry_in(conn, &updated, &sale).await?;

    Ok(ConsumeOutcome {
        record: updated,
        movement,
    })
}

/// Earmarks on-hand stock for open orders.
///
/// Every bound is enforced inside the UPDATE statement itself, so two
/// reservations racing for the last units cannot both succeed.
#[derive(Clone)]
pub struct ReservationService {
    db: Arc<DatabaseConnection>,
    event_sender: Option<EventSender>,
}

impl ReservationService {
    pub fn new(db: Arc<DatabaseConnection>, event_sender: Option<EventSender>) -> Self {
        Self { db, event_sender }
    }

    #[instrument(skip(self))]
    pub async fn reserve(
        &self,
        sku_id: Uuid,
        location_id: Uuid,
        amount: i32,
    ) -> Result<stock_record::Model, ServiceError> {
        super::validate_amount(amount)?;

        let txn = self.db.begin().await.map_err(ServiceError::db_error)?;
        let result = reserve_in(&txn, sku_id, location_id, amount).await;
        let record = commit_or_rollback(txn, result).await.map_err(|err| {
            warn!(error = %err, "Reservation rejected");
            counter!("stock_ledger.reservations.rejected", 1, "reason" => err.code());
            err
        })?;

        info!(
            reserved_quantity = record.reserved_quantity,
            available = record.available_quantity(),
            "Stock reserved"
        );
        counter!("stock_ledger.reservations.reserved", 1);

        super::publish(
            &self.event_sender,
            Event::StockReserved {
                sku_id,
                location_id,
                quantity: amount,
                reserved_quantity: record.reserved_quantity,
            },
        )
        .await;

        Ok(record)
    }

    #[instrument(skip(self))]
    pub async fn release(
        &self,
        sku_id: Uuid,
        location_id: Uuid,
        amount: i32,
    ) -> Result<stock_record::Model, ServiceError> {
        super::validate_amount(amount)?;

        let txn = self.db.begin().await.map_err(ServiceError::db_error)?;
        let result = release_in(&txn, sku_id, location_id, amount).await;
        let record = commit_or_rollback(txn, result).await?;

        info!(
            reserved_quantity = record.reserved_quantity,
            "Reservation released"
        );
        counter!("stock_ledger.reservations.released", 1);

        super::publish(
            &self.event_sender,
            Event::ReservationReleased {
                sku_id,
                location_id,
                quantity: amount,
                reserved_quantity: record.reserved_quantity,
            },
        )
        .await;

        Ok(record)
    }

    /// Ships reserved stock: both counters drop by `amount` and a `sale`
    /// movement is appended in the same transaction.
    #[instrument(skip(self))]
    pub async fn consume(
        &self,
        sku_id: Uuid,
        location_id: Uuid,
        amount: i32,
        order_ref: Option<Uuid>,
    ) -> Result<ConsumeOutcome, ServiceError> {
        super::validate_amount(amount)?;

        let txn = self.db.begin().await.map_err(ServiceError::db_error)?;
        let result = consume_in(&txn, sku_id, location_id, amount, order_ref).await;
        let outcome = commit_or_rollback(txn, result).await.map_err(|err| {
            warn!(error = %err, "Consumption rejected");
            counter!("stock_ledger.reservations.rejected", 1, "reason" => err.code());
            err
        })?;

        info!(
            movement_id = %outcome.movement.id,
            quantity = outcome.record.quantity,
            reserved_quantity = outcome.record.reserved_quantity,
            "Reservation consumed"
        );
        counter!("stock_ledger.reservations.consumed", 1);
        counter!(
            "stock_ledger.movements.appended",
            1,
            "movement_type" => MovementType::Sale.to_string()
        );

        super::publish(&self.event_sender, Event::from(&outcome.movement)).await;
        super::publish(
            &self.event_sender,
            Event::ReservationConsumed {
                sku_id,
                location_id,
                quantity: amount,
                movement_id: outcome.movement.id,
                order_ref,
            },
        )
        .await;

        Ok(outcome)
    }
}
