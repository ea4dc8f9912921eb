use std::sync::Arc;

use chrono::{DateTime, Utc};
use metrics::counter;
use sea_orm::{
    sea_query::Expr, ActiveModelTrait, ActiveValue::Set, ColumnTrait, Condition, ConnectionTrait,
    DatabaseConnection, EntityTrait, PaginatorTrait, QueryFilter, QueryOrder, QuerySelect,
    TransactionTrait,
};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::{
    db::commit_or_rollback,
    entities::{
        stock_movement::{self, CauseType, Entity as StockMovementEntity, MovementType},
        stock_record::{self, Entity as StockRecordEntity},
    },
    errors::ServiceError,
    events::{Event, EventSender},
    services::stock_records::{find_by_id_in, find_in, get_or_create_in},
};

/// A quantity change to be appended to a pair's ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewMovement {
    pub sku_id: Uuid,
    pub location_id: Uuid,
    pub quantity_changed: i32,
    pub movement_type: MovementType,
    pub cause_type: Option<CauseType>,
    pub cause_id: Option<Uuid>,
    pub note: Option<String>,
    pub created_by: Option<Uuid>,
    /// Skip the non-negativity and reserved-stock guards. Adjustments only.
    #[serde(default)]
    pub force: bool,
}

impl NewMovement {
    pub fn new(
        sku_id: Uuid,
        location_id: Uuid,
        quantity_changed: i32,
        movement_type: MovementType,
    ) -> Self {
        Self {
            sku_id,
            location_id,
            quantity_changed,
            movement_type,
            cause_type: None,
            cause_id: None,
            note: None,
            created_by: None,
            force: false,
        }
    }

    pub fn with_cause(mut self, cause_type: CauseType, cause_id: Option<Uuid>) -> Self {
        self.cause_type = Some(cause_type);
        self.cause_id = cause_id;
        self
    }

    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.note = Some(note.into());
        self
    }

    pub fn created_by(mut self, actor: Uuid) -> Self {
        self.created_by = Some(actor);
        self
    }

    pub fn forced(mut self) -> Self {
        self.force = true;
        self
    }

    pub fn validate(&self) -> Result<(), ServiceError> {
        if self.quantity_changed == 0 {
            return Err(ServiceError::ValidationError(
                "quantity_changed must not be zero".to_string(),
            ));
        }
        if !self.movement_type.accepts(self.quantity_changed) {
            return Err(ServiceError::ValidationError(format!(
                "{} movements cannot change quantity by {}",
                self.movement_type, self.quantity_changed
            )));
        }
        if self.force && self.movement_type != MovementType::Adjustment {
            return Err(ServiceError::ValidationError(format!(
                "force is only allowed for adjustment movements, not {}",
                self.movement_type
            )));
        }
        if self.cause_id.is_some() && self.cause_type.is_none() {
            return Err(ServiceError::ValidationError(
                "cause_id requires cause_type".to_string(),
            ));
        }
        Ok(())
    }
}

/// Reporting filter over the movement history.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MovementFilter {
    pub sku_id: Option<Uuid>,
    pub location_id: Option<Uuid>,
    pub movement_type: Option<MovementType>,
    pub cause_type: Option<CauseType>,
    pub cause_id: Option<Uuid>,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
}

/// Result of comparing a record's quantity against the sum of its ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerCheck {
    pub sku_id: Uuid,
    pub location_id: Uuid,
    pub recorded_quantity: i32,
    pub ledger_sum: i64,
    pub movement_count: i64,
    pub ledger_sequence: i64,
    pub consistent: bool,
}

/// Inserts the movement row for a record whose counters were already bumped
/// in the same transaction. `record` must be the post-update state.
pub(crate) async fn insert_entry_in<C: ConnectionTrait>(
    conn: &C,
    record: &stock_record::Model,
    movement: &NewMovement,
) -> Result<stock_movement::Model, ServiceError> {
    let entry = stock_movement::ActiveModel {
        id: Set(Uuid::new_v4()),
        stock_record_id: Set(record.id),
        sku_id: Set(record.sku_id),
        location_id: Set(record.location_id),
        quantity_changed: Set(movement.quantity_changed),
        movement_type: Set(movement.movement_type),
        cause_type: Set(movement.cause_type),
        cause_id: Set(movement.cause_id),
        note: Set(movement.note.clone()),
        created_by: Set(movement.created_by),
        sequence: Set(record.ledger_sequence),
        quantity_after: Set(record.quantity),
        created_at: Set(record.updated_at),
    };

    entry.insert(conn).await.map_err(ServiceError::db_error)
}

/// Explains why the guarded UPDATE in [`append_in`] touched no rows.
fn rejection(current: &stock_record::Model, movement: &NewMovement) -> ServiceError {
    let delta = movement.quantity_changed;
    match current.quantity.checked_add(delta) {
        None => ServiceError::ValidationError(format!(
            "Quantity {} changed by {} is out of range",
            current.quantity, delta
        )),
        Some(after) if after < 0 && !movement.force => ServiceError::NegativeStock {
            sku_id: current.sku_id,
            location_id: current.location_id,
            quantity: current.quantity,
            delta,
        },
        Some(_) => ServiceError::InsufficientAvailable {
            sku_id: current.sku_id,
            location_id: current.location_id,
            available: current.available_quantity(),
            requested: -delta,
        },
    }
}

/// Applies a movement inside the caller's transaction.
///
/// The quantity change and the ledger sequence bump are a single conditional
/// UPDATE evaluated by the database; a rejected guard leaves the row untouched.
pub(crate) async fn append_in<C: ConnectionTrait>(
    conn: &C,
    movement: &NewMovement,
) -> Result<stock_movement::Model, ServiceError> {
    movement.validate()?;

    let record = get_or_create_in(conn, movement.sku_id, movement.location_id).await?;
    let delta = movement.quantity_changed;
    let now = Utc::now();

    let mut update = StockRecordEntity::update_many()
        .col_expr(
            stock_record::Column::Quantity,
            Expr::col(stock_record::Column::Quantity).add(delta),
        )
        .col_expr(
            stock_record::Column::LedgerSequence,
            Expr::col(stock_record::Column::LedgerSequence).add(1),
        )
        .col_expr(stock_record::Column::UpdatedAt, Expr::value(now))
        .filter(stock_record::Column::Id.eq(record.id));

    // Keep the stored value inside i32 whatever the direction.
    update = if delta > 0 {
        update.filter(stock_record::Column::Quantity.lte(i32::MAX - delta))
    } else {
        update.filter(stock_record::Column::Quantity.gte(i32::MIN - delta))
    };

    // Decrements may never cut into reserved stock. A forced adjustment only
    // waives the floor at zero, and only while nothing is reserved.
    if delta < 0 {
        let within_reserved = Expr::expr(Expr::col(stock_record::Column::Quantity).add(delta))
            .gte(Expr::col(stock_record::Column::ReservedQuantity));
        update = if movement.force {
            update.filter(
                Condition::any()
                    .add(stock_record::Column::ReservedQuantity.eq(0))
                    .add(within_reserved),
            )
        } else {
            update.filter(within_reserved)
        };
    }

    let result = update.exec(conn).await.map_err(ServiceError::db_error)?;

    if result.rows_affected == 0 {
        let current = find_by_id_in(conn, record.id).await?;
        return Err(rejection(&current, movement));
    }

    let updated = find_by_id_in(conn, record.id).await?;
    insert_entry_in(conn, &updated, movement).await
}

/// Append-only history of quantity changes.
#[derive(Clone)]
pub struct MovementLedgerService {
    db: Arc<DatabaseConnection>,
    event_sender: Option<EventSender>,
}

impl MovementLedgerService {
    pub fn new(db: Arc<DatabaseConnection>, event_sender: Option<EventSender>) -> Self {
        Self { db, event_sender }
    }

    /// Applies `movement` to its stock record and records it, atomically.
    #[instrument(
        skip(self, movement),
        fields(
            sku_id = %movement.sku_id,
            location_id = %movement.location_id,
            delta = movement.quantity_changed,
            movement_type = %movement.movement_type,
            force = movement.force,
        )
    )]
    pub async fn append(
        &self,
        movement: NewMovement,
    ) -> Result<stock_movement::Model, ServiceError> {
        let txn = self.db.begin().await.map_err(ServiceError::db_error)?;
        let result = append_in(&txn, &movement).await;
        let entry = match commit_or_rollback(txn, result).await {
            Ok(entry) => entry,
            Err(err) => {
                warn!(error = %err, "Stock movement rejected");
                counter!("stock_ledger.movements.rejected", 1, "reason" => err.code());
                return Err(err);
            }
        };

        info!(
            movement_id = %entry.id,
            sequence = entry.sequence,
            quantity_after = entry.quantity_after,
            "Stock movement appended"
        );
        counter!(
            "stock_ledger.movements.appended",
            1,
            "movement_type" => entry.movement_type.to_string()
        );

        super::publish(&self.event_sender, Event::from(&entry)).await;

        Ok(entry)
    }

    #[instrument(skip(self))]
    pub async fn get(&self, movement_id: Uuid) -> Result<stock_movement::Model, ServiceError> {
        StockMovementEntity::find_by_id(movement_id)
            .one(&*self.db)
            .await
            .map_err(ServiceError::db_error)?
            .ok_or_else(|| ServiceError::NotFound(format!("Movement {} not found", movement_id)))
    }

    /// Movements matching `filter`, oldest first.
    #[instrument(skip(self))]
    pub async fn history(
        &self,
        filter: MovementFilter,
        page: u64,
        limit: u64,
    ) -> Result<(Vec<stock_movement::Model>, u64), ServiceError> {
        super::validate_page(page, limit)?;

        let mut query = StockMovementEntity::find();

        if let Some(sku_id) = filter.sku_id {
            query = query.filter(stock_movement::Column::SkuId.eq(sku_id));
        }
        if let Some(location_id) = filter.location_id {
            query = query.filter(stock_movement::Column::LocationId.eq(location_id));
        }
        if let Some(movement_type) = filter.movement_type {
            query = query.filter(stock_movement::Column::MovementType.eq(movement_type));
        }
        if let Some(cause_type) = filter.cause_type {
            query = query.filter(stock_movement::Column::CauseType.eq(cause_type));
        }
        if let Some(cause_id) = filter.cause_id {
            query = query.filter(stock_movement::Column::CauseId.eq(cause_id));
        }
        if let Some(from) = filter.from {
            query = query.filter(stock_movement::Column::CreatedAt.gte(from));
        }
        if let Some(to) = filter.to {
            query = query.filter(stock_movement::Column::CreatedAt.lte(to));
        }

        let paginator = query
            .order_by_asc(stock_movement::Column::CreatedAt)
            .order_by_asc(stock_movement::Column::Sequence)
            .paginate(&*self.db, limit);

        let total = paginator.num_items().await.map_err(ServiceError::db_error)?;
        let movements = paginator
            .fetch_page(page - 1)
            .await
            .map_err(ServiceError::db_error)?;

        Ok((movements, total))
    }

    /// Compares the record quantity with the sum of its movements. A pair
    /// that was never stocked is trivially consistent.
    #[instrument(skip(self))]
    pub async fn verify_consistency(
        &self,
        sku_id: Uuid,
        location_id: Uuid,
    ) -> Result<LedgerCheck, ServiceError> {
        let db = &*self.db;

        let (recorded_quantity, ledger_sequence) = match find_in(db, sku_id, location_id).await? {
            Some(record) => (record.quantity, record.ledger_sequence),
            None => (0, 0),
        };

        let (ledger_sum, movement_count) = StockMovementEntity::find()
            .select_only()
            .column_as(
                Expr::col(stock_movement::Column::QuantityChanged).sum(),
                "ledger_sum",
            )
            .column_as(
                Expr::col(stock_movement::Column::Id).count(),
                "movement_count",
            )
            .filter(stock_movement::Column::SkuId.eq(sku_id))
            .filter(stock_movement::Column::LocationId.eq(location_id))
            .into_tuple::<(Option<i64>, i64)>()
            .one(db)
            .await
            .map_err(ServiceError::db_error)?
            .unwrap_or((None, 0));
        let ledger_sum = ledger_sum.unwrap_or(0);

        let consistent =
            i64::from(recorded_quantity) == ledger_sum && movement_count == ledger_sequence;
        if !consistent {
            warn!(
                recorded_quantity,
                ledger_sum,
                movement_count,
                ledger_sequence,
                "Stock record diverges from its ledger"
            );
            counter!("stock_ledger.ledger.inconsistent", 1);
        }

        Ok(LedgerCheck {
            sku_id,
            location_id,
            recorded_quantity,
            ledger_sum,
            movement_count,
            ledger_sequence,
            consistent,
        })
    }
}

impl From<&stock_movement::Model> for Event {
    fn from(entry: &stock_movement::Model) -> Self {
        Event::MovementRecorded {
            movement_id: entry.id,
            sku_id: entry.sku_id,
            location_id: entry.location_id,
            movement_type: entry.movement_type,
            quantity_changed: entry.quantity_changed,
            quantity_after: entry.quantity_after,
        }
    }
}
