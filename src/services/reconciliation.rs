use std::sync::Arc;

use chrono::Utc;
use metrics::counter;
use sea_orm::{
    sea_query::Expr, ActiveModelTrait, ActiveValue::Set, ColumnTrait, ConnectionTrait,
    DatabaseConnection, EntityTrait, PaginatorTrait, QueryFilter, QueryOrder, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::{
    db::commit_or_rollback,
    entities::{
        stock_audit::{self, AuditStatus, Entity as StockAuditEntity},
        stock_movement::{self, CauseType, MovementType},
    },
    errors::ServiceError,
    events::{Event, EventSender},
    services::{
        movement_ledger::{append_in, NewMovement},
        stock_records::get_or_create_in,
    },
};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OpenAudit {
    pub sku_id: Uuid,
    pub location_id: Uuid,
    pub auditor_id: Uuid,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AuditFilter {
    pub sku_id: Option<Uuid>,
    pub location_id: Option<Uuid>,
    pub status: Option<AuditStatus>,
}

/// A completed audit and the adjustment it produced, if the count differed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditCompletion {
    pub audit: stock_audit::Model,
    pub adjustment: Option<stock_movement::Model>,
}

async fn find_audit_in<C: ConnectionTrait>(
    conn: &C,
    audit_id: Uuid,
) -> Result<stock_audit::Model, ServiceError> {
    StockAuditEntity::find_by_id(audit_id)
        .one(conn)
        .await
        .map_err(ServiceError::db_error)?
        .ok_or_else(|| ServiceError::NotFound(format!("Audit {} not found", audit_id)))
}

/// Explains why a pending-only UPDATE touched no rows.
async fn not_pending<C: ConnectionTrait>(conn: &C, audit_id: Uuid) -> ServiceError {
    match find_audit_in(conn, audit_id).await {
        Ok(_) => ServiceError::AlreadyCompleted(audit_id),
        Err(err) => err,
    }
}

async fn open_in<C: ConnectionTrait>(
    conn: &C,
    request: &OpenAudit,
) -> Result<stock_audit::Model, ServiceError> {
    let record = get_or_create_in(conn, request.sku_id, request.location_id).await?;

    let audit = stock_audit::ActiveModel {
        sku_id: Set(request.sku_id),
        location_id: Set(request.location_id),
        auditor_id: Set(request.auditor_id),
        quantity_before_audit: Set(record.quantity),
        quantity_recorded: Set(None),
        is_completed: Set(false),
        completed_at: Set(None),
        photo_ref: Set(None),
        notes: Set(request.notes.clone()),
        adjustment_movement_id: Set(None),
        ..Default::default()
    };

    audit.insert(conn).await.map_err(ServiceError::db_error)
}

async fn complete_in<C: ConnectionTrait>(
    conn: &C,
    audit_id: Uuid,
) -> Result<AuditCompletion, ServiceError> {
    let now = Utc::now();

    // Claim first: of two concurrent completions only one flips the flag.
    let claimed = StockAuditEntity::update_many()
        .col_expr(stock_audit::Column::IsCompleted, Expr::value(true))
        .col_expr(stock_audit::Column::CompletedAt, Expr::value(now))
        .col_expr(stock_audit::Column::UpdatedAt, Expr::value(now))
        .filter(stock_audit::Column::Id.eq(audit_id))
        .filter(stock_audit::Column::IsCompleted.eq(false))
        .exec(conn)
        .await
        .map_err(ServiceError::db_error)?;

    if claimed.rows_affected == 0 {
        return Err(not_pending(conn, audit_id).await);
    }

    let audit = find_audit_in(conn, audit_id).await?;
    let recorded = audit.quantity_recorded.ok_or_else(|| {
        ServiceError::ValidationError(format!(
            "Audit {} has no recorded count and cannot be completed",
            audit_id
        ))
    })?;
    let discrepancy = audit.quantity_discrepancy().ok_or_else(|| {
        ServiceError::ValidationError(format!(
            "Audit {} count {} against snapshot {} is out of range",
            audit_id, recorded, audit.quantity_before_audit
        ))
    })?;

    if discrepancy == 0 {
        return Ok(AuditCompletion {
            audit,
            adjustment: None,
        });
    }

    let adjustment = append_in(
        conn,
        &NewMovement::new(
            audit.sku_id,
            audit.location_id,
            discrepancy,
            MovementType::Adjustment,
        )
        .with_cause(CauseType::Audit, Some(audit.id))
        .with_note(format!("Stock audit {} reconciliation", audit.id))
        .created_by(audit.auditor_id),
    )
    .await?;

    StockAuditEntity::update_many()
        .col_expr(
            stock_audit::Column::AdjustmentMovementId,
            Expr::value(adjustment.id),
        )
        .filter(stock_audit::Column::Id.eq(audit_id))
        .exec(conn)
        .await
        .map_err(ServiceError::db_error)?;

    Ok(AuditCompletion {
        audit: find_audit_in(conn, audit_id).await?,
        adjustment: Some(adjustment),
    })
}

/// Physical counts reconciled against the ledger.
#[derive(Clone)]
pub struct ReconciliationService {
    db: Arc<DatabaseConnection>,
    event_sender: Option<EventSender>,
}

impl ReconciliationService {
    pub fn new(db: Arc<DatabaseConnection>, event_sender: Option<EventSender>) -> Self {
        Self { db, event_sender }
    }

    /// Opens an audit, snapshotting the record quantity at this moment.
    #[instrument(
        skip(self, request),
        fields(sku_id = %request.sku_id, location_id = %request.location_id)
    )]
    pub async fn open_audit(&self, request: OpenAudit) -> Result<stock_audit::Model, ServiceError> {
        let txn = self.db.begin().await.map_err(ServiceError::db_error)?;
        let result = open_in(&txn, &request).await;
        let audit = commit_or_rollback(txn, result).await?;

        info!(
            audit_id = %audit.id,
            quantity_before_audit = audit.quantity_before_audit,
            "Stock audit opened"
        );
        counter!("stock_ledger.audits.opened", 1);

        super::publish(
            &self.event_sender,
            Event::AuditOpened {
                audit_id: audit.id,
                sku_id: audit.sku_id,
                location_id: audit.location_id,
                quantity_before_audit: audit.quantity_before_audit,
            },
        )
        .await;

        Ok(audit)
    }

    /// Stores the physical count. A recount before completion overwrites the
    /// previous one; the stock record is not touched.
    #[instrument(skip(self))]
    pub async fn record_count(
        &self,
        audit_id: Uuid,
        quantity_recorded: i32,
        photo_ref: Option<String>,
    ) -> Result<stock_audit::Model, ServiceError> {
        if quantity_recorded < 0 {
            return Err(ServiceError::ValidationError(format!(
                "Counted quantity must not be negative, got {}",
                quantity_recorded
            )));
        }

        let db = &*self.db;
        let mut update = StockAuditEntity::update_many()
            .col_expr(
                stock_audit::Column::QuantityRecorded,
                Expr::value(quantity_recorded),
            )
            .col_expr(stock_audit::Column::UpdatedAt, Expr::value(Utc::now()))
            .filter(stock_audit::Column::Id.eq(audit_id))
            .filter(stock_audit::Column::IsCompleted.eq(false));
        if let Some(photo_ref) = photo_ref {
            update = update.col_expr(stock_audit::Column::PhotoRef, Expr::value(photo_ref));
        }

        let result = update.exec(db).await.map_err(ServiceError::db_error)?;
        if result.rows_affected == 0 {
            return Err(not_pending(db, audit_id).await);
        }

        let audit = find_audit_in(db, audit_id).await?;
        info!(
            quantity_before_audit = audit.quantity_before_audit,
            quantity_recorded,
            "Stock audit count recorded"
        );
        Ok(audit)
    }

    /// Completes an audit at most once, appending an `adjustment` for any
    /// discrepancy. On failure nothing is written and the audit stays pending.
    #[instrument(skip(self))]
    pub async fn complete(&self, audit_id: Uuid) -> Result<AuditCompletion, ServiceError> {
        let txn = self.db.begin().await.map_err(ServiceError::db_error)?;
        let result = complete_in(&txn, audit_id).await;
        let completion = match commit_or_rollback(txn, result).await {
            Ok(completion) => completion,
            Err(err) if err.is_soft() => {
                info!("Stock audit already completed");
                return Err(err);
            }
            Err(err) => {
                warn!(error = %err, "Stock audit completion failed");
                counter!("stock_ledger.audits.failed", 1, "reason" => err.code());
                return Err(err);
            }
        };

        let discrepancy = completion.audit.quantity_discrepancy().unwrap_or(0);
        info!(
            discrepancy,
            adjustment_movement_id = ?completion.audit.adjustment_movement_id,
            "Stock audit completed"
        );
        counter!("stock_ledger.audits.completed", 1);
        if let Some(adjustment) = &completion.adjustment {
            counter!(
                "stock_ledger.movements.appended",
                1,
                "movement_type" => adjustment.movement_type.to_string()
            );
            super::publish(&self.event_sender, Event::from(adjustment)).await;
        }

        super::publish(
            &self.event_sender,
            Event::AuditCompleted {
                audit_id: completion.audit.id,
                sku_id: completion.audit.sku_id,
                location_id: completion.audit.location_id,
                discrepancy,
                adjustment_movement_id: completion.audit.adjustment_movement_id,
            },
        )
        .await;

        Ok(completion)
    }

    #[instrument(skip(self))]
    pub async fn get_audit(&self, audit_id: Uuid) -> Result<stock_audit::Model, ServiceError> {
        find_audit_in(&*self.db, audit_id).await
    }

    /// Audits matching `filter`, newest first.
    #[instrument(skip(self))]
    pub async fn list_audits(
        &self,
        filter: AuditFilter,
        page: u64,
        limit: u64,
    ) -> Result<(Vec<stock_audit::Model>, u64), ServiceError> {
        super::validate_page(page, limit)?;

        let mut query = StockAuditEntity::find();
        if let Some(sku_id) = filter.sku_id {
            query = query.filter(stock_audit::Column::SkuId.eq(sku_id));
        }
        if let Some(location_id) = filter.location_id {
            query = query.filter(stock_audit::Column::LocationId.eq(location_id));
        }
        if let Some(status) = filter.status {
            query = query.filter(
                stock_audit::Column::IsCompleted.eq(status == AuditStatus::Completed),
            );
        }

        let paginator = query
            .order_by_desc(stock_audit::Column::CreatedAt)
            .paginate(&*self.db, limit);

        let total = paginator.num_items().await.map_err(ServiceError::db_error)?;
        let audits = paginator
            .fetch_page(page - 1)
            .await
            .map_err(ServiceError::db_error)?;

        Ok((audits, total))
    }
}
