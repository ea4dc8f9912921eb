use std::sync::Arc;

use chrono::Utc;
use sea_orm::{
    sea_query::OnConflict, ActiveValue::Set, ColumnTrait, ConnectionTrait, DatabaseConnection,
    EntityTrait, PaginatorTrait, QueryFilter, QueryOrder,
};
use tracing::{debug, instrument};
use uuid::Uuid;

use crate::{
    entities::stock_record::{self, Entity as StockRecordEntity},
    errors::ServiceError,
};

pub(crate) async fn find_in<C: ConnectionTrait>(
    conn: &C,
    sku_id: Uuid,
    location_id: Uuid,
) -> Result<Option<stock_record::Model>, ServiceError> {
    StockRecordEntity::find()
        .filter(stock_record::Column::SkuId.eq(sku_id))
        .filter(stock_record::Column::LocationId.eq(location_id))
        .one(conn)
        .await
        .map_err(ServiceError::db_error)
}

pub(crate) async fn find_by_id_in<C: ConnectionTrait>(
    conn: &C,
    record_id: Uuid,
) -> Result<stock_record::Model, ServiceError> {
    StockRecordEntity::find_by_id(record_id)
        .one(conn)
        .await
        .map_err(ServiceError::db_error)?
        .ok_or_else(|| ServiceError::NotFound(format!("Stock record {} not found", record_id)))
}

/// Insert-if-absent on the (sku, location) unique index, then read back.
/// Concurrent first access resolves to the same row.
pub(crate) async fn get_or_create_in<C: ConnectionTrait>(
    conn: &C,
    sku_id: Uuid,
    location_id: Uuid,
) -> Result<stock_record::Model, ServiceError> {
    if let Some(existing) = find_in(conn, sku_id, location_id).await? {
        return Ok(existing);
    }

    let now = Utc::now();
    let record = stock_record::ActiveModel {
        id: Set(Uuid::new_v4()),
        sku_id: Set(sku_id),
        location_id: Set(location_id),
        quantity: Set(0),
        reserved_quantity: Set(0),
        ledger_sequence: Set(0),
        created_at: Set(now),
        updated_at: Set(now),
    };

    let inserted = StockRecordEntity::insert(record)
        .on_conflict(
            OnConflict::columns([
                stock_record::Column::SkuId,
                stock_record::Column::LocationId,
            ])
            .do_nothing()
            .to_owned(),
        )
        .exec_without_returning(conn)
        .await
        .map_err(ServiceError::db_error)?;

    if inserted > 0 {
        debug!(%sku_id, %location_id, "Created stock record");
    }

    find_in(conn, sku_id, location_id).await?.ok_or_else(|| {
        ServiceError::InternalError(format!(
            "Stock record for sku {} at location {} vanished after creation",
            sku_id, location_id
        ))
    })
}

/// Read access to per-(SKU, location) stock records.
#[derive(Clone)]
pub struct StockRecordService {
    db: Arc<DatabaseConnection>,
}

impl StockRecordService {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    #[instrument(skip(self))]
    pub async fn get_or_create(
        &self,
        sku_id: Uuid,
        location_id: Uuid,
    ) -> Result<stock_record::Model, ServiceError> {
        get_or_create_in(&*self.db, sku_id, location_id).await
    }

    #[instrument(skip(self))]
    pub async fn get(
        &self,
        sku_id: Uuid,
        location_id: Uuid,
    ) -> Result<Option<stock_record::Model>, ServiceError> {
        find_in(&*self.db, sku_id, location_id).await
    }

    /// `quantity - reserved_quantity`; zero for a pair that was never stocked.
    #[instrument(skip(self))]
    pub async fn available_quantity(
        &self,
        sku_id: Uuid,
        location_id: Uuid,
    ) -> Result<i32, ServiceError> {
        Ok(find_in(&*self.db, sku_id, location_id)
            .await?
            .map(|record| record.available_quantity())
            .unwrap_or(0))
    }

    #[instrument(skip(self))]
    pub async fn list_for_location(
        &self,
        location_id: Uuid,
        page: u64,
        limit: u64,
    ) -> Result<(Vec<stock_record::Model>, u64), ServiceError> {
        super::validate_page(page, limit)?;

        let paginator = StockRecordEntity::find()
            .filter(stock_record::Column::LocationId.eq(location_id))
            .order_by_asc(stock_record::Column::SkuId)
            .paginate(&*self.db, limit);

        let total = paginator.num_items().await.map_err(ServiceError::db_error)?;
        let records = paginator
            .fetch_page(page - 1)
            .await
            .map_err(ServiceError::db_error)?;

        Ok((records, total))
    }

    #[instrument(skip(self))]
    pub async fn list_for_sku(
        &self,
        sku_id: Uuid,
    ) -> Result<Vec<stock_record::Model>, ServiceError> {
        StockRecordEntity::find()
            .filter(stock_record::Column::SkuId.eq(sku_id))
            .order_by_asc(stock_record::Column::LocationId)
            .all(&*self.db)
            .await
            .map_err(ServiceError::db_error)
    }
}
