use crate::entities::{
    stock_audit::AuditStatus,
    stock_movement::{CauseType, MovementType},
    stock_record,
};
use crate::errors::ServiceError;
use crate::handlers::common::{
    created_response, paginated_response, success_response, validate_input, PaginationParams,
};
use crate::services::{AuditFilter, MovementFilter, NewMovement, OpenAudit, StockServices};
use axum::{
    extract::{Json, Path, Query, State},
    response::Response,
    routing::{get, post},
    Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

/// State the stock handlers need: the services plus page size limits.
pub trait StockHandlerState: Clone + Send + Sync + 'static {
    fn stock_services(&self) -> &StockServices;

    fn default_page_size(&self) -> u64 {
        20
    }

    fn max_page_size(&self) -> u64 {
        100
    }
}

/// Stock record as exposed over HTTP, with the derived available quantity.
#[derive(Debug, Serialize, Deserialize)]
pub struct StockRecordView {
    #[serde(flatten)]
    pub record: stock_record::Model,
    pub available_quantity: i32,
}

impl From<stock_record::Model> for StockRecordView {
    fn from(record: stock_record::Model) -> Self {
        Self {
            available_quantity: record.available_quantity(),
            record,
        }
    }
}

#[derive(Debug, Deserialize, Validate)]
pub struct AppendMovementRequest {
    pub sku_id: Uuid,
    pub location_id: Uuid,
    pub quantity_changed: i32,
    pub movement_type: MovementType,
    pub cause_type: Option<CauseType>,
    pub cause_id: Option<Uuid>,
    #[validate(length(max = 1000))]
    pub note: Option<String>,
    pub created_by: Option<Uuid>,
    #[serde(default)]
    pub force: bool,
}

impl From<AppendMovementRequest> for NewMovement {
    fn from(req: AppendMovementRequest) -> Self {
        NewMovement {
            sku_id: req.sku_id,
            location_id: req.location_id,
            quantity_changed: req.quantity_changed,
            movement_type: req.movement_type,
            cause_type: req.cause_type,
            cause_id: req.cause_id,
            note: req.note,
            created_by: req.created_by,
            force: req.force,
        }
    }
}

#[derive(Debug, Deserialize, Validate)]
pub struct ReservationRequest {
    pub sku_id: Uuid,
    pub location_id: Uuid,
    #[validate(range(min = 1))]
    pub quantity: i32,
}

#[derive(Debug, Deserialize, Validate)]
pub struct ConsumeRequest {
    pub sku_id: Uuid,
    pub location_id: Uuid,
    #[validate(range(min = 1))]
    pub quantity: i32,
    pub order_id: Option<Uuid>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct OpenAuditRequest {
    pub sku_id: Uuid,
    pub location_id: Uuid,
    pub auditor_id: Uuid,
    #[validate(length(max = 2000))]
    pub notes: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct RecordCountRequest {
    #[validate(range(min = 0))]
    pub quantity_recorded: i32,
    #[validate(length(min = 1, max = 512))]
    pub photo_ref: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct MovementHistoryQuery {
    pub sku_id: Option<Uuid>,
    pub location_id: Option<Uuid>,
    pub movement_type: Option<MovementType>,
    pub cause_type: Option<CauseType>,
    pub cause_id: Option<Uuid>,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
    pub page: Option<u64>,
    pub limit: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
pub struct AuditListQuery {
    pub sku_id: Option<Uuid>,
    pub location_id: Option<Uuid>,
    pub status: Option<AuditStatus>,
    pub page: Option<u64>,
    pub limit: Option<u64>,
}

/// Create the stock router
pub fn stock_routes<S>() -> Router<S>
where
    S: StockHandlerState,
{
    Router::new()
        .route("/records/:sku_id/:location_id", get(get_record::<S>))
        .route(
            "/records/:sku_id/:location_id/ledger-check",
            get(ledger_check::<S>),
        )
        .route("/skus/:sku_id/records", get(list_sku_records::<S>))
        .route(
            "/locations/:location_id/records",
            get(list_location_records::<S>),
        )
        .route(
            "/movements",
            post(append_movement::<S>).get(list_movements::<S>),
        )
        .route("/movements/:id", get(get_movement::<S>))
        .route("/reservations/reserve", post(reserve::<S>))
        .route("/reservations/release", post(release::<S>))
        .route("/reservations/consume", post(consume::<S>))
        .route("/audits", post(open_audit::<S>).get(list_audits::<S>))
        .route("/audits/:id", get(get_audit::<S>))
        .route("/audits/:id/count", post(record_count::<S>))
        .route("/audits/:id/complete", post(complete_audit::<S>))
}

fn resolve_page<S: StockHandlerState>(
    state: &S,
    page: Option<u64>,
    limit: Option<u64>,
) -> (u64, u64) {
    PaginationParams { page, limit }.resolve(state.default_page_size(), state.max_page_size())
}

/// Stock record for one (SKU, location) pair
pub async fn get_record<S>(
    State(state): State<S>,
    Path((sku_id, location_id)): Path<(Uuid, Uuid)>,
) -> Result<Response, ServiceError>
where
    S: StockHandlerState,
{
    let record = state
        .stock_services()
        .records
        .get(sku_id, location_id)
        .await?
        .ok_or_else(|| {
            ServiceError::NotFound(format!(
                "No stock record for sku {} at location {}",
                sku_id, location_id
            ))
        })?;

    Ok(success_response(StockRecordView::from(record)))
}

/// Compares a record with the sum of its ledger
pub async fn ledger_check<S>(
    State(state): State<S>,
    Path((sku_id, location_id)): Path<(Uuid, Uuid)>,
) -> Result<Response, ServiceError>
where
    S: StockHandlerState,
{
    let check = state
        .stock_services()
        .ledger
        .verify_consistency(sku_id, location_id)
        .await?;
    Ok(success_response(check))
}

pub async fn list_sku_records<S>(
    State(state): State<S>,
    Path(sku_id): Path<Uuid>,
) -> Result<Response, ServiceError>
where
    S: StockHandlerState,
{
    let records = state.stock_services().records.list_for_sku(sku_id).await?;
    let views: Vec<StockRecordView> = records.into_iter().map(StockRecordView::from).collect();
    Ok(success_response(views))
}

pub async fn list_location_records<S>(
    State(state): State<S>,
    Path(location_id): Path<Uuid>,
    Query(params): Query<PaginationParams>,
) -> Result<Response, ServiceError>
where
    S: StockHandlerState,
{
    let (page, limit) = resolve_page(&state, params.page, params.limit);
    let (records, total) = state
        .stock_services()
        .records
        .list_for_location(location_id, page, limit)
        .await?;
    let views: Vec<StockRecordView> = records.into_iter().map(StockRecordView::from).collect();
    Ok(paginated_response(views, total, page, limit))
}

/// Append a movement to the ledger
pub async fn append_movement<S>(
    State(state): State<S>,
    Json(payload): Json<AppendMovementRequest>,
) -> Result<Response, ServiceError>
where
    S: StockHandlerState,
{
    validate_input(&payload)?;
    let entry = state.stock_services().ledger.append(payload.into()).await?;
    Ok(created_response(entry))
}

pub async fn list_movements<S>(
    State(state): State<S>,
    Query(query): Query<MovementHistoryQuery>,
) -> Result<Response, ServiceError>
where
    S: StockHandlerState,
{
    let (page, limit) = resolve_page(&state, query.page, query.limit);
    let filter = MovementFilter {
        sku_id: query.sku_id,
        location_id: query.location_id,
        movement_type: query.movement_type,
        cause_type: query.cause_type,
        cause_id: query.cause_id,
        from: query.from,
        to: query.to,
    };
    let (movements, total) = state
        .stock_services()
        .ledger
        .history(filter, page, limit)
        .await?;
    Ok(paginated_response(movements, total, page, limit))
}

pub async fn get_movement<S>(
    State(state): State<S>,
    Path(id): Path<Uuid>,
) -> Result<Response, ServiceError>
where
    S: StockHandlerState,
{
    let entry = state.stock_services().ledger.get(id).await?;
    Ok(success_response(entry))
}

pub async fn reserve<S>(
    State(state): State<S>,
    Json(payload): Json<ReservationRequest>,
) -> Result<Response, ServiceError>
where
    S: StockHandlerState,
{
    validate_input(&payload)?;
    let record = state
        .stock_services()
        .reservations
        .reserve(payload.sku_id, payload.location_id, payload.quantity)
        .await?;
    Ok(success_response(StockRecordView::from(record)))
}

pub async fn release<S>(
    State(state): State<S>,
    Json(payload): Json<ReservationRequest>,
) -> Result<Response, ServiceError>
where
    S: StockHandlerState,
{
    validate_input(&payload)?;
    let record = state
        .stock_services()
        .reservations
        .release(payload.sku_id, payload.location_id, payload.quantity)
        .await?;
    Ok(success_response(StockRecordView::from(record)))
}

pub async fn consume<S>(
    State(state): State<S>,
    Json(payload): Json<ConsumeRequest>,
) -> Result<Response, ServiceError>
where
    S: StockHandlerState,
{
    validate_input(&payload)?;
    let outcome = state
        .stock_services()
        .reservations
        .consume(
            payload.sku_id,
            payload.location_id,
            payload.quantity,
            payload.order_id,
        )
        .await?;
    Ok(success_response(outcome))
}

/// Open a stock audit, snapshotting the current quantity
pub async fn open_audit<S>(
    State(state): State<S>,
    Json(payload): Json<OpenAuditRequest>,
) -> Result<Response, ServiceError>
where
    S: StockHandlerState,
{
    validate_input(&payload)?;
    let audit = state
        .stock_services()
        .reconciliation
        .open_audit(OpenAudit {
            sku_id: payload.sku_id,
            location_id: payload.location_id,
            auditor_id: payload.auditor_id,
            notes: payload.notes,
        })
        .await?;
    Ok(created_response(audit))
}

pub async fn list_audits<S>(
    State(state): State<S>,
    Query(query): Query<AuditListQuery>,
) -> Result<Response, ServiceError>
where
    S: StockHandlerState,
{
    let (page, limit) = resolve_page(&state, query.page, query.limit);
    let filter = AuditFilter {
        sku_id: query.sku_id,
        location_id: query.location_id,
        status: query.status,
    };
    let (audits, total) = state
        .stock_services()
        .reconciliation
        .list_audits(filter, page, limit)
        .await?;
    Ok(paginated_response(audits, total, page, limit))
}

pub async fn get_audit<S>(
    State(state): State<S>,
    Path(id): Path<Uuid>,
) -> Result<Response, ServiceError>
where
    S: StockHandlerState,
{
    let audit = state.stock_services().reconciliation.get_audit(id).await?;
    Ok(success_response(audit))
}

pub async fn record_count<S>(
    State(state): State<S>,
    Path(id): Path<Uuid>,
    Json(payload): Json<RecordCountRequest>,
) -> Result<Response, ServiceError>
where
    S: StockHandlerState,
{
    validate_input(&payload)?;
    let audit = state
        .stock_services()
        .reconciliation
        .record_count(id, payload.quantity_recorded, payload.photo_ref)
        .await?;
    Ok(success_response(audit))
}

/// Complete an audit; answers 409 if it was already completed
pub async fn complete_audit<S>(
    State(state): State<S>,
    Path(id): Path<Uuid>,
) -> Result<Response, ServiceError>
where
    S: StockHandlerState,
{
    let completion = state.stock_services().reconciliation.complete(id).await?;
    Ok(success_response(completion))
}
