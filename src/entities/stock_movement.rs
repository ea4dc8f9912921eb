use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use sea_orm::{ActiveModelBehavior, ActiveValue, Set};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Reason a quantity changed.
#[derive(
    Clone,
    Copy,
    Debug,
    PartialEq,
    Eq,
    Hash,
    EnumIter,
    DeriveActiveEnum,
    Serialize,
    Deserialize,
    strum::Display,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(32))")]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum MovementType {
    #[sea_orm(string_value = "sale")]
    Sale,
    #[sea_orm(string_value = "purchase")]
    Purchase,
    #[sea_orm(string_value = "adjustment")]
    Adjustment,
    #[sea_orm(string_value = "customer_return")]
    CustomerReturn,
    #[sea_orm(string_value = "transfer_out")]
    TransferOut,
    #[sea_orm(string_value = "transfer_in")]
    TransferIn,
}

impl MovementType {
    /// Whether a signed delta is meaningful for this movement type.
    /// Outbound types only remove stock, inbound types only add it,
    /// adjustments go either way.
    pub fn accepts(&self, quantity_changed: i32) -> bool {
        match self {
            MovementType::Sale | MovementType::TransferOut => quantity_changed < 0,
            MovementType::Purchase | MovementType::CustomerReturn | MovementType::TransferIn => {
                quantity_changed > 0
            }
            MovementType::Adjustment => quantity_changed != 0,
        }
    }
}

/// Kind of document that caused a movement.
#[derive(
    Clone,
    Copy,
    Debug,
    PartialEq,
    Eq,
    Hash,
    EnumIter,
    DeriveActiveEnum,
    Serialize,
    Deserialize,
    strum::Display,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(32))")]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum CauseType {
    #[sea_orm(string_value = "order")]
    Order,
    #[sea_orm(string_value = "audit")]
    Audit,
    #[sea_orm(string_value = "transfer")]
    Transfer,
    #[sea_orm(string_value = "purchase_order")]
    PurchaseOrder,
    #[sea_orm(string_value = "other")]
    Other,
}

/// Immutable record of a quantity change for one (SKU, location) pair.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "stock_movements")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub stock_record_id: Uuid,
    pub sku_id: Uuid,
    pub location_id: Uuid,
    /// Positive for stock in, negative for stock out.
    pub quantity_changed: i32,
    pub movement_type: MovementType,
    pub cause_type: Option<CauseType>,
    pub cause_id: Option<Uuid>,
    #[sea_orm(column_type = "Text", nullable)]
    pub note: Option<String>,
    pub created_by: Option<Uuid>,
    /// 1-based position of this entry in the pair's ledger.
    pub sequence: i64,
    /// Record quantity right after this movement was applied.
    pub quantity_after: i32,
    pub created_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::stock_record::Entity",
        from = "Column::StockRecordId",
        to = "super::stock_record::Column::Id"
    )]
    StockRecord,
}

impl Related<super::stock_record::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::StockRecord.def()
    }
}

#[async_trait]
impl ActiveModelBehavior for ActiveModel {
    async fn before_save<C: ConnectionTrait>(self, _db: &C, insert: bool) -> Result<Self, DbErr>
    where
        C: ConnectionTrait,
    {
        if !insert {
            return Err(DbErr::Custom(
                "stock movements are append-only and cannot be updated".to_string(),
            ));
        }

        let mut active_model = self;
        if let ActiveValue::NotSet = active_model.id {
            active_model.id = Set(Uuid::new_v4());
        }
        if let ActiveValue::NotSet = active_model.created_at {
            active_model.created_at = Set(Utc::now());
        }
        Ok(active_model)
    }

    async fn before_delete<C>(self, _db: &C) -> Result<Self, DbErr>
    where
        C: ConnectionTrait,
    {
        Err(DbErr::Custom(
            "stock movements are append-only and cannot be deleted".to_string(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(MovementType::Sale, -3, true)]
    #[case(MovementType::Sale, 3, false)]
    #[case(MovementType::TransferOut, -1, true)]
    #[case(MovementType::Purchase, 10, true)]
    #[case(MovementType::Purchase, -10, false)]
    #[case(MovementType::CustomerReturn, 2, true)]
    #[case(MovementType::TransferIn, 0, false)]
    #[case(MovementType::Adjustment, -8, true)]
    #[case(MovementType::Adjustment, 8, true)]
    #[case(MovementType::Adjustment, 0, false)]
    fn movement_type_sign_rules(
        #[case] movement_type: MovementType,
        #[case] delta: i32,
        #[case] accepted: bool,
    ) {
        assert_eq!(movement_type.accepts(delta), accepted);
    }

    #[test]
    fn movement_type_display_matches_storage_value() {
        assert_eq!(MovementType::CustomerReturn.to_string(), "customer_return");
        assert_eq!(MovementType::TransferIn.to_string(), "transfer_in");
        assert_eq!(CauseType::PurchaseOrder.to_string(), "purchase_order");
    }

    #[test]
    fn movement_type_serializes_snake_case() {
        let json = serde_json::to_string(&MovementType::TransferOut).unwrap();
        assert_eq!(json, "\"transfer_out\"");
        let parsed: MovementType = serde_json::from_str("\"customer_return\"").unwrap();
        assert_eq!(parsed, MovementType::CustomerReturn);
    }
}
