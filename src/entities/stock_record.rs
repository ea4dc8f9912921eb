use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Current inventory state for one (SKU, location) pair.
///
/// Rows are only ever changed through storage-evaluated increments issued by
/// the movement ledger and the reservation manager; there is no code path
/// that writes an absolute quantity back.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "stock_records")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub sku_id: Uuid,
    pub location_id: Uuid,
    /// On-hand physical quantity.
    pub quantity: i32,
    /// Quantity committed to open orders.
    pub reserved_quantity: i32,
    /// Number of movements appended for this pair.
    pub ledger_sequence: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Model {
    pub fn available_quantity(&self) -> i32 {
        self.quantity - self.reserved_quantity
    }
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::stock_movement::Entity")]
    StockMovements,
}

impl Related<super::stock_movement::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::StockMovements.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn available_quantity_subtracts_reserved() {
        let now = Utc::now();
        let record = Model {
            id: Uuid::new_v4(),
            sku_id: Uuid::new_v4(),
            location_id: Uuid::new_v4(),
            quantity: 50,
            reserved_quantity: 20,
            ledger_sequence: 1,
            created_at: now,
            updated_at: now,
        };
        assert_eq!(record.available_quantity(), 30);
    }
}
