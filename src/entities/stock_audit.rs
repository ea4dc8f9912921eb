use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use sea_orm::{ActiveModelBehavior, ActiveValue, Set};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Audit workflow state. `Completed` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum::Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum AuditStatus {
    Pending,
    Completed,
}

/// A physical count of one (SKU, location) pair, reconciled against the ledger.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "stock_audits")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub sku_id: Uuid,
    pub location_id: Uuid,
    pub auditor_id: Uuid,
    /// Record quantity captured when the audit was opened.
    pub quantity_before_audit: i32,
    /// Physically counted quantity; unset until the count is recorded.
    pub quantity_recorded: Option<i32>,
    pub is_completed: bool,
    pub completed_at: Option<DateTime<Utc>>,
    pub photo_ref: Option<String>,
    #[sea_orm(column_type = "Text", nullable)]
    pub notes: Option<String>,
    pub adjustment_movement_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Model {
    pub fn status(&self) -> AuditStatus {
        if self.is_completed {
            AuditStatus::Completed
        } else {
            AuditStatus::Pending
        }
    }

    /// `quantity_recorded - quantity_before_audit`, once a count exists.
    /// `None` also when the difference does not fit in an `i32`.
    pub fn quantity_discrepancy(&self) -> Option<i32> {
        self.quantity_recorded
            .and_then(|recorded| recorded.checked_sub(self.quantity_before_audit))
    }
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

#[async_trait]
impl ActiveModelBehavior for ActiveModel {
    async fn before_save<C: ConnectionTrait>(self, _db: &C, insert: bool) -> Result<Self, DbErr>
    where
        C: ConnectionTrait,
    {
        let mut active_model = self;
        let now = Utc::now();

        if insert {
            if let ActiveValue::NotSet = active_model.id {
                active_model.id = Set(Uuid::new_v4());
            }
            active_model.created_at = Set(now);
        }
        active_model.updated_at = Set(now);

        Ok(active_model)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn audit(before: i32, recorded: Option<i32>, completed: bool) -> Model {
        let now = Utc::now();
        Model {
            id: Uuid::new_v4(),
            sku_id: Uuid::new_v4(),
            location_id: Uuid::new_v4(),
            auditor_id: Uuid::new_v4(),
            quantity_before_audit: before,
            quantity_recorded: recorded,
            is_completed: completed,
            completed_at: completed.then_some(now),
            photo_ref: None,
            notes: None,
            adjustment_movement_id: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn discrepancy_is_recorded_minus_snapshot() {
        assert_eq!(audit(100, Some(92), false).quantity_discrepancy(), Some(-8));
        assert_eq!(audit(30, Some(30), false).quantity_discrepancy(), Some(0));
        assert_eq!(audit(30, None, false).quantity_discrepancy(), None);
        assert_eq!(audit(-5, Some(i32::MAX), false).quantity_discrepancy(), None);
    }

    #[test]
    fn status_follows_completion_flag() {
        assert_eq!(audit(1, None, false).status(), AuditStatus::Pending);
        assert_eq!(audit(1, Some(1), true).status(), AuditStatus::Completed);
    }
}
