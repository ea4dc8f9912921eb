use sea_orm_migration::prelude::*;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20240601_000001_create_stock_records_table::Migration),
            Box::new(m20240601_000002_create_stock_movements_table::Migration),
            Box::new(m20240601_000003_create_stock_audits_table::Migration),
        ]
    }
}

mod m20240601_000001_create_stock_records_table {

    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240601_000001_create_stock_records_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(StockRecords::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(StockRecords::Id)
                                .uuid()
                                .primary_key()
                                .not_null(),
                        )
                        .col(ColumnDef::new(StockRecords::SkuId).uuid().not_null())
                        .col(ColumnDef::new(StockRecords::LocationId).uuid().not_null())
                        .col(
                            ColumnDef::new(StockRecords::Quantity)
                                .integer()
                                .not_null()
                                .default(0),
                        )
                        .col(
                            ColumnDef::new(StockRecords::ReservedQuantity)
                                .integer()
                                .not_null()
                                .default(0),
                        )
                        .col(
                            ColumnDef::new(StockRecords::LedgerSequence)
                                .big_integer()
                                .not_null()
                                .default(0),
                        )
                        .col(
                            ColumnDef::new(StockRecords::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(StockRecords::UpdatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .to_owned(),
                )
                .await?;

            // One record per (sku, location); lazy creation relies on this to
            // resolve concurrent first access.
            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_stock_records_sku_location")
                        .table(StockRecords::Table)
                        .col(StockRecords::SkuId)
                        .col(StockRecords::LocationId)
                        .unique()
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_stock_records_location_id")
                        .table(StockRecords::Table)
                        .col(StockRecords::LocationId)
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(StockRecords::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    pub(crate) enum StockRecords {
        Table,
        Id,
        SkuId,
        LocationId,
        Quantity,
        ReservedQuantity,
        LedgerSequence,
        CreatedAt,
        UpdatedAt,
    }
}

mod m20240601_000002_create_stock_movements_table {

    use super::m20240601_000001_create_stock_records_table::StockRecords;
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240601_000002_create_stock_movements_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(StockMovements::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(StockMovements::Id)
                                .uuid()
                                .primary_key()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(StockMovements::StockRecordId)
                                .uuid()
                                .not_null(),
                        )
                        .col(ColumnDef::new(StockMovements::SkuId).uuid().not_null())
                        .col(ColumnDef::new(StockMovements::LocationId).uuid().not_null())
                        .col(
                            ColumnDef::new(StockMovements::QuantityChanged)
                                .integer()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(StockMovements::MovementType)
                                .string_len(32)
                                .not_null(),
                        )
                        .col(ColumnDef::new(StockMovements::CauseType).string_len(32).null())
                        .col(ColumnDef::new(StockMovements::CauseId).uuid().null())
                        .col(ColumnDef::new(StockMovements::Note).text().null())
                        .col(ColumnDef::new(StockMovements::CreatedBy).uuid().null())
                        .col(
                            ColumnDef::new(StockMovements::Sequence)
                                .big_integer()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(StockMovements::QuantityAfter)
                                .integer()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(StockMovements::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_stock_movements_stock_record")
                                .from(StockMovements::Table, StockMovements::StockRecordId)
                                .to(StockRecords::Table, StockRecords::Id)
                                .on_delete(ForeignKeyAction::Restrict)
                                .on_update(ForeignKeyAction::Restrict),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_stock_movements_record_sequence")
                        .table(StockMovements::Table)
                        .col(StockMovements::StockRecordId)
                        .col(StockMovements::Sequence)
                        .unique()
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_stock_movements_sku_location_created")
                        .table(StockMovements::Table)
                        .col(StockMovements::SkuId)
                        .col(StockMovements::LocationId)
                        .col(StockMovements::CreatedAt)
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_stock_movements_type")
                        .table(StockMovements::Table)
                        .col(StockMovements::MovementType)
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_stock_movements_cause")
                        .table(StockMovements::Table)
                        .col(StockMovements::CauseType)
                        .col(StockMovements::CauseId)
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(StockMovements::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    enum StockMovements {
        Table,
        Id,
        StockRecordId,
        SkuId,
        LocationId,
        QuantityChanged,
        MovementType,
        CauseType,
        CauseId,
        Note,
        CreatedBy,
        Sequence,
        QuantityAfter,
        CreatedAt,
    }
}

mod m20240601_000003_create_stock_audits_table {

    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240601_000003_create_stock_audits_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(StockAudits::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(StockAudits::Id)
                                .uuid()
                                .primary_key()
                                .not_null(),
                        )
                        .col(ColumnDef::new(StockAudits::SkuId).uuid().not_null())
                        .col(ColumnDef::new(StockAudits::LocationId).uuid().not_null())
                        .col(ColumnDef::new(StockAudits::AuditorId).uuid().not_null())
                        .col(
                            ColumnDef::new(StockAudits::QuantityBeforeAudit)
                                .integer()
                                .not_null(),
                        )
                        .col(ColumnDef::new(StockAudits::QuantityRecorded).integer().null())
                        .col(
                            ColumnDef::new(StockAudits::IsCompleted)
                                .boolean()
                                .not_null()
                                .default(false),
                        )
                        .col(
                            ColumnDef::new(StockAudits::CompletedAt)
                                .timestamp_with_time_zone()
                                .null(),
                        )
                        .col(ColumnDef::new(StockAudits::PhotoRef).string().null())
                        .col(ColumnDef::new(StockAudits::Notes).text().null())
                        .col(
                            ColumnDef::new(StockAudits::AdjustmentMovementId)
                                .uuid()
                                .null(),
                        )
                        .col(
                            ColumnDef::new(StockAudits::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(StockAudits::UpdatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_stock_audits_location_completed")
                        .table(StockAudits::Table)
                        .col(StockAudits::LocationId)
                        .col(StockAudits::IsCompleted)
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_stock_audits_sku_location")
                        .table(StockAudits::Table)
                        .col(StockAudits::SkuId)
                        .col(StockAudits::LocationId)
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(StockAudits::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    enum StockAudits {
        Table,
        Id,
        SkuId,
        LocationId,
        AuditorId,
        QuantityBeforeAudit,
        QuantityRecorded,
        IsCompleted,
        CompletedAt,
        PhotoRef,
        Notes,
        AdjustmentMovementId,
        CreatedAt,
        UpdatedAt,
    }
}
