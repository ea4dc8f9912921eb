pub mod stock_audit;
pub mod stock_movement;
pub mod stock_record;
