pub mod fiscal_config_repository;

pub use fiscal_config_repository::{FiscalConfigRepository, MySqlFiscalConfigRepository};
