// Settlements module: invoicing client settlements and repairing interrupted runs

pub mod controllers;
pub mod models;
pub mod repositories;
pub mod services;

pub use models::{ClientSettlement, SettlementStatus};
pub use repositories::{MySqlSettlementRepository, SettlementRepository};
pub use services::SettlementService;
