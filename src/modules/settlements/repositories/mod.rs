pub mod settlement_repository;

pub use settlement_repository::{MySqlSettlementRepository, SettlementRepository};
