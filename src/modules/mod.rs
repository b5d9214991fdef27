pub mod fiscal;
pub mod health;
pub mod invoices;
pub mod settlements;
