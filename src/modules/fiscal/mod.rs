// Fiscal module: tax authority authentication and electronic invoicing client

pub mod models;
pub mod repositories;
pub mod services;

pub use models::{VoucherRequest, VoucherResult, VoucherType};
pub use services::{CredentialCache, FiscalClient};
