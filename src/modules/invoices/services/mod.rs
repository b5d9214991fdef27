pub mod invoice_service;

pub use invoice_service::{InvoiceCounterparty, InvoiceService, IssueFlow};
