pub mod invoice_repository;

pub use invoice_repository::{insert_invoice, InvoiceRepository, MySqlInvoiceRepository};
