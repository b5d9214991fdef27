mod fiscal_qr;
mod invoice;
mod invoice_number;

pub use invoice::{
    AttachPdfRequest, ConfigSummary, CredentialSummary, Invoice, InvoiceFilter, InvoiceKind,
    IssueInvoiceRequest, IssuedInvoice, NewInvoice, StatusQuery, StatusReport,
    DEFAULT_IVA_CONDITION,
};
pub use fiscal_qr::{FiscalQr, QR_URL_PREFIX};
pub use invoice_number::InvoiceNumber;
