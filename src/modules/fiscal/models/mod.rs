pub mod point_of_sale;
pub mod service_status;
pub mod ticket;
pub mod voucher;

pub use point_of_sale::PointOfSale;
pub use service_status::ServiceStatus;
pub use ticket::{AccessTicket, INVOICING_SERVICE};
pub use voucher::{
    AssociatedVoucher, Concept, CreditInvoiceDetails, DocType, VoucherClass, VoucherOutcome,
    VoucherRequest, VoucherResult, VoucherType,
};
