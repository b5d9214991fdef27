mod settlement;

pub use settlement::{
    ClientSettlement, Counterparty, HeldClaim, InvoiceSettlementRequest, ReconcileReport,
    ReleasedClaim, RepairedSettlement, SettlementClaim, SettlementInvoicing, SettlementStatus, SettlementView,
};
