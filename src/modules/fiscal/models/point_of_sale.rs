use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::voucher::VoucherType;

/// Point of sale registered with the authority
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PointOfSale {
    pub number: u32,
    /// Emission mode reported by the authority (e.g. `CAE`, `CAEA`)
    pub emission_type: String,
    pub blocked: bool,
    pub deleted_on: Option<NaiveDate>,
    pub enabled_voucher_types: Vec<VoucherType>,
}

impl PointOfSale {
    pub fn is_active(&self) -> bool {
        !self.blocked && self.deleted_on.is_none()
    }
}
