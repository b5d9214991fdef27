use serde::{Deserialize, Serialize};

/// Availability of the three sub-services probed by `FEDummy`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceStatus {
    pub app_server: bool,
    pub db_server: bool,
    pub auth_server: bool,
}

impl ServiceStatus {
    pub fn all_up(&self) -> bool {
        self.app_server && self.db_server && self.auth_server
    }
}
