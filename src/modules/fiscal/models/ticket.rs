use chrono::{DateTime, Utc};
use std::fmt;
use std::time::Duration;

/// Name of the electronic invoicing service in login requests
pub const INVOICING_SERVICE: &str = "wsfe";

/// Signed access ticket issued by the authentication service
#[derive(Clone)]
pub struct AccessTicket {
    pub service: String,
    pub token: String,
    pub sign: String,
    pub expires_at: DateTime<Utc>,
}

impl AccessTicket {
    /// Usable while `now` is before expiry minus the safety margin
    pub fn is_usable_at(&self, now: DateTime<Utc>, safety_margin: Duration) -> bool {
        let margin = chrono::Duration::from_std(safety_margin).unwrap_or(chrono::Duration::zero());
        now < self.expires_at - margin
    }
}

impl fmt::Debug for AccessTicket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccessTicket")
            .field("service", &self.service)
            .field("token_len", &self.token.len())
            .field("sign_len", &self.sign.len())
            .field("expires_at", &self.expires_at)
            .finish()
    }
}
