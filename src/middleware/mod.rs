pub mod error_handler;
pub mod identity;
pub mod rate_limit;
pub mod request_id;

pub use error_handler::{json_error_handler, path_error_handler, query_error_handler};
pub use identity::{sign_identity, AuthenticatedUser, IdentityAuth};
pub use rate_limit::RateLimiter;
pub use request_id::{RequestId, RequestIdTagger};
