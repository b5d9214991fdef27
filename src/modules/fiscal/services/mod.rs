pub mod credential_cache;
pub mod fiscal_client;
pub mod signer;
pub mod soap;
pub mod transport;
pub mod wsaa;
pub mod wsfe;

pub use credential_cache::CredentialCache;
pub use fiscal_client::FiscalClient;
pub use signer::{OpensslSigner, TicketSigner};
pub use transport::{HttpSoapTransport, SoapReply, SoapRequest, SoapTransport};
