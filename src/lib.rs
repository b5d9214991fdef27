//! Fiscal billing service
//!
//! Electronic invoicing against the Argentine tax authority (WSAA login
//! tickets and WSFEv1 vouchers), local invoice records and settlement
//! invoicing for the logistics back office.

use std::sync::Arc;

use actix_web::web;

pub mod config;
pub mod core;
pub mod middleware;
pub mod modules;

pub use modules::fiscal;
pub use modules::invoices;
pub use modules::settlements;

use invoices::InvoiceService;
use settlements::SettlementService;

/// Services shared by every worker
#[derive(Clone)]
pub struct AppServices {
    pub invoices: Arc<InvoiceService>,
    pub settlements: Arc<SettlementService>,
}

/// Register the invoicing API: extractor error handlers, services and routes
pub fn configure_api(services: AppServices) -> impl FnOnce(&mut web::ServiceConfig) {
    move |cfg: &mut web::ServiceConfig| {
        cfg.app_data(web::JsonConfig::default().error_handler(middleware::json_error_handler))
            .app_data(web::QueryConfig::default().error_handler(middleware::query_error_handler))
            .app_data(web::PathConfig::default().error_handler(middleware::path_error_handler))
            .app_data(web::Data::new(services.invoices))
            .app_data(web::Data::new(services.settlements))
            .configure(invoices::controllers::configure)
            .configure(settlements::controllers::configure);
    }
}
