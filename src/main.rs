use std::sync::Arc;

use actix_cors::Cors;
use actix_web::{web, App, HttpResponse, HttpServer};
use anyhow::Context;
use tracing_actix_web::TracingLogger;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use fiscal_billing::config::Config;
use fiscal_billing::fiscal::repositories::{FiscalConfigRepository, MySqlFiscalConfigRepository};
use fiscal_billing::fiscal::FiscalClient;
use fiscal_billing::invoices::{InvoiceService, MySqlInvoiceRepository};
use fiscal_billing::middleware::{IdentityAuth, RateLimiter, RequestIdTagger};
use fiscal_billing::modules::health;
use fiscal_billing::settlements::{MySqlSettlementRepository, SettlementService};
use fiscal_billing::{configure_api, AppServices};

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    let mut config = Config::from_env().context("Failed to load configuration")?;
    init_tracing(&config);

    tracing::info!("Starting fiscal billing service");
    tracing::info!("Environment: {}", config.app.env);
    tracing::info!("Server binding to: {}", config.server.bind_address());

    let db_pool = config
        .database
        .create_pool()
        .await
        .context("Failed to create database pool")?;

    tracing::info!(
        "Database pool initialized ({} connections)",
        config.database.pool_size
    );

    if config.database.run_migrations {
        config
            .database
            .migrate(&db_pool)
            .await
            .context("Failed to apply migrations")?;
        tracing::info!("Migrations applied");
    }

    if !config.fiscal.has_signing_material() || config.fiscal.cuit.is_empty() {
        let stored = MySqlFiscalConfigRepository::new(db_pool.clone())
            .find_active()
            .await
            .context("Failed to read stored fiscal configuration")?;
        match stored {
            Some(stored) => {
                config
                    .fiscal
                    .merge_stored(stored)
                    .context("Invalid stored fiscal configuration")?;
                tracing::info!("Fiscal configuration completed from afip_config");
            }
            None => tracing::warn!("No signing material configured; invoicing will fail"),
        }
    }

    config.validate().context("Configuration validation failed")?;

    tracing::info!(
        cuit = %config.fiscal.cuit,
        environment = %config.fiscal.environment,
        has_cert = config.fiscal.has_signing_material(),
        "Fiscal client configured"
    );

    let fiscal_config = Arc::new(config.fiscal.clone());
    let client = Arc::new(FiscalClient::from_config(&fiscal_config).context("Failed to build fiscal client")?);
    let invoice_repository = Arc::new(MySqlInvoiceRepository::new(db_pool.clone()));
    let settlement_repository = Arc::new(MySqlSettlementRepository::new(db_pool.clone()));

    let services = AppServices {
        invoices: Arc::new(InvoiceService::new(
            client.clone(),
            invoice_repository.clone(),
            fiscal_config.clone(),
        )),
        settlements: Arc::new(SettlementService::new(
            client,
            settlement_repository,
            invoice_repository,
            fiscal_config,
        )),
    };

    let rate_limiter = RateLimiter::new(config.security.rate_limit_per_minute);
    let identity = IdentityAuth::new(config.security.identity_secret.clone());
    let cors_origin = config.server.cors_allowed_origin.clone();
    let bind_address = config.server.bind_address();

    let server = HttpServer::new(move || {
        App::new()
            .wrap(identity.clone())
            .wrap(rate_limiter.clone())
            .wrap(cors(cors_origin.as_deref()))
            .wrap(RequestIdTagger)
            .wrap(TracingLogger::default())
            .app_data(web::Data::new(db_pool.clone()))
            .configure(health::controllers::configure)
            .configure(configure_api(services.clone()))
            .route("/", web::get().to(index))
    })
    .workers(config.server.workers)
    .bind(&bind_address)
    .with_context(|| format!("Failed to bind {}", bind_address))?
    .run();

    tracing::info!("Server started at http://{}", bind_address);

    server.await.context("Server terminated with an error")
}

fn init_tracing(config: &Config) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "fiscal_billing=debug,actix_web=info".into());

    let registry = tracing_subscriber::registry().with(filter);
    if config.json_logs() {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

fn cors(allowed_origin: Option<&str>) -> Cors {
    let cors = Cors::default()
        .allowed_methods(vec!["GET", "POST", "PUT"])
        .allow_any_header()
        .max_age(3600);

    match allowed_origin {
        Some("*") => cors.allow_any_origin(),
        Some(origin) => cors.allowed_origin(origin),
        None => cors,
    }
}

async fn index() -> HttpResponse {
    HttpResponse::Ok().json(serde_json::json!({
        "service": env!("CARGO_PKG_NAME"),
        "version": env!("CARGO_PKG_VERSION"),
        "status": "running"
    }))
}
