use std::sync::Arc;

use actix_web::{web, HttpResponse};

use crate::core::error::AppError;
use crate::middleware::AuthenticatedUser;
use crate::modules::settlements::models::InvoiceSettlementRequest;
use crate::modules::settlements::services::SettlementService;

/// POST /settlements/{id}/invoice
pub async fn invoice_settlement(
    service: web::Data<Arc<SettlementService>>,
    user: AuthenticatedUser,
    path: web::Path<i64>,
    request: Option<web::Json<InvoiceSettlementRequest>>,
) -> Result<HttpResponse, AppError> {
    let request = request.map(|r| r.into_inner()).unwrap_or_default();
    let issued = service
        .invoice_settlement(path.into_inner(), request, &user)
        .await?;

    Ok(HttpResponse::Created().json(issued))
}

/// POST /settlements/reconcile
pub async fn reconcile(
    service: web::Data<Arc<SettlementService>>,
) -> Result<HttpResponse, AppError> {
    let report = service.reconcile().await?;
    Ok(HttpResponse::Ok().json(report))
}

/// GET /settlements/{id}
pub async fn get_settlement(
    service: web::Data<Arc<SettlementService>>,
    path: web::Path<i64>,
) -> Result<HttpResponse, AppError> {
    let view = service.get(path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(view))
}

/// Configure settlement routes
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/settlements")
            .route("/reconcile", web::post().to(reconcile))
            .route("/{id}", web::get().to(get_settlement))
            .route("/{id}/invoice", web::post().to(invoice_settlement)),
    );
}
