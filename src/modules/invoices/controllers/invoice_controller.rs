use std::sync::Arc;

use actix_web::{web, HttpResponse};
use serde_json::json;

use crate::core::error::AppError;
use crate::middleware::AuthenticatedUser;
use crate::modules::invoices::models::{
    AttachPdfRequest, InvoiceFilter, IssueInvoiceRequest, StatusQuery,
};
use crate::modules::invoices::services::InvoiceService;

/// Issue a standard invoice, debit note or credit note
/// POST /invoices/standard
pub async fn issue_standard(
    service: web::Data<Arc<InvoiceService>>,
    user: AuthenticatedUser,
    request: web::Json<IssueInvoiceRequest>,
) -> Result<HttpResponse, AppError> {
    let issued = service.issue_standard(request.into_inner(), &user).await?;
    Ok(HttpResponse::Created().json(issued))
}

/// Issue a factoring invoice
/// POST /invoices/fce
pub async fn issue_fce(
    service: web::Data<Arc<InvoiceService>>,
    user: AuthenticatedUser,
    request: web::Json<IssueInvoiceRequest>,
) -> Result<HttpResponse, AppError> {
    let issued = service.issue_fce(request.into_inner(), &user).await?;
    Ok(HttpResponse::Created().json(issued))
}

/// GET /invoices/status?pointOfSale=&voucherType=
pub async fn status(
    service: web::Data<Arc<InvoiceService>>,
    query: web::Query<StatusQuery>,
) -> Result<HttpResponse, AppError> {
    let report = service.status(query.into_inner()).await?;
    Ok(HttpResponse::Ok().json(report))
}

/// GET /invoices/points-of-sale
pub async fn points_of_sale(
    service: web::Data<Arc<InvoiceService>>,
) -> Result<HttpResponse, AppError> {
    let points = service.points_of_sale().await?;
    Ok(HttpResponse::Ok().json(json!({
        "success": true,
        "pointsOfSale": points,
    })))
}

/// GET /invoices?q=&kind=&limit=&offset=
pub async fn list_invoices(
    service: web::Data<Arc<InvoiceService>>,
    query: web::Query<InvoiceFilter>,
) -> Result<HttpResponse, AppError> {
    let invoices = service.list(query.into_inner()).await?;
    Ok(HttpResponse::Ok().json(invoices))
}

/// GET /invoices/{id}
pub async fn get_invoice(
    service: web::Data<Arc<InvoiceService>>,
    path: web::Path<i64>,
) -> Result<HttpResponse, AppError> {
    let invoice = service.get(path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(invoice))
}

/// PUT /invoices/{id}/pdf
pub async fn attach_pdf(
    service: web::Data<Arc<InvoiceService>>,
    path: web::Path<i64>,
    request: web::Json<AttachPdfRequest>,
) -> Result<HttpResponse, AppError> {
    let invoice = service.attach_pdf(path.into_inner(), &request.url).await?;
    Ok(HttpResponse::Ok().json(invoice))
}

/// Configure invoice routes
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/invoices")
            .route("/standard", web::post().to(issue_standard))
            .route("/fce", web::post().to(issue_fce))
            .route("/status", web::get().to(status))
            .route("/points-of-sale", web::get().to(points_of_sale))
            .route("", web::get().to(list_invoices))
            .route("/{id}", web::get().to(get_invoice))
            .route("/{id}/pdf", web::put().to(attach_pdf)),
    );
}
