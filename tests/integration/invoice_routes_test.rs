// Routes behind the identity check, end to end over in-memory storage

use actix_web::dev::ServiceResponse;
use actix_web::http::StatusCode;
use actix_web::{test, App};
use rust_decimal_macros::dec;
use serde_json::{json, Value};

use fiscal_billing::configure_api;
use fiscal_billing::fiscal::VoucherType;
use fiscal_billing::invoices::{Invoice, NewInvoice};
use fiscal_billing::middleware::identity::{SIGNATURE_HEADER, USER_EMAIL_HEADER, USER_ID_HEADER};
use fiscal_billing::middleware::IdentityAuth;
use fiscal_billing::modules::health;

#[path = "../helpers/mod.rs"]
mod helpers;
use helpers::*;

macro_rules! init_app {
    ($harness:expr) => {
        test::init_service(
            App::new()
                .wrap(IdentityAuth::new(Some(IDENTITY_SECRET.to_string())))
                .configure(health::controllers::configure)
                .configure(configure_api($harness.services.clone())),
        )
        .await
    };
}

macro_rules! signed {
    ($req:expr) => {{
        let mut req = $req;
        for header in identity_headers(&operator()) {
            req = req.insert_header(header);
        }
        req.to_request()
    }};
}

/// Status of a response or of the error a middleware returned instead
fn status_of(result: Result<ServiceResponse, actix_web::Error>) -> StatusCode {
    match result {
        Ok(resp) => resp.status(),
        Err(err) => err.as_response_error().status_code(),
    }
}

fn recorded(number: u64, voucher_type: VoucherType, client_name: &str) -> NewInvoice {
    NewInvoice {
        invoice_number: format!("0004-{:08}", number),
        invoice_class: voucher_type.class().to_string(),
        voucher_type,
        point_of_sale: 4,
        voucher_number: number,
        issue_date: date(2025, 2, 3),
        client_entity_id: None,
        client_cuit: "30716254972".to_string(),
        client_name: client_name.to_string(),
        client_iva_condition: "IVA Responsable Inscripto".to_string(),
        net_amount: dec!(826.45),
        vat_amount: dec!(173.55),
        total_amount: dec!(1000.00),
        cae: format!("7512345678{:04}", number),
        cae_expiration: date(2025, 2, 13),
        settlement_id: None,
        afip_response: None,
        notes: None,
        created_by: None,
    }
}

#[actix_web::test]
async fn test_unsigned_requests_are_rejected() {
    let harness = Harness::new();
    let app = init_app!(harness);

    let missing = test::TestRequest::get().uri("/invoices").to_request();
    assert_eq!(
        status_of(test::try_call_service(&app, missing).await),
        StatusCode::UNAUTHORIZED
    );

    let forged = test::TestRequest::post()
        .uri("/invoices/standard")
        .insert_header((USER_ID_HEADER, "user-17"))
        .insert_header((USER_EMAIL_HEADER, "facturacion@example.com"))
        .insert_header((SIGNATURE_HEADER, "00ff"))
        .set_json(services_invoice_body())
        .to_request();
    assert_eq!(
        status_of(test::try_call_service(&app, forged).await),
        StatusCode::UNAUTHORIZED
    );

    assert_eq!(harness.transport.total_calls(), 0);
}

#[actix_web::test]
async fn test_health_is_public() {
    let harness = Harness::new();
    let app = init_app!(harness);

    let resp = test::call_service(&app, test::TestRequest::get().uri("/health").to_request()).await;
    assert_eq!(resp.status(), StatusCode::OK);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["status"], "healthy");
}

#[actix_web::test]
async fn test_points_of_sale_route() {
    let harness = Harness::new();
    harness
        .transport
        .on(POINTS_OF_SALE, points_of_sale_reply(&[(4, false), (5, true)]))
        .on(VOUCHER_TYPES, voucher_types_reply(&[1, 6, 201]));
    let app = init_app!(harness);

    let resp = test::call_service(
        &app,
        signed!(test::TestRequest::get().uri("/invoices/points-of-sale")),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::OK);

    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["success"], true);
    let points = body["pointsOfSale"].as_array().unwrap();
    assert_eq!(points.len(), 2);
    assert_eq!(points[0]["number"], 4);
    assert_eq!(points[0]["blocked"], false);
    assert_eq!(points[1]["blocked"], true);
    assert_eq!(points[0]["enabledVoucherTypes"].as_array().unwrap().len(), 3);
}

#[actix_web::test]
async fn test_issued_invoice_can_be_listed_and_fetched() {
    let harness = Harness::new();
    harness
        .transport
        .on(LAST_AUTHORIZED, last_authorized_reply(41))
        .on(AUTHORIZE, approved_reply(42, "75123456789012", "20250210"));
    let app = init_app!(harness);

    let resp = test::call_service(
        &app,
        signed!(test::TestRequest::post()
            .uri("/invoices/standard")
            .set_json(services_invoice_body())),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::CREATED);
    let issued: Value = test::read_body_json(resp).await;
    let id = issued["invoiceId"].as_i64().unwrap();

    let list: Vec<Invoice> = test::call_and_read_body_json(
        &app,
        signed!(test::TestRequest::get().uri("/invoices")),
    )
    .await;
    assert_eq!(list.len(), 1);
    assert_eq!(list[0].id, id);
    assert_eq!(list[0].created_by.as_deref(), Some("facturacion@example.com"));

    let resp = test::call_service(
        &app,
        signed!(test::TestRequest::get().uri(&format!("/invoices/{}", id))),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::OK);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["invoice_number"], "0004-00000042");
    assert_eq!(body["cae"], "75123456789012");
    assert!(body.get("afip_response").is_none());
    assert!(body["qr_url"]
        .as_str()
        .unwrap()
        .starts_with("https://www.afip.gob.ar/fe/qr/?p="));
    assert_eq!(list[0].qr_url, body["qr_url"].as_str().map(str::to_string));

    let resp = test::call_service(
        &app,
        signed!(test::TestRequest::get().uri("/invoices/999")),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["success"], false);
    assert_eq!(body["error"]["code"], 404);
}

#[actix_web::test]
async fn test_list_filters_by_kind_and_text() {
    let harness = Harness::new();
    harness
        .store
        .seed_invoice(&recorded(10, VoucherType::InvoiceA, "Transportes del Sur SA"));
    harness
        .store
        .seed_invoice(&recorded(11, VoucherType::CreditNoteA, "Transportes del Sur SA"));
    harness
        .store
        .seed_invoice(&recorded(12, VoucherType::CreditInvoiceA, "Cereales Pampa SRL"));
    let app = init_app!(harness);

    let fce: Vec<Invoice> = test::call_and_read_body_json(
        &app,
        signed!(test::TestRequest::get().uri("/invoices?kind=fce")),
    )
    .await;
    assert_eq!(fce.len(), 1);
    assert_eq!(fce[0].voucher_type, VoucherType::CreditInvoiceA);

    let notes: Vec<Invoice> = test::call_and_read_body_json(
        &app,
        signed!(test::TestRequest::get().uri("/invoices?kind=notes")),
    )
    .await;
    assert_eq!(notes.len(), 1);
    assert_eq!(notes[0].voucher_type, VoucherType::CreditNoteA);

    let by_name: Vec<Invoice> = test::call_and_read_body_json(
        &app,
        signed!(test::TestRequest::get().uri("/invoices?q=Pampa")),
    )
    .await;
    assert_eq!(by_name.len(), 1);
    assert_eq!(by_name[0].client_name, "Cereales Pampa SRL");

    let page: Vec<Invoice> = test::call_and_read_body_json(
        &app,
        signed!(test::TestRequest::get().uri("/invoices?limit=2")),
    )
    .await;
    assert_eq!(page.len(), 2);

    let resp = test::call_service(
        &app,
        signed!(test::TestRequest::get().uri("/invoices?kind=receipts")),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

#[actix_web::test]
async fn test_pdf_url_is_attached() {
    let harness = Harness::new();
    let invoice = harness
        .store
        .seed_invoice(&recorded(42, VoucherType::InvoiceA, "Transportes del Sur SA"));
    let app = init_app!(harness);

    let resp = test::call_service(
        &app,
        signed!(test::TestRequest::put()
            .uri(&format!("/invoices/{}/pdf", invoice.id))
            .set_json(json!({ "url": "https://files.example.com/0004-00000042.pdf" }))),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::OK);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["pdf_url"], "https://files.example.com/0004-00000042.pdf");

    let resp = test::call_service(
        &app,
        signed!(test::TestRequest::put()
            .uri(&format!("/invoices/{}/pdf", invoice.id))
            .set_json(json!({ "url": "  " }))),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

    let resp = test::call_service(
        &app,
        signed!(test::TestRequest::put()
            .uri("/invoices/999/pdf")
            .set_json(json!({ "pdf_url": "https://files.example.com/x.pdf" }))),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}

#[actix_web::test]
async fn test_non_numeric_id_is_a_validation_error() {
    let harness = Harness::new();
    let app = init_app!(harness);

    let resp = test::call_service(
        &app,
        signed!(test::TestRequest::get().uri("/invoices/abc")),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["success"], false);
}

#[actix_web::test]
async fn test_settlement_routes() {
    let harness = Harness::new();
    harness
        .store
        .add_counterparty(3, "Transportes del Sur SA", Some("30-71625497-2"));
    harness.store.add_settlement(pending_settlement(7, 3));
    harness
        .transport
        .on(LAST_AUTHORIZED, last_authorized_reply(41))
        .on(AUTHORIZE, approved_reply(42, "75123456789012", "20250210"));
    let app = init_app!(harness);

    let resp = test::call_service(
        &app,
        signed!(test::TestRequest::post().uri("/settlements/7/invoice")),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::CREATED);
    let issued: Value = test::read_body_json(resp).await;
    assert_eq!(issued["invoiceNumber"], "0004-00000042");
    assert_eq!(issued["client"], "Transportes del Sur SA");

    let resp = test::call_service(
        &app,
        signed!(test::TestRequest::post()
            .uri("/settlements/7/invoice")
            .set_json(json!({ "voucherType": "B" }))),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::CONFLICT);
    assert_eq!(harness.transport.calls(AUTHORIZE), 1);

    let view: Value = test::call_and_read_body_json(
        &app,
        signed!(test::TestRequest::get().uri("/settlements/7")),
    )
    .await;
    assert_eq!(view["settlement"]["status"], "facturada");
    assert_eq!(view["settlement"]["cae"], "75123456789012");
    assert_eq!(view["client"]["legal_name"], "Transportes del Sur SA");
    assert_eq!(view["invoice"]["invoice_number"], "0004-00000042");
    assert_eq!(view["invoice"]["qr_url"], issued["qrUrl"]);

    let report: Value = test::call_and_read_body_json(
        &app,
        signed!(test::TestRequest::post().uri("/settlements/reconcile")),
    )
    .await;
    assert_eq!(report["repaired"], json!([]));
    assert_eq!(report["releasedClaims"], json!([]));
    assert_eq!(report["recovered"], json!([]));
    assert_eq!(report["heldClaims"], json!([]));

    let resp = test::call_service(
        &app,
        signed!(test::TestRequest::get().uri("/settlements/99")),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}
