// MySQL persistence for authorized vouchers
//
// Records are inserted once per authorization and only ever updated to
// attach a PDF URL.

use async_trait::async_trait;
use sqlx::{MySql, MySqlConnection, MySqlPool, QueryBuilder};

use crate::core::{AppError, Result};
use crate::modules::invoices::models::{Invoice, InvoiceFilter, NewInvoice};

pub(crate) const INVOICE_COLUMNS: &str = r#"
    id, invoice_number, invoice_class, voucher_type, point_of_sale, voucher_number,
    issue_date, client_entity_id, client_cuit, client_name, client_iva_condition,
    net_amount, vat_amount, total_amount, cae, cae_expiration, settlement_id,
    afip_response, notes, pdf_url, created_by, created_at
"#;

#[async_trait]
pub trait InvoiceRepository: Send + Sync {
    /// Insert a new record; a duplicate voucher or settlement link is a conflict
    async fn create(&self, invoice: &NewInvoice) -> Result<Invoice>;

    async fn find_by_id(&self, id: i64) -> Result<Option<Invoice>>;

    async fn find_by_settlement(&self, settlement_id: i64) -> Result<Option<Invoice>>;

    /// Newest first
    async fn search(&self, filter: &InvoiceFilter) -> Result<Vec<Invoice>>;

    /// `None` when the invoice does not exist
    async fn attach_pdf_url(&self, id: i64, url: &str) -> Result<Option<Invoice>>;
}

pub struct MySqlInvoiceRepository {
    pool: MySqlPool,
}

impl MySqlInvoiceRepository {
    pub fn new(pool: MySqlPool) -> Self {
        Self { pool }
    }
}

/// Insert on an open connection so callers can wrap it in their own transaction
pub async fn insert_invoice(conn: &mut MySqlConnection, invoice: &NewInvoice) -> Result<i64> {
    let result = sqlx::query(
        r#"
        INSERT INTO invoices (
            invoice_number, invoice_class, voucher_type, point_of_sale, voucher_number,
            issue_date, client_entity_id, client_cuit, client_name, client_iva_condition,
            net_amount, vat_amount, total_amount, cae, cae_expiration, settlement_id,
            afip_response, notes, created_by, created_at
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, UTC_TIMESTAMP())
        "#,
    )
    .bind(&invoice.invoice_number)
    .bind(&invoice.invoice_class)
    .bind(invoice.voucher_type.wire_name())
    .bind(invoice.point_of_sale)
    .bind(invoice.voucher_number)
    .bind(invoice.issue_date)
    .bind(invoice.client_entity_id)
    .bind(&invoice.client_cuit)
    .bind(&invoice.client_name)
    .bind(&invoice.client_iva_condition)
    .bind(invoice.net_amount)
    .bind(invoice.vat_amount)
    .bind(invoice.total_amount)
    .bind(&invoice.cae)
    .bind(invoice.cae_expiration)
    .bind(invoice.settlement_id)
    .bind(&invoice.afip_response)
    .bind(&invoice.notes)
    .bind(&invoice.created_by)
    .execute(&mut *conn)
    .await
    .map_err(|e| {
        if let Some(db_err) = e.as_database_error() {
            if db_err.is_unique_violation() {
                return AppError::conflict(format!(
                    "Invoice {} is already recorded",
                    invoice.invoice_number
                ));
            }
        }
        AppError::Database(e)
    })?;

    i64::try_from(result.last_insert_id())
        .map_err(|_| AppError::internal("Invoice id out of range"))
}

#[async_trait]
impl InvoiceRepository for MySqlInvoiceRepository {
    async fn create(&self, invoice: &NewInvoice) -> Result<Invoice> {
        let mut conn = self.pool.acquire().await?;
        let id = insert_invoice(&mut conn, invoice).await?;

        self.find_by_id(id)
            .await?
            .ok_or_else(|| AppError::internal(format!("Invoice {} vanished after insert", id)))
    }

    async fn find_by_id(&self, id: i64) -> Result<Option<Invoice>> {
        let sql = format!("SELECT {} FROM invoices WHERE id = ?", INVOICE_COLUMNS);
        let invoice = sqlx::query_as::<_, Invoice>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(invoice)
    }

    async fn find_by_settlement(&self, settlement_id: i64) -> Result<Option<Invoice>> {
        let sql = format!(
            "SELECT {} FROM invoices WHERE settlement_id = ?",
            INVOICE_COLUMNS
        );
        let invoice = sqlx::query_as::<_, Invoice>(&sql)
            .bind(settlement_id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(invoice)
    }

    async fn search(&self, filter: &InvoiceFilter) -> Result<Vec<Invoice>> {
        let mut query: QueryBuilder<MySql> =
            QueryBuilder::new(format!("SELECT {} FROM invoices WHERE voucher_type IN (", INVOICE_COLUMNS));

        let mut types = query.separated(", ");
        for voucher_type in filter.kind.voucher_types() {
            types.push_bind(voucher_type.wire_name());
        }
        types.push_unseparated(")");

        if let Some(q) = filter.q.as_deref() {
            let pattern = format!("%{}%", q);
            query
                .push(" AND (invoice_number LIKE ")
                .push_bind(pattern.clone())
                .push(" OR client_name LIKE ")
                .push_bind(pattern.clone())
                .push(" OR client_cuit LIKE ")
                .push_bind(pattern)
                .push(")");
        }

        query
            .push(" ORDER BY created_at DESC, id DESC LIMIT ")
            .push_bind(filter.limit)
            .push(" OFFSET ")
            .push_bind(filter.offset);

        let invoices = query
            .build_query_as::<Invoice>()
            .fetch_all(&self.pool)
            .await?;

        Ok(invoices)
    }

    async fn attach_pdf_url(&self, id: i64, url: &str) -> Result<Option<Invoice>> {
        // Affected rows are 0 when the URL is unchanged, so existence comes from the re-read
        sqlx::query("UPDATE invoices SET pdf_url = ? WHERE id = ?")
            .bind(url)
            .bind(id)
            .execute(&self.pool)
            .await?;

        self.find_by_id(id).await
    }
}
