//! PostgreSQL access layer for factura-service.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use service_core::error::AppError;
use sqlx::postgres::{PgPool, PgPoolOptions};
use std::time::Duration;
use tracing::{info, instrument};
use uuid::Uuid;

use crate::models::{
    Client, ClientFields, Company, CompanySummary, CreateDirectInvoice, CreateTicketInvoice,
    Invoice, InvoiceItem, NewCompany, NewUser, UpdateClient, User,
};
use crate::services::metrics::DB_QUERY_DURATION;

/// Database connection pool wrapper.
#[derive(Clone)]
pub struct Database {
    pool: PgPool,
}

fn db_err(e: sqlx::Error) -> AppError {
    AppError::DatabaseError(anyhow::anyhow!(e))
}

fn is_unique_violation(e: &sqlx::Error) -> bool {
    matches!(e, sqlx::Error::Database(db) if db.is_unique_violation())
}

impl Database {
    /// Create a new connection pool.
    #[instrument(skip(database_url))]
    pub async fn new(
        database_url: &str,
        max_connections: u32,
        min_connections: u32,
    ) -> Result<Self, AppError> {
        info!(
            max_connections = max_connections,
            min_connections = min_connections,
            "Connecting to PostgreSQL"
        );

        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .min_connections(min_connections)
            .acquire_timeout(Duration::from_secs(30))
            .idle_timeout(Duration::from_secs(600))
            .connect(database_url)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to connect: {}", e)))?;

        info!("PostgreSQL connection pool established");

        Ok(Self { pool })
    }

    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Health check - ping the database.
    pub async fn health_check(&self) -> Result<(), AppError> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Health check failed: {}", e)))?;
        Ok(())
    }

    /// Run embedded migrations.
    #[instrument(skip(self))]
    pub async fn run_migrations(&self) -> Result<(), AppError> {
        info!("Running database migrations");
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Migration failed: {}", e)))?;
        info!("Database migrations completed");
        Ok(())
    }

    // ==================== User Operations ====================

    pub async fn find_user_by_id(&self, user_id: Uuid) -> Result<Option<User>, AppError> {
        sqlx::query_as::<_, User>("SELECT * FROM users WHERE user_id = $1")
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)
    }

    pub async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, AppError> {
        sqlx::query_as::<_, User>("SELECT * FROM users WHERE LOWER(email) = LOWER($1)")
            .bind(email)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)
    }

    pub async fn find_user_by_nif(&self, nif: &str) -> Result<Option<User>, AppError> {
        sqlx::query_as::<_, User>("SELECT * FROM users WHERE UPPER(nif) = UPPER($1)")
            .bind(nif)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)
    }

    pub async fn insert_user(&self, input: &NewUser) -> Result<User, AppError> {
        sqlx::query_as::<_, User>(
            r#"
            INSERT INTO users (user_id, email, password_hash, name, nif, address, postal_code, phone, user_type)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(&input.email)
        .bind(&input.password_hash)
        .bind(&input.name)
        .bind(&input.nif)
        .bind(&input.address)
        .bind(&input.postal_code)
        .bind(&input.phone)
        .bind(input.user_type.as_str())
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                AppError::conflict("Email or NIF already registered")
            } else {
                db_err(e)
            }
        })
    }

    /// Store the password-reset token digest and its expiry.
    pub async fn store_reset_token(
        &self,
        user_id: Uuid,
        token_hash: &str,
        expiry: DateTime<Utc>,
    ) -> Result<(), AppError> {
        sqlx::query(
            "UPDATE users SET reset_token_hash = $1, reset_token_expiry = $2 WHERE user_id = $3",
        )
        .bind(token_hash)
        .bind(expiry)
        .bind(user_id)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(())
    }

    /// Find the user holding a non-expired reset token digest.
    pub async fn find_user_by_reset_token(
        &self,
        token_hash: &str,
    ) -> Result<Option<User>, AppError> {
        sqlx::query_as::<_, User>(
            "SELECT * FROM users WHERE reset_token_hash = $1 AND reset_token_expiry > NOW()",
        )
        .bind(token_hash)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)
    }

    /// Set a new password hash and consume any outstanding reset token.
    pub async fn update_password(
        &self,
        user_id: Uuid,
        password_hash: &str,
    ) -> Result<(), AppError> {
        sqlx::query(
            r#"
            UPDATE users
            SET password_hash = $1, reset_token_hash = NULL, reset_token_expiry = NULL
            WHERE user_id = $2
            "#,
        )
        .bind(password_hash)
        .bind(user_id)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(())
    }

    // ==================== Company Operations ====================

    pub async fn insert_company(&self, input: &NewCompany) -> Result<Company, AppError> {
        sqlx::query_as::<_, Company>(
            r#"
            INSERT INTO companies (company_id, owner_user_id, name, nif, address, postal_code, email, phone)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(input.owner_user_id)
        .bind(&input.name)
        .bind(&input.nif)
        .bind(&input.address)
        .bind(&input.postal_code)
        .bind(&input.email)
        .bind(&input.phone)
        .fetch_one(&self.pool)
        .await
        .map_err(db_err)
    }

    pub async fn find_company_by_id(&self, company_id: Uuid) -> Result<Option<Company>, AppError> {
        sqlx::query_as::<_, Company>("SELECT * FROM companies WHERE company_id = $1")
            .bind(company_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)
    }

    pub async fn find_company_by_owner(&self, user_id: Uuid) -> Result<Option<Company>, AppError> {
        sqlx::query_as::<_, Company>("SELECT * FROM companies WHERE owner_user_id = $1")
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)
    }

    /// Case-insensitive name search for the submission form, capped at 10.
    pub async fn search_companies(&self, query: &str) -> Result<Vec<CompanySummary>, AppError> {
        sqlx::query_as::<_, CompanySummary>(
            r#"
            SELECT company_id, name, nif FROM companies
            WHERE name ILIKE '%' || $1 || '%'
            ORDER BY name
            LIMIT 10
            "#,
        )
        .bind(query)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)
    }

    pub async fn list_companies(&self) -> Result<Vec<CompanySummary>, AppError> {
        sqlx::query_as::<_, CompanySummary>(
            "SELECT company_id, name, nif FROM companies ORDER BY name",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)
    }

    // ==================== Client Operations ====================

    pub async fn list_clients(&self, company_id: Uuid) -> Result<Vec<Client>, AppError> {
        sqlx::query_as::<_, Client>(
            "SELECT * FROM clients WHERE company_id = $1 ORDER BY created_utc DESC",
        )
        .bind(company_id)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)
    }

    pub async fn find_client(
        &self,
        company_id: Uuid,
        client_id: Uuid,
    ) -> Result<Option<Client>, AppError> {
        sqlx::query_as::<_, Client>(
            "SELECT * FROM clients WHERE company_id = $1 AND client_id = $2",
        )
        .bind(company_id)
        .bind(client_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)
    }

    /// NIF lookup. Comparison is case-insensitive as a belt against rows
    /// stored before canonicalization.
    pub async fn find_client_by_nif(
        &self,
        company_id: Uuid,
        nif: &str,
    ) -> Result<Option<Client>, AppError> {
        sqlx::query_as::<_, Client>(
            "SELECT * FROM clients WHERE company_id = $1 AND UPPER(nif) = UPPER($2)",
        )
        .bind(company_id)
        .bind(nif)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)
    }

    /// Reconcile an incoming client identity against existing records:
    /// created on first sighting of the NIF, overwritten on every later one
    /// (last write wins).
    #[instrument(skip(self, input), fields(company_id = %company_id))]
    pub async fn upsert_client(
        &self,
        company_id: Uuid,
        user_id: Option<Uuid>,
        input: &ClientFields,
    ) -> Result<Client, AppError> {
        sqlx::query_as::<_, Client>(
            r#"
            INSERT INTO clients (client_id, company_id, user_id, name, nif, email, address, postal_code, phone)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            ON CONFLICT (company_id, nif) DO UPDATE SET
                name = EXCLUDED.name,
                email = EXCLUDED.email,
                address = EXCLUDED.address,
                postal_code = EXCLUDED.postal_code,
                phone = EXCLUDED.phone,
                user_id = EXCLUDED.user_id,
                updated_utc = NOW()
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(company_id)
        .bind(user_id)
        .bind(&input.name)
        .bind(&input.nif)
        .bind(&input.email)
        .bind(&input.address)
        .bind(&input.postal_code)
        .bind(&input.phone)
        .fetch_one(&self.pool)
        .await
        .map_err(db_err)
    }

    pub async fn insert_client(
        &self,
        company_id: Uuid,
        fields: &ClientFields,
    ) -> Result<Client, AppError> {
        sqlx::query_as::<_, Client>(
            r#"
            INSERT INTO clients (client_id, company_id, name, nif, email, address, postal_code, phone)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(company_id)
        .bind(&fields.name)
        .bind(&fields.nif)
        .bind(&fields.email)
        .bind(&fields.address)
        .bind(&fields.postal_code)
        .bind(&fields.phone)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                AppError::conflict("Client with this NIF already exists")
            } else {
                db_err(e)
            }
        })
    }

    pub async fn update_client(
        &self,
        company_id: Uuid,
        client_id: Uuid,
        input: &UpdateClient,
    ) -> Result<Option<Client>, AppError> {
        sqlx::query_as::<_, Client>(
            r#"
            UPDATE clients
            SET name = COALESCE($3, name),
                nif = COALESCE($4, nif),
                email = COALESCE($5, email),
                address = COALESCE($6, address),
                postal_code = COALESCE($7, postal_code),
                phone = COALESCE($8, phone),
                updated_utc = NOW()
            WHERE company_id = $1 AND client_id = $2
            RETURNING *
            "#,
        )
        .bind(company_id)
        .bind(client_id)
        .bind(&input.name)
        .bind(&input.nif)
        .bind(&input.email)
        .bind(&input.address)
        .bind(&input.postal_code)
        .bind(&input.phone)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                AppError::conflict("Client with this NIF already exists")
            } else {
                db_err(e)
            }
        })
    }

    pub async fn delete_client(
        &self,
        company_id: Uuid,
        client_id: Uuid,
    ) -> Result<bool, AppError> {
        let result = sqlx::query("DELETE FROM clients WHERE company_id = $1 AND client_id = $2")
            .bind(company_id)
            .bind(client_id)
            .execute(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn client_recent_invoices(
        &self,
        client_id: Uuid,
        limit: i64,
    ) -> Result<Vec<Invoice>, AppError> {
        sqlx::query_as::<_, Invoice>(
            "SELECT * FROM invoices WHERE client_id = $1 ORDER BY date DESC LIMIT $2",
        )
        .bind(client_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)
    }

    // ==================== Invoice Operations ====================

    /// Create a PENDING invoice from a ticket submission, items included,
    /// in one transaction. A fingerprint collision (unique constraint on
    /// `(company_id, ticket_hash)`) comes back as a 409 conflict carrying
    /// the existing invoice's reference — this backstops the pre-check
    /// against concurrent submissions of the same ticket.
    #[instrument(skip(self, input), fields(company_id = %input.company_id))]
    pub async fn create_ticket_invoice(
        &self,
        input: &CreateTicketInvoice,
    ) -> Result<(Invoice, Vec<InvoiceItem>), AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["create_ticket_invoice"])
            .start_timer();

        let mut tx = self.pool.begin().await.map_err(db_err)?;

        let invoice = sqlx::query_as::<_, Invoice>(
            r#"
            INSERT INTO invoices (
                invoice_id, company_id, client_id, requester_user_id, status,
                base_amount, tax_rate, tax_amount, total_amount,
                ticket_date, ticket_amount, ticket_hash, ocr_payload
            )
            VALUES ($1, $2, $3, $4, 'PENDING', $5, $6, $7, $8, $9, $10, $11, $12)
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(input.company_id)
        .bind(input.client_id)
        .bind(input.requester_user_id)
        .bind(input.base_amount)
        .bind(input.tax_rate)
        .bind(input.tax_amount)
        .bind(input.total_amount)
        .bind(input.ticket_date)
        .bind(input.ticket_amount)
        .bind(&input.ticket_hash)
        .bind(&input.ocr_payload)
        .fetch_one(&mut *tx)
        .await;

        let invoice = match invoice {
            Ok(invoice) => invoice,
            Err(e) if is_unique_violation(&e) => {
                drop(tx);
                return Err(self
                    .duplicate_ticket_conflict(input.company_id, &input.ticket_hash)
                    .await);
            }
            Err(e) => return Err(db_err(e)),
        };

        let items = self
            .insert_items(&mut tx, invoice.invoice_id, &input.items)
            .await?;

        tx.commit().await.map_err(db_err)?;
        timer.observe_duration();

        info!(invoice_id = %invoice.invoice_id, "Ticket invoice created");
        Ok((invoice, items))
    }

    /// Create an already-numbered invoice through the direct path. A number
    /// collision surfaces as a conflict so the caller can recompute and
    /// retry.
    #[instrument(skip(self, input), fields(company_id = %input.company_id))]
    pub async fn create_direct_invoice(
        &self,
        input: &CreateDirectInvoice,
    ) -> Result<(Invoice, Vec<InvoiceItem>), AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["create_direct_invoice"])
            .start_timer();

        let mut tx = self.pool.begin().await.map_err(db_err)?;

        let invoice = sqlx::query_as::<_, Invoice>(
            r#"
            INSERT INTO invoices (
                invoice_id, company_id, client_id, approver_user_id, number, status,
                description, base_amount, tax_rate, tax_amount, total_amount, generated_utc
            )
            VALUES ($1, $2, $3, $4, $5, 'GENERATED', $6, $7, $8, $9, $10, NOW())
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(input.company_id)
        .bind(input.client_id)
        .bind(input.creator_user_id)
        .bind(&input.number)
        .bind(&input.description)
        .bind(input.base_amount)
        .bind(input.tax_rate)
        .bind(input.tax_amount)
        .bind(input.total_amount)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                AppError::conflict("Invoice number already taken")
            } else {
                db_err(e)
            }
        })?;

        let items = self
            .insert_items(&mut tx, invoice.invoice_id, &input.items)
            .await?;

        tx.commit().await.map_err(db_err)?;
        timer.observe_duration();

        info!(invoice_id = %invoice.invoice_id, number = %input.number, "Direct invoice created");
        Ok((invoice, items))
    }

    async fn insert_items(
        &self,
        tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
        invoice_id: Uuid,
        items: &[crate::models::LineItemInput],
    ) -> Result<Vec<InvoiceItem>, AppError> {
        let mut rows = Vec::with_capacity(items.len());
        for (idx, item) in items.iter().enumerate() {
            let row = sqlx::query_as::<_, InvoiceItem>(
                r#"
                INSERT INTO invoice_items (item_id, invoice_id, description, quantity, unit_price, total_price, sort_order)
                VALUES ($1, $2, $3, $4, $5, $6, $7)
                RETURNING *
                "#,
            )
            .bind(Uuid::new_v4())
            .bind(invoice_id)
            .bind(&item.description)
            .bind(item.quantity)
            .bind(item.unit_price)
            .bind(item.total_price())
            .bind(idx as i32)
            .fetch_one(&mut **tx)
            .await
            .map_err(db_err)?;
            rows.push(row);
        }
        Ok(rows)
    }

    /// Build the 409 for a duplicate ticket, referencing the invoice that
    /// already carries this fingerprint.
    pub async fn duplicate_ticket_conflict(&self, company_id: Uuid, ticket_hash: &str) -> AppError {
        let existing = self
            .find_invoice_by_ticket_hash(company_id, ticket_hash)
            .await
            .ok()
            .flatten();

        AppError::Conflict {
            message: "Este ticket ya ha sido facturado".to_string(),
            context: existing.map(|inv| {
                serde_json::json!({
                    "existing_invoice": {
                        "invoice_id": inv.invoice_id,
                        "number": inv.number,
                        "status": inv.status,
                    }
                })
            }),
        }
    }

    pub async fn find_invoice_by_ticket_hash(
        &self,
        company_id: Uuid,
        ticket_hash: &str,
    ) -> Result<Option<Invoice>, AppError> {
        sqlx::query_as::<_, Invoice>(
            "SELECT * FROM invoices WHERE company_id = $1 AND ticket_hash = $2",
        )
        .bind(company_id)
        .bind(ticket_hash)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)
    }

    pub async fn list_invoices_by_requester(
        &self,
        user_id: Uuid,
    ) -> Result<Vec<Invoice>, AppError> {
        sqlx::query_as::<_, Invoice>(
            "SELECT * FROM invoices WHERE requester_user_id = $1 ORDER BY date DESC",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)
    }

    pub async fn list_pending_invoices(&self, company_id: Uuid) -> Result<Vec<Invoice>, AppError> {
        sqlx::query_as::<_, Invoice>(
            "SELECT * FROM invoices WHERE company_id = $1 AND status = 'PENDING' ORDER BY date DESC",
        )
        .bind(company_id)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)
    }

    pub async fn list_approved_invoices(&self, company_id: Uuid) -> Result<Vec<Invoice>, AppError> {
        sqlx::query_as::<_, Invoice>(
            r#"
            SELECT * FROM invoices
            WHERE company_id = $1 AND status IN ('APPROVED', 'GENERATED', 'SENT')
            ORDER BY date DESC
            "#,
        )
        .bind(company_id)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)
    }

    /// Fetch an invoice visible to the acting user: its requester or a user
    /// of the owning company. Anything else reads as absent.
    pub async fn find_invoice_for_actor(
        &self,
        invoice_id: Uuid,
        user_id: Uuid,
        company_id: Option<Uuid>,
    ) -> Result<Option<Invoice>, AppError> {
        sqlx::query_as::<_, Invoice>(
            r#"
            SELECT * FROM invoices
            WHERE invoice_id = $1 AND (requester_user_id = $2 OR company_id = $3)
            "#,
        )
        .bind(invoice_id)
        .bind(user_id)
        .bind(company_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)
    }

    pub async fn find_company_invoice(
        &self,
        company_id: Uuid,
        invoice_id: Uuid,
    ) -> Result<Option<Invoice>, AppError> {
        sqlx::query_as::<_, Invoice>(
            "SELECT * FROM invoices WHERE company_id = $1 AND invoice_id = $2",
        )
        .bind(company_id)
        .bind(invoice_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)
    }

    pub async fn invoice_items(&self, invoice_id: Uuid) -> Result<Vec<InvoiceItem>, AppError> {
        sqlx::query_as::<_, InvoiceItem>(
            "SELECT * FROM invoice_items WHERE invoice_id = $1 ORDER BY sort_order",
        )
        .bind(invoice_id)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)
    }

    /// Greatest invoice number of a company within a year prefix
    /// (`"2024-"`), or None when the year has no numbered invoices.
    pub async fn last_invoice_number(
        &self,
        company_id: Uuid,
        year_prefix: &str,
    ) -> Result<Option<String>, AppError> {
        sqlx::query_scalar::<_, String>(
            r#"
            SELECT number FROM invoices
            WHERE company_id = $1 AND number LIKE $2 || '%'
            ORDER BY number DESC
            LIMIT 1
            "#,
        )
        .bind(company_id)
        .bind(year_prefix)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)
    }

    /// Move a PENDING invoice to APPROVED: assign its number, approver and
    /// timestamp. Returns None when the invoice is missing, foreign, or not
    /// pending. A number collision (concurrent approval) maps to a conflict
    /// so the caller can recompute the number and retry.
    #[instrument(skip(self), fields(company_id = %company_id, invoice_id = %invoice_id, number = %number))]
    pub async fn approve_invoice(
        &self,
        company_id: Uuid,
        invoice_id: Uuid,
        approver_user_id: Uuid,
        number: &str,
        notes: Option<&str>,
    ) -> Result<Option<Invoice>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["approve_invoice"])
            .start_timer();

        let invoice = sqlx::query_as::<_, Invoice>(
            r#"
            UPDATE invoices
            SET number = $4,
                status = 'APPROVED',
                approver_user_id = $3,
                approved_utc = NOW(),
                description = COALESCE($5, description)
            WHERE company_id = $1 AND invoice_id = $2 AND status = 'PENDING'
            RETURNING *
            "#,
        )
        .bind(company_id)
        .bind(invoice_id)
        .bind(approver_user_id)
        .bind(number)
        .bind(notes)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                AppError::conflict("Invoice number already taken")
            } else {
                db_err(e)
            }
        })?;

        timer.observe_duration();

        if let Some(ref inv) = invoice {
            info!(number = %number, invoice_id = %inv.invoice_id, "Invoice approved");
        }

        Ok(invoice)
    }

    /// Advance an APPROVED invoice to GENERATED after a successful
    /// render + delivery.
    pub async fn mark_generated(&self, invoice_id: Uuid) -> Result<Invoice, AppError> {
        sqlx::query_as::<_, Invoice>(
            r#"
            UPDATE invoices
            SET status = 'GENERATED',
                generated_utc = NOW(),
                last_delivery_utc = NOW(),
                last_delivery_error = NULL
            WHERE invoice_id = $1
            RETURNING *
            "#,
        )
        .bind(invoice_id)
        .fetch_one(&self.pool)
        .await
        .map_err(db_err)
    }

    /// Record a failed delivery attempt without touching the status.
    pub async fn record_delivery_failure(
        &self,
        invoice_id: Uuid,
        error: &str,
    ) -> Result<(), AppError> {
        sqlx::query(
            r#"
            UPDATE invoices
            SET last_delivery_utc = NOW(), last_delivery_error = $2
            WHERE invoice_id = $1
            "#,
        )
        .bind(invoice_id)
        .bind(error)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(())
    }

    /// Reject a PENDING invoice with a reason. Returns None when missing,
    /// foreign, or already processed.
    #[instrument(skip(self), fields(company_id = %company_id, invoice_id = %invoice_id))]
    pub async fn reject_invoice(
        &self,
        company_id: Uuid,
        invoice_id: Uuid,
        reason: &str,
    ) -> Result<Option<Invoice>, AppError> {
        sqlx::query_as::<_, Invoice>(
            r#"
            UPDATE invoices
            SET status = 'REJECTED', rejection_reason = $3
            WHERE company_id = $1 AND invoice_id = $2 AND status = 'PENDING'
            RETURNING *
            "#,
        )
        .bind(company_id)
        .bind(invoice_id)
        .bind(reason)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)
    }

    /// Mark an invoice SENT and record the successful delivery.
    pub async fn mark_sent(&self, invoice_id: Uuid) -> Result<Invoice, AppError> {
        sqlx::query_as::<_, Invoice>(
            r#"
            UPDATE invoices
            SET status = 'SENT',
                last_delivery_utc = NOW(),
                last_delivery_error = NULL
            WHERE invoice_id = $1
            RETURNING *
            "#,
        )
        .bind(invoice_id)
        .fetch_one(&self.pool)
        .await
        .map_err(db_err)
    }

    // ==================== Dashboard ====================

    /// Company counters for the dashboard.
    pub async fn dashboard_stats(
        &self,
        company_id: Uuid,
    ) -> Result<(i64, i64, i64, Decimal), AppError> {
        sqlx::query_as::<_, (i64, i64, i64, Decimal)>(
            r#"
            SELECT
                (SELECT COUNT(*) FROM invoices WHERE company_id = $1),
                (SELECT COUNT(*) FROM invoices WHERE company_id = $1 AND status = 'PENDING'),
                (SELECT COUNT(*) FROM clients WHERE company_id = $1),
                (SELECT COALESCE(SUM(total_amount), 0) FROM invoices
                 WHERE company_id = $1 AND status IN ('GENERATED', 'SENT'))
            "#,
        )
        .bind(company_id)
        .fetch_one(&self.pool)
        .await
        .map_err(db_err)
    }
}
