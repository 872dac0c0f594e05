use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::FromRow;
use uuid::Uuid;

/// Billed client, keyed by `(company_id, nif)` within an issuing company.
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Client {
    pub client_id: Uuid,
    pub company_id: Uuid,
    /// Portal user the record was last sighted from, if the client came in
    /// through the ticket flow.
    pub user_id: Option<Uuid>,
    pub name: String,
    pub nif: String,
    pub email: String,
    pub address: String,
    pub postal_code: String,
    pub phone: Option<String>,
    pub created_utc: DateTime<Utc>,
    pub updated_utc: DateTime<Utc>,
}

/// Mutable client identity fields, as supplied by either entry flow.
/// Construct via [`ClientFields::new`] so the NIF is canonicalized exactly
/// once, at the domain boundary.
#[derive(Debug, Clone)]
pub struct ClientFields {
    pub name: String,
    pub nif: String,
    pub email: String,
    pub address: String,
    pub postal_code: String,
    pub phone: Option<String>,
}

impl ClientFields {
    pub fn new(
        name: String,
        nif: &str,
        email: String,
        address: String,
        postal_code: String,
        phone: Option<String>,
    ) -> Self {
        Self {
            name,
            nif: canonical_nif(nif),
            email,
            address,
            postal_code,
            phone,
        }
    }
}

/// Partial update for a client; absent fields keep their stored value.
#[derive(Debug, Clone, Default)]
pub struct UpdateClient {
    pub name: Option<String>,
    pub nif: Option<String>,
    pub email: Option<String>,
    pub address: Option<String>,
    pub postal_code: Option<String>,
    pub phone: Option<String>,
}

/// Canonical NIF form: trimmed and uppercased. Every flow that writes or
/// looks up a NIF goes through here.
pub fn canonical_nif(nif: &str) -> String {
    nif.trim().to_uppercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn canonical_nif_uppercases_and_trims() {
        assert_eq!(canonical_nif("  b12345678 "), "B12345678");
        assert_eq!(canonical_nif("12345678z"), "12345678Z");
    }

    #[test]
    fn client_fields_canonicalize_on_construction() {
        let fields = ClientFields::new(
            "Acme".into(),
            "x1234567a",
            "a@b.com".into(),
            "Street 1".into(),
            "28001".into(),
            None,
        );
        assert_eq!(fields.nif, "X1234567A");
    }
}
