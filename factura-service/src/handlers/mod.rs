pub mod auth;
pub mod clients;
pub mod companies;
pub mod dashboard;
pub mod invoices;
pub mod metrics;
