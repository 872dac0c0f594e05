//! Domain models for factura-service.

mod client;
mod company;
mod invoice;
mod ticket;
mod user;

pub use client::{canonical_nif, Client, ClientFields, UpdateClient};
pub use company::{Company, CompanySummary, NewCompany};
pub use invoice::{
    money, next_invoice_number, number_prefix, CreateDirectInvoice, CreateTicketInvoice, Invoice,
    InvoiceItem, InvoiceStatus, LineItemInput, TaxBreakdown, DEFAULT_TAX_RATE,
};
pub use ticket::{TicketData, TicketItem};
pub use user::{NewUser, SanitizedUser, User, UserType};
