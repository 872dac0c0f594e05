pub mod database;
pub mod email;
pub mod jwt;
pub mod metrics;
pub mod ocr;
pub mod pdf;

pub use database::Database;
pub use email::{EmailProvider, EmailService, MockEmailService};
pub use jwt::{AccessTokenClaims, JwtService};
pub use ocr::{MockOcrProvider, OcrProvider, OcrSpaceClient};
