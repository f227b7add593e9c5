//! Infrastructure layer: entity stores, mail delivery and payment checkout.

pub mod checkout;
pub mod mail;
pub mod store;

pub use checkout::{
    CheckoutError, CheckoutGateway, CheckoutRequest, CheckoutSession, FakeCheckoutGateway, SIGNATURE_HEADER,
    StripeCheckoutGateway, WebhookEvent, WebhookVerifier,
};
pub use mail::{Email, EmailTemplate, MailError, Mailer, RecordingMailer, SmtpConfig, SmtpMailer};
pub use store::{DocumentQuery, EntityStore, InMemoryEntityStore, StoreError};
#[cfg(feature = "postgres")]
pub use store::{PostgresEntityStore, ensure_schema};
