//! Service wiring: stores, token codec, mailer and checkout gateway.

use std::sync::Arc;
use std::time::Duration;

use tourbook_auth::{Hs256Jwt, User};
use tourbook_bookings::Booking;
use tourbook_infra::{
    CheckoutError, CheckoutGateway, EntityStore, FakeCheckoutGateway, InMemoryEntityStore, MailError, Mailer,
    RecordingMailer, SmtpMailer, StoreError, StripeCheckoutGateway, WebhookVerifier,
};
use tourbook_reviews::Review;
use tourbook_tours::Tour;

use crate::config::AppConfig;
use crate::middleware::AuthState;

const CHECKOUT_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, thiserror::Error)]
pub enum StartupError {
    #[error("mailer: {0}")]
    Mail(#[from] MailError),

    #[error("checkout: {0}")]
    Checkout(#[from] CheckoutError),

    #[error("store: {0}")]
    Store(#[from] StoreError),

    #[error("database: {0}")]
    Database(String),
}

/// Everything handlers need, shared behind one `Arc`.
#[derive(Clone)]
pub struct AppServices {
    pub config: AppConfig,
    pub tours: Arc<dyn EntityStore<Tour>>,
    pub users: Arc<dyn EntityStore<User>>,
    pub reviews: Arc<dyn EntityStore<Review>>,
    pub bookings: Arc<dyn EntityStore<Booking>>,
    pub jwt: Arc<Hs256Jwt>,
    pub mailer: Arc<dyn Mailer>,
    pub checkout: Arc<dyn CheckoutGateway>,
    /// `None` when no webhook secret is configured; callbacks are then refused.
    pub webhook: Option<WebhookVerifier>,
}

impl AppServices {
    /// In-memory stores with a recording mailer and a fake gateway.
    pub fn in_memory(config: AppConfig) -> Self {
        let jwt = Arc::new(Hs256Jwt::new(config.jwt_secret.as_bytes(), config.jwt_expires_in));
        let webhook = config.stripe_webhook_secret.as_deref().map(WebhookVerifier::new);
        Self {
            tours: Arc::new(InMemoryEntityStore::<Tour>::new()),
            users: Arc::new(InMemoryEntityStore::<User>::new()),
            reviews: Arc::new(InMemoryEntityStore::<Review>::new()),
            bookings: Arc::new(InMemoryEntityStore::<Booking>::new()),
            jwt,
            mailer: Arc::new(RecordingMailer::new()),
            checkout: Arc::new(FakeCheckoutGateway::new()),
            webhook,
            config,
        }
    }

    pub fn with_mailer(mut self, mailer: Arc<dyn Mailer>) -> Self {
        self.mailer = mailer;
        self
    }

    pub fn with_checkout(mut self, checkout: Arc<dyn CheckoutGateway>) -> Self {
        self.checkout = checkout;
        self
    }

    pub fn auth_state(&self) -> AuthState {
        AuthState {
            jwt: self.jwt.clone(),
            users: self.users.clone(),
        }
    }
}

/// Wire adapters according to `config`.
pub async fn build_services(config: AppConfig) -> Result<AppServices, StartupError> {
    let mut services = AppServices::in_memory(config.clone());

    if let Some(smtp) = config.smtp.clone() {
        tracing::info!(host = %smtp.host, port = smtp.port, "using SMTP mailer");
        services = services.with_mailer(Arc::new(SmtpMailer::new(smtp)?));
    } else {
        tracing::info!("EMAIL_HOST not set; emails are recorded, not sent");
    }

    if let Some(key) = config.stripe_secret_key.as_deref() {
        services = services.with_checkout(Arc::new(StripeCheckoutGateway::new(key, CHECKOUT_TIMEOUT)?));
    } else {
        tracing::info!("STRIPE_SECRET_KEY not set; using the fake checkout gateway");
    }

    if let Some(url) = config.database_url.as_deref() {
        services = with_database(services, url).await?;
    }

    Ok(services)
}

#[cfg(feature = "postgres")]
async fn with_database(mut services: AppServices, url: &str) -> Result<AppServices, StartupError> {
    use tourbook_infra::{PostgresEntityStore, ensure_schema};

    let pool = sqlx::PgPool::connect(url)
        .await
        .map_err(|e| StartupError::Database(e.to_string()))?;
    ensure_schema(&pool).await?;
    tracing::info!("using Postgres document store");

    services.tours = Arc::new(PostgresEntityStore::<Tour>::new(pool.clone()));
    services.users = Arc::new(PostgresEntityStore::<User>::new(pool.clone()));
    services.reviews = Arc::new(PostgresEntityStore::<Review>::new(pool.clone()));
    services.bookings = Arc::new(PostgresEntityStore::<Booking>::new(pool));
    Ok(services)
}

#[cfg(not(feature = "postgres"))]
async fn with_database(services: AppServices, _url: &str) -> Result<AppServices, StartupError> {
    tracing::warn!("DATABASE_URL is set but the postgres feature is disabled; using in-memory stores");
    Ok(services)
}
