//! Storefront Orders service

use anyhow::{Context, Result};
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use storefront_orders::domain::value_objects::Money;
use storefront_orders::store::{PgOrderStore, PgProductStore};
use storefront_orders::{
    router, AppState, Config, EventPublisher, OrderService, PaymentService, PaymentSettings, StripeGateway,
};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry().with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into())).with(tracing_subscriber::fmt::layer()).init();
    let config = Config::from_env().context("loading configuration")?;

    let db = PgPoolOptions::new().max_connections(10).connect(&config.database_url).await.context("connecting to Postgres")?;
    sqlx::migrate!("./migrations").run(&db).await?;

    let nats = match &config.nats_url {
        Some(url) => match async_nats::connect(url).await {
            Ok(client) => Some(client),
            Err(e) => {
                tracing::warn!(error = %e, "NATS unavailable, order events stay in-process");
                None
            }
        },
        None => None,
    };
    let publisher = EventPublisher::new(nats);

    let http = reqwest::Client::builder().timeout(config.stripe_http_timeout).build()?;
    let gateway = Arc::new(StripeGateway::new(http, &config.stripe_secret_key, &config.stripe_api_base));
    let products = Arc::new(PgProductStore::new(&db));
    let orders = Arc::new(PgOrderStore::new(&db));

    let payments = Arc::new(PaymentService::new(gateway, orders.clone(), publisher.clone(), PaymentSettings {
        currency: config.currency.clone(),
        webhook_secret: config.stripe_webhook_secret.clone(),
        confirm_timeout: config.payment_confirm_timeout,
    }));
    let delivery_charge = Money::new(config.delivery_charge);
    let order_service = OrderService::new(products, orders, payments.clone(), publisher, delivery_charge);

    let app = router(AppState { orders: order_service, payments });
    tracing::info!("Storefront orders listening on 0.0.0.0:{}", config.port);
    axum::serve(tokio::net::TcpListener::bind(("0.0.0.0", config.port)).await?, app).await?;
    Ok(())
}
