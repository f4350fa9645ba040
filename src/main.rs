// region:    --- Imports
use auction_engine::auction::AuctionManager;
use auction_engine::config::{AuctionConfig, NotifierKind, ServiceConfig};
use auction_engine::database::DatabaseManager;
use auction_engine::handlers;
use auction_engine::message_broker::KafkaProducer;
use auction_engine::notifier::{AuctionNotifier, KafkaSink, LogSink, NotificationSink, WebhookSink};
use auction_engine::store::PgAuctionStore;
use axum::extract::DefaultBodyLimit;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tracing::{error, info};
// endregion: --- Imports

// region:    --- Main
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .without_time()
        .with_target(false)
        .init();

    let service_config = ServiceConfig::from_env()?;
    let auction_config = AuctionConfig::from_env()?;
    info!("{:<12} --> config loaded: {:?}", "Main", auction_config);

    let db_manager = DatabaseManager::new(&service_config).await?;
    if let Err(e) = db_manager.initialize_database().await {
        error!("{:<12} --> database initialization failed: {:?}", "Main", e);
        return Err(e.into());
    }

    let sink: Arc<dyn NotificationSink> = match &service_config.notifier {
        NotifierKind::Log => Arc::new(LogSink),
        NotifierKind::Kafka { brokers, topic } => {
            let producer = KafkaProducer::new(brokers)?;
            if let Err(e) = producer.create_topic(topic, 3, 1).await {
                error!("{:<12} --> topic setup failed: {}", "Main", e);
            }
            Arc::new(KafkaSink::new(producer, topic.clone()))
        }
        NotifierKind::Webhook { url } => Arc::new(WebhookSink::new(url.clone())),
    };
    info!("{:<12} --> notifications via {}", "Main", sink.name());
    let notifier = AuctionNotifier::new(sink, auction_config.notification_timeout);

    let store = Arc::new(PgAuctionStore::new(
        &db_manager,
        auction_config.transaction_timeout,
    ));
    let manager = Arc::new(AuctionManager::new(store, notifier, auction_config));

    let report = manager.recover_active_auctions().await?;
    info!(
        "{:<12} --> recovered auctions: {} armed, {} settled",
        "Main", report.armed, report.completed
    );
    manager.start();

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let routes_all = handlers::routes(Arc::clone(&manager))
        .layer(cors)
        .layer(DefaultBodyLimit::max(1024 * 1024));

    let listener = TcpListener::bind(&service_config.bind_addr).await?;
    info!(
        "{:<12} --> Web Server: Listening on {}",
        "Main",
        listener.local_addr()?
    );

    if let Err(err) = axum::serve(listener, routes_all.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await
    {
        error!("{:<12} --> Server error: {}", "Main", err);
    }

    manager.shutdown().await;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("{:<12} --> failed to listen for ctrl-c: {}", "Main", e);
        std::future::pending::<()>().await;
    }
    info!("{:<12} --> shutdown requested", "Main");
}
// endregion: --- Main
