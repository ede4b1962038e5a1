use std::sync::Arc;

use actix_cors::Cors;
use actix_web::{web, App, HttpServer};
use opensplit::{
    routes,
    service::LedgerService,
    settings::{Settings, Storage},
    store::{LedgerStore, MemoryStore, MongoStore},
};

#[actix_web::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let settings = Settings::new()?;

    tracing_subscriber::fmt()
        .with_env_filter(format!("opensplit={level}", level = settings.log.level))
        .init();

    let store: Arc<dyn LedgerStore> = match settings.storage {
        Storage::Mongodb => {
            tracing::info!(database = %settings.mongodb.database, "using MongoDB storage");
            Arc::new(MongoStore::connect(&settings.mongodb.uri, &settings.mongodb.database).await?)
        }
        Storage::Memory => {
            tracing::warn!("using in-memory storage, nothing will be persisted");
            Arc::new(MemoryStore::new())
        }
    };
    let service = web::Data::new(LedgerService::with_settings(store, &settings.ledger));

    let bind = (settings.server.bind.clone(), settings.server.port);
    tracing::info!(bind = %bind.0, port = bind.1, "starting server");

    HttpServer::new(move || {
        App::new()
            .wrap(Cors::permissive())
            .app_data(service.clone())
            .configure(routes::configure)
    })
    .bind(bind)?
    .run()
    .await?;

    Ok(())
}
