pub(crate) mod api;
pub(crate) mod core;
pub(crate) mod db;
pub(crate) mod lifecycle;
pub(crate) mod repositories;
pub(crate) mod schemas;
pub(crate) mod services;
pub(crate) mod store;
pub(crate) mod tasks;

#[cfg(test)]
mod test_support;

use std::path::Path;
use std::sync::Arc;

use crate::core::clock::SystemClock;
use crate::core::config::{Settings, StorageBackend};
use crate::core::{state::AppState, telemetry};
use crate::lifecycle::ExamEngine;
use crate::services::ai_grading::HttpGrader;
use crate::services::notifications;
use crate::services::paper_generation::HttpPaperGenerator;
use crate::store::{MemoryStore, PgStore, Store};

pub async fn run() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let settings = Settings::load()?;
    telemetry::init_tracing(&settings)?;
    core::metrics::init(&settings)?;

    let engine = build_engine(&settings).await?;
    let state = AppState::new(settings, engine);

    let app = api::router::router(state.clone());
    let listener = tokio::net::TcpListener::bind(state.settings().server_addr()).await?;

    tracing::info!(
        host = %state.settings().server_host(),
        port = state.settings().server_port(),
        environment = %state.settings().runtime().environment.as_str(),
        "Exam lifecycle API listening"
    );

    axum::serve(listener, app).with_graceful_shutdown(core::shutdown::shutdown_signal()).await?;

    Ok(())
}

pub async fn run_worker() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let settings = Settings::load()?;
    telemetry::init_tracing(&settings)?;
    core::metrics::init(&settings)?;

    let engine = build_engine(&settings).await?;
    tasks::scheduler::run(engine, &settings).await
}

async fn build_engine(settings: &Settings) -> anyhow::Result<ExamEngine> {
    let store: Arc<dyn Store> = match settings.storage().backend {
        StorageBackend::Postgres => {
            let pool = db::init_pool(settings).await?;
            db::run_migrations(&pool).await?;
            Arc::new(PgStore::new(pool))
        }
        StorageBackend::Memory => {
            let store = match settings.storage().memory_seed_path.as_deref() {
                Some(path) => MemoryStore::from_seed_file(Path::new(path))?,
                None => MemoryStore::new(),
            };
            tracing::warn!("Using in-memory store; state is lost on restart");
            Arc::new(store)
        }
    };

    let grader = Arc::new(HttpGrader::from_settings(settings)?);
    let papers = Arc::new(HttpPaperGenerator::from_settings(settings)?);
    let notifier = notifications::from_settings(settings)?;

    Ok(ExamEngine::new(store, Arc::new(SystemClock), grader, papers, notifier))
}
