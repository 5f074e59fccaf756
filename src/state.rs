//! Shared application state, injected into every handler via `axum::extract::State`.

use crate::{
    auth::token::TokenIssuer,
    config::Config,
    db::Db,
    services::{
        appointments::AppointmentStore,
        call_history::CallLog,
        doctors::DoctorStore,
        notifier::CallBroadcaster,
        pdf_import::PdfImporter,
        queue::QueueController,
        settings::SettingsStore,
        tts::TtsClient,
    },
};

/// Application-wide state passed via axum `State<AppState>`.
///
/// Every field is a handle (pool, `Arc`s or channel senders), so cloning per
/// request is cheap. Stores are built from the pool on demand.
#[derive(Clone)]
pub struct AppState {
    pub pool:     Db,
    pub config:   Config,
    pub tokens:   TokenIssuer,
    pub calls:    CallBroadcaster,
    pub settings: SettingsStore,
    pub tts:      TtsClient,
}

impl AppState {
    pub fn new(pool: Db, config: Config) -> anyhow::Result<Self> {
        Ok(Self {
            tokens:   TokenIssuer::new(&config.jwt_secret, config.jwt_ttl_hours),
            calls:    CallBroadcaster::new(),
            settings: SettingsStore::new(&config.settings_path),
            tts:      TtsClient::new(&config)?,
            pool,
            config,
        })
    }

    pub fn appointments(&self) -> AppointmentStore {
        AppointmentStore::new(self.pool.clone())
    }

    pub fn doctors(&self) -> DoctorStore {
        DoctorStore::new(self.pool.clone())
    }

    pub fn call_log(&self) -> CallLog {
        CallLog::new(self.pool.clone())
    }

    pub fn queue(&self) -> QueueController {
        QueueController::new(self.pool.clone(), self.calls.clone())
    }

    pub fn importer(&self) -> PdfImporter {
        PdfImporter::new(self.pool.clone())
    }
}

/// Migrated throwaway database plus state around it, for router tests.
#[cfg(test)]
pub async fn test_state() -> (AppState, tempfile::TempDir) {
    let (pool, dir) = crate::db::test_pool().await;
    let config = Config::for_tests(dir.path());
    let state = AppState::new(pool, config).expect("test state");
    (state, dir)
}
