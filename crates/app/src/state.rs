//! Application state management

use std::sync::Arc;
use std::time::Duration;

use tracing::info;

use toefl_core::{ClientConfig, Database};
use toefl_net::{ApiClient, AuthoringApi, ReviewApi, SectionApi};

use crate::error::Result;
use crate::session::SessionHolder;

/// Everything a command needs, built once at startup
pub struct AppState {
    config: ClientConfig,
    client: Arc<ApiClient>,
    session: Arc<SessionHolder>,
}

impl AppState {
    pub fn new(config: ClientConfig) -> Result<Self> {
        let data_dir = config.data_dir()?;
        std::fs::create_dir_all(&data_dir).map_err(toefl_core::Error::from)?;

        let db = Database::open(&config.storage_path()?)?;
        let client = Arc::new(ApiClient::new(
            &config.api_url,
            Duration::from_secs(config.request_timeout_secs),
        )?);
        let session = Arc::new(SessionHolder::new(client.clone(), Box::new(db)));

        info!(data_dir = %data_dir.display(), api_url = %config.api_url, "Application state ready");
        Ok(Self {
            config,
            client,
            session,
        })
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn client(&self) -> &ApiClient {
        &self.client
    }

    pub fn session(&self) -> Arc<SessionHolder> {
        self.session.clone()
    }

    pub fn sections(&self) -> Arc<dyn SectionApi> {
        self.client.clone()
    }

    pub fn review(&self) -> Arc<dyn ReviewApi> {
        self.client.clone()
    }

    pub fn authoring(&self) -> Arc<dyn AuthoringApi> {
        self.client.clone()
    }
}
