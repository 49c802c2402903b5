use std::sync::Arc;

use services::services::{
    config::AppConfig, evaluation::EvaluationService, generative::ClientProvider,
    upload::UploadError,
};

pub mod error;
pub mod routes;

/// Shared, read-only state handed to every handler. Everything a request
/// mutates lives in that request's own scope.
#[derive(Clone)]
pub struct AppState {
    config: Arc<AppConfig>,
    evaluation: EvaluationService,
}

impl AppState {
    pub fn new(config: AppConfig, provider: Arc<dyn ClientProvider>) -> Result<Self, UploadError> {
        let evaluation = EvaluationService::new(&config, provider)?;
        Ok(Self {
            config: Arc::new(config),
            evaluation,
        })
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn evaluation(&self) -> &EvaluationService {
        &self.evaluation
    }
}
