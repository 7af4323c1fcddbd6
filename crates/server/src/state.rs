//! Shared application state

use std::sync::Arc;

use callflow_config::Settings;
use callflow_dialog::DialogEngine;

#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<DialogEngine>,
    pub settings: Arc<Settings>,
}

impl AppState {
    pub fn new(engine: Arc<DialogEngine>, settings: Arc<Settings>) -> Self {
        Self { engine, settings }
    }
}
