//! Application state shared by all handlers.

use mediarelay_core::Config;
use mediarelay_services::{TempStore, TransferService};
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    pub transfers: Arc<TransferService>,
}

impl AppState {
    pub fn temp_store(&self) -> &TempStore {
        self.transfers.temp_store()
    }
}
