// src/state.rs

use std::sync::Arc;

use axum::extract::FromRef;

use crate::{
    config::Config,
    store::{DynStore, MemoryStore},
};

#[derive(Clone)]
pub struct AppState {
    pub store: DynStore,
    pub config: Config,
}

impl AppState {
    pub fn new(store: DynStore, config: Config) -> Self {
        Self { store, config }
    }

    /// Fresh in-memory state, as used by the integration tests.
    pub fn in_memory(config: Config) -> Self {
        Self::new(Arc::new(MemoryStore::new()), config)
    }
}

impl FromRef<AppState> for DynStore {
    fn from_ref(state: &AppState) -> Self {
        state.store.clone()
    }
}

impl FromRef<AppState> for Config {
    fn from_ref(state: &AppState) -> Self {
        state.config.clone()
    }
}
