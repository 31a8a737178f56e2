//! Persistent map of chain name to run state

use flowmine_core::persist::{read_json_tolerant, write_json_atomic};
use flowmine_core::Result;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::state::WorkflowState;

/// The whole map is rewritten atomically after every mutation
#[derive(Clone)]
pub struct StateStore {
    path: PathBuf,
    states: Arc<Mutex<BTreeMap<String, WorkflowState>>>,
}

impl StateStore {
    /// Load the state document; a missing or corrupt one starts empty
    pub async fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let states: BTreeMap<String, WorkflowState> =
            read_json_tolerant(&path).await.unwrap_or_default();

        info!("Loaded {} workflow states from {}", states.len(), path.display());
        Self {
            path,
            states: Arc::new(Mutex::new(states)),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn get(&self, chain: &str) -> Option<WorkflowState> {
        self.states.lock().await.get(chain).cloned()
    }

    pub async fn all(&self) -> Vec<WorkflowState> {
        self.states.lock().await.values().cloned().collect()
    }

    /// Insert or replace the state for its chain and persist
    pub async fn put(&self, state: &WorkflowState) -> Result<()> {
        let mut states = self.states.lock().await;
        states.insert(state.chain.clone(), state.clone());
        debug!("Persisting state for {} ({})", state.chain, state.status);
        write_json_atomic(&self.path, &*states).await
    }

    pub async fn remove(&self, chain: &str) -> Result<bool> {
        let mut states = self.states.lock().await;
        let removed = states.remove(chain).is_some();
        if removed {
            write_json_atomic(&self.path, &*states).await?;
        }
        Ok(removed)
    }

    /// Keep only states matching `keep`, returning how many were dropped
    pub async fn retain(&self, keep: impl Fn(&WorkflowState) -> bool) -> Result<usize> {
        let mut states = self.states.lock().await;
        let before = states.len();
        states.retain(|_, s| keep(s));
        let dropped = before - states.len();
        write_json_atomic(&self.path, &*states).await?;
        Ok(dropped)
    }
}
