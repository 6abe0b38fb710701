//! Loading state of the collaborators the controller needs before it can execute.

use crate::model::{ClusterConfig, Script};
use std::collections::HashMap;

/// Id of the editable scratch script. Selecting it keeps whatever is already loaded.
pub const SCRATCH_SCRIPT_ID: &str = "__scratch__";

#[derive(Debug, Clone, Default)]
pub struct CatalogState {
    pub loading: bool,
    pub scripts: HashMap<String, Script>,
}

impl CatalogState {
    pub fn loading() -> Self {
        Self {
            loading: true,
            scripts: HashMap::new(),
        }
    }

    pub fn loaded(scripts: impl IntoIterator<Item = Script>) -> Self {
        Self {
            loading: false,
            scripts: scripts.into_iter().map(|s| (s.id.clone(), s)).collect(),
        }
    }

    pub fn get(&self, id: &str) -> Option<&Script> {
        if self.loading {
            return None;
        }
        self.scripts.get(id)
    }
}

#[derive(Debug, Clone, Default)]
pub struct ClusterState {
    pub loading: bool,
    pub selected_cluster_name: Option<String>,
    pub config: Option<ClusterConfig>,
}

impl ClusterState {
    pub fn loading() -> Self {
        Self {
            loading: true,
            ..Default::default()
        }
    }

    pub fn connected(config: ClusterConfig) -> Self {
        Self {
            loading: false,
            selected_cluster_name: Some(config.name.clone()),
            config: Some(config),
        }
    }
}
