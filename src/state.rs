use crate::services::{
    object_store::ObjectStore, reconciler::Reconciler, relocation::RelocationService,
};
use std::sync::Arc;

/// Shared handler state. Cheap to clone.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn ObjectStore>,
    pub relocation: RelocationService,
    pub reconciler: Arc<Reconciler>,
}

impl AppState {
    pub fn new(relocation: RelocationService, reconciler: Arc<Reconciler>) -> Self {
        Self {
            store: relocation.store().clone(),
            relocation,
            reconciler,
        }
    }
}
