use std::sync::Arc;

use crate::store::Store;

/// Shared handler state: the node's bucket store.
#[derive(Clone)]
pub struct ApiState {
    pub store: Arc<dyn Store>,
}

impl ApiState {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }
}
