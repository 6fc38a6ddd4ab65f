use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{Mutex, OwnedMutexGuard};

use driftguard_domain::Parameter;

/// One async mutex per parameter, so at most one orchestration loop runs per
/// parameter while distinct parameters proceed in parallel.
#[derive(Debug, Default)]
pub struct ParameterLocks {
    locks: Mutex<HashMap<Parameter, Arc<Mutex<()>>>>,
}

impl ParameterLocks {
    pub async fn acquire(&self, parameter: &Parameter) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.locks.lock().await;
            locks
                .entry(parameter.clone())
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .clone()
        };
        lock.lock_owned().await
    }
}
