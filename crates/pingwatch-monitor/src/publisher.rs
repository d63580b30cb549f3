use chrono::{DateTime, SecondsFormat, Utc};
use pingwatch_model::{ConnectionState, Quality, StoreSnapshot, Target, TargetVariables, Variable};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PublishError {
    #[error("failed to write variables for {id}: {message}")]
    Write { id: String, message: String },
}

/// The externally observable variable store.
///
/// `write_group` replaces all fields of one target as a unit and reports
/// whether anything changed.
pub trait VariableStore: Send + Sync {
    fn write_group(&self, variables: TargetVariables) -> Result<bool, PublishError>;
    fn read(&self, id: &str) -> Option<TargetVariables>;
}

impl<S: VariableStore + ?Sized> VariableStore for Arc<S> {
    fn write_group(&self, variables: TargetVariables) -> Result<bool, PublishError> {
        (**self).write_group(variables)
    }

    fn read(&self, id: &str) -> Option<TargetVariables> {
        (**self).read(id)
    }
}

/// Field group for a target, annotated with data quality.
///
/// `ping_time` keeps the last measured latency after failures, marked
/// `Uncertain`; it is `Bad` only when nothing was ever measured.
pub fn target_variables(target: &Target) -> TargetVariables {
    let state_quality = match target.state {
        ConnectionState::Unknown => Quality::Bad,
        ConnectionState::Connected | ConnectionState::Disconnected => Quality::Good,
    };

    let time_quality = match (target.state, target.last_latency_ms) {
        (_, None) => Quality::Bad,
        (ConnectionState::Connected, Some(_)) => Quality::Good,
        (_, Some(_)) => Quality::Uncertain,
    };

    TargetVariables {
        id: target.id().to_string(),
        ping_state: Variable::new(target.is_connected(), state_quality),
        ping_time: Variable::new(target.last_latency_ms, time_quality),
        service_url: Variable::new(target.address().to_string(), Quality::Good),
    }
}

#[derive(Debug)]
pub struct Publisher<S> {
    store: S,
}

impl<S: VariableStore> Publisher<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Write the target's latest state. Returns whether the store changed.
    pub fn publish(&self, target: &Target) -> Result<bool, PublishError> {
        self.store.write_group(target_variables(target))
    }
}

/// In-process store keeping groups in first-write order.
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: Mutex<MemoryInner>,
}

#[derive(Debug, Default)]
struct MemoryInner {
    order: Vec<String>,
    groups: HashMap<String, TargetVariables>,
    version: u64,
    updated_at: Option<DateTime<Utc>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of writes that actually changed something.
    pub fn version(&self) -> u64 {
        self.lock().version
    }

    pub fn snapshot(&self) -> StoreSnapshot {
        let inner = self.lock();
        StoreSnapshot {
            version: inner.version,
            updated_at_utc: inner
                .updated_at
                .map(|at| at.to_rfc3339_opts(SecondsFormat::Millis, true))
                .unwrap_or_default(),
            targets: inner
                .order
                .iter()
                .filter_map(|id| inner.groups.get(id).cloned())
                .collect(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, MemoryInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl VariableStore for MemoryStore {
    fn write_group(&self, variables: TargetVariables) -> Result<bool, PublishError> {
        let mut inner = self.lock();
        if inner.groups.get(&variables.id) == Some(&variables) {
            return Ok(false);
        }

        if !inner.groups.contains_key(&variables.id) {
            inner.order.push(variables.id.clone());
        }
        inner.groups.insert(variables.id.clone(), variables);
        inner.version += 1;
        inner.updated_at = Some(Utc::now());
        Ok(true)
    }

    fn read(&self, id: &str) -> Option<TargetVariables> {
        self.lock().groups.get(id).cloned()
    }
}
