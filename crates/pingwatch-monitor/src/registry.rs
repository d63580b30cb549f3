use pingwatch_model::{Target, TargetConfig};
use pingwatch_probe::{probe_host, AddressError};
use std::collections::HashSet;
use std::sync::{Mutex, MutexGuard, PoisonError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("no targets configured")]
    NoTargets,
    #[error("target id must not be empty (address {0:?})")]
    EmptyId(String),
    #[error("duplicate target id {0:?}")]
    DuplicateId(String),
    #[error("invalid address for target {id:?}: {source}")]
    InvalidAddress {
        id: String,
        #[source]
        source: AddressError,
    },
}

/// Ordered targets plus the navigation cursor.
///
/// Every target sits behind its own lock so a tick for one target never
/// contends with another. The cursor has a separate lock and is untouched by
/// ticks.
#[derive(Debug)]
pub struct TargetRegistry {
    targets: Vec<Mutex<Target>>,
    cursor: Mutex<usize>,
}

impl TargetRegistry {
    pub fn new(configs: Vec<TargetConfig>) -> Result<Self, ConfigError> {
        if configs.is_empty() {
            return Err(ConfigError::NoTargets);
        }

        let mut seen = HashSet::new();
        let mut targets = Vec::with_capacity(configs.len());
        for config in configs {
            if config.id.trim().is_empty() {
                return Err(ConfigError::EmptyId(config.address));
            }
            if let Err(source) = probe_host(&config.address) {
                return Err(ConfigError::InvalidAddress {
                    id: config.id,
                    source,
                });
            }
            if !seen.insert(config.id.clone()) {
                return Err(ConfigError::DuplicateId(config.id));
            }
            targets.push(Mutex::new(Target::new(config)));
        }

        Ok(Self {
            targets,
            cursor: Mutex::new(0),
        })
    }

    pub fn len(&self) -> usize {
        self.targets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }

    /// Snapshot of all targets in configured order.
    pub fn targets(&self) -> Vec<Target> {
        self.targets.iter().map(|slot| lock(slot).clone()).collect()
    }

    pub fn get(&self, index: usize) -> Option<Target> {
        self.targets.get(index).map(|slot| lock(slot).clone())
    }

    pub fn cursor(&self) -> usize {
        *lock(&self.cursor)
    }

    pub fn current(&self) -> Target {
        let cursor = lock(&self.cursor);
        lock(&self.targets[*cursor]).clone()
    }

    /// Select the next target, wrapping to the first after the last.
    pub fn advance(&self) -> Target {
        let mut cursor = lock(&self.cursor);
        *cursor = (*cursor + 1) % self.targets.len();
        lock(&self.targets[*cursor]).clone()
    }

    /// Mutate one target while holding its lock; readers never see a
    /// half-applied update.
    pub fn update<R>(&self, index: usize, f: impl FnOnce(&mut Target) -> R) -> Option<R> {
        let slot = self.targets.get(index)?;
        let mut target = lock(slot);
        Some(f(&mut target))
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pingwatch_model::ConnectionState;

    fn registry(addresses: &[&str]) -> TargetRegistry {
        TargetRegistry::new(
            addresses
                .iter()
                .map(|address| TargetConfig::from_address(*address))
                .collect(),
        )
        .unwrap()
    }

    #[test]
    fn advance_cycles_back_to_start() {
        for size in 1..=5 {
            let addresses: Vec<String> = (0..size).map(|i| format!("host{i}.example")).collect();
            let refs: Vec<&str> = addresses.iter().map(String::as_str).collect();
            let registry = registry(&refs);

            let start = registry.cursor();
            for _ in 0..registry.len() {
                registry.advance();
            }
            assert_eq!(registry.cursor(), start);
        }
    }

    #[test]
    fn advance_follows_configured_order() {
        let registry = registry(&["a.example", "b.example", "c.example"]);
        assert_eq!(registry.current().id(), "a.example");
        assert_eq!(registry.advance().id(), "b.example");
        assert_eq!(registry.advance().id(), "c.example");
        assert_eq!(registry.advance().id(), "a.example");
    }

    #[test]
    fn rejects_bad_configuration() {
        assert!(matches!(TargetRegistry::new(Vec::new()), Err(ConfigError::NoTargets)));

        let duplicate = vec![
            TargetConfig::new("gw", "10.0.0.1"),
            TargetConfig::new("gw", "10.0.0.2"),
        ];
        assert!(matches!(
            TargetRegistry::new(duplicate),
            Err(ConfigError::DuplicateId(id)) if id == "gw"
        ));

        let invalid = vec![TargetConfig::new("bad", "-oProxyCommand=x")];
        assert!(matches!(
            TargetRegistry::new(invalid),
            Err(ConfigError::InvalidAddress { id, .. }) if id == "bad"
        ));

        let unnamed = vec![TargetConfig::new(" ", "10.0.0.1")];
        assert!(matches!(TargetRegistry::new(unnamed), Err(ConfigError::EmptyId(_))));
    }

    #[test]
    fn update_mutates_a_single_target() {
        let registry = registry(&["a.example", "b.example"]);
        registry.update(1, |target| target.state = ConnectionState::Connected);

        let targets = registry.targets();
        assert_eq!(targets[0].state, ConnectionState::Unknown);
        assert_eq!(targets[1].state, ConnectionState::Connected);
        assert!(registry.update(2, |_| ()).is_none());
    }
}
