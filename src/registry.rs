use thiserror::Error;

use crate::models::Target;

/// Hard cap on tracked targets, sized for the probe's fixed display.
pub const CAPACITY: usize = 12;

#[derive(Debug, PartialEq, Eq, Error)]
pub enum RegistryError {
    #[error("registry full ({} targets)", CAPACITY)]
    Full,
    #[error("no target named {0:?}")]
    NotFound(String),
}

/// Ordered table of monitored targets. Insertion order is display and
/// telemetry order; duplicate names are allowed and lookups take the
/// first match.
#[derive(Debug, Default)]
pub struct TargetRegistry {
    targets: Vec<Target>,
}

impl TargetRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn targets(&self) -> &[Target] {
        &self.targets
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Target> {
        self.targets.iter_mut()
    }

    pub fn len(&self) -> usize {
        self.targets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }

    pub fn find_by_name(&self, name: &str) -> Option<usize> {
        self.targets.iter().position(|t| t.name == name)
    }

    pub fn add(&mut self, name: &str, host: &str, interval_ms: u64) -> Result<(), RegistryError> {
        if self.targets.len() >= CAPACITY {
            return Err(RegistryError::Full);
        }
        self.targets.push(Target::new(name, host, interval_ms));
        Ok(())
    }

    pub fn remove(&mut self, name: &str) -> Result<Target, RegistryError> {
        let idx = self
            .find_by_name(name)
            .ok_or_else(|| RegistryError::NotFound(name.to_string()))?;
        Ok(self.targets.remove(idx))
    }

    pub fn set_interval(&mut self, name: &str, interval_ms: u64) -> Result<(), RegistryError> {
        let idx = self
            .find_by_name(name)
            .ok_or_else(|| RegistryError::NotFound(name.to_string()))?;
        self.targets[idx].interval_ms = interval_ms;
        Ok(())
    }
}
