//! [`ComponentFactory`] that launches real processes.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chainrig_core::{ComponentFactory, ComponentRole, Runnable, RunnableResult};

use crate::component::ProcessComponent;
use crate::error::{ProcessError, ProcessResult};
use crate::spec::{Placeholders, ProcessSpec};

#[derive(Debug, Clone)]
pub struct ProcessFactory {
    specs: BTreeMap<ComponentRole, ProcessSpec>,
    log_dir: PathBuf,
}

impl ProcessFactory {
    pub fn new(log_dir: impl Into<PathBuf>) -> Self {
        Self {
            specs: BTreeMap::new(),
            log_dir: log_dir.into(),
        }
    }

    /// Build from a role-name keyed table, e.g. `[components.beacon-node]`.
    pub fn from_named<'a>(
        log_dir: impl Into<PathBuf>,
        specs: impl IntoIterator<Item = (&'a String, &'a ProcessSpec)>,
    ) -> ProcessResult<Self> {
        let mut factory = Self::new(log_dir);
        for (name, spec) in specs {
            let role = name
                .parse::<ComponentRole>()
                .map_err(|reason| ProcessError::InvalidSpec {
                    component: name.clone(),
                    reason,
                })?;
            factory = factory.with_spec(role, spec.clone());
        }
        Ok(factory)
    }

    pub fn with_spec(mut self, role: ComponentRole, spec: ProcessSpec) -> Self {
        self.specs.insert(role, spec);
        self
    }

    pub fn log_dir(&self) -> &Path {
        &self.log_dir
    }

    /// Roles in `roles` with no spec configured.
    pub fn missing<'r>(&self, roles: &'r [ComponentRole]) -> Vec<&'r ComponentRole> {
        roles.iter().filter(|r| !self.specs.contains_key(r)).collect()
    }

    fn build(&self, role: ComponentRole, name: String, index: usize) -> ProcessResult<Arc<dyn Runnable>> {
        let spec = self.specs.get(&role).ok_or_else(|| ProcessError::MissingSpec {
            role: role.name().to_string(),
        })?;
        let resolved = spec.resolve(&Placeholders {
            name: &name,
            index,
            log_dir: &self.log_dir,
        });
        Ok(Arc::new(ProcessComponent::new(name, resolved, &self.log_dir)))
    }
}

impl ComponentFactory for ProcessFactory {
    fn single(&self, role: ComponentRole) -> RunnableResult<Arc<dyn Runnable>> {
        Ok(self.build(role, role.name().to_string(), 0)?)
    }

    fn member(&self, role: ComponentRole, index: usize) -> RunnableResult<Arc<dyn Runnable>> {
        Ok(self.build(role, format!("{}-{index}", role.name()), index)?)
    }
}
