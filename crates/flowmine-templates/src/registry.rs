//! Named workflow chain registry

use flowmine_core::persist::{read_json_tolerant, write_json_atomic};
use flowmine_core::{FlowError, Result, WorkflowChain};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::builtin::builtin_chains;

/// Substitute every `${key}` in `text`. Unknown placeholders are left as is.
pub fn resolve_variables(text: &str, variables: &BTreeMap<String, String>) -> String {
    variables
        .iter()
        .fold(text.to_string(), |acc, (key, value)| {
            acc.replace(&format!("${{{}}}", key), value)
        })
}

/// File name a chain is stored under
pub fn template_file_name(name: &str) -> String {
    let safe: String = name
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.') {
                c
            } else {
                '-'
            }
        })
        .collect();
    format!("{}.json", safe)
}

/// Chains by name. Owned by the caller, never shared globally.
#[derive(Debug, Clone, Default)]
pub struct TemplateRegistry {
    templates: BTreeMap<String, WorkflowChain>,
}

impl TemplateRegistry {
    /// Registry seeded with the built-in chains
    pub fn new() -> Self {
        let mut registry = Self::empty();
        for chain in builtin_chains() {
            registry.register(chain);
        }
        registry
    }

    pub fn empty() -> Self {
        Self::default()
    }

    /// Add or replace a chain, returning the one it replaced
    pub fn register(&mut self, chain: WorkflowChain) -> Option<WorkflowChain> {
        debug!("Registering chain {}", chain.name);
        self.templates.insert(chain.name.clone(), chain)
    }

    pub fn get(&self, name: &str) -> Option<&WorkflowChain> {
        self.templates.get(name)
    }

    /// Like [`get`](Self::get), failing with `ChainNotFound`
    pub fn require(&self, name: &str) -> Result<&WorkflowChain> {
        self.get(name)
            .ok_or_else(|| FlowError::ChainNotFound(name.to_string()))
    }

    pub fn list(&self) -> Vec<&WorkflowChain> {
        self.templates.values().collect()
    }

    pub fn remove(&mut self, name: &str) -> bool {
        self.templates.remove(name).is_some()
    }

    pub fn len(&self) -> usize {
        self.templates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.templates.is_empty()
    }

    /// Register every readable `*.json` chain in `dir`.
    ///
    /// A missing directory loads nothing. Unreadable files are skipped.
    pub async fn load_dir(&mut self, dir: &Path) -> Result<usize> {
        if !dir.exists() {
            return Ok(0);
        }

        let mut entries = tokio::fs::read_dir(dir).await?;
        let mut loaded = 0;

        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }

            if let Some(chain) = read_json_tolerant::<WorkflowChain>(&path).await {
                self.register(chain);
                loaded += 1;
            }
        }

        info!("Loaded {} templates from {}", loaded, dir.display());
        Ok(loaded)
    }

    /// Persist `chain` under `dir` and register it
    pub async fn save(&mut self, chain: WorkflowChain, dir: &Path) -> Result<PathBuf> {
        let path = dir.join(template_file_name(&chain.name));
        write_json_atomic(&path, &chain).await?;
        self.register(chain);
        Ok(path)
    }

    /// Copy of `name` with every placeholder resolved
    pub fn instantiate(
        &self,
        name: &str,
        variables: &BTreeMap<String, String>,
    ) -> Result<WorkflowChain> {
        let mut chain = self.require(name)?.clone();

        for step in chain
            .steps
            .iter_mut()
            .chain(chain.parallel_groups.iter_mut().flat_map(|g| g.steps.iter_mut()))
        {
            step.command = resolve_variables(&step.command, variables);
            step.args = step.args.as_deref().map(|a| resolve_variables(a, variables));
        }

        Ok(chain)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flowmine_core::WorkflowStep;
    use tempfile::tempdir;

    fn vars(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_resolve_variables() {
        let v = vars(&[("phase", "03")]);
        assert_eq!(
            resolve_variables("${phase} --skip-research", &v),
            "03 --skip-research"
        );
        assert_eq!(resolve_variables("${phase}-${phase}", &v), "03-03");
        assert_eq!(resolve_variables("${name}", &v), "${name}");
    }

    #[test]
    fn test_builtins_registered() {
        let registry = TemplateRegistry::new();
        assert!(registry.get("full-cycle").is_some());
        assert!(registry.get("quick-fix").is_some());
        assert_eq!(registry.len(), 4);
    }

    #[test]
    fn test_register_remove() {
        let mut registry = TemplateRegistry::empty();
        assert!(registry.is_empty());

        let chain = WorkflowChain::new("mine", "custom").with_step(WorkflowStep::new("progress"));
        assert!(registry.register(chain.clone()).is_none());
        assert!(registry.register(chain).is_some());

        assert!(registry.remove("mine"));
        assert!(!registry.remove("mine"));
    }

    #[test]
    fn test_instantiate() {
        let registry = TemplateRegistry::new();
        let chain = registry
            .instantiate("quick-fix", &vars(&[("phase", "07")]))
            .unwrap();
        assert_eq!(chain.steps[0].args.as_deref(), Some("07 --skip-research"));

        let err = registry.instantiate("missing", &vars(&[])).unwrap_err();
        assert!(matches!(err, FlowError::ChainNotFound(_)));
    }

    #[test]
    fn test_template_file_name() {
        assert_eq!(template_file_name("plan-phase-execute"), "plan-phase-execute.json");
        assert_eq!(template_file_name("a/b c"), "a-b-c.json");
    }

    #[tokio::test]
    async fn test_save_and_load_dir() {
        let dir = tempdir().unwrap();
        let mut registry = TemplateRegistry::empty();

        let chain = WorkflowChain::new("found", "discovered").with_step(WorkflowStep::new("a"));
        let path = registry.save(chain, dir.path()).await.unwrap();
        assert!(path.ends_with("found.json"));

        tokio::fs::write(dir.path().join("broken.json"), "{").await.unwrap();
        tokio::fs::write(dir.path().join("notes.txt"), "ignored").await.unwrap();

        let mut fresh = TemplateRegistry::empty();
        assert_eq!(fresh.load_dir(dir.path()).await.unwrap(), 1);
        assert!(fresh.get("found").is_some());

        assert_eq!(fresh.load_dir(&dir.path().join("missing")).await.unwrap(), 0);
    }
}
