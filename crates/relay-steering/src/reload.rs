//! Atomic rule set reload.
//!
//! The engine holds the compiled set behind an atomic pointer swap.
//! Validation fully succeeds before the swap; a failed load leaves the
//! previous set serving, and in-flight evaluations keep the snapshot they
//! captured.

use crate::engine::CompiledRuleSet;
use crate::rules::RuleSet;
use arc_swap::ArcSwap;
use notify::{RecommendedWatcher, RecursiveMode, Watcher};
use relay_core::RelayError;
use std::path::{Path, PathBuf};
use std::sync::mpsc;
use std::sync::Arc;
use tracing::{error, info, warn};

/// The steering engine: a hot-swappable compiled rule set.
pub struct SteeringEngine {
    current: ArcSwap<CompiledRuleSet>,
}

impl SteeringEngine {
    /// Create an engine serving a compiled set.
    #[must_use]
    pub fn new(set: CompiledRuleSet) -> Self {
        Self {
            current: ArcSwap::new(Arc::new(set)),
        }
    }

    /// Create an engine from YAML text.
    ///
    /// # Errors
    /// Returns `RuleSetInvalid` when the text does not parse or compile.
    pub fn from_yaml(yaml: &str) -> Result<Self, RelayError> {
        Ok(Self::new(compile_yaml(yaml)?))
    }

    /// Create an engine from a rule file.
    ///
    /// # Errors
    /// Returns `RuleSetInvalid` when the file is unreadable or invalid.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, RelayError> {
        Ok(Self::new(compile_path(path.as_ref())?))
    }

    /// Snapshot the current compiled set.
    ///
    /// Evaluations against the snapshot are unaffected by later reloads.
    #[must_use]
    pub fn snapshot(&self) -> Arc<CompiledRuleSet> {
        self.current.load_full()
    }

    /// Replace the rule set from YAML text.
    ///
    /// # Errors
    /// Returns `RuleSetInvalid` and leaves the previous set serving.
    pub fn reload_from_yaml(&self, yaml: &str) -> Result<(), RelayError> {
        let compiled = compile_yaml(yaml)?;
        self.swap(compiled);
        Ok(())
    }

    /// Replace the rule set from a rule file.
    ///
    /// # Errors
    /// Returns `RuleSetInvalid` and leaves the previous set serving.
    pub fn reload_from_path(&self, path: impl AsRef<Path>) -> Result<(), RelayError> {
        let compiled = compile_path(path.as_ref())?;
        self.swap(compiled);
        Ok(())
    }

    fn swap(&self, compiled: CompiledRuleSet) {
        info!(
            name = %compiled.name(),
            version = %compiled.version(),
            "Swapping in new rule set"
        );
        self.current.store(Arc::new(compiled));
    }
}

fn compile_yaml(yaml: &str) -> Result<CompiledRuleSet, RelayError> {
    let set = RuleSet::from_yaml(yaml).map_err(|e| RelayError::RuleSetInvalid {
        message: format!("rule set does not parse: {e}"),
    })?;
    CompiledRuleSet::compile(set)
}

fn compile_path(path: &Path) -> Result<CompiledRuleSet, RelayError> {
    let yaml = std::fs::read_to_string(path).map_err(|e| RelayError::RuleSetInvalid {
        message: format!("cannot read rule file '{}': {e}", path.display()),
    })?;
    compile_yaml(&yaml)
}

/// File watcher driving rule reloads.
///
/// Kept alive for as long as reloads should fire; dropping it stops the
/// watch. Reload failures are logged and the previous set keeps serving.
pub struct RuleFileWatcher {
    _watcher: RecommendedWatcher,
}

impl RuleFileWatcher {
    /// Watch a rule file and reload the engine on changes.
    ///
    /// # Errors
    /// Returns `Configuration` when the watch cannot be established.
    pub fn spawn(
        engine: Arc<SteeringEngine>,
        path: impl Into<PathBuf>,
    ) -> Result<Self, RelayError> {
        let path = path.into();
        let (tx, rx) = mpsc::channel::<notify::Result<notify::Event>>();

        let mut watcher = notify::recommended_watcher(move |event| {
            let _ = tx.send(event);
        })
        .map_err(|e| RelayError::configuration(format!("cannot create file watcher: {e}")))?;

        watcher
            .watch(&path, RecursiveMode::NonRecursive)
            .map_err(|e| {
                RelayError::configuration(format!(
                    "cannot watch rule file '{}': {e}",
                    path.display()
                ))
            })?;

        let watched = path.clone();
        std::thread::spawn(move || {
            for event in rx {
                match event {
                    Ok(event) if event.kind.is_modify() || event.kind.is_create() => {
                        match engine.reload_from_path(&watched) {
                            Ok(()) => info!(path = %watched.display(), "Rule set reloaded"),
                            Err(e) => warn!(
                                path = %watched.display(),
                                error = %e,
                                "Rule reload failed, previous set remains in service"
                            ),
                        }
                    }
                    Ok(_) => {}
                    Err(e) => error!(error = %e, "Rule file watch error"),
                }
            }
        });

        info!(path = %path.display(), "Watching rule file for changes");

        Ok(Self { _watcher: watcher })
    }
}
