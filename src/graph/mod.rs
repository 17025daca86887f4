//! Dependency graph between modules, app definitions and instance configs.
//!
//! Edges point from a dependent to what it depends on:
//!
//! ```text
//! Instance ──instantiates──▶ App ──imports──▶ Module ──imports──▶ Module
//!    │                        │
//!    └───────── deps ─────────┴──────▶ App | Module
//! ```
//!
//! Both directions are stored (`forward` and `reverse`) so that
//! [`DependencyGraph::dependents_of`] is a plain walk over reverse edges.
//!
//! # Invariants
//! - Forward and reverse mappings are always consistent
//! - Module imports are acyclic; an import set that would close a cycle is
//!   held back in `rejected_imports` and the module is flagged
//! - Every module named by an edge has a node (a `Missing` placeholder if no
//!   file backs it); placeholders disappear once nothing imports them
//! - Edges only point at apps that exist; an instance or app declaring a
//!   missing app is linked as soon as that app appears

mod error;
mod node;

#[cfg(test)]
mod tests;

use std::collections::{BTreeSet, VecDeque};
use std::path::Path;
use std::sync::Arc;

use rustc_hash::{FxHashMap, FxHashSet};

use crate::freshness::hash_bytes;
use crate::runtime::AppRuntime;

pub use error::{ConfigEntryError, GraphError};
pub use node::{
    AppDefinition, AppExtras, AppStatus, InstanceConfig, Loadability, Module, ModuleFlag, NodeId,
    Upserted,
};

type NodeSet = FxHashSet<NodeId>;
type EdgeMap = FxHashMap<NodeId, NodeSet>;

#[derive(Debug, Clone, Default)]
pub struct DependencyGraph {
    modules: FxHashMap<String, Module>,
    apps: FxHashMap<String, AppDefinition>,
    instances: FxHashMap<String, InstanceConfig>,
    /// Dependent → dependencies.
    forward: EdgeMap,
    /// Dependency → dependents.
    reverse: EdgeMap,
    /// Names seen during the configuration load in progress.
    config_load: Option<FxHashSet<String>>,
}

impl DependencyGraph {
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    // =========================================================================
    // Modules
    // =========================================================================

    /// Add or refresh a module from its file content.
    ///
    /// On error the module node is still updated and flagged, so its
    /// dependents become blocked. Same content as last time is a no-op.
    pub fn upsert_module(
        &mut self,
        name: &str,
        path: &Path,
        content: &str,
        runtime: &dyn AppRuntime,
    ) -> Result<Upserted, GraphError> {
        let hash = hash_bytes(content);
        if let Some(module) = self.modules.get(name)
            && module.hash == hash
            && module.path.as_deref() == Some(path)
        {
            return Ok(Upserted::Unchanged);
        }

        crate::debug!("graph"; "module {} content {}", name, hash);
        let analysis = runtime.analyze(content);

        let module = self
            .modules
            .entry(name.to_string())
            .or_insert_with(|| Module::placeholder(name));
        module.path = Some(path.to_path_buf());
        module.hash = hash;

        match analysis {
            Ok(analysis) => self.apply_module_imports(name, analysis.imports),
            Err(reason) => {
                // Previous edges stay: the stale node still tells us who depends on it.
                module.rejected_imports = None;
                module.flag = Some(ModuleFlag::ParseError(reason.clone()));
                Err(GraphError::ParseError {
                    path: path.to_path_buf(),
                    reason,
                })
            }
        }
    }

    /// Remove a module whose file disappeared.
    ///
    /// A module that is still imported stays as a `Missing` node without
    /// imports of its own. Returns `false` if the module was unknown.
    pub fn remove_module(&mut self, name: &str) -> bool {
        let id = NodeId::Module(name.to_string());
        if !self.modules.contains_key(name) {
            return false;
        }
        if !self.has_dependents(&id) {
            return self.remove_node(&id);
        }

        self.set_edges(&id, std::iter::empty());
        if let Some(module) = self.modules.get_mut(name) {
            *module = Module::placeholder(name);
        }
        true
    }

    /// Retry import sets that were held back because they closed a cycle.
    ///
    /// Returns the modules whose imports were applied.
    pub fn retry_rejected_imports(&mut self) -> Vec<String> {
        let mut settled = Vec::new();
        loop {
            let mut pending: Vec<(String, BTreeSet<String>)> = self
                .modules
                .values()
                .filter_map(|m| Some((m.name.clone(), m.rejected_imports.clone()?)))
                .collect();
            pending.sort();

            let before = settled.len();
            for (name, imports) in pending {
                if self.find_cycle(&name, &imports).is_none()
                    && self.apply_module_imports(&name, imports).is_ok()
                {
                    crate::debug!("graph"; "module {} no longer closes a cycle", name);
                    settled.push(name);
                }
            }
            if settled.len() == before {
                return settled;
            }
        }
    }

    fn apply_module_imports(
        &mut self,
        name: &str,
        imports: BTreeSet<String>,
    ) -> Result<Upserted, GraphError> {
        if let Some(chain) = self.find_cycle(name, &imports) {
            if let Some(module) = self.modules.get_mut(name) {
                module.rejected_imports = Some(imports);
                module.flag = Some(ModuleFlag::ImportCycle(chain.clone()));
            }
            return Err(GraphError::ImportCycle {
                module: name.to_string(),
                chain,
            });
        }

        for import in &imports {
            self.ensure_module(import);
        }
        let targets: Vec<NodeId> = imports.iter().cloned().map(NodeId::Module).collect();
        self.set_edges(&NodeId::Module(name.to_string()), targets);

        if let Some(module) = self.modules.get_mut(name) {
            module.imports = imports;
            module.rejected_imports = None;
            module.flag = None;
        }
        Ok(Upserted::Updated)
    }

    /// Import chain `name -> .. -> name` that `imports` would create, if any.
    fn find_cycle(&self, name: &str, imports: &BTreeSet<String>) -> Option<Vec<String>> {
        let target = NodeId::Module(name.to_string());
        let mut parent: FxHashMap<NodeId, NodeId> = FxHashMap::default();
        let mut queue: VecDeque<NodeId> = VecDeque::new();

        for import in imports {
            let start = NodeId::Module(import.clone());
            if start == target {
                return Some(vec![name.to_string(), name.to_string()]);
            }
            if !parent.contains_key(&start) {
                parent.insert(start.clone(), target.clone());
                queue.push_back(start);
            }
        }

        while let Some(current) = queue.pop_front() {
            for next in self.forward.get(&current).into_iter().flatten() {
                if parent.contains_key(next) {
                    continue;
                }
                parent.insert(next.clone(), current.clone());
                if *next == target {
                    let mut path = Vec::new();
                    let mut at = current.clone();
                    while at != target {
                        path.push(at.name().to_string());
                        at = parent[&at].clone();
                    }
                    path.reverse();

                    let mut chain = vec![name.to_string()];
                    chain.extend(path);
                    chain.push(name.to_string());
                    return Some(chain);
                }
                queue.push_back(next.clone());
            }
        }
        None
    }

    fn ensure_module(&mut self, name: &str) {
        if !self.modules.contains_key(name) {
            self.modules
                .insert(name.to_string(), Module::placeholder(name));
        }
    }

    // =========================================================================
    // App definitions
    // =========================================================================

    /// Add or refresh an app definition from its source and extras.
    ///
    /// A parse error keeps the previous imports; a missing entry point stores
    /// the new imports. Either way the app is marked invalid and the error is
    /// returned after the graph was updated.
    pub fn upsert_app_definition(
        &mut self,
        name: &str,
        path: &Path,
        content: &str,
        extras: AppExtras,
        runtime: &dyn AppRuntime,
    ) -> Result<Upserted, GraphError> {
        let hash = hash_bytes(content);
        if let Some(app) = self.apps.get(name)
            && app.hash == hash
            && app.path == path
            && app.extras == extras
        {
            return Ok(Upserted::Unchanged);
        }

        crate::debug!("graph"; "app {} content {}", name, hash);
        let (imports, status, error) = match runtime.analyze(content) {
            Ok(analysis) => match analysis.entry_point_problem() {
                None => (analysis.imports, AppStatus::Valid, None),
                Some(reason) => (
                    analysis.imports,
                    AppStatus::Invalid(reason.clone()),
                    Some(GraphError::InvalidAppDefinition {
                        app: name.to_string(),
                        reason,
                    }),
                ),
            },
            Err(reason) => (
                self.apps
                    .get(name)
                    .map(|app| app.imports.clone())
                    .unwrap_or_default(),
                AppStatus::Invalid(format!("parse error: {reason}")),
                Some(GraphError::ParseError {
                    path: path.to_path_buf(),
                    reason,
                }),
            ),
        };

        self.insert_app(AppDefinition {
            name: name.to_string(),
            path: path.to_path_buf(),
            hash,
            source: Arc::from(content),
            imports,
            extras,
            status,
        });

        match error {
            Some(err) => Err(err),
            None => Ok(Upserted::Updated),
        }
    }

    fn insert_app(&mut self, app: AppDefinition) {
        let id = NodeId::App(app.name.clone());
        self.apps.insert(app.name.clone(), app);
        self.relink(&id);

        // Link dependents that were waiting for this app
        let waiting: Vec<NodeId> = self
            .instances
            .values()
            .filter(|config| config.app == id.name() || config.deps.contains(&id))
            .map(|config| NodeId::Instance(config.name.clone()))
            .chain(
                self.apps
                    .values()
                    .filter(|other| other.extras.deps.contains(&id))
                    .map(|other| NodeId::App(other.name.clone())),
            )
            .collect();
        for dependent in waiting {
            self.relink(&dependent);
        }
    }

    /// Recompute the outgoing edges of an app or instance from its record.
    fn relink(&mut self, id: &NodeId) {
        let declared: Vec<NodeId> = match id {
            NodeId::App(name) => match self.apps.get(name) {
                Some(app) => app.dependencies().collect(),
                None => Vec::new(),
            },
            NodeId::Instance(name) => match self.instances.get(name) {
                Some(config) => std::iter::once(NodeId::App(config.app.clone()))
                    .chain(config.deps.iter().cloned())
                    .collect(),
                None => Vec::new(),
            },
            NodeId::Module(_) => return,
        };

        let mut targets = Vec::with_capacity(declared.len());
        for target in declared {
            match &target {
                NodeId::Module(module) => self.ensure_module(module),
                NodeId::App(app) if !self.apps.contains_key(app) => continue,
                _ => {}
            }
            targets.push(target);
        }
        self.set_edges(id, targets);
    }

    // =========================================================================
    // Instance configs
    // =========================================================================

    /// Start loading a full instance configuration set.
    ///
    /// Names are checked for uniqueness until [`Self::finish_config_load`].
    pub fn begin_config_load(&mut self) {
        self.config_load = Some(FxHashSet::default());
    }

    /// Add or refresh one instance configuration.
    ///
    /// `DuplicateInstanceName` leaves the graph untouched (the first entry
    /// wins). `UnknownApp` is returned after the record was stored, so the
    /// instance starts once the app appears.
    pub fn upsert_instance_config(
        &mut self,
        name: &str,
        app: &str,
        payload: toml::Table,
        deps: BTreeSet<NodeId>,
        index: usize,
    ) -> Result<Upserted, ConfigEntryError> {
        if let Some(seen) = &mut self.config_load
            && !seen.insert(name.to_string())
        {
            return Err(ConfigEntryError::DuplicateInstanceName {
                name: name.to_string(),
                index,
            });
        }

        if let Some(existing) = self.instances.get_mut(name)
            && existing.app == app
            && existing.payload == payload
            && existing.deps == deps
        {
            existing.index = index;
            return Ok(Upserted::Unchanged);
        }

        self.instances.insert(
            name.to_string(),
            InstanceConfig {
                name: name.to_string(),
                app: app.to_string(),
                payload,
                deps,
                index,
            },
        );
        self.relink(&NodeId::Instance(name.to_string()));

        if self.apps.contains_key(app) {
            Ok(Upserted::Updated)
        } else {
            Err(ConfigEntryError::UnknownApp {
                name: name.to_string(),
                app: app.to_string(),
            })
        }
    }

    /// Finish a configuration load, dropping instances it did not mention.
    ///
    /// Returns the removed instance names, sorted.
    pub fn finish_config_load(&mut self) -> Vec<String> {
        let Some(seen) = self.config_load.take() else {
            return Vec::new();
        };
        let mut removed: Vec<String> = self
            .instances
            .keys()
            .filter(|name| !seen.contains(*name))
            .cloned()
            .collect();
        removed.sort();
        for name in &removed {
            self.remove_node(&NodeId::Instance(name.clone()));
        }
        removed
    }

    // =========================================================================
    // Generic node operations
    // =========================================================================

    /// Remove a node and every edge touching it. Dependents are kept.
    pub fn remove_node(&mut self, id: &NodeId) -> bool {
        let removed = match id {
            NodeId::Module(name) => self.modules.remove(name).is_some(),
            NodeId::App(name) => self.apps.remove(name).is_some(),
            NodeId::Instance(name) => self.instances.remove(name).is_some(),
        };

        self.set_edges(id, std::iter::empty());
        if let Some(dependents) = self.reverse.remove(id) {
            for dependent in dependents {
                if let Some(deps) = self.forward.get_mut(&dependent) {
                    deps.remove(id);
                    if deps.is_empty() {
                        self.forward.remove(&dependent);
                    }
                }
            }
        }
        removed
    }

    /// Transitive dependents of `id`, excluding `id` itself.
    pub fn dependents_of(&self, id: &NodeId) -> FxHashSet<NodeId> {
        let mut seen = FxHashSet::default();
        let mut queue: VecDeque<&NodeId> = VecDeque::from([id]);
        while let Some(current) = queue.pop_front() {
            for dependent in self.reverse.get(current).into_iter().flatten() {
                if dependent != id && seen.insert(dependent.clone()) {
                    queue.push_back(dependent);
                }
            }
        }
        seen
    }

    /// Direct dependencies of `id`.
    pub fn dependencies_of(&self, id: &NodeId) -> Vec<NodeId> {
        let mut deps: Vec<NodeId> = self.forward.get(id).into_iter().flatten().cloned().collect();
        deps.sort();
        deps
    }

    fn has_dependents(&self, id: &NodeId) -> bool {
        self.reverse.get(id).is_some_and(|set| !set.is_empty())
    }

    /// Replace the outgoing edges of `from`.
    fn set_edges(&mut self, from: &NodeId, targets: impl IntoIterator<Item = NodeId>) {
        let targets: NodeSet = targets.into_iter().filter(|t| t != from).collect();

        let old = self.forward.remove(from).unwrap_or_default();
        for dropped in old.difference(&targets) {
            if let Some(dependents) = self.reverse.get_mut(dropped) {
                dependents.remove(from);
                if dependents.is_empty() {
                    self.reverse.remove(dropped);
                }
            }
            self.prune_placeholder(dropped);
        }

        for target in &targets {
            self.reverse
                .entry(target.clone())
                .or_default()
                .insert(from.clone());
        }
        if !targets.is_empty() {
            self.forward.insert(from.clone(), targets);
        }
    }

    /// Drop a `Missing` module nobody imports any more.
    fn prune_placeholder(&mut self, id: &NodeId) {
        if let NodeId::Module(name) = id
            && self.modules.get(name).is_some_and(Module::is_missing)
            && !self.has_dependents(id)
        {
            crate::debug!("graph"; "dropping unreferenced module {}", name);
            self.modules.remove(name);
        }
    }

    // =========================================================================
    // Queries
    // =========================================================================

    /// Whether `app` can be instantiated: it must exist, be valid, and every
    /// module it transitively depends on must be loadable.
    pub fn loadability(&self, app: &str) -> Loadability {
        let Some(definition) = self.apps.get(app) else {
            return Loadability::Blocked(format!("unknown app `{app}`"));
        };
        if let AppStatus::Invalid(reason) = &definition.status {
            return Loadability::Blocked(reason.clone());
        }
        self.module_loadability(&NodeId::App(app.to_string()))
    }

    /// Loadability of the app an instance references, then of the modules
    /// the instance declares itself.
    pub fn instance_loadability(&self, instance: &str) -> Loadability {
        let Some(config) = self.instances.get(instance) else {
            return Loadability::Blocked(format!("unknown instance `{instance}`"));
        };
        match self.loadability(&config.app) {
            Loadability::Ready => self.module_loadability(&NodeId::Instance(config.name.clone())),
            blocked => blocked,
        }
    }

    /// First flagged module reachable from `from` through module edges.
    /// App dependencies only trigger restarts and are not followed.
    fn module_loadability(&self, from: &NodeId) -> Loadability {
        let mut modules = BTreeSet::new();
        let mut queue: VecDeque<&NodeId> = self.forward.get(from).into_iter().flatten().collect();
        while let Some(current) = queue.pop_front() {
            if let NodeId::Module(name) = current
                && modules.insert(name.as_str())
            {
                queue.extend(self.forward.get(current).into_iter().flatten());
            }
        }

        modules
            .into_iter()
            .find_map(|name| {
                let flag = self.modules.get(name)?.flag.as_ref()?;
                Some(Loadability::Blocked(format!("module `{name}`: {flag}")))
            })
            .unwrap_or(Loadability::Ready)
    }

    /// Instance configs in declaration order.
    pub fn ordered_instances(&self) -> Vec<&InstanceConfig> {
        let mut configs: Vec<&InstanceConfig> = self.instances.values().collect();
        configs.sort_by(|a, b| a.index.cmp(&b.index).then_with(|| a.name.cmp(&b.name)));
        configs
    }

    pub fn module(&self, name: &str) -> Option<&Module> {
        self.modules.get(name)
    }

    pub fn app(&self, name: &str) -> Option<&AppDefinition> {
        self.apps.get(name)
    }

    pub fn instance(&self, name: &str) -> Option<&InstanceConfig> {
        self.instances.get(name)
    }

    pub fn modules(&self) -> impl Iterator<Item = &Module> {
        self.modules.values()
    }

    pub fn apps(&self) -> impl Iterator<Item = &AppDefinition> {
        self.apps.values()
    }

    /// Names of the apps whose source lives directly in `dir`.
    pub fn apps_in_dir(&self, dir: &Path) -> Vec<String> {
        let mut names: Vec<String> = self
            .apps
            .values()
            .filter(|app| app.path.parent() == Some(dir))
            .map(|app| app.name.clone())
            .collect();
        names.sort();
        names
    }

    /// Whether any InstanceConfig is known.
    pub fn has_instances(&self) -> bool {
        !self.instances.is_empty()
    }
}
