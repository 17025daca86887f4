//! Change resolver: from a batch of file changes to a reload plan.
//!
//! Resolution never touches the live graph. Mutations are staged on a clone,
//! and the affected instances are the dependents of every changed node in
//! both the current and the staged graph (a removed edge matters as much as
//! an added one).

mod plan;


use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use rustc_hash::{FxHashMap, FxHashSet};

use crate::graph::{
    AppExtras, ConfigEntryError, DependencyGraph, GraphError, Loadability, NodeId, Upserted,
};
use crate::runtime::AppRuntime;
use crate::source::{self, Layout, SourceKind, manifest};
use crate::watch::{ChangeEvent, ChangeKind};

pub use plan::{Blocked, ReloadPlan, StartSpec};

pub struct Resolver<'a> {
    layout: &'a Layout,
    runtime: &'a dyn AppRuntime,
}

/// Mutations staged during one resolution.
struct Staging<'a> {
    graph: DependencyGraph,
    runtime: &'a dyn AppRuntime,
    changed: Vec<NodeId>,
    parse_errors: Vec<String>,
    config_errors: Vec<String>,
    /// Manifest extras loaded in this resolution, by directory.
    extras: FxHashMap<PathBuf, AppExtras>,
}

/// Paths of one batch grouped by what they map to.
#[derive(Default)]
struct Grouped {
    modules: Vec<(String, PathBuf, ChangeKind)>,
    apps: Vec<(String, PathBuf, ChangeKind)>,
    manifest_dirs: BTreeSet<PathBuf>,
    instances: bool,
}

impl<'a> Resolver<'a> {
    pub fn new(layout: &'a Layout, runtime: &'a dyn AppRuntime) -> Self {
        Self { layout, runtime }
    }

    /// Resolve one debounced batch against `graph`.
    ///
    /// `force` names instances to treat as affected regardless of changes.
    pub fn resolve(
        &self,
        graph: &DependencyGraph,
        batch: &[ChangeEvent],
        force: &[String],
    ) -> ReloadPlan {
        let grouped = self.group(batch);
        let mut staging = Staging {
            graph: graph.clone(),
            runtime: self.runtime,
            changed: Vec::new(),
            parse_errors: Vec::new(),
            config_errors: Vec::new(),
            extras: FxHashMap::default(),
        };

        // Modules first so app loadability sees their final state
        for (name, path, kind) in &grouped.modules {
            staging.apply_module(name, path, *kind);
        }
        for name in staging.graph.retry_rejected_imports() {
            staging.changed.push(NodeId::Module(name));
        }

        let mut handled = FxHashSet::default();
        for (name, path, kind) in &grouped.apps {
            staging.apply_app(name, path, *kind);
            handled.insert(name.clone());
        }
        for dir in &grouped.manifest_dirs {
            for name in staging.graph.apps_in_dir(dir) {
                if handled.insert(name.clone())
                    && let Some(path) = staging.graph.app(&name).map(|app| app.path.clone())
                {
                    staging.apply_app(&name, &path, ChangeKind::Modified);
                }
            }
        }

        if grouped.instances {
            staging.apply_instances(&self.layout.instances_file);
        }

        build_plan(graph, staging, force)
    }

    /// Resolve a full rescan of every source location.
    ///
    /// Files found on disk are treated as modified, known files no longer on
    /// disk as removed. Unchanged content is still a no-op.
    pub fn rescan(&self, graph: &DependencyGraph, force: &[String]) -> ReloadPlan {
        let found = source::discover(self.layout);
        let mut batch: Vec<ChangeEvent> = Vec::new();

        let on_disk: FxHashSet<&Path> = found
            .modules
            .iter()
            .chain(&found.apps)
            .map(|(_, path)| path.as_path())
            .collect();

        for module in graph.modules() {
            if let Some(path) = &module.path
                && !on_disk.contains(path.as_path())
            {
                batch.push(ChangeEvent::new(path, ChangeKind::Removed));
            }
        }
        for app in graph.apps() {
            if !on_disk.contains(app.path.as_path()) {
                batch.push(ChangeEvent::new(&app.path, ChangeKind::Removed));
            }
        }
        for (_, path) in found.modules.iter().chain(&found.apps) {
            batch.push(ChangeEvent::new(path, ChangeKind::Modified));
        }
        batch.push(ChangeEvent::new(
            &self.layout.instances_file,
            ChangeKind::Modified,
        ));

        crate::debug!("resolve"; "rescan: {} paths", batch.len());
        self.resolve(graph, &batch, force)
    }

    fn group(&self, batch: &[ChangeEvent]) -> Grouped {
        let mut grouped = Grouped::default();
        for event in batch {
            match self.layout.classify(&event.path) {
                SourceKind::Module(name) => {
                    grouped.modules.push((name, event.path.clone(), event.kind));
                }
                SourceKind::App(name) => {
                    grouped.apps.push((name, event.path.clone(), event.kind));
                }
                SourceKind::Manifest(dir) => {
                    grouped.manifest_dirs.insert(dir);
                }
                SourceKind::Instances => grouped.instances = true,
                SourceKind::Ignored => {
                    crate::debug!("resolve"; "ignoring {}", event.path.display());
                }
            }
        }
        grouped
    }
}

impl Staging<'_> {
    fn apply_module(&mut self, name: &str, path: &Path, kind: ChangeKind) {
        let id = NodeId::Module(name.to_string());
        let content = match kind {
            ChangeKind::Removed => None,
            _ => match source::read_source(path) {
                Ok(content) => content,
                Err(err) => {
                    self.parse_errors.push(err.to_string());
                    return;
                }
            },
        };

        let Some(content) = content else {
            if self.graph.remove_module(name) {
                crate::debug!("resolve"; "module {} removed", name);
                self.changed.push(id);
            }
            return;
        };

        let outcome = self
            .graph
            .upsert_module(name, path, &content, self.runtime);
        self.record_upsert(id, outcome);
    }

    fn apply_app(&mut self, name: &str, path: &Path, kind: ChangeKind) {
        let id = NodeId::App(name.to_string());
        let content = match kind {
            ChangeKind::Removed => None,
            _ => match source::read_source(path) {
                Ok(content) => content,
                Err(err) => {
                    self.parse_errors.push(err.to_string());
                    return;
                }
            },
        };

        let Some(content) = content else {
            if self.graph.remove_node(&id) {
                crate::debug!("resolve"; "app {} removed", name);
                self.changed.push(id);
            }
            return;
        };

        let extras = path.parent().map(|dir| self.extras_for(dir)).unwrap_or_default();
        let outcome = self
            .graph
            .upsert_app_definition(name, path, &content, extras, self.runtime);
        self.record_upsert(id, outcome);
    }

    fn extras_for(&mut self, dir: &Path) -> AppExtras {
        if let Some(extras) = self.extras.get(dir) {
            return extras.clone();
        }
        let extras = manifest::load_extras(dir).unwrap_or_else(|err| {
            self.config_errors.push(err.to_string());
            AppExtras::default()
        });
        self.extras.insert(dir.to_path_buf(), extras.clone());
        extras
    }

    fn record_upsert(&mut self, id: NodeId, outcome: Result<Upserted, GraphError>) {
        match outcome {
            Ok(Upserted::Unchanged) => {}
            Ok(Upserted::Updated) => {
                crate::debug!("resolve"; "{} updated", id);
                self.changed.push(id);
            }
            Err(err) => {
                self.parse_errors.push(err.to_string());
                self.changed.push(id);
            }
        }
    }

    fn apply_instances(&mut self, path: &Path) {
        let set = match source::instances::load(path) {
            Ok(set) => set,
            Err(err) => {
                // Keep the previous configuration until the file parses again
                self.config_errors.push(err.to_string());
                return;
            }
        };

        for key in &set.ignored {
            crate::log!("config"; "ignoring unknown key `{}` in {}", key, path.display());
        }
        self.config_errors
            .extend(set.errors.iter().map(ToString::to_string));

        self.graph.begin_config_load();
        for entry in set.entries {
            let id = NodeId::Instance(entry.name.clone());
            match self
                .graph
                .upsert_instance_config(
                    &entry.name,
                    &entry.app,
                    entry.payload,
                    entry.deps,
                    entry.index,
                )
            {
                Ok(Upserted::Unchanged) => {}
                Ok(Upserted::Updated) => self.changed.push(id),
                Err(err @ ConfigEntryError::UnknownApp { .. }) => {
                    self.config_errors.push(err.to_string());
                    self.changed.push(id);
                }
                Err(err) => self.config_errors.push(err.to_string()),
            }
        }
        for name in self.graph.finish_config_load() {
            crate::debug!("resolve"; "instance {} removed from configuration", name);
            self.changed.push(NodeId::Instance(name));
        }
    }
}

fn build_plan(current: &DependencyGraph, staging: Staging<'_>, force: &[String]) -> ReloadPlan {
    let Staging {
        graph: next,
        changed,
        parse_errors,
        config_errors,
        ..
    } = staging;

    let mut affected: BTreeSet<String> = force.iter().cloned().collect();
    for id in &changed {
        if let NodeId::Instance(name) = id {
            affected.insert(name.clone());
        }
        for dependent in current.dependents_of(id).into_iter().chain(next.dependents_of(id)) {
            if let NodeId::Instance(name) = dependent {
                affected.insert(name);
            }
        }
    }

    let mut start = Vec::new();
    let mut blocked = Vec::new();
    for config in next.ordered_instances() {
        if !affected.contains(&config.name) {
            continue;
        }
        match next.instance_loadability(&config.name) {
            Loadability::Ready => {
                let Some(app) = next.app(&config.app) else {
                    continue;
                };
                start.push(StartSpec {
                    instance: config.name.clone(),
                    app: app.name.clone(),
                    path: app.path.clone(),
                    source: app.source.clone(),
                    payload: app.merged_payload(&config.payload),
                });
            }
            Loadability::Blocked(reason) => blocked.push(Blocked {
                instance: config.name.clone(),
                reason,
            }),
        }
    }

    ReloadPlan {
        changed,
        stop: affected.into_iter().collect(),
        next_graph: next,
        start,
        blocked,
        parse_errors,
        config_errors,
    }
}
