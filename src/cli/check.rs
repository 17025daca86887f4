//! `bolted check`: one full analysis, nothing is started.

use std::path::PathBuf;

use anyhow::Result;
use serde::Serialize;

use crate::config::BoltedConfig;
use crate::graph::{DependencyGraph, Loadability, NodeId};
use crate::log;
use crate::resolver::{Blocked, Resolver};
use crate::runtime::RhaiRuntime;
use crate::utils::count::plural_count;

#[derive(Debug, Serialize)]
pub struct CheckReport {
    pub modules: Vec<ModuleEntry>,
    pub apps: Vec<AppEntry>,
    /// Instances that would start, in start order.
    pub start_order: Vec<String>,
    pub blocked: Vec<Blocked>,
    pub parse_errors: Vec<String>,
    pub config_errors: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct ModuleEntry {
    pub name: String,
    pub path: Option<PathBuf>,
    pub imports: Vec<String>,
    pub problem: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct AppEntry {
    pub name: String,
    pub path: PathBuf,
    pub dependencies: Vec<String>,
    pub instances: Vec<String>,
    pub problem: Option<String>,
}

impl CheckReport {
    /// Scan every source location as the initial load would.
    pub fn analyze(config: &BoltedConfig) -> Self {
        let layout = config.layout();
        let runtime = RhaiRuntime::new(&layout.modules_root, config.reload.max_operations);
        let plan = Resolver::new(&layout, &runtime).rescan(&DependencyGraph::new(), &[]);
        let graph = &plan.next_graph;

        let mut modules: Vec<ModuleEntry> = graph
            .modules()
            .map(|module| ModuleEntry {
                name: module.name.clone(),
                path: module.path.clone(),
                imports: module.imports.iter().cloned().collect(),
                problem: module.flag.as_ref().map(ToString::to_string),
            })
            .collect();
        modules.sort_by(|a, b| a.name.cmp(&b.name));

        let mut apps: Vec<AppEntry> = graph
            .apps()
            .map(|app| AppEntry {
                name: app.name.clone(),
                path: app.path.clone(),
                dependencies: graph
                    .dependencies_of(&NodeId::App(app.name.clone()))
                    .iter()
                    .map(|id| id.name().to_string())
                    .collect(),
                instances: graph
                    .ordered_instances()
                    .into_iter()
                    .filter(|config| config.app == app.name)
                    .map(|config| config.name.clone())
                    .collect(),
                problem: match graph.loadability(&app.name) {
                    Loadability::Ready => None,
                    Loadability::Blocked(reason) => Some(reason),
                },
            })
            .collect();
        apps.sort_by(|a, b| a.name.cmp(&b.name));

        Self {
            modules,
            apps,
            start_order: plan.start.iter().map(|s| s.instance.clone()).collect(),
            blocked: plan.blocked,
            parse_errors: plan.parse_errors,
            config_errors: plan.config_errors,
        }
    }

    pub fn has_errors(&self) -> bool {
        !self.parse_errors.is_empty() || !self.config_errors.is_empty()
    }

    fn print(&self) {
        log!(
            "check";
            "{}, {}, {}",
            plural_count(self.modules.len(), "module"),
            plural_count(self.apps.len(), "app"),
            plural_count(self.start_order.len() + self.blocked.len(), "instance")
        );
        for app in &self.apps {
            let instances = if app.instances.is_empty() {
                "no instances".to_string()
            } else {
                app.instances.join(", ")
            };
            match &app.problem {
                None => log!("check"; "app {}: {}", app.name, instances),
                Some(problem) => log!("check"; "app {}: {} ({})", app.name, instances, problem),
            }
        }
        if !self.start_order.is_empty() {
            log!("check"; "start order: {}", self.start_order.join(", "));
        }
        for blocked in &self.blocked {
            log!("warning"; "`{}` blocked: {}", blocked.instance, blocked.reason);
        }
        for err in self.parse_errors.iter().chain(&self.config_errors) {
            log!("error"; "{}", err);
        }
    }
}

/// Run the check command. Returns `false` when errors were found.
pub fn run_check(config: &BoltedConfig, json: bool, pretty: bool) -> Result<bool> {
    let report = CheckReport::analyze(config);

    if json {
        let formatted = if pretty {
            serde_json::to_string_pretty(&report)?
        } else {
            serde_json::to_string(&report)?
        };
        println!("{}", formatted);
    } else {
        report.print();
    }

    Ok(!report.has_errors())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PathsConfig;
    use crate::utils::path::normalize_path;
    use std::fs;
    use tempfile::TempDir;

    fn project(instances: &str) -> (TempDir, BoltedConfig) {
        let temp = TempDir::new().unwrap();
        let root = normalize_path(temp.path());
        fs::create_dir_all(root.join("modules")).unwrap();
        fs::create_dir_all(root.join("apps")).unwrap();
        fs::write(root.join("modules/util.rhai"), "fn twice(x) { x * 2 }").unwrap();
        fs::write(
            root.join("apps/lights.rhai"),
            "import \"util\" as util;\nfn init(config) {}\nfn startup() {}\nfn shutdown() {}",
        )
        .unwrap();
        fs::write(root.join("apps/broken.rhai"), "fn init(config) {}").unwrap();
        fs::write(root.join("apps.toml"), instances).unwrap();

        let mut paths = PathsConfig::default();
        paths.resolve(&root);
        let config = BoltedConfig {
            root,
            paths,
            ..BoltedConfig::default()
        };
        (temp, config)
    }

    #[test]
    fn test_check_reports_plan() {
        let (_temp, config) = project(
            "[[instance]]\nname = \"a\"\napp = \"lights\"\n\n[[instance]]\nname = \"b\"\napp = \"broken\"\n",
        );
        let report = CheckReport::analyze(&config);

        assert_eq!(report.start_order, vec!["a"]);
        assert_eq!(report.blocked[0].instance, "b");
        // The invalid app is a per-file error
        assert!(report.has_errors());

        let lights = report.apps.iter().find(|a| a.name == "lights").unwrap();
        assert_eq!(lights.dependencies, vec!["util"]);
        assert_eq!(lights.instances, vec!["a"]);
        assert!(lights.problem.is_none());

        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["modules"][0]["name"], "util");
    }

    #[test]
    fn test_check_clean_project() {
        let (temp, config) = project("[[instance]]\nname = \"a\"\napp = \"lights\"\n");
        fs::remove_file(temp.path().join("apps/broken.rhai")).unwrap();

        assert!(run_check(&config, true, false).unwrap());
    }
}
