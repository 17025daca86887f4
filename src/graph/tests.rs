use std::path::{Path, PathBuf};

use super::*;
use crate::runtime::{AppInstance, ConstructRequest, SourceAnalysis};

/// Line-based stand-in for a script engine:
/// `import name`, `fn name arity`, and `!` anywhere for a parse error.
struct LineRuntime;

impl AppRuntime for LineRuntime {
    fn analyze(&self, source: &str) -> Result<SourceAnalysis, String> {
        if source.contains('!') {
            return Err("unexpected `!`".into());
        }
        let mut analysis = SourceAnalysis::default();
        for line in source.lines() {
            let words: Vec<&str> = line.split_whitespace().collect();
            match words.as_slice() {
                ["import", name] => {
                    analysis.imports.insert(name.to_string());
                }
                ["fn", name, arity] => {
                    analysis
                        .functions
                        .insert((name.to_string(), arity.parse().unwrap()));
                }
                _ => {}
            }
        }
        Ok(analysis)
    }

    fn construct(&self, _: ConstructRequest) -> Result<Box<dyn AppInstance>, String> {
        Err("not constructible".into())
    }
}

const ENTRY: &str = "fn init 1\nfn startup 0\nfn shutdown 0\n";

fn path(name: &str) -> PathBuf {
    PathBuf::from(format!("/project/{name}.rhai"))
}

fn module(graph: &mut DependencyGraph, name: &str, content: &str) -> Result<Upserted, GraphError> {
    graph.upsert_module(name, &path(name), content, &LineRuntime)
}

fn app(graph: &mut DependencyGraph, name: &str, imports: &[&str]) -> Result<Upserted, GraphError> {
    let mut content: String = imports.iter().map(|i| format!("import {i}\n")).collect();
    content.push_str(ENTRY);
    graph.upsert_app_definition(name, &path(name), &content, AppExtras::default(), &LineRuntime)
}

fn instance(graph: &mut DependencyGraph, name: &str, app: &str, index: usize) -> Result<Upserted, ConfigEntryError> {
    graph.upsert_instance_config(name, app, toml::Table::new(), BTreeSet::new(), index)
}

fn sorted(set: FxHashSet<NodeId>) -> Vec<NodeId> {
    let mut v: Vec<_> = set.into_iter().collect();
    v.sort();
    v
}

/// util <- lights <- my_lights, plus an unrelated heater app.
fn home() -> DependencyGraph {
    let mut graph = DependencyGraph::new();
    module(&mut graph, "util", "").unwrap();
    app(&mut graph, "lights", &["util"]).unwrap();
    app(&mut graph, "heater", &[]).unwrap();
    graph.begin_config_load();
    instance(&mut graph, "my_lights", "lights", 0).unwrap();
    instance(&mut graph, "heater_1", "heater", 1).unwrap();
    assert!(graph.finish_config_load().is_empty());
    graph
}

#[test]
fn test_dependents_transitive() {
    let graph = home();
    assert_eq!(
        sorted(graph.dependents_of(&NodeId::Module("util".into()))),
        vec![
            NodeId::App("lights".into()),
            NodeId::Instance("my_lights".into())
        ]
    );
    assert!(graph.dependents_of(&NodeId::Instance("heater_1".into())).is_empty());
}

#[test]
fn test_unchanged_module_is_noop() {
    let mut graph = home();
    assert_eq!(module(&mut graph, "util", ""), Ok(Upserted::Unchanged));
    assert_eq!(module(&mut graph, "util", "fn helper 0"), Ok(Upserted::Updated));
}

#[test]
fn test_forward_reverse_consistent() {
    let mut graph = home();
    app(&mut graph, "lights", &[]).unwrap();

    // util is no longer imported but still backed by a file
    assert!(graph.dependents_of(&NodeId::Module("util".into())).is_empty());
    assert!(graph.module("util").is_some());
    assert!(graph.dependencies_of(&NodeId::App("lights".into())).is_empty());
}

#[test]
fn test_parse_error_keeps_stale_node() {
    let mut graph = home();
    module(&mut graph, "util", "import base").unwrap();

    let err = module(&mut graph, "util", "!").unwrap_err();
    assert!(matches!(err, GraphError::ParseError { .. }));

    let util = graph.module("util").unwrap();
    assert!(matches!(util.flag, Some(ModuleFlag::ParseError(_))));
    assert!(util.imports.contains("base"));
    assert!(!graph.loadability("lights").is_ready());

    // Same broken content again reports nothing new
    assert_eq!(module(&mut graph, "util", "!"), Ok(Upserted::Unchanged));

    module(&mut graph, "util", "").unwrap();
    assert!(graph.loadability("lights").is_ready());
}

#[test]
fn test_import_cycle_rejected() {
    let mut graph = DependencyGraph::new();
    module(&mut graph, "a", "import b").unwrap();
    module(&mut graph, "b", "").unwrap();

    let err = module(&mut graph, "b", "import a").unwrap_err();
    assert_eq!(
        err,
        GraphError::ImportCycle {
            module: "b".into(),
            chain: vec!["b".into(), "a".into(), "b".into()],
        }
    );

    // Old edges kept, module flagged
    let b = graph.module("b").unwrap();
    assert!(b.imports.is_empty());
    assert!(matches!(b.flag, Some(ModuleFlag::ImportCycle(_))));
    assert!(graph.dependents_of(&NodeId::Module("a".into())).is_empty());
}

#[test]
fn test_self_import_is_cycle() {
    let mut graph = DependencyGraph::new();
    let err = module(&mut graph, "a", "import a").unwrap_err();
    assert!(matches!(err, GraphError::ImportCycle { .. }));
}

#[test]
fn test_rejected_imports_retried() {
    let mut graph = DependencyGraph::new();
    module(&mut graph, "a", "import b").unwrap();
    module(&mut graph, "b", "").unwrap();
    module(&mut graph, "b", "import a").unwrap_err();

    // Breaking the cycle from the other side lets b settle
    module(&mut graph, "a", "").unwrap();
    assert_eq!(graph.retry_rejected_imports(), vec!["b".to_string()]);

    let b = graph.module("b").unwrap();
    assert!(b.flag.is_none());
    assert!(b.imports.contains("a"));
}

#[test]
fn test_missing_import_blocks_until_present() {
    let mut graph = DependencyGraph::new();
    app(&mut graph, "lights", &["net.http"]).unwrap();

    assert!(graph.module("net.http").unwrap().is_missing());
    assert_eq!(
        graph.loadability("lights"),
        Loadability::Blocked("module `net.http`: module not found".into())
    );

    module(&mut graph, "net.http", "").unwrap();
    assert!(graph.loadability("lights").is_ready());
}

#[test]
fn test_transitive_module_flag_blocks() {
    let mut graph = home();
    module(&mut graph, "util", "import base").unwrap();
    module(&mut graph, "base", "!").unwrap_err();

    match graph.loadability("lights") {
        Loadability::Blocked(reason) => assert!(reason.contains("`base`"), "{reason}"),
        Loadability::Ready => panic!("lights should be blocked"),
    }
    assert!(graph.loadability("heater").is_ready());
}

#[test]
fn test_removed_module_still_imported_is_missing() {
    let mut graph = home();
    module(&mut graph, "util", "import base").unwrap();
    module(&mut graph, "base", "").unwrap();

    assert!(graph.remove_module("util"));
    let util = graph.module("util").unwrap();
    assert!(util.is_missing());
    assert!(util.path.is_none());

    // base lost its only importer but still has a file
    assert!(graph.module("base").is_some());
    assert!(graph.dependents_of(&NodeId::Module("base".into())).is_empty());

    // Dropping the last importer drops the placeholder
    app(&mut graph, "lights", &[]).unwrap();
    assert!(graph.module("util").is_none());
}

#[test]
fn test_remove_unimported_module() {
    let mut graph = DependencyGraph::new();
    module(&mut graph, "orphan", "").unwrap();
    assert!(graph.remove_module("orphan"));
    assert!(graph.module("orphan").is_none());
    assert!(!graph.remove_module("orphan"));
}

#[test]
fn test_missing_entry_point_marks_invalid() {
    let mut graph = home();
    let err = graph
        .upsert_app_definition(
            "lights",
            &path("lights"),
            "import util\nfn init 1\nfn shutdown 0\n",
            AppExtras::default(),
            &LineRuntime,
        )
        .unwrap_err();
    assert!(matches!(err, GraphError::InvalidAppDefinition { .. }));

    let lights = graph.app("lights").unwrap();
    assert_eq!(
        lights.status,
        AppStatus::Invalid("missing entry point startup()".into())
    );
    // Dependents can still be located
    assert!(
        graph
            .dependents_of(&NodeId::App("lights".into()))
            .contains(&NodeId::Instance("my_lights".into()))
    );
    assert!(!graph.instance_loadability("my_lights").is_ready());
}

#[test]
fn test_extras_change_is_update() {
    let mut graph = home();
    let content = format!("import util\n{ENTRY}");
    let mut extras = AppExtras::default();
    extras.deps.insert(NodeId::Module("base".into()));

    let outcome = graph.upsert_app_definition("lights", &path("lights"), &content, extras, &LineRuntime);
    assert_eq!(outcome, Ok(Upserted::Updated));
    assert!(
        graph
            .dependents_of(&NodeId::Module("base".into()))
            .contains(&NodeId::App("lights".into()))
    );
}

#[test]
fn test_merged_payload_prefers_instance_keys() {
    let mut graph = DependencyGraph::new();
    let extras = AppExtras {
        deps: Default::default(),
        options: toml::from_str("brightness = 50\nentity = \"light.default\"").unwrap(),
    };
    graph
        .upsert_app_definition("lights", &path("lights"), ENTRY, extras, &LineRuntime)
        .unwrap();

    let payload: toml::Table = toml::from_str("entity = \"light.kitchen\"").unwrap();
    let merged = graph.app("lights").unwrap().merged_payload(&payload);
    assert_eq!(merged["entity"].as_str(), Some("light.kitchen"));
    assert_eq!(merged["brightness"].as_integer(), Some(50));
}

#[test]
fn test_duplicate_instance_first_wins() {
    let mut graph = home();
    graph.begin_config_load();
    instance(&mut graph, "my_lights", "lights", 0).unwrap();
    let err = graph
        .upsert_instance_config("my_lights", "heater", toml::Table::new(), BTreeSet::new(), 1)
        .unwrap_err();
    assert_eq!(
        err,
        ConfigEntryError::DuplicateInstanceName {
            name: "my_lights".into(),
            index: 1
        }
    );
    instance(&mut graph, "heater_1", "heater", 2).unwrap();
    assert!(graph.finish_config_load().is_empty());

    assert_eq!(graph.instance("my_lights").unwrap().app, "lights");
}

#[test]
fn test_unknown_app_stored_dangling() {
    let mut graph = home();
    let err = instance(&mut graph, "fan_1", "fan", 2).unwrap_err();
    assert!(matches!(err, ConfigEntryError::UnknownApp { .. }));

    assert!(graph.instance("fan_1").is_some());
    assert_eq!(
        graph.instance_loadability("fan_1"),
        Loadability::Blocked("unknown app `fan`".into())
    );

    // The app appears: instance becomes a dependent and loadable
    app(&mut graph, "fan", &[]).unwrap();
    assert!(
        graph
            .dependents_of(&NodeId::App("fan".into()))
            .contains(&NodeId::Instance("fan_1".into()))
    );
    assert!(graph.instance_loadability("fan_1").is_ready());
}

#[test]
fn test_finish_config_load_removes_unmentioned() {
    let mut graph = home();
    graph.begin_config_load();
    instance(&mut graph, "my_lights", "lights", 0).unwrap();
    assert_eq!(graph.finish_config_load(), vec!["heater_1".to_string()]);

    assert!(graph.instance("heater_1").is_none());
    assert!(graph.dependents_of(&NodeId::App("heater".into())).is_empty());
}

#[test]
fn test_payload_change_is_update() {
    let mut graph = home();
    graph.begin_config_load();
    let payload: toml::Table = toml::from_str("level = 3").unwrap();
    assert_eq!(
        graph.upsert_instance_config("my_lights", "lights", payload.clone(), BTreeSet::new(), 0),
        Ok(Upserted::Updated)
    );
    instance(&mut graph, "heater_1", "heater", 1).unwrap();
    graph.finish_config_load();

    graph.begin_config_load();
    assert_eq!(
        graph.upsert_instance_config("my_lights", "lights", payload, BTreeSet::new(), 0),
        Ok(Upserted::Unchanged)
    );
}

#[test]
fn test_remove_app_leaves_instances_dangling() {
    let mut graph = home();
    assert!(graph.remove_node(&NodeId::App("lights".into())));

    assert!(graph.instance("my_lights").is_some());
    assert!(graph.dependencies_of(&NodeId::Instance("my_lights".into())).is_empty());
    // util lost its importer but is file-backed
    assert!(graph.dependents_of(&NodeId::Module("util".into())).is_empty());
}

#[test]
fn test_ordered_instances_by_declaration() {
    let mut graph = DependencyGraph::new();
    graph.begin_config_load();
    instance(&mut graph, "b", "x", 1).unwrap_err();
    instance(&mut graph, "a", "x", 2).unwrap_err();
    instance(&mut graph, "c", "x", 0).unwrap_err();
    graph.finish_config_load();

    let names: Vec<_> = graph.ordered_instances().iter().map(|c| c.name.as_str()).collect();
    assert_eq!(names, vec!["c", "b", "a"]);
}

#[test]
fn test_apps_in_dir() {
    let graph = home();
    assert_eq!(
        graph.apps_in_dir(Path::new("/project")),
        vec!["heater".to_string(), "lights".to_string()]
    );
    assert!(graph.apps_in_dir(Path::new("/elsewhere")).is_empty());
}

// ============================================================================
// Declared deps
// ============================================================================

fn deps(ids: &[NodeId]) -> BTreeSet<NodeId> {
    ids.iter().cloned().collect()
}

#[test]
fn test_instance_deps_reach_instance() {
    let mut graph = home();
    module(&mut graph, "net", "").unwrap();
    graph
        .upsert_instance_config(
            "heater_1",
            "heater",
            toml::Table::new(),
            deps(&[NodeId::Module("net".into()), NodeId::App("lights".into())]),
            1,
        )
        .unwrap();

    let heater_1 = NodeId::Instance("heater_1".into());
    assert!(graph.dependents_of(&NodeId::Module("net".into())).contains(&heater_1));
    assert!(graph.dependents_of(&NodeId::App("lights".into())).contains(&heater_1));
    // util reaches heater_1 through lights
    assert!(graph.dependents_of(&NodeId::Module("util".into())).contains(&heater_1));

    module(&mut graph, "net", "!").unwrap_err();
    assert_eq!(
        graph.instance_loadability("heater_1"),
        Loadability::Blocked("module `net`: parse error: unexpected `!`".into())
    );
    assert!(graph.instance_loadability("my_lights").is_ready());
}

#[test]
fn test_app_dep_linked_when_app_appears() {
    let mut graph = home();
    let content = format!("import util\n{ENTRY}");
    let extras = AppExtras {
        deps: deps(&[NodeId::App("presence".into())]),
        options: toml::Table::new(),
    };
    graph
        .upsert_app_definition("lights", &path("lights"), &content, extras, &LineRuntime)
        .unwrap();
    assert_eq!(
        graph.dependencies_of(&NodeId::App("lights".into())),
        vec![NodeId::Module("util".into())]
    );
    // A missing app dependency does not block
    assert!(graph.loadability("lights").is_ready());

    app(&mut graph, "presence", &[]).unwrap();
    let dependents = graph.dependents_of(&NodeId::App("presence".into()));
    assert!(dependents.contains(&NodeId::App("lights".into())));
    assert!(dependents.contains(&NodeId::Instance("my_lights".into())));

    // Removed and re-added: the link comes back
    graph.remove_node(&NodeId::App("presence".into()));
    assert!(graph.dependents_of(&NodeId::App("presence".into())).is_empty());
    app(&mut graph, "presence", &[]).unwrap();
    assert!(
        graph
            .dependents_of(&NodeId::App("presence".into()))
            .contains(&NodeId::Instance("my_lights".into()))
    );
}

#[test]
fn test_instance_deps_change_is_update() {
    let mut graph = home();
    graph.begin_config_load();
    instance(&mut graph, "my_lights", "lights", 0).unwrap();
    let outcome = graph.upsert_instance_config(
        "heater_1",
        "heater",
        toml::Table::new(),
        deps(&[NodeId::Module("extra".into())]),
        1,
    );
    assert_eq!(outcome, Ok(Upserted::Updated));
    graph.finish_config_load();
    assert!(graph.module("extra").unwrap().is_missing());

    // Dropping the dep prunes the placeholder
    graph.begin_config_load();
    instance(&mut graph, "my_lights", "lights", 0).unwrap();
    assert_eq!(instance(&mut graph, "heater_1", "heater", 1), Ok(Upserted::Updated));
    graph.finish_config_load();
    assert!(graph.module("extra").is_none());
}
