//! Rhai-backed app runtime.
//!
//! Each instance gets its own [`Engine`] with a file module resolver rooted at
//! the shared modules directory, so `import "net/http" as http;` loads
//! `modules/net/http.rhai`. Imports are resolved once at construction and
//! embedded in the instance, so later edits to a module never reach a live
//! instance. Top-level statements of an app source are evaluated before every
//! callback; apps keep their top level to imports and constants and hold
//! state in `this`.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use regex::Regex;
use rhai::module_resolvers::FileModuleResolver;
use rhai::{AST, CallFnOptions, Dynamic, Engine, ImmutableString, Map, Scope};

use super::{AppInstance, AppRuntime, ConstructRequest, HostHandle, SourceAnalysis};

// Patterns stick to explicit ASCII classes: the build leaves out Unicode Perl classes.

/// Block and line comments, stripped before scanning for imports.
static COMMENT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)/\*.*?\*/|//[^\n]*").unwrap());

/// `import "path"` with an optional `as alias`.
static IMPORT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"(?-u:\b)import[ \t\r\n]+"([^"]+)""#).unwrap());

/// Rhai runtime configured for one modules root.
pub struct RhaiRuntime {
    modules_root: PathBuf,
    max_operations: u64,
    /// Shared engine used only for compilation during analysis.
    analyzer: Engine,
}

impl RhaiRuntime {
    /// `max_operations == 0` leaves callbacks unbounded.
    pub fn new(modules_root: impl Into<PathBuf>, max_operations: u64) -> Self {
        Self {
            modules_root: modules_root.into(),
            max_operations,
            analyzer: Engine::new(),
        }
    }

    pub fn modules_root(&self) -> &Path {
        &self.modules_root
    }

    fn engine_for(&self, instance: &str, host: &HostHandle) -> Engine {
        let mut engine = Engine::new();
        engine.set_module_resolver(FileModuleResolver::new_with_path(&self.modules_root));
        engine.set_max_operations(self.max_operations);

        let name = instance.to_string();
        engine.on_print(move |text| crate::log!("app"; "{}: {}", name, text));
        let name = instance.to_string();
        engine.on_debug(move |text, _, pos| {
            crate::debug!("app"; "{} @ {}: {}", name, pos, text);
        });

        let reader = host.clone();
        engine.register_fn("get_state", move |entity_id: ImmutableString| {
            reader
                .get_state(&entity_id)
                .map_or(Dynamic::UNIT, Dynamic::from)
        });
        let writer = host.clone();
        engine.register_fn(
            "set_state",
            move |entity_id: ImmutableString, state: ImmutableString| {
                writer.set_state(&entity_id, &state);
            },
        );

        engine
    }
}

impl AppRuntime for RhaiRuntime {
    fn analyze(&self, source: &str) -> Result<SourceAnalysis, String> {
        let ast = self
            .analyzer
            .compile(source)
            .map_err(|err| err.to_string())?;

        let functions = ast
            .iter_functions()
            .map(|f| (f.name.to_string(), f.params.len()))
            .collect();

        Ok(SourceAnalysis {
            imports: scan_imports(source),
            functions,
        })
    }

    fn construct(&self, request: ConstructRequest) -> Result<Box<dyn AppInstance>, String> {
        let engine = self.engine_for(&request.instance, &request.host);
        let ast = engine
            .compile_into_self_contained(&Scope::new(), &*request.source)
            .map_err(|err| format!("{}: {}", request.path.display(), err))?;

        let config = rhai::serde::to_dynamic(&request.payload)
            .map_err(|err| format!("cannot bind configuration: {err}"))?;

        let mut fields = Map::new();
        fields.insert("name".into(), request.instance.clone().into());
        fields.insert("app".into(), request.app.clone().into());

        let mut instance = RhaiInstance {
            engine,
            ast,
            scope: Scope::new(),
            this: Dynamic::from_map(fields),
        };
        instance.call("init", (config,))?;

        Ok(Box::new(instance))
    }
}

/// Live rhai object: compiled source plus its `this` map.
struct RhaiInstance {
    engine: Engine,
    ast: AST,
    scope: Scope<'static>,
    this: Dynamic,
}

impl RhaiInstance {
    fn call(&mut self, function: &str, args: impl rhai::FuncArgs) -> Result<(), String> {
        let options = CallFnOptions::new().bind_this_ptr(&mut self.this);
        self.engine
            .call_fn_with_options::<Dynamic>(options, &mut self.scope, &self.ast, function, args)
            .map(|_| ())
            .map_err(|err| format!("{function}: {err}"))
    }
}

impl AppInstance for RhaiInstance {
    fn startup(&mut self) -> Result<(), String> {
        self.call("startup", ())
    }

    fn shutdown(&mut self) -> Result<(), String> {
        self.call("shutdown", ())
    }
}

/// Collect imported module names from source text.
fn scan_imports(source: &str) -> BTreeSet<String> {
    let code = COMMENT.replace_all(source, "");
    IMPORT
        .captures_iter(&code)
        .filter_map(|caps| import_to_module_name(&caps[1]))
        .collect()
}

/// Convert an import path (`net/http`, `./util.rhai`) to a dotted module name.
pub fn import_to_module_name(spec: &str) -> Option<String> {
    let spec = spec.trim().trim_start_matches("./");
    let spec = spec.strip_suffix(".rhai").unwrap_or(spec);
    let name = spec
        .split(['/', '\\'])
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join(".");
    (!name.is_empty()).then_some(name)
}
