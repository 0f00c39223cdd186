//! `plugin` - lifts platform rings into a Tauri plugin
//!
//! Emits the command layer on the Rust side and the invoke bindings on the
//! TypeScript side, then hooks the plugin init function into the crate
//! root, the plugin dependency into the Cargo manifest, and the bindings
//! re-export into the package index, whenever the task data names them.

use std::path::PathBuf;
use std::sync::Arc;

use serde_json::json;

use crate::hookups::cargo_toml::{DependencyDetail, DependencySpec};
use crate::hookups::rust_module::{ModDecl, PluginInitFn, RustModuleHookup};
use crate::hookups::{CargoHookup, HookupSpec, TsIndexHookup};
use crate::treadle::{
    HookupClause, MatchPair, MethodSpec, OutputCondition, OutputSpec, PipelineStep,
    TreadleDefinition,
};

pub fn definition() -> TreadleDefinition {
    TreadleDefinition {
        name: "plugin".to_string(),
        matches: vec![
            MatchPair::new("TauriSpiraler", "RustAndroidSpiraler"),
            MatchPair::new("TauriSpiraler", "DesktopSpiraler"),
        ],
        methods: MethodSpec::platform().step(PipelineStep::ManagementPrefix),
        outputs: vec![
            OutputSpec {
                template: "tauri/commands.rs.ejs".to_string(),
                path: "spire/{coreNameSnake}/commands.rs".to_string(),
                language: Some(crate::marker::MarkerLanguage::Rust),
                condition: OutputCondition::RequiresMethods,
                context: None,
            },
            OutputSpec {
                template: "tauri/bindings.ts.ejs".to_string(),
                path: "spire/{coreNameSnake}/bindings.ts".to_string(),
                language: Some(crate::marker::MarkerLanguage::TypeScript),
                condition: OutputCondition::RequiresMethods,
                context: None,
            },
        ],
        data: Some(Arc::new(|task, helpers| {
            let plugin_name = crate::render::kebab_case(&task.previous.export_name);
            Ok(json!({
                "pluginName": plugin_name,
                "stateType": format!(
                    "{}State",
                    crate::render::pascal_case(&task.previous.export_name)
                ),
                "commandFns": super::rust_command_fns(
                    helpers.all(),
                    &format!("{}State", crate::render::pascal_case(&task.previous.export_name)),
                ),
                "bindingFns": super::ts_binding_fns(
                    helpers.all(),
                    &crate::render::kebab_case(&task.previous.export_name),
                ),
            }))
        })),
        validate: None,
        transform_methods: None,
        contributions: Vec::new(),
        hookup: Some(HookupClause::Custom(Arc::new(|task, data| {
            let mut specs: Vec<(PathBuf, HookupSpec)> = Vec::new();
            let plugin_name = crate::render::kebab_case(&task.previous.export_name);
            let state_type = format!(
                "{}State",
                crate::render::pascal_case(&task.previous.export_name)
            );
            let commands: Vec<String> = data
                .get("methods")
                .and_then(|v| v.as_array())
                .map(|methods| {
                    methods
                        .iter()
                        .filter_map(|m| m.get("name").and_then(|n| n.as_str()))
                        .map(|name| format!("commands::{}", name))
                        .collect()
                })
                .unwrap_or_default();

            if let Some(lib_rs) = data.get("crateRootRs").and_then(|v| v.as_str()) {
                let core_snake = crate::render::snake_case(&task.previous.export_name);
                let hookup = RustModuleHookup::default()
                    .module(
                        ModDecl::new("commands")
                            .public()
                            .path(&format!("../../spire/{}/commands.rs", core_snake)),
                    )
                    .plugin(PluginInitFn {
                        fn_name: "init".to_string(),
                        plugin_name: plugin_name.clone(),
                        state_type: Some(state_type),
                        setup: Vec::new(),
                        commands,
                    });
                specs.push((PathBuf::from(lib_rs), HookupSpec::RustModule(hookup)));
            }

            if let Some(cargo_toml) = data.get("cargoTomlPath").and_then(|v| v.as_str()) {
                let hookup = CargoHookup::default()
                    .dependency(
                        "tauri",
                        DependencySpec::Detailed(DependencyDetail {
                            version: Some("2".to_string()),
                            ..Default::default()
                        }),
                    )
                    .build_dependency("tauri-build", DependencySpec::version("2"));
                specs.push((PathBuf::from(cargo_toml), HookupSpec::CargoToml(hookup)));
            }

            if let Some(index_ts) = data.get("tsIndexPath").and_then(|v| v.as_str()) {
                let core_snake = crate::render::snake_case(&task.previous.export_name);
                let hookup = TsIndexHookup::default()
                    .star_export(&format!("./spire/{}/bindings", core_snake));
                specs.push((PathBuf::from(index_ts), HookupSpec::TypeScript(hookup)));
            }

            Ok(specs)
        }))),
    }
}
