//! `app` - frontend glue over a TypeScript core
//!
//! Collects only Global-reach managements and wires the generated glue
//! module into the app's Vite config and package index when the task data
//! names them.

use std::path::PathBuf;
use std::sync::Arc;

use serde_json::json;

use crate::hookups::vite::{ViteHookup, ViteServer};
use crate::hookups::{HookupSpec, TsIndexHookup};
use crate::treadle::{
    HookupClause, MatchPair, MethodSpec, OutputCondition, OutputSpec, PipelineStep,
    TreadleDefinition,
};

pub fn definition() -> TreadleDefinition {
    TreadleDefinition {
        name: "app".to_string(),
        matches: vec![MatchPair::new("AppSpiraler", "TypescriptCore")],
        methods: MethodSpec::front().step(PipelineStep::ManagementPrefix),
        outputs: vec![OutputSpec {
            template: "app/glue.ts.ejs".to_string(),
            path: "spire/app/{nameSnake}.ts".to_string(),
            language: Some(crate::marker::MarkerLanguage::TypeScript),
            condition: OutputCondition::RequiresMethods,
            context: None,
        }],
        data: Some(Arc::new(|task, helpers| {
            Ok(json!({
                "glueFns": super::ts_binding_fns(
                    helpers.all(),
                    &crate::render::kebab_case(&task.previous.export_name),
                ),
            }))
        })),
        validate: None,
        transform_methods: None,
        contributions: Vec::new(),
        hookup: Some(HookupClause::Custom(Arc::new(|_task, data| {
            let mut specs: Vec<(PathBuf, HookupSpec)> = Vec::new();
            if let Some(vite_config) = data.get("viteConfigPath").and_then(|v| v.as_str()) {
                let hookup = ViteHookup::default()
                    .define_value("__SPIRE_LOOM__", "true")
                    .server(ViteServer {
                        port: Some(1420),
                        host: None,
                    });
                specs.push((PathBuf::from(vite_config), HookupSpec::ViteConfig(hookup)));
            }
            if let Some(index_ts) = data.get("tsIndexPath").and_then(|v| v.as_str()) {
                if let Some(name_snake) = data.get("nameSnake").and_then(|v| v.as_str()) {
                    let hookup =
                        TsIndexHookup::default().star_export(&format!("./spire/app/{}", name_snake));
                    specs.push((PathBuf::from(index_ts), HookupSpec::TypeScript(hookup)));
                }
            }
            Ok(specs)
        }))),
    }
}
