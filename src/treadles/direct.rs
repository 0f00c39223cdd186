//! `direct` - binds a desktop ring straight onto the core
//!
//! No IPC boundary: the generated module calls the core handle in-process.
//! Hooks a `mod` declaration into the crate root named by the task data.

use std::path::PathBuf;
use std::sync::Arc;

use serde_json::json;

use crate::hookups::rust_module::{ModDecl, RustModuleHookup};
use crate::treadle::{
    HookupClause, MatchPair, MethodSpec, OutputCondition, OutputSpec, PipelineStep,
    TreadleDefinition,
};

pub fn definition() -> TreadleDefinition {
    TreadleDefinition {
        name: "direct".to_string(),
        matches: vec![MatchPair::new("DesktopSpiraler", "RustCore")],
        methods: MethodSpec::platform()
            .step(PipelineStep::ManagementPrefix)
            .step(PipelineStep::RustTypes),
        outputs: vec![OutputSpec {
            template: "desktop/direct.rs.ejs".to_string(),
            path: "spire/{coreNameSnake}/direct.rs".to_string(),
            language: Some(crate::marker::MarkerLanguage::Rust),
            condition: OutputCondition::RequiresMethods,
            context: None,
        }],
        data: Some(Arc::new(|_task, helpers| {
            Ok(json!({
                "traitMethods": super::rust_trait_fns(helpers.all()),
            }))
        })),
        validate: None,
        transform_methods: None,
        contributions: Vec::new(),
        hookup: Some(HookupClause::Custom(Arc::new(|_task, data| {
            let Some(lib_rs) = data.get("crateRootRs").and_then(|v| v.as_str()) else {
                return Ok(Vec::new());
            };
            let Some(core_snake) = data.get("coreNameSnake").and_then(|v| v.as_str()) else {
                return Ok(Vec::new());
            };
            let hookup = RustModuleHookup::default().module(
                ModDecl::new("direct")
                    .public()
                    .path(&format!("../../spire/{}/direct.rs", core_snake)),
            );
            Ok(vec![(
                PathBuf::from(lib_rs),
                crate::hookups::HookupSpec::RustModule(hookup),
            )])
        }))),
    }
}
