//! `foregroundService` - wraps a Rust core as an Android foreground service
//!
//! Emits the Kotlin service class delegating management calls over the
//! runtime boundary, and hooks the Gradle build (rust-android plugin,
//! cargo ndk task, generated source dir) and the AndroidManifest
//! (foreground-service permission plus the service entry) when the task
//! data names the Android module directory.

use std::path::PathBuf;
use std::sync::Arc;

use serde_json::json;

use crate::hookups::{
    gradle::{GradleHookup, RustBuildTask},
    ManifestHookup,
};
use crate::hookups::android_manifest::ManifestComponent;
use crate::treadle::{
    HookupClause, MatchPair, MethodSpec, OutputCondition, OutputSpec, PipelineStep,
    TreadleDefinition,
};

pub fn definition() -> TreadleDefinition {
    TreadleDefinition {
        name: "foregroundService".to_string(),
        matches: vec![MatchPair::new("RustAndroidSpiraler", "RustCore")],
        methods: MethodSpec::platform()
            .step(PipelineStep::ManagementPrefix)
            .step(PipelineStep::KotlinTypes),
        outputs: vec![OutputSpec {
            template: "android/foreground_service.kt.ejs".to_string(),
            path: "spire/android/{coreNamePascal}ForegroundService.kt".to_string(),
            language: Some(crate::marker::MarkerLanguage::Kotlin),
            condition: OutputCondition::RequiresMethods,
            context: None,
        }],
        data: Some(Arc::new(|task, helpers| {
            let service_methods = super::kotlin_service_fns(helpers.all());
            Ok(json!({
                "serviceMethods": service_methods,
                "serviceClass": format!(
                    "{}ForegroundService",
                    crate::render::pascal_case(&task.previous.export_name)
                ),
            }))
        })),
        validate: None,
        transform_methods: None,
        contributions: Vec::new(),
        hookup: Some(HookupClause::Custom(Arc::new(|task, data| {
            // Without a declared Android module there is nothing to patch.
            let Some(module_dir) = data.get("androidModuleDir").and_then(|v| v.as_str()) else {
                return Ok(Vec::new());
            };
            let module = PathBuf::from(module_dir);
            let core_snake = crate::render::snake_case(&task.previous.export_name);

            let gradle = GradleHookup::default()
                .plugin("org.mozilla.rust-android-gradle.rust-android")
                .source_set("main", "kotlin", "../../spire/android")
                .rust_task(RustBuildTask::new(
                    &format!("cargoBuild{}", crate::render::pascal_case(&core_snake)),
                    &format!("../../crates/{}-android", core_snake),
                ));

            let manifest = ManifestHookup::default()
                .permission("android.permission.FOREGROUND_SERVICE")
                .service(
                    ManifestComponent::new(&format!(
                        ".{}ForegroundService",
                        crate::render::pascal_case(&task.previous.export_name)
                    ))
                    .attribute("android:exported", "false")
                    .attribute("android:foregroundServiceType", "dataSync"),
                );

            Ok(vec![
                (
                    module.join("build.gradle"),
                    crate::hookups::HookupSpec::Gradle(gradle),
                ),
                (
                    module.join("src/main/AndroidManifest.xml"),
                    crate::hookups::HookupSpec::AndroidManifest(manifest),
                ),
            ])
        }))),
    }
}
