//! Full pipeline: reed discovery, plan construction, template rendering,
//! hookups, and cross-run stability through the public LoomSystem surface.

use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use serde_json::json;
use spire_loom::decorators::{DecoratorKernel, MethodDecl, Reach, StructDef, Wrapper};
use spire_loom::hookups::rust_module::{ModDecl, RustModuleHookup};
use spire_loom::hookups::HookupSpec;
use spire_loom::render::TemplateSource;
use spire_loom::treadle::{
    HookupClause, MethodSpec, OutputCondition, OutputSpec, PipelineStep, TreadleDefinition,
    TreadleKit,
};
use spire_loom::warp::CrudOp;
use spire_loom::{LoomSystem, Ring, Warp};

const SCHEMA_TS: &str = r#"
import { sqliteTable, integer, text } from 'drizzle-orm/sqlite-core';

export const bookmarks = sqliteTable('bookmarks', {
  id: integer('id').primaryKey({ autoIncrement: true }),
  url: text('url').notNull(),
});
"#;

const COMMANDS_TEMPLATE: &str = "//! Commands for <%= coreName %>.\n\n<%- commandFns %>\n";

struct Fixture {
    _dir: tempfile::TempDir,
    root: PathBuf,
    lib_rs: PathBuf,
    system: LoomSystem,
}

fn fixture() -> Fixture {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path().join("workspace");
    let machinery = dir.path().join("machinery");

    // Built-in template tree.
    fs::create_dir_all(machinery.join("tauri")).unwrap();
    fs::write(machinery.join("tauri/commands.rs.ejs"), COMMANDS_TEMPLATE).unwrap();

    // Target crate to hook into.
    let lib_rs = root.join("crates/app/src/lib.rs");
    fs::create_dir_all(lib_rs.parent().unwrap()).unwrap();
    fs::write(&lib_rs, "pub mod error;\n").unwrap();

    // Schema module.
    let schema = root.join("packages/db/schema.ts");
    fs::create_dir_all(schema.parent().unwrap()).unwrap();
    fs::write(&schema, SCHEMA_TS).unwrap();

    // WARP: a Rust core wrapped by an Android ring.
    let struct_def = StructDef::new("Foundframe").field("bookmark_manager", &[Wrapper::Mutex]);
    let link = struct_def.field_ref("bookmark_manager").unwrap();
    let core = Ring::rust_core(struct_def);
    let android = Ring::spiral_out("RustAndroidSpiraler", "foregroundService", core.clone());
    let warp = Warp::new().export("core", core).export("android", android);

    // A user treadle overriding the built-in on the same matrix key.
    let lib_rs_for_hookup = lib_rs.clone();
    let treadle = TreadleDefinition::new(
        "bookmark-commands",
        MethodSpec::platform().step(PipelineStep::ManagementPrefix),
    )
    .matching("RustAndroidSpiraler", "RustCore")
    .output(OutputSpec {
        template: "tauri/commands.rs.ejs".to_string(),
        path: "spire/{coreNameSnake}/commands.rs".to_string(),
        language: Some(spire_loom::marker::MarkerLanguage::Rust),
        condition: OutputCondition::RequiresMethods,
        context: None,
    })
    .data_fn(Arc::new(|_, helpers| {
        Ok(json!({
            "commandFns": format!(
                "// {} bound methods\n",
                helpers.all().len()
            ),
        }))
    }))
    .hookup(HookupClause::Custom(Arc::new(move |_task, _data| {
        Ok(vec![(
            lib_rs_for_hookup.clone(),
            HookupSpec::RustModule(RustModuleHookup::default().module(ModDecl::new("spire").public())),
        )])
    })));

    let mut kit = TreadleKit::new(TemplateSource::new(&machinery, None), &root).with_builtins();
    kit.register(treadle).unwrap();

    // Management with reach Local and a CRUD method, linked to the core.
    let mut kernel = DecoratorKernel::new();
    kernel.crud(
        CrudOp::Create,
        MethodDecl::new("add")
            .param("bookmark", "BookmarkInput")
            .returns("Promise<Result<Bookmark>>"),
    );
    let mgmt = kernel
        .reach(Reach::Local, "BookmarkMgmt")
        .link(link)
        .build()
        .unwrap();

    let system = LoomSystem::new(warp, kit)
        .management(mgmt)
        .schema(root.join("packages/db/schema.ts"))
        .scan_path(lib_rs.clone());

    Fixture {
        _dir: dir,
        root,
        lib_rs,
        system,
    }
}

#[tokio::test]
async fn weave_generates_output_and_hooks_module_root() {
    let mut fixture = fixture();
    let report = fixture.system.weave().await.unwrap();

    assert_eq!(report.exit_code(), 0, "errors: {:?}", report.errors);
    assert_eq!(report.files_generated.len(), 1);

    let commands = fs::read_to_string(fixture.root.join("spire/core/commands.rs")).unwrap();
    assert!(commands.contains("//! Commands for core."));
    assert!(commands.contains("// 1 bound methods"));

    let lib = fs::read_to_string(&fixture.lib_rs).unwrap();
    assert!(lib.contains("pub mod spire;"));
    assert!(lib.contains("pub mod error;"), "manual content preserved");
}

#[tokio::test]
async fn second_weave_is_stable() {
    let mut fixture = fixture();
    fixture.system.weave().await.unwrap();
    let lib_after_first = fs::read_to_string(&fixture.lib_rs).unwrap();
    let commands_after_first =
        fs::read_to_string(fixture.root.join("spire/core/commands.rs")).unwrap();

    let report = fixture.system.weave().await.unwrap();
    assert_eq!(report.exit_code(), 0);
    assert!(report.files_generated.is_empty(), "nothing regenerated");
    assert!(!report.files_unchanged.is_empty());
    assert_eq!(report.blocks_cleaned, 0, "re-emitted blocks are not orphans");

    assert_eq!(fs::read_to_string(&fixture.lib_rs).unwrap(), lib_after_first);
    assert_eq!(
        fs::read_to_string(fixture.root.join("spire/core/commands.rs")).unwrap(),
        commands_after_first
    );
}

#[tokio::test]
async fn schema_validation_failure_aborts_the_run() {
    let mut fixture = fixture();
    // Break the schema: a table without a primary key.
    fs::write(
        fixture.root.join("packages/db/schema.ts"),
        "export const rows = sqliteTable('rows', {\n  value: text('value'),\n});\n",
    )
    .unwrap();

    let err = fixture.system.weave().await.unwrap_err();
    assert!(err.to_string().contains("no primary key"));
}
