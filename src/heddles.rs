//! Heddles - plan construction
//!
//! The heddles lift the WARP graph into a WeavingPlan: spiral edges, nodes
//! grouped by effective type name, enriched managements, and the ordered
//! task list. Matrix-matched tasks are produced during traversal; tie-up
//! tasks are appended afterward and carry their own generator.

use std::collections::{HashMap, HashSet};

use serde_json::Value;
use tracing::{debug, info, instrument, warn};

use crate::decorators::Management;
use crate::error::{LoomError, Result};
use crate::sley::{add_management_prefix, find_bind_point_collisions, MethodPipeline, MgmtMethod};
use crate::warp::{Ring, RingId, RingKind, Warp};

/// Relationship carried by a spiral edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EdgeRelationship {
    Wraps,
    Aggregates,
    Adapts,
    Binds,
}

/// One directed edge of the weave graph, outer to inner.
#[derive(Debug, Clone)]
pub struct SpiralEdge {
    pub from: Ring,
    pub to: Ring,
    pub relationship: EdgeRelationship,
    pub export_name: String,
}

/// A placed layer: the ring, its primary export name, and the effective
/// type name used as a matrix key.
#[derive(Debug, Clone)]
pub struct Node {
    pub ring: Ring,
    pub export_name: String,
    pub type_name: String,
}

/// One unit of generation work.
///
/// Matrix-matched tasks carry the matched `(outer, inner)` type pair and
/// resolve their generator through the matrix key; tie-up tasks carry their
/// own `generator` and bypass matrix lookup.
#[derive(Debug, Clone)]
pub struct GenerationTask {
    pub current: Node,
    pub previous: Node,
    pub export_name: String,
    pub generator: Option<String>,
    pub config: Option<Value>,
}

impl GenerationTask {
    pub fn match_key(&self) -> (String, String) {
        (self.current.type_name.clone(), self.previous.type_name.clone())
    }
}

/// A management with its per-method template enrichment applied.
#[derive(Debug, Clone)]
pub struct EnrichedManagement {
    pub management: Management,
    pub methods: Vec<MgmtMethod>,
}

/// The matrix from `(currentType, previousType)` pairs to generator names.
pub type GeneratorMatrix = HashMap<(String, String), String>;

/// Output of the heddles.
///
/// `nodes_by_type` is guarded: reading it during the build phase fails, so
/// rendering can never traverse a half-built plan.
#[derive(Debug, Default)]
pub struct WeavingPlan {
    edges: Vec<SpiralEdge>,
    nodes_by_type: HashMap<String, Vec<Node>>,
    nodes_by_id: HashMap<RingId, Node>,
    /// Visit order, for deterministic tie-up collection.
    node_order: Vec<RingId>,
    pub managements: Vec<EnrichedManagement>,
    pub tasks: Vec<GenerationTask>,
    /// Configuration errors detected during planning; the affected pieces
    /// are excluded but the run continues.
    pub validation_errors: Vec<String>,
    is_complete: bool,
}

impl WeavingPlan {
    pub fn is_complete(&self) -> bool {
        self.is_complete
    }

    /// Nodes grouped by effective type name. Fails until the planner marks
    /// the plan complete.
    pub fn nodes_by_type(&self) -> Result<&HashMap<String, Vec<Node>>> {
        if !self.is_complete {
            return Err(LoomError::PlanIncomplete);
        }
        Ok(&self.nodes_by_type)
    }

    pub fn edges(&self) -> &[SpiralEdge] {
        &self.edges
    }

    pub fn node_for(&self, ring: &Ring) -> Option<&Node> {
        self.nodes_by_id.get(&ring.id())
    }
}

/// Whether a method's return type should propagate an error result at the
/// generated call site.
fn returns_fallible(return_type: &str) -> bool {
    let ty = return_type.trim();
    let ty = ty
        .strip_prefix("Promise<")
        .and_then(|s| s.strip_suffix('>'))
        .unwrap_or(ty);
    ty == "Result" || ty.starts_with("Result<")
}

/// The planner. Holds the primary-name assignments for one build; state is
/// rebuilt from scratch on every `build_plan` call.
#[derive(Debug, Default)]
pub struct Planner {
    visited: HashSet<RingId>,
    edge_seen: HashSet<(RingId, RingId)>,
    plan: WeavingPlan,
}

impl Planner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a WeavingPlan from WARP roots, collected managements, and the
    /// generator matrix.
    #[instrument(skip_all, fields(exports = warp.roots().len(), managements = managements.len()))]
    pub fn build_plan(
        mut self,
        warp: &Warp,
        managements: &[Management],
        matrix: &GeneratorMatrix,
    ) -> Result<WeavingPlan> {
        let roots = warp.roots();

        // Metadata ensurance happens before traversal so every node the
        // matrix sees carries package identity.
        for (export_name, root) in &roots {
            ensure_package_metadata(root, export_name)?;
        }

        for (export_name, root) in &roots {
            self.visit(root, export_name, matrix);
        }

        self.collect_tieups();
        self.enrich_managements(managements);
        self.check_bind_points();

        self.plan.is_complete = true;
        info!(
            edges = self.plan.edges.len(),
            tasks = self.plan.tasks.len(),
            managements = self.plan.managements.len(),
            "weaving plan complete"
        );
        Ok(self.plan)
    }

    fn visit(&mut self, ring: &Ring, export_name: &str, matrix: &GeneratorMatrix) {
        if !self.visited.insert(ring.id()) {
            return;
        }

        // Primary export name: first encounter wins; an explicit name or an
        // earlier Core export keeps precedence over a wrapping spiraler.
        ring.claim_name(export_name);
        let node = Node {
            ring: ring.clone(),
            export_name: ring.name().unwrap_or_else(|| export_name.to_string()),
            type_name: ring.effective_type_name(),
        };
        self.plan
            .nodes_by_type
            .entry(node.type_name.clone())
            .or_default()
            .push(node.clone());
        self.plan.nodes_by_id.insert(ring.id(), node.clone());
        self.plan.node_order.push(ring.id());

        let relationship = match ring.kind() {
            RingKind::Core(_) => EdgeRelationship::Binds,
            RingKind::SpiralOut(_) => EdgeRelationship::Wraps,
            RingKind::SpiralMux(_) => EdgeRelationship::Aggregates,
        };

        for inner in ring.inner_rings() {
            // Spiraler back-references onto the parent are cycles, skipped by
            // identity.
            if inner.id() == ring.id() {
                warn!(ring = %node.type_name, "skipping self-referential inner ring");
                continue;
            }
            self.visit(&inner, export_name, matrix);

            if self.edge_seen.insert((ring.id(), inner.id())) {
                self.plan.edges.push(SpiralEdge {
                    from: ring.clone(),
                    to: inner.clone(),
                    relationship,
                    export_name: export_name.to_string(),
                });

                let key = (ring.effective_type_name(), inner.effective_type_name());
                if matrix.contains_key(&key) {
                    debug!(current = %key.0, previous = %key.1, "matrix match");
                    let previous = self.plan.nodes_by_id[&inner.id()].clone();
                    self.plan.tasks.push(GenerationTask {
                        current: self.plan.nodes_by_id[&ring.id()].clone(),
                        previous,
                        export_name: export_name.to_string(),
                        generator: None,
                        config: None,
                    });
                }
            }
        }
    }

    /// Collect tie-ups attached to any visited layer; each treadle entry
    /// becomes a synthetic task carrying its generator and warp data.
    fn collect_tieups(&mut self) {
        let nodes: Vec<Node> = self
            .plan
            .node_order
            .iter()
            .filter_map(|id| self.plan.nodes_by_id.get(id).cloned())
            .collect();
        for node in &nodes {
            for tieup in node.ring.tieups() {
                let Some(source) = self.plan.nodes_by_id.get(&tieup.source.id()).cloned() else {
                    self.plan.validation_errors.push(format!(
                        "tie-up source for '{}' is not part of the weave",
                        node.export_name
                    ));
                    continue;
                };
                let Some(target) = self.plan.nodes_by_id.get(&tieup.target.id()).cloned() else {
                    self.plan.validation_errors.push(format!(
                        "tie-up target for '{}' is not part of the weave",
                        node.export_name
                    ));
                    continue;
                };
                for entry in &tieup.treadles {
                    self.plan.tasks.push(GenerationTask {
                        current: target.clone(),
                        previous: source.clone(),
                        export_name: target.export_name.clone(),
                        generator: Some(entry.treadle.clone()),
                        config: Some(entry.warp_data.clone()),
                    });
                }
            }
        }
    }

    /// Attach per-method enrichment from the ownership chain.
    fn enrich_managements(&mut self, managements: &[Management]) {
        for management in managements {
            if let Some(link) = &management.link {
                if let Err(message) = self.validate_link(management, link) {
                    self.plan.validation_errors.push(message);
                    continue;
                }
            }

            let methods = management
                .methods
                .iter()
                .map(|m| {
                    let mut method = MgmtMethod::from_metadata(management, m);
                    method.metadata.use_result = Some(returns_fallible(&m.return_type));
                    method
                })
                .collect();

            self.plan.managements.push(EnrichedManagement {
                management: management.clone(),
                methods,
            });
        }
    }

    fn validate_link(
        &self,
        management: &Management,
        link: &crate::decorators::ExternalLayer,
    ) -> std::result::Result<(), String> {
        let core = self
            .plan
            .nodes_by_id
            .values()
            .find(|n| {
                n.ring
                    .as_core()
                    .and_then(|c| c.struct_def.as_ref())
                    .map(|s| s.name == link.struct_class)
                    .unwrap_or(false)
            })
            .ok_or_else(|| {
                format!(
                    "management '{}' links to struct '{}' which no core ring defines",
                    management.name, link.struct_class
                )
            })?;

        let core_def = core
            .ring
            .as_core()
            .and_then(|c| c.struct_def.as_ref())
            .ok_or_else(|| "core ring lost its struct definition".to_string())?;

        if core_def.field_def(&link.field_name).is_none() {
            return Err(format!(
                "management '{}' links to field '{}' which struct '{}' does not define",
                management.name, link.field_name, link.struct_class
            ));
        }
        Ok(())
    }

    /// Bind-point uniqueness across all managements after the management
    /// prefix; clashes are reported, generation proceeds.
    fn check_bind_points(&mut self) {
        let all: Vec<MgmtMethod> = self
            .plan
            .managements
            .iter()
            .flat_map(|e| e.methods.iter().cloned())
            .collect();
        let pipeline = MethodPipeline::new().translate(add_management_prefix());
        let prefixed = pipeline.process(all);
        for clash in find_bind_point_collisions(&prefixed) {
            warn!("{}", clash);
            self.plan.validation_errors.push(clash);
        }
    }
}

/// Propagate package metadata along the spiral before planning.
///
/// A SpiralOut inherits from its inner unless explicitly set; a Rust core
/// without an explicit package name falls back to its layer or constructor
/// name; a mux has no package of its own and pushes its metadata into each
/// inner ring.
pub fn ensure_package_metadata(ring: &Ring, export_name: &str) -> Result<()> {
    let mut visited = HashSet::new();
    ensure_metadata_walk(ring, export_name, &mut visited)
}

fn ensure_metadata_walk(
    ring: &Ring,
    export_name: &str,
    visited: &mut HashSet<RingId>,
) -> Result<()> {
    if !visited.insert(ring.id()) {
        return Ok(());
    }

    match ring.kind() {
        RingKind::Core(core) => {
            let meta = ring.package();
            if meta.package_name.is_none() {
                let fallback = ring
                    .name()
                    .unwrap_or_else(|| {
                        if export_name.is_empty() {
                            core.class_name.clone()
                        } else {
                            export_name.to_string()
                        }
                    });
                ring.set_package_name(&fallback);
            }
            if ring.package().language.is_none() {
                ring.set_package_language(core.language);
            }
        }
        RingKind::SpiralOut(out) => {
            ensure_metadata_walk(&out.inner, export_name, visited)?;
            let inner_meta = out.inner.package();
            ring.inherit_package(&inner_meta);
        }
        RingKind::SpiralMux(mux) => {
            let own = ring.package();
            for inner in &mux.inners {
                inner.inherit_package(&own);
                ensure_metadata_walk(inner, export_name, visited)?;
            }
        }
    }

    let meta = ring.package();
    if ring.is_core() && meta.package_name.as_deref().map(str::is_empty).unwrap_or(true) {
        return Err(LoomError::Planning(format!(
            "core ring under export '{}' has no package name after enrichment",
            export_name
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decorators::{DecoratorKernel, MethodDecl, Reach, StructDef, Wrapper};
    use crate::warp::{CrudOp, Spiraler, TieupTreadle};

    fn matrix_with(pairs: &[(&str, &str, &str)]) -> GeneratorMatrix {
        pairs
            .iter()
            .map(|(c, p, g)| ((c.to_string(), p.to_string()), g.to_string()))
            .collect()
    }

    fn simple_warp() -> (Warp, Ring, Ring) {
        let core = Ring::rust_core(
            StructDef::new("Foundframe").field("bookmark_manager", &[Wrapper::Mutex]),
        );
        let android = Ring::spiral_out("RustAndroidSpiraler", "foregroundService", core.clone());
        let warp = Warp::new()
            .export("core", core.clone())
            .export("android", android.clone());
        (warp, core, android)
    }

    #[test]
    fn test_plan_edges_and_matrix_match() {
        let (warp, core, android) = simple_warp();
        let matrix = matrix_with(&[("RustAndroidSpiraler", "RustCore", "foregroundService")]);

        let plan = Planner::new().build_plan(&warp, &[], &matrix).unwrap();
        assert!(plan.is_complete());
        assert_eq!(plan.edges().len(), 1);
        assert_eq!(plan.edges()[0].from, android);
        assert_eq!(plan.edges()[0].to, core);
        assert_eq!(plan.tasks.len(), 1);
        assert_eq!(
            plan.tasks[0].match_key(),
            ("RustAndroidSpiraler".to_string(), "RustCore".to_string())
        );
        assert!(plan.tasks[0].generator.is_none());
    }

    #[test]
    fn test_incomplete_plan_guards_nodes() {
        let plan = WeavingPlan::default();
        assert!(matches!(
            plan.nodes_by_type(),
            Err(LoomError::PlanIncomplete)
        ));
    }

    #[test]
    fn test_mux_disambiguates_through_attached_spiraler() {
        let core = Ring::rust_core(StructDef::new("Foundframe"));
        let android = Ring::spiral_out("RustAndroidSpiraler", "foregroundService", core.clone());
        let desktop = Ring::spiral_out("DesktopSpiraler", "direct", core.clone());
        let tauri = Ring::spiral_mux(vec![android.clone(), desktop.clone()]);
        tauri.attach_spiraler(
            "tauri",
            Spiraler::muxing("TauriSpiraler", "tauri", vec![android.clone(), desktop.clone()]),
        );

        let warp = Warp::new()
            .export("tauri", tauri)
            .export("android", android)
            .export("desktop", desktop);
        let matrix = matrix_with(&[
            ("TauriSpiraler", "RustAndroidSpiraler", "tauri"),
            ("TauriSpiraler", "DesktopSpiraler", "tauri"),
        ]);

        let plan = Planner::new().build_plan(&warp, &[], &matrix).unwrap();
        let keys: Vec<_> = plan.tasks.iter().map(|t| t.match_key()).collect();
        assert!(keys.contains(&("TauriSpiraler".into(), "RustAndroidSpiraler".into())));
        assert!(keys.contains(&("TauriSpiraler".into(), "DesktopSpiraler".into())));
    }

    #[test]
    fn test_primary_name_stability_across_exports() {
        let core = Ring::rust_core(StructDef::new("Foundframe"));
        let android = Ring::spiral_out("RustAndroidSpiraler", "foregroundService", core.clone());
        // Core is exported after the wrapper that reaches it first.
        let warp = Warp::new()
            .export("android", android)
            .export("core", core.clone());

        let plan = Planner::new().build_plan(&warp, &[], &GeneratorMatrix::new()).unwrap();
        assert_eq!(core.name().as_deref(), Some("android"));
        let nodes = plan.nodes_by_type().unwrap();
        assert_eq!(nodes["RustCore"][0].export_name, "android");
    }

    #[test]
    fn test_package_metadata_propagation() {
        let core = Ring::rust_core(StructDef::new("Foundframe"));
        core.set_package_path("crates/foundframe");
        let android = Ring::spiral_out("RustAndroidSpiraler", "foregroundService", core.clone());
        let warp = Warp::new()
            .export("core", core.clone())
            .export("android", android.clone());

        Planner::new().build_plan(&warp, &[], &GeneratorMatrix::new()).unwrap();

        assert_eq!(core.package().package_name.as_deref(), Some("core"));
        let meta = android.package();
        assert_eq!(meta.package_name.as_deref(), Some("core"));
        assert_eq!(
            meta.package_path.as_deref(),
            Some(std::path::Path::new("crates/foundframe"))
        );
    }

    #[test]
    fn test_self_referential_spiraler_is_skipped() {
        let core = Ring::rust_core(StructDef::new("Foundframe"));
        let android = Ring::spiral_out("RustAndroidSpiraler", "foregroundService", core);
        android.attach_spiraler(
            "selfish",
            Spiraler::wrapping("SelfSpiraler", "direct", android.clone()),
        );

        let warp = Warp::new().export("android", android);
        let plan = Planner::new().build_plan(&warp, &[], &GeneratorMatrix::new()).unwrap();
        // Core + android only; the back-reference adds no node or edge.
        assert_eq!(plan.edges().len(), 1);
    }

    #[test]
    fn test_tieup_tasks_bypass_matrix() {
        let (warp, core, android) = simple_warp();
        android.tieup(
            &core,
            vec![TieupTreadle {
                treadle: "ddd".to_string(),
                warp_data: serde_json::json!({ "aggregate": "Bookmark" }),
            }],
        );

        let plan = Planner::new().build_plan(&warp, &[], &GeneratorMatrix::new()).unwrap();
        assert_eq!(plan.tasks.len(), 1);
        let task = &plan.tasks[0];
        assert_eq!(task.generator.as_deref(), Some("ddd"));
        assert_eq!(task.current.ring, android);
        assert_eq!(task.previous.ring, core);
        assert!(task.config.is_some());
    }

    #[test]
    fn test_link_validation_failure_is_recorded() {
        let (warp, _core, _android) = simple_warp();
        let mut kernel = DecoratorKernel::new();
        kernel.crud(CrudOp::Create, MethodDecl::new("add"));
        let mgmt = kernel
            .reach(Reach::Local, "BookmarkMgmt")
            .link(crate::decorators::ExternalLayer {
                struct_class: "Foundframe".into(),
                field_name: "missing_field".into(),
                wrappers: vec![],
            })
            .build()
            .unwrap();

        let plan = Planner::new()
            .build_plan(&warp, &[mgmt], &GeneratorMatrix::new())
            .unwrap();
        assert!(plan.managements.is_empty());
        assert_eq!(plan.validation_errors.len(), 1);
        assert!(plan.validation_errors[0].contains("missing_field"));
    }

    #[test]
    fn test_enrichment_sets_use_result_and_link() {
        let (warp, core, _android) = simple_warp();
        let link = core
            .as_core()
            .unwrap()
            .struct_def
            .as_ref()
            .unwrap()
            .field_ref("bookmark_manager")
            .unwrap();

        let mut kernel = DecoratorKernel::new();
        kernel
            .crud(
                CrudOp::Create,
                MethodDecl::new("add").returns("Promise<Result<Bookmark>>"),
            )
            .crud(CrudOp::List, MethodDecl::new("all").returns("Promise<Bookmark[]>"));
        let mgmt = kernel
            .reach(Reach::Local, "BookmarkMgmt")
            .link(link)
            .build()
            .unwrap();

        let plan = Planner::new()
            .build_plan(&warp, &[mgmt], &GeneratorMatrix::new())
            .unwrap();
        let enriched = &plan.managements[0];
        assert_eq!(enriched.methods[0].metadata.use_result, Some(true));
        assert_eq!(enriched.methods[1].metadata.use_result, Some(false));
        assert_eq!(
            enriched.methods[0].metadata.field_name.as_deref(),
            Some("bookmark_manager")
        );
        assert_eq!(enriched.methods[0].metadata.wrappers, vec![Wrapper::Mutex]);
    }

    #[test]
    fn test_bind_point_collision_reported_but_plan_completes() {
        let (warp, _core, _android) = simple_warp();

        let mut kernel = DecoratorKernel::new();
        kernel.crud(CrudOp::Create, MethodDecl::new("add"));
        let a = kernel.reach(Reach::Local, "BookmarkMgmt").build().unwrap();
        kernel.crud(CrudOp::Update, MethodDecl::new("add"));
        let b = kernel.reach(Reach::Local, "BookmarkMgmt").build().unwrap();

        let plan = Planner::new()
            .build_plan(&warp, &[a, b], &GeneratorMatrix::new())
            .unwrap();
        assert!(plan.is_complete());
        assert_eq!(plan.managements.len(), 2);
        assert!(plan
            .validation_errors
            .iter()
            .any(|e| e.contains("bookmark_add")));
    }
}
