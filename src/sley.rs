//! Sley - binding resolution and the method pipeline
//!
//! The sley beats management methods into the shape a generator needs:
//! ordered pure translations over `MgmtMethod` lists, last-second filters
//! right before rendering, and the operation mux that routes CRUD calls to
//! read/write/custom adaptor rings.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use serde::Serialize;
use tracing::debug;

use crate::decorators::{Management, MethodMetadata, Param, Wrapper};
use crate::render::{camel_case, snake_case};
use crate::warp::{CrudOp, Ring};

/// Binding metadata attached during enrichment and CRUD mapping.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct BindMeta {
    /// Whether the generated call site should propagate an error result.
    pub use_result: Option<bool>,
    /// Wrapper stack of the owning struct field, outer-first.
    pub wrappers: Vec<Wrapper>,
    /// Owning field on the core struct, for linked managements.
    pub field_name: Option<String>,
    /// Name of the destructurable data payload parameter (create/update).
    pub data_param: Option<String>,
}

/// A normalized method flowing through the pipeline.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MgmtMethod {
    /// Stable identity: `{management}.{originalName}`.
    pub id: String,
    pub management_name: String,
    /// Current bind name; translations rewrite this.
    pub name: String,
    pub original_name: String,
    /// camelCase form for JS call sites.
    pub js_name: String,
    pub params: Vec<Param>,
    pub return_type: String,
    pub is_collection: bool,
    pub tags: Vec<String>,
    pub crud_operation: Option<CrudOp>,
    pub description: Option<String>,
    pub metadata: BindMeta,
}

impl MgmtMethod {
    /// Convert decorator metadata into pipeline form. CRUD-tagged methods
    /// gain a `crud:<op>` tag for the tag filter.
    pub fn from_metadata(management: &Management, method: &MethodMetadata) -> Self {
        let mut tags = method.tags.clone();
        if let Some(op) = method.operation {
            let crud_tag = format!("crud:{}", op);
            if !tags.contains(&crud_tag) {
                tags.push(crud_tag);
            }
        }
        let mut metadata = BindMeta::default();
        if let Some(link) = &management.link {
            metadata.field_name = Some(link.field_name.clone());
            metadata.wrappers = link.wrappers.clone();
        }
        Self {
            id: format!("{}.{}", management.name, method.name),
            management_name: management.name.clone(),
            name: method.name.clone(),
            original_name: method.name.clone(),
            js_name: camel_case(&method.name),
            params: method.params.clone(),
            return_type: method.return_type.clone(),
            is_collection: method.is_collection,
            tags,
            crud_operation: method.operation,
            description: method.description.clone(),
            metadata,
        }
    }
}

/// A pure rewrite over the full method list.
pub type Translation = Arc<dyn Fn(Vec<MgmtMethod>) -> Vec<MgmtMethod> + Send + Sync>;

/// A builder over ordered translations.
///
/// Translations are applied in queue order by `process`; filters are not
/// part of the queue and run at the last moment, right before rendering.
#[derive(Clone, Default)]
pub struct MethodPipeline {
    translations: Vec<Translation>,
}

impl std::fmt::Debug for MethodPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MethodPipeline")
            .field("translations", &self.translations.len())
            .finish()
    }
}

impl MethodPipeline {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a translation.
    pub fn translate(mut self, translation: Translation) -> Self {
        self.translations.push(translation);
        self
    }

    /// Apply the queued translations in order.
    pub fn process(&self, methods: Vec<MgmtMethod>) -> Vec<MgmtMethod> {
        self.translations
            .iter()
            .fold(methods, |acc, translation| translation(acc))
    }

    /// Last-second filter, applied to an already-processed list.
    pub fn filter<F>(methods: Vec<MgmtMethod>, predicate: F) -> Vec<MgmtMethod>
    where
        F: Fn(&MgmtMethod) -> bool,
    {
        methods.into_iter().filter(|m| predicate(m)).collect()
    }
}

/// Management prefix for bind points: `BookmarkMgmt` -> `bookmark`.
pub fn management_prefix(management_name: &str) -> String {
    let base = management_name
        .strip_suffix("Management")
        .or_else(|| management_name.strip_suffix("Mgmt"))
        .unwrap_or(management_name);
    snake_case(base)
}

/// Rewrite `name` to `{prefix}_{originalName}`.
pub fn add_prefix(prefix: &str) -> Translation {
    let prefix = prefix.to_string();
    Arc::new(move |methods| {
        methods
            .into_iter()
            .map(|mut m| {
                m.name = format!("{}_{}", prefix, snake_case(&m.original_name));
                m.js_name = camel_case(&m.name);
                m
            })
            .collect()
    })
}

/// Rewrite `name` to `{mgmtSnake}_{originalName}` for collision-free bind
/// points across managements.
pub fn add_management_prefix() -> Translation {
    Arc::new(|methods| {
        methods
            .into_iter()
            .map(|mut m| {
                m.name = format!(
                    "{}_{}",
                    management_prefix(&m.management_name),
                    snake_case(&m.original_name)
                );
                m.js_name = camel_case(&m.name);
                m
            })
            .collect()
    })
}

fn is_object_type(ty: &str) -> bool {
    let ty = ty.trim();
    if ty.starts_with('{') {
        return true;
    }
    !matches!(
        ty,
        "string" | "number" | "boolean" | "bigint" | "void" | "i64" | "u64" | "f64" | "bool"
            | "String" | "str"
    ) && ty.chars().next().map(|c| c.is_uppercase()).unwrap_or(false)
}

/// Remap CRUD-tagged methods onto the standard interface names
/// (`create`, `read`, `update`, `delete`, `list`).
///
/// For create/update, the first object-typed parameter becomes the
/// destructurable data payload, recorded in `metadata.data_param`.
pub fn crud_interface_mapping() -> Translation {
    Arc::new(|methods| {
        methods
            .into_iter()
            .map(|mut m| {
                let Some(op) = m.crud_operation else {
                    return m;
                };
                m.name = op.as_str().to_string();
                m.js_name = camel_case(&m.name);
                if matches!(op, CrudOp::Create | CrudOp::Update) {
                    m.metadata.data_param = m
                        .params
                        .iter()
                        .find(|p| is_object_type(&p.ty))
                        .map(|p| p.name.clone());
                }
                m
            })
            .collect()
    })
}

/// Rewrite parameter and return type strings through a mapping.
///
/// `Promise<X>` unwraps to `X` before lookup; unmapped names pass through.
pub fn map_types(map: HashMap<String, String>) -> Translation {
    Arc::new(move |methods| {
        methods
            .into_iter()
            .map(|mut m| {
                m.return_type = map_one_type(&m.return_type, &map);
                for p in &mut m.params {
                    p.ty = map_one_type(&p.ty, &map);
                }
                m
            })
            .collect()
    })
}

fn map_one_type(ty: &str, map: &HashMap<String, String>) -> String {
    let ty = ty.trim();
    if let Some(mapped) = map.get(ty) {
        return mapped.clone();
    }
    if let Some(inner) = ty.strip_prefix("Promise<").and_then(|s| s.strip_suffix('>')) {
        return map_one_type(inner, map);
    }
    ty.to_string()
}

/// Drop methods bearing any of the listed tags. Methods without tags are
/// never dropped.
pub fn tag_filter<'a>(drop_tags: &'a [&'a str]) -> impl Fn(&MgmtMethod) -> bool + 'a {
    move |m| {
        if m.tags.is_empty() {
            return true;
        }
        !m.tags.iter().any(|t| drop_tags.contains(&t.as_str()))
    }
}

/// Keep only CRUD methods with one of the listed operations. Methods with
/// no CRUD operation are dropped; custom methods are routed separately.
pub fn crud_operation_filter<'a>(ops: &'a [CrudOp]) -> impl Fn(&MgmtMethod) -> bool + 'a {
    move |m| m.crud_operation.map(|op| ops.contains(&op)).unwrap_or(false)
}

/// Bind-point names duplicated across the list after prefixing.
///
/// Duplicates are a validation error that generation survives; the final
/// report lists the clash.
pub fn find_bind_point_collisions(methods: &[MgmtMethod]) -> Vec<String> {
    let mut counts: BTreeMap<&str, usize> = BTreeMap::new();
    for m in methods {
        *counts.entry(m.name.as_str()).or_default() += 1;
    }
    counts
        .into_iter()
        .filter(|(_, n)| *n > 1)
        .map(|(name, n)| format!("bind-point '{}' declared by {} methods", name, n))
        .collect()
}

/// Route one CRUD operation through a ring's declared routing.
///
/// 1. No routing declared: the ring itself.
/// 2. A custom route for the op wins.
/// 3. read/list go to the `read` ring, create/update/delete to `write`.
/// 4. Otherwise the ring itself.
pub fn route_operation(op: CrudOp, ring: &Ring) -> Ring {
    let Some(routing) = ring.routing() else {
        return ring.clone();
    };
    if let Some(custom) = routing.custom.get(&op) {
        return custom.clone();
    }
    if op.is_read() {
        if let Some(read) = routing.read {
            return read;
        }
    }
    if op.is_write() {
        if let Some(write) = routing.write {
            return write;
        }
    }
    ring.clone()
}

/// Group a task list of operations by target ring, preserving the order in
/// which targets are first encountered.
pub fn route_operations(ops: &[CrudOp], ring: &Ring) -> Vec<(Ring, Vec<CrudOp>)> {
    let mut grouped: Vec<(Ring, Vec<CrudOp>)> = Vec::new();
    for &op in ops {
        let target = route_operation(op, ring);
        match grouped.iter_mut().find(|(r, _)| *r == target) {
            Some((_, list)) => list.push(op),
            None => grouped.push((target, vec![op])),
        }
    }
    debug!(targets = grouped.len(), "routed operations");
    grouped
}

/// Human-readable routing description per operation.
pub fn analyze_routing(ops: &[CrudOp], ring: &Ring) -> Vec<String> {
    ops.iter()
        .map(|&op| {
            let target = route_operation(op, ring);
            let target_name = target
                .name()
                .unwrap_or_else(|| target.effective_type_name());
            if target == *ring {
                format!("{} -> self", op)
            } else {
                format!("{} -> {}", op, target_name)
            }
        })
        .collect()
}

/// Hybrid routing: reads and writes resolve to different rings.
pub fn is_hybrid(ring: &Ring) -> bool {
    match ring.routing() {
        Some(routing) => match (&routing.read, &routing.write) {
            (Some(r), Some(w)) => r != w,
            (Some(_), None) | (None, Some(_)) => true,
            (None, None) => !routing.custom.is_empty(),
        },
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decorators::{DecoratorKernel, MethodDecl, Reach};
    use crate::warp::OperationRouting;

    fn bookmark_mgmt() -> Management {
        let mut kernel = DecoratorKernel::new();
        kernel
            .crud(
                CrudOp::Create,
                MethodDecl::new("add")
                    .param("bookmark", "BookmarkInput")
                    .returns("Promise<Bookmark>"),
            )
            .crud(CrudOp::List, MethodDecl::new("all").returns("Promise<Bookmark[]>").collection())
            .method(MethodDecl::new("export_html").returns("Promise<string>").tag("slow"));
        kernel.reach(Reach::Local, "BookmarkMgmt").build().unwrap()
    }

    fn methods_of(mgmt: &Management) -> Vec<MgmtMethod> {
        mgmt.methods
            .iter()
            .map(|m| MgmtMethod::from_metadata(mgmt, m))
            .collect()
    }

    #[test]
    fn test_conversion_adds_crud_tags() {
        let mgmt = bookmark_mgmt();
        let methods = methods_of(&mgmt);
        assert!(methods[0].tags.contains(&"crud:create".to_string()));
        assert!(methods[2].tags.contains(&"slow".to_string()));
        assert_eq!(methods[0].js_name, "add");
        assert_eq!(methods[0].id, "BookmarkMgmt.add");
    }

    #[test]
    fn test_empty_pipeline_is_identity_on_empty() {
        let pipeline = MethodPipeline::new();
        assert!(pipeline.process(Vec::new()).is_empty());
    }

    #[test]
    fn test_management_prefix_translation() {
        let mgmt = bookmark_mgmt();
        let pipeline = MethodPipeline::new().translate(add_management_prefix());
        let methods = pipeline.process(methods_of(&mgmt));
        assert_eq!(methods[0].name, "bookmark_add");
        assert_eq!(methods[1].name, "bookmark_all");
        assert_eq!(methods[0].original_name, "add");
        assert_eq!(methods[0].js_name, "bookmarkAdd");
    }

    #[test]
    fn test_crud_interface_mapping_renames_and_maps_payload() {
        let mgmt = bookmark_mgmt();
        let pipeline = MethodPipeline::new().translate(crud_interface_mapping());
        let methods = pipeline.process(methods_of(&mgmt));
        assert_eq!(methods[0].name, "create");
        assert_eq!(methods[0].metadata.data_param.as_deref(), Some("bookmark"));
        assert_eq!(methods[1].name, "list");
        // Untagged method keeps its name.
        assert_eq!(methods[2].name, "export_html");
    }

    #[test]
    fn test_map_types_unwraps_promise() {
        let mgmt = bookmark_mgmt();
        let map = HashMap::from([
            ("Bookmark".to_string(), "Bookmark".to_string()),
            ("string".to_string(), "String".to_string()),
        ]);
        let pipeline = MethodPipeline::new().translate(map_types(map));
        let methods = pipeline.process(methods_of(&mgmt));
        assert_eq!(methods[0].return_type, "Bookmark");
        assert_eq!(methods[2].return_type, "String");
    }

    #[test]
    fn test_tag_filter_never_drops_untagged() {
        let mgmt = bookmark_mgmt();
        let mut methods = methods_of(&mgmt);
        methods[0].tags.clear();
        let kept = MethodPipeline::filter(methods, tag_filter(&["crud:list", "slow"]));
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].original_name, "add");
    }

    #[test]
    fn test_crud_operation_filter() {
        let mgmt = bookmark_mgmt();
        let kept = MethodPipeline::filter(
            methods_of(&mgmt),
            crud_operation_filter(&[CrudOp::Create]),
        );
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].original_name, "add");
    }

    #[test]
    fn test_collision_detection() {
        let mgmt_a = bookmark_mgmt();
        let mut kernel = DecoratorKernel::new();
        kernel.crud(CrudOp::Create, MethodDecl::new("add"));
        let mgmt_b = kernel.reach(Reach::Local, "BookmarkMgmt").build().unwrap();

        let mut methods = methods_of(&mgmt_a);
        methods.extend(methods_of(&mgmt_b));
        let pipeline = MethodPipeline::new().translate(add_management_prefix());
        let methods = pipeline.process(methods);

        let collisions = find_bind_point_collisions(&methods);
        assert_eq!(collisions.len(), 1);
        assert!(collisions[0].contains("bookmark_add"));
    }

    #[test]
    fn test_route_operation_without_routing_returns_ring() {
        let ring = Ring::typescript_core();
        assert_eq!(route_operation(CrudOp::Read, &ring), ring);
        assert!(!is_hybrid(&ring));
    }

    #[test]
    fn test_route_operations_groups_by_target() {
        let ring = Ring::typescript_core();
        let r1 = Ring::typescript_core().with_name("R1");
        let r2 = Ring::typescript_core().with_name("R2");
        ring.set_routing(OperationRouting {
            read: Some(r1.clone()),
            write: Some(r2.clone()),
            custom: BTreeMap::new(),
        });

        let grouped = route_operations(
            &[CrudOp::Create, CrudOp::Read, CrudOp::Update, CrudOp::List],
            &ring,
        );
        assert_eq!(grouped.len(), 2);
        assert_eq!(grouped[0].0, r2);
        assert_eq!(grouped[0].1, vec![CrudOp::Create, CrudOp::Update]);
        assert_eq!(grouped[1].0, r1);
        assert_eq!(grouped[1].1, vec![CrudOp::Read, CrudOp::List]);
        assert!(is_hybrid(&ring));
    }

    #[test]
    fn test_custom_route_wins() {
        let ring = Ring::typescript_core();
        let r1 = Ring::typescript_core();
        let custom = Ring::typescript_core();
        ring.set_routing(OperationRouting {
            read: Some(r1),
            write: None,
            custom: BTreeMap::from([(CrudOp::Read, custom.clone())]),
        });
        assert_eq!(route_operation(CrudOp::Read, &ring), custom);
        // Writes have no route; fall back to the ring.
        assert_eq!(route_operation(CrudOp::Delete, &ring), ring);
    }

    #[test]
    fn test_analyze_routing_describes_targets() {
        let ring = Ring::typescript_core();
        let r1 = Ring::typescript_core().with_name("sql_ring");
        ring.set_routing(OperationRouting {
            read: Some(r1),
            write: None,
            custom: BTreeMap::new(),
        });
        let lines = analyze_routing(&[CrudOp::Read, CrudOp::Create], &ring);
        assert_eq!(lines[0], "read -> sql_ring");
        assert_eq!(lines[1], "create -> self");
    }
}
