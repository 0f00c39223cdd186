//! Decorator kernel - reach, CRUD, link, and Rust struct metadata
//!
//! The kernel is a pure metadata sink. Method-level CRUD marks run before
//! their class-level reach mark, so they queue into a pending list that the
//! reach mark flushes onto the management being built. The queue is owned
//! by the run context; there is exactly one writer per run.

use std::collections::BTreeSet;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::{LoomError, Result};
use crate::warp::CrudOp;

/// Visibility scope of a Management.
///
/// Ordering is by how far out the spiral the binding reaches: `Private`
/// stays on the core, `Local` reaches platform rings, `Global` reaches
/// every ring including the frontend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Reach {
    Private,
    Local,
    Global,
}

/// Rust smart-pointer wrappers stackable on a core struct field.
///
/// Multiple wrappers stack in decoration order, outer-first: a field
/// decorated `[Mutex, Option]` denotes `Mutex<Option<T>>`, and call sites
/// unwrap in the same left-to-right order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Wrapper {
    Mutex,
    Option,
    Arc,
    RwLock,
}

impl Wrapper {
    pub fn as_str(&self) -> &'static str {
        match self {
            Wrapper::Mutex => "Mutex",
            Wrapper::Option => "Option",
            Wrapper::Arc => "Arc",
            Wrapper::RwLock => "RwLock",
        }
    }
}

/// Primitive type marks for struct fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum FieldType {
    I64,
    U64,
    String,
    Bool,
    F64,
    Vec(Box<FieldType>),
    /// A named domain type.
    Named(String),
}

impl FieldType {
    pub fn rust_name(&self) -> String {
        match self {
            FieldType::I64 => "i64".to_string(),
            FieldType::U64 => "u64".to_string(),
            FieldType::String => "String".to_string(),
            FieldType::Bool => "bool".to_string(),
            FieldType::F64 => "f64".to_string(),
            FieldType::Vec(inner) => format!("Vec<{}>", inner.rust_name()),
            FieldType::Named(name) => name.clone(),
        }
    }
}

/// One field of a stamped Rust struct.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldDef {
    pub name: String,
    pub wrappers: Vec<Wrapper>,
    pub ty: Option<FieldType>,
}

impl FieldDef {
    /// Field type with its wrapper stack applied, outer-first.
    pub fn wrapped_rust_type(&self) -> String {
        let base = self
            .ty
            .as_ref()
            .map(FieldType::rust_name)
            .unwrap_or_else(|| "_".to_string());
        self.wrappers
            .iter()
            .rev()
            .fold(base, |acc, w| format!("{}<{}>", w.as_str(), acc))
    }
}

/// A struct field reference usable as a link target.
///
/// Produced by the struct stamp; carries its own field name and owning
/// struct class so a link mark can be authored as a plain value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExternalLayer {
    pub struct_class: String,
    pub field_name: String,
    pub wrappers: Vec<Wrapper>,
}

/// A class stamped as a Rust struct, with per-field wrapper metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StructDef {
    pub name: String,
    pub fields: Vec<FieldDef>,
}

impl StructDef {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            fields: Vec::new(),
        }
    }

    /// Add a field with its wrapper stack in decoration order (outer-first).
    pub fn field(mut self, name: &str, wrappers: &[Wrapper]) -> Self {
        self.fields.push(FieldDef {
            name: name.to_string(),
            wrappers: wrappers.to_vec(),
            ty: None,
        });
        self
    }

    /// Add a field carrying both wrappers and a primitive type mark.
    pub fn typed_field(mut self, name: &str, wrappers: &[Wrapper], ty: FieldType) -> Self {
        self.fields.push(FieldDef {
            name: name.to_string(),
            wrappers: wrappers.to_vec(),
            ty: Some(ty),
        });
        self
    }

    pub fn field_def(&self, name: &str) -> Option<&FieldDef> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// The field as an external-layer value, as the struct stamp exposes it.
    pub fn field_ref(&self, name: &str) -> Result<ExternalLayer> {
        let field = self.field_def(name).ok_or_else(|| {
            LoomError::Config(format!(
                "struct '{}' has no field '{}'",
                self.name, name
            ))
        })?;
        Ok(ExternalLayer {
            struct_class: self.name.clone(),
            field_name: field.name.clone(),
            wrappers: field.wrappers.clone(),
        })
    }
}

/// One parameter of a management method, captured as strings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Param {
    pub name: String,
    pub ty: String,
}

/// Normalized per-method metadata attached by the kernel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MethodMetadata {
    pub name: String,
    pub operation: Option<CrudOp>,
    pub params: Vec<Param>,
    pub return_type: String,
    pub is_collection: bool,
    pub is_soft_delete: bool,
    pub tags: Vec<String>,
    pub description: Option<String>,
}

/// Fluent declaration of one method, consumed by the kernel queue.
#[derive(Debug, Clone)]
pub struct MethodDecl {
    name: String,
    params: Vec<Param>,
    return_type: String,
    is_collection: bool,
    is_soft_delete: bool,
    tags: Vec<String>,
    description: Option<String>,
}

impl MethodDecl {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            params: Vec::new(),
            return_type: "void".to_string(),
            is_collection: false,
            is_soft_delete: false,
            tags: Vec::new(),
            description: None,
        }
    }

    pub fn param(mut self, name: &str, ty: &str) -> Self {
        self.params.push(Param {
            name: name.to_string(),
            ty: ty.to_string(),
        });
        self
    }

    pub fn returns(mut self, ty: &str) -> Self {
        self.return_type = ty.to_string();
        self
    }

    pub fn collection(mut self) -> Self {
        self.is_collection = true;
        self
    }

    pub fn soft_delete(mut self) -> Self {
        self.is_soft_delete = true;
        self
    }

    pub fn tag(mut self, tag: &str) -> Self {
        self.tags.push(tag.to_string());
        self
    }

    pub fn describe(mut self, text: &str) -> Self {
        self.description = Some(text.to_string());
        self
    }

    fn into_metadata(self, operation: Option<CrudOp>) -> MethodMetadata {
        MethodMetadata {
            name: self.name,
            operation,
            params: self.params,
            return_type: self.return_type,
            is_collection: self.is_collection,
            is_soft_delete: self.is_soft_delete,
            tags: self.tags,
            description: self.description,
        }
    }
}

/// A domain Management: a class marked with a reach level, CRUD-tagged
/// methods, and an optional link to a core struct field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Management {
    pub name: String,
    pub reach: Reach,
    pub source_file: Option<PathBuf>,
    pub methods: Vec<MethodMetadata>,
    pub link: Option<ExternalLayer>,
}

impl Management {
    /// Method names within one Management must be unique.
    pub fn validate(&self) -> Result<()> {
        let mut seen = BTreeSet::new();
        for method in &self.methods {
            if !seen.insert(method.name.as_str()) {
                return Err(LoomError::Config(format!(
                    "management '{}' declares method '{}' more than once",
                    self.name, method.name
                )));
            }
        }
        Ok(())
    }
}

/// The pending per-method annotation queue plus the flush operation.
///
/// Mirrors the host decorator evaluation order: method marks queue first,
/// the class-level reach mark consumes the queue.
#[derive(Debug, Default)]
pub struct DecoratorKernel {
    pending: Vec<(Option<CrudOp>, MethodDecl)>,
}

impl DecoratorKernel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a CRUD-tagged method annotation for the next reach mark.
    pub fn crud(&mut self, operation: CrudOp, decl: MethodDecl) -> &mut Self {
        self.pending.push((Some(operation), decl));
        self
    }

    /// Queue a plain (untagged) method.
    pub fn method(&mut self, decl: MethodDecl) -> &mut Self {
        self.pending.push((None, decl));
        self
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// The class-level reach mark: flush all pending method annotations onto
    /// a management draft.
    pub fn reach(&mut self, level: Reach, class_name: &str) -> ManagementDraft {
        let methods = std::mem::take(&mut self.pending)
            .into_iter()
            .map(|(op, decl)| decl.into_metadata(op))
            .collect();
        ManagementDraft {
            management: Management {
                name: class_name.to_string(),
                reach: level,
                source_file: None,
                methods,
                link: None,
            },
        }
    }
}

/// A flushed management awaiting its optional link and provenance.
#[derive(Debug)]
pub struct ManagementDraft {
    management: Management,
}

impl ManagementDraft {
    /// Attach the link mark: a struct-field value from a stamped struct.
    pub fn link(mut self, field: ExternalLayer) -> Self {
        self.management.link = Some(field);
        self
    }

    pub fn source_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.management.source_file = Some(path.into());
        self
    }

    pub fn build(self) -> Result<Management> {
        self.management.validate()?;
        Ok(self.management)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_method_marks_flush_on_reach() {
        let mut kernel = DecoratorKernel::new();
        kernel
            .crud(CrudOp::Create, MethodDecl::new("add").param("bookmark", "BookmarkInput").returns("Promise<Bookmark>"))
            .crud(CrudOp::List, MethodDecl::new("all").returns("Promise<Bookmark[]>").collection());

        assert_eq!(kernel.pending_len(), 2);
        let mgmt = kernel.reach(Reach::Local, "BookmarkMgmt").build().unwrap();
        assert_eq!(kernel.pending_len(), 0);

        assert_eq!(mgmt.name, "BookmarkMgmt");
        assert_eq!(mgmt.reach, Reach::Local);
        assert_eq!(mgmt.methods.len(), 2);
        assert_eq!(mgmt.methods[0].operation, Some(CrudOp::Create));
        assert!(mgmt.methods[1].is_collection);
    }

    #[test]
    fn test_second_reach_gets_only_its_own_marks() {
        let mut kernel = DecoratorKernel::new();
        kernel.crud(CrudOp::Read, MethodDecl::new("get"));
        let first = kernel.reach(Reach::Private, "FirstMgmt").build().unwrap();

        kernel.crud(CrudOp::Delete, MethodDecl::new("remove"));
        let second = kernel.reach(Reach::Global, "SecondMgmt").build().unwrap();

        assert_eq!(first.methods.len(), 1);
        assert_eq!(second.methods.len(), 1);
        assert_eq!(second.methods[0].name, "remove");
    }

    #[test]
    fn test_duplicate_method_names_rejected() {
        let mut kernel = DecoratorKernel::new();
        kernel.crud(CrudOp::Create, MethodDecl::new("add"));
        kernel.crud(CrudOp::Update, MethodDecl::new("add"));
        let err = kernel.reach(Reach::Local, "BookmarkMgmt").build();
        assert!(err.is_err());
    }

    #[test]
    fn test_struct_field_ref_carries_wrappers() {
        let def = StructDef::new("Foundframe")
            .field("device_manager", &[Wrapper::Option, Wrapper::Mutex])
            .typed_field("generation", &[], FieldType::I64);

        let layer = def.field_ref("device_manager").unwrap();
        assert_eq!(layer.struct_class, "Foundframe");
        assert_eq!(layer.field_name, "device_manager");
        assert_eq!(layer.wrappers, vec![Wrapper::Option, Wrapper::Mutex]);

        assert!(def.field_ref("missing").is_err());
    }

    #[test]
    fn test_wrapper_stack_is_outer_first() {
        let def = StructDef::new("Foundframe").typed_field(
            "device_manager",
            &[Wrapper::Mutex, Wrapper::Option],
            FieldType::Named("DeviceManager".into()),
        );
        let field = def.field_def("device_manager").unwrap();
        assert_eq!(field.wrapped_rust_type(), "Mutex<Option<DeviceManager>>");
    }

    #[test]
    fn test_reach_ordering() {
        assert!(Reach::Private < Reach::Local);
        assert!(Reach::Local < Reach::Global);
    }
}
