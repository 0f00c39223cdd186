//! Warp model - rings, spiralers, tie-ups
//!
//! The WARP is the declarative architecture: core rings wrapped by platform
//! and frontend rings, optionally multiplexed for cross-platform targets.
//! Rings are cheap-clone handles with pointer identity; the planner relies
//! on identity (not names) for deduplication and cycle detection.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::{Arc, RwLock};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::decorators::StructDef;

/// Implementation language of a ring's package.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RingLanguage {
    Rust,
    TypeScript,
}

/// Package metadata carried by a ring and propagated down the spiral.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PackageMeta {
    pub package_path: Option<PathBuf>,
    pub package_name: Option<String>,
    pub language: Option<RingLanguage>,
}

/// CRUD operations recognized by the loom.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CrudOp {
    Create,
    Read,
    Update,
    Delete,
    List,
}

impl CrudOp {
    pub fn as_str(&self) -> &'static str {
        match self {
            CrudOp::Create => "create",
            CrudOp::Read => "read",
            CrudOp::Update => "update",
            CrudOp::Delete => "delete",
            CrudOp::List => "list",
        }
    }

    /// Read-side operations route to a `read` ring when declared.
    pub fn is_read(&self) -> bool {
        matches!(self, CrudOp::Read | CrudOp::List)
    }

    /// Write-side operations route to a `write` ring when declared.
    pub fn is_write(&self) -> bool {
        matches!(self, CrudOp::Create | CrudOp::Update | CrudOp::Delete)
    }
}

impl std::fmt::Display for CrudOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Stable identity of a ring within a process, derived from its allocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RingId(usize);

/// A spiraler: a graph edge factory carrying the generator tag for a wrap.
///
/// Spiralers are polymorphic over a capability set (android, desktop,
/// tauri, ...) whose members vary per core; the concrete type name is what
/// the generation matrix discriminates on.
#[derive(Debug, Clone)]
pub struct Spiraler {
    type_name: String,
    treadle_tag: String,
    inner: SpiralerInner,
}

#[derive(Debug, Clone)]
enum SpiralerInner {
    /// Wraps exactly one inner ring.
    One(Ring),
    /// Aggregates N inner rings, order-preserving.
    Many(Vec<Ring>),
}

impl Spiraler {
    /// A spiraler that wraps exactly one inner ring.
    pub fn wrapping(type_name: &str, treadle_tag: &str, inner: Ring) -> Self {
        Self {
            type_name: type_name.to_string(),
            treadle_tag: treadle_tag.to_string(),
            inner: SpiralerInner::One(inner),
        }
    }

    /// A mux spiraler aggregating several inner rings.
    pub fn muxing(type_name: &str, treadle_tag: &str, inners: Vec<Ring>) -> Self {
        Self {
            type_name: type_name.to_string(),
            treadle_tag: treadle_tag.to_string(),
            inner: SpiralerInner::Many(inners),
        }
    }

    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    pub fn treadle_tag(&self) -> &str {
        &self.treadle_tag
    }

    /// Inner rings in aggregation order.
    pub fn inner_rings(&self) -> Vec<Ring> {
        match &self.inner {
            SpiralerInner::One(ring) => vec![ring.clone()],
            SpiralerInner::Many(rings) => rings.clone(),
        }
    }
}

/// CRUD routing declaration: reads and writes may target different rings,
/// with per-operation custom overrides.
#[derive(Debug, Clone, Default)]
pub struct OperationRouting {
    pub read: Option<Ring>,
    pub write: Option<Ring>,
    pub custom: BTreeMap<CrudOp, Ring>,
}

/// One treadle attachment inside a tie-up configuration.
#[derive(Debug, Clone)]
pub struct TieupTreadle {
    pub treadle: String,
    pub warp_data: Value,
}

/// A lateral edge attaching a generator to a (source, target) pair outside
/// the matrix.
#[derive(Debug, Clone)]
pub struct Tieup {
    pub source: Ring,
    pub target: Ring,
    pub treadles: Vec<TieupTreadle>,
}

/// The innermost layer: a backing struct definition plus language.
#[derive(Debug)]
pub struct CoreRing {
    pub language: RingLanguage,
    pub struct_def: Option<StructDef>,
    /// Constructor name used when no explicit or export name applies.
    pub class_name: String,
}

/// A concrete wrapping layer: one inner ring plus the treadle tag that
/// identifies its generator.
#[derive(Debug)]
pub struct SpiralOut {
    pub spiraler_type: String,
    pub treadle_tag: String,
    pub inner: Ring,
}

/// A concrete aggregation layer over several platform rings.
#[derive(Debug)]
pub struct SpiralMux {
    pub inners: Vec<Ring>,
}

/// Ring payload variants.
#[derive(Debug)]
pub enum RingKind {
    Core(CoreRing),
    SpiralOut(SpiralOut),
    SpiralMux(SpiralMux),
}

#[derive(Debug)]
struct RingInner {
    kind: RingKind,
    /// Human-readable name; defaults to the first WARP export name under
    /// which the ring was encountered.
    name: RwLock<Option<String>>,
    package: RwLock<PackageMeta>,
    /// Capability spiralers attached to this layer, in attachment order.
    spiralers: RwLock<Vec<(String, Spiraler)>>,
    tieups: RwLock<Vec<Tieup>>,
    routing: RwLock<Option<OperationRouting>>,
}

/// A cheap-clone handle to one layer of the weave.
#[derive(Debug, Clone)]
pub struct Ring(Arc<RingInner>);

impl PartialEq for Ring {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl Eq for Ring {}

impl std::hash::Hash for Ring {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        (Arc::as_ptr(&self.0) as usize).hash(state);
    }
}

impl Ring {
    fn from_kind(kind: RingKind) -> Self {
        Self(Arc::new(RingInner {
            kind,
            name: RwLock::new(None),
            package: RwLock::new(PackageMeta::default()),
            spiralers: RwLock::new(Vec::new()),
            tieups: RwLock::new(Vec::new()),
            routing: RwLock::new(None),
        }))
    }

    /// A Rust core ring backed by a struct definition.
    pub fn rust_core(struct_def: StructDef) -> Self {
        let ring = Self::from_kind(RingKind::Core(CoreRing {
            language: RingLanguage::Rust,
            class_name: "RustCore".to_string(),
            struct_def: Some(struct_def),
        }));
        ring.set_package_language(RingLanguage::Rust);
        ring
    }

    /// A TypeScript core ring.
    pub fn typescript_core() -> Self {
        let ring = Self::from_kind(RingKind::Core(CoreRing {
            language: RingLanguage::TypeScript,
            class_name: "TypescriptCore".to_string(),
            struct_def: None,
        }));
        ring.set_package_language(RingLanguage::TypeScript);
        ring
    }

    /// Wrap an inner ring, producing a SpiralOut tagged for its generator.
    pub fn spiral_out(spiraler_type: &str, treadle_tag: &str, inner: Ring) -> Self {
        Self::from_kind(RingKind::SpiralOut(SpiralOut {
            spiraler_type: spiraler_type.to_string(),
            treadle_tag: treadle_tag.to_string(),
            inner,
        }))
    }

    /// Aggregate several platform rings under one logical layer.
    pub fn spiral_mux(inners: Vec<Ring>) -> Self {
        Self::from_kind(RingKind::SpiralMux(SpiralMux { inners }))
    }

    pub fn id(&self) -> RingId {
        RingId(Arc::as_ptr(&self.0) as usize)
    }

    pub fn kind(&self) -> &RingKind {
        &self.0.kind
    }

    pub fn is_core(&self) -> bool {
        matches!(self.0.kind, RingKind::Core(_))
    }

    pub fn as_core(&self) -> Option<&CoreRing> {
        match &self.0.kind {
            RingKind::Core(core) => Some(core),
            _ => None,
        }
    }

    /// Constructor name of the layer itself, ignoring attached spiralers.
    pub fn class_name(&self) -> String {
        match &self.0.kind {
            RingKind::Core(core) => core.class_name.clone(),
            RingKind::SpiralOut(out) => out.spiraler_type.clone(),
            RingKind::SpiralMux(_) => "SpiralMux".to_string(),
        }
    }

    /// Effective type name used as a matrix key.
    ///
    /// A SpiralOut reports the spiraler class that created it; a SpiralMux
    /// with an attached spiraler reports that spiraler's class. This unifies
    /// matrix keys with spiraler identities.
    pub fn effective_type_name(&self) -> String {
        match &self.0.kind {
            RingKind::Core(core) => core.class_name.clone(),
            RingKind::SpiralOut(out) => out.spiraler_type.clone(),
            RingKind::SpiralMux(_) => {
                let spiralers = self.0.spiralers.read().unwrap();
                spiralers
                    .first()
                    .map(|(_, s)| s.type_name().to_string())
                    .unwrap_or_else(|| "SpiralMux".to_string())
            }
        }
    }

    /// Inner rings this layer wraps or aggregates, in order.
    pub fn inner_rings(&self) -> Vec<Ring> {
        match &self.0.kind {
            RingKind::Core(_) => Vec::new(),
            RingKind::SpiralOut(out) => vec![out.inner.clone()],
            RingKind::SpiralMux(mux) => mux.inners.clone(),
        }
    }

    pub fn name(&self) -> Option<String> {
        self.0.name.read().unwrap().clone()
    }

    /// Explicitly set the name; explicit names survive export-name primacy.
    pub fn with_name(self, name: &str) -> Self {
        *self.0.name.write().unwrap() = Some(name.to_string());
        self
    }

    /// Assign the primary name unless one is already held.
    pub fn claim_name(&self, name: &str) -> bool {
        let mut slot = self.0.name.write().unwrap();
        if slot.is_none() {
            *slot = Some(name.to_string());
            true
        } else {
            false
        }
    }

    /// Override the primary name. The planner uses this for the core-identity
    /// exception where a Core export dominates a Spiraler identity.
    pub fn force_name(&self, name: &str) {
        *self.0.name.write().unwrap() = Some(name.to_string());
    }

    pub fn package(&self) -> PackageMeta {
        self.0.package.read().unwrap().clone()
    }

    pub fn with_package(self, meta: PackageMeta) -> Self {
        *self.0.package.write().unwrap() = meta;
        self
    }

    pub fn set_package_name(&self, name: &str) {
        self.0.package.write().unwrap().package_name = Some(name.to_string());
    }

    pub fn set_package_path(&self, path: impl Into<PathBuf>) {
        self.0.package.write().unwrap().package_path = Some(path.into());
    }

    pub fn set_package_language(&self, language: RingLanguage) {
        self.0.package.write().unwrap().language = Some(language);
    }

    /// Fill unset package fields from another ring's metadata.
    pub fn inherit_package(&self, from: &PackageMeta) {
        let mut meta = self.0.package.write().unwrap();
        if meta.package_name.is_none() {
            meta.package_name = from.package_name.clone();
        }
        if meta.package_path.is_none() {
            meta.package_path = from.package_path.clone();
        }
        if meta.language.is_none() {
            meta.language = from.language;
        }
    }

    /// Attach a capability spiraler under a property name.
    pub fn attach_spiraler(&self, property: &str, spiraler: Spiraler) {
        self.0
            .spiralers
            .write()
            .unwrap()
            .push((property.to_string(), spiraler));
    }

    /// Attached spiralers in attachment order.
    pub fn spiralers(&self) -> Vec<(String, Spiraler)> {
        self.0.spiralers.read().unwrap().clone()
    }

    /// Author a tie-up: attach treadles laterally from `source` onto self.
    pub fn tieup(&self, source: &Ring, treadles: Vec<TieupTreadle>) {
        self.0.tieups.write().unwrap().push(Tieup {
            source: source.clone(),
            target: self.clone(),
            treadles,
        });
    }

    pub fn tieups(&self) -> Vec<Tieup> {
        self.0.tieups.read().unwrap().clone()
    }

    pub fn set_routing(&self, routing: OperationRouting) {
        *self.0.routing.write().unwrap() = Some(routing);
    }

    pub fn routing(&self) -> Option<OperationRouting> {
        self.0.routing.read().unwrap().clone()
    }
}

/// A value exported from a WARP module. Non-layer exports are ignored by
/// discovery.
#[derive(Debug, Clone)]
pub enum WarpValue {
    Ring(Ring),
    Data(Value),
}

/// The declarative architecture module: an insertion-ordered map of export
/// name to value. The set of ring-valued exports is the set of roots.
#[derive(Debug, Default)]
pub struct Warp {
    exports: Vec<(String, WarpValue)>,
}

impl Warp {
    pub fn new() -> Self {
        Self::default()
    }

    /// Export a ring under a name. Insertion order is preserved.
    pub fn export(mut self, name: &str, ring: Ring) -> Self {
        self.exports.push((name.to_string(), WarpValue::Ring(ring)));
        self
    }

    /// Export a non-layer value; discovery ignores it.
    pub fn export_data(mut self, name: &str, value: Value) -> Self {
        self.exports.push((name.to_string(), WarpValue::Data(value)));
        self
    }

    pub fn exports(&self) -> &[(String, WarpValue)] {
        &self.exports
    }

    /// Ring-valued exports in insertion order.
    pub fn roots(&self) -> Vec<(String, Ring)> {
        self.exports
            .iter()
            .filter_map(|(name, value)| match value {
                WarpValue::Ring(ring) => Some((name.clone(), ring.clone())),
                WarpValue::Data(_) => None,
            })
            .collect()
    }
}
