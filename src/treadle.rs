//! Treadle-kit - declarative generators and their execution
//!
//! A treadle matches (outer, inner) type pairs in the weave, shapes the
//! management methods through the sley pipeline, renders templates, and
//! applies hookups to foreign files. Built-ins are compiled in; user
//! treadles come from programmatic registration or declarative YAML files
//! under `loom/treadles/`, and user registrations override built-ins on
//! the same matrix key.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, info, instrument, warn};

use crate::decorators::Reach;
use crate::error::{LoomError, Result};
use crate::heddles::{GenerationTask, GeneratorMatrix, WeavingPlan};
use crate::hookups::{apply_hookups, HookupContext, HookupResult, HookupSpec, HookupStatus};
use crate::marker::MarkerLanguage;
use crate::registry::BlockRegistry;
use crate::render::{render_template, TemplateSource};
use crate::sley::{
    add_management_prefix, add_prefix, crud_interface_mapping, crud_operation_filter, map_types,
    tag_filter, MethodPipeline, MgmtMethod,
};
use crate::warp::CrudOp;

/// Which reach levels a treadle collects: core sees everything, platform
/// sees Local and Global, front sees only Global.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReachFilter {
    Core,
    Platform,
    Front,
}

impl ReachFilter {
    fn min_reach(&self) -> Reach {
        match self {
            ReachFilter::Core => Reach::Private,
            ReachFilter::Platform => Reach::Local,
            ReachFilter::Front => Reach::Global,
        }
    }
}

/// One (current, previous) pair a treadle matches.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchPair {
    pub current: String,
    pub previous: String,
}

impl MatchPair {
    pub fn new(current: &str, previous: &str) -> Self {
        Self {
            current: current.to_string(),
            previous: previous.to_string(),
        }
    }
}

/// Serializable pipeline steps for declarative treadles.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PipelineStep {
    ManagementPrefix,
    #[serde(rename = "prefix")]
    Prefix(String),
    CrudInterfaceMapping,
    RustTypes,
    KotlinTypes,
}

impl PipelineStep {
    fn to_translation(&self) -> crate::sley::Translation {
        match self {
            PipelineStep::ManagementPrefix => add_management_prefix(),
            PipelineStep::Prefix(prefix) => add_prefix(prefix),
            PipelineStep::CrudInterfaceMapping => crud_interface_mapping(),
            PipelineStep::RustTypes => map_types(crate::render::rust_type_map()),
            PipelineStep::KotlinTypes => map_types(crate::render::kotlin_type_map()),
        }
    }
}

/// Method collection and shaping for one treadle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MethodSpec {
    pub filter: ReachFilter,
    #[serde(default)]
    pub pipeline: Vec<PipelineStep>,
    /// Last-second drop list; methods bearing any of these tags are removed.
    #[serde(default)]
    pub drop_tags: Vec<String>,
    /// Last-second keep list of CRUD operations.
    #[serde(default)]
    pub only_operations: Option<Vec<CrudOp>>,
}

impl MethodSpec {
    pub fn core() -> Self {
        Self {
            filter: ReachFilter::Core,
            pipeline: Vec::new(),
            drop_tags: Vec::new(),
            only_operations: None,
        }
    }

    pub fn platform() -> Self {
        Self {
            filter: ReachFilter::Platform,
            ..Self::core()
        }
    }

    pub fn front() -> Self {
        Self {
            filter: ReachFilter::Front,
            ..Self::core()
        }
    }

    pub fn step(mut self, step: PipelineStep) -> Self {
        self.pipeline.push(step);
        self
    }
}

/// Output condition, evaluated before rendering.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OutputCondition {
    #[default]
    Always,
    /// Skip when the collected method list is empty.
    RequiresMethods,
    /// Skip unless the merged data record carries a truthy key.
    KeyPresent(String),
}

/// One rendered output of a treadle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputSpec {
    /// Template path relative to the templates root.
    pub template: String,
    /// Output path pattern with `{placeholder}` substitutions.
    pub path: String,
    #[serde(default)]
    pub language: Option<MarkerLanguage>,
    #[serde(default)]
    pub condition: OutputCondition,
    /// Extra data merged for this output only.
    #[serde(default)]
    pub context: Option<Value>,
}

/// A method a treadle contributes to a spiraler's surface, attached as a
/// sibling of the treadle definition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpiralerContribution {
    /// Spiraler class the method lands on, e.g. `RustAndroidSpiraler`.
    pub spiraler: String,
    pub method: String,
    #[serde(default)]
    pub return_type: Option<String>,
    #[serde(default)]
    pub options_type: Option<String>,
}

/// Userland callbacks. Declarative treadles cannot carry these.
pub type DataFn =
    Arc<dyn Fn(&GenerationTask, &MethodHelpers) -> anyhow::Result<Value> + Send + Sync>;
pub type ValidateFn = Arc<dyn Fn(&GenerationTask) -> bool + Send + Sync>;
pub type TransformFn =
    Arc<dyn Fn(Vec<MgmtMethod>, &GenerationTask) -> Vec<MgmtMethod> + Send + Sync>;
pub type HookupBuilderFn =
    Arc<dyn Fn(&GenerationTask, &Value) -> anyhow::Result<Vec<(PathBuf, HookupSpec)>> + Send + Sync>;

/// Hookup clause: fixed specs or a builder computing them from the task.
#[derive(Clone)]
pub enum HookupClause {
    Specs(Vec<(String, HookupSpec)>),
    Custom(HookupBuilderFn),
}

impl std::fmt::Debug for HookupClause {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HookupClause::Specs(specs) => f.debug_tuple("Specs").field(&specs.len()).finish(),
            HookupClause::Custom(_) => f.write_str("Custom(..)"),
        }
    }
}

/// A declarative generator.
#[derive(Clone)]
pub struct TreadleDefinition {
    pub name: String,
    pub matches: Vec<MatchPair>,
    pub methods: MethodSpec,
    pub outputs: Vec<OutputSpec>,
    pub hookup: Option<HookupClause>,
    pub data: Option<DataFn>,
    pub validate: Option<ValidateFn>,
    pub transform_methods: Option<TransformFn>,
    /// Methods this treadle contributes to spiraler surfaces.
    pub contributions: Vec<SpiralerContribution>,
}

impl std::fmt::Debug for TreadleDefinition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TreadleDefinition")
            .field("name", &self.name)
            .field("matches", &self.matches)
            .field("outputs", &self.outputs.len())
            .finish()
    }
}

impl TreadleDefinition {
    pub fn new(name: &str, methods: MethodSpec) -> Self {
        Self {
            name: name.to_string(),
            matches: Vec::new(),
            methods,
            outputs: Vec::new(),
            hookup: None,
            data: None,
            validate: None,
            transform_methods: None,
            contributions: Vec::new(),
        }
    }

    pub fn contribution(mut self, contribution: SpiralerContribution) -> Self {
        self.contributions.push(contribution);
        self
    }

    pub fn matching(mut self, current: &str, previous: &str) -> Self {
        self.matches.push(MatchPair::new(current, previous));
        self
    }

    pub fn output(mut self, output: OutputSpec) -> Self {
        self.outputs.push(output);
        self
    }

    pub fn hookup(mut self, clause: HookupClause) -> Self {
        self.hookup = Some(clause);
        self
    }

    pub fn data_fn(mut self, data: DataFn) -> Self {
        self.data = Some(data);
        self
    }

    pub fn validate_fn(mut self, validate: ValidateFn) -> Self {
        self.validate = Some(validate);
        self
    }

    pub fn transform_fn(mut self, transform: TransformFn) -> Self {
        self.transform_methods = Some(transform);
        self
    }

    pub fn validate_shape(&self) -> Result<()> {
        if self.name.is_empty() {
            return Err(LoomError::Config("treadle without a name".into()));
        }
        if self.matches.is_empty() && self.outputs.is_empty() {
            return Err(LoomError::Config(format!(
                "treadle '{}' declares neither matches nor outputs",
                self.name
            )));
        }
        Ok(())
    }
}

/// The serde shape of a YAML user treadle.
#[derive(Debug, Deserialize)]
struct DeclarativeTreadle {
    name: String,
    matches: Vec<MatchPair>,
    methods: MethodSpec,
    outputs: Vec<OutputSpec>,
    /// Sibling contributions, `<base>Contributions` in the host convention.
    #[serde(default)]
    contributions: Vec<SpiralerContribution>,
}

impl From<DeclarativeTreadle> for TreadleDefinition {
    fn from(decl: DeclarativeTreadle) -> Self {
        Self {
            name: decl.name,
            matches: decl.matches,
            methods: decl.methods,
            outputs: decl.outputs,
            hookup: None,
            data: None,
            validate: None,
            transform_methods: None,
            contributions: decl.contributions,
        }
    }
}

/// Method-shape helpers exposed to data builders and templates.
#[derive(Debug, Clone, Default)]
pub struct MethodHelpers {
    methods: Vec<MgmtMethod>,
}

impl MethodHelpers {
    pub fn new(methods: Vec<MgmtMethod>) -> Self {
        Self { methods }
    }

    pub fn all(&self) -> &[MgmtMethod] {
        &self.methods
    }

    pub fn is_empty(&self) -> bool {
        self.methods.is_empty()
    }

    /// Methods grouped by management, preserving first-encounter order.
    pub fn by_management(&self) -> Vec<(String, Vec<MgmtMethod>)> {
        let mut grouped: Vec<(String, Vec<MgmtMethod>)> = Vec::new();
        for method in &self.methods {
            match grouped.iter_mut().find(|(name, _)| *name == method.management_name) {
                Some((_, list)) => list.push(method.clone()),
                None => grouped.push((method.management_name.clone(), vec![method.clone()])),
            }
        }
        grouped
    }

    /// Methods grouped by CRUD operation.
    pub fn by_crud(&self) -> BTreeMap<CrudOp, Vec<MgmtMethod>> {
        let mut grouped: BTreeMap<CrudOp, Vec<MgmtMethod>> = BTreeMap::new();
        for method in &self.methods {
            if let Some(op) = method.crud_operation {
                grouped.entry(op).or_default().push(method.clone());
            }
        }
        grouped
    }

    pub fn with_tag(&self, tag: &str) -> Vec<MgmtMethod> {
        self.methods
            .iter()
            .filter(|m| m.tags.iter().any(|t| t == tag))
            .cloned()
            .collect()
    }

    fn with_op(&self, op: CrudOp) -> Vec<MgmtMethod> {
        self.methods
            .iter()
            .filter(|m| m.crud_operation == Some(op))
            .cloned()
            .collect()
    }

    pub fn creates(&self) -> Vec<MgmtMethod> {
        self.with_op(CrudOp::Create)
    }

    pub fn reads(&self) -> Vec<MgmtMethod> {
        self.with_op(CrudOp::Read)
    }

    pub fn updates(&self) -> Vec<MgmtMethod> {
        self.with_op(CrudOp::Update)
    }

    pub fn deletes(&self) -> Vec<MgmtMethod> {
        self.with_op(CrudOp::Delete)
    }

    pub fn lists(&self) -> Vec<MgmtMethod> {
        self.with_op(CrudOp::List)
    }

    /// The method list as a JSON array for template data records.
    pub fn to_value(&self) -> Value {
        serde_json::to_value(&self.methods).unwrap_or(Value::Array(Vec::new()))
    }
}

/// Outcome of one rendered output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FileOutcome {
    Generated,
    Unchanged,
}

/// Per-task execution report.
#[derive(Debug, Default)]
pub struct TaskReport {
    pub treadle: Option<String>,
    pub skipped: bool,
    pub files: Vec<(PathBuf, FileOutcome)>,
    pub hookups: Vec<HookupResult>,
    pub errors: Vec<String>,
}

impl TaskReport {
    fn skipped_silently() -> Self {
        Self {
            skipped: true,
            ..Default::default()
        }
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
            || self
                .hookups
                .iter()
                .any(|h| h.status == HookupStatus::Error)
    }
}

/// Substitute `{placeholder}` keys from the data record into a path
/// pattern. Unknown placeholders are a render error.
pub fn resolve_path_pattern(pattern: &str, data: &Value) -> Result<PathBuf> {
    let mut out = String::with_capacity(pattern.len());
    let mut rest = pattern;
    while let Some(open) = rest.find('{') {
        out.push_str(&rest[..open]);
        let after = &rest[open + 1..];
        let close = after.find('}').ok_or_else(|| LoomError::Render {
            template: pattern.to_string(),
            message: "unterminated '{' in path pattern".to_string(),
        })?;
        let key = &after[..close];
        let value = data.get(key).ok_or_else(|| LoomError::Render {
            template: pattern.to_string(),
            message: format!("unknown path placeholder '{{{}}}'", key),
        })?;
        match value {
            Value::String(s) => out.push_str(s),
            Value::Number(n) => out.push_str(&n.to_string()),
            _ => {
                return Err(LoomError::Render {
                    template: pattern.to_string(),
                    message: format!("path placeholder '{{{}}}' is not a scalar", key),
                })
            }
        }
        rest = &after[close + 1..];
    }
    out.push_str(rest);
    Ok(PathBuf::from(out))
}

/// The treadle registry plus everything task execution needs.
pub struct TreadleKit {
    /// Registration order, built-ins first; user entries override on key.
    registered: Vec<(Arc<TreadleDefinition>, bool)>,
    by_name: HashMap<String, Arc<TreadleDefinition>>,
    template_source: TemplateSource,
    /// Output root for relative output paths.
    pub output_root: PathBuf,
}

impl TreadleKit {
    pub fn new(template_source: TemplateSource, output_root: impl Into<PathBuf>) -> Self {
        Self {
            registered: Vec::new(),
            by_name: HashMap::new(),
            template_source,
            output_root: output_root.into(),
        }
    }

    /// Register the compiled-in treadles.
    pub fn with_builtins(mut self) -> Self {
        for definition in crate::treadles::builtins() {
            self.register_internal(definition, false);
        }
        self
    }

    /// Register a user treadle; same-key matches override built-ins.
    pub fn register(&mut self, definition: TreadleDefinition) -> Result<()> {
        definition.validate_shape()?;
        self.register_internal(definition, true);
        Ok(())
    }

    fn register_internal(&mut self, definition: TreadleDefinition, user: bool) {
        let definition = Arc::new(definition);
        self.by_name
            .insert(definition.name.clone(), definition.clone());
        self.registered.push((definition, user));
    }

    /// Scan a directory for declarative user treadles (`*.yaml`).
    ///
    /// Test files and index files are skipped; an unreadable or ill-formed
    /// file is skipped with a warning, per the discovery error contract.
    pub fn discover_user_treadles(&mut self, dir: &Path) -> usize {
        let mut found = 0;
        let entries = match std::fs::read_dir(dir) {
            Ok(entries) => entries,
            Err(_) => return 0,
        };
        let mut paths: Vec<PathBuf> = entries
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| {
                let name = p.file_name().and_then(|n| n.to_str()).unwrap_or("");
                (name.ends_with(".yaml") || name.ends_with(".yml"))
                    && !name.contains(".test.")
                    && !name.starts_with("index.")
            })
            .collect();
        paths.sort();

        for path in paths {
            let content = match std::fs::read_to_string(&path) {
                Ok(content) => content,
                Err(err) => {
                    warn!(path = %path.display(), error = %err, "skipping unreadable treadle file");
                    continue;
                }
            };
            match serde_yaml::from_str::<DeclarativeTreadle>(&content) {
                Ok(decl) => {
                    info!(path = %path.display(), treadle = %decl.name, "discovered user treadle");
                    self.register_internal(decl.into(), true);
                    found += 1;
                }
                Err(err) => {
                    warn!(path = %path.display(), error = %err, "skipping ill-formed treadle file");
                }
            }
        }
        found
    }

    /// Compose the generation matrix. Built-ins register first; user
    /// treadles with the same key override them.
    pub fn matrix(&self) -> GeneratorMatrix {
        let mut matrix = GeneratorMatrix::new();
        for user_pass in [false, true] {
            for (definition, user) in &self.registered {
                if *user != user_pass {
                    continue;
                }
                for pair in &definition.matches {
                    matrix.insert(
                        (pair.current.clone(), pair.previous.clone()),
                        definition.name.clone(),
                    );
                }
            }
        }
        matrix
    }

    pub fn by_name(&self, name: &str) -> Option<Arc<TreadleDefinition>> {
        self.by_name.get(name).cloned()
    }

    /// Every contribution registered for a spiraler class, across all
    /// treadles, in registration order.
    pub fn contributions_for(&self, spiraler: &str) -> Vec<SpiralerContribution> {
        self.registered
            .iter()
            .flat_map(|(definition, _)| definition.contributions.iter())
            .filter(|c| c.spiraler == spiraler)
            .cloned()
            .collect()
    }

    /// Resolve the generator for a task: tie-up tasks carry their own,
    /// matrix tasks resolve through the composed matrix.
    pub fn generator_for(&self, task: &GenerationTask) -> Option<Arc<TreadleDefinition>> {
        if let Some(name) = &task.generator {
            return self.by_name(name);
        }
        let matrix = self.matrix();
        matrix.get(&task.match_key()).and_then(|n| self.by_name(n))
    }

    /// Collect and shape the methods for a definition.
    pub fn collect_methods(
        &self,
        definition: &TreadleDefinition,
        plan: &WeavingPlan,
        task: &GenerationTask,
    ) -> Vec<MgmtMethod> {
        let min_reach = definition.methods.filter.min_reach();
        let raw: Vec<MgmtMethod> = plan
            .managements
            .iter()
            .filter(|e| e.management.reach >= min_reach)
            .flat_map(|e| e.methods.iter().cloned())
            .collect();

        let mut pipeline = MethodPipeline::new();
        for step in &definition.methods.pipeline {
            pipeline = pipeline.translate(step.to_translation());
        }
        let mut methods = pipeline.process(raw);

        if let Some(transform) = &definition.transform_methods {
            methods = transform(methods, task);
        }

        // Last-second filters, right before rendering.
        if !definition.methods.drop_tags.is_empty() {
            let drop: Vec<&str> = definition.methods.drop_tags.iter().map(|s| s.as_str()).collect();
            methods = MethodPipeline::filter(methods, tag_filter(&drop));
        }
        if let Some(ops) = &definition.methods.only_operations {
            methods = MethodPipeline::filter(methods, crud_operation_filter(ops));
        }
        methods
    }

    /// Static decision keys merged with the treadle's data callback. Case
    /// variants are precomputed because path patterns cannot run filters.
    fn base_data(task: &GenerationTask, helpers: &MethodHelpers) -> Value {
        use crate::render::{pascal_case, snake_case};
        let current = &task.current;
        let previous = &task.previous;
        let package = previous.ring.package();
        json!({
            "currentType": current.type_name,
            "previousType": previous.type_name,
            "exportName": task.export_name,
            "name": current.export_name,
            "nameSnake": snake_case(&current.export_name),
            "namePascal": pascal_case(&current.export_name),
            "coreName": previous.export_name,
            "coreNameSnake": snake_case(&previous.export_name),
            "coreNamePascal": pascal_case(&previous.export_name),
            "packageName": package.package_name,
            "packageDir": package.package_path.as_ref().map(|p| p.display().to_string()),
            "language": package.language,
            "methods": helpers.to_value(),
        })
    }

    fn merge_data(base: &mut Value, extra: Value) {
        if let (Some(base_map), Value::Object(extra_map)) = (base.as_object_mut(), extra) {
            for (key, value) in extra_map {
                base_map.insert(key, value);
            }
        }
    }

    /// Execute one generation task through its phases: validate, collect,
    /// build data, render outputs, hookup.
    #[instrument(skip_all, fields(task = %task.export_name))]
    pub async fn execute_task(
        &self,
        task: &GenerationTask,
        plan: &WeavingPlan,
        registry: &mut BlockRegistry,
    ) -> TaskReport {
        let Some(definition) = self.generator_for(task) else {
            debug!("no generator for task; skipping");
            return TaskReport::skipped_silently();
        };

        // Phase 1: validate. Matrix tasks must occur in the definition's
        // matches; tie-up tasks carry their generator explicitly.
        if task.generator.is_none() {
            let key = task.match_key();
            let matched = definition
                .matches
                .iter()
                .any(|p| p.current == key.0 && p.previous == key.1);
            if !matched {
                return TaskReport::skipped_silently();
            }
        }
        if let Some(validate) = &definition.validate {
            if !validate(task) {
                debug!(treadle = %definition.name, "validate declined task");
                return TaskReport::skipped_silently();
            }
        }

        let mut report = TaskReport {
            treadle: Some(definition.name.clone()),
            ..Default::default()
        };

        // Phase 2: collect methods.
        let methods = self.collect_methods(&definition, plan, task);
        let helpers = MethodHelpers::new(methods);

        // Phase 3: build data.
        let mut data = Self::base_data(task, &helpers);
        if let Some(config) = &task.config {
            Self::merge_data(&mut data, config.clone());
        }
        if let Some(data_fn) = &definition.data {
            match data_fn(task, &helpers) {
                Ok(extra) => Self::merge_data(&mut data, extra),
                Err(err) => {
                    report.errors.push(format!("data callback failed: {}", err));
                    return report;
                }
            }
        }

        // Phase 4: render outputs in declaration order.
        for output in &definition.outputs {
            let proceed = match &output.condition {
                OutputCondition::Always => true,
                OutputCondition::RequiresMethods => !helpers.is_empty(),
                OutputCondition::KeyPresent(key) => data
                    .get(key)
                    .map(|v| !v.is_null() && v.as_bool() != Some(false))
                    .unwrap_or(false),
            };
            if !proceed {
                debug!(template = %output.template, "output condition not met");
                continue;
            }

            let mut output_data = data.clone();
            if let Some(context) = &output.context {
                Self::merge_data(&mut output_data, context.clone());
            }

            let rendered = match self
                .template_source
                .load(Path::new(&output.template))
                .await
            {
                Ok(source) => {
                    render_template(&output.template, &source, &output_data, output.language)
                }
                Err(err) => Err(err),
            };
            let rendered = match rendered {
                Ok(rendered) => rendered,
                Err(err) => {
                    // Per-output failure; other outputs proceed.
                    report.errors.push(err.to_string());
                    continue;
                }
            };

            let relative = match resolve_path_pattern(&output.path, &output_data) {
                Ok(path) => path,
                Err(err) => {
                    report.errors.push(err.to_string());
                    continue;
                }
            };
            let target = if relative.is_absolute() {
                relative
            } else {
                self.output_root.join(relative)
            };

            let existing = tokio::fs::read_to_string(&target).await.ok();
            if existing.as_deref() == Some(rendered.as_str()) {
                report.files.push((target, FileOutcome::Unchanged));
                continue;
            }
            if let Some(parent) = target.parent() {
                if let Err(err) = tokio::fs::create_dir_all(parent).await {
                    report.errors.push(LoomError::io(parent, err).to_string());
                    continue;
                }
            }
            match tokio::fs::write(&target, rendered.as_bytes()).await {
                Ok(()) => {
                    info!(path = %target.display(), "generated");
                    report.files.push((target, FileOutcome::Generated));
                }
                Err(err) => report.errors.push(LoomError::io(&target, err).to_string()),
            }
        }

        // Phase 5: hookups, after all outputs of the task.
        if let Some(clause) = &definition.hookup {
            let specs: Vec<(PathBuf, HookupSpec)> = match clause {
                HookupClause::Specs(specs) => {
                    let mut resolved = Vec::new();
                    for (pattern, spec) in specs {
                        match resolve_path_pattern(pattern, &data) {
                            Ok(path) => resolved.push((path, spec.clone())),
                            Err(err) => report.errors.push(err.to_string()),
                        }
                    }
                    resolved
                }
                HookupClause::Custom(builder) => match builder(task, &data) {
                    Ok(specs) => specs,
                    Err(err) => {
                        report.errors.push(format!("hookup builder failed: {}", err));
                        Vec::new()
                    }
                },
            };
            if !specs.is_empty() {
                let mut ctx = HookupContext::new(&self.output_root).with_registry(registry);
                report.hookups = apply_hookups(&specs, &mut ctx);
            }
        }

        report
    }
}
