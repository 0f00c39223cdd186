//! `ddd` - domain-driven aggregate scaffolding, usually attached via tie-up
//!
//! Tie-up tasks carry the aggregate name in their warp data; the matrix
//! match covers the explicit DddSpiraler wrap as well.

use std::sync::Arc;

use serde_json::json;

use crate::treadle::{
    MatchPair, MethodSpec, OutputCondition, OutputSpec, PipelineStep, TreadleDefinition,
};

pub fn definition() -> TreadleDefinition {
    TreadleDefinition {
        name: "ddd".to_string(),
        matches: vec![MatchPair::new("DddSpiraler", "RustCore")],
        methods: MethodSpec::core().step(PipelineStep::ManagementPrefix),
        outputs: vec![OutputSpec {
            template: "ddd/aggregate.rs.ejs".to_string(),
            path: "spire/{coreNameSnake}/{aggregateSnake}.rs".to_string(),
            language: Some(crate::marker::MarkerLanguage::Rust),
            condition: OutputCondition::KeyPresent("aggregate".to_string()),
            context: None,
        }],
        data: Some(Arc::new(|task, _helpers| {
            // The aggregate name travels in the tie-up's warp data.
            let aggregate = task
                .config
                .as_ref()
                .and_then(|c| c.get("aggregate"))
                .and_then(|v| v.as_str())
                .unwrap_or_default()
                .to_string();
            if aggregate.is_empty() {
                return Ok(json!({}));
            }
            Ok(json!({
                "aggregate": aggregate,
                "aggregateSnake": crate::render::snake_case(&aggregate),
                "aggregatePascal": crate::render::pascal_case(&aggregate),
            }))
        })),
        validate: None,
        transform_methods: None,
        contributions: Vec::new(),
        hookup: None,
    }
}
