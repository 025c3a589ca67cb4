//! Predefined workflows shipped with the binary.

use std::sync::Arc;

use once_cell::sync::Lazy;

use super::definition::WorkflowDefinition;

/// Name of the workflow used when none is selected or loading fails.
pub const DEFAULT_WORKFLOW: &str = "waterfall";

/// Bundled workflow sources, keyed by name.
const BUNDLED: &[(&str, &str)] = &[
    ("waterfall", include_str!("../../resources/workflows/waterfall.yaml")),
    ("epcc", include_str!("../../resources/workflows/epcc.yaml")),
    ("bugfix", include_str!("../../resources/workflows/bugfix.yaml")),
    ("minor", include_str!("../../resources/workflows/minor.yaml")),
];

static DEFAULT_DEFINITION: Lazy<Arc<WorkflowDefinition>> = Lazy::new(|| {
    let source = bundled_source(DEFAULT_WORKFLOW).expect("default workflow is bundled");
    Arc::new(WorkflowDefinition::from_yaml(source).expect("bundled default workflow is valid"))
});

/// Names of all bundled workflows.
pub fn bundled_names() -> impl Iterator<Item = &'static str> {
    BUNDLED.iter().map(|(name, _)| *name)
}

/// Raw YAML of a bundled workflow.
pub fn bundled_source(name: &str) -> Option<&'static str> {
    BUNDLED.iter().find(|(n, _)| *n == name).map(|(_, src)| *src)
}

/// The bundled default definition.
pub fn default_definition() -> Arc<WorkflowDefinition> {
    Arc::clone(&DEFAULT_DEFINITION)
}
