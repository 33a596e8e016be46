//! Standard component library
//!
//! Collection of built-in components for common stream operations

mod debug;
mod merge;
mod sink;
mod source;
mod time;
mod transform;

pub use debug::Logger;
pub use merge::Merge;
pub use sink::{Collector, CollectorHandle};
pub use source::Source;
pub use time::Delay;
pub use transform::{Filter, JsonParse, JsonStringify, Map};

/// Descriptive entry for one standard component
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComponentInfo {
    pub component_type: &'static str,
    pub category: &'static str,
    pub description: &'static str,
}

/// Every component shipped by this crate
pub fn catalog() -> Vec<ComponentInfo> {
    vec![
        ComponentInfo {
            component_type: source::COMPONENT_TYPE,
            category: "core",
            description: "Emits a fixed sequence of values, then closes its output",
        },
        ComponentInfo {
            component_type: sink::COMPONENT_TYPE,
            category: "core",
            description: "Gathers every received value behind a shared handle",
        },
        ComponentInfo {
            component_type: merge::COMPONENT_TYPE,
            category: "core",
            description: "Interleaves several inputs onto one output",
        },
        ComponentInfo {
            component_type: transform::MAP_TYPE,
            category: "transform",
            description: "Applies a function to each value",
        },
        ComponentInfo {
            component_type: transform::FILTER_TYPE,
            category: "transform",
            description: "Forwards only values matching a predicate",
        },
        ComponentInfo {
            component_type: transform::JSON_PARSE_TYPE,
            category: "transform",
            description: "Parse JSON strings",
        },
        ComponentInfo {
            component_type: transform::JSON_STRINGIFY_TYPE,
            category: "transform",
            description: "Convert values to JSON strings",
        },
        ComponentInfo {
            component_type: debug::COMPONENT_TYPE,
            category: "debug",
            description: "Logs each value and forwards it unchanged",
        },
        ComponentInfo {
            component_type: time::COMPONENT_TYPE,
            category: "time",
            description: "Forwards each value after a fixed delay",
        },
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn catalog_types_are_unique() {
        let entries = catalog();
        let types: HashSet<_> = entries.iter().map(|info| info.component_type).collect();
        assert_eq!(types.len(), entries.len());
        assert!(types.contains("core.merge"));
    }
}
