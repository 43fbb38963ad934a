//! Dependency ordering of model declarations.
//!
//! A model depends on every model it references through a property or a
//! collection element, and on its parent. A collection of itself is not a
//! dependency; a plain property of its own type is, and fails as a cycle.

use indexmap::{IndexMap, IndexSet};
use tracing::debug;

use crate::document::ModelDoc;
use crate::error::{CompileError, CompileResult};
use crate::types::dependency_of;

/// Direct dependencies of every model, in declaration order.
pub fn dependencies(
    models: &IndexMap<String, ModelDoc>,
) -> CompileResult<IndexMap<String, IndexSet<String>>> {
    let known: Vec<&str> = models.keys().map(String::as_str).collect();
    let mut deps = IndexMap::with_capacity(models.len());

    for (name, model) in models {
        let mut own = IndexSet::new();
        if let Some(parent) = model.parent_name() {
            if !known.contains(&parent) {
                return Err(CompileError::InvalidParent {
                    model: name.clone(),
                    parent: parent.to_string(),
                });
            }
            own.insert(parent.to_string());
        }
        for prop in model.properties.values() {
            if let Some((dep, in_collection)) = dependency_of(prop, &known) {
                if in_collection && dep == *name {
                    continue;
                }
                own.insert(dep);
            }
        }
        deps.insert(name.clone(), own);
    }
    Ok(deps)
}

/// Orders models so that every model comes after its dependencies.
///
/// Each pass walks the remaining models in declaration order and orders
/// those whose dependencies are all ordered. A pass that orders nothing
/// means the rest form a cycle.
pub fn order_models(models: &IndexMap<String, ModelDoc>) -> CompileResult<Vec<String>> {
    let mut remaining = dependencies(models)?;
    let mut ordered: IndexSet<String> = IndexSet::with_capacity(models.len());
    let mut pass = 0_usize;

    while !remaining.is_empty() {
        pass += 1;
        let before = ordered.len();
        let names: Vec<String> = remaining.keys().cloned().collect();
        for name in names {
            let ready = remaining
                .get(&name)
                .is_some_and(|deps| deps.iter().all(|d| ordered.contains(d)));
            if ready {
                remaining.shift_remove(&name);
                ordered.insert(name);
            }
        }
        if ordered.len() == before {
            return Err(CompileError::CyclicDependency {
                models: remaining.keys().cloned().collect(),
            });
        }
    }

    debug!(models = ordered.len(), passes = pass, "models ordered");
    Ok(ordered.into_iter().collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn models(yaml: &str) -> IndexMap<String, ModelDoc> {
        serde_yaml::from_str(yaml).unwrap()
    }

    fn position(order: &[String], name: &str) -> usize {
        order.iter().position(|n| n == name).unwrap()
    }

    #[test]
    fn test_referenced_models_come_first() {
        let defs = models(
            r##"
Order:
  properties:
    customer: {$ref: "#/definitions/Customer"}
    lines: {type: array, items: {$ref: "#/definitions/Line"}}
Line:
  properties:
    product: {$ref: "#/definitions/Product"}
Customer:
  properties:
    name: {type: string}
Product:
  properties:
    sku: {type: string}
"##,
        );
        let order = order_models(&defs).unwrap();
        assert_eq!(order.len(), 4);
        assert!(position(&order, "Customer") < position(&order, "Order"));
        assert!(position(&order, "Line") < position(&order, "Order"));
        assert!(position(&order, "Product") < position(&order, "Line"));
    }

    #[test]
    fn test_declaration_order_within_a_pass() {
        let defs = models(
            r"
B: {properties: {x: {type: string}}}
A: {properties: {x: {type: string}}}
C: {properties: {x: {type: string}}}
",
        );
        assert_eq!(order_models(&defs).unwrap(), vec!["B", "A", "C"]);
    }

    #[test]
    fn test_collection_self_reference_is_allowed() {
        let defs = models(
            r##"
Node:
  properties:
    children: {type: array, items: {$ref: "#/definitions/Node"}}
"##,
        );
        assert_eq!(order_models(&defs).unwrap(), vec!["Node"]);
    }

    #[test]
    fn test_plain_self_reference_is_a_cycle() {
        let defs = models(
            r##"
Node:
  properties:
    next: {$ref: "#/definitions/Node"}
"##,
        );
        let err = order_models(&defs).unwrap_err();
        assert!(matches!(err, CompileError::CyclicDependency { ref models } if models == &["Node"]));
    }

    #[test]
    fn test_mutual_cycle_lists_remaining_models() {
        let defs = models(
            r##"
Free: {properties: {x: {type: string}}}
A: {properties: {b: {$ref: "#/definitions/B"}}}
B: {properties: {a: {$ref: "#/definitions/A"}}}
"##,
        );
        match order_models(&defs).unwrap_err() {
            CompileError::CyclicDependency { models } => assert_eq!(models, vec!["A", "B"]),
            other => panic!("unexpected error {other}"),
        }
    }

    #[test]
    fn test_nested_collection_is_a_dependency() {
        let defs = models(
            r##"
Board:
  properties:
    grid: {type: array, items: {type: array, items: {$ref: "#/definitions/Cell"}}}
Cell:
  properties:
    mark: {type: string}
"##,
        );
        assert_eq!(order_models(&defs).unwrap(), vec!["Cell", "Board"]);
    }

    #[test]
    fn test_cycle_through_nested_collection_fails() {
        let defs = models(
            r##"
A:
  properties:
    grid: {type: array, items: {type: array, items: {$ref: "#/definitions/B"}}}
B:
  properties:
    a: {$ref: "#/definitions/A"}
"##,
        );
        match order_models(&defs).unwrap_err() {
            CompileError::CyclicDependency { models } => assert_eq!(models, vec!["A", "B"]),
            other => panic!("unexpected error {other}"),
        }
    }

    #[test]
    fn test_nested_collection_of_itself_is_allowed() {
        let defs = models(
            r##"
Tree:
  properties:
    levels: {type: array, items: {type: array, items: {$ref: "#/definitions/Tree"}}}
"##,
        );
        assert_eq!(order_models(&defs).unwrap(), vec!["Tree"]);
    }

    #[test]
    fn test_parent_is_a_dependency() {
        let defs = models(
            r"
Dog: {x-parent: zoo.Animal, properties: {bark: {type: boolean}}}
Animal: {properties: {name: {type: string}}}
",
        );
        assert_eq!(order_models(&defs).unwrap(), vec!["Animal", "Dog"]);
    }

    #[test]
    fn test_cyclic_inheritance_fails() {
        let defs = models(
            r"
A: {x-parent: m.B, properties: {}}
B: {x-parent: m.A, properties: {}}
",
        );
        assert!(matches!(
            order_models(&defs),
            Err(CompileError::CyclicDependency { .. })
        ));
    }

    #[test]
    fn test_unknown_parent() {
        let defs = models("A: {x-parent: m.Ghost, properties: {}}\n");
        assert!(matches!(
            order_models(&defs),
            Err(CompileError::InvalidParent { .. })
        ));
    }
}
