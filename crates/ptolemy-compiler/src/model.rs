//! Model compiler.

use ptolemy_core::{CompiledField, CompiledModel, ModelSet, Presence};
use tracing::debug;

use crate::error::{CompileError, CompileResult};
use crate::resolver::order_models;
use crate::spec::ApiSpecification;
use crate::types::map_property;

/// Compiles every model of a document, in dependency order.
///
/// Parent fields come first in each model; a property redeclared by the
/// child replaces the inherited one in place.
pub fn compile_models(spec: &ApiSpecification) -> CompileResult<ModelSet> {
    let defs = spec.models();
    let known: Vec<&str> = defs.keys().map(String::as_str).collect();
    let order = order_models(defs)?;
    let mut set = ModelSet::new(spec.name());

    for name in &order {
        let Some(doc) = defs.get(name) else {
            continue;
        };
        let mut model = CompiledModel::new(name.as_str(), spec.name());

        if let Some(parent_name) = doc.parent_name() {
            let parent = set.get(parent_name).ok_or_else(|| CompileError::InvalidParent {
                model: name.clone(),
                parent: parent_name.to_string(),
            })?;
            model = model.with_parent(parent);
        }

        for (prop_name, prop) in &doc.properties {
            let context = format!("{name}.{prop_name}");
            let ty = map_property(prop, &known, &context)?;
            let presence = Presence::from_flags(prop.mandatory, prop.nullable);
            let mut field = CompiledField::new(prop_name.as_str(), ty, presence);
            if let Some(description) = &prop.description {
                field = field.with_description(description.as_str());
            }
            model = model.with_field(field);
        }

        debug!(
            api = %spec.name(),
            model = %name,
            fields = model.fields().len(),
            parent = model.parent().unwrap_or("-"),
            "compiled model"
        );
        set.insert(model);
    }

    Ok(set)
}
