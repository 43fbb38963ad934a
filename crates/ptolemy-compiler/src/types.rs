//! Type mapper: schema tokens to [`TargetType`].

use ptolemy_core::TargetType;

use crate::document::{enum_value_to_string, PropertyDoc};
use crate::error::{CompileError, CompileResult};

const DEFINITIONS_PREFIX: &str = "#/definitions/";

/// Maps a `type` or `format` token to a target type.
///
/// Primitive tokens win; anything else must be one of `known` models.
///
/// ```
/// use ptolemy_compiler::types::map_token;
/// use ptolemy_core::TargetType;
///
/// assert_eq!(map_token("int64", &[], "Item.id").unwrap(), TargetType::Integer);
/// assert_eq!(map_token("Pet", &["Pet"], "Owner.pet").unwrap(), TargetType::Model("Pet".into()));
/// assert!(map_token("Ghost", &["Pet"], "Owner.pet").is_err());
/// ```
pub fn map_token(token: &str, known: &[&str], context: &str) -> CompileResult<TargetType> {
    let ty = match token {
        "boolean" => TargetType::Bool,
        "integer" | "int32" | "int64" => TargetType::Integer,
        "number" | "float" | "double" => TargetType::Number,
        "string" => TargetType::String,
        "date" | "datetime" | "date-time" | "iso-date" => TargetType::Timestamp,
        other if known.contains(&other) => TargetType::Model(other.to_string()),
        other => {
            return Err(CompileError::UnknownType {
                token: other.to_string(),
                context: context.to_string(),
            })
        }
    };
    Ok(ty)
}

/// Extracts the model name from a `#/definitions/<Name>` reference.
pub fn ref_to_model_name(reference: &str, context: &str) -> CompileResult<String> {
    let unresolved = || CompileError::UnresolvedReference {
        reference: reference.to_string(),
        context: context.to_string(),
    };
    let name = reference
        .trim()
        .strip_prefix(DEFINITIONS_PREFIX)
        .ok_or_else(unresolved)?
        .rsplit('/')
        .next()
        .map(|s| s.trim_matches(|c| c == '\'' || c == '"').trim())
        .filter(|s| !s.is_empty())
        .ok_or_else(unresolved)?;
    Ok(name.to_string())
}

/// Resolves a `$ref` against the known models.
pub fn resolve_ref(reference: &str, known: &[&str], context: &str) -> CompileResult<String> {
    let name = ref_to_model_name(reference, context)?;
    if known.contains(&name.as_str()) {
        Ok(name)
    } else {
        Err(CompileError::UnresolvedReference {
            reference: reference.to_string(),
            context: context.to_string(),
        })
    }
}

/// Maps a property declaration.
///
/// Arrays map to collections of their `items`. Otherwise precedence is
/// `$ref`, then `enum`, then `format`, then `type`.
pub fn map_property(prop: &PropertyDoc, known: &[&str], context: &str) -> CompileResult<TargetType> {
    if prop.is_array() {
        let items = prop.items.as_deref().ok_or_else(|| CompileError::UnknownType {
            token: "array without items".to_string(),
            context: context.to_string(),
        })?;
        let inner = map_property(items, known, context)?;
        return Ok(TargetType::Collection(Box::new(inner)));
    }

    if let Some(reference) = &prop.reference {
        return resolve_ref(reference, known, context).map(TargetType::Model);
    }

    if let Some(values) = &prop.values {
        return Ok(TargetType::Enum(values.iter().map(enum_value_to_string).collect()));
    }

    match prop.format.as_deref().or(prop.ty.as_deref()) {
        Some(token) => map_token(token, known, context),
        None => Err(CompileError::UnknownType {
            token: "<none>".to_string(),
            context: context.to_string(),
        }),
    }
}

/// Returns the model a property depends on, and whether the dependency goes
/// through a collection.
///
/// Does not validate anything: unknown tokens are simply not dependencies.
pub(crate) fn dependency_of(prop: &PropertyDoc, known: &[&str]) -> Option<(String, bool)> {
    if prop.is_array() {
        let (name, _) = dependency_of(prop.items.as_deref()?, known)?;
        return Some((name, true));
    }

    if let Some(reference) = &prop.reference {
        return ref_to_model_name(reference, "")
            .ok()
            .filter(|name| known.contains(&name.as_str()))
            .map(|name| (name, false));
    }
    if prop.values.is_some() {
        return None;
    }
    prop.format
        .as_deref()
        .or(prop.ty.as_deref())
        .filter(|token| known.contains(token))
        .map(|token| (token.to_string(), false))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn prop(yaml: &str) -> PropertyDoc {
        serde_yaml::from_str(yaml).unwrap()
    }

    #[test]
    fn test_primitive_table() {
        for (token, expected) in [
            ("boolean", TargetType::Bool),
            ("int32", TargetType::Integer),
            ("double", TargetType::Number),
            ("string", TargetType::String),
            ("iso-date", TargetType::Timestamp),
            ("date-time", TargetType::Timestamp),
        ] {
            assert_eq!(map_token(token, &[], "t").unwrap(), expected, "token {token}");
        }
    }

    #[test]
    fn test_unknown_type() {
        let err = map_token("email", &[], "User.contact").unwrap_err();
        assert_eq!(
            err.to_string(),
            "unknown type 'email' in User.contact"
        );
    }

    #[test]
    fn test_format_wins_over_type() {
        let ty = map_property(&prop("{type: string, format: date-time}"), &[], "x").unwrap();
        assert_eq!(ty, TargetType::Timestamp);
    }

    #[test]
    fn test_ref_wins_over_everything() {
        let ty = map_property(
            &prop("{$ref: '#/definitions/Pet', type: string}"),
            &["Pet"],
            "x",
        )
        .unwrap();
        assert_eq!(ty, TargetType::Model("Pet".to_string()));
    }

    #[test]
    fn test_enum() {
        let ty = map_property(&prop("{type: string, enum: [on, off, 3]}"), &[], "x").unwrap();
        assert_eq!(
            ty,
            TargetType::Enum(vec!["on".into(), "off".into(), "3".into()])
        );
    }

    #[test]
    fn test_array_of_models() {
        let ty = map_property(
            &prop("{type: array, items: {$ref: '#/definitions/Tag'}}"),
            &["Tag"],
            "x",
        )
        .unwrap();
        assert_eq!(
            ty,
            TargetType::Collection(Box::new(TargetType::Model("Tag".into())))
        );
        assert!(map_property(&prop("{type: array}"), &[], "x").is_err());
    }

    #[test]
    fn test_unresolved_refs() {
        assert!(matches!(
            map_property(&prop("{$ref: '#/definitions/Ghost'}"), &["Pet"], "x"),
            Err(CompileError::UnresolvedReference { .. })
        ));
        assert!(matches!(
            ref_to_model_name("other.yaml#/Pet", "x"),
            Err(CompileError::UnresolvedReference { .. })
        ));
    }

    #[test]
    fn test_dependency_of() {
        let known = ["Pet", "Tag"];
        assert_eq!(
            dependency_of(&prop("{$ref: '#/definitions/Pet'}"), &known),
            Some(("Pet".to_string(), false))
        );
        assert_eq!(
            dependency_of(&prop("{type: array, items: {type: Tag}}"), &known),
            Some(("Tag".to_string(), true))
        );
        assert_eq!(
            dependency_of(
                &prop("{type: array, items: {type: array, items: {$ref: '#/definitions/Pet'}}}"),
                &known
            ),
            Some(("Pet".to_string(), true))
        );
        assert_eq!(dependency_of(&prop("{type: string}"), &known), None);
    }

    #[test]
    fn test_file_is_not_a_property_type() {
        assert!(matches!(
            map_property(&prop("{type: file}"), &[], "Upload.data"),
            Err(CompileError::UnknownType { .. })
        ));
    }
}
