//! Values returned by operation handlers.

use crate::model::{ComplexValue, Entity, ServiceModel, TypeRef, Value};

/// Result of one invocation, tagged by shape. `None` is a null result; an empty
/// vector is an empty collection.
#[derive(Debug, Clone)]
pub enum InvocationResult {
    Void,
    Primitive(Option<Value>),
    Complex(Option<ComplexValue>),
    PrimitiveCollection(Option<Vec<Value>>),
    ComplexCollection(Option<Vec<ComplexValue>>),
    Entity(Option<Entity>),
    EntityCollection(Option<Vec<Entity>>),
    EntityQueryable(Option<Vec<Entity>>),
}

impl InvocationResult {
    pub fn is_null(&self) -> bool {
        match self {
            InvocationResult::Void => false,
            InvocationResult::Primitive(v) => v.as_ref().map_or(true, Value::is_null),
            InvocationResult::Complex(v) => v.is_none(),
            InvocationResult::PrimitiveCollection(v) => v.is_none(),
            InvocationResult::ComplexCollection(v) => v.is_none(),
            InvocationResult::Entity(v) => v.is_none(),
            InvocationResult::EntityCollection(v) | InvocationResult::EntityQueryable(v) => {
                v.is_none()
            }
        }
    }

    fn shape(&self) -> &'static str {
        match self {
            InvocationResult::Void => "void",
            InvocationResult::Primitive(_) => "primitive",
            InvocationResult::Complex(_) => "complex",
            InvocationResult::PrimitiveCollection(_) => "primitive collection",
            InvocationResult::ComplexCollection(_) => "complex collection",
            InvocationResult::Entity(_) => "entity",
            InvocationResult::EntityCollection(_) => "entity collection",
            InvocationResult::EntityQueryable(_) => "entity queryable",
        }
    }

    /// Checks the result against the declared return type and normalizes primitive
    /// values to the declared kind.
    pub fn conform(
        self,
        declared: Option<&TypeRef>,
        model: &ServiceModel,
    ) -> Result<Self, String> {
        let mismatch = |result: &Self| {
            format!(
                "The operation returned a {} result, but its declared return type is {}.",
                result.shape(),
                declared.map_or_else(|| "void".to_string(), TypeRef::edm_name)
            )
        };
        let entities_fit = |entities: &[Entity], expected: &str| {
            entities
                .iter()
                .all(|e| model.is_assignable(e.type_name(), expected))
        };

        match (self, declared) {
            (InvocationResult::Void, None) => Ok(InvocationResult::Void),
            (InvocationResult::Primitive(value), Some(TypeRef::Primitive(kind))) => match value {
                None => Ok(InvocationResult::Primitive(None)),
                Some(v) => match v.coerce(*kind) {
                    Some(v) => Ok(InvocationResult::Primitive(Some(v))),
                    None => Err(format!(
                        "The operation returned a value that cannot be converted to {kind}."
                    )),
                },
            },
            (InvocationResult::PrimitiveCollection(values), Some(TypeRef::PrimitiveCollection(kind))) => {
                let Some(values) = values else {
                    return Ok(InvocationResult::PrimitiveCollection(None));
                };
                values
                    .into_iter()
                    .map(|v| v.coerce(*kind))
                    .collect::<Option<Vec<_>>>()
                    .map(|v| InvocationResult::PrimitiveCollection(Some(v)))
                    .ok_or_else(|| {
                        format!("The operation returned an item that cannot be converted to {kind}.")
                    })
            }
            (result @ InvocationResult::Complex(_), Some(TypeRef::Complex(expected))) => {
                match &result {
                    InvocationResult::Complex(Some(c)) if !model.is_assignable(&c.type_name, expected) => {
                        Err(mismatch(&result))
                    }
                    _ => Ok(result),
                }
            }
            (result @ InvocationResult::ComplexCollection(_), Some(TypeRef::ComplexCollection(expected))) => {
                match &result {
                    InvocationResult::ComplexCollection(Some(items))
                        if !items.iter().all(|c| model.is_assignable(&c.type_name, expected)) =>
                    {
                        Err(mismatch(&result))
                    }
                    _ => Ok(result),
                }
            }
            (result @ InvocationResult::Entity(_), Some(TypeRef::Entity(expected))) => {
                match &result {
                    InvocationResult::Entity(Some(e)) if !model.is_assignable(e.type_name(), expected) => {
                        Err(mismatch(&result))
                    }
                    _ => Ok(result),
                }
            }
            (
                result @ (InvocationResult::EntityCollection(_) | InvocationResult::EntityQueryable(_)),
                Some(TypeRef::EntityCollection(expected) | TypeRef::EntityQueryable(expected)),
            ) => match &result {
                InvocationResult::EntityCollection(Some(items))
                | InvocationResult::EntityQueryable(Some(items))
                    if !entities_fit(items, expected) =>
                {
                    Err(mismatch(&result))
                }
                _ => Ok(result),
            },
            (result, _) => Err(mismatch(&result)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ModelBuilder, PrimitiveKind};

    fn model() -> ServiceModel {
        ModelBuilder::new("Demo").build().unwrap()
    }

    #[test]
    fn test_null_and_empty_are_distinct() {
        assert!(InvocationResult::PrimitiveCollection(None).is_null());
        assert!(!InvocationResult::PrimitiveCollection(Some(vec![])).is_null());
        assert!(InvocationResult::Primitive(Some(Value::Null)).is_null());
        assert!(!InvocationResult::Void.is_null());
    }

    #[test]
    fn test_conform_checks_shape() {
        let model = model();
        let string = TypeRef::Primitive(PrimitiveKind::String);
        assert!(InvocationResult::Primitive(Some("a".into()))
            .conform(Some(&string), &model)
            .is_ok());
        assert!(InvocationResult::Void.conform(Some(&string), &model).is_err());
        assert!(InvocationResult::Primitive(None).conform(None, &model).is_err());
        let err = InvocationResult::Primitive(Some(Value::Int32(1)))
            .conform(Some(&string), &model)
            .unwrap_err();
        assert!(err.contains("Edm.String"));
    }

    #[test]
    fn test_conform_widens_primitives() {
        let model = model();
        let longs = TypeRef::PrimitiveCollection(PrimitiveKind::Int64);
        let result = InvocationResult::PrimitiveCollection(Some(vec![Value::Int32(1)]))
            .conform(Some(&longs), &model)
            .unwrap();
        assert!(matches!(
            result,
            InvocationResult::PrimitiveCollection(Some(ref v)) if v == &[Value::Int64(1)]
        ));
    }
}
