//! The `$metadata` document.
//!
//! Hidden sets are left out, and so are operations that are hidden or whose fixed
//! result set is hidden.

use super::{escape_xml, WriteContext};
use crate::model::{
    OperationDefinition, OperationKind, PropertyKind, ResourceType, ResourceTypeKind, ResultSet,
    TypeRef,
};
use indexmap::IndexMap;
use std::fmt::Write;
use tracing::debug;

const EDMX_NS: &str = "http://docs.oasis-open.org/odata/ns/edmx";
const EDM_NS: &str = "http://docs.oasis-open.org/odata/ns/edm";

pub fn write_metadata(ctx: &WriteContext<'_>) -> String {
    let model = ctx.model;
    let operations: Vec<&OperationDefinition> = ctx
        .registry
        .iter()
        .map(|op| &op.definition)
        .filter(|d| is_advertised(ctx, d))
        .collect();

    // Schemas keyed by namespace; the container lives in the model's namespace.
    let mut schemas: IndexMap<&str, (Vec<&ResourceType>, Vec<&OperationDefinition>)> = IndexMap::new();
    schemas.entry(model.namespace()).or_default();
    for resource_type in model.types() {
        schemas.entry(resource_type.namespace.as_str()).or_default().0.push(resource_type);
    }
    for definition in operations.iter().copied() {
        schemas.entry(definition.namespace.as_str()).or_default().1.push(definition);
    }

    let mut out = String::from(r#"<?xml version="1.0" encoding="utf-8"?>"#);
    let _ = write!(out, r#"<edmx:Edmx Version="4.0" xmlns:edmx="{EDMX_NS}"><edmx:DataServices>"#);
    for (namespace, (types, definitions)) in &schemas {
        let _ = write!(out, r#"<Schema Namespace="{}" xmlns="{EDM_NS}">"#, escape_xml(namespace));
        for resource_type in types {
            write_type(&mut out, ctx, resource_type);
        }
        // One element per overload, as registered.
        for definition in definitions {
            write_operation(&mut out, definition);
        }
        if *namespace == model.namespace() {
            write_container(&mut out, ctx, &operations);
        }
        out.push_str("</Schema>");
    }
    out.push_str("</edmx:DataServices></edmx:Edmx>");
    debug!(operations = operations.len(), "Wrote metadata document");
    out
}

fn is_advertised(ctx: &WriteContext<'_>, definition: &OperationDefinition) -> bool {
    if !ctx.gate.is_operation_visible(definition) {
        return false;
    }
    match &definition.result_set {
        Some(ResultSet::Set(set)) => ctx.gate.is_set_visible(set),
        _ => true,
    }
}

fn write_type(out: &mut String, ctx: &WriteContext<'_>, resource_type: &ResourceType) {
    let element = match resource_type.kind {
        ResourceTypeKind::Entity => "EntityType",
        ResourceTypeKind::Complex => "ComplexType",
    };
    let _ = write!(out, r#"<{element} Name="{}""#, escape_xml(&resource_type.name));
    if let Some(base) = &resource_type.base_type {
        let _ = write!(out, r#" BaseType="{}""#, escape_xml(base));
    }
    if resource_type.is_abstract {
        out.push_str(r#" Abstract="true""#);
    }
    out.push('>');
    if !resource_type.key.is_empty() {
        out.push_str("<Key>");
        for key in &resource_type.key {
            let _ = write!(out, r#"<PropertyRef Name="{}"/>"#, escape_xml(key));
        }
        out.push_str("</Key>");
    }
    for property in &resource_type.properties {
        let type_name = ctx.model.property_type(property).edm_name();
        match &property.kind {
            PropertyKind::Navigation { many, .. } => {
                let _ = write!(
                    out,
                    r#"<NavigationProperty Name="{}" Type="{}""#,
                    escape_xml(&property.name),
                    escape_xml(&type_name)
                );
                if !many && !property.nullable {
                    out.push_str(r#" Nullable="false""#);
                }
                out.push_str("/>");
            }
            _ => {
                let _ = write!(
                    out,
                    r#"<Property Name="{}" Type="{}""#,
                    escape_xml(&property.name),
                    escape_xml(&type_name)
                );
                if !property.nullable {
                    out.push_str(r#" Nullable="false""#);
                }
                out.push_str("/>");
            }
        }
    }
    let _ = write!(out, "</{element}>");
}

fn write_operation(out: &mut String, definition: &OperationDefinition) {
    let element = match definition.kind {
        OperationKind::Action => "Action",
        OperationKind::Function => "Function",
    };
    let _ = write!(out, r#"<{element} Name="{}""#, escape_xml(&definition.name));
    if definition.is_bound() {
        out.push_str(r#" IsBound="true""#);
    }
    if let Some(ResultSet::Path(path)) = &definition.result_set {
        let _ = write!(out, r#" EntitySetPath="{}""#, escape_xml(path));
    }
    if definition.is_composable() {
        out.push_str(r#" IsComposable="true""#);
    }
    out.push('>');
    for parameter in &definition.parameters {
        let _ = write!(
            out,
            r#"<Parameter Name="{}" Type="{}"/>"#,
            escape_xml(&parameter.name),
            escape_xml(&parameter.type_ref.edm_name())
        );
    }
    if let Some(return_type) = &definition.return_type {
        let _ = write!(out, r#"<ReturnType Type="{}"/>"#, escape_xml(&return_type.edm_name()));
    }
    let _ = write!(out, "</{element}>");
}

fn write_container(out: &mut String, ctx: &WriteContext<'_>, operations: &[&OperationDefinition]) {
    let model = ctx.model;
    let _ = write!(out, r#"<EntityContainer Name="{}">"#, escape_xml(model.container()));
    for set in model.sets().filter(|s| ctx.gate.is_set_visible(&s.name)) {
        let _ = write!(
            out,
            r#"<EntitySet Name="{}" EntityType="{}">"#,
            escape_xml(&set.name),
            escape_xml(&set.entity_type)
        );
        for (path, target) in &set.navigation_targets {
            if ctx.gate.is_set_visible(target) {
                let _ = write!(
                    out,
                    r#"<NavigationPropertyBinding Path="{}" Target="{}"/>"#,
                    escape_xml(path),
                    escape_xml(target)
                );
            }
        }
        let etag = model
            .shape(&set.entity_type)
            .map(|shape| shape.etag.as_slice())
            .unwrap_or_default();
        if !etag.is_empty() {
            out.push_str(r#"<Annotation Term="Org.OData.Core.V1.OptimisticConcurrency"><Collection>"#);
            for property in etag {
                let _ = write!(out, "<PropertyPath>{}</PropertyPath>", escape_xml(property));
            }
            out.push_str("</Collection></Annotation>");
        }
        out.push_str("</EntitySet>");
    }

    let mut imported = Vec::new();
    for definition in operations.iter().filter(|d| !d.is_bound()) {
        let name = definition.qualified_name();
        if imported.contains(&name) {
            continue;
        }
        let (element, attribute) = match definition.kind {
            OperationKind::Action => ("ActionImport", "Action"),
            OperationKind::Function => ("FunctionImport", "Function"),
        };
        let _ = write!(
            out,
            r#"<{element} Name="{}" {attribute}="{}""#,
            escape_xml(&definition.name),
            escape_xml(&name)
        );
        let returns_entities = definition
            .return_type
            .as_ref()
            .and_then(TypeRef::entity_type)
            .is_some();
        if let (Some(ResultSet::Set(set)), true) = (&definition.result_set, returns_entities) {
            let _ = write!(out, r#" EntitySet="{}""#, escape_xml(set));
        }
        out.push_str("/>");
        imported.push(name);
    }
    out.push_str("</EntityContainer>");
}
