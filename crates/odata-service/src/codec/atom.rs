//! Atom entries and feeds for entity responses.

use super::{escape_xml, WriteContext};
use crate::model::{Entity, PropertyKind, Value};
use chrono::{SecondsFormat, Utc};
use std::fmt::Write;

const ATOM_NS: &str = "http://www.w3.org/2005/Atom";
const DATA_NS: &str = "http://docs.oasis-open.org/odata/ns/data";
const METADATA_NS: &str = "http://docs.oasis-open.org/odata/ns/metadata";
const SCHEME: &str = "http://docs.oasis-open.org/odata/ns/scheme";

pub struct AtomWriter<'a> {
    ctx: WriteContext<'a>,
    updated: String,
}

impl<'a> AtomWriter<'a> {
    pub fn new(ctx: WriteContext<'a>) -> Self {
        Self {
            ctx,
            updated: Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
        }
    }

    fn root_attributes(&self, context_fragment: &str) -> String {
        format!(
            r#"xml:base="{}/" xmlns="{ATOM_NS}" xmlns:d="{DATA_NS}" xmlns:m="{METADATA_NS}" m:context="{}""#,
            escape_xml(self.ctx.service_root),
            escape_xml(&self.ctx.context_url(context_fragment))
        )
    }

    pub fn entry(&self, set: &str, entity: &Entity) -> String {
        let mut out = String::from(r#"<?xml version="1.0" encoding="utf-8"?>"#);
        let attributes = self.root_attributes(&format!("{set}/$entity"));
        self.write_entry(&mut out, set, entity, Some(&attributes));
        out
    }

    pub fn feed(&self, set: &str, entities: &[Entity], count: Option<usize>) -> String {
        let mut out = String::from(r#"<?xml version="1.0" encoding="utf-8"?>"#);
        let _ = write!(
            out,
            r#"<feed {}><id>{}/{}</id><title type="text">{}</title><updated>{}</updated><link rel="self" title="{}" href="{}"/>"#,
            self.root_attributes(set),
            escape_xml(self.ctx.service_root),
            escape_xml(set),
            escape_xml(set),
            self.updated,
            escape_xml(set),
            escape_xml(set),
        );
        if let Some(count) = count {
            let _ = write!(out, "<m:count>{count}</m:count>");
        }
        for entity in entities {
            self.write_entry(&mut out, set, entity, None);
        }
        out.push_str("</feed>");
        out
    }

    fn write_entry(&self, out: &mut String, set: &str, entity: &Entity, root: Option<&str>) {
        out.push_str("<entry");
        if let Some(attributes) = root {
            let _ = write!(out, " {attributes}");
        }
        if let Some(etag) = entity.compute_etag() {
            let _ = write!(out, r#" m:etag="{}""#, escape_xml(&etag));
        }
        out.push('>');

        if let Some(id) = self.ctx.entity_id(set, entity) {
            let _ = write!(out, "<id>{}</id>", escape_xml(&id));
        }
        let _ = write!(
            out,
            r##"<category term="#{}" scheme="{SCHEME}"/>"##,
            escape_xml(entity.type_name())
        );
        let edit_link = self.ctx.edit_link(set, entity);
        if let Some(link) = &edit_link {
            let _ = write!(
                out,
                r#"<link rel="edit" title="{}" href="{}"/>"#,
                escape_xml(entity.type_name()),
                escape_xml(link)
            );
        }
        for property in self.ctx.model.properties(entity.type_name()) {
            if let (PropertyKind::Navigation { many, .. }, Some(link)) = (&property.kind, &edit_link) {
                let kind = if *many { "feed" } else { "entry" };
                let _ = write!(
                    out,
                    r#"<link rel="http://docs.oasis-open.org/odata/ns/related/{name}" type="application/atom+xml;type={kind}" title="{name}" href="{link}/{name}"/>"#,
                    name = escape_xml(&property.name),
                    link = escape_xml(link),
                );
            }
        }
        for action in self.ctx.advertised_actions(set, entity) {
            let _ = write!(
                out,
                r#"<m:action metadata="{}" title="{}" target="{}"/>"#,
                escape_xml(&self.ctx.context_url(&action.qualified_name)),
                escape_xml(&action.title),
                escape_xml(&action.target)
            );
        }
        let _ = write!(
            out,
            r#"<title/><updated>{}</updated><author><name/></author><content type="application/xml"><m:properties>"#,
            self.updated
        );
        for property in self.ctx.model.properties(entity.type_name()) {
            if property.is_navigation() {
                continue;
            }
            let value = entity.get(&property.name).unwrap_or(&Value::Null);
            write_property(out, &property.name, value);
        }
        out.push_str("</m:properties></content></entry>");
    }
}

fn write_property(out: &mut String, name: &str, value: &Value) {
    let element = format!("d:{name}");
    write_element(out, &element, value);
}

fn write_element(out: &mut String, element: &str, value: &Value) {
    match value {
        Value::Null => {
            let _ = write!(out, r#"<{element} m:null="true"/>"#);
        }
        Value::String(text) => {
            let _ = write!(out, "<{element}>{}</{element}>", escape_xml(text));
        }
        Value::Complex(complex) => {
            let _ = write!(out, r##"<{element} m:type="#{}">"##, escape_xml(&complex.type_name));
            for (name, value) in &complex.properties {
                write_property(out, name, value);
            }
            let _ = write!(out, "</{element}>");
        }
        Value::Collection(items) => {
            let _ = write!(out, "<{element}>");
            for item in items {
                write_element(out, "m:element", item);
            }
            let _ = write!(out, "</{element}>");
        }
        primitive => {
            let kind = primitive.primitive_kind().map_or("String", |k| k.short_name());
            let text = match primitive {
                Value::Boolean(v) => v.to_string(),
                Value::Int32(v) => v.to_string(),
                Value::Int64(v) => v.to_string(),
                Value::Double(v) if v.is_nan() => "NaN".to_string(),
                Value::Double(v) if v.is_infinite() => {
                    if *v > 0.0 { "INF" } else { "-INF" }.to_string()
                }
                Value::Double(v) => v.to_string(),
                Value::Guid(v) => v.to_string(),
                Value::DateTimeOffset(v) => v.to_rfc3339(),
                _ => String::new(),
            };
            let _ = write!(out, r#"<{element} m:type="{kind}">{text}</{element}>"#);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::access::AccessGate;
    use crate::invoke::OperationRegistry;
    use crate::model::{ModelBuilder, PrimitiveKind, ResourceSet, ResourceType};
    use std::sync::Arc;

    #[test]
    fn test_entry_and_feed() {
        let model = ModelBuilder::new("Demo")
            .add_type(
                ResourceType::entity("Demo", "Customer")
                    .key("ID", PrimitiveKind::Int32)
                    .property("Name", PrimitiveKind::String)
                    .etag_property("Version", PrimitiveKind::Int32),
            )
            .add_set(ResourceSet::new("Customers", "Demo.Customer"))
            .build()
            .unwrap();
        let registry = OperationRegistry::new();
        let gate = AccessGate::allow_all();
        let writer = AtomWriter::new(WriteContext {
            model: &model,
            registry: &registry,
            gate: &gate,
            service_root: "http://host",
        });
        let entity = Entity::new(Arc::clone(model.shape("Demo.Customer").unwrap()))
            .with("ID", 1)
            .with("Name", "A & B")
            .with("Version", 2);

        let entry = writer.entry("Customers", &entity);
        assert!(entry.contains(r#"m:context="http://host/$metadata#Customers/$entity""#));
        assert!(entry.contains(r#"m:etag="W/&quot;2&quot;""#));
        assert!(entry.contains("<id>http://host/Customers(1)</id>"));
        assert!(entry.contains(r#"<d:ID m:type="Int32">1</d:ID>"#));
        assert!(entry.contains("<d:Name>A &amp; B</d:Name>"));

        let feed = writer.feed("Customers", &[entity], Some(1));
        assert!(feed.starts_with(r#"<?xml version="1.0" encoding="utf-8"?><feed "#));
        assert!(feed.contains("<m:count>1</m:count>"));
        assert!(feed.ends_with("</entry></feed>"));
    }
}
