//! A small customers-and-orders service with one operation per result shape.
//!
//! The binary serves it, and the integration tests run against it.

use crate::error::ServiceError;
use crate::invoke::{
    handler_fn, Arguments, InvocationContext, InvocationResult, OperationHandler,
};
use crate::lifecycle::{HostBuilder, HostError};
use crate::model::{
    BindingKind, ComplexValue, Entity, EntityChanges, EntityKey, EntityShape, EntityUpdate,
    ModelBuilder, ModelError, OperationDefinition, PrimitiveKind, ResourceSet, ResourceType,
    ServiceModel, TypeRef, Value,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use http::StatusCode;
use odata_store::Precondition;
use std::sync::Arc;

pub const NAMESPACE: &str = "Sample";

fn qualified(name: &str) -> String {
    format!("{NAMESPACE}.{name}")
}

pub fn model() -> Result<ServiceModel, ModelError> {
    ModelBuilder::new(NAMESPACE)
        .add_type(
            ResourceType::complex(NAMESPACE, "Address")
                .property("Street", PrimitiveKind::String)
                .property("City", PrimitiveKind::String),
        )
        .add_type(
            ResourceType::entity(NAMESPACE, "Customer")
                .key("ID", PrimitiveKind::Int32)
                .property("Name", PrimitiveKind::String)
                .etag_property("Version", PrimitiveKind::Int32)
                .complex_property("Address", "Sample.Address")
                .primitive_collection("Emails", PrimitiveKind::String)
                .navigation("Orders", "Sample.Order", true)
                .navigation("BestFriend", "Sample.Customer", false),
        )
        .add_type(
            ResourceType::entity(NAMESPACE, "CustomerWithBirthday")
                .derives_from("Sample.Customer")
                .property("Birthday", PrimitiveKind::DateTimeOffset),
        )
        .add_type(
            ResourceType::entity(NAMESPACE, "Order")
                .key("ID", PrimitiveKind::Int32)
                .property("DollarAmount", PrimitiveKind::Double)
                .navigation("Customer", "Sample.Customer", false),
        )
        .add_type(
            ResourceType::entity(NAMESPACE, "Region")
                .key("Code", PrimitiveKind::String)
                .property("Name", PrimitiveKind::String),
        )
        .add_set(
            ResourceSet::new("Customers", "Sample.Customer")
                .navigates("Orders", "Orders")
                .navigates("BestFriend", "Customers"),
        )
        .add_set(ResourceSet::new("Orders", "Sample.Order").navigates("Customer", "Customers"))
        .add_set(ResourceSet::new("Regions", "Sample.Region"))
        .build()
}

/// Registers the sample operations and seed data on `builder`.
pub fn register(builder: HostBuilder) -> Result<HostBuilder, HostError> {
    let customer = shape(&builder, "Sample.Customer")?;
    let with_birthday = shape(&builder, "Sample.CustomerWithBirthday")?;
    let order = shape(&builder, "Sample.Order")?;
    let region = shape(&builder, "Sample.Region")?;

    let builder = register_top_level(builder, &customer)?;
    let builder = register_bound(builder)?;
    let builder = register_functions(builder)?;

    let seeded = builder
        .seed(
            "Customers",
            Entity::new(customer.clone())
                .with("ID", 1)
                .with("Name", "Customer 1")
                .with("Version", 1)
                .with(
                    "Address",
                    ComplexValue::new("Sample.Address")
                        .with("Street", "1 Main St")
                        .with("City", "Redmond"),
                )
                .with("Emails", Value::Collection(vec![Value::from("one@example.com")]))
                .linked("Orders", vec![EntityKey::from(1), EntityKey::from(2)])
                .linked("BestFriend", vec![EntityKey::from(2)]),
        )
        .seed(
            "Customers",
            Entity::new(with_birthday)
                .with("ID", 2)
                .with("Name", "Customer 2")
                .with("Version", 1)
                .with("Birthday", Value::DateTimeOffset(DateTime::<Utc>::UNIX_EPOCH.fixed_offset()))
                .linked("BestFriend", vec![EntityKey::from(1)]),
        )
        .seed(
            "Customers",
            Entity::new(customer).with("ID", 3).with("Name", "Customer 3").with("Version", 1),
        )
        .seed(
            "Orders",
            Entity::new(order.clone())
                .with("ID", 1)
                .with("DollarAmount", 10.5)
                .linked("Customer", vec![EntityKey::from(1)]),
        )
        .seed(
            "Orders",
            Entity::new(order)
                .with("ID", 2)
                .with("DollarAmount", 20.0)
                .linked("Customer", vec![EntityKey::from(1)]),
        )
        .seed(
            "Regions",
            Entity::new(region).with("Code", "WA").with("Name", "Washington"),
        );
    Ok(seeded)
}

fn shape(builder: &HostBuilder, type_name: &str) -> Result<Arc<EntityShape>, HostError> {
    builder.model().shape(type_name).cloned().ok_or_else(|| {
        HostError::Model(ModelError::UnknownType {
            name: NAMESPACE.to_string(),
            missing: type_name.to_string(),
        })
    })
}

/// A handler that always returns `result`.
fn constant(result: InvocationResult) -> Arc<dyn OperationHandler> {
    handler_fn(move |_, _| {
        let result = result.clone();
        async move { Ok(result) }
    })
}

fn string() -> TypeRef {
    TypeRef::Primitive(PrimitiveKind::String)
}

fn address() -> ComplexValue {
    ComplexValue::new("Sample.Address")
        .with("Street", "1 Microsoft Way")
        .with("City", "Redmond")
}

fn register_top_level(
    builder: HostBuilder,
    customer: &Arc<EntityShape>,
) -> Result<HostBuilder, HostError> {
    let action = |name: &str| OperationDefinition::action(NAMESPACE, name);
    let customers = TypeRef::EntityCollection(qualified("Customer"));
    let sample_customer = Entity::new(customer.clone())
        .with("ID", 100)
        .with("Name", "Action Customer")
        .with("Version", 1);

    let builder = builder
        .operation(action("TopLevelAction_Void"), constant(InvocationResult::Void))?
        .operation(
            action("TopLevelAction_Primitive").returns(string()),
            constant(InvocationResult::Primitive(Some(Value::from("entity1")))),
        )?
        .operation(
            action("TopLevelAction_Primitive_Null").returns(string()),
            constant(InvocationResult::Primitive(None)),
        )?
        .operation(
            action("TopLevelAction_PrimitiveCollection")
                .returns(TypeRef::PrimitiveCollection(PrimitiveKind::String)),
            constant(InvocationResult::PrimitiveCollection(Some(vec![
                Value::from("first"),
                Value::from("second"),
            ]))),
        )?
        .operation(
            action("TopLevelAction_PrimitiveCollection_Empty")
                .returns(TypeRef::PrimitiveCollection(PrimitiveKind::String)),
            constant(InvocationResult::PrimitiveCollection(Some(Vec::new()))),
        )?
        .operation(
            action("TopLevelAction_PrimitiveCollection_Null")
                .returns(TypeRef::PrimitiveCollection(PrimitiveKind::String)),
            constant(InvocationResult::PrimitiveCollection(None)),
        )?
        .operation(
            action("TopLevelAction_Complex").returns(TypeRef::Complex(qualified("Address"))),
            constant(InvocationResult::Complex(Some(address()))),
        )?
        .operation(
            action("TopLevelAction_Complex_Null").returns(TypeRef::Complex(qualified("Address"))),
            constant(InvocationResult::Complex(None)),
        )?
        .operation(
            action("TopLevelAction_ComplexCollection")
                .returns(TypeRef::ComplexCollection(qualified("Address"))),
            constant(InvocationResult::ComplexCollection(Some(vec![address()]))),
        )?
        .operation(
            action("TopLevelAction_Entity")
                .returns(TypeRef::Entity(qualified("Customer")))
                .result_set("Customers"),
            constant(InvocationResult::Entity(Some(sample_customer.clone()))),
        )?
        .operation(
            action("TopLevelAction_Entity_Null")
                .returns(TypeRef::Entity(qualified("Customer")))
                .result_set("Customers"),
            constant(InvocationResult::Entity(None)),
        )?
        .operation(
            action("TopLevelAction_EntityCollection")
                .returns(customers.clone())
                .result_set("Customers"),
            constant(InvocationResult::EntityCollection(Some(vec![sample_customer]))),
        )?
        .operation(
            action("TopLevelAction_EntityCollection_Empty")
                .returns(customers)
                .result_set("Customers"),
            constant(InvocationResult::EntityCollection(Some(Vec::new()))),
        )?
        .operation(
            action("TopLevelActionWithParam_PrimitiveCollection")
                .parameter("value", TypeRef::PrimitiveCollection(PrimitiveKind::String))
                .returns(TypeRef::PrimitiveCollection(PrimitiveKind::String)),
            handler_fn(|_, args| async move {
                Ok(match args.get("value") {
                    Some(Value::Collection(items)) => {
                        InvocationResult::PrimitiveCollection(Some(items.clone()))
                    }
                    _ => InvocationResult::PrimitiveCollection(None),
                })
            }),
        )?
        .operation(
            action("TopLevelActionWithParams")
                .parameter("p1", TypeRef::Primitive(PrimitiveKind::Int32))
                .parameter("p2", string())
                .parameter("p3", TypeRef::Complex(qualified("Address")))
                .returns(string()),
            handler_fn(|_, args| async move {
                let p1 = args.get("p1").and_then(Value::as_i64).unwrap_or_default();
                let p2 = args.get("p2").and_then(Value::as_str).unwrap_or_default().to_string();
                Ok(InvocationResult::Primitive(Some(Value::from(format!("{p1}:{p2}")))))
            }),
        )?
        .operation(
            action("TopLevelAction_Throw"),
            handler_fn(|_, _| async {
                Err(ServiceError::user(StatusCode::IM_A_TEAPOT, "User code threw an error."))
            }),
        )?;
    Ok(builder)
}

fn register_bound(builder: HostBuilder) -> Result<HostBuilder, HostError> {
    let customer = TypeRef::Entity(qualified("Customer"));
    let builder = builder
        .operation(
            OperationDefinition::action(NAMESPACE, "Rename")
                .binding(BindingKind::Always, "customer", customer.clone())
                .parameter("name", string())
                .returns(customer.clone())
                .result_path("customer"),
            handler_fn(rename),
        )?
        .operation(
            OperationDefinition::action(NAMESPACE, "IncreaseAllAmounts")
                .binding(
                    BindingKind::Always,
                    "orders",
                    TypeRef::EntityCollection(qualified("Order")),
                )
                .parameter("amount", TypeRef::Primitive(PrimitiveKind::Double)),
            handler_fn(increase_all_amounts),
        )?
        .operation(
            OperationDefinition::action(NAMESPACE, "Promote")
                .binding(
                    BindingKind::Sometimes,
                    "customer",
                    TypeRef::Entity(qualified("CustomerWithBirthday")),
                )
                .returns(string()),
            Arc::new(Promote),
        )?
        .operation(
            OperationDefinition::action(NAMESPACE, "GetOrders")
                .binding(BindingKind::Always, "customer", customer)
                .returns(TypeRef::EntityCollection(qualified("Order")))
                .result_path("customer/Orders"),
            handler_fn(|ctx, args| async move {
                let Some(customer) = args.binding_entity() else {
                    return Ok(InvocationResult::EntityCollection(None));
                };
                let mut orders = Vec::new();
                for key in customer.links("Orders") {
                    if let Some(order) = ctx.data.get("Orders", key.clone()).await? {
                        orders.push(order);
                    }
                }
                Ok(InvocationResult::EntityCollection(Some(orders)))
            }),
        )?;
    Ok(builder)
}

fn register_functions(builder: HostBuilder) -> Result<HostBuilder, HostError> {
    let builder = builder
        .operation(
            OperationDefinition::function(NAMESPACE, "GetCustomersByName")
                .parameter("name", string())
                .returns(TypeRef::EntityQueryable(qualified("Customer")))
                .result_set("Customers"),
            handler_fn(|ctx, args| async move {
                let name = args.get("name").and_then(Value::as_str).unwrap_or_default().to_string();
                let customers = ctx.data.list("Customers").await?;
                Ok(InvocationResult::EntityQueryable(Some(
                    customers
                        .into_iter()
                        .filter(|c| c.get("Name").and_then(Value::as_str).is_some_and(|n| n.contains(&name)))
                        .collect(),
                )))
            }),
        )?
        .operation(
            OperationDefinition::function(NAMESPACE, "CustomerCount")
                .returns(TypeRef::Primitive(PrimitiveKind::Int32)),
            handler_fn(|ctx, _| async move {
                let count = ctx.data.list("Customers").await?.len();
                Ok(InvocationResult::Primitive(Some(Value::Int32(count as i32))))
            }),
        )?;
    Ok(builder)
}

fn bump_version(entity: &Entity, changes: &mut EntityChanges) {
    let version = entity.get("Version").and_then(Value::as_i64).unwrap_or(0);
    changes
        .values
        .insert("Version".to_string(), Value::Int32(version as i32 + 1));
}

async fn rename(ctx: InvocationContext, args: Arguments) -> Result<InvocationResult, ServiceError> {
    let Some(customer) = args.binding_entity() else {
        return Ok(InvocationResult::Entity(None));
    };
    let key = customer
        .key()
        .ok_or_else(|| ServiceError::internal("The binding customer has no key."))?;
    let mut changes = EntityChanges::default();
    changes.values.insert(
        "Name".to_string(),
        args.get("name").cloned().unwrap_or(Value::Null),
    );
    bump_version(customer, &mut changes);
    let renamed = ctx
        .data
        .set("Customers")?
        .update(key, Precondition::None, EntityUpdate::Merge(changes))
        .await?;
    Ok(InvocationResult::Entity(Some(renamed)))
}

async fn increase_all_amounts(
    ctx: InvocationContext,
    args: Arguments,
) -> Result<InvocationResult, ServiceError> {
    let amount = match args.get("amount") {
        Some(Value::Double(v)) => *v,
        _ => 0.0,
    };
    let orders = ctx.data.set("Orders")?;
    for order in args.binding_entities().unwrap_or_default() {
        let Some(key) = order.key() else { continue };
        let current = match order.get("DollarAmount") {
            Some(Value::Double(v)) => *v,
            _ => 0.0,
        };
        let mut changes = EntityChanges::default();
        changes
            .values
            .insert("DollarAmount".to_string(), Value::Double(current + amount));
        orders
            .update(key, Precondition::None, EntityUpdate::Merge(changes))
            .await?;
    }
    Ok(InvocationResult::Void)
}

/// Promotes customers that have a birthday on record.
struct Promote;

#[async_trait]
impl OperationHandler for Promote {
    async fn invoke(
        &self,
        _ctx: InvocationContext,
        args: Arguments,
    ) -> Result<InvocationResult, ServiceError> {
        let name = args
            .binding_entity()
            .and_then(|c| c.get("Name"))
            .and_then(Value::as_str)
            .unwrap_or_default();
        Ok(InvocationResult::Primitive(Some(Value::from(format!("{name} promoted")))))
    }

    fn is_available(&self, binding: &Entity) -> bool {
        binding.get("Birthday").is_some_and(|v| !v.is_null())
    }
}
