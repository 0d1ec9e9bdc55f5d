use http::{Method, StatusCode};
use odata_service::access::AccessGate;
use odata_service::invoke::InvocationObserver;
use odata_service::lifecycle::{HostBuilder, ServiceHost};
use odata_service::model::{AccessRules, EntitySetRights, OperationRights};
use odata_service::request::{ODataRequest, ODataResponse};
use odata_service::sample;
use serde_json::json;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

async fn start(builder: impl FnOnce(HostBuilder) -> HostBuilder) -> ServiceHost {
    let builder = builder(HostBuilder::new(sample::model().unwrap()));
    sample::register(builder).unwrap().start().await.unwrap()
}

async fn host() -> ServiceHost {
    start(|b| b).await
}

fn message(response: &ODataResponse) -> String {
    response.json().unwrap()["error"]["message"]
        .as_str()
        .unwrap_or_default()
        .to_string()
}

#[tokio::test]
async fn test_primitive_result() {
    let host = host().await;
    let response = host.handle(ODataRequest::post("TopLevelAction_Primitive")).await;
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(
        response.text(),
        r#"{"@odata.context":"http://host/$metadata#Edm.String","value":"entity1"}"#
    );
    assert_eq!(response.header(&odata_service::request::ODATA_VERSION), Some("4.0"));
    host.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_null_and_empty_results() {
    let host = host().await;

    let response = host.handle(ODataRequest::post("TopLevelAction_Primitive_Null")).await;
    assert_eq!(response.status, StatusCode::NO_CONTENT);
    assert!(response.body.is_empty());

    let response = host
        .handle(ODataRequest::post("TopLevelAction_PrimitiveCollection_Null"))
        .await;
    assert_eq!(response.status, StatusCode::NO_CONTENT);

    let response = host
        .handle(ODataRequest::post("TopLevelAction_PrimitiveCollection_Empty"))
        .await;
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.json().unwrap()["value"], json!([]));

    let response = host
        .handle(ODataRequest::post("TopLevelAction_EntityCollection_Empty"))
        .await;
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.json().unwrap()["value"], json!([]));

    let response = host.handle(ODataRequest::post("TopLevelAction_Entity_Null")).await;
    assert_eq!(response.status, StatusCode::NO_CONTENT);

    let response = host.handle(ODataRequest::post("TopLevelAction_Void")).await;
    assert_eq!(response.status, StatusCode::NO_CONTENT);
}

#[tokio::test]
async fn test_structured_results() {
    let host = host().await;

    let response = host.handle(ODataRequest::post("TopLevelAction_Complex")).await;
    assert_eq!(response.status, StatusCode::OK);
    let body = response.json().unwrap();
    assert_eq!(body["@odata.context"], "http://host/$metadata#Sample.Address");
    assert_eq!(body["City"], "Redmond");

    let response = host.handle(ODataRequest::post("TopLevelAction_Entity")).await;
    assert_eq!(response.status, StatusCode::OK);
    let body = response.json().unwrap();
    assert_eq!(body["@odata.context"], "http://host/$metadata#Customers/$entity");
    assert_eq!(body["ID"], 100);

    let response = host
        .handle(ODataRequest::post("TopLevelAction_PrimitiveCollection"))
        .await;
    assert_eq!(response.json().unwrap()["value"], json!(["first", "second"]));
}

#[tokio::test]
async fn test_parameters() {
    let host = host().await;

    let response = host
        .handle(
            ODataRequest::post("TopLevelActionWithParam_PrimitiveCollection")
                .json(&json!({"value": ["a", "b"]})),
        )
        .await;
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.json().unwrap()["value"], json!(["a", "b"]));

    let response = host
        .handle(ODataRequest::post("TopLevelActionWithParams").json(&json!({
            "p1": 7,
            "p2": "seven",
            "p3": {"Street": "1 Main St", "City": "Oslo"}
        })))
        .await;
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.json().unwrap()["value"], "7:seven");

    let response = host
        .handle(ODataRequest::post("TopLevelActionWithParams").json(&json!({})))
        .await;
    assert_eq!(response.status, StatusCode::BAD_REQUEST);
    assert_eq!(
        message(&response),
        "One or more parameters of the operation 'TopLevelActionWithParams' are missing from the request payload. The missing parameters are: p1,p2,p3."
    );

    let response = host
        .handle(ODataRequest::post("TopLevelActionWithParams").json(&json!({
            "p1": 1, "p2": "x", "p3": null, "p4": 1
        })))
        .await;
    assert_eq!(response.status, StatusCode::BAD_REQUEST);
    assert!(message(&response).contains("'p4'"));

    let response = host
        .handle(
            ODataRequest::post("TopLevelActionWithParam_PrimitiveCollection")
                .header("content-type", "application/json")
                .body(r#"{"value":["a"],"value":["b"]}"#),
        )
        .await;
    assert_eq!(response.status, StatusCode::BAD_REQUEST);
    assert_eq!(
        message(&response),
        "Multiple parameters with the name 'value' were found in the request payload."
    );

    let response = host
        .handle(
            ODataRequest::post("TopLevelActionWithParam_PrimitiveCollection")
                .header("content-type", "application/atom+xml")
                .body("<entry/>"),
        )
        .await;
    assert_eq!(response.status, StatusCode::UNSUPPORTED_MEDIA_TYPE);
}

#[tokio::test]
async fn test_invocation_rules() {
    let host = host().await;

    let response = host
        .handle(ODataRequest::post("TopLevelAction_Void").header("If-Match", "*"))
        .await;
    assert_eq!(response.status, StatusCode::BAD_REQUEST);

    let response = host.handle(ODataRequest::get("TopLevelAction_Void")).await;
    assert_eq!(response.status, StatusCode::METHOD_NOT_ALLOWED);

    let response = host.handle(ODataRequest::post("TopLevelAction_Void?$top=1")).await;
    assert_eq!(response.status, StatusCode::BAD_REQUEST);

    let response = host.handle(ODataRequest::post("TopLevelAction_Void(1)")).await;
    assert_eq!(response.status, StatusCode::BAD_REQUEST);

    let response = host.handle(ODataRequest::post("TopLevelAction_Throw")).await;
    assert_eq!(response.status, StatusCode::IM_A_TEAPOT);
    assert_eq!(message(&response), "User code threw an error.");

    let response = host
        .handle(ODataRequest::post("TopLevelAction_Void").header("OData-Version", "5.0"))
        .await;
    assert_eq!(response.status, StatusCode::BAD_REQUEST);

    for uri in ["", "$metadata", "$batch"] {
        let response = host.handle(ODataRequest::new(Method::DELETE, uri)).await;
        assert_eq!(response.status, StatusCode::METHOD_NOT_ALLOWED, "DELETE {uri}");
    }
}

#[tokio::test]
async fn test_bound_actions() {
    let host = host().await;

    let response = host
        .handle(ODataRequest::post("Customers(1)/Sample.Rename").json(&json!({"name": "Renamed"})))
        .await;
    assert_eq!(response.status, StatusCode::OK);
    let body = response.json().unwrap();
    assert_eq!(body["Name"], "Renamed");
    assert_eq!(body["Version"], 2);

    let stored = host.handle(ODataRequest::get("Customers(1)")).await;
    assert_eq!(stored.json().unwrap()["Name"], "Renamed");

    let response = host
        .handle(ODataRequest::post("Customers(42)/Sample.Rename").json(&json!({"name": "x"})))
        .await;
    assert_eq!(response.status, StatusCode::NOT_FOUND);

    let response = host
        .handle(ODataRequest::post("Orders(1)/Sample.Rename").json(&json!({"name": "x"})))
        .await;
    assert_eq!(response.status, StatusCode::BAD_REQUEST);
    assert!(message(&response).contains("is not assignable from the result of the uri segment"));

    let response = host
        .handle(ODataRequest::post("Orders/Sample.IncreaseAllAmounts").json(&json!({"amount": 1.5})))
        .await;
    assert_eq!(response.status, StatusCode::NO_CONTENT);
    let order = host.handle(ODataRequest::get("Orders(1)")).await;
    assert_eq!(order.json().unwrap()["DollarAmount"], 12.0);

    let response = host.handle(ODataRequest::post("Customers(1)/Sample.GetOrders")).await;
    assert_eq!(response.status, StatusCode::OK);
    let body = response.json().unwrap();
    assert_eq!(body["@odata.context"], "http://host/$metadata#Orders");
    assert_eq!(body["value"].as_array().unwrap().len(), 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_bound_actions_do_not_lose_updates() {
    let host = host().await;
    let service = host.service().clone();

    let calls: Vec<_> = (0..20)
        .map(|_| {
            let service = service.clone();
            tokio::spawn(async move {
                service
                    .handle(
                        ODataRequest::post("Orders/Sample.IncreaseAllAmounts")
                            .json(&json!({"amount": 1.0})),
                    )
                    .await
                    .status
            })
        })
        .collect();
    for call in calls {
        assert_eq!(call.await.unwrap(), StatusCode::NO_CONTENT);
    }

    let order = host.handle(ODataRequest::get("Orders(1)")).await;
    assert_eq!(order.json().unwrap()["DollarAmount"], 30.5);
    host.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_sometimes_bound_action() {
    let host = host().await;

    let response = host
        .handle(ODataRequest::post(
            "Customers(2)/Sample.CustomerWithBirthday/Sample.Promote",
        ))
        .await;
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.json().unwrap()["value"], "Customer 2 promoted");

    let created = host
        .handle(ODataRequest::post("Customers").json(&json!({
            "@odata.type": "#Sample.CustomerWithBirthday",
            "ID": 7,
            "Name": "No birthday",
            "Version": 1
        })))
        .await;
    assert_eq!(created.status, StatusCode::CREATED);

    let response = host
        .handle(ODataRequest::post(
            "Customers(7)/Sample.CustomerWithBirthday/Sample.Promote",
        ))
        .await;
    assert_eq!(response.status, StatusCode::NOT_FOUND);
    assert_eq!(message(&response), "Resource not found for the segment 'Sample.Promote'.");
}

#[tokio::test]
async fn test_service_operations() {
    let host = host().await;

    let response = host.handle(ODataRequest::get("GetCustomersByName?name='Customer'")).await;
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.json().unwrap()["value"].as_array().unwrap().len(), 3);

    let response = host.handle(ODataRequest::get("GetCustomersByName(2)?name='Customer'")).await;
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.json().unwrap()["ID"], 2);

    let response = host.handle(ODataRequest::get("GetCustomersByName/$count?name='1'")).await;
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.text(), "1");

    let response = host.handle(ODataRequest::get("GetCustomersByName")).await;
    assert_eq!(response.status, StatusCode::BAD_REQUEST);
    assert!(message(&response).ends_with("The missing parameters are: name."));

    let response = host.handle(ODataRequest::post("GetCustomersByName?name='a'")).await;
    assert_eq!(response.status, StatusCode::METHOD_NOT_ALLOWED);

    let response = host.handle(ODataRequest::get("CustomerCount")).await;
    assert_eq!(response.json().unwrap()["value"], 3);
}

#[derive(Default)]
struct Counting {
    invoked: AtomicUsize,
    fetched: AtomicUsize,
}

impl InvocationObserver for Counting {
    fn invoked(&self, _operation: &str) {
        self.invoked.fetch_add(1, Ordering::SeqCst);
    }

    fn result_fetched(&self, _operation: &str) {
        self.fetched.fetch_add(1, Ordering::SeqCst);
    }
}

#[tokio::test]
async fn test_observer_sees_each_invocation_once() {
    let counting = Arc::new(Counting::default());
    let observer = Arc::clone(&counting);
    let host = start(move |b| b.observer(observer)).await;

    host.handle(ODataRequest::post("TopLevelAction_Void")).await;
    assert_eq!(counting.invoked.load(Ordering::SeqCst), 1);
    assert_eq!(counting.fetched.load(Ordering::SeqCst), 0);

    host.handle(ODataRequest::post("TopLevelAction_Primitive")).await;
    assert_eq!(counting.invoked.load(Ordering::SeqCst), 2);
    assert_eq!(counting.fetched.load(Ordering::SeqCst), 1);

    // Rejected before the handler runs.
    host.handle(ODataRequest::post("TopLevelActionWithParams").json(&json!({})))
        .await;
    assert_eq!(counting.invoked.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_hidden_sets_and_operations() {
    let gate = AccessGate::new(
        AccessRules::new()
            .with("*", EntitySetRights::ALL)
            .with("Customers", EntitySetRights::NONE),
        AccessRules::new()
            .with("*", OperationRights::Invoke)
            .with("TopLevelAction_Void", OperationRights::None),
        AccessRules::new().with("*", OperationRights::Invoke),
    );
    let host = start(move |b| b.access(gate)).await;

    let response = host.handle(ODataRequest::get("Customers")).await;
    assert_eq!(response.status, StatusCode::NOT_FOUND);
    assert_eq!(message(&response), "Resource not found for the segment 'Customers'.");

    let response = host
        .handle(ODataRequest::post("Customers(1)/Sample.Rename").json(&json!({"name": "x"})))
        .await;
    assert_eq!(response.status, StatusCode::NOT_FOUND);
    assert_eq!(message(&response), "Resource not found for the segment 'Customers'.");

    let response = host.handle(ODataRequest::post("TopLevelAction_Void")).await;
    assert_eq!(response.status, StatusCode::NOT_FOUND);

    let metadata = host.handle(ODataRequest::get("$metadata")).await;
    assert_eq!(metadata.status, StatusCode::OK);
    let xml = metadata.text();
    assert!(!xml.contains("TopLevelAction_Void"));
    assert!(xml.contains("TopLevelAction_Primitive"));

    let response = host.handle(ODataRequest::get("Orders(1)")).await;
    assert_eq!(response.status, StatusCode::OK);
}
