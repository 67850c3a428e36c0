// Integration tests for memoized selectors

use std::sync::Arc;
use std::time::Duration;

use kennel::prelude::*;
use serde_json::{Value, json};

fn dogs(_: &Value) -> RequestSpec {
    RequestSpec::get("/dogs")
}

fn services(_: &Value) -> RequestSpec {
    RequestSpec::get("/services")
}

fn names_by_size(inputs: &[Option<Arc<Value>>]) -> Vec<String> {
    let size = inputs[1].as_deref().and_then(Value::as_str).unwrap_or_default();
    let mut names: Vec<String> = inputs[0]
        .as_deref()
        .and_then(Value::as_object)
        .map(|dogs| {
            dogs.values()
                .filter(|dog| dog["size"] == size)
                .filter_map(|dog| dog["name"].as_str().map(str::to_string))
                .collect()
        })
        .unwrap_or_default();
    names.sort();
    names
}

#[tokio::test]
async fn test_recomputes_exactly_once_per_input_change() -> color_eyre::Result<()> {
    let api = Api::builder()
        .query(QueryDefinition::new("getDogs", dogs).provides(TagSpec::list(&["Dog"])))
        .query(QueryDefinition::new("getServices", services))
        .build()?;
    let get_dogs = api.query::<()>("getDogs")?;
    let get_services = api.query::<()>("getServices")?;

    let transport = MockTransport::new();
    transport
        .on(
            Method::Get,
            "/dogs",
            MockReply::Json(json!({"1": {"name": "Tiny", "size": "small"}, "2": {"name": "Rex", "size": "large"}})),
        )
        .on(Method::Get, "/services", MockReply::Json(json!(["walk"])));
    let client = QueryClient::new(transport.clone(), ClientConfig::new(Duration::from_secs(60)));

    let size = LocalState::new(json!("small"));
    let selector = client.define_selector(
        vec![get_dogs.select(()), SelectorInput::Local(size.clone())],
        names_by_size,
    );

    let sub = client.subscribe(&get_dogs, ());
    sub.ready().await;
    assert_eq!(selector.value(), vec!["Tiny".to_string()]);
    let baseline = selector.recomputations();

    // Unrelated cache writes and repeated reads
    client.query(&get_services, ()).await;
    for _ in 0..3 {
        assert_eq!(selector.value(), vec!["Tiny".to_string()]);
    }
    assert_eq!(selector.recomputations() - baseline, 0);

    // Dependency data changes
    transport.on(
        Method::Get,
        "/dogs",
        MockReply::Json(json!({"1": {"name": "Tiny", "size": "small"}, "3": {"name": "Bo", "size": "small"}})),
    );
    client.invalidate_tags(["Dog"]).await;
    assert_eq!(selector.value(), vec!["Bo".to_string(), "Tiny".to_string()]);
    assert_eq!(selector.value(), vec!["Bo".to_string(), "Tiny".to_string()]);
    assert_eq!(selector.recomputations() - baseline, 1);

    // Local input changes
    size.set(json!("large"));
    assert!(selector.value().is_empty());
    assert_eq!(selector.recomputations() - baseline, 2);
    Ok(())
}
