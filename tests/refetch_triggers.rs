// Integration tests for focus and reconnect refetching

use std::time::Duration;

use kennel::prelude::*;
use serde_json::{Value, json};

fn service(args: &Value) -> RequestSpec {
    RequestSpec::get(format!("/services/{}", args.as_str().unwrap_or_default()))
}

#[tokio::test]
async fn test_listener_sweeps_on_each_event() -> color_eyre::Result<()> {
    let api = Api::builder()
        .query(QueryDefinition::new("getService", service))
        .build()?;
    let endpoint = api.query::<&'static str>("getService")?;
    let transport = MockTransport::new();
    transport
        .on(Method::Get, "/services/walk", MockReply::Json(json!("walk")))
        .on(Method::Get, "/services/groom", MockReply::Json(json!("groom")));
    let client = QueryClient::new(
        transport.clone(),
        ClientConfig::new(Duration::from_secs(60)).with_refetch_on_focus(false),
    );

    let walk = client.subscribe(&endpoint, "walk");
    let groom = client.subscribe(&endpoint, "groom");
    walk.ready().await;
    groom.ready().await;

    let source = TriggerSource::new();
    let listener = client.listen(source.events());

    // Ignored by configuration
    source.focus();
    transport.on(Method::Get, "/services/groom", MockReply::Fail("offline".to_string()));
    source.reconnect();

    while transport.calls(Method::Get, "/services/walk") < 2 || transport.calls(Method::Get, "/services/groom") < 2 {
        tokio::task::yield_now().await;
    }
    while client.entry(&endpoint.key("groom")).is_some_and(|entry| entry.is_loading()) {
        tokio::task::yield_now().await;
    }
    listener.cancel().await;

    // One failure does not stop the rest of the sweep
    let walk_entry = client.entry(&endpoint.key("walk")).expect("cached");
    let groom_entry = client.entry(&endpoint.key("groom")).expect("cached");
    assert!(walk_entry.is_success());
    assert!(groom_entry.is_error());
    assert_eq!(groom_entry.data(), Some(&json!("groom")));
    assert_eq!(transport.calls(Method::Get, "/services/walk"), 2);
    Ok(())
}
