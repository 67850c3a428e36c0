// Integration tests for the dog-boarding endpoint table

use kennel::prelude::*;
use serde_json::{Value, json};

fn boarded_dogs() -> Value {
    json!({
        "1": {"name": "Tiny", "weight": 10, "dob": "2021-04-01"},
        "2": {"name": "Pip", "weight": "26", "dob": "2019-08-15"},
        "3": {"name": "Rex", "weight": 81, "dob": "2018-01-20T08:00:00Z"},
        "5": {"name": "Moose", "weight": 130, "dob": "2016-11-05"},
    })
}

fn setup() -> color_eyre::Result<(MockTransport, QueryClient, BoardingApi)> {
    let transport = MockTransport::new();
    transport
        .on(Method::Get, "/dogs", MockReply::Json(boarded_dogs()))
        .on(Method::Get, "/services", MockReply::Json(json!([{"id": "walk"}])))
        .on(Method::Get, "/services/walk", MockReply::Json(json!({"id": "walk"})));
    let client = QueryClient::new(transport.clone(), ClientConfig::default());
    Ok((transport, client, BoardingApi::new()?))
}

fn cached_dogs(client: &QueryClient, api: &BoardingApi) -> Value {
    client
        .entry(&api.get_dogs.key(()))
        .and_then(|entry| entry.data().cloned())
        .unwrap_or(Value::Null)
}

#[tokio::test]
async fn test_dogs_are_decorated_with_size_and_age() -> color_eyre::Result<()> {
    let (_transport, client, api) = setup()?;

    let entry = client.query(&api.get_dogs, ()).await;
    let dogs = entry.data().expect("dogs fetched");

    assert_eq!(dogs["1"]["size"], json!("teacup"));
    assert_eq!(dogs["2"]["size"], json!("medium"));
    assert_eq!(dogs["3"]["size"], json!("x-large"));
    assert_eq!(dogs["5"]["size"], json!("jumbo"));
    assert_eq!(dogs["3"]["name"], json!("Rex"));
    assert!(dogs["5"]["age"].as_i64().is_some_and(|age| age >= 9));
    assert!(entry.tags.contains("Dog"));
    Ok(())
}

#[tokio::test]
async fn test_malformed_dogs_settle_with_transform_error() -> color_eyre::Result<()> {
    let (transport, client, api) = setup()?;
    transport.on(Method::Get, "/dogs", MockReply::Json(json!({"1": {"name": "Tiny"}})));

    let entry = client.query(&api.get_dogs, ()).await;

    assert!(entry.is_error());
    assert!(matches!(entry.error, Some(QueryError::Transform(_))));
    Ok(())
}

#[tokio::test]
async fn test_remove_dog_is_optimistic_and_rolls_back() -> color_eyre::Result<()> {
    let (transport, client, api) = setup()?;
    let dogs = client.subscribe(&api.get_dogs, ());
    dogs.ready().await;
    let before = cached_dogs(&client, &api);

    transport.on(Method::Delete, "/dogs/5", MockReply::Fail("offline".to_string()));
    transport.hold();
    let removal = {
        let client = client.clone();
        let remove_dog = api.remove_dog.clone();
        tokio::spawn(async move { client.mutate(&remove_dog, DogId::from(5)).await })
    };
    while transport.calls(Method::Delete, "/dogs/5") == 0 {
        tokio::task::yield_now().await;
    }

    // Gone before the request settles
    assert!(cached_dogs(&client, &api).get("5").is_none());

    transport.release();
    let result = removal.await?;
    assert!(result.is_error());
    assert_eq!(cached_dogs(&client, &api), before);
    Ok(())
}

#[tokio::test]
async fn test_remove_dog_refetches_dogs_on_success() -> color_eyre::Result<()> {
    let (transport, client, api) = setup()?;
    let dogs = client.subscribe(&api.get_dogs, ());
    dogs.ready().await;

    let mut remaining = boarded_dogs();
    if let Some(map) = remaining.as_object_mut() {
        map.remove("5");
    }
    transport
        .on(Method::Delete, "/dogs/5", MockReply::Json(Value::Null))
        .on(Method::Get, "/dogs", MockReply::Json(remaining));

    let result = client.mutate(&api.remove_dog, DogId::from(5)).await;

    assert!(result.is_success());
    assert_eq!(result.refetched, vec![api.get_dogs.key(())]);
    assert_eq!(transport.calls(Method::Get, "/dogs"), 2);
    let cached = cached_dogs(&client, &api);
    assert!(cached.get("5").is_none());
    assert_eq!(cached["3"]["size"], json!("x-large"));
    Ok(())
}

#[tokio::test]
async fn test_services_and_contact() -> color_eyre::Result<()> {
    let (transport, client, api) = setup()?;
    transport.on(Method::Post, "/contact", MockReply::Json(json!({"received": true})));

    let services = client.query(&api.get_services, ()).await;
    let walk = client.query(&api.get_service, "walk".to_string()).await;
    assert!(services.is_success());
    assert_eq!(walk.data(), Some(&json!({"id": "walk"})));

    let contact = client
        .mutate(&api.make_contact, json!({"email": "owner@example.com", "message": "Hi"}))
        .await;
    assert!(contact.is_success());
    assert!(contact.refetched.is_empty());

    let posted = transport
        .requests()
        .into_iter()
        .find(|request| request.method == Method::Post)
        .expect("contact request sent");
    assert_eq!(posted.path, "/contact");
    assert_eq!(posted.body, Some(json!({"email": "owner@example.com", "message": "Hi"})));
    Ok(())
}
