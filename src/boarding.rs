//! Dog-boarding endpoint table.
//!
//! The endpoints a dog-boarding front end talks to: the service catalogue,
//! a contact form, and the boarded dogs list. Dogs are keyed by id; the list
//! is decorated with each dog's size bucket and age before it is cached.
//!
//! # Example
//!
//! ```rust,ignore
//! use kennel::prelude::*;
//!
//! let api = BoardingApi::new()?;
//! let client = QueryClient::new(HttpTransport::new("https://kennel.example/api")?, ClientConfig::default());
//!
//! let dogs = client.subscribe(&api.get_dogs, ());
//! dogs.ready().await;
//!
//! // Removes dog 5 from the cached list right away; it comes back if the
//! // request fails.
//! client.mutate(&api.remove_dog, DogId::from(5)).await;
//! ```

pub mod dogs;

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::api::{Api, MutationEndpoint, QueryEndpoint};
use crate::endpoint::{
    MutationDefinition, OptimisticUpdate, QueryDefinition, RequestSpec, TagSpec, no_args,
};
use crate::error::ConfigError;

pub const DOG_TAG: &str = "Dog";
pub const SERVICE_TAG: &str = "Service";

/// Identifier of a boarded dog.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DogId(pub String);

impl From<u64> for DogId {
    fn from(id: u64) -> Self {
        Self(id.to_string())
    }
}

impl From<&str> for DogId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<DogId> for Value {
    fn from(id: DogId) -> Self {
        Self::String(id.0)
    }
}

impl fmt::Display for DogId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Ids in paths are taken verbatim from strings and numbers.
fn path_id(args: &Value) -> String {
    match args {
        Value::String(id) => id.clone(),
        other => other.to_string(),
    }
}

fn get_services(_: &Value) -> RequestSpec {
    RequestSpec::get("/services")
}

fn get_service(id: &Value) -> RequestSpec {
    RequestSpec::get(format!("/services/{}", path_id(id)))
}

fn make_contact(body: &Value) -> RequestSpec {
    RequestSpec::post("/contact", body.clone())
}

fn get_dogs(_: &Value) -> RequestSpec {
    RequestSpec::get("/dogs")
}

fn remove_dog(id: &Value) -> RequestSpec {
    RequestSpec::delete(format!("/dogs/{}", path_id(id)))
}

/// Drops the removed dog from the cached `getDogs` mapping.
fn remove_dog_recipe(dogs: &mut Value, id: &Value) {
    if let Some(dogs) = dogs.as_object_mut() {
        dogs.remove(&path_id(id));
    }
}

/// Every boarding endpoint definition.
#[must_use]
pub fn definitions() -> Vec<EndpointDefinition> {
    vec![
        EndpointDefinition::Query(
            QueryDefinition::new("getServices", get_services).provides(TagSpec::list(&[SERVICE_TAG])),
        ),
        EndpointDefinition::Query(
            QueryDefinition::new("getService", get_service).provides(TagSpec::list(&[SERVICE_TAG])),
        ),
        EndpointDefinition::Mutation(MutationDefinition::new("makeContact", make_contact)),
        EndpointDefinition::Query(
            QueryDefinition::new("getDogs", get_dogs)
                .transform(dogs::transform_dogs)
                .provides(TagSpec::list(&[DOG_TAG]))
                .keep_unused_for(Duration::from_secs(60)),
        ),
        EndpointDefinition::Mutation(
            MutationDefinition::new("removeDog", remove_dog)
                .invalidates(TagSpec::list(&[DOG_TAG]))
                .optimistic(OptimisticUpdate {
                    target: "getDogs",
                    target_args: no_args,
                    recipe: remove_dog_recipe,
                }),
        ),
    ]
}

/// A query or mutation definition, for building tables from a flat list.
#[derive(Debug, Clone)]
pub enum EndpointDefinition {
    Query(QueryDefinition),
    Mutation(MutationDefinition),
}

/// The validated boarding table with typed accessors.
#[derive(Debug, Clone)]
pub struct BoardingApi {
    pub get_services: QueryEndpoint<()>,
    pub get_service: QueryEndpoint<String>,
    pub make_contact: MutationEndpoint<Value>,
    pub get_dogs: QueryEndpoint<()>,
    pub remove_dog: MutationEndpoint<DogId>,
    api: Api,
}

impl BoardingApi {
    pub fn new() -> Result<Self, ConfigError> {
        let api = definitions()
            .into_iter()
            .fold(Api::builder(), |builder, definition| match definition {
                EndpointDefinition::Query(query) => builder.query(query),
                EndpointDefinition::Mutation(mutation) => builder.mutation(mutation),
            })
            .build()?;

        Ok(Self {
            get_services: api.query("getServices")?,
            get_service: api.query("getService")?,
            make_contact: api.mutation("makeContact")?,
            get_dogs: api.query("getDogs")?,
            remove_dog: api.mutation("removeDog")?,
            api,
        })
    }

    /// The underlying endpoint table.
    #[must_use]
    pub const fn api(&self) -> &Api {
        &self.api
    }
}
