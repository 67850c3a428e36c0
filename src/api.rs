//! Endpoint table and typed accessors.
//!
//! An [`Api`] is built once from a list of query and mutation definitions.
//! Setup validates the whole table (names, duplicates, optimistic targets)
//! and fails with a [`ConfigError`] instead of deferring problems to request
//! time. Typed accessors ([`QueryEndpoint`], [`MutationEndpoint`]) are then
//! looked up by name, also once, and passed to the client for every call.
//!
//! # Example
//!
//! ```
//! use kennel::api::Api;
//! use kennel::endpoint::{QueryDefinition, RequestSpec, TagSpec};
//! use serde_json::Value;
//!
//! fn services(_: &Value) -> RequestSpec {
//!     RequestSpec::get("/services")
//! }
//!
//! let api = Api::builder()
//!     .query(QueryDefinition::new("getServices", services).provides(TagSpec::list(&["Service"])))
//!     .build()
//!     .expect("valid endpoint table");
//!
//! let get_services = api.query::<()>("getServices").expect("query endpoint");
//! assert_eq!(get_services.key(()).as_str(), "getServices(null)");
//! assert!(api.mutation::<()>("getServices").is_err());
//! ```

use std::collections::HashMap;
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

use serde_json::Value;

use crate::endpoint::{MutationDefinition, QueryDefinition, RecipeFn, TargetArgsFn};
use crate::error::ConfigError;
use crate::key::RequestKey;
use crate::selector::SelectorInput;

/// An optimistic update with its target query resolved.
#[derive(Debug, Clone)]
pub(crate) struct ResolvedUpdate {
    pub(crate) target: Arc<QueryDefinition>,
    pub(crate) target_args: TargetArgsFn,
    pub(crate) recipe: RecipeFn,
}

#[derive(Debug)]
pub(crate) struct ResolvedMutation {
    pub(crate) definition: MutationDefinition,
    pub(crate) updates: Vec<ResolvedUpdate>,
}

#[derive(Debug, Clone)]
enum Endpoint {
    Query(Arc<QueryDefinition>),
    Mutation(Arc<ResolvedMutation>),
}

/// A validated endpoint table.
#[derive(Debug, Clone, Default)]
pub struct Api {
    endpoints: HashMap<&'static str, Endpoint>,
}

impl Api {
    #[must_use]
    pub fn builder() -> ApiBuilder {
        ApiBuilder::default()
    }

    /// Looks up the typed accessor for a query endpoint.
    pub fn query<A>(&self, name: &str) -> Result<QueryEndpoint<A>, ConfigError> {
        match self.endpoints.get(name) {
            Some(Endpoint::Query(definition)) => Ok(QueryEndpoint {
                definition: definition.clone(),
                _args: PhantomData,
            }),
            Some(Endpoint::Mutation(_)) => Err(ConfigError::WrongKind {
                name: name.to_string(),
                expected: "query",
            }),
            None => Err(ConfigError::UnknownEndpoint(name.to_string())),
        }
    }

    /// Looks up the typed accessor for a mutation endpoint.
    pub fn mutation<A>(&self, name: &str) -> Result<MutationEndpoint<A>, ConfigError> {
        match self.endpoints.get(name) {
            Some(Endpoint::Mutation(resolved)) => Ok(MutationEndpoint {
                resolved: resolved.clone(),
                _args: PhantomData,
            }),
            Some(Endpoint::Query(_)) => Err(ConfigError::WrongKind {
                name: name.to_string(),
                expected: "mutation",
            }),
            None => Err(ConfigError::UnknownEndpoint(name.to_string())),
        }
    }

    /// Names of every endpoint in the table, sorted.
    #[must_use]
    pub fn names(&self) -> Vec<&'static str> {
        let mut names: Vec<_> = self.endpoints.keys().copied().collect();
        names.sort_unstable();
        names
    }
}

/// Collects endpoint definitions for [`Api`].
#[derive(Debug, Default)]
pub struct ApiBuilder {
    queries: Vec<QueryDefinition>,
    mutations: Vec<MutationDefinition>,
}

impl ApiBuilder {
    #[must_use]
    pub fn query(mut self, definition: QueryDefinition) -> Self {
        self.queries.push(definition);
        self
    }

    #[must_use]
    pub fn mutation(mut self, definition: MutationDefinition) -> Self {
        self.mutations.push(definition);
        self
    }

    /// Validates the table and resolves optimistic update targets.
    pub fn build(self) -> Result<Api, ConfigError> {
        let mut endpoints = HashMap::new();

        for definition in self.queries {
            let name = checked_name(definition.name, &endpoints)?;
            endpoints.insert(name, Endpoint::Query(Arc::new(definition)));
        }

        for definition in self.mutations {
            let name = checked_name(definition.name, &endpoints)?;
            let updates = definition
                .optimistic
                .iter()
                .map(|update| match endpoints.get(update.target) {
                    Some(Endpoint::Query(target)) => Ok(ResolvedUpdate {
                        target: target.clone(),
                        target_args: update.target_args,
                        recipe: update.recipe,
                    }),
                    _ => Err(ConfigError::UnknownOptimisticTarget {
                        mutation: name.to_string(),
                        target: update.target.to_string(),
                    }),
                })
                .collect::<Result<Vec<_>, _>>()?;
            endpoints.insert(
                name,
                Endpoint::Mutation(Arc::new(ResolvedMutation {
                    definition,
                    updates,
                })),
            );
        }

        Ok(Api { endpoints })
    }
}

fn checked_name(
    name: &'static str,
    endpoints: &HashMap<&'static str, Endpoint>,
) -> Result<&'static str, ConfigError> {
    if name.trim().is_empty() {
        return Err(ConfigError::MissingName);
    }
    if endpoints.contains_key(name) {
        return Err(ConfigError::DuplicateEndpoint(name.to_string()));
    }
    Ok(name)
}

/// Typed accessor for a query endpoint taking arguments of type `A`.
pub struct QueryEndpoint<A> {
    definition: Arc<QueryDefinition>,
    _args: PhantomData<fn(A)>,
}

impl<A> QueryEndpoint<A> {
    #[must_use]
    pub fn name(&self) -> &'static str {
        self.definition.name
    }

    pub(crate) const fn definition(&self) -> &Arc<QueryDefinition> {
        &self.definition
    }
}

impl<A: Into<Value>> QueryEndpoint<A> {
    /// The cache key a call with `args` resolves to.
    #[must_use]
    pub fn key(&self, args: A) -> RequestKey {
        RequestKey::new(self.definition.name, &args.into())
    }

    /// A selector input reading this query's cached data for `args`.
    #[must_use]
    pub fn select(&self, args: A) -> SelectorInput {
        SelectorInput::Query(self.key(args))
    }
}

impl<A> Clone for QueryEndpoint<A> {
    fn clone(&self) -> Self {
        Self {
            definition: self.definition.clone(),
            _args: PhantomData,
        }
    }
}

impl<A> fmt::Debug for QueryEndpoint<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueryEndpoint")
            .field("name", &self.definition.name)
            .finish()
    }
}

/// Typed accessor for a mutation endpoint taking arguments of type `A`.
pub struct MutationEndpoint<A> {
    resolved: Arc<ResolvedMutation>,
    _args: PhantomData<fn(A)>,
}

impl<A> MutationEndpoint<A> {
    #[must_use]
    pub fn name(&self) -> &'static str {
        self.resolved.definition.name
    }

    pub(crate) const fn resolved(&self) -> &Arc<ResolvedMutation> {
        &self.resolved
    }
}

impl<A> Clone for MutationEndpoint<A> {
    fn clone(&self) -> Self {
        Self {
            resolved: self.resolved.clone(),
            _args: PhantomData,
        }
    }
}

impl<A> fmt::Debug for MutationEndpoint<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MutationEndpoint")
            .field("name", &self.resolved.definition.name)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::endpoint::{OptimisticUpdate, RequestSpec, no_args};

    fn list(_: &Value) -> RequestSpec {
        RequestSpec::get("/dogs")
    }

    fn remove(args: &Value) -> RequestSpec {
        RequestSpec::delete(format!("/dogs/{args}"))
    }

    fn drop_entry(_: &mut Value, _: &Value) {}

    #[test]
    fn test_build_and_lookup() {
        let api = Api::builder()
            .query(QueryDefinition::new("getDogs", list))
            .mutation(MutationDefinition::new("removeDog", remove).optimistic(OptimisticUpdate {
                target: "getDogs",
                target_args: no_args,
                recipe: drop_entry,
            }))
            .build()
            .expect("table is valid");

        assert_eq!(api.names(), vec!["getDogs", "removeDog"]);

        let dogs = api.query::<()>("getDogs").expect("query exists");
        assert_eq!(dogs.name(), "getDogs");
        assert_eq!(dogs.key(()), RequestKey::new("getDogs", &Value::Null));

        let remove_dog = api.mutation::<u64>("removeDog").expect("mutation exists");
        assert_eq!(remove_dog.name(), "removeDog");
        assert_eq!(remove_dog.resolved().updates.len(), 1);
        assert_eq!(remove_dog.resolved().updates[0].target.name, "getDogs");
    }

    #[test]
    fn test_lookup_errors() {
        let api = Api::builder()
            .query(QueryDefinition::new("getDogs", list))
            .build()
            .expect("table is valid");

        assert_eq!(
            api.mutation::<()>("getDogs").unwrap_err(),
            ConfigError::WrongKind {
                name: "getDogs".to_string(),
                expected: "mutation",
            }
        );
        assert_eq!(
            api.query::<()>("getCats").unwrap_err(),
            ConfigError::UnknownEndpoint("getCats".to_string())
        );
    }

    #[test]
    fn test_missing_name_is_fatal() {
        let result = Api::builder().query(QueryDefinition::new("  ", list)).build();
        assert_eq!(result.unwrap_err(), ConfigError::MissingName);
    }

    #[test]
    fn test_duplicate_names_are_fatal() {
        let result = Api::builder()
            .query(QueryDefinition::new("getDogs", list))
            .mutation(MutationDefinition::new("getDogs", remove))
            .build();
        assert_eq!(
            result.unwrap_err(),
            ConfigError::DuplicateEndpoint("getDogs".to_string())
        );
    }

    #[test]
    fn test_unknown_optimistic_target_is_fatal() {
        let result = Api::builder()
            .mutation(MutationDefinition::new("removeDog", remove).optimistic(OptimisticUpdate {
                target: "getDogs",
                target_args: no_args,
                recipe: drop_entry,
            }))
            .build();
        assert_eq!(
            result.unwrap_err(),
            ConfigError::UnknownOptimisticTarget {
                mutation: "removeDog".to_string(),
                target: "getDogs".to_string(),
            }
        );
    }
}
