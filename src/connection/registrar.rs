//! Model registration: bind every catalog entity onto a fresh connection.
//!
//! Each entity goes through lookup, fresh bind, then one alias-and-rebind fallback. Entity failures
//! are recorded and skipped; the registry is built locally and only handed out once every entity
//! has been processed.

use crate::config::EntityDefinition;
use crate::connection::handle::ModelBinder;
use serde::Serialize;
use std::collections::HashMap;

/// A model bound on a tenant connection: where the entity's rows live.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct BoundModel {
    pub entity: String,
    pub schema: String,
    pub table: String,
}

impl BoundModel {
    pub fn for_entity(entity: &EntityDefinition) -> Self {
        BoundModel {
            entity: entity.name.clone(),
            schema: entity.schema.clone(),
            table: entity.table.clone(),
        }
    }

    /// Quoted `"schema"."table"` for query builders.
    pub fn relation(&self) -> String {
        format!("\"{}\".\"{}\"", self.schema, self.table)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RegistrationStatus {
    AlreadyBound,
    BoundFresh,
    BoundViaFallback,
    Failed,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ModelRegistrationOutcome {
    pub entity: String,
    pub status: RegistrationStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ModelRegistrationOutcome {
    fn ok(entity: &EntityDefinition, status: RegistrationStatus) -> Self {
        ModelRegistrationOutcome {
            entity: entity.name.clone(),
            status,
            error: None,
        }
    }

    fn failed(entity: &EntityDefinition, error: impl std::fmt::Display) -> Self {
        ModelRegistrationOutcome {
            entity: entity.name.clone(),
            status: RegistrationStatus::Failed,
            error: Some(error.to_string()),
        }
    }
}

/// Entity name to bound model. Immutable once published.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ModelRegistry {
    models: HashMap<String, BoundModel>,
}

impl ModelRegistry {
    pub fn get(&self, entity: &str) -> Option<&BoundModel> {
        self.models.get(entity)
    }

    pub fn contains(&self, entity: &str) -> bool {
        self.models.contains_key(entity)
    }

    pub fn len(&self) -> usize {
        self.models.len()
    }

    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }

    /// Entity names, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.models.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &BoundModel)> {
        self.models.iter().map(|(k, v)| (k.as_str(), v))
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct RegistrationReport {
    pub outcomes: Vec<ModelRegistrationOutcome>,
}

impl RegistrationReport {
    pub fn failed(&self) -> impl Iterator<Item = &ModelRegistrationOutcome> {
        self.outcomes
            .iter()
            .filter(|o| o.status == RegistrationStatus::Failed)
    }

    pub fn outcome(&self, entity: &str) -> Option<&ModelRegistrationOutcome> {
        self.outcomes.iter().find(|o| o.entity == entity)
    }

    pub fn is_complete(&self) -> bool {
        self.failed().next().is_none()
    }
}

#[derive(Clone, Debug, Default)]
pub struct Registration {
    pub registry: ModelRegistry,
    pub report: RegistrationReport,
}

fn alias_for(entity: &EntityDefinition) -> EntityDefinition {
    let suffix = uuid::Uuid::new_v4().simple().to_string();
    let mut table = entity.table.clone();
    // Keep within PostgreSQL's 63-byte identifier limit.
    while table.len() > 63 - 16 {
        table.pop();
    }
    table.push_str("__alias_");
    table.push_str(&suffix[..8]);
    EntityDefinition {
        name: format!("{}__alias_{}", entity.name, &suffix[..8]),
        table,
        ..entity.clone()
    }
}

/// Bind one entity. Never fails; the outcome says what happened.
pub async fn register_entity<B>(
    binder: &B,
    entity: &EntityDefinition,
) -> (Option<BoundModel>, ModelRegistrationOutcome)
where
    B: ModelBinder + ?Sized,
{
    match binder.lookup_model(entity).await {
        Ok(Some(model)) => {
            let outcome = ModelRegistrationOutcome::ok(entity, RegistrationStatus::AlreadyBound);
            return (Some(model), outcome);
        }
        Ok(None) => {}
        Err(e) => {
            tracing::debug!(
                entity = %entity.name,
                error = %e,
                "model lookup failed, binding fresh"
            );
        }
    }

    let first_error = match binder.bind_model(entity).await {
        Ok(model) => {
            let outcome = ModelRegistrationOutcome::ok(entity, RegistrationStatus::BoundFresh);
            return (Some(model), outcome);
        }
        Err(e) => e,
    };
    tracing::debug!(entity = %entity.name, error = %first_error, "fresh bind failed, trying alias");

    let alias = alias_for(entity);
    if let Err(e) = binder.bind_model(&alias).await {
        return (None, ModelRegistrationOutcome::failed(entity, e));
    }
    if let Err(e) = binder.discard_model(&alias).await {
        tracing::warn!(
            entity = %entity.name,
            alias = %alias.table,
            error = %e,
            "could not discard alias binding"
        );
    }

    // A concurrent binder may have created the canonical binding in the meantime.
    if let Ok(Some(model)) = binder.lookup_model(entity).await {
        let outcome = ModelRegistrationOutcome::ok(entity, RegistrationStatus::BoundViaFallback);
        return (Some(model), outcome);
    }

    match binder.bind_model(entity).await {
        Ok(model) => {
            let status = RegistrationStatus::BoundViaFallback;
            (Some(model), ModelRegistrationOutcome::ok(entity, status))
        }
        Err(e) => (None, ModelRegistrationOutcome::failed(entity, e)),
    }
}

/// Bind every entity in order. The result may be partial or empty, never an error.
pub async fn register_all<B>(binder: &B, entities: &[EntityDefinition]) -> Registration
where
    B: ModelBinder + ?Sized,
{
    let mut models = HashMap::with_capacity(entities.len());
    let mut outcomes = Vec::with_capacity(entities.len());

    for entity in entities {
        let (model, outcome) = register_entity(binder, entity).await;
        if let Some(error) = &outcome.error {
            tracing::warn!(entity = %entity.name, error = %error, "model registration failed");
        }
        if let Some(model) = model {
            models.insert(entity.name.clone(), model);
        }
        outcomes.push(outcome);
    }

    if models.is_empty() && !entities.is_empty() {
        tracing::warn!(entities = entities.len(), "no models registered on connection");
    }

    Registration {
        registry: ModelRegistry { models },
        report: RegistrationReport { outcomes },
    }
}
