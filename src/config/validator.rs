//! Catalog validation: identifiers, uniqueness, primary keys.

use crate::config::EntityDefinition;
use crate::error::ConfigError;
use regex::Regex;
use std::collections::HashSet;
use std::sync::OnceLock;

/// Unquoted PostgreSQL identifier of at most 63 bytes.
pub fn is_valid_identifier(name: &str) -> bool {
    static IDENT: OnceLock<Regex> = OnceLock::new();
    IDENT
        .get_or_init(|| {
            Regex::new(r"^[A-Za-z_][A-Za-z0-9_]{0,62}$").expect("identifier pattern compiles")
        })
        .is_match(name)
}

pub fn validate_catalog(entities: &[EntityDefinition]) -> Result<(), ConfigError> {
    let mut names = HashSet::new();
    let mut relations = HashSet::new();

    for e in entities {
        if e.name.trim().is_empty() {
            return Err(ConfigError::Validation("entity name must not be empty".into()));
        }
        if !names.insert(e.name.as_str()) {
            return Err(ConfigError::Validation(format!("duplicate entity: {}", e.name)));
        }
        for ident in [&e.schema, &e.table] {
            if !is_valid_identifier(ident) {
                return Err(ConfigError::Validation(format!(
                    "entity {}: invalid identifier '{}'",
                    e.name, ident
                )));
            }
        }
        if !relations.insert((e.schema.as_str(), e.table.as_str())) {
            return Err(ConfigError::Validation(format!(
                "entity {}: table {}.{} already used by another entity",
                e.name, e.schema, e.table
            )));
        }
        if e.columns.is_empty() {
            return Err(ConfigError::Validation(format!("entity {}: no columns", e.name)));
        }

        let mut columns = HashSet::new();
        for c in &e.columns {
            if !is_valid_identifier(&c.name) {
                return Err(ConfigError::Validation(format!(
                    "entity {}: invalid column name '{}'",
                    e.name, c.name
                )));
            }
            if !columns.insert(c.name.as_str()) {
                return Err(ConfigError::Validation(format!(
                    "entity {}: duplicate column {}",
                    e.name, c.name
                )));
            }
        }
        for pk in e.primary_key.columns() {
            if !columns.contains(pk) {
                return Err(ConfigError::Validation(format!(
                    "entity {}: primary key column {} is not defined",
                    e.name, pk
                )));
            }
        }
    }

    Ok(())
}
