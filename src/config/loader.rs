//! Entity catalog: the built-in school models, or a JSON file with the same shape.

use crate::config::types::*;
use crate::config::validate_catalog;
use crate::error::ConfigError;
use std::path::Path;

fn id_column() -> ColumnDefinition {
    ColumnDefinition::required("id", "UUID").with_default("gen_random_uuid()")
}

fn timestamps() -> [ColumnDefinition; 2] {
    [
        ColumnDefinition::required("created_at", "TIMESTAMPTZ").with_default("NOW()"),
        ColumnDefinition::required("updated_at", "TIMESTAMPTZ").with_default("NOW()"),
    ]
}

fn entity(name: &str, table: &str, columns: Vec<ColumnDefinition>) -> EntityDefinition {
    let mut all = vec![id_column()];
    all.extend(columns);
    all.extend(timestamps());
    EntityDefinition::new(name, table, all)
}

/// Models every school database carries.
pub fn school_catalog() -> Vec<EntityDefinition> {
    vec![
        entity(
            "Student",
            "students",
            vec![
                ColumnDefinition::required("full_name", "TEXT"),
                ColumnDefinition::optional("email", "TEXT"),
                ColumnDefinition::optional("class_id", "UUID"),
                ColumnDefinition::optional("enrolled_on", "DATE"),
            ],
        ),
        entity(
            "Teacher",
            "teachers",
            vec![
                ColumnDefinition::required("full_name", "TEXT"),
                ColumnDefinition::required("email", "TEXT"),
                ColumnDefinition::optional("subject", "TEXT"),
            ],
        ),
        entity(
            "Class",
            "classes",
            vec![
                ColumnDefinition::required("name", "TEXT"),
                ColumnDefinition::optional("teacher_id", "UUID"),
                ColumnDefinition::optional("school_year", "TEXT"),
            ],
        ),
        entity(
            "Grade",
            "grades",
            vec![
                ColumnDefinition::required("student_id", "UUID"),
                ColumnDefinition::required("subject", "TEXT"),
                ColumnDefinition::required("score", "NUMERIC(5,2)"),
                ColumnDefinition::optional("term", "TEXT"),
            ],
        ),
        entity(
            "Notification",
            "notifications",
            vec![
                ColumnDefinition::required("recipient_id", "UUID"),
                ColumnDefinition::required("title", "TEXT"),
                ColumnDefinition::optional("body", "TEXT"),
                ColumnDefinition::required("read", "BOOLEAN").with_default("FALSE"),
            ],
        ),
        entity(
            "Payment",
            "payments",
            vec![
                ColumnDefinition::required("student_id", "UUID"),
                ColumnDefinition::required("amount", "NUMERIC(10,2)"),
                ColumnDefinition::required("currency", "TEXT").with_default("'USD'"),
                ColumnDefinition::required("status", "TEXT").with_default("'pending'"),
                ColumnDefinition::optional("paid_at", "TIMESTAMPTZ"),
            ],
        ),
        entity(
            "Rating",
            "ratings",
            vec![
                ColumnDefinition::required("teacher_id", "UUID"),
                ColumnDefinition::required("student_id", "UUID"),
                ColumnDefinition::required("stars", "SMALLINT"),
                ColumnDefinition::optional("comment", "TEXT"),
            ],
        ),
    ]
}

/// Read a JSON array of entity definitions and validate it.
pub async fn load_catalog_from_path(
    path: impl AsRef<Path>,
) -> Result<Vec<EntityDefinition>, ConfigError> {
    let path = path.as_ref();
    let raw = tokio::fs::read_to_string(path)
        .await
        .map_err(|e| ConfigError::Load(format!("{}: {}", path.display(), e)))?;
    let entities: Vec<EntityDefinition> = serde_json::from_str(&raw)
        .map_err(|e| ConfigError::Load(format!("{}: {}", path.display(), e)))?;
    validate_catalog(&entities)?;
    Ok(entities)
}
