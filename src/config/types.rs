//! Entity definitions: the logical models bound onto every tenant connection.

use serde::{Deserialize, Deserializer, Serialize};

fn default_schema() -> String {
    "public".into()
}

fn default_true() -> bool {
    true
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PrimaryKey {
    Single(String),
    Composite(Vec<String>),
}

impl PrimaryKey {
    pub fn columns(&self) -> Vec<&str> {
        match self {
            PrimaryKey::Single(s) => vec![s.as_str()],
            PrimaryKey::Composite(v) => v.iter().map(String::as_str).collect(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub enum ColumnDefault {
    Literal(String),
    Expression { expression: String },
}

impl<'de> Deserialize<'de> for ColumnDefault {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let v = serde_json::Value::deserialize(deserializer)?;
        match v {
            serde_json::Value::String(s) => Ok(ColumnDefault::Literal(s)),
            serde_json::Value::Object(mut obj) => match obj.remove("expression") {
                Some(serde_json::Value::String(s)) => {
                    Ok(ColumnDefault::Expression { expression: s })
                }
                _ => Err(serde::de::Error::custom(format!(
                    "column default object must carry a string \"expression\"; got keys: {:?}",
                    obj.keys().collect::<Vec<_>>()
                ))),
            },
            other => Err(serde::de::Error::custom(format!(
                "column default must be a string or {{ \"expression\": \"...\" }}; got {}",
                other
            ))),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ColumnDefinition {
    pub name: String,
    /// PostgreSQL type as written in DDL, e.g. `UUID`, `TEXT`, `NUMERIC(10,2)`.
    #[serde(rename = "type")]
    pub data_type: String,
    #[serde(default = "default_true")]
    pub nullable: bool,
    #[serde(default)]
    pub default: Option<ColumnDefault>,
}

impl ColumnDefinition {
    pub fn required(name: &str, data_type: &str) -> Self {
        ColumnDefinition {
            name: name.into(),
            data_type: data_type.into(),
            nullable: false,
            default: None,
        }
    }

    pub fn optional(name: &str, data_type: &str) -> Self {
        ColumnDefinition {
            nullable: true,
            ..Self::required(name, data_type)
        }
    }

    pub fn with_default(mut self, expression: &str) -> Self {
        self.default = Some(ColumnDefault::Expression {
            expression: expression.into(),
        });
        self
    }
}

/// One logical entity. `name` is the registry key; `schema.table` is where it lives in the tenant
/// database.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EntityDefinition {
    pub name: String,
    #[serde(default = "default_schema")]
    pub schema: String,
    pub table: String,
    pub columns: Vec<ColumnDefinition>,
    pub primary_key: PrimaryKey,
}

impl EntityDefinition {
    pub fn new(name: &str, table: &str, columns: Vec<ColumnDefinition>) -> Self {
        EntityDefinition {
            name: name.into(),
            schema: default_schema(),
            table: table.into(),
            columns,
            primary_key: PrimaryKey::Single("id".into()),
        }
    }
}
