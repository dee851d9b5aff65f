//! PostgreSQL backend: one single-connection pool per tenant, models bound as tables.

use crate::config::{is_valid_identifier, ColumnDefault, EntityDefinition};
use crate::connection::{BoundModel, Connector, DriverTimeouts, ModelBinder, TenantConnection};
use crate::error::{BindError, ConnectError};
use crate::tenant::ConnectionTarget;
use async_trait::async_trait;
use sqlx::postgres::{PgConnectOptions, PgPoolOptions};
use sqlx::PgPool;
use std::str::FromStr;

/// Opens tenant connections with sqlx.
#[derive(Clone, Debug, Default)]
pub struct PgConnector;

#[async_trait]
impl Connector for PgConnector {
    type Connection = PgTenantConnection;

    async fn connect(
        &self,
        target: &ConnectionTarget,
        timeouts: &DriverTimeouts,
    ) -> Result<PgTenantConnection, ConnectError> {
        let opts = PgConnectOptions::from_str(&target.uri)?
            .options([("statement_timeout", timeouts.socket.as_millis().to_string())]);
        let pool = PgPoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .acquire_timeout(timeouts.server_selection)
            .idle_timeout(timeouts.heartbeat)
            .test_before_acquire(true)
            .connect_with(opts)
            .await?;
        Ok(PgTenantConnection { pool })
    }
}

/// A tenant's live connection. Clones share the pool.
#[derive(Clone, Debug)]
pub struct PgTenantConnection {
    pool: PgPool,
}

impl PgTenantConnection {
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl TenantConnection for PgTenantConnection {
    fn is_live(&self) -> bool {
        !self.pool.is_closed() && self.pool.size() > 0
    }

    async fn close(&self) -> Result<(), ConnectError> {
        self.pool.close().await;
        Ok(())
    }
}

#[async_trait]
impl ModelBinder for PgTenantConnection {
    async fn lookup_model(
        &self,
        entity: &EntityDefinition,
    ) -> Result<Option<BoundModel>, BindError> {
        let exists: (bool,) = sqlx::query_as(
            "SELECT EXISTS(SELECT 1 FROM information_schema.tables \
             WHERE table_schema = $1 AND table_name = $2)",
        )
        .bind(&entity.schema)
        .bind(&entity.table)
        .fetch_one(&self.pool)
        .await?;
        Ok(exists.0.then(|| BoundModel::for_entity(entity)))
    }

    async fn bind_model(&self, entity: &EntityDefinition) -> Result<BoundModel, BindError> {
        let ddl = create_table_sql(entity)?;
        sqlx::query(&format!("CREATE SCHEMA IF NOT EXISTS {}", quote_ident(&entity.schema)))
            .execute(&self.pool)
            .await?;
        sqlx::query(&ddl).execute(&self.pool).await?;
        Ok(BoundModel::for_entity(entity))
    }

    async fn discard_model(&self, entity: &EntityDefinition) -> Result<(), BindError> {
        check_ident(&entity.schema)?;
        check_ident(&entity.table)?;
        sqlx::query(&format!(
            "DROP TABLE IF EXISTS {}.{}",
            quote_ident(&entity.schema),
            quote_ident(&entity.table)
        ))
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

fn quote_literal(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

fn check_ident(name: &str) -> Result<(), BindError> {
    if is_valid_identifier(name) {
        Ok(())
    } else {
        Err(BindError::InvalidIdentifier(name.to_string()))
    }
}

/// `CREATE TABLE` for an entity. Plain CREATE so a concurrent binder surfaces as an error.
pub fn create_table_sql(entity: &EntityDefinition) -> Result<String, BindError> {
    check_ident(&entity.schema)?;
    check_ident(&entity.table)?;
    if entity.columns.is_empty() {
        return Err(BindError::Rejected(format!("entity {} has no columns", entity.name)));
    }

    let mut defs = Vec::with_capacity(entity.columns.len() + 1);
    for c in &entity.columns {
        check_ident(&c.name)?;
        let mut def = format!("{} {}", quote_ident(&c.name), c.data_type);
        if !c.nullable {
            def.push_str(" NOT NULL");
        }
        match &c.default {
            Some(ColumnDefault::Literal(s)) => {
                def.push_str(" DEFAULT ");
                def.push_str(&quote_literal(s));
            }
            Some(ColumnDefault::Expression { expression }) => {
                def.push_str(" DEFAULT ");
                def.push_str(expression);
            }
            None => {}
        }
        defs.push(def);
    }
    let pk: Vec<String> = entity.primary_key.columns().into_iter().map(quote_ident).collect();
    defs.push(format!("PRIMARY KEY ({})", pk.join(", ")));

    Ok(format!(
        "CREATE TABLE {}.{} ({})",
        quote_ident(&entity.schema),
        quote_ident(&entity.table),
        defs.join(", ")
    ))
}
