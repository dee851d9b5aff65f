//! Tenant identity as handed over by the tenant directory, and connection-target derivation.

use crate::error::ResolveError;
use serde::{Deserialize, Serialize};

/// Descriptor for one tenant (school). Immutable once handed to the cache.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TenantIdentity {
    pub id: String,
    #[serde(default)]
    pub name: String,
    /// Full connection URI, used verbatim when present.
    #[serde(default)]
    pub connection_uri: Option<String>,
    /// Database name to substitute into the base URI.
    #[serde(default)]
    pub database_name: Option<String>,
    /// Domain such as `bluehighschool.edu`; its first label names the database when no override
    /// is set.
    #[serde(default)]
    pub domain: Option<String>,
}

impl TenantIdentity {
    pub fn new(id: impl Into<String>) -> Self {
        TenantIdentity {
            id: id.into(),
            ..Default::default()
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_connection_uri(mut self, uri: impl Into<String>) -> Self {
        self.connection_uri = Some(uri.into());
        self
    }

    pub fn with_database_name(mut self, database_name: impl Into<String>) -> Self {
        self.database_name = Some(database_name.into());
        self
    }

    pub fn with_domain(mut self, domain: impl Into<String>) -> Self {
        self.domain = Some(domain.into());
        self
    }

    /// Trimmed tenant id, or `InvalidTenant` when it is missing.
    pub fn key(&self) -> Result<&str, ResolveError> {
        let id = self.id.trim();
        if id.is_empty() {
            return Err(ResolveError::InvalidTenant(format!(
                "tenant '{}' has no id",
                self.name
            )));
        }
        Ok(id)
    }
}

/// Where a tenant's connection goes. `uri` may contain credentials; use `redacted()` for logs.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConnectionTarget {
    pub uri: String,
    pub database: Option<String>,
}

impl ConnectionTarget {
    /// URI with any `user:password@` section masked.
    pub fn redacted(&self) -> String {
        redact_credentials(&self.uri)
    }
}

/// Build the connection target for a tenant.
///
/// An explicit `connection_uri` wins. Otherwise the database segment of `base_uri` is replaced with
/// the derived database name, keeping the query string as-is.
pub fn derive_target(
    tenant: &TenantIdentity,
    base_uri: &str,
) -> Result<ConnectionTarget, ResolveError> {
    let id = tenant.key()?;
    if let Some(uri) = non_empty(tenant.connection_uri.as_deref()) {
        return Ok(ConnectionTarget {
            uri: uri.to_string(),
            database: database_segment(uri),
        });
    }
    let database = derive_database_name(tenant).unwrap_or_else(|| id.to_string());
    Ok(ConnectionTarget {
        uri: replace_database_segment(base_uri, &database),
        database: Some(database),
    })
}

/// Database name from the override, else from the domain's first label. `None` leaves the
/// caller to fall back to the tenant id.
pub fn derive_database_name(tenant: &TenantIdentity) -> Option<String> {
    if let Some(name) = non_empty(tenant.database_name.as_deref()) {
        return Some(name.to_string());
    }
    non_empty(tenant.domain.as_deref()).and_then(sanitize_domain)
}

/// `Blue-High.School.edu` -> `blue_high`: first label, lower-cased, non-alphanumerics to `_`.
pub fn sanitize_domain(domain: &str) -> Option<String> {
    let prefix = domain.trim().split('.').next().unwrap_or("");
    let sanitized: String = prefix
        .to_lowercase()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect();
    if sanitized.is_empty() {
        None
    } else {
        Some(sanitized)
    }
}

/// Swap the path segment after the authority for `database`; the query string is reattached
/// unchanged.
pub fn replace_database_segment(base_uri: &str, database: &str) -> String {
    let (without_query, query) = match base_uri.split_once('?') {
        Some((head, q)) => (head, Some(q)),
        None => (base_uri, None),
    };
    let authority_start = without_query.find("://").map(|i| i + 3).unwrap_or(0);
    let prefix = match without_query[authority_start..].find('/') {
        Some(slash) => &without_query[..authority_start + slash],
        None => without_query,
    };
    let mut uri = format!("{}/{}", prefix, database);
    if let Some(q) = query {
        uri.push('?');
        uri.push_str(q);
    }
    uri
}

fn database_segment(uri: &str) -> Option<String> {
    let without_query = uri.split('?').next().unwrap_or("");
    let authority_start = without_query.find("://").map(|i| i + 3).unwrap_or(0);
    let rest = &without_query[authority_start..];
    let slash = rest.find('/')?;
    non_empty(Some(&rest[slash + 1..])).map(String::from)
}

fn redact_credentials(uri: &str) -> String {
    let authority_start = match uri.find("://") {
        Some(i) => i + 3,
        None => return uri.to_string(),
    };
    let authority_end = uri[authority_start..]
        .find(['/', '?'])
        .map(|i| authority_start + i)
        .unwrap_or(uri.len());
    match uri[authority_start..authority_end].rfind('@') {
        Some(at) => format!("{}***{}", &uri[..authority_start], &uri[authority_start + at..]),
        None => uri.to_string(),
    }
}

fn non_empty(s: Option<&str>) -> Option<&str> {
    s.map(str::trim).filter(|s| !s.is_empty())
}
