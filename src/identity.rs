use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use log::{error, warn};
use sqlx::MySqlPool;

/// Name shown for an identity whose display name cannot be resolved.
pub fn fallback_name(id: &str) -> String {
    format!("Player_{}", id.chars().take(8).collect::<String>())
}

/// Read-only view of the identity provider's user directory.
#[async_trait]
pub trait IdentityDirectory: Send + Sync {
    /// The display name set for `id`, if any.
    async fn display_name(&self, id: &str) -> anyhow::Result<Option<String>>;
}

/// Resolves a batch of ids. Lookup failures and unnamed identities fall back
/// to [`fallback_name`]; this never fails as a whole.
pub async fn resolve_names(directory: &dyn IdentityDirectory, ids: &[String]) -> BTreeMap<String, String> {
    let mut names = BTreeMap::new();
    for id in ids {
        if names.contains_key(id) {
            continue;
        }
        let name = match directory.display_name(id).await {
            Ok(Some(name)) if !name.trim().is_empty() => name,
            Ok(_) => fallback_name(id),
            Err(err) => {
                warn!("Name lookup for {} failed: {:?}", id, err);
                fallback_name(id)
            }
        };
        names.insert(id.clone(), name);
    }
    names
}

/// Directory backed by the `user` table the identity provider syncs into.
pub struct MySqlDirectory {
    pool: MySqlPool,
}

impl MySqlDirectory {
    pub fn new(pool: MySqlPool) -> Self {
        MySqlDirectory { pool }
    }
}

#[async_trait]
impl IdentityDirectory for MySqlDirectory {
    async fn display_name(&self, id: &str) -> anyhow::Result<Option<String>> {
        let sql = "SELECT display_name FROM user WHERE name = ?";
        match sqlx::query_scalar::<_, Option<String>>(sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
        {
            Ok(name) => Ok(name.flatten()),
            Err(err) => {
                error!("Error fetching display name: {:?}", err);
                Err(err.into())
            }
        }
    }
}

/// Fixed name table, for tests and local runs without a user directory.
#[derive(Default, Clone)]
pub struct StaticDirectory {
    names: HashMap<String, String>,
}

impl StaticDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, id: &str, name: &str) -> Self {
        self.names.insert(id.to_string(), name.to_string());
        self
    }
}

#[async_trait]
impl IdentityDirectory for StaticDirectory {
    async fn display_name(&self, id: &str) -> anyhow::Result<Option<String>> {
        Ok(self.names.get(id).cloned())
    }
}
