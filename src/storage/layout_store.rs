//! Dashboard layout persistence.
//!
//! Layouts are opaque JSON documents keyed by `(dashboard_id, name)`.
//! Deleting a layout only deactivates it; saving under the same key
//! reactivates it.

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{Map, Value as JsonValue, json};
use sqlx::Row;

use crate::storage::StorageError;
use crate::storage::db::SqlitePool;

/// Dashboard and layout name used when the caller supplies none.
pub const DEFAULT_LAYOUT_KEY: &str = "default";

/// Version stamped into every saved layout document.
pub const LAYOUT_VERSION: &str = "1.0";

/// Fields a layout document must carry to be accepted.
const REQUIRED_FIELDS: &[&str] = &["panels", "timestamp", "version"];

// =============================================================================
// Types
// =============================================================================

/// Result of a successful save.
#[derive(Debug, Clone, Serialize)]
pub struct SavedLayout {
    pub dashboard_id: String,
    pub layout_name: String,
    pub timestamp: DateTime<Utc>,
}

/// One stored layout of a dashboard.
#[derive(Debug, Clone, Serialize)]
pub struct LayoutSummary {
    pub id: i64,
    pub name: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A dashboard with at least one active layout.
#[derive(Debug, Clone, Serialize)]
pub struct DashboardSummary {
    pub dashboard_id: String,
    pub layout_count: i64,
    pub last_updated: DateTime<Utc>,
}

// =============================================================================
// Layout Store
// =============================================================================

/// Layout storage facade.
#[derive(Clone)]
pub struct LayoutStore {
    pool: SqlitePool,
}

impl std::fmt::Debug for LayoutStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LayoutStore").finish_non_exhaustive()
    }
}

impl LayoutStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Whether a layout document carries the required fields.
    pub fn is_valid(config: &JsonValue) -> bool {
        config
            .as_object()
            .is_some_and(|obj| REQUIRED_FIELDS.iter().all(|f| obj.contains_key(*f)))
    }

    /// Layout returned when nothing is stored under a key.
    pub fn default_layout(dashboard_id: &str, name: &str) -> JsonValue {
        json!({
            "panels": [],
            "timestamp": Utc::now().to_rfc3339(),
            "version": LAYOUT_VERSION,
            "dashboard_id": dashboard_id,
            "name": name,
        })
    }

    /// Upsert a layout document.
    ///
    /// The stored document is stamped with `version`, `last_modified`,
    /// `dashboard_id` and `name`.
    pub async fn save(
        &self,
        dashboard_id: &str,
        name: &str,
        mut config: Map<String, JsonValue>,
    ) -> Result<SavedLayout, StorageError> {
        let now = Utc::now();
        config.insert("version".to_string(), json!(LAYOUT_VERSION));
        config.insert("last_modified".to_string(), json!(now.to_rfc3339()));
        config.insert("dashboard_id".to_string(), json!(dashboard_id));
        config.insert("name".to_string(), json!(name));
        let config_json = serde_json::to_string(&config)?;

        sqlx::query(
            r#"
            INSERT INTO dashboard_layouts (dashboard_id, name, config, created_at, updated_at, is_active)
            VALUES ($1, $2, $3, $4, $4, 1)
            ON CONFLICT (dashboard_id, name) DO UPDATE SET
                config = excluded.config,
                updated_at = excluded.updated_at,
                is_active = 1
            "#,
        )
        .bind(dashboard_id)
        .bind(name)
        .bind(&config_json)
        .bind(now.timestamp_millis())
        .execute(self.pool.inner())
        .await?;

        tracing::info!(
            dashboard_id,
            name,
            bytes = config_json.len(),
            panels = config
                .get("panels")
                .and_then(JsonValue::as_array)
                .map_or(0, Vec::len),
            "Layout saved"
        );

        Ok(SavedLayout {
            dashboard_id: dashboard_id.to_string(),
            layout_name: name.to_string(),
            timestamp: now,
        })
    }

    /// Load the active layout, or `None` if nothing is stored.
    pub async fn find(&self, dashboard_id: &str, name: &str) -> Result<Option<JsonValue>, StorageError> {
        let row = sqlx::query(
            "SELECT config FROM dashboard_layouts
             WHERE dashboard_id = $1 AND name = $2 AND is_active = 1",
        )
        .bind(dashboard_id)
        .bind(name)
        .fetch_optional(self.pool.inner())
        .await?;

        match row {
            Some(row) => {
                let raw: String = row.try_get("config")?;
                Ok(Some(serde_json::from_str(&raw)?))
            }
            None => Ok(None),
        }
    }

    /// Load the active layout, falling back to [`Self::default_layout`].
    pub async fn load(&self, dashboard_id: &str, name: &str) -> Result<JsonValue, StorageError> {
        match self.find(dashboard_id, name).await? {
            Some(config) => Ok(config),
            None => {
                tracing::debug!(dashboard_id, name, "Layout not found, returning default");
                Ok(Self::default_layout(dashboard_id, name))
            }
        }
    }

    /// Active layouts of a dashboard, most recently updated first.
    pub async fn list(&self, dashboard_id: &str) -> Result<Vec<LayoutSummary>, StorageError> {
        let rows = sqlx::query(
            "SELECT id, name, created_at, updated_at FROM dashboard_layouts
             WHERE dashboard_id = $1 AND is_active = 1
             ORDER BY updated_at DESC, id DESC",
        )
        .bind(dashboard_id)
        .fetch_all(self.pool.inner())
        .await?;

        rows.iter()
            .map(|row| {
                Ok(LayoutSummary {
                    id: row.try_get("id")?,
                    name: row.try_get("name")?,
                    created_at: from_millis(row.try_get("created_at")?),
                    updated_at: from_millis(row.try_get("updated_at")?),
                })
            })
            .collect::<Result<Vec<_>, sqlx::Error>>()
            .map_err(StorageError::from)
    }

    /// Dashboards with active layouts, most recently updated first.
    pub async fn dashboards(&self) -> Result<Vec<DashboardSummary>, StorageError> {
        let rows = sqlx::query(
            "SELECT dashboard_id, COUNT(*) AS layout_count, MAX(updated_at) AS last_updated
             FROM dashboard_layouts
             WHERE is_active = 1
             GROUP BY dashboard_id
             ORDER BY last_updated DESC",
        )
        .fetch_all(self.pool.inner())
        .await?;

        rows.iter()
            .map(|row| {
                Ok(DashboardSummary {
                    dashboard_id: row.try_get("dashboard_id")?,
                    layout_count: row.try_get("layout_count")?,
                    last_updated: from_millis(row.try_get("last_updated")?),
                })
            })
            .collect::<Result<Vec<_>, sqlx::Error>>()
            .map_err(StorageError::from)
    }

    /// Deactivate a layout. Returns `false` if no active layout matched.
    pub async fn delete(&self, dashboard_id: &str, name: &str) -> Result<bool, StorageError> {
        let result = sqlx::query(
            "UPDATE dashboard_layouts SET is_active = 0, updated_at = $3
             WHERE dashboard_id = $1 AND name = $2 AND is_active = 1",
        )
        .bind(dashboard_id)
        .bind(name)
        .bind(Utc::now().timestamp_millis())
        .execute(self.pool.inner())
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Copy a layout to another key. A missing source copies the default layout.
    pub async fn duplicate(
        &self,
        source_dashboard_id: &str,
        source_name: &str,
        target_dashboard_id: &str,
        target_name: &str,
    ) -> Result<SavedLayout, StorageError> {
        let source = self.load(source_dashboard_id, source_name).await?;
        let config = match source {
            JsonValue::Object(map) => map,
            _ => Map::new(),
        };
        self.save(target_dashboard_id, target_name, config).await
    }
}

fn from_millis(ms: i64) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(ms).unwrap_or(DateTime::UNIX_EPOCH)
}
