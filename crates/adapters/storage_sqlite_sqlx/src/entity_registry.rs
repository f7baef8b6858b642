//! `SQLite` implementation of [`EntityRegistry`].

use std::collections::HashSet;
use std::future::Future;
use std::str::FromStr;

use sqlx::sqlite::SqliteRow;
use sqlx::{FromRow, Row, SqlitePool};

use devlink_app::ports::{EntityRegistry, NewRegistration};
use devlink_domain::error::LinkError;
use devlink_domain::id::{EntityId, EntryId};
use devlink_domain::registry::{RegistryRecord, generate_entity_id};
use devlink_domain::time::now;

use crate::error::{StorageError, decode};

struct Wrapper(RegistryRecord);

impl<'r> FromRow<'r, SqliteRow> for Wrapper {
    fn from_row(row: &'r SqliteRow) -> Result<Self, sqlx::Error> {
        let id: String = row.try_get("id")?;
        let config_entry_id: Option<String> = row.try_get("config_entry_id")?;
        let created_at: String = row.try_get("created_at")?;

        let id = EntityId::from_str(&id).map_err(decode)?;
        let config_entry_id = config_entry_id
            .map(|s| EntryId::from_str(&s))
            .transpose()
            .map_err(decode)?;
        let created_at = chrono::DateTime::parse_from_rfc3339(&created_at)
            .map_err(decode)?
            .to_utc();

        Ok(Self(RegistryRecord {
            id,
            entity_id: row.try_get("entity_id")?,
            platform: row.try_get("platform")?,
            domain: row.try_get("domain")?,
            unique_id: row.try_get("unique_id")?,
            original_name: row.try_get("original_name")?,
            config_entry_id,
            created_at,
        }))
    }
}

const SELECT_BY_KEY: &str =
    "SELECT * FROM registry_entities WHERE platform = ? AND domain = ? AND unique_id = ?";
const SELECT_ENTITY_IDS_IN_DOMAIN: &str =
    "SELECT entity_id FROM registry_entities WHERE domain = ?";
const INSERT: &str = r"
    INSERT INTO registry_entities (id, entity_id, platform, domain, unique_id, original_name, config_entry_id, created_at)
    VALUES (?, ?, ?, ?, ?, ?, ?, ?)
";

/// `SQLite`-backed entity registry.
pub struct SqliteEntityRegistry {
    pool: SqlitePool,
}

impl SqliteEntityRegistry {
    #[must_use]
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Register a pre-existing entity as is, e.g. one created before the
    /// current unique-id scheme.
    ///
    /// # Errors
    ///
    /// Returns a storage error if the key or the entity id is already taken.
    pub async fn import(&self, record: RegistryRecord) -> Result<RegistryRecord, LinkError> {
        insert(&self.pool, &record).await?;
        Ok(record)
    }
}

async fn insert<'e, X>(executor: X, record: &RegistryRecord) -> Result<(), StorageError>
where
    X: sqlx::SqliteExecutor<'e>,
{
    sqlx::query(INSERT)
        .bind(record.id.to_string())
        .bind(&record.entity_id)
        .bind(&record.platform)
        .bind(&record.domain)
        .bind(&record.unique_id)
        .bind(record.original_name.as_deref())
        .bind(record.config_entry_id.map(|id| id.to_string()))
        .bind(record.created_at.to_rfc3339())
        .execute(executor)
        .await?;
    Ok(())
}

impl EntityRegistry for SqliteEntityRegistry {
    fn get_or_create(
        &self,
        registration: NewRegistration,
    ) -> impl Future<Output = Result<RegistryRecord, LinkError>> + Send {
        let pool = self.pool.clone();
        async move {
            let mut tx = pool.begin().await.map_err(StorageError::from)?;

            let existing: Option<Wrapper> = sqlx::query_as(SELECT_BY_KEY)
                .bind(&registration.platform)
                .bind(&registration.domain)
                .bind(&registration.unique_id)
                .fetch_optional(&mut *tx)
                .await
                .map_err(StorageError::from)?;
            if let Some(Wrapper(record)) = existing {
                return Ok(record);
            }

            let taken: HashSet<String> =
                sqlx::query_scalar::<_, String>(SELECT_ENTITY_IDS_IN_DOMAIN)
                    .bind(&registration.domain)
                    .fetch_all(&mut *tx)
                    .await
                    .map_err(StorageError::from)?
                    .into_iter()
                    .collect();
            let entity_id = generate_entity_id(
                &registration.domain,
                registration.original_name.as_deref(),
                &registration.unique_id,
                |candidate| taken.contains(candidate),
            );

            let record = RegistryRecord {
                id: EntityId::new(),
                entity_id,
                platform: registration.platform,
                domain: registration.domain,
                unique_id: registration.unique_id,
                original_name: registration.original_name,
                config_entry_id: registration.config_entry_id,
                created_at: now(),
            };
            insert(&mut *tx, &record).await?;
            tx.commit().await.map_err(StorageError::from)?;

            tracing::info!(
                entity_id = %record.entity_id,
                unique_id = %record.unique_id,
                "entity registered"
            );
            Ok(record)
        }
    }

    fn find_by_unique_id(
        &self,
        platform: &str,
        domain: &str,
        unique_id: &str,
    ) -> impl Future<Output = Result<Option<RegistryRecord>, LinkError>> + Send {
        let pool = self.pool.clone();
        let key = (
            platform.to_string(),
            domain.to_string(),
            unique_id.to_string(),
        );
        async move {
            let row: Option<Wrapper> = sqlx::query_as(SELECT_BY_KEY)
                .bind(key.0)
                .bind(key.1)
                .bind(key.2)
                .fetch_optional(&pool)
                .await
                .map_err(StorageError::from)?;

            Ok(row.map(|w| w.0))
        }
    }
}
