//! `SQLite` implementation of [`EntryStore`].

use std::future::Future;
use std::str::FromStr;

use sqlx::sqlite::SqliteRow;
use sqlx::{FromRow, Row, SqlitePool};

use devlink_app::ports::EntryStore;
use devlink_domain::entry::{Credentials, DeviceEntry};
use devlink_domain::error::{LinkError, NotFoundError};
use devlink_domain::id::EntryId;
use devlink_domain::mac::MacAddress;

use crate::error::{StorageError, decode};

/// Wrapper for converting database rows into domain [`DeviceEntry`].
struct Wrapper(DeviceEntry);

impl Wrapper {
    fn maybe(value: Option<Self>) -> Option<DeviceEntry> {
        value.map(|w| w.0)
    }
}

impl<'r> FromRow<'r, SqliteRow> for Wrapper {
    fn from_row(row: &'r SqliteRow) -> Result<Self, sqlx::Error> {
        let id: String = row.try_get("id")?;
        let title: String = row.try_get("title")?;
        let host: Option<String> = row.try_get("host")?;
        let unique_id: String = row.try_get("unique_id")?;
        let username: Option<String> = row.try_get("username")?;
        let password: Option<String> = row.try_get("password")?;
        let device_config: Option<String> = row.try_get("device_config")?;
        let created_at: String = row.try_get("created_at")?;

        let id = EntryId::from_str(&id).map_err(decode)?;
        let unique_id = MacAddress::from_str(&unique_id).map_err(decode)?;
        let credentials = username.map(|username| Credentials {
            username,
            password: password.unwrap_or_default(),
        });
        let device_config: Option<serde_json::Value> = device_config
            .map(|raw| serde_json::from_str(&raw))
            .transpose()
            .map_err(decode)?;
        let created_at = chrono::DateTime::parse_from_rfc3339(&created_at)
            .map_err(decode)?
            .to_utc();

        Ok(Self(DeviceEntry {
            id,
            title,
            host,
            unique_id,
            credentials,
            device_config,
            created_at,
        }))
    }
}

const INSERT: &str = r"
    INSERT INTO device_entries (id, title, host, unique_id, username, password, device_config, created_at)
    VALUES (?, ?, ?, ?, ?, ?, ?, ?)
";
const SELECT_BY_ID: &str = "SELECT * FROM device_entries WHERE id = ?";
const SELECT_BY_UNIQUE_ID: &str = "SELECT * FROM device_entries WHERE unique_id = ?";
const SELECT_ALL: &str = "SELECT * FROM device_entries ORDER BY created_at, id";
const UPDATE: &str = r"
    UPDATE device_entries SET
        title = ?, host = ?, unique_id = ?, username = ?, password = ?, device_config = ?
    WHERE id = ?
";
const DELETE_BY_ID: &str = "DELETE FROM device_entries WHERE id = ?";

fn config_json(entry: &DeviceEntry) -> Result<Option<String>, StorageError> {
    entry
        .device_config
        .as_ref()
        .map(serde_json::to_string)
        .transpose()
        .map_err(StorageError::from)
}

/// `SQLite`-backed entry store.
pub struct SqliteEntryStore {
    pool: SqlitePool,
}

impl SqliteEntryStore {
    /// Create a new store using the given connection pool.
    #[must_use]
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

impl EntryStore for SqliteEntryStore {
    fn create(
        &self,
        entry: DeviceEntry,
    ) -> impl Future<Output = Result<DeviceEntry, LinkError>> + Send {
        let pool = self.pool.clone();
        async move {
            let device_config = config_json(&entry)?;
            let credentials = entry.credentials.as_ref();
            sqlx::query(INSERT)
                .bind(entry.id.to_string())
                .bind(&entry.title)
                .bind(entry.host.as_deref())
                .bind(entry.unique_id.to_string())
                .bind(credentials.map(|c| c.username.as_str()))
                .bind(credentials.map(|c| c.password.as_str()))
                .bind(device_config)
                .bind(entry.created_at.to_rfc3339())
                .execute(&pool)
                .await
                .map_err(StorageError::from)?;

            Ok(entry)
        }
    }

    fn get_by_id(
        &self,
        id: EntryId,
    ) -> impl Future<Output = Result<Option<DeviceEntry>, LinkError>> + Send {
        let pool = self.pool.clone();
        async move {
            let row: Option<Wrapper> = sqlx::query_as(SELECT_BY_ID)
                .bind(id.to_string())
                .fetch_optional(&pool)
                .await
                .map_err(StorageError::from)?;

            Ok(Wrapper::maybe(row))
        }
    }

    fn find_by_unique_id(
        &self,
        mac: MacAddress,
    ) -> impl Future<Output = Result<Option<DeviceEntry>, LinkError>> + Send {
        let pool = self.pool.clone();
        async move {
            let row: Option<Wrapper> = sqlx::query_as(SELECT_BY_UNIQUE_ID)
                .bind(mac.to_string())
                .fetch_optional(&pool)
                .await
                .map_err(StorageError::from)?;

            Ok(Wrapper::maybe(row))
        }
    }

    fn get_all(&self) -> impl Future<Output = Result<Vec<DeviceEntry>, LinkError>> + Send {
        let pool = self.pool.clone();
        async move {
            let rows: Vec<Wrapper> = sqlx::query_as(SELECT_ALL)
                .fetch_all(&pool)
                .await
                .map_err(StorageError::from)?;

            Ok(rows.into_iter().map(|w| w.0).collect())
        }
    }

    fn update(
        &self,
        entry: DeviceEntry,
    ) -> impl Future<Output = Result<DeviceEntry, LinkError>> + Send {
        let pool = self.pool.clone();
        async move {
            let device_config = config_json(&entry)?;
            let credentials = entry.credentials.as_ref();
            let result = sqlx::query(UPDATE)
                .bind(&entry.title)
                .bind(entry.host.as_deref())
                .bind(entry.unique_id.to_string())
                .bind(credentials.map(|c| c.username.as_str()))
                .bind(credentials.map(|c| c.password.as_str()))
                .bind(device_config)
                .bind(entry.id.to_string())
                .execute(&pool)
                .await
                .map_err(StorageError::from)?;

            if result.rows_affected() == 0 {
                return Err(NotFoundError {
                    entity: "DeviceEntry",
                    id: entry.id.to_string(),
                }
                .into());
            }
            Ok(entry)
        }
    }

    fn delete(&self, id: EntryId) -> impl Future<Output = Result<(), LinkError>> + Send {
        let pool = self.pool.clone();
        async move {
            sqlx::query(DELETE_BY_ID)
                .bind(id.to_string())
                .execute(&pool)
                .await
                .map_err(StorageError::from)?;

            Ok(())
        }
    }
}
