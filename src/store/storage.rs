use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use futures::Stream;
use log::{debug, info};
use rusqlite::{params, Connection, Row};
use tokio::sync::watch;

use super::error::StoreError;
use super::record::{LocationRecord, NewLocation, SortDirection};

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS locations (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    owner_id TEXT NOT NULL,
    latitude REAL NOT NULL,
    longitude REAL NOT NULL,
    timestamp INTEGER NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_locations_timestamp ON locations(timestamp);
"#;

const COLUMNS: &str = "id, owner_id, latitude, longitude, timestamp";

/// Append-only log of location records.
///
/// All access goes through one connection behind a mutex, so inserts are
/// serialized and ids follow completion order. Every change bumps a version
/// counter that drives [`LocationStore::subscribe`].
pub struct LocationStore {
    conn: Mutex<Connection>,
    version: watch::Sender<u64>,
}

impl LocationStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        info!("Opening location store at {}", path.display());
        Self::from_connection(Connection::open(path)?)
    }

    #[cfg(test)]
    pub(crate) fn in_memory() -> Result<Self, StoreError> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self, StoreError> {
        conn.execute_batch(SCHEMA)?;
        let (version, _) = watch::channel(0);
        Ok(Self {
            conn: Mutex::new(conn),
            version,
        })
    }

    // a panic mid-statement leaves sqlite itself consistent
    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn changed(&self) {
        self.version.send_modify(|v| *v += 1);
    }

    pub fn insert(&self, location: NewLocation) -> Result<LocationRecord, StoreError> {
        location.validate()?;

        let id = {
            let conn = self.conn();
            conn.execute(
                "INSERT INTO locations (owner_id, latitude, longitude, timestamp) VALUES (?1, ?2, ?3, ?4)",
                params![
                    location.owner_id,
                    location.latitude,
                    location.longitude,
                    location.timestamp
                ],
            )?;
            conn.last_insert_rowid()
        };

        self.changed();
        Ok(location.into_record(id))
    }

    /// Inserts every record or none of them.
    pub fn insert_many(
        &self,
        locations: Vec<NewLocation>,
    ) -> Result<Vec<LocationRecord>, StoreError> {
        for (i, location) in locations.iter().enumerate() {
            location.validate().map_err(|e| match e {
                StoreError::InvalidRecord(msg) => {
                    StoreError::InvalidRecord(format!("record {}: {}", i, msg))
                }
                other => other,
            })?;
        }
        if locations.is_empty() {
            return Ok(Vec::new());
        }

        let records = {
            let mut conn = self.conn();
            let tx = conn.transaction()?;
            let mut records = Vec::with_capacity(locations.len());
            {
                let mut stmt = tx.prepare(
                    "INSERT INTO locations (owner_id, latitude, longitude, timestamp) VALUES (?1, ?2, ?3, ?4)",
                )?;
                for location in locations {
                    stmt.execute(params![
                        location.owner_id,
                        location.latitude,
                        location.longitude,
                        location.timestamp
                    ])?;
                    records.push(location.into_record(tx.last_insert_rowid()));
                }
            }
            tx.commit()?;
            records
        };

        debug!("Inserted batch of {} locations", records.len());
        self.changed();
        Ok(records)
    }

    pub fn query_all(&self, direction: SortDirection) -> Result<Vec<LocationRecord>, StoreError> {
        let sql = format!(
            "SELECT {COLUMNS} FROM locations ORDER BY timestamp {dir}, id {dir}",
            dir = direction.keyword()
        );
        let conn = self.conn();
        let mut stmt = conn.prepare(&sql)?;
        let records = stmt
            .query_map([], read_record)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(records)
    }

    pub fn query_by_owner(
        &self,
        owner_id: &str,
        direction: SortDirection,
    ) -> Result<Vec<LocationRecord>, StoreError> {
        let sql = format!(
            "SELECT {COLUMNS} FROM locations WHERE owner_id = ?1 ORDER BY timestamp {dir}, id {dir}",
            dir = direction.keyword()
        );
        let conn = self.conn();
        let mut stmt = conn.prepare(&sql)?;
        let records = stmt
            .query_map(params![owner_id], read_record)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(records)
    }

    /// The `n` newest records, newest first.
    pub fn query_recent(&self, n: i64) -> Result<Vec<LocationRecord>, StoreError> {
        if n <= 0 {
            return Ok(Vec::new());
        }
        let conn = self.conn();
        let mut stmt = conn.prepare(&format!(
            "SELECT {COLUMNS} FROM locations ORDER BY timestamp DESC, id DESC LIMIT ?1"
        ))?;
        let records = stmt
            .query_map(params![n], read_record)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(records)
    }

    pub fn count(&self) -> Result<u64, StoreError> {
        let count: i64 = self
            .conn()
            .query_row("SELECT COUNT(*) FROM locations", [], |row| row.get(0))?;
        Ok(count as u64)
    }

    pub fn delete_all(&self) -> Result<usize, StoreError> {
        let removed = self.conn().execute("DELETE FROM locations", [])?;
        info!("Cleared location store ({} records)", removed);
        if removed > 0 {
            self.changed();
        }
        Ok(removed)
    }

    /// Removes records with `timestamp < threshold`.
    pub fn delete_older_than(&self, threshold: i64) -> Result<usize, StoreError> {
        let removed = self
            .conn()
            .execute("DELETE FROM locations WHERE timestamp < ?1", params![threshold])?;
        if removed > 0 {
            info!("Pruned {} locations older than {}", removed, threshold);
            self.changed();
        }
        Ok(removed)
    }

    /// Blocks every other store call until the guard is dropped.
    #[cfg(test)]
    pub(crate) fn hold_connection(&self) -> MutexGuard<'_, Connection> {
        self.conn()
    }

    #[cfg(test)]
    pub(crate) fn execute_raw(&self, sql: &str) -> Result<(), StoreError> {
        self.conn().execute_batch(sql)?;
        Ok(())
    }

    /// Live view of the log.
    ///
    /// Nothing runs until the stream is polled. The first item is the current
    /// snapshot, then one snapshot follows each change. Changes that land
    /// while a snapshot is still being read are folded into the next one.
    /// Dropping the stream ends the subscription.
    pub fn subscribe(
        self: &Arc<Self>,
        direction: SortDirection,
    ) -> impl Stream<Item = Result<Vec<LocationRecord>, StoreError>> + Send + 'static {
        let rx = self.version.subscribe();
        let store = Arc::clone(self);

        futures::stream::unfold((store, rx, true), move |(store, mut rx, first)| async move {
            if !first && rx.changed().await.is_err() {
                return None;
            }
            rx.borrow_and_update();

            let reader = Arc::clone(&store);
            let snapshot = tokio::task::spawn_blocking(move || reader.query_all(direction))
                .await
                .map_err(StoreError::from)
                .and_then(|result| result);

            Some((snapshot, (store, rx, false)))
        })
    }
}

fn read_record(row: &Row<'_>) -> rusqlite::Result<LocationRecord> {
    Ok(LocationRecord {
        id: row.get(0)?,
        owner_id: row.get(1)?,
        latitude: row.get(2)?,
        longitude: row.get(3)?,
        timestamp: row.get(4)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;
    use std::time::Duration;

    fn loc(owner: &str, timestamp: i64) -> NewLocation {
        NewLocation::new(owner, 48.2, 16.37, timestamp)
    }

    #[test]
    fn test_insert_assigns_increasing_ids() {
        let store = LocationStore::in_memory().unwrap();
        let a = store.insert(loc("user_1", 50)).unwrap();
        let b = store.insert(loc("user_1", 10)).unwrap();
        assert!(b.id > a.id);
        assert_eq!(store.count().unwrap(), 2);
    }

    #[test]
    fn test_chronological_order_independent_of_insertion() {
        let store = LocationStore::in_memory().unwrap();
        let t0 = 1_700_000_000_000;
        for t in [t0, t0 + 10, t0 + 5] {
            store.insert(loc("user_1", t)).unwrap();
        }

        let asc: Vec<i64> = store
            .query_all(SortDirection::Asc)
            .unwrap()
            .iter()
            .map(|r| r.timestamp)
            .collect();
        assert_eq!(asc, vec![t0, t0 + 5, t0 + 10]);

        let desc: Vec<i64> = store
            .query_all(SortDirection::Desc)
            .unwrap()
            .iter()
            .map(|r| r.timestamp)
            .collect();
        assert_eq!(desc, vec![t0 + 10, t0 + 5, t0]);
    }

    #[test]
    fn test_insert_rejects_invalid_record() {
        let store = LocationStore::in_memory().unwrap();
        let err = store
            .insert(NewLocation::new("user_1", 91.0, 0.0, 0))
            .unwrap_err();
        assert!(matches!(err, StoreError::InvalidRecord(_)));
        let err = store.insert(NewLocation::new("", 0.0, 0.0, 0)).unwrap_err();
        assert!(matches!(err, StoreError::InvalidRecord(_)));
        assert_eq!(store.count().unwrap(), 0);
    }

    #[test]
    fn test_insert_many_is_all_or_nothing() {
        let store = LocationStore::in_memory().unwrap();
        store.insert(loc("user_1", 1)).unwrap();

        let mut batch: Vec<NewLocation> = (0..5).map(|i| loc("test_user", 100 + i)).collect();
        batch[3].longitude = 200.0;

        let err = store.insert_many(batch).unwrap_err();
        assert!(matches!(err, StoreError::InvalidRecord(msg) if msg.starts_with("record 3")));
        assert_eq!(store.count().unwrap(), 1);

        let batch: Vec<NewLocation> = (0..5).map(|i| loc("test_user", 100 + i)).collect();
        let inserted = store.insert_many(batch).unwrap();
        assert_eq!(inserted.len(), 5);
        assert!(inserted.windows(2).all(|w| w[0].id < w[1].id));
        assert_eq!(store.count().unwrap(), 6);
    }

    #[test]
    fn test_query_by_owner() {
        let store = LocationStore::in_memory().unwrap();
        store.insert(loc("user_1", 3)).unwrap();
        store.insert(loc("test_user", 2)).unwrap();
        store.insert(loc("user_1", 1)).unwrap();

        let mine = store.query_by_owner("user_1", SortDirection::Asc).unwrap();
        assert_eq!(mine.len(), 2);
        assert!(mine.iter().all(|r| r.owner_id == "user_1"));
        assert_eq!(mine[0].timestamp, 1);
        assert!(store
            .query_by_owner("nobody", SortDirection::Asc)
            .unwrap()
            .is_empty());
    }

    #[test]
    fn test_query_recent() {
        let store = LocationStore::in_memory().unwrap();
        for t in [5, 1, 9, 3] {
            store.insert(loc("user_1", t)).unwrap();
        }
        let recent: Vec<i64> = store
            .query_recent(2)
            .unwrap()
            .iter()
            .map(|r| r.timestamp)
            .collect();
        assert_eq!(recent, vec![9, 5]);
        assert!(store.query_recent(0).unwrap().is_empty());
        assert!(store.query_recent(-3).unwrap().is_empty());
        assert_eq!(store.query_recent(100).unwrap().len(), 4);
    }

    #[test]
    fn test_delete_all() {
        let store = LocationStore::in_memory().unwrap();
        for t in 0..4 {
            store.insert(loc("user_1", t)).unwrap();
        }
        assert_eq!(store.delete_all().unwrap(), 4);
        assert_eq!(store.count().unwrap(), 0);
        assert!(store.query_all(SortDirection::Asc).unwrap().is_empty());
    }

    #[test]
    fn test_delete_older_than() {
        let store = LocationStore::in_memory().unwrap();
        for t in [10, 20, 30, 40] {
            store.insert(loc("user_1", t)).unwrap();
        }
        assert_eq!(store.delete_older_than(30).unwrap(), 2);
        let left: Vec<i64> = store
            .query_all(SortDirection::Asc)
            .unwrap()
            .iter()
            .map(|r| r.timestamp)
            .collect();
        assert_eq!(left, vec![30, 40]);
    }

    #[test]
    fn test_open_persists_across_handles() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("track.db");
        {
            let store = LocationStore::open(&path).unwrap();
            store.insert(loc("user_1", 42)).unwrap();
        }
        let store = LocationStore::open(&path).unwrap();
        let records = store.query_all(SortDirection::Asc).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].timestamp, 42);
    }

    #[tokio::test]
    async fn test_subscribe_emits_snapshot_per_change() {
        let store = Arc::new(LocationStore::in_memory().unwrap());
        store.insert(loc("user_1", 1)).unwrap();

        let mut snapshots = Box::pin(store.subscribe(SortDirection::Asc));
        let first = snapshots.next().await.unwrap().unwrap();
        assert_eq!(first.len(), 1);

        store.insert(loc("user_1", 2)).unwrap();
        let second = tokio::time::timeout(Duration::from_secs(5), snapshots.next())
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        assert_eq!(second.len(), 2);

        store.delete_all().unwrap();
        let third = tokio::time::timeout(Duration::from_secs(5), snapshots.next())
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        assert!(third.is_empty());
    }

    #[tokio::test]
    async fn test_dropping_subscription_leaves_store_untouched() {
        let store = Arc::new(LocationStore::in_memory().unwrap());
        {
            let mut snapshots = Box::pin(store.subscribe(SortDirection::Desc));
            snapshots.next().await.unwrap().unwrap();
        }
        store.insert(loc("user_1", 1)).unwrap();
        assert_eq!(store.count().unwrap(), 1);

        // a fresh subscription starts from the current state
        let mut again = Box::pin(store.subscribe(SortDirection::Desc));
        assert_eq!(again.next().await.unwrap().unwrap().len(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_inserts_get_ids_in_completion_order() {
        let store = Arc::new(LocationStore::in_memory().unwrap());

        let writers: Vec<_> = (0..8)
            .map(|w| {
                let store = Arc::clone(&store);
                tokio::task::spawn_blocking(move || {
                    (0..25)
                        .map(|i| store.insert(loc("user_1", w * 100 + i)).unwrap().id)
                        .collect::<Vec<i64>>()
                })
            })
            .collect();

        let mut all_ids = Vec::new();
        for writer in writers {
            let ids = writer.await.unwrap();
            // each writer sees its own inserts complete in order
            assert!(ids.windows(2).all(|w| w[0] < w[1]), "ids {:?}", ids);
            all_ids.extend(ids);
        }

        all_ids.sort_unstable();
        all_ids.dedup();
        assert_eq!(all_ids.len(), 200);
        assert_eq!(store.count().unwrap(), 200);
    }
}
