//! Directory-backed driver
//!
//! Layout under the root directory:
//!
//! ```text
//! <root>/meta/catalog.json        snapshot: databases, shards, workers, feature rows
//! <root>/meta/catalog.log         journal of mutations since the snapshot
//! <root>/data/<db_id>/<id>.ft     one MessagePack-encoded Feature per file
//! ```
//!
//! Every mutation is checked against the in-memory catalog, appended to the
//! journal and fsynced, then applied. A failed append leaves the catalog
//! untouched. Once the journal holds enough entries the catalog is
//! snapshotted (write-fsync-rename) and the journal emptied; entries whose
//! sequence number the snapshot already covers are skipped on replay.

use std::collections::HashSet;
use std::fs::{self, File, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use vecshard_core::{
    DbItem, DbShard, Error, Feature, FeatureDbItem, Metadata, PageData, Result, WorkerItem,
};

use crate::catalog::{Catalog, CatalogOp};
use crate::driver::Driver;
use crate::journal::{self, Journal, JournalEntry};

const SNAPSHOT_FILE: &str = "catalog.json";
const JOURNAL_FILE: &str = "catalog.log";
const FEATURE_EXT: &str = "ft";

/// Journal entries accumulated before the catalog is snapshotted again.
const COMPACT_AFTER: u64 = 4096;

#[derive(Deserialize)]
struct Snapshot {
    seq: u64,
    catalog: Catalog,
}

#[derive(Serialize)]
struct SnapshotRef<'a> {
    seq: u64,
    catalog: &'a Catalog,
}

struct State {
    catalog: Catalog,
    journal: Journal,
    /// Sequence number of the last applied mutation
    seq: u64,
}

/// Driver persisting to a local directory.
pub struct LocalDriver {
    root: PathBuf,
    compact_after: u64,
    state: RwLock<State>,
}

impl LocalDriver {
    /// Open (or create) a driver rooted at `root`.
    pub fn open(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(root.join("meta"))?;
        fs::create_dir_all(root.join("data"))?;

        let snapshot_path = root.join("meta").join(SNAPSHOT_FILE);
        let (mut catalog, mut seq) = if snapshot_path.exists() {
            let bytes = fs::read(&snapshot_path)?;
            let snapshot: Snapshot = serde_json::from_slice(&bytes)?;
            (snapshot.catalog, snapshot.seq)
        } else {
            (Catalog::default(), 0)
        };
        catalog.rebuild_indexes();

        let journal_path = root.join("meta").join(JOURNAL_FILE);
        let replay = journal::replay(&journal_path, seq)?;
        for entry in &replay.entries {
            if let Err(e) = catalog.apply(&entry.op) {
                warn!(target: "vecshard::driver", seq = entry.seq, error = %e, "skipping journal entry");
            }
            seq = entry.seq;
        }
        info!(
            target: "vecshard::driver",
            path = %root.display(),
            replayed = replay.entries.len(),
            "loaded local catalog"
        );

        let driver = LocalDriver {
            root,
            compact_after: COMPACT_AFTER,
            state: RwLock::new(State {
                catalog,
                journal: Journal::open(journal_path)?,
                seq,
            }),
        };
        if !replay.entries.is_empty() || replay.torn {
            driver.compact(&mut driver.state.write())?;
        }
        Ok(driver)
    }

    /// Root directory.
    pub fn path(&self) -> &Path {
        &self.root
    }

    fn snapshot_path(&self) -> PathBuf {
        self.root.join("meta").join(SNAPSHOT_FILE)
    }

    fn db_dir(&self, db_id: &str) -> PathBuf {
        self.root.join("data").join(db_id)
    }

    fn feature_path(&self, db_id: &str, feature_id: &str) -> PathBuf {
        self.db_dir(db_id)
            .join(format!("{}.{}", feature_id, FEATURE_EXT))
    }

    fn mutate(&self, op: CatalogOp) -> Result<()> {
        self.commit(&mut self.state.write(), op)
    }

    /// Check, journal, then apply one mutation.
    fn commit(&self, state: &mut State, op: CatalogOp) -> Result<()> {
        state.catalog.check(&op)?;
        let entry = JournalEntry {
            seq: state.seq + 1,
            op,
        };
        state.journal.append(&entry)?;
        state.seq = entry.seq;
        state.catalog.apply(&entry.op)?;

        if state.journal.entries() >= self.compact_after {
            if let Err(e) = self.compact(state) {
                warn!(target: "vecshard::driver", error = %e, "catalog snapshot failed, journal kept");
            }
        }
        Ok(())
    }

    /// Snapshot the catalog, then empty the journal.
    fn compact(&self, state: &mut State) -> Result<()> {
        self.write_snapshot(&SnapshotRef {
            seq: state.seq,
            catalog: &state.catalog,
        })?;
        state.journal.reset()?;
        debug!(target: "vecshard::driver", seq = state.seq, "catalog snapshotted");
        Ok(())
    }

    /// Write the snapshot atomically (write-fsync-rename).
    fn write_snapshot(&self, snapshot: &SnapshotRef<'_>) -> Result<()> {
        let path = self.snapshot_path();
        let temp_path = path.with_extension("tmp");

        let mut file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&temp_path)?;
        file.write_all(&serde_json::to_vec(snapshot)?)?;
        file.sync_all()?;
        drop(file);

        fs::rename(&temp_path, &path)?;

        if let Some(parent) = path.parent() {
            File::open(parent)?.sync_all()?;
        }
        Ok(())
    }

    fn write_feature(&self, db_id: &str, feature_id: &str, feature: &Feature) -> Result<()> {
        let bytes = rmp_serde::to_vec(feature)?;
        fs::write(self.feature_path(db_id, feature_id), bytes)?;
        Ok(())
    }

    fn read_feature(&self, db_id: &str, feature_id: &str) -> Result<Feature> {
        let bytes = fs::read(self.feature_path(db_id, feature_id)).map_err(|e| {
            Error::persistence(format!("feature {} unreadable: {}", feature_id, e))
        })?;
        Ok(rmp_serde::from_slice(&bytes)?)
    }

    fn delete_feature(&self, db_id: &str, feature_id: &str) {
        match fs::remove_file(self.feature_path(db_id, feature_id)) {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => {
                warn!(target: "vecshard::driver", feature_id, error = %e, "failed to delete feature file");
            }
        }
    }
}

impl Driver for LocalDriver {
    fn init(&self, known_db_ids: &[String]) -> Result<()> {
        for db_id in known_db_ids {
            fs::create_dir_all(self.db_dir(db_id))?;
        }
        self.mutate(CatalogOp::Init {
            db_ids: known_db_ids.to_vec(),
        })
    }

    fn create_db(&self, db: &DbItem) -> Result<String> {
        let record = Catalog::prepare_db(db);
        let db_id = record.db_id.clone();
        fs::create_dir_all(self.db_dir(&db_id))?;
        self.mutate(CatalogOp::CreateDb { db: record })?;
        debug!(target: "vecshard::driver", db_id = %db_id, name = %db.name, "created db");
        Ok(db_id)
    }

    fn find_db(&self, db_id: &str) -> Result<DbItem> {
        self.state.read().catalog.find_db(db_id)
    }

    fn list_dbs(&self) -> Result<Vec<DbItem>> {
        Ok(self.state.read().catalog.list_dbs())
    }

    fn delete_db(&self, db_id: &str) -> Result<()> {
        self.mutate(CatalogOp::DeleteDb {
            db_id: db_id.to_string(),
        })
    }

    fn list_workers(&self) -> Result<Vec<WorkerItem>> {
        Ok(self.state.read().catalog.list_workers())
    }

    fn create_worker(&self, worker: &WorkerItem) -> Result<()> {
        self.mutate(CatalogOp::PutWorker {
            worker: worker.clone(),
        })
    }

    fn update_worker(&self, worker: &WorkerItem) -> Result<()> {
        self.mutate(CatalogOp::UpdateWorker {
            worker: worker.clone(),
        })
    }

    fn list_shards(&self, db_id: &str) -> Result<Vec<DbShard>> {
        self.state.read().catalog.list_shards(db_id)
    }

    fn create_shard(&self, db_id: &str, shard: &DbShard) -> Result<String> {
        let shard = Catalog::prepare_shard(db_id, shard);
        let shard_id = shard.shard_id.clone();
        self.mutate(CatalogOp::CreateShard { shard })?;
        Ok(shard_id)
    }

    fn update_shard(&self, shard: &DbShard) -> Result<()> {
        self.mutate(CatalogOp::UpdateShard {
            shard: shard.clone(),
        })
    }

    fn close_shard(&self, db_id: &str, shard_id: &str) -> Result<()> {
        self.mutate(CatalogOp::CloseShard {
            db_id: db_id.to_string(),
            shard_id: shard_id.to_string(),
        })
    }

    fn list_features(
        &self,
        page: u64,
        per_page: u64,
        db_id: &str,
        shard_id: Option<&str>,
    ) -> Result<PageData<Vec<FeatureDbItem>>> {
        let rows = self
            .state
            .read()
            .catalog
            .page_rows(page, per_page, db_id, shard_id)?;
        let data = rows
            .data
            .into_iter()
            .map(|row| {
                Ok(FeatureDbItem {
                    feature: self.read_feature(db_id, &row.feature_id)?,
                    feature_id: row.feature_id,
                    metadata: row.metadata,
                })
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(PageData {
            page: rows.page,
            per_page: rows.per_page,
            total_page: rows.total_page,
            data,
        })
    }

    fn add_features(
        &self,
        items: &[FeatureDbItem],
        db_id: &str,
        shard_id: &str,
    ) -> Result<Vec<String>> {
        let metadata: Vec<Metadata> = items.iter().map(|item| item.metadata.clone()).collect();
        let rows = Catalog::prepare_rows(metadata, shard_id);
        let ids: Vec<String> = rows.iter().map(|row| row.feature_id.clone()).collect();
        let op = CatalogOp::AddRows {
            db_id: db_id.to_string(),
            rows,
        };

        let mut state = self.state.write();
        state.catalog.check(&op)?;
        // Vectors must be on disk before the catalog points at them.
        let written = fs::create_dir_all(self.db_dir(db_id))
            .map_err(Error::from)
            .and_then(|()| {
                ids.iter()
                    .zip(items)
                    .try_for_each(|(id, item)| self.write_feature(db_id, id, &item.feature))
            })
            .and_then(|()| self.commit(&mut state, op));
        if let Err(e) = written {
            for id in &ids {
                self.delete_feature(db_id, id);
            }
            return Err(e);
        }
        Ok(ids)
    }

    fn load_features(&self, ids: &[String], db_id: &str, shard_id: &str) -> Result<Vec<Feature>> {
        let found = self
            .state
            .read()
            .catalog
            .existing_ids(ids, db_id, Some(shard_id))?;
        found
            .iter()
            .map(|id| self.read_feature(db_id, id))
            .collect()
    }

    fn remove_features(
        &self,
        ids: &[String],
        db_id: &str,
        shard_id: Option<&str>,
    ) -> Result<usize> {
        let mut state = self.state.write();
        let mut seen = HashSet::new();
        let removed: Vec<String> = state
            .catalog
            .existing_ids(ids, db_id, shard_id)?
            .into_iter()
            .filter(|id| seen.insert(id.clone()))
            .collect();
        if !removed.is_empty() {
            self.commit(
                &mut state,
                CatalogOp::RemoveRows {
                    db_id: db_id.to_string(),
                    shard_id: shard_id.map(str::to_string),
                    ids: removed.clone(),
                },
            )?;
        }
        drop(state);
        for id in &removed {
            self.delete_feature(db_id, id);
        }
        Ok(removed.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn item(raw: Vec<f32>) -> FeatureDbItem {
        FeatureDbItem::new(Feature::new(raw, "m", 2))
    }

    #[test]
    fn test_state_survives_reopen() {
        let dir = TempDir::new().unwrap();
        let (db_id, shard_id, ids) = {
            let driver = LocalDriver::open(dir.path()).unwrap();
            let db_id = driver.create_db(&DbItem::new("persisted", 100)).unwrap();
            let shard_id = driver.create_shard(&db_id, &DbShard::new(&db_id, 50)).unwrap();
            let ids = driver
                .add_features(&[item(vec![1.0, 2.0]), item(vec![3.0, 4.0])], &db_id, &shard_id)
                .unwrap();
            (db_id, shard_id, ids)
        };

        let driver = LocalDriver::open(dir.path()).unwrap();
        assert_eq!(driver.find_db(&db_id).unwrap().used, 2);
        assert_eq!(driver.list_shards(&db_id).unwrap()[0].shard_id, shard_id);

        let loaded = driver.load_features(&ids, &db_id, &shard_id).unwrap();
        assert_eq!(loaded[1].raw, vec![3.0, 4.0]);
        assert_eq!(loaded[1].version, 2);

        let page = driver.list_features(0, 10, &db_id, Some(&shard_id)).unwrap();
        assert_eq!(page.total_page, 1);
        assert_eq!(page.data.len(), 2);
    }

    #[test]
    fn test_remove_deletes_blobs() {
        let dir = TempDir::new().unwrap();
        let driver = LocalDriver::open(dir.path()).unwrap();
        let db_id = driver.create_db(&DbItem::new("db", 10)).unwrap();
        let ids = driver.add_features(&[item(vec![1.0])], &db_id, "s").unwrap();

        let blob = driver.feature_path(&db_id, &ids[0]);
        assert!(blob.exists());
        assert_eq!(driver.remove_features(&ids, &db_id, None).unwrap(), 1);
        assert!(!blob.exists());
        assert_eq!(driver.remove_features(&ids, &db_id, None).unwrap(), 0);
    }

    #[test]
    fn test_failed_mutation_leaves_catalog_unchanged() {
        let dir = TempDir::new().unwrap();
        let driver = LocalDriver::open(dir.path()).unwrap();
        assert!(driver.create_shard("missing", &DbShard::new("missing", 1)).is_err());
        assert!(driver.list_dbs().unwrap().is_empty());
    }

    #[test]
    fn test_mutations_append_to_journal_instead_of_rewriting_snapshot() {
        let dir = TempDir::new().unwrap();
        let driver = LocalDriver::open(dir.path()).unwrap();
        let db_id = driver.create_db(&DbItem::new("db", 100)).unwrap();
        for i in 0..20 {
            driver.add_features(&[item(vec![i as f32, 1.0])], &db_id, "s").unwrap();
        }

        let meta = dir.path().join("meta");
        assert!(!meta.join(SNAPSHOT_FILE).exists());
        let journal = std::fs::read_to_string(meta.join(JOURNAL_FILE)).unwrap();
        assert_eq!(journal.lines().count(), 21);
        drop(driver);

        let driver = LocalDriver::open(dir.path()).unwrap();
        assert_eq!(driver.find_db(&db_id).unwrap().used, 20);
        assert!(meta.join(SNAPSHOT_FILE).exists());
        assert!(std::fs::read_to_string(meta.join(JOURNAL_FILE)).unwrap().is_empty());
    }

    #[test]
    fn test_compaction_keeps_every_mutation() {
        let dir = TempDir::new().unwrap();
        let (db_id, ids) = {
            let mut driver = LocalDriver::open(dir.path()).unwrap();
            driver.compact_after = 4;
            let db_id = driver.create_db(&DbItem::new("db", 100)).unwrap();
            let mut ids = Vec::new();
            for i in 0..9 {
                ids.extend(driver.add_features(&[item(vec![i as f32])], &db_id, "s").unwrap());
            }
            driver.remove_features(&ids[..2], &db_id, None).unwrap();
            assert!(driver.state.read().journal.entries() < 4);
            (db_id, ids)
        };

        let driver = LocalDriver::open(dir.path()).unwrap();
        assert_eq!(driver.find_db(&db_id).unwrap().used, 7);
        let page = driver.list_features(0, 20, &db_id, None).unwrap();
        let got: Vec<String> = page.data.into_iter().map(|f| f.feature_id).collect();
        assert_eq!(got, ids[2..].to_vec());
    }

    #[test]
    fn test_torn_journal_tail_is_ignored_on_open() {
        let dir = TempDir::new().unwrap();
        let db_id = {
            let driver = LocalDriver::open(dir.path()).unwrap();
            driver.create_db(&DbItem::new("db", 10)).unwrap()
        };
        let journal = dir.path().join("meta").join(JOURNAL_FILE);
        let mut content = std::fs::read_to_string(&journal).unwrap();
        content.push_str("{\"seq\":2,\"op\":{\"op\":\"delete_");
        std::fs::write(&journal, content).unwrap();

        let driver = LocalDriver::open(dir.path()).unwrap();
        assert!(driver.find_db(&db_id).is_ok());
        driver.delete_db(&db_id).unwrap();
        drop(driver);
        let driver = LocalDriver::open(dir.path()).unwrap();
        assert!(driver.find_db(&db_id).unwrap_err().is_not_found());
    }

    #[test]
    fn test_duplicate_ids_are_counted_once() {
        let dir = TempDir::new().unwrap();
        let driver = LocalDriver::open(dir.path()).unwrap();
        let db_id = driver.create_db(&DbItem::new("db", 10)).unwrap();
        let ids = driver.add_features(&[item(vec![1.0])], &db_id, "s").unwrap();
        let twice = vec![ids[0].clone(), ids[0].clone()];
        assert_eq!(driver.remove_features(&twice, &db_id, None).unwrap(), 1);
    }

    #[test]
    fn test_soft_deleted_db_stays_hidden_after_reopen() {
        let dir = TempDir::new().unwrap();
        let db_id = {
            let driver = LocalDriver::open(dir.path()).unwrap();
            let db_id = driver.create_db(&DbItem::new("gone", 10)).unwrap();
            driver.delete_db(&db_id).unwrap();
            db_id
        };
        let driver = LocalDriver::open(dir.path()).unwrap();
        assert!(driver.find_db(&db_id).unwrap_err().is_not_found());
    }
}
