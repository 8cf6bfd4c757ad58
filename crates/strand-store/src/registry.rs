//! Thread registry: the single owner of the name -> identity mapping and
//! of the update index.
//!
//! [`Database`] is `!Sync`, so the registry serialises access behind a
//! mutex. Every method holds the lock for one short synchronous unit of
//! work and never across an await point.

use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use chrono::Utc;
use strand_shared::{ThreadId, ThreadIdentity};
use tracing::{debug, info};

use crate::database::Database;
use crate::error::{Result, StoreError};
use crate::models::{ThreadRecord, UpdateRecord};

pub struct ThreadRegistry {
    db: Mutex<Database>,
}

impl ThreadRegistry {
    pub fn new(db: Database) -> Self {
        Self { db: Mutex::new(db) }
    }

    pub fn open_at(path: &Path) -> Result<Self> {
        Ok(Self::new(Database::open_at(path)?))
    }

    pub fn open_in_memory() -> Result<Self> {
        Ok(Self::new(Database::open_in_memory()?))
    }

    fn db(&self) -> Result<MutexGuard<'_, Database>> {
        self.db.lock().map_err(|_| StoreError::LockPoisoned)
    }

    /// Derive the identity for `phrase` and bind it to `name`.
    ///
    /// Idempotent when `name` already maps to the same identity. Fails with
    /// [`StoreError::DuplicateName`] when `name` belongs to another thread or
    /// the thread is already registered under a different name.
    pub fn create_or_join(&self, phrase: &str, name: &str) -> Result<ThreadIdentity> {
        let identity = ThreadIdentity::derive(phrase, name)?;
        let db = self.db()?;

        if let Some(existing) = db.get_thread_by_name(name)? {
            if existing.id == identity.id().as_str() {
                debug!(thread = %existing.id, name, "thread already registered");
                return Ok(identity);
            }
            return Err(StoreError::DuplicateName(name.to_string()));
        }

        match db.get_thread(identity.id().as_str()) {
            Ok(existing) => return Err(StoreError::DuplicateName(existing.name)),
            Err(StoreError::NotFound) => {}
            Err(e) => return Err(e),
        }

        db.insert_thread(&ThreadRecord {
            id: identity.id().to_string(),
            name: name.to_string(),
            phrase: identity.phrase().to_string(),
            secret: *identity.secret_bytes(),
            created_at: Utc::now(),
        })?;

        info!(thread = %identity.id(), name, "thread registered");
        Ok(identity)
    }

    /// Look a thread up by name.
    pub fn get(&self, name: &str) -> Result<ThreadIdentity> {
        let record = self.db()?.get_thread_by_name(name)?.ok_or(StoreError::NotFound)?;
        to_identity(record)
    }

    pub fn get_by_id(&self, id: &ThreadId) -> Result<ThreadIdentity> {
        let record = self.db()?.get_thread(id.as_str())?;
        to_identity(record)
    }

    pub fn list(&self) -> Result<Vec<ThreadIdentity>> {
        self.db()?
            .list_threads()?
            .into_iter()
            .map(to_identity)
            .collect()
    }

    /// Remove a thread and every update indexed for it.
    pub fn remove(&self, name: &str) -> Result<()> {
        if !self.db()?.delete_thread_by_name(name)? {
            return Err(StoreError::NotFound);
        }
        info!(name, "thread removed");
        Ok(())
    }

    /// Add an update to the index. Fails with
    /// [`StoreError::AlreadyIndexed`] when its content id is present.
    pub fn index_update(&self, record: &UpdateRecord) -> Result<()> {
        if !self.db()?.insert_update(record)? {
            return Err(StoreError::AlreadyIndexed(record.content_id.clone()));
        }
        debug!(
            thread = %record.thread_id,
            cid = %record.content_id,
            local = record.is_local,
            "update indexed"
        );
        Ok(())
    }

    pub fn is_indexed(&self, content_id: &str) -> Result<bool> {
        self.db()?.has_update(content_id)
    }

    /// The newest update authored on this node, which is the head new local
    /// publishes link back to.
    pub fn latest_local(&self, thread_id: &ThreadId) -> Result<Option<UpdateRecord>> {
        self.db()?.latest_update(thread_id.as_str(), true)
    }

    /// Content ids of a thread, newest first, starting after `offset_id`.
    pub fn page(&self, thread_id: &ThreadId, offset_id: &str, limit: usize) -> Result<Vec<String>> {
        self.db()?.list_update_ids(thread_id.as_str(), offset_id, limit)
    }

    pub fn get_update(&self, content_id: &str) -> Result<UpdateRecord> {
        self.db()?.get_update(content_id)
    }

    /// An update together with the identity of the thread it belongs to.
    pub fn load_update_and_thread(&self, content_id: &str) -> Result<(UpdateRecord, ThreadIdentity)> {
        let db = self.db()?;
        let update = db.get_update(content_id)?;
        let thread = to_identity(db.get_thread(&update.thread_id)?)?;
        Ok((update, thread))
    }

    pub fn count(&self, thread_id: &ThreadId) -> Result<u64> {
        self.db()?.count_updates(thread_id.as_str())
    }
}

fn to_identity(record: ThreadRecord) -> Result<ThreadIdentity> {
    Ok(ThreadIdentity::restore(record.phrase, record.name, &record.secret)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use strand_shared::{generate_phrase, PhotoMetadata};

    fn registry() -> ThreadRegistry {
        ThreadRegistry::open_in_memory().unwrap()
    }

    fn update(cid: &str, prev: &str, thread: &ThreadId, local: bool) -> UpdateRecord {
        UpdateRecord {
            content_id: cid.to_string(),
            prev_id: prev.to_string(),
            thread_id: thread.to_string(),
            metadata: PhotoMetadata {
                name: cid.to_string(),
                ext: ".jpg".into(),
                size: 1,
                content_type: "image/jpeg".into(),
                created: Utc::now(),
                added: Utc::now(),
                username: None,
            },
            caption: None,
            is_local: local,
            indexed_at: Utc::now(),
        }
    }

    #[test]
    fn test_create_or_join_is_idempotent() {
        let reg = registry();
        let phrase = generate_phrase().unwrap();

        let a = reg.create_or_join(&phrase, "beta").unwrap();
        let b = reg.create_or_join(&phrase, "beta").unwrap();
        assert_eq!(a.id(), b.id());
        assert_eq!(reg.list().unwrap().len(), 1);

        let fetched = reg.get("beta").unwrap();
        assert_eq!(fetched.id(), a.id());
        assert_eq!(reg.get_by_id(a.id()).unwrap().name(), "beta");
    }

    #[test]
    fn test_duplicate_name_rejected() {
        let reg = registry();
        reg.create_or_join(&generate_phrase().unwrap(), "beta").unwrap();

        let err = reg
            .create_or_join(&generate_phrase().unwrap(), "beta")
            .unwrap_err();
        assert!(matches!(err, StoreError::DuplicateName(_)));
    }

    #[test]
    fn test_same_thread_second_name_rejected() {
        let reg = registry();
        let phrase = generate_phrase().unwrap();
        reg.create_or_join(&phrase, "beta").unwrap();

        let err = reg.create_or_join(&phrase, "gamma").unwrap_err();
        assert!(matches!(err, StoreError::DuplicateName(name) if name == "beta"));
    }

    #[test]
    fn test_invalid_phrase_surfaces() {
        let reg = registry();
        let err = reg.create_or_join("not a phrase", "x").unwrap_err();
        assert!(matches!(err, StoreError::Identity(_)));
    }

    #[test]
    fn test_index_update_once() {
        let reg = registry();
        let t = reg.create_or_join(&generate_phrase().unwrap(), "t").unwrap();

        reg.index_update(&update("c1", "", t.id(), false)).unwrap();
        let err = reg.index_update(&update("c1", "", t.id(), false)).unwrap_err();
        assert!(matches!(err, StoreError::AlreadyIndexed(cid) if cid == "c1"));
        assert_eq!(reg.count(t.id()).unwrap(), 1);
    }

    #[test]
    fn test_latest_local_skips_remote() {
        let reg = registry();
        let t = reg.create_or_join(&generate_phrase().unwrap(), "t").unwrap();
        assert!(reg.latest_local(t.id()).unwrap().is_none());

        reg.index_update(&update("l1", "", t.id(), true)).unwrap();
        reg.index_update(&update("r1", "", t.id(), false)).unwrap();

        let latest = reg.latest_local(t.id()).unwrap().unwrap();
        assert_eq!(latest.content_id, "l1");
        assert!(latest.is_genesis());
    }

    #[test]
    fn test_page_newest_first_with_offset() {
        let reg = registry();
        let t = reg.create_or_join(&generate_phrase().unwrap(), "t").unwrap();
        let mut prev = String::new();
        for i in 0..5 {
            let cid = format!("c{i}");
            reg.index_update(&update(&cid, &prev, t.id(), true)).unwrap();
            prev = cid;
        }

        assert_eq!(reg.page(t.id(), "", 3).unwrap(), vec!["c4", "c3", "c2"]);
        assert_eq!(reg.page(t.id(), "c2", 10).unwrap(), vec!["c1", "c0"]);
        assert!(reg.page(t.id(), "missing", 10).unwrap().is_empty());
    }

    #[test]
    fn test_remove_cascades_updates() {
        let reg = registry();
        let t = reg.create_or_join(&generate_phrase().unwrap(), "t").unwrap();
        reg.index_update(&update("c1", "", t.id(), true)).unwrap();

        let (rec, thread) = reg.load_update_and_thread("c1").unwrap();
        assert_eq!(rec.thread_id, t.id().as_str());
        assert_eq!(thread.id(), t.id());

        reg.remove("t").unwrap();
        assert!(matches!(reg.get("t"), Err(StoreError::NotFound)));
        assert!(!reg.is_indexed("c1").unwrap());
        assert!(matches!(reg.remove("t"), Err(StoreError::NotFound)));
    }
}
