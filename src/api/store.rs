use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap};

/// One stored item: field name to value, always carrying `"id"`.
pub type Record = BTreeMap<String, String>;

/// In-memory records grouped by collection.
///
/// Every operation takes the lock once, so each call is atomic on its own
/// but nothing spans two calls. Ids come from one counter shared by all
/// collections and start at `1`.
#[derive(Debug)]
pub struct DataStore {
    inner: Mutex<Collections>,
}

#[derive(Debug)]
struct Collections {
    next_id: u64,
    items: HashMap<String, BTreeMap<u64, Record>>,
}

impl Default for DataStore {
    fn default() -> Self {
        Self::new()
    }
}

impl DataStore {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Collections {
                next_id: 1,
                items: HashMap::new(),
            }),
        }
    }

    /// Stores `record` under a fresh id and returns that id.
    ///
    /// An `"id"` field supplied by the caller is overwritten.
    pub fn create(&self, collection: &str, mut record: Record) -> String {
        let mut inner = self.inner.lock();

        let id = inner.next_id;
        inner.next_id += 1;

        record.insert("id".into(), id.to_string());
        inner
            .items
            .entry(collection.to_owned())
            .or_default()
            .insert(id, record);

        id.to_string()
    }

    pub fn read(&self, collection: &str, id: &str) -> Option<Record> {
        let id = parse_id(id)?;
        self.inner.lock().items.get(collection)?.get(&id).cloned()
    }

    /// All records of `collection` in ascending id order; empty if it was never used.
    pub fn read_all(&self, collection: &str) -> Vec<Record> {
        self.inner
            .lock()
            .items
            .get(collection)
            .map(|items| items.values().cloned().collect())
            .unwrap_or_default()
    }

    /// Replaces an existing record, keeping its id. Returns `false` if there is none.
    pub fn update(&self, collection: &str, id: &str, mut record: Record) -> bool {
        let Some(key) = parse_id(id) else {
            return false;
        };

        let mut inner = self.inner.lock();
        match inner.items.get_mut(collection).and_then(|items| items.get_mut(&key)) {
            Some(slot) => {
                record.insert("id".into(), key.to_string());
                *slot = record;
                true
            }
            None => false,
        }
    }

    pub fn remove(&self, collection: &str, id: &str) -> bool {
        let Some(key) = parse_id(id) else {
            return false;
        };

        self.inner
            .lock()
            .items
            .get_mut(collection)
            .is_some_and(|items| items.remove(&key).is_some())
    }
}

/// Only the exact decimal form issued by [`DataStore::create`] names a record.
fn parse_id(id: &str) -> Option<u64> {
    let key = id.parse::<u64>().ok()?;
    (key.to_string() == id).then_some(key)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(pairs: &[(&str, &str)]) -> Record {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn ids_are_global_and_start_at_one() {
        let store = DataStore::new();

        assert_eq!(store.create("users", record(&[("name", "Ann")])), "1");
        assert_eq!(store.create("posts", record(&[])), "2");
        assert_eq!(store.create("users", record(&[("id", "99")])), "3");

        assert_eq!(store.read("users", "3").unwrap()["id"], "3");
        assert_eq!(store.read("posts", "2").unwrap(), record(&[("id", "2")]));
    }

    #[test]
    fn read_all_is_ordered_by_id() {
        let store = DataStore::new();
        for i in 0..12 {
            store.create("nums", record(&[("n", &i.to_string())]));
        }

        let ids: Vec<_> = store
            .read_all("nums")
            .into_iter()
            .map(|r| r["id"].clone())
            .collect();

        assert_eq!(ids, (1..=12).map(|i| i.to_string()).collect::<Vec<_>>());
        assert!(store.read_all("missing").is_empty());
    }

    #[test]
    fn update_replaces_fields() {
        let store = DataStore::new();
        let id = store.create("users", record(&[("name", "Ann"), ("age", "30")]));

        assert!(store.update("users", &id, record(&[("name", "Bob")])));
        assert_eq!(
            store.read("users", &id),
            Some(record(&[("id", "1"), ("name", "Bob")]))
        );

        assert!(!store.update("users", "2", record(&[])));
        assert!(!store.update("other", &id, record(&[])));
    }

    #[test]
    fn remove_once() {
        let store = DataStore::new();
        let id = store.create("users", record(&[]));

        assert!(store.remove("users", &id));
        assert!(!store.remove("users", &id));
        assert_eq!(store.read("users", &id), None);
    }

    #[test]
    fn lookup_ids() {
        let store = DataStore::new();
        store.create("c", record(&[]));

        #[rustfmt::skip]
        let cases = [
            ("1",   true),
            ("01",  false),
            ("+1",  false),
            (" 1",  false),
            ("abc", false),
            ("",    false),
        ];

        for (id, found) in cases {
            assert_eq!(store.read("c", id).is_some(), found, "{id:?}");
        }
    }
}
