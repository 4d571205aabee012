//! Object template store — lazy, cached loading of per-type `.dat` resources
//!
//! Templates are immutable after load and shared between every placed
//! instance of the same type id via `Arc`. A failed load is cached too, so a
//! save full of the same broken id doesn't retry the filesystem every tick.

pub mod object_data;

use std::collections::HashMap;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::PathBuf;
use std::sync::Arc;

pub use object_data::{DataError, Frameset, ObjectData, SpecialSide, SpecialType};

/// Resource id of the train hotspot-offset table ("trains/train")
const TRAIN_DATA_ID: u16 = 6146;

/// Per-orientation-frame hotspot correction for train sprites
#[derive(Debug, Clone, Copy, Default)]
pub struct TrainFrameOffset {
    pub x: i32,
    pub y: i32,
    // two more values per row with no known use yet
    pub unk2: i32,
    pub unk3: i32,
}

/// Loads and caches object templates keyed by type id
pub struct ObjectDataStore {
    data_dir: PathBuf,
    data: HashMap<u16, Option<Arc<ObjectData>>>,

    train_data: Vec<TrainFrameOffset>,
    train_data_loaded: bool,
}

impl ObjectDataStore {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            data: HashMap::new(),
            train_data: Vec::new(),
            train_data_loaded: false,
        }
    }

    /// Get the template for a type id, loading `<data_dir>/<id>.dat` on first
    /// use. Returns `None` for ids with no (usable) data file.
    pub fn get(&mut self, id: u16) -> Option<Arc<ObjectData>> {
        if let Some(cached) = self.data.get(&id) {
            return cached.clone();
        }

        let path = self.data_dir.join(format!("{id}.dat"));

        let loaded = match File::open(&path) {
            Ok(file) => match ObjectData::parse(BufReader::new(file)) {
                Ok(data) => Some(Arc::new(data)),
                Err(e) => {
                    tracing::warn!("Failed to read dat for object {}: {}", id, e);
                    None
                }
            },
            Err(e) => {
                tracing::warn!("Failed to open dat for object {}: {}", id, e);
                None
            }
        };

        self.data.insert(id, loaded.clone());
        loaded
    }

    /// Pre-seed the cache with a template (dynamic objects, tests)
    pub fn insert(&mut self, id: u16, data: ObjectData) -> Arc<ObjectData> {
        let data = Arc::new(data);
        self.data.insert(id, Some(data.clone()));
        data
    }

    /// The per-orientation hotspot table for train sprites, loaded on first
    /// use. Empty when the resource is missing.
    pub fn train_data(&mut self) -> &[TrainFrameOffset] {
        if !self.train_data_loaded {
            self.train_data_loaded = true;

            let path = self.data_dir.join(format!("{TRAIN_DATA_ID}.dat"));
            match File::open(&path) {
                Ok(file) => {
                    self.train_data = parse_train_data(BufReader::new(file));
                    tracing::info!(
                        "Loaded {} train orientation offsets",
                        self.train_data.len()
                    );
                }
                Err(e) => tracing::warn!("Failed to open train data: {}", e),
            }
        }

        &self.train_data
    }
}

/// Parse the train table: one row of four ints per orientation frame,
/// terminated by `-9`
fn parse_train_data(reader: impl BufRead) -> Vec<TrainFrameOffset> {
    let mut rows = Vec::new();

    for line in reader.lines() {
        let Ok(line) = line else { break };

        let mut vals = [0i32; 4];
        for (i, tok) in line.split_whitespace().take(4).enumerate() {
            match tok.parse() {
                Ok(v) => vals[i] = v,
                Err(_) => break,
            }
        }

        // terminator
        if vals[0] == -9 {
            break;
        }

        rows.push(TrainFrameOffset {
            x: vals[0],
            y: vals[1],
            unk2: vals[2],
            unk3: vals[3],
        });
    }

    rows
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn insert_and_get_shares_one_template() {
        let mut store = ObjectDataStore::new("nonexistent");
        store.insert(
            42,
            ObjectData {
                name: "test".to_string(),
                ..ObjectData::default()
            },
        );

        let a = store.get(42).unwrap();
        let b = store.get(42).unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(a.name, "test");
    }

    #[test]
    fn missing_file_cached_as_none() {
        let mut store = ObjectDataStore::new("nonexistent");
        assert!(store.get(9999).is_none());
        // second lookup hits the cache
        assert!(store.get(9999).is_none());
    }

    #[test]
    fn train_table_parses_until_terminator() {
        let table = "1 2 0 0\n3 4 0 0\n-9\n5 6 0 0\n";
        let rows = parse_train_data(Cursor::new(table));
        assert_eq!(rows.len(), 2);
        assert_eq!((rows[0].x, rows[0].y), (1, 2));
        assert_eq!((rows[1].x, rows[1].y), (3, 4));
    }
}
