//! The simulated world — placed objects, trains, tile occupancy
//!
//! The world owns every placed [`Object`] and every [`Train`]. Nothing keeps
//! a reference into the object list across ticks; the list can grow (scripted
//! events) and shrink (dead-object filtering) between any two ticks, so all
//! addressing goes through the tile occupancy query [`World::object_index_at`]
//! and is re-resolved each time it is needed.

pub mod object;
pub mod save;
pub mod train;

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;

use crate::config::SimConfig;
use crate::data::{ObjectDataStore, SpecialType};

pub use object::{Minifig, Object, DEAD_OBJECT_ID};
pub use train::Train;

/// Grid cell size in pixels
pub const TILE_SIZE: i32 = 16;

pub struct World {
    store: ObjectDataStore,
    config: SimConfig,

    rng: StdRng,

    width: u16,
    height: u16,

    /// Rough per-tile content class from the save file (empty=0, scenery=2,
    /// building=3, track=5, road=6, footpath=7)
    tile_object_type: Vec<u8>,

    backdrop_path: String,

    objects: Vec<Object>,
    trains: Vec<Train>,
}

impl World {
    pub fn new(store: ObjectDataStore, config: SimConfig) -> Self {
        Self {
            store,
            config,
            rng: StdRng::from_entropy(),
            width: 0,
            height: 0,
            tile_object_type: Vec::new(),
            backdrop_path: String::new(),
            objects: Vec::new(),
            trains: Vec::new(),
        }
    }

    pub fn width(&self) -> u16 {
        self.width
    }

    pub fn height(&self) -> u16 {
        self.height
    }

    pub fn config(&self) -> &SimConfig {
        &self.config
    }

    pub fn store_mut(&mut self) -> &mut ObjectDataStore {
        &mut self.store
    }

    pub fn backdrop_path(&self) -> &str {
        &self.backdrop_path
    }

    /// Advance the whole world by one tick
    pub fn update(&mut self, delta_ms: u32) {
        for object in &mut self.objects {
            object.update(delta_ms);
        }

        // trains query and mutate the world while updating, so they are moved
        // out for the duration of the pass
        let mut trains = std::mem::take(&mut self.trains);
        for train in &mut trains {
            train.update(delta_ms, self);
        }
        self.trains = trains;

        // remove dead objects
        self.objects.retain(|object| !object.is_dead());
    }

    /// Build an object instance without adding it to the world (train parts
    /// embed their own objects)
    pub fn create_object(&mut self, id: u16, x: i32, y: i32, name: String) -> Object {
        let data = self.store.get(id);

        if data.is_none() {
            tracing::debug!("No object data for id {} ({:?})", id, name);
        }

        Object::new(id, x, y, name, data)
    }

    /// Create and place an object
    pub fn add_object(&mut self, id: u16, x: i32, y: i32, name: String) -> &mut Object {
        let object = self.create_object(id, x, y, name);
        self.objects.push(object);
        self.objects.last_mut().unwrap()
    }

    pub fn objects(&self) -> &[Object] {
        &self.objects
    }

    pub fn objects_mut(&mut self) -> &mut [Object] {
        &mut self.objects
    }

    pub fn trains(&self) -> &[Train] {
        &self.trains
    }

    /// Which placed object occupies tile `(x, y)`?
    ///
    /// Linear scan with an occupancy-bitmap test per candidate. This is the
    /// only mechanism translating a tile coordinate into "whose coordinate
    /// list applies here", and it runs for every train part every tick.
    pub fn object_index_at(&self, x: i32, y: i32) -> Option<usize> {
        // TODO: add some kind of lookup table for this
        for (index, object) in self.objects.iter().enumerate() {
            let Some(data) = object.data() else { continue };

            let object_x = object.x();
            let object_y = object.y();

            // not something we should check
            if object_x < 0 || object_y < 0 || data.phys_size_x == 0 {
                continue;
            }

            // the bitmap is taller than the physical footprint, the
            // difference is empty rows above the building
            let y_adjust = data.bitmap_size_y.saturating_sub(data.phys_size_y) as i32;

            if x < object_x || y < object_y + y_adjust {
                continue;
            }

            if x >= object_x + data.phys_size_x as i32
                || y >= object_y + y_adjust + data.phys_size_y as i32
            {
                continue;
            }

            // check occupancy
            let rel_x = (x - object_x) as usize;
            let rel_y = (y - (object_y + y_adjust)) as usize;

            let occupied = data
                .physical_occupancy
                .get(rel_x + rel_y * data.phys_size_x as usize)
                .is_some_and(|v| *v != 0);

            if occupied {
                return Some(index);
            }
        }

        None
    }

    pub fn object_at(&self, x: i32, y: i32) -> Option<&Object> {
        self.object_index_at(x, y).map(|i| &self.objects[i])
    }

    pub fn object_at_mut(&mut self, x: i32, y: i32) -> Option<&mut Object> {
        self.object_index_at(x, y).map(|i| &mut self.objects[i])
    }

    /// Indices of all tunnel objects, optionally in random order (roaming
    /// trains pick a destination tunnel)
    pub fn tunnels(&mut self, shuffled: bool) -> Vec<usize> {
        let mut result: Vec<usize> = self
            .objects
            .iter()
            .enumerate()
            .filter(|(_, object)| {
                object
                    .data()
                    .is_some_and(|d| d.special_type == SpecialType::Tunnel)
            })
            .map(|(index, _)| index)
            .collect();

        if shuffled {
            result.shuffle(&mut self.rng);
        }

        result
    }

    /// Content class of a tile from the save file's tile map
    pub fn tile_object_type(&self, x: i32, y: i32) -> Option<u8> {
        if x < 0 || y < 0 || x >= self.width as i32 || y >= self.height as i32 {
            return None;
        }

        self.tile_object_type
            .get(x as usize + y as usize * self.width as usize)
            .copied()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
