//! Track-following trains
//!
//! A train is one engine part plus any number of carriage parts. Each part
//! tracks its position as a fractional index into the coordinate list of the
//! object it is currently on, crossing to the neighbouring object's list when
//! it runs off either end. Coordinate lists of adjacent objects overlap by
//! one point, which is what makes the seam detectable: the point we left on
//! is the second (or second-to-last) point of the new object's path.
//!
//! Carriages are not advanced by speed. Each tick a carriage takes its whole
//! position from a look-behind on the part in front of it, so a train can
//! never stretch or compress. If any part fails to update, the parts behind
//! it are skipped for that tick and the train stalls in place.

use crate::data::SpecialType;

use super::{Object, World, TILE_SIZE};

/// A part's location on the track graph: which tile it is on, which way it is
/// moving through that tile's coordinate list, and whether it is on the
/// alternate (points/crossing) path
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PathPos {
    pub x: i32,
    pub y: i32,
    pub reverse: bool,
    pub alternate: bool,
}

/// Result of walking backward along the track from a part's front point
#[derive(Debug, Clone, Copy)]
struct LookBehind {
    /// Path state of the tile the rear point landed in
    tile: PathPos,
    /// Object occupying that tile, resolved this tick
    obj_index: usize,
    /// Segment index into that tile's path
    index: usize,
    /// Which history slot the rear landed in, `None` for the current tile
    slot: Option<usize>,
    /// The history ring ran out and the index was clamped to its boundary
    clamped: bool,
}

/// Position state handed from a part to the carriage behind it
#[derive(Debug, Clone, Copy)]
struct CarriageSeed {
    coord_pos: f32,
    cur: PathPos,
    prev: [Option<PathPos>; 3],
    /// False when the look-behind producing this seed was clamped
    resolved: bool,
}

/// How a part moves this tick
enum Step {
    /// Advance along the path by this many units (engine)
    Advance(f32),
    /// Take position from the part in front (carriage)
    Couple(CarriageSeed),
}

/// Remap a coordinate-list position into a neighbouring object's index space.
///
/// Selected by the (old direction, new direction) pair. Paths overlap by one
/// point at the seam, so the usable length of a path is `len - 1` segments
/// and the seam point sits at index 1 (or `len - 2`) of the new path. Each
/// formula preserves the fractional sub-position exactly, which is what keeps
/// motion continuous across the boundary.
fn remap_coord_pos(
    pos: f32,
    old_len: usize,
    new_len: usize,
    old_reverse: bool,
    new_reverse: bool,
) -> f32 {
    match (old_reverse, new_reverse) {
        // continue forwards, minus the length we consumed
        (false, false) => pos - (old_len as f32 - 2.0),
        // backwards -> forwards
        (true, false) => -pos + 1.0,
        // forwards -> backwards
        (false, true) => (new_len as f32 - 2.0) - (pos - (old_len as f32 - 1.0)),
        // backwards -> backwards
        (true, true) => (new_len as f32 - 2.0) + pos,
    }
}

fn world_coord(coord: (i32, i32), tile_x: i32, tile_y: i32) -> (i32, i32) {
    (tile_x * TILE_SIZE + coord.0, tile_y * TILE_SIZE + coord.1)
}

/// One unit of a train (the engine or a carriage)
pub struct Part {
    object: Object,

    /// Integer part indexes the active coordinate list, fractional part
    /// interpolates to the next point
    coord_pos: f32,
    cur: PathPos,

    /// The last three tiles we crossed out of, newest first. Look-behind
    /// walks these when the rear point falls off the current tile's path.
    prev: [Option<PathPos>; 3],

    /// Whether the last look-behind fully resolved; carriages with no
    /// resolvable rear yet should not be rendered or coupled from
    valid_pos: bool,
    /// History slot the last look-behind ended in
    last_used_prev: Option<usize>,
}

impl Part {
    fn new(object: Object) -> Self {
        Self {
            object,
            coord_pos: 0.0,
            // off-world until placed, so updates fail cleanly
            cur: PathPos {
                x: -1,
                y: -1,
                reverse: false,
                alternate: false,
            },
            prev: [None; 3],
            valid_pos: false,
            last_used_prev: None,
        }
    }

    pub fn object(&self) -> &Object {
        &self.object
    }

    pub fn object_mut(&mut self) -> &mut Object {
        &mut self.object
    }

    pub fn coord_pos(&self) -> f32 {
        self.coord_pos
    }

    pub fn tile(&self) -> (i32, i32) {
        (self.cur.x, self.cur.y)
    }

    pub fn is_reverse(&self) -> bool {
        self.cur.reverse
    }

    pub fn valid_pos(&self) -> bool {
        self.valid_pos
    }

    /// Advance or couple this part for one tick. Returns false when the part
    /// could not resolve a position (missing object data, dead end, no
    /// matching path at a seam); the part keeps its state and retries next
    /// tick.
    fn update(
        &mut self,
        world: &mut World,
        delta_ms: u32,
        step: Step,
        rear_wheel_distance: i32,
        is_first: bool,
        is_last: bool,
    ) -> bool {
        self.object.update(delta_ms);

        let mut seed_resolved = true;

        match step {
            Step::Advance(amount) => {
                let dir = if self.cur.reverse { -1.0 } else { 1.0 };
                self.coord_pos += amount * dir;
            }
            Step::Couple(seed) => {
                self.coord_pos = seed.coord_pos;
                self.cur = seed.cur;
                self.prev = seed.prev;
                seed_resolved = seed.resolved;
            }
        }

        // find the object we're currently on
        let Some(obj_index) = world.object_index_at(self.cur.x, self.cur.y) else {
            self.valid_pos = false;
            return false;
        };

        let mut data = match world.objects()[obj_index].data() {
            Some(data) => data.clone(),
            None => {
                self.valid_pos = false;
                return false;
            }
        };
        let mut obj_x = world.objects()[obj_index].x();
        let mut obj_y = world.objects()[obj_index].y();

        let old_len = data.path(self.cur.alternate).len();
        if old_len < 2 {
            self.valid_pos = false;
            return false;
        }

        let coord_index = self.coord_pos.floor() as i32;

        if coord_index < 0 || coord_index >= old_len as i32 - 1 {
            // moving to the next object

            let final_coord = {
                let path = data.path(self.cur.alternate);
                if self.cur.reverse {
                    path[0]
                } else {
                    path[old_len - 1]
                }
            };

            let (wx, wy) = world_coord(final_coord, obj_x, obj_y);
            let tile_x = wx.div_euclid(TILE_SIZE);
            let tile_y = wy.div_euclid(TILE_SIZE);

            let new_index = match world.object_index_at(tile_x, tile_y) {
                // same object means a dead end
                Some(index) if index != obj_index => index,
                _ => {
                    tracing::trace!("no track continues at ({}, {})", tile_x, tile_y);
                    self.valid_pos = false;
                    return false;
                }
            };

            let new_obj = &world.objects()[new_index];
            let new_obj_x = new_obj.x();
            let new_obj_y = new_obj.y();

            let Some(new_data) = new_obj.data().cloned() else {
                self.valid_pos = false;
                return false;
            };

            if new_data.coords.len() < 2 {
                self.valid_pos = false;
                return false;
            }

            // the point we arrive on, relative to the new object
            let arrival = (wx - new_obj_x * TILE_SIZE, wy - new_obj_y * TILE_SIZE);

            // coords overlap, so the last coord of the previous path is the
            // second (or second-to-last) of the new one
            let coords = &new_data.coords;
            let matches_coords =
                coords[1] == arrival || coords[coords.len() - 2] == arrival;

            let alt = &new_data.alt_coords;
            let matches_alt =
                alt.len() >= 2 && (alt[1] == arrival || alt[alt.len() - 2] == arrival);

            if !matches_coords && !matches_alt {
                // mismatched track data; stall rather than guess a path
                tracing::trace!(
                    "no path through ({}, {}) continues from ({}, {})",
                    tile_x,
                    tile_y,
                    arrival.0,
                    arrival.1
                );
                self.valid_pos = false;
                return false;
            }

            let mut use_alt = matches_alt;

            if new_data.special_type == SpecialType::Points {
                let open = world.objects()[new_index]
                    .current_frameset()
                    .is_some_and(|fs| fs.name == "open");

                if matches_coords && matches_alt {
                    // both paths touch this seam, the blade position decides
                    use_alt = open;
                } else if open != matches_alt {
                    // arriving against the blades, switch them
                    world.objects_mut()[new_index]
                        .set_animation_named(if open { "closed" } else { "open" });
                }
            }

            // remember where we came from for looking behind later
            self.prev[2] = self.prev[1];
            self.prev[1] = self.prev[0];
            self.prev[0] = Some(self.cur);

            let new_path = new_data.path(use_alt);
            let new_len = new_path.len();
            let new_reverse = new_path[new_len - 2] == arrival;

            self.coord_pos =
                remap_coord_pos(self.coord_pos, old_len, new_len, self.cur.reverse, new_reverse);

            // offset into the new object so the tracked tile has occupancy
            self.cur = PathPos {
                x: new_obj_x + arrival.0.div_euclid(TILE_SIZE),
                y: new_obj_y + arrival.1.div_euclid(TILE_SIZE),
                reverse: new_reverse,
                alternate: use_alt,
            };

            if is_first {
                enter_object(world, new_index);
            }

            obj_x = new_obj_x;
            obj_y = new_obj_y;
            data = new_data;
        }

        // interpolate the front point
        let path = data.path(self.cur.alternate);
        let coord_index = self.coord_pos.floor() as i32;

        if coord_index < 0 || coord_index + 1 >= path.len() as i32 {
            // crossed more than one tile in a single tick
            self.valid_pos = false;
            return false;
        }

        let frac = self.coord_pos - coord_index as f32;
        let index = coord_index as usize;

        let (fx0, fy0) = world_coord(path[index], obj_x, obj_y);
        let (fx1, fy1) = world_coord(path[index + 1], obj_x, obj_y);

        let mut front_x = fx0 as f32 + (fx1 - fx0) as f32 * frac;
        let mut front_y = fy0 as f32 + (fy1 - fy0) as f32 * frac;

        // try to find the back
        let Some(rear) = self.look_behind(world, rear_wheel_distance) else {
            self.valid_pos = false;
            return false;
        };

        self.last_used_prev = rear.slot;

        // the tail has moved past the oldest remembered tile
        let rear_in_oldest = !rear.clamped && rear.slot == Some(2);
        if !rear.clamped && !rear_in_oldest {
            if let Some(oldest) = self.prev[2].take() {
                if is_last {
                    if let Some(left_index) = world.object_index_at(oldest.x, oldest.y) {
                        leave_object(world, left_index);
                    }
                }
            }
        }

        let rear_obj = &world.objects()[rear.obj_index];
        let (rear_obj_x, rear_obj_y) = (rear_obj.x(), rear_obj.y());
        let Some(rear_data) = rear_obj.data() else {
            self.valid_pos = false;
            return false;
        };
        let rear_path = rear_data.path(rear.tile.alternate);

        let (rx0, ry0) = world_coord(rear_path[rear.index], rear_obj_x, rear_obj_y);
        let (rx1, ry1) = world_coord(rear_path[rear.index + 1], rear_obj_x, rear_obj_y);

        let rear_x = rx0 as f32 + (rx1 - rx0) as f32 * frac;
        let rear_y = ry0 as f32 + (ry1 - ry0) as f32 * frac;

        // orient the sprite; 128 pre-rendered headings
        let angle = (rear_x - front_x).atan2(rear_y - front_y);
        let frame =
            ((angle * 64.0 / std::f32::consts::PI).round() as i32 + 96).rem_euclid(128);

        self.object.set_animation_frame(frame);

        // sprites pivot on their hotspot, the table corrects per heading
        if let Some(offset) = world.store_mut().train_data().get(frame as usize).copied() {
            if let Some(part_data) = self.object.data() {
                front_x += (part_data.hotspot_x - offset.x) as f32;
                front_y += (part_data.hotspot_y - offset.y) as f32;
            }
        }

        self.object.set_pixel_pos(front_x, front_y);

        self.valid_pos = seed_resolved && !rear.clamped;
        true
    }

    /// Find the path point `dist` units behind this part's front, walking the
    /// history ring when it falls off the current tile. Returns `None` only
    /// when an involved object can no longer be resolved; running out of
    /// history clamps to the oldest boundary instead.
    fn look_behind(&self, world: &World, dist: i32) -> Option<LookBehind> {
        let obj_index = world.object_index_at(self.cur.x, self.cur.y)?;
        let data = world.objects()[obj_index].data()?;
        let path = data.path(self.cur.alternate);
        if path.len() < 2 {
            return None;
        }

        let coord_index = self.coord_pos.floor() as i32;
        let mut rear_index =
            coord_index + if self.cur.reverse { dist } else { -dist };
        let mut rear_max = path.len() as i32 - 1;

        if rear_index >= 0 && rear_index < rear_max {
            // rear is in the same object
            return Some(LookBehind {
                tile: self.cur,
                obj_index,
                index: rear_index as usize,
                slot: None,
                clamped: false,
            });
        }

        // last tile we managed to consult, for clamping
        let mut last_tile = self.cur;
        let mut last_index = obj_index;
        let mut last_slot = None;

        for (slot, prev) in self.prev.iter().enumerate() {
            let Some(prev) = prev else { break };

            // distance left over after the path we just ran off
            rear_index = if rear_index > 0 {
                rear_index - (rear_max - 1)
            } else {
                -rear_index
            };

            let prev_index = world.object_index_at(prev.x, prev.y)?;
            let prev_data = world.objects()[prev_index].data()?;
            let prev_path = prev_data.path(prev.alternate);
            if prev_path.len() < 2 {
                return None;
            }

            // walking backward through a forward tile means counting from
            // its far end
            rear_index = if prev.reverse {
                rear_index
            } else {
                prev_path.len() as i32 - (rear_index + 2)
            };
            rear_max = prev_path.len() as i32 - 1;

            last_tile = *prev;
            last_index = prev_index;
            last_slot = Some(slot);

            if rear_index >= 0 && rear_index < rear_max {
                return Some(LookBehind {
                    tile: *prev,
                    obj_index: prev_index,
                    index: rear_index as usize,
                    slot: Some(slot),
                    clamped: false,
                });
            }
        }

        // ran out of history, clamp to the oldest boundary we reached
        let index = if rear_index < 0 { 0 } else { rear_max - 1 };
        Some(LookBehind {
            tile: last_tile,
            obj_index: last_index,
            index: index as usize,
            slot: last_slot,
            clamped: true,
        })
    }

    /// Position state for the carriage coupled behind this part, a forward
    /// hand-off of the look-behind result at the coupling distance
    fn next_carriage_pos(&self, world: &World, spacing: i32) -> Option<CarriageSeed> {
        let rear = self.look_behind(world, spacing)?;

        let frac = self.coord_pos - self.coord_pos.floor();

        // the carriage inherits whatever history lies behind the tile it
        // landed in
        let prev = match rear.slot {
            None => self.prev,
            Some(slot) => {
                let mut tail = [None; 3];
                for (dst, src) in (slot + 1..3).enumerate() {
                    tail[dst] = self.prev[src];
                }
                tail
            }
        };

        Some(CarriageSeed {
            coord_pos: rear.index as f32 + frac,
            cur: rear.tile,
            prev,
            resolved: !rear.clamped,
        })
    }

    /// Seed this part at the start of an object's path. Depots and tunnels
    /// facing bottom/left get the direction flipped so forward motion exits
    /// them instead of running into the back wall.
    fn place_in_object(&mut self, world: &World, obj_index: usize) {
        let object = &world.objects()[obj_index];

        let Some(data) = object.data() else { return };
        if data.coords.is_empty() {
            return;
        }

        let (px, py) = world_coord(data.coords[0], object.x(), object.y());
        self.object.set_pixel_pos(px as f32, py as f32);

        self.coord_pos = 0.0;

        let mut reverse = false;

        if matches!(
            data.special_type,
            SpecialType::Depot | SpecialType::Tunnel
        ) && matches!(
            data.special_side,
            crate::data::SpecialSide::Bottom | crate::data::SpecialSide::Left
        ) {
            reverse = true;
            self.coord_pos = data.coords.len() as f32 - 2.0;
        }

        self.cur = PathPos {
            x: object.x(),
            y: object.y() + data.bitmap_size_y.saturating_sub(data.phys_size_y) as i32,
            reverse,
            alternate: false,
        };

        self.prev = [None; 3];
        self.valid_pos = false;
        self.last_used_prev = None;
    }

    fn copy_position(&mut self, other: &Part) {
        self.coord_pos = other.coord_pos;
        self.cur = other.cur;
        self.prev = other.prev;
        self.valid_pos = false;
        self.last_used_prev = None;
    }
}

/// An engine and its chain of carriages
pub struct Train {
    name: String,
    speed: f32,

    rear_wheel_distance: i32,
    carriage_spacing: i32,

    engine: Part,
    carriages: Vec<Part>,
}

impl Train {
    pub fn new(world: &mut World, engine_id: u16, name: String) -> Self {
        let object = world.create_object(engine_id, 0, 0, name.clone());
        let config = world.config();

        Self {
            name,
            // TODO: min/max speed from the engine's .dat
            speed: config.default_train_speed,
            rear_wheel_distance: config.rear_wheel_distance,
            carriage_spacing: config.carriage_spacing,
            engine: Part::new(object),
            carriages: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn speed(&self) -> f32 {
        self.speed
    }

    pub fn set_speed(&mut self, speed: f32) {
        self.speed = speed;
    }

    pub fn engine(&self) -> &Part {
        &self.engine
    }

    pub fn carriages(&self) -> &[Part] {
        &self.carriages
    }

    pub fn add_carriage(&mut self, world: &mut World, id: u16) {
        let object = world.create_object(id, 0, 0, String::new());

        let mut part = Part::new(object);
        part.copy_position(self.carriages.last().unwrap_or(&self.engine));

        self.carriages.push(part);
    }

    /// Advance the engine, then couple each carriage to the part in front of
    /// it. A failed part stalls everything behind it for this tick.
    pub fn update(&mut self, delta_ms: u32, world: &mut World) {
        let amount = (delta_ms as f32 / 1000.0) * self.speed;
        let num_carriages = self.carriages.len();

        if !self.engine.update(
            world,
            delta_ms,
            Step::Advance(amount),
            self.rear_wheel_distance,
            true,
            num_carriages == 0,
        ) {
            tracing::trace!("train {:?} stalled", self.name);
            return;
        }

        for i in 0..num_carriages {
            let in_front = if i == 0 {
                &self.engine
            } else {
                &self.carriages[i - 1]
            };

            let Some(seed) = in_front.next_carriage_pos(world, self.carriage_spacing) else {
                break;
            };

            let ok = self.carriages[i].update(
                world,
                delta_ms,
                Step::Couple(seed),
                self.rear_wheel_distance,
                false,
                i == num_carriages - 1,
            );

            if !ok {
                break;
            }
        }
    }

    /// Put the whole train at the start of an object's path (depot, tunnel)
    pub fn place_in_object(&mut self, world: &mut World, obj_index: usize) {
        self.engine.place_in_object(world, obj_index);

        // carriages start stacked on the engine; the first update ticks pull
        // them apart to their coupling positions
        for part in &mut self.carriages {
            part.copy_position(&self.engine);
        }

        enter_object(world, obj_index);
    }
}

// close the crossing barrier as a train arrives
// TODO: should close before the train actually reaches it
fn enter_object(world: &mut World, index: usize) {
    let Some(object) = world.objects_mut().get_mut(index) else {
        return;
    };

    let is_crossing = object
        .data()
        .is_some_and(|d| d.special_type == SpecialType::LevelCrossing);

    if is_crossing {
        // the animation name is inconsistent across crossing types
        if !object.set_animation_named("closed") {
            object.set_animation_named("default");
        }
    }
}

// re-open the crossing once the last part has passed
// TODO: delay?
fn leave_object(world: &mut World, index: usize) {
    let Some(object) = world.objects_mut().get_mut(index) else {
        return;
    };

    let is_crossing = object
        .data()
        .is_some_and(|d| d.special_type == SpecialType::LevelCrossing);

    if is_crossing {
        object.set_animation_named("open");
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SimConfig;
    use crate::data::{Frameset, ObjectData, ObjectDataStore, SpecialSide};

    fn test_world() -> World {
        World::new(ObjectDataStore::new("nonexistent"), SimConfig::default())
    }

    /// One tile of straight horizontal track: two 8px segments plus the
    /// overlap points shared with the neighbours on either side
    fn straight_coords() -> Vec<(i32, i32)> {
        vec![(-8, 0), (0, 0), (8, 0), (16, 0)]
    }

    fn track_data(coords: Vec<(i32, i32)>) -> ObjectData {
        ObjectData {
            phys_size_x: 1,
            phys_size_y: 1,
            phys_size_z: 1,
            physical_occupancy: vec![1],
            bitmap_size_x: 1,
            bitmap_size_y: 1,
            coords,
            ..ObjectData::default()
        }
    }

    fn part_at(x: i32, y: i32, pos: f32, reverse: bool) -> Part {
        let mut part = Part::new(Object::new(100, 0, 0, String::new(), None));
        part.coord_pos = pos;
        part.cur = PathPos {
            x,
            y,
            reverse,
            alternate: false,
        };
        part
    }

    fn advance(part: &mut Part, world: &mut World, amount: f32) -> bool {
        part.update(world, 0, Step::Advance(amount), 0, true, true)
    }

    // --- remap ------------------------------------------------------------

    #[test]
    fn remap_forward_to_forward() {
        assert!((remap_coord_pos(3.3, 4, 4, false, false) - 1.3).abs() < 1e-5);
    }

    #[test]
    fn remap_backward_to_forward() {
        assert!((remap_coord_pos(-0.3, 4, 4, true, false) - 1.3).abs() < 1e-5);
    }

    #[test]
    fn remap_forward_to_backward() {
        assert!((remap_coord_pos(3.3, 4, 4, false, true) - 1.7).abs() < 1e-5);
    }

    #[test]
    fn remap_backward_to_backward() {
        assert!((remap_coord_pos(-0.3, 4, 4, true, true) - 1.7).abs() < 1e-5);
    }

    // --- advancing within one object --------------------------------------

    #[test]
    fn straight_track_advance() {
        let mut world = test_world();
        world
            .store_mut()
            .insert(1, track_data(vec![(0, 0), (16, 0), (32, 0)]));
        world.add_object(1, 0, 0, String::new());

        let mut part = part_at(0, 0, 0.5, false);
        assert!(part.update(&mut world, 1000, Step::Advance(1.0), 0, true, true));

        assert!((part.coord_pos - 1.5).abs() < 1e-5);
        let (px, py) = part.object().pixel_pos();
        assert!((px - 24.0).abs() < 1e-4);
        assert!((py - 0.0).abs() < 1e-4);
    }

    #[test]
    fn constant_speed_is_continuous() {
        let mut world = test_world();
        world.store_mut().insert(1, track_data(straight_coords()));
        world.add_object(1, 5, 5, String::new());

        let mut part = part_at(5, 5, 0.2, false);
        assert!(advance(&mut part, &mut world, 0.0));
        let (mut last_x, _) = part.object().pixel_pos();

        // equal steps give equal pixel deltas while no boundary is crossed
        for _ in 0..5 {
            assert!(advance(&mut part, &mut world, 0.25));
            let (x, y) = part.object().pixel_pos();
            assert!((x - last_x - 2.0).abs() < 1e-4); // 0.25 units * 8px
            assert!((y - 80.0).abs() < 1e-4);
            last_x = x;
        }
    }

    // --- boundary crossing ------------------------------------------------

    #[test]
    fn crossing_forward_to_forward() {
        let mut world = test_world();
        world.store_mut().insert(1, track_data(straight_coords()));
        world.add_object(1, 5, 5, String::new());
        world.add_object(1, 6, 5, String::new());

        let mut part = part_at(5, 5, 2.8, false);
        assert!(advance(&mut part, &mut world, 0.0));
        let (before_x, _) = part.object().pixel_pos();
        assert!((before_x - 94.4).abs() < 1e-3);

        assert!(advance(&mut part, &mut world, 0.5));

        assert_eq!(part.tile(), (6, 5));
        assert!(!part.is_reverse());
        assert!((part.coord_pos - 1.3).abs() < 1e-5);

        // no jump at the seam: 0.5 units is 4px
        let (after_x, after_y) = part.object().pixel_pos();
        assert!((after_x - 98.4).abs() < 1e-3);
        assert!((after_y - 80.0).abs() < 1e-4);
        assert!((after_x - before_x - 4.0).abs() < 1e-3);

        // the tile we left went into the history ring
        assert_eq!(
            part.prev[0],
            Some(PathPos {
                x: 5,
                y: 5,
                reverse: false,
                alternate: false
            })
        );
    }

    #[test]
    fn crossing_backward_to_backward() {
        let mut world = test_world();
        world.store_mut().insert(1, track_data(straight_coords()));
        world.add_object(1, 5, 5, String::new());
        world.add_object(1, 6, 5, String::new());

        let mut part = part_at(6, 5, 0.2, true);
        assert!(advance(&mut part, &mut world, 0.0));
        let (before_x, _) = part.object().pixel_pos();
        assert!((before_x - 89.6).abs() < 1e-3);

        assert!(advance(&mut part, &mut world, 0.5));

        assert_eq!(part.tile(), (5, 5));
        assert!(part.is_reverse());
        assert!((part.coord_pos - 1.7).abs() < 1e-5);

        let (after_x, _) = part.object().pixel_pos();
        assert!((after_x - 85.6).abs() < 1e-3);
        assert!((before_x - after_x - 4.0).abs() < 1e-3);
    }

    /// The same tile of track with its coordinate list running the other way
    fn flipped_coords() -> Vec<(i32, i32)> {
        vec![(16, 0), (8, 0), (0, 0), (-8, 0)]
    }

    #[test]
    fn crossing_forward_to_backward() {
        let mut world = test_world();
        world.store_mut().insert(1, track_data(straight_coords()));
        world.store_mut().insert(2, track_data(flipped_coords()));
        world.add_object(1, 5, 5, String::new());
        world.add_object(2, 6, 5, String::new());

        // the next tile's list runs the opposite way, so the exit point
        // matches its second-to-last coord and the part flips to reverse
        let mut part = part_at(5, 5, 2.8, false);
        assert!(advance(&mut part, &mut world, 0.0));
        let (before_x, _) = part.object().pixel_pos();
        assert!((before_x - 94.4).abs() < 1e-3);

        assert!(advance(&mut part, &mut world, 0.5));

        assert_eq!(part.tile(), (6, 5));
        assert!(part.is_reverse());
        assert!((part.coord_pos - 1.7).abs() < 1e-5);

        let (after_x, after_y) = part.object().pixel_pos();
        assert!((after_x - 98.4).abs() < 1e-3);
        assert!((after_y - 80.0).abs() < 1e-4);
        assert!((after_x - before_x - 4.0).abs() < 1e-3);
    }

    #[test]
    fn crossing_backward_to_forward() {
        let mut world = test_world();
        world.store_mut().insert(1, track_data(straight_coords()));
        world.store_mut().insert(2, track_data(flipped_coords()));
        world.add_object(2, 5, 5, String::new());
        world.add_object(1, 6, 5, String::new());

        // moving backward off the front of a flipped list lands on the next
        // tile's second coord, so the part straightens out to forward
        let mut part = part_at(5, 5, 0.2, true);
        assert!(advance(&mut part, &mut world, 0.0));
        let (before_x, _) = part.object().pixel_pos();
        assert!((before_x - 94.4).abs() < 1e-3);

        assert!(advance(&mut part, &mut world, 0.5));

        assert_eq!(part.tile(), (6, 5));
        assert!(!part.is_reverse());
        assert!((part.coord_pos - 1.3).abs() < 1e-5);

        let (after_x, _) = part.object().pixel_pos();
        assert!((after_x - 98.4).abs() < 1e-3);
        assert!((after_x - before_x - 4.0).abs() < 1e-3);
    }

    #[test]
    fn reversing_round_trip_returns_to_start() {
        let mut world = test_world();
        world.store_mut().insert(1, track_data(straight_coords()));
        world.add_object(1, 5, 5, String::new());
        world.add_object(1, 6, 5, String::new());

        let mut part = part_at(5, 5, 1.5, false);
        assert!(advance(&mut part, &mut world, 0.0));
        let (start_x, start_y) = part.object().pixel_pos();

        // forward across the seam
        assert!(advance(&mut part, &mut world, 2.0));
        assert_eq!(part.tile(), (6, 5));
        assert!((part.coord_pos - 1.5).abs() < 1e-5);

        // turn around and come back the same distance
        part.cur.reverse = true;
        assert!(advance(&mut part, &mut world, 2.0));

        assert_eq!(part.tile(), (5, 5));
        assert!(part.is_reverse());
        assert!((part.coord_pos - 1.5).abs() < 1e-5);

        let (end_x, end_y) = part.object().pixel_pos();
        assert!((end_x - start_x).abs() < 1e-3);
        assert!((end_y - start_y).abs() < 1e-3);
    }

    #[test]
    fn dead_end_stalls() {
        let mut world = test_world();
        world.store_mut().insert(1, track_data(straight_coords()));
        world.add_object(1, 5, 5, String::new());

        let mut part = part_at(5, 5, 2.8, false);
        assert!(!advance(&mut part, &mut world, 0.5));

        // nothing changed except the advanced position, retried next tick
        assert_eq!(part.tile(), (5, 5));
        assert_eq!(part.prev[0], None);
        assert!(!part.valid_pos());
    }

    #[test]
    fn seam_mismatch_stalls_without_guessing() {
        let mut world = test_world();
        world.store_mut().insert(1, track_data(straight_coords()));
        // neighbouring tile whose path doesn't touch our exit point
        world
            .store_mut()
            .insert(2, track_data(vec![(0, 8), (8, 8), (16, 8), (24, 8)]));
        world.add_object(1, 5, 5, String::new());
        world.add_object(2, 6, 5, String::new());

        let mut part = part_at(5, 5, 2.8, false);
        assert!(!advance(&mut part, &mut world, 0.5));

        assert_eq!(part.tile(), (5, 5));
        assert_eq!(part.prev[0], None);
    }

    // --- points -----------------------------------------------------------

    fn points_data() -> ObjectData {
        ObjectData {
            special_type: SpecialType::Points,
            // primary continues straight, alternate branches down
            alt_coords: vec![(-8, 0), (0, 0), (8, 8), (16, 16)],
            total_frames: 2,
            num_framesets: 2,
            default_frameset: Some(1),
            framesets: vec![
                Frameset {
                    name: "open".to_string(),
                    ..Frameset::default()
                },
                Frameset {
                    name: "closed".to_string(),
                    start_frame: 1,
                    end_frame: 1,
                    ..Frameset::default()
                },
            ],
            ..track_data(straight_coords())
        }
    }

    #[test]
    fn points_pick_path_from_blade_state() {
        let mut world = test_world();
        world.store_mut().insert(1, track_data(straight_coords()));
        world.store_mut().insert(2, points_data());
        world.add_object(1, 5, 5, String::new());
        world.add_object(2, 6, 5, String::new());

        // both paths share the seam point; closed blades pick the primary,
        // and crossing again without touching them picks the same path
        for _ in 0..2 {
            let mut part = part_at(5, 5, 2.8, false);
            assert!(advance(&mut part, &mut world, 0.5));
            assert!(!part.cur.alternate);
            assert_eq!(
                world.objects()[1].current_frameset().unwrap().name,
                "closed"
            );
        }

        // open blades pick the alternate
        world.objects_mut()[1].set_animation_named("open");
        let mut part = part_at(5, 5, 2.8, false);
        assert!(advance(&mut part, &mut world, 0.5));
        assert!(part.cur.alternate);
    }

    #[test]
    fn points_switch_when_arriving_against_blades() {
        let mut world = test_world();
        world.store_mut().insert(1, track_data(straight_coords()));
        // only the alternate path touches the seam
        world.store_mut().insert(
            2,
            ObjectData {
                coords: vec![(0, 8), (8, 8), (16, 8), (24, 8)],
                alt_coords: straight_coords(),
                ..points_data()
            },
        );
        world.add_object(1, 5, 5, String::new());
        world.add_object(2, 6, 5, String::new());

        let mut part = part_at(5, 5, 2.8, false);
        assert!(advance(&mut part, &mut world, 0.5));

        assert!(part.cur.alternate);
        // the blades were switched to match the path taken
        assert_eq!(world.objects()[1].current_frameset().unwrap().name, "open");
    }

    // --- look-behind ------------------------------------------------------

    #[test]
    fn look_behind_within_object() {
        let mut world = test_world();
        world.store_mut().insert(1, track_data(straight_coords()));
        world.add_object(1, 5, 5, String::new());

        let part = part_at(5, 5, 2.5, false);
        let rear = part.look_behind(&world, 1).unwrap();

        assert_eq!(rear.index, 1);
        assert_eq!(rear.slot, None);
        assert!(!rear.clamped);
    }

    #[test]
    fn look_behind_across_one_boundary() {
        let mut world = test_world();
        world
            .store_mut()
            .insert(1, track_data(vec![(0, 0), (8, 0), (16, 0)]));
        world.store_mut().insert(
            2,
            track_data(vec![
                (-8, 0),
                (-6, 0),
                (-4, 0),
                (-2, 0),
                (0, 0),
                (2, 0),
                (4, 0),
                (6, 0),
            ]),
        );
        world.add_object(2, 5, 5, String::new());
        world.add_object(1, 6, 5, String::new());

        // 2 units available before index 0, the other 3 resolve in the
        // previous tile's 8-point path
        let mut part = part_at(6, 5, 2.0, false);
        part.prev[0] = Some(PathPos {
            x: 5,
            y: 5,
            reverse: false,
            alternate: false,
        });

        let rear = part.look_behind(&world, 5).unwrap();

        assert_eq!(rear.slot, Some(0));
        assert_eq!(rear.index, 3);
        assert_eq!((rear.tile.x, rear.tile.y), (5, 5));
        assert!(!rear.clamped);
    }

    #[test]
    fn look_behind_exhausted_history_clamps() {
        let mut world = test_world();
        world.store_mut().insert(1, track_data(straight_coords()));
        world.add_object(1, 5, 5, String::new());

        let part = part_at(5, 5, 1.5, false);
        let rear = part.look_behind(&world, 10).unwrap();

        assert!(rear.clamped);
        assert_eq!(rear.index, 0);
        assert_eq!(rear.slot, None);
    }

    #[test]
    fn look_behind_matches_undivided_path() {
        let mut world = test_world();
        // the same stretch of track as one two-tile object...
        world.store_mut().insert(
            1,
            ObjectData {
                phys_size_x: 2,
                physical_occupancy: vec![1, 1],
                bitmap_size_x: 2,
                coords: vec![(-8, 0), (0, 0), (8, 0), (16, 0), (24, 0), (32, 0)],
                ..track_data(Vec::new())
            },
        );
        // ...and as two joined single tiles
        world.store_mut().insert(2, track_data(straight_coords()));

        world.add_object(1, 5, 5, String::new());
        world.add_object(2, 5, 7, String::new());
        world.add_object(2, 6, 7, String::new());

        let rear_pixel = |part: &Part, world: &World, dist: i32| -> (f32, f32) {
            let rear = part.look_behind(world, dist).unwrap();
            assert!(!rear.clamped);
            let obj = &world.objects()[rear.obj_index];
            let path = obj.data().unwrap().path(rear.tile.alternate);
            let frac = part.coord_pos - part.coord_pos.floor();
            let (x0, y0) = world_coord(path[rear.index], obj.x(), obj.y());
            let (x1, y1) = world_coord(path[rear.index + 1], obj.x(), obj.y());
            (
                x0 as f32 + (x1 - x0) as f32 * frac,
                y0 as f32 + (y1 - y0) as f32 * frac,
            )
        };

        for (pos, dist) in [(1.5, 1), (1.5, 3), (0.25, 2)] {
            // two-tile decomposition: standing on the second tile
            let mut split = part_at(6, 7, pos, false);
            split.prev[0] = Some(PathPos {
                x: 5,
                y: 7,
                reverse: false,
                alternate: false,
            });

            // undivided: same point is 2 units further along the long path
            let whole = part_at(5, 5, pos + 2.0, false);

            let (sx, sy) = rear_pixel(&split, &world, dist);
            let (wx, wy) = rear_pixel(&whole, &world, dist);

            // same world point, two tiles up
            assert!((sx - wx).abs() < 1e-4, "pos {pos} dist {dist}");
            assert!((sy - 32.0 - wy).abs() < 1e-4, "pos {pos} dist {dist}");
        }
    }

    // --- placement --------------------------------------------------------

    #[test]
    fn depot_exit_reverses_direction() {
        let mut world = test_world();
        world.store_mut().insert(
            3,
            ObjectData {
                special_type: SpecialType::Depot,
                special_side: SpecialSide::Left,
                ..track_data(straight_coords())
            },
        );
        let index = world.objects().len();
        world.add_object(3, 5, 5, String::new());

        let mut part = part_at(-1, -1, 0.0, false);
        part.place_in_object(&world, index);

        assert!(part.is_reverse());
        assert!((part.coord_pos - 2.0).abs() < 1e-5);
        assert_eq!(part.tile(), (5, 5));

        // first tick moves toward the exit at index 0
        assert!(advance(&mut part, &mut world, 0.5));
        assert!((part.coord_pos - 1.5).abs() < 1e-5);
    }

    #[test]
    fn placement_adjusts_for_bitmap_height() {
        let mut world = test_world();
        world.store_mut().insert(
            3,
            ObjectData {
                bitmap_size_y: 3,
                ..track_data(straight_coords())
            },
        );
        let index = world.objects().len();
        world.add_object(3, 5, 5, String::new());

        let mut part = part_at(-1, -1, 0.0, false);
        part.place_in_object(&world, index);

        // the path lives in the bottom (physical) row of the bitmap
        assert_eq!(part.tile(), (5, 7));
        assert!(!part.is_reverse());
        assert!((part.coord_pos - 0.0).abs() < 1e-5);
        assert!(!part.valid_pos());
    }

    // --- enter/leave hooks ------------------------------------------------

    fn crossing_data() -> ObjectData {
        ObjectData {
            special_type: SpecialType::LevelCrossing,
            total_frames: 2,
            num_framesets: 2,
            default_frameset: Some(0),
            framesets: vec![
                Frameset {
                    name: "open".to_string(),
                    ..Frameset::default()
                },
                Frameset {
                    name: "closed".to_string(),
                    start_frame: 1,
                    end_frame: 1,
                    ..Frameset::default()
                },
            ],
            ..track_data(straight_coords())
        }
    }

    #[test]
    fn entering_level_crossing_closes_it() {
        let mut world = test_world();
        world.store_mut().insert(1, track_data(straight_coords()));
        world.store_mut().insert(4, crossing_data());
        world.add_object(1, 5, 5, String::new());
        world.add_object(4, 6, 5, String::new());

        assert_eq!(world.objects()[1].current_frameset().unwrap().name, "open");

        let mut part = part_at(5, 5, 2.8, false);
        assert!(advance(&mut part, &mut world, 0.5));

        assert_eq!(
            world.objects()[1].current_frameset().unwrap().name,
            "closed"
        );
    }

    #[test]
    fn leaving_oldest_tile_reopens_crossing() {
        let mut world = test_world();
        world.store_mut().insert(1, track_data(straight_coords()));
        world.store_mut().insert(4, crossing_data());
        world.add_object(1, 5, 5, String::new());
        world.add_object(4, 3, 5, String::new());

        world.objects_mut()[1].set_animation_named("closed");

        // rear resolves in the current tile, so the oldest remembered tile
        // (the crossing) is now fully behind the train
        let mut part = part_at(5, 5, 1.5, false);
        part.prev = [
            Some(PathPos {
                x: 5,
                y: 5,
                reverse: false,
                alternate: false,
            }),
            Some(PathPos {
                x: 5,
                y: 5,
                reverse: false,
                alternate: false,
            }),
            Some(PathPos {
                x: 3,
                y: 5,
                reverse: false,
                alternate: false,
            }),
        ];

        assert!(advance(&mut part, &mut world, 0.0));

        assert_eq!(part.prev[2], None);
        assert_eq!(part.last_used_prev, None);
        assert_eq!(world.objects()[1].current_frameset().unwrap().name, "open");
    }

    #[test]
    fn clamped_look_behind_keeps_history() {
        let mut world = test_world();
        world.store_mut().insert(1, track_data(straight_coords()));
        world.add_object(1, 5, 5, String::new());
        world.add_object(1, 4, 5, String::new());

        let mut part = part_at(5, 5, 1.5, false);
        part.prev[2] = Some(PathPos {
            x: 4,
            y: 5,
            reverse: false,
            alternate: false,
        });

        // distance 10 exhausts the ring; the oldest tile must stay tracked
        assert!(part.update(&mut world, 0, Step::Advance(0.0), 10, true, true));
        assert!(part.prev[2].is_some());
        assert!(!part.valid_pos());
    }

    // --- carriages --------------------------------------------------------

    #[test]
    fn carriage_couples_at_spacing_behind_engine() {
        let mut world = test_world();
        world.store_mut().insert(1, track_data(straight_coords()));
        world.add_object(1, 5, 5, String::new());
        world.add_object(1, 6, 5, String::new());

        let mut engine = part_at(6, 5, 1.5, false);
        engine.prev[0] = Some(PathPos {
            x: 5,
            y: 5,
            reverse: false,
            alternate: false,
        });

        let mut train = Train {
            name: "test".to_string(),
            speed: 1.0,
            rear_wheel_distance: 0,
            carriage_spacing: 3,
            engine,
            carriages: vec![part_at(-1, -1, 0.0, false)],
        };

        train.update(500, &mut world);

        // engine advanced half a unit
        assert!((train.engine.coord_pos - 2.0).abs() < 1e-5);
        let (ex, _) = train.engine.object().pixel_pos();
        assert!((ex - 104.0).abs() < 1e-3);

        // carriage sits 3 units behind, in the previous tile
        let carriage = &train.carriages[0];
        assert_eq!(carriage.tile(), (5, 5));
        assert!((carriage.coord_pos - 1.0).abs() < 1e-5);
        assert!(carriage.valid_pos());

        let (cx, _) = carriage.object().pixel_pos();
        assert!((ex - cx - 24.0).abs() < 1e-3); // 3 units * 8px
    }

    #[test]
    fn carriage_with_unresolved_seed_is_not_valid() {
        let mut world = test_world();
        world.store_mut().insert(1, track_data(straight_coords()));
        world.add_object(1, 5, 5, String::new());

        // no history behind the engine yet, the coupling look-behind clamps
        let mut train = Train {
            name: "test".to_string(),
            speed: 1.0,
            rear_wheel_distance: 0,
            carriage_spacing: 3,
            engine: part_at(5, 5, 1.5, false),
            carriages: vec![part_at(-1, -1, 0.0, false)],
        };

        train.update(0, &mut world);

        let carriage = &train.carriages[0];
        assert_eq!(carriage.tile(), (5, 5));
        assert!(!carriage.valid_pos());
    }

    #[test]
    fn stalled_engine_stalls_carriages() {
        let mut world = test_world();
        world.store_mut().insert(1, track_data(straight_coords()));
        world.add_object(1, 5, 5, String::new());

        let mut train = Train {
            name: "test".to_string(),
            speed: 1.0,
            rear_wheel_distance: 0,
            carriage_spacing: 3,
            engine: part_at(5, 5, 2.8, false),
            carriages: vec![part_at(-1, -1, 7.0, false)],
        };

        // engine runs off the dead end and fails
        train.update(500, &mut world);

        // the carriage was never coupled this tick
        assert!((train.carriages[0].coord_pos - 7.0).abs() < 1e-5);
        assert!(!train.carriages[0].valid_pos());
    }

    #[test]
    fn train_construction_takes_config_defaults() {
        let mut world = test_world();
        let train = Train::new(&mut world, 500, "Lady".to_string());

        assert_eq!(train.name(), "Lady");
        assert!((train.speed() - 35.0).abs() < 1e-5);
        assert_eq!(train.rear_wheel_distance, 22);
        assert_eq!(train.carriage_spacing, 38);
        assert!(train.carriages().is_empty());
    }

    #[test]
    fn orientation_frame_for_horizontal_motion() {
        let mut world = test_world();
        world.store_mut().insert(1, track_data(straight_coords()));
        world.store_mut().insert(
            5,
            ObjectData {
                total_frames: 128,
                ..ObjectData::default()
            },
        );
        world.add_object(1, 5, 5, String::new());

        let mut part = part_at(5, 5, 1.5, false);
        part.object = Object::new(5, 0, 0, String::new(), world.store_mut().get(5));

        assert!(part.update(&mut world, 0, Step::Advance(0.0), 1, true, true));

        // moving right: rear is directly left, atan2(-dx, 0) = -pi/2,
        // giving frame -32 + 96
        assert_eq!(part.object().current_frame(), 64);
    }
}
