//! A placed object instance — tile position, animation playback, riders
//!
//! Objects are created when a save is loaded (or dynamically by scripted
//! events), hold a shared reference to their type's template, and are removed
//! at the end of an update tick once their id is set to the dead sentinel.

use std::sync::Arc;

use crate::data::{Frameset, ObjectData};

/// Objects with this id are filtered out at the end of the current tick
pub const DEAD_OBJECT_ID: u16 = 0xFFFF;

/// A figure riding in / assigned to an object
#[derive(Debug, Clone)]
pub struct Minifig {
    pub id: u32,
    pub name: String,
}

/// A placed instance of an object type
pub struct Object {
    id: u16,
    x: i32,
    y: i32,
    name: String,

    data: Option<Arc<ObjectData>>,

    minifigs: Vec<Minifig>,

    current_animation: Option<usize>,
    next_animation: Option<usize>,
    current_frame: i32,
    animation_timer: i32,

    // "screen" aligned objects
    pixel_x: f32,
    pixel_y: f32,

    // moving objects
    target_x: i32,
    target_y: i32,
    vel_x: i32,
    vel_y: i32,
    reverse: bool,
}

impl Object {
    pub fn new(id: u16, x: i32, y: i32, name: String, data: Option<Arc<ObjectData>>) -> Self {
        let mut object = Self {
            id,
            x,
            y,
            name,
            data,
            minifigs: Vec::new(),
            current_animation: None,
            next_animation: None,
            current_frame: 0,
            animation_timer: 0,
            pixel_x: 0.0,
            pixel_y: 0.0,
            target_x: 0,
            target_y: 0,
            vel_x: 0,
            vel_y: 0,
            reverse: false,
        };

        object.set_default_animation();
        object
    }

    /// Advance glide movement and animation playback
    pub fn update(&mut self, delta_ms: u32) {
        let Some(data) = self.data.clone() else {
            return;
        };

        if self.vel_x != 0 || self.vel_y != 0 {
            let delta = delta_ms as f32 / 1000.0;
            self.pixel_x += self.vel_x as f32 * delta;
            self.pixel_y += self.vel_y as f32 * delta;

            let done = (self.vel_x > 0 && self.pixel_x >= self.target_x as f32)
                || (self.vel_x < 0 && self.pixel_x <= self.target_x as f32)
                || (self.vel_y > 0 && self.pixel_y >= self.target_y as f32)
                || (self.vel_y < 0 && self.pixel_y <= self.target_y as f32);

            if done {
                if self.reverse {
                    // go back to the original position
                    self.target_x = self.x;
                    self.target_y = self.y;
                    self.vel_x = -self.vel_x;
                    self.vel_y = -self.vel_y;
                    self.reverse = false;
                } else {
                    // mark for removal at the end of the tick
                    self.id = DEAD_OBJECT_ID;
                }
            }
        }

        if self.current_animation.is_some() && self.animation_timer != 0 {
            self.animation_timer -= delta_ms as i32;

            while self.animation_timer <= 0 {
                let Some(frameset) = self
                    .current_animation
                    .and_then(|i| data.framesets.get(i))
                else {
                    break;
                };

                // if start > end, play backwards
                let mut dir = if frameset.start_frame > frameset.end_frame {
                    -1
                } else {
                    1
                };

                // split framesets step by 2 to skip the paired upper layer
                if frameset.split_frames {
                    dir *= 2;
                }

                if let Some(next) = self.next_animation.take() {
                    // delayed frameset change
                    self.current_animation = Some(next);
                    self.current_frame = data
                        .framesets
                        .get(next)
                        .map_or(0, |fs| fs.start_frame);
                } else {
                    self.current_frame += dir;
                }

                // check if we've reached the end
                if (dir > 0 && self.current_frame > frameset.end_frame)
                    || (dir < 0 && self.current_frame < frameset.end_frame)
                {
                    self.current_frame = frameset.end_frame; // hold the last frame

                    // move to the next animation if one is set
                    if let Some(next) = frameset.next_frameset {
                        self.next_animation = Some(next);
                        self.animation_timer = frameset.restart_delay * 1000;
                        continue;
                    }

                    // otherwise stop
                    self.animation_timer = 0;
                    break;
                }

                self.animation_timer += self.frame_delay();
            }
        }
    }

    pub fn id(&self) -> u16 {
        self.id
    }

    pub fn is_dead(&self) -> bool {
        self.id == DEAD_OBJECT_ID
    }

    pub fn x(&self) -> i32 {
        self.x
    }

    pub fn y(&self) -> i32 {
        self.y
    }

    pub fn set_x(&mut self, x: i32) {
        self.x = x;
    }

    pub fn set_y(&mut self, y: i32) {
        self.y = y;
    }

    pub fn set_position(&mut self, x: i32, y: i32) {
        self.x = x;
        self.y = y;
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn data(&self) -> Option<&Arc<ObjectData>> {
        self.data.as_ref()
    }

    /// Swap this object for a different type in place (scripted events use
    /// this, including with [`DEAD_OBJECT_ID`] to remove an object)
    pub fn replace(&mut self, new_id: u16, new_data: Option<Arc<ObjectData>>) {
        self.id = new_id;
        self.data = new_data;
    }

    pub fn add_minifig(&mut self, minifig: Minifig) {
        self.minifigs.push(minifig);
    }

    pub fn minifigs(&self) -> &[Minifig] {
        &self.minifigs
    }

    pub fn current_frameset(&self) -> Option<&Frameset> {
        self.data
            .as_ref()?
            .framesets
            .get(self.current_animation?)
    }

    pub fn frame_delay(&self) -> i32 {
        match self.current_frameset() {
            Some(frameset) => frameset.delay.max(1) * 30, // ms per delay unit, tuned by eye
            None => 0,
        }
    }

    pub fn set_default_animation(&mut self) {
        if let Some(index) = self.data.as_ref().and_then(|d| d.default_frameset) {
            self.set_animation(index);
        }
    }

    /// Set the active frameset by index. Returns false (and changes nothing)
    /// for an invalid index.
    pub fn set_animation(&mut self, index: usize) -> bool {
        let Some(data) = self.data.clone() else {
            return false;
        };

        let Some(frameset) = data.framesets.get(index) else {
            return false;
        };

        self.current_animation = Some(index);
        self.next_animation = None;
        self.current_frame = frameset.start_frame;
        self.animation_timer = self.frame_delay();

        true
    }

    /// Set the active frameset by name ("open"/"closed" transitions).
    /// Returns whether a matching frameset was found.
    pub fn set_animation_named(&mut self, name: &str) -> bool {
        match self.data.as_ref().and_then(|d| d.find_frameset(name)) {
            Some(index) => self.set_animation(index),
            None => false,
        }
    }

    /// Direct frame override for objects whose frame is determined by
    /// something other than playback (orientation for trains)
    pub fn set_animation_frame(&mut self, frame: i32) {
        let Some(data) = &self.data else {
            return;
        };

        if frame < 0 || frame > data.total_frames {
            return;
        }

        self.current_frame = frame;
    }

    pub fn current_frame(&self) -> i32 {
        self.current_frame
    }

    pub fn pixel_pos(&self) -> (f32, f32) {
        (self.pixel_x, self.pixel_y)
    }

    pub fn set_pixel_pos(&mut self, x: f32, y: f32) {
        self.pixel_x = x;
        self.pixel_y = y;
    }

    /// Start a linear glide to a target pixel position. With `reverse` the
    /// object glides back to its origin after arrival instead of dying.
    pub fn set_target_pos(&mut self, tx: i32, ty: i32, vx: i32, vy: i32, reverse: bool) {
        self.target_x = tx;
        self.target_y = ty;
        self.vel_x = vx;
        self.vel_y = vy;
        self.reverse = reverse;
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
