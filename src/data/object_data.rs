//! Object template data — the `.dat` text resource format
//!
//! Every placeable object type (building, track piece, scenery) ships a small
//! text resource describing its tile footprint, occupancy, animation framesets
//! and — for track pieces — the coordinate paths a train follows through it.
//! A template is parsed once per type id and shared read-only between all
//! placed instances (see [`ObjectDataStore`](super::ObjectDataStore)).
//!
//! The format is line-oriented with sectioned blocks (`physical_occupancy`,
//! `bitmap_occupancy`, framesets, one or two coordinate lists) interleaved
//! with single-line keywords. Several spellings of the coordinate-list header
//! exist in shipped data, and `-9` is used as a list terminator.

use std::io::BufRead;

use thiserror::Error;

/// Errors produced while parsing a `.dat` resource
#[derive(Debug, Error)]
pub enum DataError {
    #[error("i/o error reading object data: {0}")]
    Io(#[from] std::io::Error),

    #[error("bad integer {value:?} on line {line}")]
    BadInt { line: usize, value: String },

    #[error("malformed {section} entry on line {line}: {content:?}")]
    Malformed {
        line: usize,
        section: &'static str,
        content: String,
    },

    #[error("too many {section} values on line {line}")]
    Overflow { line: usize, section: &'static str },
}

/// Game-logic role of an object, set by a keyword in its data file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SpecialType {
    #[default]
    None,
    Bridge,
    CrossTrack,
    Depot,
    LevelCrossing,
    Points,
    Station,
    Tunnel,
}

/// Directional metadata attached to some special types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SpecialSide {
    #[default]
    None,
    Top,
    Right,
    Bottom,
    Left,
    Horizontal,
    Vertical,
}

impl SpecialSide {
    fn from_keyword(s: &str) -> SpecialSide {
        match s {
            "top" => SpecialSide::Top,
            "right" => SpecialSide::Right,
            "bottom" => SpecialSide::Bottom,
            "left" => SpecialSide::Left,
            "horizontal" => SpecialSide::Horizontal,
            "vertical" => SpecialSide::Vertical,
            _ => SpecialSide::None,
        }
    }
}

/// A named animation clip
#[derive(Debug, Clone, Default)]
pub struct Frameset {
    pub name: String,
    pub start_frame: i32,
    pub end_frame: i32,
    pub delay: i32,
    /// Frames come in pairs, the second being an upper layer drawn one tile up
    pub split_frames: bool,
    pub restart_delay: i32,
    /// Frameset to chain into after holding the end frame
    pub next_frameset: Option<usize>,
    pub sound_id: i32,
    pub replay_delay: i32,
    pub priority: i32,
    pub flip_x: bool,
}

/// Immutable per-type object template
#[derive(Debug, Clone, Default)]
pub struct ObjectData {
    pub name: String,

    pub phys_size_x: u32,
    pub phys_size_y: u32,
    pub phys_size_z: u32,
    /// Row-major physical footprint map, non-zero = tile occupied
    pub physical_occupancy: Vec<i32>,

    /// Bitmap footprint; at least as tall as the physical one, the extra rows
    /// being empty space "above" the building
    pub bitmap_size_x: u32,
    pub bitmap_size_y: u32,
    pub max_bitmap_occupancy: i32,
    pub bitmap_occupancy: Vec<i32>,

    /// Track entry/exit pixel offsets along the left/bottom/right/top edges
    pub entry_exit_offsets: [i32; 4],

    /// Rect minifigs may wander around in
    pub free_to_roam: [i32; 4],

    /// Track path through this object, as pixel offsets from the tile origin.
    /// The second list is used by points and crossings.
    pub coords: Vec<(i32, i32)>,
    pub alt_coords: Vec<(i32, i32)>,

    pub hotspot_x: i32,
    pub hotspot_y: i32,

    pub semi_transparent: bool,

    pub special_type: SpecialType,
    pub special_side: SpecialSide,

    pub total_frames: i32,
    pub num_framesets: i32,
    pub cursor_frameset: Option<usize>,
    pub default_frameset: Option<usize>,
    pub closed_frameset: Option<usize>,
    pub framesets: Vec<Frameset>,
}

enum ParseState {
    Init,

    PhysOccupancyHeader,
    PhysOccupancyData,

    BitmapOccupancyHeader,
    BitmapOccupancyData,

    Framesets,

    CoordList,
    CoordList2,

    // scripted-event data, handled elsewhere; we only need to skip the block
    EasterEgg,
}

fn frameset_index(v: i32) -> Option<usize> {
    (v >= 0).then_some(v as usize)
}

impl ObjectData {
    /// Parse a `.dat` stream into a template
    pub fn parse(reader: impl BufRead) -> Result<ObjectData, DataError> {
        let mut data = ObjectData::default();

        let mut state = ParseState::Init;
        let mut num_coords = [0usize; 2];

        let to_int = |tok: &str, line_no: usize| -> Result<i32, DataError> {
            tok.parse::<i32>().map_err(|_| DataError::BadInt {
                line: line_no,
                value: tok.to_string(),
            })
        };

        for (index, line) in reader.lines().enumerate() {
            let line = line?;
            let line_no = index + 1;
            let line = line.trim_end();

            if line.is_empty() {
                continue;
            }

            let mut split: Vec<&str> = line.split_whitespace().collect();

            match state {
                ParseState::Init => match split[0] {
                    "physical_occupancy" => state = ParseState::PhysOccupancyHeader,
                    "bitmap_occupancy" => state = ParseState::BitmapOccupancyHeader,
                    "entry_exit" if split.len() == 5 => {
                        for (i, tok) in split[1..].iter().enumerate() {
                            data.entry_exit_offsets[i] = to_int(tok, line_no)?;
                        }
                    }
                    "total_number_of_frames" if split.len() == 2 => {
                        data.total_frames = to_int(split[1], line_no)?;
                        state = ParseState::Framesets;
                    }
                    // variations of the same thing, the name isn't important
                    "track_coordinates" | "closed-open" | "closed/open" | "coord" | "coords"
                    | "co-ords"
                        if split.len() == 3 =>
                    {
                        num_coords[0] = to_int(split[1], line_no)?.max(0) as usize;
                        num_coords[1] = to_int(split[2], line_no)?.max(0) as usize;
                        state = ParseState::CoordList;
                    }
                    "Hotspot" | "hotspot" if split.len() == 3 => {
                        data.hotspot_x = to_int(split[1], line_no)?;
                        data.hotspot_y = to_int(split[2], line_no)?;
                    }
                    "FreeToRoam" if split.len() == 5 => {
                        for (i, tok) in split[1..].iter().enumerate() {
                            data.free_to_roam[i] = to_int(tok, line_no)?;
                        }
                    }
                    "closedfs" if split.len() == 2 => {
                        data.closed_frameset = frameset_index(to_int(split[1], line_no)?);
                    }
                    "Name" => data.name = line[4..].trim_start().to_string(),
                    "semi-transparent" => data.semi_transparent = true,

                    // "special" objects
                    "bridge" if split.len() >= 2 => {
                        data.special_type = SpecialType::Bridge;
                        data.special_side = SpecialSide::from_keyword(split[1]);
                    }
                    "crosstrack" => data.special_type = SpecialType::CrossTrack,
                    "depot" if split.len() >= 2 => {
                        data.special_type = SpecialType::Depot;
                        data.special_side = SpecialSide::from_keyword(split[1]);
                    }
                    "levelcrossing" if split.len() >= 2 => {
                        data.special_type = SpecialType::LevelCrossing;
                        data.special_side = if split[1].ends_with('h') {
                            SpecialSide::Horizontal
                        } else {
                            SpecialSide::Vertical
                        };
                    }
                    "points" => data.special_type = SpecialType::Points,
                    "station" if split.len() >= 2 => {
                        data.special_type = SpecialType::Station;
                        data.special_side = if split[1] == "station-h" {
                            SpecialSide::Horizontal
                        } else {
                            SpecialSide::Vertical
                        };
                    }
                    "tunnel" if split.len() >= 2 => {
                        data.special_type = SpecialType::Tunnel;
                        data.special_side = SpecialSide::from_keyword(split[1]);
                    }

                    // scripted-event blocks are consumed by the event system,
                    // skip over them here
                    "InsertSeq" | "MobileSeq" | "TotalVisits" => state = ParseState::EasterEgg,

                    // misc ignored things
                    "animation" => {} // marks the animation section... sometimes
                    "-9" => {}        // usually marks the end of some kind of list
                    "//" => {}        // comment
                    "RMBSeq" | "MaxMinifigForResource" | "PossibleMinifigs" | "Shifts"
                    | "button" | "ButtonVisible" | "LeisureDestination" | "MaxEmployees"
                    | "PossibleEmployees" => {}

                    _ => tracing::debug!("Unhandled object data: {}", line),
                },

                ParseState::PhysOccupancyHeader => {
                    // dims on the first non-empty line
                    if split.len() != 3 {
                        return Err(DataError::Malformed {
                            line: line_no,
                            section: "physical_occupancy",
                            content: line.to_string(),
                        });
                    }

                    data.phys_size_x = to_int(split[0], line_no)?.max(0) as u32;
                    data.phys_size_y = to_int(split[1], line_no)?.max(0) as u32;
                    data.phys_size_z = to_int(split[2], line_no)?.max(0) as u32;

                    data.physical_occupancy
                        .reserve((data.phys_size_x * data.phys_size_y * data.phys_size_z) as usize);

                    state = ParseState::PhysOccupancyData;
                }

                ParseState::PhysOccupancyData => {
                    for tok in &split {
                        data.physical_occupancy.push(to_int(tok, line_no)?);
                    }

                    let expected =
                        (data.phys_size_x * data.phys_size_y * data.phys_size_z) as usize;
                    if data.physical_occupancy.len() == expected {
                        state = ParseState::Init;
                    } else if data.physical_occupancy.len() > expected {
                        return Err(DataError::Overflow {
                            line: line_no,
                            section: "physical_occupancy",
                        });
                    }
                }

                ParseState::BitmapOccupancyHeader => {
                    if split.len() != 2 {
                        return Err(DataError::Malformed {
                            line: line_no,
                            section: "bitmap_occupancy",
                            content: line.to_string(),
                        });
                    }

                    data.bitmap_size_x = to_int(split[0], line_no)?.max(0) as u32;
                    data.bitmap_size_y = to_int(split[1], line_no)?.max(0) as u32;

                    // the bitmap can be taller than the physical footprint,
                    // the rows above the building are all empty
                    if data.bitmap_size_x != data.phys_size_x
                        || data.bitmap_size_y < data.phys_size_y
                    {
                        tracing::warn!(
                            "bitmap size {}x{} does not cover physical size {}x{}",
                            data.bitmap_size_x,
                            data.bitmap_size_y,
                            data.phys_size_x,
                            data.phys_size_y
                        );
                    }

                    state = ParseState::BitmapOccupancyData;
                }

                ParseState::BitmapOccupancyData => {
                    for tok in &split {
                        let v = to_int(tok, line_no)?;
                        data.max_bitmap_occupancy = data.max_bitmap_occupancy.max(v);
                        data.bitmap_occupancy.push(v);
                    }

                    let expected = (data.bitmap_size_x * data.bitmap_size_y) as usize;
                    if data.bitmap_occupancy.len() == expected {
                        state = ParseState::Init;
                    } else if data.bitmap_occupancy.len() > expected {
                        return Err(DataError::Overflow {
                            line: line_no,
                            section: "bitmap_occupancy",
                        });
                    }
                }

                ParseState::Framesets => {
                    if line == "-9" {
                        // end marker
                        if data.framesets.len() != data.num_framesets.max(0) as usize {
                            tracing::warn!(
                                "expected {} framesets, got {}",
                                data.num_framesets,
                                data.framesets.len()
                            );
                        }
                        state = ParseState::Init;
                    } else if split[0] == "number_of_frame_sets" && split.len() == 2 {
                        data.num_framesets = to_int(split[1], line_no)?;
                    } else if (split[0] == "cursor/default_frame_set"
                        || split[0] == "cursor_frame_set")
                        && split.len() == 3
                    {
                        data.cursor_frameset = frameset_index(to_int(split[1], line_no)?);
                        data.default_frameset = frameset_index(to_int(split[2], line_no)?);
                    } else if split.len() == 11 {
                        let fs = Frameset {
                            name: split[0].to_string(),
                            start_frame: to_int(split[1], line_no)?,
                            end_frame: to_int(split[2], line_no)?,
                            delay: to_int(split[3], line_no)?,
                            split_frames: split[4] == "1",
                            restart_delay: to_int(split[5], line_no)?,
                            next_frameset: frameset_index(to_int(split[6], line_no)?),
                            sound_id: to_int(split[7], line_no)?,
                            replay_delay: to_int(split[8], line_no)?,
                            priority: to_int(split[9], line_no)?,
                            flip_x: split[10] == "1",
                        };

                        data.framesets.push(fs);
                    } else {
                        return Err(DataError::Malformed {
                            line: line_no,
                            section: "frameset",
                            content: line.to_string(),
                        });
                    }
                }

                ParseState::CoordList => {
                    if split[0] == "-9" {
                        // "-9 -9" is sometimes used
                        if data.coords.len() != num_coords[0] {
                            tracing::warn!(
                                "expected {} coords, got {}",
                                num_coords[0],
                                data.coords.len()
                            );
                        }
                        // start second list if there is one (points)
                        state = if num_coords[1] != 0 {
                            ParseState::CoordList2
                        } else {
                            ParseState::Init
                        };
                    } else {
                        // sometimes the last newline is missing and the
                        // terminator ends up on the final coord's line
                        if split.len() == 3 && split[2] == "-9" {
                            split.pop();
                            state = if num_coords[1] != 0 {
                                ParseState::CoordList2
                            } else {
                                ParseState::Init
                            };
                        }

                        if split.len() != 2 {
                            return Err(DataError::Malformed {
                                line: line_no,
                                section: "coords",
                                content: line.to_string(),
                            });
                        }

                        data.coords
                            .push((to_int(split[0], line_no)?, to_int(split[1], line_no)?));
                    }
                }

                ParseState::CoordList2 => {
                    if split[0] == "-9" {
                        if data.alt_coords.len() != num_coords[1] {
                            tracing::warn!(
                                "expected {} alt coords, got {}",
                                num_coords[1],
                                data.alt_coords.len()
                            );
                        }
                        state = ParseState::Init;
                    } else {
                        if split.len() != 2 {
                            return Err(DataError::Malformed {
                                line: line_no,
                                section: "alt coords",
                                content: line.to_string(),
                            });
                        }

                        data.alt_coords
                            .push((to_int(split[0], line_no)?, to_int(split[1], line_no)?));
                    }
                }

                ParseState::EasterEgg => {
                    // id list continues until the final "EasterEgg" line
                    if split[0] == "EasterEgg" {
                        state = ParseState::Init;
                    }
                }
            }
        }

        Ok(data)
    }

    /// The track path selected by the alternate flag (points/crossings)
    pub fn path(&self, alternate: bool) -> &[(i32, i32)] {
        if alternate {
            &self.alt_coords
        } else {
            &self.coords
        }
    }

    /// Find a frameset index by name
    pub fn find_frameset(&self, name: &str) -> Option<usize> {
        self.framesets.iter().position(|fs| fs.name == name)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
