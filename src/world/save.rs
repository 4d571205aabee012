//! Save-file loading
//!
//! A save is a fixed 0x114-byte header, a `width * height` tile-type map,
//! then one 0x80-byte record per placed object and one 44-byte record per
//! train. Only the parts that supply object, minifig and train data are
//! parsed here.

use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

use anyhow::Context;
use byteorder::{LittleEndian, ReadBytesExt};

use crate::data::SpecialType;

use super::{Minifig, Train, World};

/// NUL-terminated string out of a fixed-size field
fn read_cstr(buf: &[u8]) -> String {
    let end = buf.iter().position(|b| *b == 0).unwrap_or(buf.len());
    String::from_utf8_lossy(&buf[..end]).into_owned()
}

impl World {
    pub fn load_save(&mut self, path: &Path) -> anyhow::Result<()> {
        let file = File::open(path)
            .with_context(|| format!("failed to open save {}", path.display()))?;

        self.load_save_from(&mut BufReader::new(file))
            .with_context(|| format!("failed to load save {}", path.display()))
    }

    pub fn load_save_from(&mut self, reader: &mut impl Read) -> anyhow::Result<()> {
        let mut header = [0u8; 0x114];
        reader
            .read_exact(&mut header)
            .context("failed to read save header")?;

        // always 8, 0 in every file seen so far
        if header[0] != 8 || header[1] != 0 {
            tracing::warn!(
                "unexpected bytes {} {} at the start of the save header",
                header[0],
                header[1]
            );
        }

        self.width = u16::from_le_bytes([header[2], header[3]]);
        self.height = u16::from_le_bytes([header[4], header[5]]);

        let num_objects =
            u32::from_le_bytes([header[8], header[9], header[10], header[11]]);
        let num_trains = u16::from_le_bytes([header[12], header[13]]);

        let backdrop_name = read_cstr(&header[14..]);
        self.backdrop_path = if backdrop_name.is_empty() {
            "backdrop/backdrop.bmp".to_string()
        } else {
            format!("backdrop/{backdrop_name}.bmp")
        };

        tracing::info!(
            "{}x{} world, {} objects, {} trains",
            self.width,
            self.height,
            num_objects,
            num_trains
        );

        // rough content class per tile, possibly for the minimap
        let map_len = self.width as usize * self.height as usize;
        self.tile_object_type = vec![0u8; map_len];
        reader
            .read_exact(&mut self.tile_object_type)
            .context("failed to read tile type map")?;

        self.objects.clear();
        self.trains.clear();

        let mut depots = Vec::new();

        for i in 0..num_objects {
            self.read_object_record(reader, &mut depots)
                .with_context(|| format!("failed to read object {i}"))?;
        }

        let mut depot_index = 0;

        for i in 0..num_trains {
            self.read_train_record(reader, &depots, &mut depot_index)
                .with_context(|| format!("failed to read train {i}"))?;
        }

        Ok(())
    }

    fn read_object_record(
        &mut self,
        reader: &mut impl Read,
        depots: &mut Vec<usize>,
    ) -> anyhow::Result<()> {
        let id = reader.read_u16::<LittleEndian>()?;
        let x = reader.read_u16::<LittleEndian>()?;
        let y = reader.read_u16::<LittleEndian>()?;

        // padding to align the oversized frameset index
        reader.read_u16::<LittleEndian>()?;

        let frameset_index = reader.read_i32::<LittleEndian>()?;

        let mut unknown = [0u8; 4];
        reader.read_exact(&mut unknown)?;

        let mut name_buf = [0u8; 12];
        reader.read_exact(&mut name_buf)?;

        let index = self.objects.len();
        let object = self.add_object(id, x as i32, y as i32, read_cstr(&name_buf));

        if frameset_index >= 0 {
            object.set_animation(frameset_index as usize);
        }

        // up to 5 riders per object
        for _ in 0..5 {
            let minifig_id = reader.read_u32::<LittleEndian>()?;

            let mut unknown = [0u8; 4];
            reader.read_exact(&mut unknown)?;

            let mut minifig_name = [0u8; 12];
            reader.read_exact(&mut minifig_name)?;

            // the record always has five slots, but id 0 marks an empty one;
            // those are dropped here rather than stored
            if minifig_id != 0 {
                let minifig = Minifig {
                    id: minifig_id,
                    name: read_cstr(&minifig_name),
                };
                tracing::debug!("minifig {} {:?}", minifig.id, minifig.name);
                self.objects[index].add_minifig(minifig);
            }
        }

        // collect depots for placing trains
        let is_depot = self.objects[index]
            .data()
            .is_some_and(|d| d.special_type == SpecialType::Depot);
        if is_depot {
            depots.push(index);
        }

        Ok(())
    }

    fn read_train_record(
        &mut self,
        reader: &mut impl Read,
        depots: &[usize],
        depot_index: &mut usize,
    ) -> anyhow::Result<()> {
        // object ids for the engine and up to three carriages
        let mut ids = [0u32; 4];
        for id in &mut ids {
            *id = reader.read_u32::<LittleEndian>()?;
        }

        // engine: 1 = diesel, 2 = steam? carriage: 2 = passenger,
        // 3 = cargo, 4 = mail?
        let mut types = [0u32; 4];
        for ty in &mut types {
            *ty = reader.read_u32::<LittleEndian>()?;
        }

        let mut name_buf = [0u8; 12];
        reader.read_exact(&mut name_buf)?;
        let name = read_cstr(&name_buf);

        tracing::info!("train {:?} ids {:?} types {:?}", name, ids, types);

        let mut train = Train::new(self, ids[0] as u16, name);

        for &id in &ids[1..] {
            if id != 0 {
                train.add_carriage(self, id as u16);
            }
        }

        // assign to the next depot round-robin
        // TODO: if there are more trains than depots, the extra trains need
        // to leave their shared depot immediately
        if !depots.is_empty() {
            train.place_in_object(self, depots[*depot_index]);
            *depot_index = (*depot_index + 1) % depots.len();
        }

        self.trains.push(train);

        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
