use std::path::Path;

use anyhow::{bail, Context, Result};
use tracing_subscriber::EnvFilter;

use openbricktrain::config::SimConfig;
use openbricktrain::data::ObjectDataStore;
use openbricktrain::world::World;

/// Headless simulation runner: load a save, tick the world at a fixed rate,
/// log where the trains end up.
fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env().add_directive("openbricktrain=debug".parse()?),
        )
        .init();

    tracing::info!("OpenBrickTrain v{}", env!("CARGO_PKG_VERSION"));

    let mut args = std::env::args().skip(1);

    let (Some(data_dir), Some(save_path)) = (args.next(), args.next()) else {
        bail!("usage: openbricktrain <data dir> <save file> [ticks]");
    };

    let ticks: u64 = match args.next() {
        Some(v) => v.parse().context("invalid tick count")?,
        None => 300,
    };

    let config = SimConfig::load(Path::new("openbricktrain.json"));
    let tick_rate = config.tick_rate.max(1);
    let delta_ms = 1000 / tick_rate;

    let store = ObjectDataStore::new(data_dir);
    let mut world = World::new(store, config);
    world.load_save(Path::new(&save_path))?;

    for tick in 0..ticks {
        world.update(delta_ms);

        // once a second
        if tick % tick_rate as u64 == 0 {
            for train in world.trains() {
                let (x, y) = train.engine().object().pixel_pos();
                tracing::info!(
                    "train {:?} at ({:.1}, {:.1}), valid={}",
                    train.name(),
                    x,
                    y,
                    train.engine().valid_pos()
                );
            }
        }
    }

    Ok(())
}
