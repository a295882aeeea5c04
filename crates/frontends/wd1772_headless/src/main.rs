/*
    WD1772 Emulation

    Copyright 2026 The WD1772 Emulation Authors

    Permission is hereby granted, free of charge, to any person obtaining a
    copy of this software and associated documentation files (the “Software”),
    to deal in the Software without restriction, including without limitation
    the rights to use, copy, modify, merge, publish, distribute, sublicense,
    and/or sell copies of the Software, and to permit persons to whom the
    Software is furnished to do so, subject to the following conditions:

    The above copyright notice and this permission notice shall be included in
    all copies or substantial portions of the Software.

    THE SOFTWARE IS PROVIDED “AS IS”, WITHOUT WARRANTY OF ANY KIND, EXPRESS OR
    IMPLIED, INCLUDING BUT NOT LIMITED TO THE WARRANTIES OF MERCHANTABILITY,
    FITNESS FOR A PARTICULAR PURPOSE AND NONINFRINGEMENT. IN NO EVENT SHALL THE
    AUTHORS OR COPYRIGHT HOLDERS BE LIABLE FOR ANY CLAIM, DAMAGES OR OTHER
    LIABILITY, WHETHER IN AN ACTION OF CONTRACT, TORT OR OTHERWISE, ARISING
    FROM, OUT OF OR IN CONNECTION WITH THE SOFTWARE OR THE USE OR OTHER
    DEALINGS IN THE SOFTWARE.

    --------------------------------------------------------------------------

    main.rs

    Headless runner: mounts a raw sector dump and drives the WD1772 through
    a scripted session.
*/

mod cli;
mod session;

use anyhow::Context;
use wd1772_core::{
    devices::image::{image_from_raw, sector_image::SectorImage, DiskImage},
    machine::FloppySystem,
    machine_config::{read_config_file, MachineFdcConfig},
};

use crate::{
    cli::cli_args,
    session::{Geometry, Session},
};

fn main() -> Result<(), anyhow::Error> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = cli_args().run();

    let mut config = match &args.config {
        Some(path) => read_config_file(path)?,
        None => MachineFdcConfig::default(),
    };
    if let Some(engine) = args.engine {
        config.fdc.default_engine = engine;
    }

    let raw = std::fs::read(&args.image).with_context(|| format!("reading {}", args.image.display()))?;
    let sectors = SectorImage::from_raw(&raw)?;
    let geometry = Geometry {
        sides: sectors.sides(),
        tracks: sectors.tracks(),
        sectors: sectors.sectors(0, 0).len() as u8,
    };
    let image = image_from_raw(&raw, args.backend, config.fdc.cycles_per_byte())?;
    log::info!(
        "Mounted {} through the {:?} backend ({} bytes)",
        args.image.display(),
        args.backend,
        raw.len()
    );

    let mut sys = FloppySystem::new(&config);
    sys.insert(0, image)?;

    let report = Session::new(&mut sys, geometry).run(args.format)?;
    log::info!(
        "Read {} sector(s), {} error(s), engine {}, {} cycles",
        report.sectors_read,
        report.read_errors,
        sys.fdc().engine_type(),
        sys.cycles()
    );
    if args.format {
        log::info!(
            "Formatted {} track(s), {} verify error(s)",
            report.tracks_formatted,
            report.verify_errors
        );
    }
    if let Some(path) = &args.dump {
        std::fs::write(path, &report.data).with_context(|| format!("writing {}", path.display()))?;
        log::info!("Wrote {} bytes to {}", report.data.len(), path.display());
    }
    Ok(())
}
