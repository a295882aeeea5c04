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

    cli.rs

    Command line arguments for the headless runner.
*/

use std::path::PathBuf;

use bpaf::Bpaf;
use wd1772_core::machine_types::{EngineType, ImageBackend};

#[derive(Debug, Clone, Bpaf)]
#[bpaf(options, version, generate(cli_args))]
pub struct CmdLineArgs {
    /// TOML file with [fdc] and [[drive]] tables
    #[bpaf(long("config"), argument("PATH"))]
    pub config: Option<PathBuf>,

    /// Raw sector dump to mount in drive A
    #[bpaf(long("image"), argument("PATH"))]
    pub image: PathBuf,

    /// Controller engine used before the image decides: cycle or legacy
    #[bpaf(long("engine"), argument("ENGINE"))]
    pub engine: Option<EngineType>,

    /// Image backend: sector, mfm or flux
    #[bpaf(long("backend"), argument("BACKEND"), fallback(ImageBackend::Sector))]
    pub backend: ImageBackend,

    /// Write every sector the controller read to this file
    #[bpaf(long("dump"), argument("PATH"))]
    pub dump: Option<PathBuf>,

    /// Reformat every track with Write Track, then verify it
    #[bpaf(long("format"), switch)]
    pub format: bool,
}
