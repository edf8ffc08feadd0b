// Copyright 2023-2024 the senate-scrutiny developers.
// This file is part of senate-scrutiny.
// senate-scrutiny is free software: you can redistribute it and/or modify it under the terms of the GNU Affero General Public License as published by the Free Software Foundation, either version 3 of the License, or (at your option) any later version.
// senate-scrutiny is distributed in the hope that it will be useful, but WITHOUT ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the GNU Affero General Public License for more details.
// You should have received a copy of the GNU Affero General Public License along with senate-scrutiny.  If not, see <https://www.gnu.org/licenses/>.

use std::path::PathBuf;
use anyhow::anyhow;
use clap::Parser;
use main_app::{run_counts, RunOptions};

/// Count Australian Senate elections under the Commonwealth Electoral Act
/// 1918, writing a JSON report per count and verifying against reference
/// round logs where provided.
#[derive(Parser)]
#[command(version)]
struct Opts {
    /// Configuration file describing the counts to run.
    config: PathBuf,

    /// Directory the JSON reports are written to.
    out_dir: PathBuf,

    /// Suppress progress output.
    #[arg(long)]
    quiet: bool,

    /// Print data summaries and elected candidates as counts finish.
    #[arg(long)]
    verbose: bool,

    /// Read at most this many ballot papers per count. For smoke runs;
    /// truncated counts will not verify.
    #[arg(long)]
    max_ballots: Option<usize>,

    /// Run only the count with this shortname.
    #[arg(long)]
    only: Option<String>,

    /// Run only counts that have verified reference logs.
    #[arg(long)]
    only_verified: bool,
}

fn main() -> anyhow::Result<()> {
    let opts = Opts::parse();
    let options = RunOptions {
        quiet: opts.quiet,
        verbose: opts.verbose,
        max_ballots: opts.max_ballots,
        only: opts.only,
        only_verified: opts.only_verified,
    };
    if run_counts(&opts.config, &opts.out_dir, &options)? {
        Ok(())
    } else {
        Err(anyhow!("verification failed"))
    }
}
