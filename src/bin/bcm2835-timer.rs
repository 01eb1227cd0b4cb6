// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 itsakeyfut
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Headless System Timer runner
//!
//! Builds a machine with one System Timer, runs the virtual clock for a
//! while and prints the register file. Optionally restores a snapshot
//! before running and writes one afterwards.

use std::collections::BTreeMap;
use std::path::PathBuf;

use bcm2835_timer::config::Config;
use bcm2835_timer::core::snapshot::MachineSnapshot;
use bcm2835_timer::core::system::System;
use bcm2835_timer::core::timer::TYPE_BCM2835_TIMER;
use clap::Parser;

/// Run an emulated BCM2835 System Timer
#[derive(Debug, Parser)]
#[command(name = "bcm2835-timer", version, about)]
struct Args {
    /// TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Virtual clock reading at power-on (overrides config)
    #[arg(long)]
    start_us: Option<u64>,

    /// Microseconds to simulate (overrides config)
    #[arg(long)]
    run_us: Option<u64>,

    /// Counter refresh interval (overrides config)
    #[arg(long)]
    interval_us: Option<u64>,

    /// Restore this snapshot before running
    #[arg(long)]
    restore: Option<PathBuf>,

    /// Write a snapshot here after running
    #[arg(long)]
    snapshot: Option<PathBuf>,

    /// Print the register dump as JSON
    #[arg(long)]
    json: bool,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Environment overrides (RUST_LOG) may come from a .env file
    dotenvy::dotenv().ok();

    // Initialize logging
    env_logger::Builder::new()
        .filter_level(log::LevelFilter::Info)
        .parse_default_env()
        .init();

    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => {
            log::info!("Config: {}", path.display());
            Config::load(path)?
        }
        None => Config::default(),
    };
    if let Some(start) = args.start_us {
        config.simulation.start_time_us = start;
    }
    if let Some(run) = args.run_us {
        config.simulation.run_for_us = run;
    }
    if let Some(interval) = args.interval_us {
        config.timer.tick_interval_us = interval;
    }
    config.validate()?;

    let run_for = config.simulation.run_for_us;
    let irq_line = config.simulation.irq_line;

    let mut system = System::new(config);
    let timer = system.create_device(TYPE_BCM2835_TIMER, Some(irq_line))?;

    if let Some(path) = &args.restore {
        log::info!("Restoring snapshot {}", path.display());
        let snapshot = MachineSnapshot::load(path)?;
        system.restore_snapshot(&snapshot)?;
    }

    let dispatched = system.run_for(run_for);
    log::info!(
        "Ran {}us, {} events dispatched, clock now t={}us",
        run_for,
        dispatched,
        system.now_us()
    );

    let dump = system.register_dump(timer)?;
    if args.json {
        let map: BTreeMap<_, _> = dump.iter().copied().collect();
        let report = serde_json::json!({
            "device": TYPE_BCM2835_TIMER,
            "clock_us": system.now_us(),
            "registers": map,
        });
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("{} @ t={}us", TYPE_BCM2835_TIMER, system.now_us());
        for (name, value) in &dump {
            println!("  {:<4} 0x{:08X}", name, value);
        }
    }

    if let Some(path) = &args.snapshot {
        system.save_snapshot()?.save(path)?;
        log::info!("Snapshot written to {}", path.display());
    }

    Ok(())
}
