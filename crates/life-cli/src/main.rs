//! `life`: command-line interface for the Game of Life accelerator.
//!
//! ```text
//! USAGE:
//!   life run [--generations N]       Load the initial state and stream generations
//!   life status                      Dump engine registers and port readback
//!   life reset                       Soft-reset the transfer engine
//!   life predict [--generations N]   Print the expected generations (no hardware)
//! ```
//!
//! `--backend software` runs everything against the simulated accelerator.

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use life_chip::grid;
use life_driver::backends::DEFAULT_MEM_DEVICE;
use life_driver::{
    configure_engine, Board, DeviceTable, Direction, DriverConfig, Generation, GenerationPipeline,
    HardwareBoard, RegisterPort, SimulatedBoard, TransferEngine,
};
use std::path::PathBuf;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "life", about = "Game of Life accelerator host driver", version)]
struct Cli {
    #[command(subcommand)]
    command: Cmd,
}

#[derive(Subcommand)]
enum Cmd {
    /// Load the initial state, pulse the strobe, and print every generation.
    Run {
        #[command(flatten)]
        target: Target,

        /// Initial 8×8 state as hex (row 0 in the top byte).
        #[arg(long, value_parser = parse_state, default_value = "0x0000000000C06080")]
        initial_state: u64,

        /// Stop after this many generations (default: run forever).
        #[arg(long)]
        generations: Option<u64>,

        /// Busy checks before a transfer counts as timed out.
        #[arg(long, default_value_t = life_chip::map::POLL_TIMEOUT_COUNTER)]
        poll_budget: u32,

        /// Pause between generations, in milliseconds.
        #[arg(long, default_value_t = life_chip::map::IDLE_INTERVAL_MS)]
        idle_ms: u64,
    },
    /// Dump transfer-engine registers and the injection ports.
    Status {
        #[command(flatten)]
        target: Target,
    },
    /// Soft-reset the transfer engine and mask its interrupts.
    Reset {
        #[command(flatten)]
        target: Target,
    },
    /// Print the generations the accelerator should produce.
    Predict {
        /// Initial 8×8 state as hex.
        #[arg(long, value_parser = parse_state, default_value = "0x0000000000C06080")]
        initial_state: u64,

        /// Number of generations to print.
        #[arg(long, default_value_t = 4)]
        generations: u64,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum Backend {
    /// Registers through /dev/mem.
    Hardware,
    /// Simulated accelerator.
    Software,
}

#[derive(Args)]
struct Target {
    /// Backend to drive.
    #[arg(long, value_enum, default_value_t = Backend::Hardware)]
    backend: Backend,

    /// Physical-memory device (hardware backend).
    #[arg(long, default_value = DEFAULT_MEM_DEVICE)]
    mem_device: PathBuf,

    /// Busy checks per simulated transfer (software backend).
    #[arg(long, default_value_t = 0)]
    sim_latency: u32,
}

fn parse_state(s: &str) -> std::result::Result<u64, String> {
    let digits = s.trim_start_matches("0x").trim_start_matches("0X").replace('_', "");
    u64::from_str_radix(&digits, 16).map_err(|e| format!("invalid hex state '{s}': {e}"))
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| "warn".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Cmd::Run {
            target,
            initial_state,
            generations,
            poll_budget,
            idle_ms,
        } => {
            let config = DriverConfig::default()
                .with_initial_state(initial_state)
                .with_generation_limit(generations)
                .with_poll_budget(poll_budget)
                .with_idle_interval(Duration::from_millis(idle_ms));
            match target.backend {
                Backend::Hardware => cmd_run(open_hardware(&target)?, config)?,
                Backend::Software => cmd_run(simulated(&target, &config), config)?,
            }
        }
        Cmd::Status { target } => {
            let config = DriverConfig::default();
            match target.backend {
                Backend::Hardware => cmd_status(open_hardware(&target)?, &config)?,
                Backend::Software => cmd_status(simulated(&target, &config), &config)?,
            }
        }
        Cmd::Reset { target } => {
            let config = DriverConfig::default();
            match target.backend {
                Backend::Hardware => cmd_reset(open_hardware(&target)?, &config)?,
                Backend::Software => cmd_reset(simulated(&target, &config), &config)?,
            }
        }
        Cmd::Predict {
            initial_state,
            generations,
        } => cmd_predict(initial_state, generations),
    }

    Ok(())
}

fn open_hardware(target: &Target) -> Result<HardwareBoard> {
    HardwareBoard::open(&target.mem_device, DeviceTable::zynq_default())
        .with_context(|| format!("opening {}", target.mem_device.display()))
}

fn simulated(target: &Target, config: &DriverConfig) -> SimulatedBoard {
    SimulatedBoard::new(config).with_latency(target.sim_latency)
}

fn cmd_run<B: Board>(board: B, config: DriverConfig) -> Result<()> {
    let mut pipeline =
        GenerationPipeline::bring_up(board, config).context("bringing up the injection ports")?;
    let mut stdout = std::io::stdout().lock();
    let received = pipeline
        .run(&mut stdout)
        .with_context(|| format!("generation {} failed", pipeline.generation()))?;
    eprintln!("{received} generations received");
    Ok(())
}

fn cmd_status<B: Board>(mut board: B, config: &DriverConfig) -> Result<()> {
    println!("Backend      : {}", board.backend_type());

    let engine = board
        .transfer_engine(config.dma_base)
        .context("mapping the transfer engine")?;
    let ec = engine.config();
    println!("Engine       : {:#x}", ec.base_address);
    println!("Channels     : mm2s={} s2mm={}", ec.has_mm2s, ec.has_s2mm);
    println!("SG mode      : {}", ec.has_scatter_gather);
    println!("Max transfer : {} bytes", ec.max_transfer_len());
    for direction in Direction::BOTH {
        let snap = engine.snapshot(direction);
        println!(
            "{direction}         : CR={:#010x} SR={} addr={:#x} len={}",
            snap.control, snap.status, snap.address, snap.length
        );
        println!("               {:?}", snap.status);
    }

    for (name, base) in [
        ("load", config.load_base),
        ("data-low", config.data_lo_base),
        ("data-high", config.data_hi_base),
    ] {
        let port = board
            .register_port(base)
            .with_context(|| format!("mapping the {name} port"))?;
        println!(
            "Port {name:<9}: {base:#x} width={} value={:#010x}",
            port.config().width_bits,
            port.read()
        );
    }
    Ok(())
}

fn cmd_reset<B: Board>(mut board: B, config: &DriverConfig) -> Result<()> {
    let engine = configure_engine(&mut board, config.dma_base).context("resetting the engine")?;
    for direction in Direction::BOTH {
        let snap = engine.snapshot(direction);
        println!("{direction}: CR={:#010x} SR={}", snap.control, snap.status);
    }
    Ok(())
}

fn cmd_predict(initial_state: u64, generations: u64) {
    let mut state = initial_state;
    for index in 0..generations {
        println!("--- Generation {index} ---");
        print!("{}", Generation::new(index, state.to_be_bytes()));
        state = grid::step(state);
    }
}
