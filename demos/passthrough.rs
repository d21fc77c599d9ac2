//! Pass the microphone through to the virtual sink (or any output).
//!
//! Run with: cargo run --example passthrough -- devices
//!           cargo run --example passthrough -- run --input "USB" --gain 0.8
//!
//! Set RUST_LOG=voxbridge=debug for engine logs. Press Enter to stop.

use std::io::{self, BufRead};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::thread;
use std::time::Duration;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use voxbridge::transform::{factory, Gain};
use voxbridge::{
    DeviceDescriptor, Engine, EngineConfig, StreamFormat, DEFAULT_BLOCK_SIZE, DEFAULT_SAMPLE_RATE,
};

const POLL_INTERVAL: Duration = Duration::from_millis(200);

#[derive(Debug, Parser)]
#[command(name = "passthrough")]
#[command(about = "Real-time duplex pass-through demo")]
struct Cli {
    /// Name of the virtual sink used when no output is given.
    #[arg(long, global = true)]
    sink: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// List the devices the engine would offer.
    Devices,
    /// Stream from an input to an output until Enter is pressed.
    Run {
        /// Input device index or name fragment. Defaults to the first input.
        #[arg(long)]
        input: Option<String>,
        /// Output device index or name fragment. Defaults to the virtual sink.
        #[arg(long)]
        output: Option<String>,
        #[arg(long, default_value_t = DEFAULT_SAMPLE_RATE)]
        rate: u32,
        #[arg(long, default_value_t = DEFAULT_BLOCK_SIZE)]
        block: usize,
        /// Apply a gain instead of passing the signal through unchanged.
        #[arg(long)]
        gain: Option<f32>,
    },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let cli = Cli::parse();
    let mut config = EngineConfig::default();
    if let Some(sink) = cli.sink {
        config = config.with_virtual_sink(sink);
    }
    let mut engine = Engine::with_cpal(config);

    match cli.command {
        Command::Devices => list(&engine),
        Command::Run {
            input,
            output,
            rate,
            block,
            gain,
        } => run(&mut engine, input, output, StreamFormat::new(rate, block), gain),
    }
}

fn describe(device: &DeviceDescriptor) -> String {
    format!(
        "  [{}] {} ({}, {} in / {} out)",
        device.index,
        device.name,
        device.host,
        device.max_input_channels,
        device.max_output_channels
    )
}

fn list(engine: &Engine) -> Result<(), Box<dyn std::error::Error>> {
    let devices = engine.list_devices()?;
    if devices.is_empty() {
        println!("No audio devices found.");
        return Ok(());
    }

    println!("Inputs:");
    for device in &devices.inputs {
        println!("{}", describe(device));
    }
    println!("Outputs:");
    for device in &devices.outputs {
        println!("{}", describe(device));
    }

    match devices.find_preferred_output(&engine.config().virtual_sink_name) {
        Some(device) => println!("\nDefault output: {}", device.name),
        None => println!("\nNo output device available."),
    }
    Ok(())
}

fn run(
    engine: &mut Engine,
    input: Option<String>,
    output: Option<String>,
    format: StreamFormat,
    gain: Option<f32>,
) -> Result<(), Box<dyn std::error::Error>> {
    let devices = engine.list_devices()?;

    let input = match &input {
        Some(query) => devices.find_input(query),
        None => devices.inputs.first(),
    }
    .ok_or("no matching input device")?
    .clone();

    let output = match &output {
        Some(query) => Some(
            devices
                .find_output(query)
                .ok_or("no matching output device")?
                .clone(),
        ),
        None => None,
    };

    if let Some(gain) = gain {
        engine.set_transform(factory(move |ctx| {
            Box::new(Gain::new(gain).with_smoothing_ms(10.0, ctx.sample_rate))
        }))?;
    }

    engine.start(&input, output.as_ref(), format)?;
    if let Some(config) = engine.stream_config() {
        println!(
            "Streaming {} -> {} @ {}Hz, {} frames. Press Enter to stop.",
            config.input.name,
            config.output.name,
            config.sample_rate(),
            config.block_size()
        );
    }

    let (enter_tx, enter_rx) = mpsc::channel();
    thread::spawn(move || {
        let mut line = String::new();
        let _ = io::stdin().lock().read_line(&mut line);
        let _ = enter_tx.send(());
    });

    loop {
        for event in engine.drain_status() {
            println!("{}", event);
        }
        match enter_rx.recv_timeout(POLL_INTERVAL) {
            Err(RecvTimeoutError::Timeout) => continue,
            Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
        }
    }

    engine.stop();
    for event in engine.drain_status() {
        println!("{}", event);
    }
    Ok(())
}
