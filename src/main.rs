use anyhow::Context;
use clap::Parser;
use log::info;
use std::path::PathBuf;
use std::time::{Duration, Instant};
use superchip8::emulator::ascii_display;
use superchip8::rom_config::{self, Config, DEFAULT_FRAME_RATE, DEFAULT_INSTRUCTIONS_PER_SECOND};

#[derive(Parser, Debug)]
#[command(version, about = "Runs a CHIP-8 or SUPER-CHIP ROM", long_about = None)]
struct Args {
    /// Path to the .ch8 file to run
    rom_path: PathBuf,

    #[arg(short, long, default_value_t = DEFAULT_INSTRUCTIONS_PER_SECOND, help = "Instructions per second")]
    ips: u32,

    #[arg(short, long, default_value_t = DEFAULT_FRAME_RATE, help = "Timer ticks per second")]
    frame_rate: u32,

    #[arg(short, long, help = "Print the display to the terminal whenever it changes")]
    render: bool,

    #[arg(short, long, help = "Stop after this many seconds")]
    seconds: Option<u64>,
}

impl From<Args> for Config {
    fn from(args: Args) -> Config {
        Config {
            rom_path: args.rom_path,
            instructions_per_second: args.ips,
            frame_rate: args.frame_rate,
            render: args.render,
            run_time: args.seconds.map(Duration::from_secs),
        }
    }
}

fn main() -> anyhow::Result<()> {
    env_logger::init();
    let config = Config::from(Args::parse());

    let executor = rom_config::start(&config)
        .with_context(|| format!("failed to start {}", config.rom_path.display()))?;
    let interface = executor.interface();

    let started = Instant::now();
    let mut last_frame = None;
    while executor.is_running() {
        let frame_start = Instant::now();
        interface.tick();

        if config.render {
            let frame = interface.frame();
            if last_frame.as_ref() != Some(&frame) {
                println!("\x1B[2J\x1B[H{}", ascii_display::render(&frame));
                last_frame = Some(frame);
            }
        }

        if config.run_time.map_or(false, |limit| started.elapsed() >= limit) {
            info!("Run time of {:?} reached.", started.elapsed());
            break;
        }
        std::thread::sleep(config.frame_interval().saturating_sub(frame_start.elapsed()));
    }

    executor.stop().context("emulation aborted")?;
    Ok(())
}
