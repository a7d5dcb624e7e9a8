//! Entrypoint for CLI
use std::{
    env,
    error::Error,
    fs,
    time::{Duration, Instant},
};

use chip8::{prelude::*, Hz, IMPL_VERSION};
use log::{error, info, warn};

static USAGE: &str = r#"
usage: chip8 run FILE [OPTIONS]

commands:
    run     Run the target ROM file without a window

options:
    --hz N        Instructions executed per second (default 1000)
    --frames N    Number of 60Hz frames to run (default 600)
    --seed N      Seed for the random number generator
    --trace       Log every executed instruction

examples:
    chip8 run breakout.rom
    chip8 run maze.rom --frames 120 --seed 7
"#;

const FRAME_DURATION: Duration = Duration::from_nanos(16_666_667);
const DEFAULT_FRAMES: u64 = 600;

fn run_bytecode(opts: RunOpts) -> Result<(), Box<dyn Error>> {
    info!("running {}", opts.filepath);

    let bytecode = fs::read(&opts.filepath)?;

    let mut vm = Chip8Vm::new(Chip8Conf {
        clock_frequency: opts.clock_frequency,
        trace: opts.trace,
        seed: opts.seed,
    });
    vm.load_bytecode(bytecode.as_slice())?;

    let start = Instant::now();
    let mut cycles = 0;
    let mut result = Ok(());

    for frame in 0..opts.frames {
        match vm.run_frame(FRAME_DURATION) {
            Ok(report) => {
                cycles += report.cycles;
                if report.key_wait {
                    // There is no keyboard to unblock the program.
                    warn!("program is waiting for a key at frame {frame}, stopping");
                    break;
                }
            }
            Err(err) => {
                result = Err(err);
                break;
            }
        }
    }
    let end = Instant::now();

    println!(
        "{cycles} cycles, time taken: {}ms",
        end.duration_since(start).as_nanos() as f64 / 1000000.0
    ); // to millis
    println!("{}", vm.dump_display()?);

    if let Err(err) = result {
        println!("{}", vm.dump_registers()?);
        return Err(err.into());
    }

    Ok(())
}

fn main() -> Result<(), Box<dyn Error>> {
    simple_logger::SimpleLogger::new().env().init()?;

    match parse_args() {
        Some(Cmd::Run(opts)) => {
            if let Err(err) = run_bytecode(opts) {
                error!("{err}");
                std::process::exit(1);
            }
        }
        None => {
            print_usage();
            // FreeBSD EX_USAGE (64)
            std::process::exit(64)
        }
    }

    Ok(())
}

fn parse_args() -> Option<Cmd> {
    let mut args = env::args().skip(1);
    match args.next()?.as_str() {
        "run" => parse_run(args).map(Cmd::Run),
        _ => None,
    }
}

fn parse_run(mut args: impl Iterator<Item = String>) -> Option<RunOpts> {
    let mut opts = RunOpts {
        filepath: String::new(),
        clock_frequency: None,
        frames: DEFAULT_FRAMES,
        seed: None,
        trace: false,
    };

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--hz" => {
                let hz = consume_number(&mut args)?;
                if hz == 0 {
                    return None;
                }
                opts.clock_frequency = Some(Hz(hz));
            }
            "--frames" => opts.frames = consume_number(&mut args)?,
            "--seed" => opts.seed = Some(consume_number(&mut args)?),
            "--trace" => opts.trace = true,
            _ if arg.starts_with("--") => return None,
            _ if opts.filepath.is_empty() => opts.filepath = arg,
            _ => return None,
        }
    }

    if opts.filepath.is_empty() {
        None
    } else {
        Some(opts)
    }
}

/// Consumes the next argument as an unsigned integer.
fn consume_number(args: &mut impl Iterator<Item = String>) -> Option<u64> {
    args.next()?.parse().ok()
}

fn print_usage() {
    println!("Chip8 v{IMPL_VERSION}");
    println!("{USAGE}");
}

enum Cmd {
    /// Run file
    Run(RunOpts),
}

struct RunOpts {
    filepath: String,
    clock_frequency: Option<Hz>,
    frames: u64,
    seed: Option<u64>,
    trace: bool,
}

#[cfg(test)]
mod test {
    use super::*;

    fn args(list: &[&str]) -> impl Iterator<Item = String> {
        list.iter().map(|s| s.to_string()).collect::<Vec<_>>().into_iter()
    }

    #[test]
    fn test_parse_run() {
        let opts = parse_run(args(&["maze.rom", "--hz", "500", "--trace"])).unwrap();
        assert_eq!(opts.filepath, "maze.rom");
        assert_eq!(opts.clock_frequency, Some(Hz(500)));
        assert_eq!(opts.frames, DEFAULT_FRAMES);
        assert!(opts.trace);

        let opts = parse_run(args(&["--frames", "3", "--seed", "9", "a.rom"])).unwrap();
        assert_eq!(opts.frames, 3);
        assert_eq!(opts.seed, Some(9));
    }

    #[test]
    fn test_parse_run_rejects() {
        assert!(parse_run(args(&[])).is_none());
        assert!(parse_run(args(&["a.rom", "b.rom"])).is_none());
        assert!(parse_run(args(&["a.rom", "--hz"])).is_none());
        assert!(parse_run(args(&["a.rom", "--hz", "0"])).is_none());
        assert!(parse_run(args(&["a.rom", "--frames", "ten"])).is_none());
        assert!(parse_run(args(&["a.rom", "--fast"])).is_none());
    }
}
