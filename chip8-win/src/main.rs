use std::{env, error::Error};

#[macro_use]
extern crate slog;
use chip8::{prelude::*, IMPL_VERSION};
use chip8_win::{Chip8App, InputMap, DEFAULT_KEYMAP};
use log::{error, info};
use slog::Drain;

static USAGE: &str = r#"
usage: chip8-win FILE [--keymap FILE]

options:
    --keymap FILE    YAML file mapping keyboard keys to the keypad

examples:
    chip8-win breakout.rom
    chip8-win breakout.rom --keymap azerty.yaml
"#;

fn main() -> Result<(), Box<dyn Error>> {
    let decorator = slog_term::PlainDecorator::new(std::io::stdout());
    let drain = slog_term::CompactFormat::new(decorator).build().fuse();
    let drain = slog_async::Async::new(drain).build().fuse();
    let logger = slog::Logger::root(drain, o!("version" => env!("CARGO_PKG_VERSION")));

    let scope_guard = slog_scope::set_global_logger(logger);
    slog_stdlog::init_with_level(log::Level::Info)?;

    let Some(args) = parse_args() else {
        println!("Chip8 v{IMPL_VERSION}");
        println!("{USAGE}");
        // FreeBSD EX_USAGE (64)
        std::process::exit(64)
    };

    info!("starting...");

    let input_map = match &args.keymap {
        Some(filepath) => InputMap::from_file(filepath)?,
        None => InputMap::from_yaml(DEFAULT_KEYMAP)?,
    };

    let mut event_loop = Chip8App::create_event_loop();
    let mut app = Chip8App::new(&event_loop, input_map, Chip8Conf::default())?;

    app.load_rom(&args.filepath)?;

    match app.run(&mut event_loop) {
        Ok(_) => {}
        Err(err) => {
            error!("{err}");
            // Drop the logger so buffered messages are flushed before exiting.
            drop(scope_guard);
            std::process::exit(1);
        }
    }

    info!("done");

    Ok(())
}

struct Args {
    filepath: String,
    keymap: Option<String>,
}

fn parse_args() -> Option<Args> {
    let mut args = env::args().skip(1);
    let mut filepath = None;
    let mut keymap = None;

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--keymap" => keymap = Some(args.next()?),
            _ if arg.starts_with("--") => return None,
            _ if filepath.is_none() => filepath = Some(arg),
            _ => return None,
        }
    }

    Some(Args {
        filepath: filepath?,
        keymap,
    })
}
