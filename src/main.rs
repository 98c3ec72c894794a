use sqldash::config;
use sqldash::core::{DashError, Result};
use sqldash::repl::run_repl;
use sqldash::session::Session;
use std::io;
use std::path::PathBuf;
use tracing::{info, Level};

const USAGE: &str = "usage: sqldash [DB_PATH] [--config FILE]";

/// Command-line arguments.
#[derive(Debug, Default, PartialEq)]
struct CliArgs {
    db_path: Option<String>,
    config: Option<PathBuf>,
    help: bool,
}

fn parse_args<I: IntoIterator<Item = String>>(args: I) -> Result<CliArgs> {
    let mut parsed = CliArgs::default();
    let mut args = args.into_iter();
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "-h" | "--help" => parsed.help = true,
            "-c" | "--config" => {
                let file = args
                    .next()
                    .ok_or_else(|| DashError::Command(format!("--config needs a file\n{}", USAGE)))?;
                parsed.config = Some(PathBuf::from(file));
            }
            flag if flag.starts_with('-') && flag != "-" => {
                return Err(DashError::Command(format!("unknown option '{}'\n{}", flag, USAGE)));
            }
            _ if parsed.db_path.is_none() => parsed.db_path = Some(arg),
            _ => {
                return Err(DashError::Command(format!("unexpected argument '{}'\n{}", arg, USAGE)));
            }
        }
    }
    Ok(parsed)
}

/// Logs go to stderr so they never mix with REPL output. The level comes from
/// `SQLDASH_LOG` (error, warn, info, debug, trace) and defaults to warn.
fn init_logging() {
    let level = std::env::var("SQLDASH_LOG")
        .ok()
        .and_then(|value| value.parse::<Level>().ok())
        .unwrap_or(Level::WARN);
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(io::stderr)
        .init();
}

fn run() -> Result<()> {
    let args = parse_args(std::env::args().skip(1))?;
    if args.help {
        println!("{}", USAGE);
        return Ok(());
    }

    let mut config = config::load_or_default(args.config.as_deref())?;
    if let Some(path) = args.db_path {
        config.database.path = path;
    }

    let mut session = Session::open(config)?;
    let stdin = io::stdin();
    run_repl(&mut session, stdin.lock(), io::stdout())?;
    session.close()
}

fn main() {
    init_logging();
    info!("Starting sqldash...");

    if let Err(e) = run() {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}
