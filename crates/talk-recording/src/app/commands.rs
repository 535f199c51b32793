use clap::Parser;
use clap::ValueHint;
use std::path::PathBuf;

pub const CONFIG_ENV: &str = "TALK_RECORDING_CONFIG";
const DEFAULT_CONFIG: &str = "server.toml";

const AFTER_HELP: &str = "\
ENVIRONMENT:
    TALK_RECORDING_CONFIG             Configuration file (same as --config)
    TALK_RECORDING_LISTEN             Overrides [http] listen
    TALK_RECORDING_MAX_MESSAGE_SIZE   Overrides [backend] maxmessagesize
    TALK_RECORDING_LOG                Append logs to this file
    TALK_RECORDING_LOG_FORMAT         text (default) or json
    TALK_RECORDING_LOG_STREAM         stderr (default) or stdout
    RUST_LOG                          Log filter, wins over [logs] level";

#[derive(Parser, Debug)]
#[command(name = "talk-recording")]
#[command(author, version)]
#[command(about = "Records calls on request of a call backend")]
#[command(after_help = AFTER_HELP)]
pub struct Cli {
    /// Configuration file
    #[arg(
        short,
        long,
        env = CONFIG_ENV,
        value_name = "PATH",
        value_hint = ValueHint::FilePath,
        default_value = DEFAULT_CONFIG
    )]
    pub config: PathBuf,

    /// Log at debug level unless RUST_LOG is set
    #[arg(short, long)]
    pub verbose: bool,
}
