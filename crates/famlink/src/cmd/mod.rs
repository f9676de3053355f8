use std::path::PathBuf;
use std::time::Duration;

use clap::{Args, Subcommand};
use famlink::demo::ops::{HELLO_TEXT, PING_TEXT};
use famlink::peer::{Client, ClientConfig};
use famlink::transport::BusEndpoint;

use crate::exit::{peer_error, CliError, CliResult, USAGE};
use crate::output::OutputFormat;

pub mod hello;
pub mod pingpong;
pub mod serve;
pub mod structured;
pub mod version;

/// Options shared by every subcommand.
#[derive(Debug, Clone)]
pub struct Globals {
    pub socket: PathBuf,
    pub timeout: String,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run the service until interrupted.
    Serve(ServeArgs),
    /// Send a greeting; the service does not answer.
    #[command(alias = "h")]
    Hello(HelloArgs),
    /// Send a ping and print the pong.
    #[command(alias = "p")]
    Pingpong(PingArgs),
    /// Send a ping and print the streamed pongs.
    #[command(name = "pingpong-random", alias = "r")]
    PingpongRandom(PingArgs),
    /// Exchange structured payloads with the service.
    #[command(alias = "s")]
    Struct(StructArgs),
    /// Show version information.
    Version(VersionArgs),
}

pub fn run(command: Command, globals: &Globals, format: OutputFormat) -> CliResult<i32> {
    match command {
        Command::Serve(args) => serve::run(args, globals, format),
        Command::Hello(args) => hello::run(args, globals, format),
        Command::Pingpong(args) => pingpong::run(args, globals, format),
        Command::PingpongRandom(args) => pingpong::run_random(args, globals, format),
        Command::Struct(args) => structured::run(args, globals, format),
        Command::Version(args) => version::run(args),
    }
}

#[derive(Args, Debug)]
pub struct ServeArgs {
    /// Always stream this many extra pongs instead of a random count.
    #[arg(long, value_name = "N")]
    pub extra_parts: Option<usize>,
}

#[derive(Args, Debug)]
pub struct HelloArgs {
    /// Greeting text.
    #[arg(long, short = 'm', default_value = HELLO_TEXT)]
    pub message: String,
}

#[derive(Args, Debug)]
pub struct PingArgs {
    /// Ping text.
    #[arg(long, short = 'm', default_value = PING_TEXT)]
    pub message: String,
}

#[derive(Args, Debug)]
pub struct StructArgs {
    /// Name carried in the payload.
    #[arg(long)]
    pub name: Option<String>,
    /// IPv4 address carried in the payload.
    #[arg(long)]
    pub ipv4: Option<String>,
    /// IPv6 address carried in the payload.
    #[arg(long)]
    pub ipv6: Option<String>,
}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Show extended build provenance.
    #[arg(long)]
    pub extended: bool,
}

/// Connect a demo client using the global socket and timeout.
pub(crate) fn connect(globals: &Globals) -> CliResult<Client<BusEndpoint>> {
    let timeout = parse_duration(&globals.timeout)?;
    let config = ClientConfig {
        resolve_timeout: timeout,
        recv_timeout: Some(timeout),
        ..ClientConfig::default()
    };
    famlink::demo::ops::connect(&globals.socket, config)
        .map_err(|err| peer_error("connect failed", err))
}

pub(crate) fn parse_duration(input: &str) -> CliResult<Duration> {
    let input = input.trim();
    if input.is_empty() {
        return Err(CliError::new(USAGE, "duration must not be empty"));
    }

    let (number, millis) = if let Some(num) = input.strip_suffix("ms") {
        (num, true)
    } else if let Some(num) = input.strip_suffix('s') {
        (num, false)
    } else {
        (input, false)
    };

    let value: u64 = number
        .parse()
        .map_err(|_| CliError::new(USAGE, format!("invalid duration value: {input}")))?;
    if value == 0 {
        return Err(CliError::new(USAGE, "duration must be greater than zero"));
    }

    Ok(if millis {
        Duration::from_millis(value)
    } else {
        Duration::from_secs(value)
    })
}
