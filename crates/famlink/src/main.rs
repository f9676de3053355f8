mod cmd;
mod exit;
mod logging;
mod output;

use clap::Parser;

use crate::cmd::{Command, Globals};
use crate::logging::{init_logging, LogFormat, LogLevel};
use crate::output::OutputFormat;

#[derive(Parser, Debug)]
#[command(name = "famlink", version, about = "Family-based request/reply messaging")]
struct Cli {
    /// Service socket path.
    #[arg(
        long,
        env = "FAMLINK_SOCKET",
        default_value = "/tmp/famlink.sock",
        global = true
    )]
    socket: std::path::PathBuf,

    /// Resolution and reply timeout (e.g. 5s, 500ms).
    #[arg(long, default_value = "5s", global = true)]
    timeout: String,

    /// Output format.
    #[arg(long, value_name = "FORMAT", global = true)]
    format: Option<OutputFormat>,

    /// Log output format (stderr).
    #[arg(long, value_name = "FORMAT", default_value = "text", global = true)]
    log_format: LogFormat,

    /// Log level for famlink crates (stderr). FAMLINK_LOG overrides the filter.
    #[arg(
        long,
        value_name = "LEVEL",
        env = "FAMLINK_LOG_LEVEL",
        default_value = "info",
        global = true
    )]
    log_level: LogLevel,

    #[command(subcommand)]
    command: Command,
}

fn main() {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) => {
            let code = if err.use_stderr() {
                exit::USAGE
            } else {
                exit::SUCCESS
            };
            let _ = err.print();
            std::process::exit(code);
        }
    };
    init_logging(cli.log_format, cli.log_level);

    let format = cli.format.unwrap_or_else(OutputFormat::default_for_stdout);
    let globals = Globals {
        socket: cli.socket,
        timeout: cli.timeout,
    };
    let result = cmd::run(cli.command, &globals, format);

    match result {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("error: {err}");
            std::process::exit(err.code);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_selectors_and_aliases() {
        for (args, expected) in [
            (vec!["famlink", "hello"], "hello"),
            (vec!["famlink", "h"], "hello"),
            (vec!["famlink", "p"], "pingpong"),
            (vec!["famlink", "pingpong-random"], "pingpong-random"),
            (vec!["famlink", "r"], "pingpong-random"),
            (vec!["famlink", "s"], "struct"),
        ] {
            let cli = Cli::try_parse_from(args).expect("selector should parse");
            let name = match cli.command {
                Command::Hello(_) => "hello",
                Command::Pingpong(_) => "pingpong",
                Command::PingpongRandom(_) => "pingpong-random",
                Command::Struct(_) => "struct",
                _ => "other",
            };
            assert_eq!(name, expected);
        }
    }

    #[test]
    fn missing_selector_is_usage_error() {
        let err = Cli::try_parse_from(["famlink"]).expect_err("selector is required");
        assert!(err.use_stderr());
    }

    #[test]
    fn unknown_selector_is_rejected() {
        let err = Cli::try_parse_from(["famlink", "x"]).expect_err("unknown selector");
        assert_eq!(err.kind(), clap::error::ErrorKind::InvalidSubcommand);
    }

    #[test]
    fn one_selector_per_invocation() {
        assert!(Cli::try_parse_from(["famlink", "hello", "pingpong"]).is_err());
    }

    #[test]
    fn parses_serve_with_socket() {
        let cli = Cli::try_parse_from([
            "famlink",
            "serve",
            "--extra-parts",
            "2",
            "--socket",
            "/tmp/test.sock",
        ])
        .expect("serve args should parse");
        assert!(matches!(cli.command, Command::Serve(_)));
        assert_eq!(cli.socket, std::path::PathBuf::from("/tmp/test.sock"));
    }

    #[test]
    fn log_flags_are_global() {
        let cli = Cli::try_parse_from([
            "famlink",
            "hello",
            "--log-level",
            "trace",
            "--log-format",
            "json",
        ])
        .expect("log flags should parse after the selector");
        assert_eq!(cli.log_level, LogLevel::Trace);
        assert_eq!(cli.log_format, LogFormat::Json);
    }

    #[test]
    fn global_timeout_after_selector() {
        let cli = Cli::try_parse_from(["famlink", "p", "--timeout", "500ms"])
            .expect("timeout should parse");
        assert_eq!(cli.timeout, "500ms");
    }
}
