use famlink::demo::ops;

use crate::cmd::{connect, Globals, PingArgs};
use crate::exit::{peer_error, CliResult, SUCCESS};
use crate::output::{print_exchange, ExchangeOutput, OutputFormat};

pub fn run(args: PingArgs, globals: &Globals, format: OutputFormat) -> CliResult<i32> {
    let mut client = connect(globals)?;
    let sequence = client.next_sequence();
    let pong = ops::pingpong(&mut client, &args.message)
        .map_err(|err| peer_error("pingpong failed", err))?;

    print_exchange(
        &ExchangeOutput {
            command: "pingpong",
            family_id: client.family_id(),
            sequence,
            replies: vec![pong],
        },
        format,
    );
    Ok(SUCCESS)
}

pub fn run_random(args: PingArgs, globals: &Globals, format: OutputFormat) -> CliResult<i32> {
    let mut client = connect(globals)?;
    let sequence = client.next_sequence();
    let pongs = ops::pingpong_random(&mut client, &args.message)
        .map_err(|err| peer_error("pingpong-random failed", err))?;

    print_exchange(
        &ExchangeOutput {
            command: "pingpong-random",
            family_id: client.family_id(),
            sequence,
            replies: pongs,
        },
        format,
    );
    Ok(SUCCESS)
}
