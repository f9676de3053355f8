use famlink::demo::ops::send_hello;

use crate::cmd::{connect, Globals, HelloArgs};
use crate::exit::{peer_error, CliResult, SUCCESS};
use crate::output::{print_exchange, ExchangeOutput, OutputFormat};

pub fn run(args: HelloArgs, globals: &Globals, format: OutputFormat) -> CliResult<i32> {
    let mut client = connect(globals)?;
    let sequence =
        send_hello(&mut client, &args.message).map_err(|err| peer_error("hello failed", err))?;

    print_exchange(
        &ExchangeOutput {
            command: "hello",
            family_id: client.family_id(),
            sequence,
            replies: Vec::new(),
        },
        format,
    );
    Ok(SUCCESS)
}
