use famlink::demo::ops::{client_payload, request_struct};
use famlink::demo::StructuredPayload;

use crate::cmd::{connect, Globals, StructArgs};
use crate::exit::{payload_error, peer_error, CliResult, SUCCESS};
use crate::output::{print_payload, OutputFormat};

pub fn run(args: StructArgs, globals: &Globals, format: OutputFormat) -> CliResult<i32> {
    let payload = build_payload(&args)?;
    let mut client = connect(globals)?;
    let answer =
        request_struct(&mut client, &payload).map_err(|err| peer_error("struct failed", err))?;

    print_payload(&answer, format);
    Ok(SUCCESS)
}

/// The client's payload with any fields given on the command line replaced.
fn build_payload(args: &StructArgs) -> CliResult<StructuredPayload> {
    let base = client_payload();
    if args.name.is_none() && args.ipv4.is_none() && args.ipv6.is_none() {
        return Ok(base);
    }

    let ipv4 = args.ipv4.clone().unwrap_or_else(|| base.ipv4.to_string());
    let ipv6 = args.ipv6.clone().unwrap_or_else(|| base.ipv6.to_string());
    let name = args.name.as_deref().unwrap_or(base.name());
    StructuredPayload::from_text(base.pid, base.timestamp, name, &ipv4, &ipv6)
        .map_err(|err| payload_error("invalid payload", err))
}
