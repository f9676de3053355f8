use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use famlink::demo::{build_dispatcher, register_demo, CountSource, FixedCount, RandomCount};
use famlink::peer::Service;
use famlink::schema::{FamilyRegistry, RegistryBuilder};
use famlink::transport::BusSocket;
use tracing::info;

use crate::cmd::{Globals, ServeArgs};
use crate::exit::{
    peer_error, schema_error, transport_error, CliError, CliResult, INTERNAL, SUCCESS,
};
use crate::output::{print_families, OutputFormat};

pub fn run(args: ServeArgs, globals: &Globals, format: OutputFormat) -> CliResult<i32> {
    let registry = Arc::new(load_registry()?);
    let counts: Arc<dyn CountSource> = match args.extra_parts {
        Some(extra) => Arc::new(FixedCount(extra)),
        None => Arc::new(RandomCount),
    };

    let mut service = Service::new(Arc::clone(&registry))
        .map_err(|err| peer_error("service setup failed", err))?;
    let dispatcher = build_dispatcher(&registry, counts)
        .map_err(|err| peer_error("service setup failed", err))?;
    service
        .register(dispatcher)
        .map_err(|err| peer_error("service setup failed", err))?;

    let socket =
        BusSocket::bind(&globals.socket).map_err(|err| transport_error("bind failed", err))?;
    print_families(&registry, format);

    let running = Arc::new(AtomicBool::new(true));
    install_ctrlc_handler(running.clone())?;
    info!(path = %globals.socket.display(), families = registry.len(), "serving");

    service
        .serve(&socket, &running)
        .map_err(|err| peer_error("service failed", err))?;
    Ok(SUCCESS)
}

fn load_registry() -> CliResult<FamilyRegistry> {
    let mut builder = RegistryBuilder::new();
    register_demo(&mut builder).map_err(|err| schema_error("demo family", err))?;
    Ok(builder.build())
}

fn install_ctrlc_handler(running: Arc<AtomicBool>) -> CliResult<()> {
    ctrlc::set_handler(move || {
        running.store(false, Ordering::SeqCst);
    })
    .map_err(|err| CliError::new(INTERNAL, format!("signal handler setup failed: {err}")))
}
