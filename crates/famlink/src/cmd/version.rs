use crate::cmd::VersionArgs;
use crate::exit::{CliResult, SUCCESS};

pub fn run(args: VersionArgs) -> CliResult<i32> {
    if !args.extended {
        println!("famlink {}", env!("CARGO_PKG_VERSION"));
        return Ok(SUCCESS);
    }

    println!("name: famlink");
    println!("version: {}", env!("CARGO_PKG_VERSION"));
    println!("target: {}", env!("FAMLINK_BUILD_TARGET"));
    println!("profile: {}", env!("FAMLINK_BUILD_PROFILE"));
    println!("target_os: {}", std::env::consts::OS);
    println!("target_arch: {}", std::env::consts::ARCH);
    println!("async: {}", cfg!(feature = "async"));
    println!(
        "families: {} (control), {} (demo)",
        famlink::peer::CONTROL_FAMILY_NAME,
        famlink::demo::DEMO_FAMILY_NAME
    );

    Ok(SUCCESS)
}
