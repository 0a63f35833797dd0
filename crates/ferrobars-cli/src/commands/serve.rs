use ferrobars_core::config::parse_bind_addr;
use ferrobars_core::AppConfig;

use crate::cli::ServeArgs;
use crate::error::CliError;

use super::open_warehouse;

pub async fn run(args: &ServeArgs, mut config: AppConfig) -> Result<(), CliError> {
    if let Some(bind) = &args.bind {
        config.bind_addr = parse_bind_addr("--bind", bind)?;
    }

    let warehouse = open_warehouse(&config)?;
    ferrobars_web::serve(&config, warehouse)
        .await
        .map_err(CliError::Server)
}
