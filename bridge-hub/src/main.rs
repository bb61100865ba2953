use clap::Parser as _;
use eyre::{Context as _, Result};

use bridge_hub::{Cli, ManagerFacade, RoleSet, RunConfig};

fn main() -> Result<()> {
    color_eyre::install()?;
    let cli = Cli::parse();

    let mut cfg =
        RunConfig::load(&cli.config).wrap_err("loading run configuration")?;
    if let Some(direction) = cli.direction {
        cfg.direction = direction;
    }

    let direction_label = match cfg.direction {
        bridge_hub::Direction::NestToTvb => "nest-to-tvb",
        bridge_hub::Direction::TvbToNest => "tvb-to-nest",
    };
    let flusher = bridge_telemetry::init(cli.rank as u32, direction_label);

    let roles = RoleSet::new(cli.world_size, cli.recv_rank, cli.send_rank)
        .wrap_err("partitioning ranks into roles")?;

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .wrap_err("building tokio runtime")?;

    let facade = ManagerFacade::new(cfg, roles, cli.rank);
    let result = runtime.block_on(facade.start());

    flusher.flush();

    match result {
        Ok(()) => Ok(()),
        Err(err) => {
            tracing::error!(%err, "bridge run ended with an error");
            std::process::exit(err.exit_code());
        }
    }
}
