use pier::cli::commands::{run_build, run_run};
use pier::cli::{Args, ConfigDiscovery, ExecutionMode};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // RUST_LOG wins over --verbose
    let default_filter = if args.verbose { "pier=debug" } else { "pier=info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)),
        )
        .with_writer(std::io::stderr)
        .init();

    let mode = match args.mode() {
        Ok(mode) => mode,
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(2);
        }
    };

    let code = match mode {
        ExecutionMode::Build(config) => {
            info!("Building image from {:?}", config.context);
            run_build(config).await
        }
        ExecutionMode::Run(config) => {
            info!("Running container from {:?}", config.context);
            run_run(config).await
        }
        ExecutionMode::ShowConfig => {
            ConfigDiscovery::show_discovery_info();
            Ok(0)
        }
    }?;

    if code != 0 {
        std::process::exit(code);
    }
    Ok(())
}
