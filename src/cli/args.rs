//! Command line argument parsing
//!
//! Subcommands:
//! - `build`: Build an image from a context directory
//! - `run`: Build a temporary image and run a command in a temporary container
//! - `show-config`: Show configuration discovery information

use crate::volume::VolumeBinding;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Debug)]
pub enum ExecutionMode {
    Build(BuildConfig),
    Run(RunConfig),
    ShowConfig,
}

/// Options shared by every engine-facing subcommand
#[derive(Debug, Clone, Default)]
pub struct ConnectionConfig {
    pub config_override: Option<PathBuf>,
    pub engine_opts: Vec<String>,
}

#[derive(Debug)]
pub struct BuildConfig {
    pub connection: ConnectionConfig,
    pub context: PathBuf,
    pub dockerfile: Option<String>,
    pub tag: Option<String>,
    pub keep: bool,
    pub no_cache: bool,
    pub build_args: Vec<(String, String)>,
    pub verbose: bool,
}

#[derive(Debug)]
pub struct RunConfig {
    pub connection: ConnectionConfig,
    pub context: PathBuf,
    pub dockerfile: Option<String>,
    pub volumes: Vec<VolumeBinding>,
    pub env: Vec<(String, String)>,
    pub cmd: Vec<String>,
    pub verbose: bool,
}

#[derive(Debug, Parser)]
#[command(name = "pier")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Build images and run throwaway containers on Docker or Podman")]
#[command(long_about = None)]
#[command(arg_required_else_help = true)]
pub struct Args {
    /// Configuration file path
    #[arg(short = 'c', long = "config", global = true)]
    pub config: Option<PathBuf>,
    /// Engine option as key=value (can be used multiple times)
    #[arg(short = 'o', long = "engine-opt", value_name = "KEY=VALUE", global = true)]
    pub engine_opts: Vec<String>,
    /// Enable verbose output
    #[arg(long = "verbose", global = true)]
    pub verbose: bool,
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Build an image from a context directory
    Build {
        /// Build context directory
        context: PathBuf,
        /// Dockerfile path, relative to the context
        #[arg(short = 'f', long = "file")]
        dockerfile: Option<String>,
        /// Image tag (a random one is generated when omitted)
        #[arg(short = 't', long = "tag")]
        tag: Option<String>,
        /// Keep the generated image after a successful build (an image
        /// named with --tag is always kept)
        #[arg(long = "keep")]
        keep: bool,
        /// Do not use the build cache
        #[arg(long = "no-cache")]
        no_cache: bool,
        /// Build-time variable (can be used multiple times)
        #[arg(long = "build-arg", value_name = "KEY=VALUE", value_parser = parse_key_val)]
        build_args: Vec<(String, String)>,
    },
    /// Build a temporary image and run a command in a temporary container
    Run {
        /// Build context directory
        context: PathBuf,
        /// Dockerfile path, relative to the context
        #[arg(short = 'f', long = "file")]
        dockerfile: Option<String>,
        /// Bind mount as host:mount[:ro] (can be used multiple times)
        #[arg(short = 'v', long = "volume", value_name = "HOST:MOUNT[:ro]")]
        volumes: Vec<VolumeBinding>,
        /// Environment variable (can be used multiple times)
        #[arg(short = 'e', long = "env", value_name = "KEY=VALUE", value_parser = parse_key_val)]
        env: Vec<(String, String)>,
        /// Command to run instead of the image default
        #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
        cmd: Vec<String>,
    },
    /// Show configuration discovery information
    ShowConfig,
}

impl Args {
    pub fn parse() -> Self {
        Parser::parse()
    }

    fn connection(&self) -> ConnectionConfig {
        ConnectionConfig {
            config_override: self.config.clone(),
            engine_opts: self.engine_opts.clone(),
        }
    }

    pub fn mode(&self) -> Result<ExecutionMode, String> {
        match &self.command {
            Some(Commands::Build {
                context,
                dockerfile,
                tag,
                keep,
                no_cache,
                build_args,
            }) => Ok(ExecutionMode::Build(BuildConfig {
                connection: self.connection(),
                context: context.clone(),
                dockerfile: dockerfile.clone(),
                tag: tag.clone(),
                keep: *keep,
                no_cache: *no_cache,
                build_args: build_args.clone(),
                verbose: self.verbose,
            })),
            Some(Commands::Run {
                context,
                dockerfile,
                volumes,
                env,
                cmd,
            }) => Ok(ExecutionMode::Run(RunConfig {
                connection: self.connection(),
                context: context.clone(),
                dockerfile: dockerfile.clone(),
                volumes: volumes.clone(),
                env: env.clone(),
                cmd: cmd.clone(),
                verbose: self.verbose,
            })),
            Some(Commands::ShowConfig) => Ok(ExecutionMode::ShowConfig),
            None => {
                Err("No command specified. Use 'pier --help' to see available commands.".to_string())
            }
        }
    }
}

fn parse_key_val(s: &str) -> Result<(String, String), String> {
    let (key, value) = s
        .split_once('=')
        .ok_or_else(|| format!("expected KEY=VALUE, got '{}'", s))?;
    if key.is_empty() {
        return Err(format!("empty key in '{}'", s));
    }
    Ok((key.to_string(), value.to_string()))
}
