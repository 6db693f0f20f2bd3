// FILE: src/cli/mod.rs

mod config;
mod handlers;

pub use config::ConfigFile;

use crate::error::{CompilerError, Result};
use crate::CompilerOptions;
use clap::{Arg, ArgAction, Command, ValueEnum};
use std::path::PathBuf;
use std::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

pub struct EnhancedCli {
    config: ConfigFile,
    start_time: Instant,
}

impl Default for EnhancedCli {
    fn default() -> Self {
        Self::new()
    }
}

impl EnhancedCli {
    pub fn new() -> Self {
        Self {
            config: ConfigFile::default(),
            start_time: Instant::now(),
        }
    }

    pub fn run(&mut self) -> Result<()> {
        self.start_time = Instant::now();
        let matches = self.build_cli().get_matches();
        self.configure(&matches)?;

        match matches.subcommand() {
            Some(("check", sub_matches)) => handlers::handle_check_command(self, sub_matches),
            Some(("list", sub_matches)) => handlers::handle_list_command(self, sub_matches),
            Some(("render", sub_matches)) => handlers::handle_render_command(self, sub_matches),
            Some(("deps", sub_matches)) => handlers::handle_deps_command(self, sub_matches),
            _ => {
                println!("No subcommand specified. Use --help for usage information.");
                Ok(())
            }
        }
    }

    fn build_cli(&self) -> Command {
        Command::new(crate::NAME)
            .version(crate::VERSION)
            .about(crate::DESCRIPTION)
            .arg(
                Arg::new("config")
                    .short('c')
                    .long("config")
                    .value_name("FILE")
                    .help("Configuration file path (.toml or .json)")
                    .global(true)
                    .action(ArgAction::Set),
            )
            .arg(
                Arg::new("verbose")
                    .short('v')
                    .long("verbose")
                    .help("Increase verbosity (can be used multiple times)")
                    .global(true)
                    .action(ArgAction::Count),
            )
            .subcommand(
                source_args(false, Command::new("check").about("Compile a component directory and report statistics"))
                    .arg(Arg::new("format").short('f').long("format").value_parser(clap::value_parser!(OutputFormat)).default_value("text").help("Statistics output format")),
            )
            .subcommand(
                source_args(false, Command::new("list").about("List every template name in the compiled registry"))
                    .arg(Arg::new("pages").long("pages").help("Only list page roots").action(ArgAction::SetTrue)),
            )
            .subcommand(
                source_args(true, Command::new("render").about("Render a page to stdout or a file"))
                    .arg(Arg::new("page").help("Page or template name, e.g. ./home").required(true).index(2))
                    .arg(Arg::new("data").short('d').long("data").value_name("FILE").help("JSON file used as the render data"))
                    .arg(Arg::new("output").short('o').long("output").value_name("FILE").help("Write the output to a file")),
            )
            .subcommand(
                source_args(true, Command::new("deps").about("Show the ordered components a page includes"))
                    .arg(Arg::new("page").help("Page name, e.g. ./home").required(true).index(2))
                    .arg(Arg::new("format").short('f').long("format").value_parser(clap::value_parser!(OutputFormat)).default_value("text").help("Output format")),
            )
    }

    /// Logging comes up first so loading the config file can already log.
    fn configure(&mut self, matches: &clap::ArgMatches) -> Result<()> {
        self.setup_logging(matches.get_count("verbose"))?;
        if let Some(config_path) = matches.get_one::<String>("config") {
            self.config = config::load(config_path)?;
        }
        Ok(())
    }

    fn setup_logging(&self, verbose_count: u8) -> Result<()> {
        let log_level = match verbose_count {
            0 => log::LevelFilter::Warn,
            1 => log::LevelFilter::Info,
            2 => log::LevelFilter::Debug,
            _ => log::LevelFilter::Trace,
        };
        env_logger::Builder::from_default_env()
            .filter_level(log_level)
            .format_timestamp_secs()
            .try_init()
            .map_err(|e| CompilerError::InvalidFormat {
                message: format!("Logger already initialised: {}", e),
            })
    }

    pub fn build_compiler_options(&self, matches: &clap::ArgMatches) -> Result<CompilerOptions> {
        let mut options = CompilerOptions::default();
        if let Some(extension) = matches
            .get_one::<String>("extension")
            .or(self.config.extension.as_ref())
        {
            let extension = extension.trim_start_matches('.');
            if extension.is_empty() || extension.contains('/') {
                return Err(CompilerError::InvalidFormat {
                    message: format!("Invalid component extension: {:?}", extension),
                });
            }
            options.extension = extension.to_string();
        }
        options.debug_mode = matches.get_flag("debug");
        Ok(options)
    }

    /// Component directory from the command line, falling back to the
    /// configuration file.
    pub fn source_dir(&self, matches: &clap::ArgMatches) -> Result<PathBuf> {
        matches
            .get_one::<String>("dir")
            .or(self.config.root.as_ref())
            .map(PathBuf::from)
            .ok_or_else(|| CompilerError::InvalidFormat {
                message: "No component directory given on the command line or in the config file"
                    .to_string(),
            })
    }

    /// Render data file from the command line, falling back to the
    /// configuration file.
    pub fn data_file(&self, matches: &clap::ArgMatches) -> Option<PathBuf> {
        matches
            .get_one::<String>("data")
            .or(self.config.data.as_ref())
            .map(PathBuf::from)
    }

    pub fn elapsed_ms(&self) -> u128 {
        self.start_time.elapsed().as_millis()
    }
}

/// Arguments shared by every subcommand that compiles a directory. The
/// directory may only be left to the config file when no positional
/// argument follows it.
fn source_args(dir_required: bool, command: Command) -> Command {
    command
        .arg(Arg::new("dir").help("Component directory").required(dir_required).index(1))
        .arg(Arg::new("extension").short('e').long("extension").value_name("EXT").help("Component file extension (default: tmpl)"))
        .arg(Arg::new("debug").long("debug").help("Enable per-phase debug logging").action(ArgAction::SetTrue))
}
