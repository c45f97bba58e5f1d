//! `kdbx-attach`: attachment maintenance for decrypted KeePass XML files.

use std::io::{self, IsTerminal};
use std::path::{Path, PathBuf};

use anyhow::Result;
use clap::{ColorChoice, Parser};
use kdbx_cli::commands::{run_add, run_compact, run_extract, run_list, run_remove, run_rename};
use kdbx_cli::listing::{format_size, listing_lines, listing_table};
use kdbx_cli::logging::{LogConfig, LogFormat, init_logging};
use kdbx_xml::SaveOptions;
use tracing::level_filters::LevelFilter;

mod cli;

use crate::cli::{Cli, Command, LogFormatArg, LogLevelArg, WriteArgs};

fn main() {
    let cli = Cli::parse();
    cli.color.write_global();
    let log_config = log_config_from_cli(&cli);
    if let Err(error) = init_logging(&log_config) {
        eprintln!("error: failed to initialize logging: {error}");
        std::process::exit(1);
    }
    let exit_code = match run(cli.command) {
        Ok(()) => 0,
        Err(error) => {
            eprintln!("error: {error:#}");
            1
        }
    };
    std::process::exit(exit_code);
}

fn run(command: Command) -> Result<()> {
    match command {
        Command::List(args) => {
            let rows = run_list(&args.input)?;
            if args.plain {
                if !rows.is_empty() {
                    println!("{}", listing_lines(&rows));
                }
            } else {
                println!("{}", listing_table(&rows));
            }
        }
        Command::Extract(args) => {
            let output = args
                .output
                .unwrap_or_else(|| PathBuf::from(&args.name));
            let written = run_extract(&args.input, &args.entry, &args.name, &output)?;
            println!("Wrote {} ({})", output.display(), format_size(written));
        }
        Command::Add(args) => {
            let output = target(&args.input, &args.write);
            let index = run_add(
                &args.input,
                &args.entry,
                &args.source,
                args.name.as_deref(),
                output,
                &save_options(&args.write),
            )?;
            println!("Attached {} (pool entry {index})", args.source.display());
        }
        Command::Remove(args) => {
            let output = target(&args.input, &args.write);
            run_remove(
                &args.input,
                &args.entry,
                &args.name,
                output,
                &save_options(&args.write),
            )?;
            println!("Removed {}", args.name);
        }
        Command::Rename(args) => {
            let output = target(&args.input, &args.write);
            run_rename(
                &args.input,
                &args.entry,
                &args.name,
                &args.to,
                output,
                &save_options(&args.write),
            )?;
            println!("Renamed {} to {}", args.name, args.to);
        }
        Command::Compact(args) => {
            let output = target(&args.input, &args.write);
            let summary = run_compact(&args.input, output, &save_options(&args.write))?;
            println!(
                "Pool: {} -> {} payloads ({} unused dropped)",
                summary.payloads_before, summary.payloads_after, summary.orphans_removed
            );
        }
    }
    Ok(())
}

/// Output path for commands that rewrite the document.
fn target<'a>(input: &'a Path, write: &'a WriteArgs) -> &'a Path {
    write.output.as_deref().unwrap_or(input)
}

fn save_options(write: &WriteArgs) -> SaveOptions {
    SaveOptions::default().with_compression(!write.no_compress)
}

/// Build logging configuration from CLI flags with consistent precedence.
fn log_config_from_cli(cli: &Cli) -> LogConfig {
    let mut config = LogConfig {
        level_filter: cli.verbosity.tracing_level_filter(),
        ..LogConfig::default()
    };
    config.use_env_filter = !(cli.verbosity.is_present() || cli.log_level.is_some());
    if let Some(level) = cli.log_level {
        config.level_filter = match level {
            LogLevelArg::Error => LevelFilter::ERROR,
            LogLevelArg::Warn => LevelFilter::WARN,
            LogLevelArg::Info => LevelFilter::INFO,
            LogLevelArg::Debug => LevelFilter::DEBUG,
            LogLevelArg::Trace => LevelFilter::TRACE,
        };
    }
    config.format = match cli.log_format {
        LogFormatArg::Pretty => LogFormat::Pretty,
        LogFormatArg::Compact => LogFormat::Compact,
        LogFormatArg::Json => LogFormat::Json,
    };
    config.log_file = cli.log_file.clone();
    config.with_ansi = match cli.color.color {
        ColorChoice::Always => true,
        ColorChoice::Never => false,
        ColorChoice::Auto => cli.log_file.is_none() && io::stderr().is_terminal(),
    };
    config
}
