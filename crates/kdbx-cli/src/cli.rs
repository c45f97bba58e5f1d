//! CLI argument definitions for `kdbx-attach`.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};
use clap_verbosity_flag::{Verbosity, WarnLevel};
use colorchoice_clap::Color;

#[derive(Parser)]
#[command(
    name = "kdbx-attach",
    version,
    about = "Inspect and edit attachments in decrypted KeePass XML files",
    long_about = "Inspect and edit entry attachments in a decrypted KeePass XML file.\n\n\
                  Attachments are stored once in the document's binary pool and shared\n\
                  by every entry that references them. Writing a file drops unused\n\
                  payloads and renumbers the pool."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Adjust log verbosity (-v for info, -vv for debug, -q for errors only).
    #[command(flatten)]
    pub verbosity: Verbosity<WarnLevel>,

    /// Control ANSI color output (auto, always, never).
    #[command(flatten)]
    pub color: Color,

    /// Explicit log level (overrides -v/-q flags).
    #[arg(long = "log-level", value_enum, global = true)]
    pub log_level: Option<LogLevelArg>,

    /// Log output format (pretty for human, json for machine parsing).
    #[arg(
        long = "log-format",
        value_enum,
        default_value = "pretty",
        global = true
    )]
    pub log_format: LogFormatArg,

    /// Write logs to a file instead of stderr.
    #[arg(long = "log-file", value_name = "PATH", global = true)]
    pub log_file: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Command {
    /// List every attachment with its pool index, size and fingerprint.
    List(ListArgs),

    /// Write one attachment's bytes to a file.
    Extract(ExtractArgs),

    /// Attach a file to an entry.
    Add(AddArgs),

    /// Detach a file from an entry.
    Remove(RemoveArgs),

    /// Rename an attachment.
    Rename(RenameArgs),

    /// Drop unused payloads and renumber the pool.
    Compact(CompactArgs),
}

#[derive(Args)]
pub struct ListArgs {
    /// KeePass XML file.
    #[arg(value_name = "FILE")]
    pub input: PathBuf,

    /// Print tab-separated lines instead of a table.
    #[arg(long = "plain")]
    pub plain: bool,
}

#[derive(Args)]
pub struct ExtractArgs {
    #[arg(value_name = "FILE")]
    pub input: PathBuf,

    /// Entry UUID or path (Root/Group/Title).
    #[arg(long = "entry", value_name = "ENTRY")]
    pub entry: String,

    /// Attachment name.
    #[arg(long = "name", value_name = "NAME")]
    pub name: String,

    /// Destination (default: the attachment name in the current directory).
    #[arg(long = "output", short = 'o', value_name = "PATH")]
    pub output: Option<PathBuf>,
}

/// Options shared by every command that writes the document back.
#[derive(Args)]
pub struct WriteArgs {
    /// Write the result here instead of replacing FILE.
    #[arg(long = "output", short = 'o', value_name = "PATH")]
    pub output: Option<PathBuf>,

    /// Store pool payloads without gzip.
    #[arg(long = "no-compress")]
    pub no_compress: bool,
}

#[derive(Args)]
pub struct AddArgs {
    #[arg(value_name = "FILE")]
    pub input: PathBuf,

    /// Entry UUID or path (Root/Group/Title).
    #[arg(long = "entry", value_name = "ENTRY")]
    pub entry: String,

    /// File whose contents are attached.
    #[arg(long = "from", value_name = "PATH")]
    pub source: PathBuf,

    /// Attachment name (default: the source file name).
    #[arg(long = "name", value_name = "NAME")]
    pub name: Option<String>,

    #[command(flatten)]
    pub write: WriteArgs,
}

#[derive(Args)]
pub struct RemoveArgs {
    #[arg(value_name = "FILE")]
    pub input: PathBuf,

    /// Entry UUID or path (Root/Group/Title).
    #[arg(long = "entry", value_name = "ENTRY")]
    pub entry: String,

    /// Attachment name.
    #[arg(long = "name", value_name = "NAME")]
    pub name: String,

    #[command(flatten)]
    pub write: WriteArgs,
}

#[derive(Args)]
pub struct RenameArgs {
    #[arg(value_name = "FILE")]
    pub input: PathBuf,

    /// Entry UUID or path (Root/Group/Title).
    #[arg(long = "entry", value_name = "ENTRY")]
    pub entry: String,

    /// Current attachment name.
    #[arg(long = "name", value_name = "NAME")]
    pub name: String,

    /// New attachment name.
    #[arg(long = "to", value_name = "NAME")]
    pub to: String,

    #[command(flatten)]
    pub write: WriteArgs,
}

#[derive(Args)]
pub struct CompactArgs {
    #[arg(value_name = "FILE")]
    pub input: PathBuf,

    #[command(flatten)]
    pub write: WriteArgs,
}

/// CLI log level choices.
#[derive(Clone, Copy, ValueEnum)]
pub enum LogLevelArg {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

/// CLI log format choices.
#[derive(Clone, Copy, ValueEnum)]
pub enum LogFormatArg {
    Pretty,
    Compact,
    Json,
}
