//! Command-line argument parsing.

use camino::Utf8PathBuf;
use clap::Parser;

/// Reactive template compiler - turns a template tree plus bindings into
/// initial HTML and a self-contained update script
#[derive(Parser, Debug, Clone)]
#[command(name = "reactive-tpl")]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Compile job file (JSON with `template` and optional `bindings`);
    /// `-` or absent reads stdin
    pub input: Option<Utf8PathBuf>,

    /// Write the result here instead of stdout
    #[arg(short, long)]
    pub output: Option<Utf8PathBuf>,

    /// Output format
    #[arg(long, default_value = "page")]
    pub format: OutputFormat,
}

/// What part of the compilation to emit.
#[derive(Debug, Clone, Copy, Default, clap::ValueEnum)]
pub enum OutputFormat {
    /// Initial HTML followed by the update script in a `<script>` tag
    #[default]
    Page,
    /// Initial HTML only
    Html,
    /// The update script only
    Script,
    /// JSON object with `html` and `script` fields
    Json,
}
