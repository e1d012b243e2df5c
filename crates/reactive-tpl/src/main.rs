//! reactive-tpl - compile reactive templates to HTML plus update script.

use std::fs;
use std::io::Read;
use std::process::ExitCode;

use clap::Parser;
use miette::{IntoDiagnostic, Result, WrapErr};
use serde::Deserialize;

use reactive_compiler::{compile_template, Bindings, TemplateNode};

mod cli;
mod output;

use cli::Args;

/// The JSON document the CLI consumes: the template tree plus the host
/// values its expressions may reference.
#[derive(Debug, Deserialize)]
struct CompileJob {
    #[serde(default)]
    bindings: Bindings,
    template: Vec<TemplateNode>,
}

fn main() -> ExitCode {
    let args = Args::parse();

    miette::set_hook(Box::new(|_| {
        Box::new(
            miette::MietteHandlerOpts::new()
                .terminal_links(true)
                .unicode(true)
                .context_lines(2)
                .build(),
        )
    }))
    .ok();

    match run(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{:?}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(args: Args) -> Result<()> {
    let source = read_input(&args)?;
    let job: CompileJob = serde_json::from_str(&source)
        .into_diagnostic()
        .wrap_err("failed to parse the compile job")?;

    let compiled = compile_template(&job.template, &job.bindings).into_diagnostic()?;
    let rendered = output::render(&compiled, args.format);

    match &args.output {
        Some(path) => fs::write(path, rendered)
            .into_diagnostic()
            .wrap_err_with(|| format!("failed to write `{path}`"))?,
        None => println!("{rendered}"),
    }
    Ok(())
}

fn read_input(args: &Args) -> Result<String> {
    match &args.input {
        Some(path) if path != "-" => fs::read_to_string(path)
            .into_diagnostic()
            .wrap_err_with(|| format!("failed to read `{path}`")),
        _ => {
            let mut source = String::new();
            std::io::stdin()
                .read_to_string(&mut source)
                .into_diagnostic()
                .wrap_err("failed to read stdin")?;
            Ok(source)
        }
    }
}
