mod cli;

use anyhow::Context;
use bake::context::Git;
use bake::documents::Documents;
use bake::{Document, Options};
use std::path::PathBuf;

/// Probed in order when no file is given
const DEFAULT_FILES: [&str; 4] = [
    "docker-bake.json",
    "docker-bake.override.json",
    "docker-bake.hcl",
    "docker-bake.override.hcl",
];

fn main() {
    use clap::Parser;
    let cli = cli::Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_env("BAKE_LOG"))
        .with_writer(std::io::stderr)
        .init();

    for new_path in cli.directory.iter() {
        match new_path.canonicalize() {
            Err(e) => {
                eprintln!(
                    "Failed to resolve path for -C/--directory {}\n{}",
                    new_path.display(),
                    e
                );
                std::process::exit(1);
            }
            Ok(cwd) => {
                if let Err(err) = std::env::set_current_dir(&cwd) {
                    eprintln!("Failed to set work directory to {}\n{}", cwd.display(), err,);
                    std::process::exit(1);
                }

                tracing::info!(directory=%cwd.display(), "Changed working directory");
            }
        }
    }

    let command_result = match cli.command {
        cli::Command::Print(print_cli) => print(print_cli),
    };

    if let Err(e) = command_result {
        for error in e.chain() {
            eprintln!("{error}")
        }
        std::process::exit(1);
    }
}

pub fn print(cli: cli::PrintCommand) -> anyhow::Result<()> {
    let documents = load(&cli.input)?;

    let mut options = Options::default()
        .with_builtin("BAKE_CMD_CONTEXT", ".")
        .with_builtin("BAKE_LOCAL_PLATFORM", local_platform())
        .with_version_control(Git {
            dir: Some(std::env::current_dir()?),
        });
    for (name, value) in &cli.input.set {
        options = options.with_builtin(name, value);
    }

    let document = bake::resolve(&documents, &options)?;
    let names: Vec<&str> = cli.targets.iter().map(String::as_str).collect();
    let document = document.select(&names)?;

    output(&cli.output, &document)?;
    Ok(())
}

fn load(input: &cli::InputArgs) -> anyhow::Result<Documents> {
    let files: Vec<PathBuf> = if input.files.is_empty() {
        DEFAULT_FILES
            .iter()
            .map(PathBuf::from)
            .filter(|path| path.is_file())
            .collect()
    } else {
        input.files.clone()
    };

    let mut documents = Documents::default();
    for file_path in &files {
        documents
            .load_path(file_path)
            .with_context(|| format!("Failed to load {}", file_path.display()))?;
    }

    anyhow::ensure!(documents.source_count() > 0, "No files loaded");

    Ok(documents)
}

/// `os/arch` of the host in OCI platform notation
fn local_platform() -> String {
    let arch = match std::env::consts::ARCH {
        "x86_64" => "amd64",
        "aarch64" => "arm64",
        "x86" => "386",
        "powerpc64" => "ppc64le",
        other => other,
    };
    format!("{}/{}", std::env::consts::OS, arch)
}

fn output(output: &cli::OutputArgs, document: &Document) -> anyhow::Result<()> {
    match output.format {
        cli::OutputFormat::Yaml => serde_yaml::to_writer(std::io::stdout(), document)?,
        cli::OutputFormat::Json => {
            serde_json::to_writer_pretty(std::io::stdout(), document)?;
            println!();
        }
    };

    Ok(())
}
