//! bake cli interface

use clap::{Parser, Subcommand, ValueEnum};
use std::fmt::Formatter;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Change the work directory
    ///
    /// Can be specified multiple times. Note that all
    /// paths on the way to the final path must exist.
    ///
    /// This is equivalent to running { cd <directory>; bake ... }
    #[clap(short = 'C', long = "directory", global(true))]
    pub directory: Vec<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Print the resolved build definition
    ///
    /// Selects the named targets and groups, or group "default" when none are given.
    Print(PrintCommand),
}

#[derive(Parser, Debug)]
pub struct PrintCommand {
    #[clap(flatten)]
    pub input: InputArgs,

    #[clap(flatten)]
    pub output: OutputArgs,

    /// Targets or groups to print
    pub targets: Vec<String>,
}

#[derive(Parser, Debug)]
pub struct InputArgs {
    /// Load a file
    ///
    /// Can be specified multiple times; later files override earlier ones.
    /// Defaults to every existing file of docker-bake.json, docker-bake.override.json,
    /// docker-bake.hcl and docker-bake.override.hcl.
    #[clap(short = 'f', long = "file")]
    pub files: Vec<PathBuf>,

    /// Inject a built-in variable (NAME=VALUE)
    #[clap(long = "set", value_parser = parse_assignment)]
    pub set: Vec<(String, String)>,
}

fn parse_assignment(input: &str) -> Result<(String, String), String> {
    match input.split_once('=') {
        Some((name, value)) if !name.is_empty() => Ok((name.to_string(), value.to_string())),
        _ => Err(format!("expected NAME=VALUE, got {input:?}")),
    }
}

#[derive(Parser, Debug)]
pub struct OutputArgs {
    #[arg(short = 'F', long = "output-format", default_value_t)]
    pub format: OutputFormat,
}

#[derive(ValueEnum, Clone, Default, Debug)]
pub enum OutputFormat {
    #[default]
    Json,
    Yaml,
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            OutputFormat::Json => f.write_str("json"),
            OutputFormat::Yaml => f.write_str("yaml"),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn assignments() {
        assert_eq!(
            parse_assignment("TAG=v1=2"),
            Ok(("TAG".to_string(), "v1=2".to_string()))
        );
        assert_eq!(parse_assignment("EMPTY="), Ok(("EMPTY".to_string(), String::new())));
        assert!(parse_assignment("=x").is_err());
        assert!(parse_assignment("novalue").is_err());
    }

    #[test]
    fn print_arguments() {
        let cli = Cli::parse_from([
            "bake", "print", "-f", "a.hcl", "--set", "A=1", "-F", "yaml", "app",
        ]);
        let Command::Print(print) = cli.command;
        assert_eq!(print.input.files, vec![PathBuf::from("a.hcl")]);
        assert_eq!(print.input.set, vec![("A".to_string(), "1".to_string())]);
        assert!(matches!(print.output.format, OutputFormat::Yaml));
        assert_eq!(print.targets, vec!["app"]);
    }
}
