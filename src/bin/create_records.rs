use std::error::Error;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use tracing::error;
use tracing_subscriber::EnvFilter;

use pairset::{IdentityExtractor, RegexIdentity, SuffixIdentity, pack_folders};

#[derive(Debug, Parser)]
#[command(
    name = "create-records",
    disable_help_subcommand = true,
    about = "Generate a paired-image record file from two folders of corresponding images",
    long_about = "Pair files from SOURCE and TARGET by the identity token in their names \
                  (basename_IDENTITY.ext) and pack the matched pairs into OUTPUT."
)]
struct CreateRecordsCli {
    #[arg(help = "Folder of source images")]
    source: PathBuf,
    #[arg(help = "Folder of target images")]
    target: PathBuf,
    #[arg(help = "Path of the record file to write")]
    output: PathBuf,
    #[arg(help = "Optional regex; only identities matching it are packed")]
    identity_filter: Option<String>,
    #[arg(
        long = "regex-identity",
        value_name = "PATTERN",
        help = "Extract identities with this regex instead of the underscore-suffix rule"
    )]
    regex_identity: Option<String>,
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    match run(CreateRecordsCli::parse()) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!(error = %err, "packaging failed");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: CreateRecordsCli) -> Result<(), Box<dyn Error>> {
    let extractor: Box<dyn IdentityExtractor> = match &cli.regex_identity {
        Some(pattern) => Box::new(RegexIdentity::new(pattern)?),
        None => Box::new(SuffixIdentity),
    };
    let filter = cli
        .identity_filter
        .as_deref()
        .map(regex::Regex::new)
        .transpose()?;
    let filter = filter.map(|pattern| move |identity: &str| pattern.is_match(identity));

    pack_folders(
        &cli.output,
        &cli.source,
        &cli.target,
        extractor.as_ref(),
        filter,
    )?;
    Ok(())
}
