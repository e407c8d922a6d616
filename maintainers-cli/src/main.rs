use std::{
    fs,
    io::{self, Read},
    path::{Path, PathBuf},
    process::ExitCode,
};

use anyhow::{bail, Context, Result};
use clap::{ArgAction, Args, Parser, Subcommand};
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

use maintainers_rs::{
    filter_by_ownership, owners_from_path, ownership_from_path, parser, resolve_reviewers, Error,
    Identity, Maintainer,
};

#[derive(Parser)]
#[command(version, about = "Work out who maintains which parts of a repository")]
struct Cli {
    /// Repository root to scan for MAINTAINERS files
    #[arg(long, default_value = ".", global = true)]
    root: PathBuf,

    /// More logging on stderr (-v for debug, -vv for trace)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Print the directories the acting user may act on
    Owned(IdentityArgs),
    /// Print the maintainers of every file a patch touches
    Reviewers {
        /// Patch file, stdin when omitted or `-`
        patch: Option<PathBuf>,
    },
    /// Validate every MAINTAINERS file in the tree
    Check,
    /// Print the changes that touch a directory the acting user owns
    Filter {
        #[command(flatten)]
        identity: IdentityArgs,

        /// One change per line: an id followed by the paths it touches.
        /// Stdin when omitted or `-`
        changes: Option<PathBuf>,
    },
}

#[derive(Args)]
struct IdentityArgs {
    #[arg(long, env = "MAINTAINERS_EMAIL")]
    email: Option<String>,

    #[arg(long, env = "MAINTAINERS_HANDLE")]
    handle: Option<String>,
}

impl IdentityArgs {
    fn identity(&self) -> Result<Identity> {
        let identity = Identity::new(
            self.email.clone().unwrap_or_default(),
            self.handle.clone().unwrap_or_default(),
        );
        if identity.email.is_none() && identity.handle.is_none() {
            bail!("no acting identity: pass --email or --handle (or set MAINTAINERS_EMAIL / MAINTAINERS_HANDLE)");
        }
        Ok(identity)
    }
}

fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match &cli.command {
        Command::Owned(identity) => owned(&cli.root, &identity.identity()?),
        Command::Reviewers { patch } => reviewers(&cli.root, patch.as_deref()),
        Command::Check => check(&cli.root),
        Command::Filter { identity, changes } => {
            filter(&cli.root, &identity.identity()?, changes.as_deref())
        }
    }
}

fn init_tracing(verbosity: u8) {
    let default_level = match verbosity {
        0 => "warn",
        1 => "debug",
        _ => "trace",
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

fn owned(root: &Path, identity: &Identity) -> Result<ExitCode> {
    let owned = ownership_from_path(root, identity)
        .with_context(|| format!("failed to resolve ownership under {}", root.display()))?;
    info!(dirs = owned.len(), "resolved ownership");
    for dir in owned.iter() {
        println!("{}", dir);
    }
    Ok(ExitCode::SUCCESS)
}

fn reviewers(root: &Path, patch_path: Option<&Path>) -> Result<ExitCode> {
    let owners = owners_from_path(root)
        .with_context(|| format!("failed to read maintainers under {}", root.display()))?;
    let patch = read_input(patch_path)?;
    let reviewers = resolve_reviewers(&patch, &owners)?;

    let mut paths = reviewers.keys().collect::<Vec<_>>();
    paths.sort();
    for path in paths {
        let maintainers = reviewers[path];
        if maintainers.is_empty() {
            println!("{:<70}  (unowned)", path);
        } else {
            let labels = maintainers.iter().map(label).collect::<Vec<_>>();
            println!("{:<70}  {}", path, labels.join(" "));
        }
    }
    Ok(ExitCode::SUCCESS)
}

fn check(root: &Path) -> Result<ExitCode> {
    let mut checked = 0;
    let mut invalid = 0;
    for entry in walk_files(root) {
        let entry = entry.with_context(|| format!("failed to walk {}", root.display()))?;
        if !parser::is_declaration_file(&entry.file_name().to_string_lossy()) {
            continue;
        }
        checked += 1;
        match parser::parse_file(entry.path()) {
            Ok(records) => debug!(path = %entry.path().display(), records = records.len(), "valid"),
            Err(Error::FileFormat { path, source }) => {
                invalid += 1;
                println!("{}:{}: {}", path.display(), source.line, source.record);
            }
            Err(err) => return Err(err.into()),
        }
    }

    info!(checked, invalid, "checked MAINTAINERS files");
    Ok(if invalid == 0 {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

fn filter(root: &Path, identity: &Identity, changes_path: Option<&Path>) -> Result<ExitCode> {
    let owned = ownership_from_path(root, identity)
        .with_context(|| format!("failed to resolve ownership under {}", root.display()))?;
    let input = read_input(changes_path)?;
    let input = String::from_utf8(input).context("change list is not valid UTF-8")?;

    let changes = parse_changes(&input);
    let kept = filter_by_ownership(changes, &owned, |(_, files)| {
        Ok::<_, anyhow::Error>(files.clone())
    })?;
    for (id, _) in kept {
        println!("{}", id);
    }
    Ok(ExitCode::SUCCESS)
}

// `id path path ...`, one change per line.
fn parse_changes(input: &str) -> Vec<(String, Vec<String>)> {
    input
        .lines()
        .filter_map(|line| {
            let mut fields = line.split_whitespace();
            let id = fields.next()?;
            Some((id.to_owned(), fields.map(str::to_owned).collect()))
        })
        .collect()
}

fn label(maintainer: &Maintainer) -> String {
    if maintainer.username.is_empty() {
        maintainer.email.clone()
    } else {
        format!("@{}", maintainer.username)
    }
}

fn read_input(path: Option<&Path>) -> Result<Vec<u8>> {
    match path {
        Some(path) if path != Path::new("-") => {
            fs::read(path).with_context(|| format!("failed to read {}", path.display()))
        }
        _ => {
            let mut buf = Vec::new();
            io::stdin()
                .read_to_end(&mut buf)
                .context("failed to read stdin")?;
            Ok(buf)
        }
    }
}

fn walk_files(root: impl AsRef<Path>) -> impl Iterator<Item = walkdir::Result<walkdir::DirEntry>> {
    walkdir::WalkDir::new(root)
        .into_iter()
        .filter_entry(|entry| entry.depth() == 0 || !entry.file_name().to_string_lossy().starts_with('.'))
        .filter(|entry| entry.as_ref().map_or(true, |e| e.file_type().is_file()))
}
