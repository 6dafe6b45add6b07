use std::path::PathBuf;
use std::process;

use anyhow::Result;
use clap::{ArgAction, Parser, ValueEnum};
use pdisk::{parse_size, Config, Executor, Lun, PdiskError, ProcessExecutor, DEFAULT_CONFIG_FILE};
use tracing::{debug, error};

mod logging;

/// Status of any invocation aborted on an error.
const FATAL_STATUS: i32 = 2;

static USAGE: &str = "\
Parameters:
    action=check:    LUN_UUID
    action=create:   LUN_UUID LUN_Size
    action=delete:   LUN_UUID
    action=rebase:   LUN_UUID New_LUN_UUID Snapshot_Size
    action=snapshot: New_LUN_UUID LUN_UUID";

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum CliAction {
    Check,
    Create,
    Delete,
    Rebase,
    Snapshot,
}

impl CliAction {
    fn name(&self) -> &'static str {
        match self {
            CliAction::Check => "check",
            CliAction::Create => "create",
            CliAction::Delete => "delete",
            CliAction::Rebase => "rebase",
            CliAction::Snapshot => "snapshot",
        }
    }

    /// Minimum number of positional arguments.
    fn required_args(&self) -> usize {
        match self {
            CliAction::Check => 1,
            CliAction::Create => 2,
            CliAction::Delete => 1,
            CliAction::Rebase => 3,
            CliAction::Snapshot => 2,
        }
    }
}

/// Manage an iSCSI LUN on a NetApp filer
#[derive(Parser, Debug)]
#[command(name = "persistent-disk-netapp", version, after_help = USAGE)]
struct Cli {
    /// Name of the configuration file to use
    #[arg(long = "config", default_value = DEFAULT_CONFIG_FILE)]
    config: PathBuf,

    /// Action to execute
    #[arg(long, value_enum)]
    action: CliAction,

    /// Increase verbosity level for debugging (multiple allowed)
    #[arg(short = 'v', long = "verbose", visible_alias = "debug", action = ArgAction::Count)]
    verbosity: u8,

    /// Action parameters
    args: Vec<String>,
}

fn main() {
    let cli = Cli::parse();
    process::exit(execute(&cli));
}

fn execute(cli: &Cli) -> i32 {
    if let Err(e) = check_args(cli.action, &cli.args) {
        logging::init_console(cli.verbosity);
        return abort(&e);
    }

    let config = match Config::read(&cli.config) {
        Ok(config) => config,
        Err(e) => {
            logging::init_console(cli.verbosity);
            return abort(&e);
        }
    };

    let _guard = match logging::init(cli.verbosity, config.log_file().as_deref()) {
        Ok(guard) => guard,
        Err(e) => {
            logging::init_console(cli.verbosity);
            return abort(&e);
        }
    };

    let executor = ProcessExecutor::with_timeout(config.command_timeout());
    match run(cli, &config, &executor) {
        Ok(status) => status,
        Err(e) => abort(&e),
    }
}

/// Logs a fatal error and returns the status to exit with.
fn abort(e: &anyhow::Error) -> i32 {
    error!("Persistent disk operation failed:\n{:#}", e);
    FATAL_STATUS
}

fn check_args(action: CliAction, args: &[String]) -> Result<()> {
    if args.len() < action.required_args() {
        anyhow::bail!(PdiskError::InsufficientArgs {
            action: action.name().to_string(),
            required: action.required_args(),
        })
    }
    Ok(())
}

fn run(cli: &Cli, config: &Config, executor: &dyn Executor) -> Result<i32> {
    let proxy = config.proxy()?;
    let policy = config.status_policy();
    let args = &cli.args;

    let status = match cli.action {
        CliAction::Check => {
            debug!("Checking LUN existence...");
            Lun::new(&args[0], &proxy, executor)
                .with_policy(policy)
                .check()?
        }
        CliAction::Create => {
            debug!("Creating LUN...");
            let size = parse_size(&args[1])?;
            Lun::new(&args[0], &proxy, executor)
                .with_size(size)
                .with_policy(policy)
                .create()?
        }
        CliAction::Delete => {
            debug!("Deleting LUN...");
            Lun::new(&args[0], &proxy, executor)
                .with_policy(policy)
                .delete()?
        }
        CliAction::Rebase => {
            debug!("Rebasing LUN...");
            let mut lun = Lun::new(&args[0], &proxy, executor).with_policy(policy);
            let snapshot_lun = Lun::new(&args[1], &proxy, executor);
            lun.rebase(&snapshot_lun)?
        }
        CliAction::Snapshot => {
            debug!("Doing a LUN snapshot...");
            let mut lun = Lun::new(&args[1], &proxy, executor).with_policy(policy);
            let snapshot_lun = Lun::new(&args[0], &proxy, executor).with_policy(policy);
            let status = lun.snapshot(&snapshot_lun)?;
            if policy.stops_at(status) {
                status
            } else {
                snapshot_lun.map()?
            }
        }
    };

    Ok(status)
}
