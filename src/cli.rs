//! CLI argument parsing for the acceptance harness.
//!
//! Each subcommand maps 1:1 onto one lifecycle or verification step so an
//! outer scenario runner can drive the harness one step per invocation.
use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// Root CLI entrypoint.
#[derive(Parser, Debug)]
#[command(
    name = "paas-accept",
    version,
    about = "Black-box lifecycle acceptance harness for hosted PaaS applications",
    after_help = "Examples:\n  paas-accept init\n  paas-accept create --type php-5.3\n  paas-accept check-access --app php1a2b1 --secure\n  paas-accept deploy change --app php1a2b1\n  paas-accept check-content --app php1a2b1 --marker TEST\n  paas-accept ctl destroy --app php1a2b1",
    subcommand_required = true,
    arg_required_else_help = true
)]
pub struct RootArgs {
    #[command(flatten)]
    pub global: GlobalArgs,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Args, Debug, Clone)]
pub struct GlobalArgs {
    /// Directory holding config.json, app records, snapshots and logs
    #[arg(long, value_name = "DIR", global = true)]
    pub state_dir: Option<PathBuf>,

    /// Log at debug level
    #[arg(long, short, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Write a default config.json into the state dir
    Init(InitArgs),
    /// Create a new application (domain + app)
    Create(CreateArgs),
    /// Create several applications as one batch
    CreateBatch(CreateBatchArgs),
    /// Destroy every application of the recorded batch
    DestroyBatch,
    /// Reuse an application recorded by an earlier run
    Adopt(AdoptArgs),
    /// Embed a cartridge into an application
    Embed(CartridgeArgs),
    /// Remove an embedded cartridge
    RemoveCartridge(CartridgeArgs),
    /// Start, stop, restart, destroy, tidy or reload an application
    Ctl(CtlArgs),
    /// Add the application's alias under the alias domain
    Alias(AppArgs),
    /// Remove the application's alias
    Unalias(AppArgs),
    /// Move the application's domain to a new namespace
    UpdateNamespace(UpdateNamespaceArgs),
    /// Push a content change through the application's repo
    Deploy(DeployArgs),
    /// Save a snapshot of the application
    Snapshot(SnapshotArgs),
    /// Restore the application from its snapshot
    Restore(RestoreArgs),
    /// Poll until the application answers (or, negated, stops answering)
    CheckAccess(CheckAccessArgs),
    /// Poll until the application's page contains a marker
    CheckContent(CheckContentArgs),
    /// Poll until the proxy reports the application temporarily unavailable
    CheckUnavailable(CheckUnavailableArgs),
    /// Validate the members of a snapshot archive
    CheckSnapshot(CheckSnapshotArgs),
    /// Verify the application's user is in the given groups
    CheckGroups(CheckGroupsArgs),
    /// Print the recorded application
    Show(ShowArgs),
}

#[derive(Args, Debug)]
pub struct InitArgs {
    /// Overwrite an existing config.json
    #[arg(long)]
    pub force: bool,
}

#[derive(Args, Debug, Clone)]
pub struct AppArgs {
    /// Recorded application name
    #[arg(long, value_name = "NAME")]
    pub app: String,
}

#[derive(Args, Debug)]
pub struct CreateArgs {
    /// Cartridge type of the application (e.g. php-5.3)
    #[arg(long = "type", value_name = "TYPE")]
    pub app_type: String,

    /// Create a scalable application
    #[arg(long)]
    pub scalable: bool,

    /// The platform is expected to reject the creation
    #[arg(long)]
    pub expect_failure: bool,

    /// Extra flags passed through to the create call
    #[arg(long = "flag", value_name = "FLAG", allow_hyphen_values = true)]
    pub flags: Vec<String>,
}

#[derive(Args, Debug)]
pub struct CreateBatchArgs {
    /// Number of applications
    #[arg(long, value_name = "N")]
    pub count: usize,

    /// Cartridge type of every application
    #[arg(long = "type", value_name = "TYPE")]
    pub app_type: String,

    #[arg(long)]
    pub scalable: bool,
}

#[derive(Args, Debug)]
pub struct AdoptArgs {
    #[arg(long = "type", value_name = "TYPE")]
    pub app_type: String,

    /// Cartridges the adopted application must have embedded (exact set)
    #[arg(long = "embed", value_name = "CARTRIDGE")]
    pub embed: Vec<String>,
}

#[derive(Args, Debug)]
pub struct CartridgeArgs {
    #[command(flatten)]
    pub target: AppArgs,

    #[arg(long, value_name = "CARTRIDGE")]
    pub cartridge: String,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum CtlAction {
    Start,
    Stop,
    Restart,
    Destroy,
    Tidy,
    Reload,
}

#[derive(Args, Debug)]
pub struct CtlArgs {
    #[arg(value_enum)]
    pub action: CtlAction,

    #[command(flatten)]
    pub target: AppArgs,
}

#[derive(Args, Debug)]
pub struct UpdateNamespaceArgs {
    #[command(flatten)]
    pub target: AppArgs,

    #[arg(long, value_name = "NAMESPACE")]
    pub namespace: String,
}

#[derive(Args, Debug)]
pub struct DeployArgs {
    #[command(subcommand)]
    pub change: DeployCommand,
}

#[derive(Subcommand, Debug)]
pub enum DeployCommand {
    /// Replace the first occurrence of a word in the index page
    Change(DeployChangeArgs),
    /// Install the mysql check page using the embedded cartridge's params
    Mysql(DeployTemplateArgs),
    /// Add the configured submodule repo to the application
    Submodule(AppArgs),
}

#[derive(Args, Debug)]
pub struct DeployChangeArgs {
    #[command(flatten)]
    pub target: AppArgs,

    #[arg(long, default_value = "Welcome")]
    pub from: String,

    #[arg(long, default_value = "TEST")]
    pub to: String,
}

#[derive(Args, Debug)]
pub struct DeployTemplateArgs {
    #[command(flatten)]
    pub target: AppArgs,

    /// Page template with HOSTNAME/USER/PASSWORD placeholders
    #[arg(long, value_name = "PATH")]
    pub template: PathBuf,
}

#[derive(Args, Debug)]
pub struct SnapshotArgs {
    #[command(flatten)]
    pub target: AppArgs,

    /// Also copy the snapshot aside and print the preserved path
    #[arg(long)]
    pub preserve: bool,
}

#[derive(Args, Debug)]
pub struct RestoreArgs {
    #[command(flatten)]
    pub target: AppArgs,

    /// Restore from this archive instead of the bound snapshot
    #[arg(long, value_name = "PATH")]
    pub from: Option<PathBuf>,
}

#[derive(Args, Debug)]
pub struct CheckAccessArgs {
    /// Check one application
    #[arg(long, value_name = "NAME", conflicts_with = "batch")]
    pub app: Option<String>,

    /// Check every application of the recorded batch
    #[arg(long)]
    pub batch: bool,

    #[arg(long)]
    pub secure: bool,

    #[arg(long, value_name = "PORT", conflicts_with = "batch")]
    pub port: Option<u16>,

    /// Probe this host instead of the application's hostname
    #[arg(long, value_name = "HOST", conflicts_with = "batch")]
    pub host: Option<String>,

    /// Probe the application's alias hostname
    #[arg(long, conflicts_with_all = ["host", "batch"])]
    pub alias: bool,

    /// Poll budget in seconds
    #[arg(long, value_name = "SECS", conflicts_with = "batch")]
    pub timeout: Option<u64>,

    /// Require the application to stop answering
    #[arg(long)]
    pub negate: bool,

    /// Check through the node web proxy ports (8000, or 8443 with --secure)
    #[arg(long)]
    pub proxy: bool,
}

#[derive(Args, Debug)]
pub struct CheckUnavailableArgs {
    #[arg(long, value_name = "NAME", conflicts_with = "batch")]
    pub app: Option<String>,

    /// Check every application of the recorded batch
    #[arg(long)]
    pub batch: bool,
}

#[derive(Args, Debug)]
pub struct CheckContentArgs {
    #[command(flatten)]
    pub target: AppArgs,

    #[arg(long, value_name = "TEXT")]
    pub marker: String,

    #[arg(long)]
    pub secure: bool,

    #[arg(long, value_name = "PORT")]
    pub port: Option<u16>,

    /// Fetch from this host instead of the application's hostname
    #[arg(long, value_name = "HOST")]
    pub host: Option<String>,

    /// Treat the marker as a regular expression
    #[arg(long)]
    pub regex: bool,
}

#[derive(Args, Debug)]
pub struct CheckSnapshotArgs {
    #[command(flatten)]
    pub target: AppArgs,

    /// Archive to check instead of the bound snapshot
    #[arg(long, value_name = "PATH")]
    pub archive: Option<PathBuf>,
}

#[derive(Args, Debug)]
pub struct CheckGroupsArgs {
    #[command(flatten)]
    pub target: AppArgs,

    #[arg(long = "group", value_name = "GROUP", required = true)]
    pub groups: Vec<String>,

    /// Check against this /etc/group file instead of logging into the gear
    #[arg(long, value_name = "PATH")]
    pub etc_group: Option<PathBuf>,
}

#[derive(Args, Debug)]
pub struct ShowArgs {
    /// Application name; omit to list every recorded application
    #[arg(long, value_name = "NAME")]
    pub app: Option<String>,
}
