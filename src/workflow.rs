//! Command handlers.
//!
//! Every handler loads the config and the app records from the state dir,
//! runs exactly one lifecycle or verification step and writes the (possibly
//! failed) app record back before reporting, so the next invocation sees
//! what this one observed.
use crate::app::{NameAllocator, TestApp};
use crate::archive::{ArchiveLister, TarLister};
use crate::batch::{self, Batch, BatchOrchestrator, BatchVerdict};
use crate::cli::{
    AdoptArgs, CartridgeArgs, CheckAccessArgs, CheckContentArgs, CheckGroupsArgs,
    CheckSnapshotArgs, CheckUnavailableArgs, Command, CreateArgs, CreateBatchArgs, CtlAction,
    CtlArgs, DeployCommand, GlobalArgs, InitArgs, RestoreArgs, RootArgs, ShowArgs, SnapshotArgs,
    UpdateNamespaceArgs,
};
use crate::config::{self, HarnessConfig};
use crate::error::{HarnessError, HarnessResult};
use crate::fixtures::{AppStore, FixtureDiscovery};
use crate::groups;
use crate::hooks::HookRegistry;
use crate::lifecycle::Lifecycle;
use crate::probe::UreqProber;
use crate::remote::{DeployChange, RhcClient};
use crate::shell::ProcessShell;
use crate::snapshot;
use crate::verify::{marker_regex, AccessCheck, Outcome, Verifier};
use anyhow::{anyhow, Context, Result};
use serde::Serialize;
use std::collections::BTreeSet;
use std::fs;
use std::path::PathBuf;
use std::time::Duration;

pub fn run(args: RootArgs) -> Result<()> {
    let global = args.global;
    match args.command {
        Command::Init(args) => run_init(&global, args),
        Command::Create(args) => run_create(&global, args),
        Command::CreateBatch(args) => run_create_batch(&global, args),
        Command::DestroyBatch => run_destroy_batch(&global),
        Command::Adopt(args) => run_adopt(&global, args),
        Command::Embed(args) => run_embed(&global, args),
        Command::RemoveCartridge(args) => run_remove_cartridge(&global, args),
        Command::Ctl(args) => run_ctl(&global, args),
        Command::Alias(args) => {
            mutate(&Workspace::load(&global)?, &args.app, |lifecycle, app| {
                lifecycle.alias(app)
            })
        }
        Command::Unalias(args) => {
            mutate(&Workspace::load(&global)?, &args.app, |lifecycle, app| {
                lifecycle.unalias(app)
            })
        }
        Command::UpdateNamespace(args) => run_update_namespace(&global, args),
        Command::Deploy(args) => run_deploy(&global, args.change),
        Command::Snapshot(args) => run_snapshot(&global, args),
        Command::Restore(args) => run_restore(&global, args),
        Command::CheckAccess(args) => run_check_access(&global, args),
        Command::CheckContent(args) => run_check_content(&global, args),
        Command::CheckUnavailable(args) => run_check_unavailable(&global, args),
        Command::CheckSnapshot(args) => run_check_snapshot(&global, args),
        Command::CheckGroups(args) => run_check_groups(&global, args),
        Command::Show(args) => run_show(&global, args),
    }
}

/// State dir, its config and its app records.
struct Workspace {
    state_dir: PathBuf,
    config: HarnessConfig,
    store: AppStore,
}

impl Workspace {
    fn load(global: &GlobalArgs) -> Result<Self> {
        let state_dir = resolve_state_dir(global)?;
        let config = config::load_config(&state_dir)?;
        tracing::debug!(state_dir = %state_dir.display(), "loaded harness config");
        Ok(Workspace {
            store: AppStore::new(&state_dir),
            state_dir,
            config,
        })
    }

    fn names(&self) -> Result<NameAllocator> {
        let mut names = NameAllocator::from_clock();
        names.reserve(self.store.list()?.into_iter().map(|app| app.name));
        Ok(names)
    }
}

/// Collaborators needed by mutating commands. Read-only commands never
/// resolve the client, so they work without it installed.
struct Platform {
    remote: RhcClient,
    lister: TarLister,
    hooks: HookRegistry,
}

impl Platform {
    fn connect(config: &HarnessConfig) -> Result<Self> {
        Ok(Platform {
            remote: RhcClient::from_config(config)?,
            lister: TarLister,
            hooks: HookRegistry::default(),
        })
    }

    fn lifecycle<'a>(&'a self, config: &'a HarnessConfig) -> Lifecycle<'a> {
        Lifecycle::new(config, &self.remote, &self.lister, &self.hooks)
    }
}

/// Run one lifecycle step on a recorded app and record the result.
fn mutate(
    workspace: &Workspace,
    name: &str,
    step: impl FnOnce(&Lifecycle<'_>, &mut TestApp) -> HarnessResult<()>,
) -> Result<()> {
    let mut app = workspace.store.load(name)?;
    let platform = Platform::connect(&workspace.config)?;
    let result = step(&platform.lifecycle(&workspace.config), &mut app);
    workspace.store.save(&app)?;
    result?;
    println!("{} {}", app.name, app.state);
    Ok(())
}

fn resolve_state_dir(global: &GlobalArgs) -> Result<PathBuf> {
    match &global.state_dir {
        Some(dir) => Ok(dir.clone()),
        None => config::default_state_dir(),
    }
}

fn run_init(global: &GlobalArgs, args: InitArgs) -> Result<()> {
    let state_dir = resolve_state_dir(global)?;
    let path = config::config_path(&state_dir);
    if path.is_file() && !args.force {
        return Err(anyhow!(
            "config already exists at {} (use --force to overwrite)",
            path.display()
        ));
    }
    config::write_config(&state_dir, &config::default_config())?;
    println!("wrote {}", path.display());
    Ok(())
}

fn run_create(global: &GlobalArgs, args: CreateArgs) -> Result<()> {
    let workspace = Workspace::load(global)?;
    let mut names = workspace.names()?;
    let mut app =
        TestApp::create_unique(&args.app_type, args.scalable, &workspace.config, &mut names);
    let platform = Platform::connect(&workspace.config)?;
    let lifecycle = platform.lifecycle(&workspace.config);
    let result = if args.expect_failure {
        lifecycle.create_expecting_failure(&mut app, args.scalable)
    } else {
        lifecycle.create_with_flags(&mut app, args.scalable, &args.flags)
    };
    workspace.store.save(&app)?;
    result?;
    println!("{}", app.name);
    Ok(())
}

fn run_create_batch(global: &GlobalArgs, args: CreateBatchArgs) -> Result<()> {
    let workspace = Workspace::load(global)?;
    let mut names = workspace.names()?;
    let platform = Platform::connect(&workspace.config)?;
    let lifecycle = platform.lifecycle(&workspace.config);
    let orchestrator = BatchOrchestrator::new(&lifecycle);
    match orchestrator.create(args.count, &args.app_type, args.scalable, &mut names) {
        Ok(batch) => {
            for app in &batch.apps {
                workspace.store.save(app)?;
                println!("{}", app.name);
            }
            workspace.store.save_batch(&batch.names())?;
            Ok(())
        }
        Err(failure) => {
            // Apps that made it stay recorded so destroy-batch can clean up.
            for app in &failure.created {
                workspace.store.save(app)?;
            }
            workspace.store.save(&failure.failed)?;
            let created: Vec<String> = failure.created.iter().map(|app| app.name.clone()).collect();
            workspace.store.save_batch(&created)?;
            Err(anyhow::Error::from(*failure))
        }
    }
}

fn run_destroy_batch(global: &GlobalArgs) -> Result<()> {
    let workspace = Workspace::load(global)?;
    let mut batch = Batch {
        apps: workspace.store.load_batch()?,
    };
    let platform = Platform::connect(&workspace.config)?;
    let lifecycle = platform.lifecycle(&workspace.config);
    let result = BatchOrchestrator::new(&lifecycle).destroy_all(&mut batch);
    for app in &batch.apps {
        workspace.store.save(app)?;
    }
    result?;
    println!("destroyed {} applications", batch.apps.len());
    Ok(())
}

fn run_adopt(global: &GlobalArgs, args: AdoptArgs) -> Result<()> {
    let workspace = Workspace::load(global)?;
    let embed: BTreeSet<String> = args.embed.into_iter().collect();
    let mut app = TestApp::adopt(workspace.store.find_on_fs()?, &args.app_type, &embed)?;
    let platform = Platform::connect(&workspace.config)?;
    let lifecycle = platform.lifecycle(&workspace.config);
    lifecycle.adopted(&mut app)?;
    workspace.store.save(&app)?;
    println!("{}", app.name);
    Ok(())
}

fn run_embed(global: &GlobalArgs, args: CartridgeArgs) -> Result<()> {
    let cartridge = args.cartridge;
    mutate(&Workspace::load(global)?, &args.target.app, |lifecycle, app| {
        lifecycle.embed_cartridge(app, &cartridge)
    })
}

fn run_remove_cartridge(global: &GlobalArgs, args: CartridgeArgs) -> Result<()> {
    let cartridge = args.cartridge;
    mutate(&Workspace::load(global)?, &args.target.app, |lifecycle, app| {
        lifecycle.remove_cartridge(app, &cartridge)
    })
}

fn run_ctl(global: &GlobalArgs, args: CtlArgs) -> Result<()> {
    let action = args.action;
    mutate(&Workspace::load(global)?, &args.target.app, |lifecycle, app| {
        match action {
            CtlAction::Start => lifecycle.start(app),
            CtlAction::Stop => lifecycle.stop(app),
            CtlAction::Restart => lifecycle.restart(app),
            CtlAction::Destroy => lifecycle.destroy(app),
            CtlAction::Tidy => lifecycle.tidy(app),
            CtlAction::Reload => lifecycle.reload(app),
        }
    })
}

fn run_update_namespace(global: &GlobalArgs, args: UpdateNamespaceArgs) -> Result<()> {
    let namespace = args.namespace;
    mutate(&Workspace::load(global)?, &args.target.app, |lifecycle, app| {
        lifecycle.update_namespace(app, &namespace)
    })
}

fn run_deploy(global: &GlobalArgs, command: DeployCommand) -> Result<()> {
    let workspace = Workspace::load(global)?;
    match command {
        DeployCommand::Change(args) => {
            let change = DeployChange::Replace {
                from: args.from,
                to: args.to,
            };
            mutate(&workspace, &args.target.app, |lifecycle, app| {
                lifecycle.deploy(app, &change)
            })
        }
        DeployCommand::Mysql(args) => {
            let template = args.template;
            mutate(&workspace, &args.target.app, |lifecycle, app| {
                let params = app.cartridge_params_for("mysql").cloned().ok_or_else(|| {
                    HarnessError::precondition(
                        "deploy",
                        &app.name,
                        "no mysql cartridge params recorded",
                    )
                })?;
                let change = DeployChange::Template {
                    source: template,
                    params,
                };
                lifecycle.deploy(app, &change)
            })
        }
        DeployCommand::Submodule(args) => {
            let repo = workspace
                .config
                .submodule_repo_dir
                .clone()
                .ok_or_else(|| anyhow!("submodule_repo_dir is not configured"))?;
            let change = DeployChange::Submodule { repo };
            mutate(&workspace, &args.app, |lifecycle, app| {
                lifecycle.deploy(app, &change)
            })
        }
    }
}

fn run_snapshot(global: &GlobalArgs, args: SnapshotArgs) -> Result<()> {
    let workspace = Workspace::load(global)?;
    let mut app = workspace.store.load(&args.target.app)?;
    let platform = Platform::connect(&workspace.config)?;
    let lifecycle = platform.lifecycle(&workspace.config);
    let result = lifecycle.snapshot(&mut app);
    workspace.store.save(&app)?;
    println!("{}", result?.display());
    if args.preserve {
        let preserved = lifecycle.preserve_snapshot(&app)?;
        println!("{}", preserved.display());
    }
    Ok(())
}

fn run_restore(global: &GlobalArgs, args: RestoreArgs) -> Result<()> {
    let from = args.from;
    mutate(&Workspace::load(global)?, &args.target.app, |lifecycle, app| {
        lifecycle.restore(app, from.as_deref())
    })
}

fn run_check_access(global: &GlobalArgs, args: CheckAccessArgs) -> Result<()> {
    let workspace = Workspace::load(global)?;
    let prober = UreqProber::from_config(&workspace.config);
    let verifier = Verifier::new(&prober, &workspace.config);

    if args.batch {
        let batch = Batch {
            apps: workspace.store.load_batch()?,
        };
        let verdict = if args.proxy {
            batch::assert_proxy_accessible(&verifier, &batch, args.negate)
        } else {
            batch::assert_accessible(&verifier, &batch, args.negate)
        };
        return report_verdict(&verdict);
    }

    let name = args
        .app
        .as_deref()
        .ok_or_else(|| anyhow!("check-access needs --app or --batch"))?;
    let app = workspace.store.load(name)?;
    let mut check = if args.proxy {
        let check = batch::proxy_check(args.secure);
        if args.negate {
            check
        } else {
            check.timeout(batch::PROXY_TIMEOUT)
        }
    } else if args.secure {
        AccessCheck::secure()
    } else {
        AccessCheck::insecure()
    };
    if let Some(port) = args.port {
        check = check.port(port);
    }
    if let Some(host) = args.host {
        check = check.host(host);
    } else if args.alias {
        check = check.host(app.alias_hostname(&workspace.config.alias_domain));
    }
    if let Some(secs) = args.timeout {
        check = check.timeout(Duration::from_secs(secs));
    }
    if args.negate {
        report_outcome("inaccessible", &app, &verifier.is_inaccessible(&app, &check))
    } else {
        report_outcome("accessible", &app, &verifier.is_accessible(&app, &check))
    }
}

fn run_check_unavailable(global: &GlobalArgs, args: CheckUnavailableArgs) -> Result<()> {
    let workspace = Workspace::load(global)?;
    let prober = UreqProber::from_config(&workspace.config);
    let verifier = Verifier::new(&prober, &workspace.config);
    if args.batch {
        let batch = Batch {
            apps: workspace.store.load_batch()?,
        };
        return report_verdict(&batch::assert_temporarily_unavailable(&verifier, &batch));
    }
    let name = args
        .app
        .as_deref()
        .ok_or_else(|| anyhow!("check-unavailable needs --app or --batch"))?;
    let app = workspace.store.load(name)?;
    let outcome = verifier.is_temporarily_unavailable(&app);
    report_outcome("temporarily unavailable", &app, &outcome)
}

fn run_check_content(global: &GlobalArgs, args: CheckContentArgs) -> Result<()> {
    let workspace = Workspace::load(global)?;
    let app = workspace.store.load(&args.target.app)?;
    let marker = marker_regex(&args.marker, args.regex)
        .with_context(|| format!("invalid marker {:?}", args.marker))?;
    let mut check = if args.secure {
        AccessCheck::secure()
    } else {
        AccessCheck::insecure()
    };
    if let Some(port) = args.port {
        check = check.port(port);
    }
    if let Some(host) = args.host {
        check = check.host(host);
    }
    let prober = UreqProber::from_config(&workspace.config);
    let verifier = Verifier::new(&prober, &workspace.config);
    let outcome = verifier.wait_for_content(&app, &check, &marker);
    report_outcome(&format!("content {:?}", args.marker), &app, &outcome)
}

fn run_check_snapshot(global: &GlobalArgs, args: CheckSnapshotArgs) -> Result<()> {
    let workspace = Workspace::load(global)?;
    let app = workspace.store.load(&args.target.app)?;
    let archive = match args.archive.or_else(|| app.snapshot.clone()) {
        Some(path) => path,
        None => {
            return Err(
                HarnessError::precondition("check-snapshot", &app.name, "no snapshot bound").into(),
            )
        }
    };
    snapshot::check_artifact(&app.name, &archive)?;
    let members = TarLister
        .list_members(&archive)
        .map_err(|err| HarnessError::collaborator("check-snapshot", &app.name, err))?;
    snapshot::validate_members(&app.name, &members)?;
    println!("{} ok ({} members)", archive.display(), members.len());
    Ok(())
}

fn run_check_groups(global: &GlobalArgs, args: CheckGroupsArgs) -> Result<()> {
    let workspace = Workspace::load(global)?;
    let app = workspace.store.load(&args.target.app)?;
    match &args.etc_group {
        Some(path) => {
            let uid = app.uid.as_deref().ok_or_else(|| {
                HarnessError::precondition("check-groups", &app.name, "uid is unknown")
            })?;
            let text = fs::read_to_string(path)
                .with_context(|| format!("read {}", path.display()))?;
            groups::assigned_groups(&app, &text, uid, &args.groups)?;
        }
        None => {
            for group in &args.groups {
                groups::has_secondary_group(&ProcessShell, &app, group)?;
            }
        }
    }
    println!("{} in {}", app.name, args.groups.join(","));
    Ok(())
}

fn run_show(global: &GlobalArgs, args: ShowArgs) -> Result<()> {
    let workspace = Workspace::load(global)?;
    match args.app {
        Some(name) => {
            let app = workspace.store.load(&name)?;
            println!("{}", serde_json::to_string_pretty(&app)?);
        }
        None => {
            for app in workspace.store.list()? {
                println!("{}\t{}\t{}\t{}", app.name, app.app_type, app.state, app.hostname());
            }
            tracing::debug!(state_dir = %workspace.state_dir.display(), "listed applications");
        }
    }
    Ok(())
}

#[derive(Serialize)]
struct OutcomeReport<'a> {
    app: &'a str,
    check: &'a str,
    #[serde(flatten)]
    outcome: &'a Outcome,
}

fn report_outcome(check: &str, app: &TestApp, outcome: &Outcome) -> Result<()> {
    let report = OutcomeReport {
        app: &app.name,
        check,
        outcome,
    };
    println!("{}", serde_json::to_string_pretty(&report)?);
    if outcome.success {
        return Ok(());
    }
    Err(anyhow!(
        "{} is not {check} after {} attempts (last status {})",
        app.name,
        outcome.attempts,
        outcome
            .last_status
            .map_or_else(|| "none".to_string(), |status| status.to_string())
    ))
}

fn report_verdict(verdict: &BatchVerdict) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(verdict)?);
    if verdict.passed() {
        return Ok(());
    }
    let failed: Vec<String> = verdict
        .failures()
        .map(|failure| format!("{} ({})", failure.app, failure.check))
        .collect();
    Err(anyhow!("batch check failed for {}", failed.join(", ")))
}
