use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context as _};
use chrono::Local;
use clap::{Args, Parser, Subcommand};
use console::style;
use dialoguer::Confirm;
use similar::{ChangeTag, TextDiff};
use tabular::{row, Table};

use kubemerge::{kubeconfig_path, merge, ClusterDescriptor, Credential, KubeConfig};

#[derive(Parser, Debug)]
#[clap(author, version, about = "Log in to managed clusters with kubectl")]
struct Cli {
    /// Kubeconfig to update. Defaults to $KUBECONFIG, then ~/.kube/config.
    #[clap(long, global = true)]
    kubeconfig: Option<PathBuf>,

    #[clap(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Add or refresh the kubeconfig context of a cluster and switch to it.
    Cluster(ClusterArgs),
    /// Show the current context and the organization it belongs to.
    Whoami,
    /// List all contexts.
    Contexts,
}

#[derive(Args, Debug)]
struct ClusterArgs {
    /// Name of the cluster.
    #[clap(long)]
    name: String,
    /// Project the cluster belongs to.
    #[clap(long)]
    project: Option<String>,
    /// API server URL.
    #[clap(long)]
    server: String,
    /// Context name. Derived from name and project if not given.
    #[clap(long)]
    context: Option<String>,
    /// Base64 encoded CA certificate of the API server.
    #[clap(long)]
    ca_data: Option<String>,
    #[clap(long)]
    insecure_skip_tls_verify: bool,
    #[clap(long)]
    issuer_url: Option<String>,
    #[clap(long)]
    client_id: Option<String>,
    /// Let kubectl fetch OIDC tokens through kclogin instead of storing one.
    #[clap(long)]
    exec_plugin: bool,
    /// Static bearer token for the user entry.
    #[clap(long, conflicts_with = "exec-plugin")]
    token: Option<String>,
    /// Organization to remember for the context.
    #[clap(long)]
    organization: Option<String>,
    /// Overwrite a context of the same name that points at another server.
    #[clap(long)]
    force: bool,
    /// Print the changes instead of writing them.
    #[clap(long)]
    dry_run: bool,
    /// Keep a timestamped copy of the previous kubeconfig.
    #[clap(long)]
    backup: bool,
}

impl ClusterArgs {
    fn descriptor(&self) -> ClusterDescriptor {
        ClusterDescriptor {
            name: self.name.clone(),
            project: self.project.clone(),
            api_endpoint: self.server.clone(),
            ca_data: self.ca_data.clone(),
            insecure_skip_tls_verify: self.insecure_skip_tls_verify,
            oidc_issuer_url: self.issuer_url.clone(),
            oidc_client_id: self.client_id.clone(),
        }
    }
}

fn relogin_hint() -> String {
    format!(
        "please re-login by executing {}",
        style("kclogin cluster --name <cluster> --server <url> ...").bold()
    )
}

fn print_diff(before: &str, after: &str) {
    let diff = TextDiff::from_lines(before, after);
    for change in diff.iter_all_changes() {
        match change.tag() {
            ChangeTag::Delete => print!("{}", style(format!("-{change}")).red()),
            ChangeTag::Insert => print!("{}", style(format!("+{change}")).green()),
            ChangeTag::Equal => print!(" {change}"),
        }
    }
}

fn backup(path: &Path) -> anyhow::Result<()> {
    if !path.exists() {
        return Ok(());
    }
    let now = Local::now().format("%Y%m%dT%H%M%S");
    let file_name = path
        .file_name()
        .context("Kubeconfig path has no file name")?
        .to_string_lossy();
    let backup = path.with_file_name(format!("{file_name}_{now}"));
    fs::copy(path, &backup).with_context(|| format!("Backing up to {}", backup.display()))?;
    log::info!("backed up {} to {}", path.display(), backup.display());
    Ok(())
}

/// `attended` says whether someone is at a terminal to confirm an overwrite.
fn cluster(path: &Path, args: &ClusterArgs, attended: bool) -> anyhow::Result<()> {
    let kc = KubeConfig::load(path)?;
    let descriptor = args.descriptor();
    let context_name = descriptor.resolve_context_name(args.context.as_deref())?;

    if let Some(server) = kc.context_server(&context_name) {
        if server != descriptor.api_endpoint.trim() && !args.force {
            log::warn!("context {context_name} points at {server}");
            if !attended {
                bail!(
                    "Context {context_name} already points at {server}, use --force to overwrite it"
                );
            }
            let overwrite = Confirm::new()
                .with_prompt(format!(
                    "Context {context_name} points at {server}. Overwrite?"
                ))
                .wait_for_newline(true)
                .interact()?;
            if !overwrite {
                return Ok(());
            }
        }
    }

    let mut merged = merge(
        kc.clone(),
        &descriptor,
        Some(context_name.as_str()),
        args.exec_plugin,
    )?;
    if let Some(token) = &args.token {
        merged.upsert_user(&context_name, Credential::StaticToken(token.clone()).into());
    }
    if let Some(organization) = args.organization.as_deref().filter(|org| !org.is_empty()) {
        merged.write_extension(&context_name, organization);
    }

    if args.dry_run {
        print_diff(&kc.to_yaml()?, &merged.to_yaml()?);
        return Ok(());
    }

    if args.backup {
        backup(path)?;
    }
    merged
        .save(path)
        .with_context(|| format!("Writing {}", path.display()))?;

    println!(
        "{} switched to context {}",
        style("✔").green(),
        style(&context_name).bold()
    );
    Ok(())
}

fn whoami(path: &Path) -> anyhow::Result<()> {
    let kc = KubeConfig::load(path)?;
    let current = &kc.current_context;
    if current.is_empty() {
        bail!("No current context set, {}", relogin_hint());
    }

    let organization = match kc.extension(current) {
        Ok(extension) => extension.organization,
        Err(err) if err.is_extension_not_found() => bail!("{err}, {}", relogin_hint()),
        Err(err) => return Err(err.into()),
    };

    println!("Context:      {}", style(current).bold());
    println!("Organization: {organization}");
    match kc.contexts.get(current).and_then(|ctx| ctx.namespace.as_ref()) {
        Some(ns) => println!("Namespace:    {ns}"),
        None => println!("Namespace:    {}", style("none").dim()),
    }
    Ok(())
}

fn contexts(path: &Path) -> anyhow::Result<()> {
    let kc = KubeConfig::load(path)?;

    let mut table = Table::new("{:<} {:<} {:<} {:<} {:<}");
    for (name, ctx) in &kc.contexts {
        let marker = if *name == kc.current_context { '*' } else { ' ' };
        let organization = kc
            .extension(name)
            .map(|ext| ext.organization)
            .unwrap_or_default();
        let cluster = &ctx.cluster;
        let user = &ctx.user;
        table.add_row(row!(
            marker,
            name,
            format!("🖥  {cluster}"),
            format!("🧑 {user}"),
            organization
        ));
    }
    print!("{table}");
    Ok(())
}

fn main() -> anyhow::Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    let path = match cli.kubeconfig {
        Some(path) => path,
        None => kubeconfig_path()?,
    };
    log::debug!("using kubeconfig {}", path.display());

    match &cli.command {
        Command::Cluster(args) => cluster(&path, args, console::user_attended()),
        Command::Whoami => whoami(&path),
        Command::Contexts => contexts(&path),
    }
}
