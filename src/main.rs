//! Org Registry operator - Organization/Deployment register inheritance

use std::sync::Arc;
use std::time::Duration;

use clap::{Args, Parser, Subcommand};
use k8s_openapi::apiextensions_apiserver::pkg::apis::apiextensions::v1::CustomResourceDefinition;
use kube::api::{Patch, PatchParams};
use kube::{Api, Client, CustomResourceExt};

use org_registry::controller::{TimeoutPolicy, DEFAULT_PASS_DEADLINE};
use org_registry::controller_runner::{build_controllers, RunnerSettings};
use org_registry::crd::{Deployment, Organization, RegisterKind};
use org_registry::registry::{
    Credentials, DiscoveryConfig, KubeServiceDiscovery, RegistryLocator, TlsPolicy,
    TonicClientFactory, DEFAULT_CONNECT_TIMEOUT, DEFAULT_SERVICE_PORT, DEFAULT_SERVICE_PREFIX,
    DEFAULT_SERVICE_SUFFIX,
};
use org_registry::retry::{retry_when, RetryConfig};
use org_registry::store::KubeStore;
use org_registry::telemetry::{init_logging, LogFormat};
use org_registry::{CONTROL_NAMESPACE, FIELD_MANAGER};

/// Org Registry - hierarchical register inheritance for Organizations and Deployments
#[derive(Parser, Debug)]
#[command(name = "org-registry", version, about, long_about = None)]
struct Cli {
    /// Log output format (json, plain)
    #[arg(long, env = "LOG_FORMAT", default_value = "json", global = true)]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Print the Organization and Deployment CRDs as YAML and exit
    Crd,

    /// Run the Organization and Deployment controllers (default mode)
    Controller(ControllerArgs),

    /// Resolve a hierarchical name and print its register
    Register(RegisterArgs),
}

/// Controller mode arguments
#[derive(Args, Debug, Default)]
struct ControllerArgs {
    /// Requeue policy after a successful pass (fixed, fast-retry)
    #[arg(long, env = "TIMEOUT_POLICY", default_value = "fixed")]
    timeout_policy: TimeoutPolicy,

    /// Deadline for a single reconciliation pass in seconds
    #[arg(long, env = "PASS_DEADLINE_SECS")]
    pass_deadline_secs: Option<u64>,

    /// Skip CRD installation on startup
    #[arg(long)]
    skip_crd_install: bool,
}

/// Register lookup arguments
#[derive(Args, Debug)]
struct RegisterArgs {
    /// Namespace the Organization and Deployment live in
    #[arg(short, long, env = "OPERATOR_NAMESPACE", default_value = "default")]
    namespace: String,

    /// `<organization>` or `<organization>.<deployment>`
    name: String,

    /// Also locate the backend serving this register kind (ipam, as, ni)
    #[arg(long)]
    backend: Option<String>,

    #[command(flatten)]
    discovery: DiscoveryArgs,
}

/// Registry backend discovery arguments
#[derive(Args, Debug)]
struct DiscoveryArgs {
    /// Namespace the registry backends run in
    #[arg(long, env = "CONTROL_NAMESPACE", default_value = CONTROL_NAMESPACE)]
    control_namespace: String,

    /// Endpoint host prefix
    #[arg(long, env = "REGISTRY_SERVICE_PREFIX", default_value = DEFAULT_SERVICE_PREFIX)]
    service_prefix: String,

    /// Endpoint host suffix
    #[arg(long, env = "REGISTRY_SERVICE_SUFFIX", default_value = DEFAULT_SERVICE_SUFFIX)]
    service_suffix: String,

    /// Endpoint port
    #[arg(long, env = "REGISTRY_SERVICE_PORT", default_value_t = DEFAULT_SERVICE_PORT)]
    port: u16,

    /// Username presented to registry backends
    #[arg(long, env = "REGISTRY_USERNAME", default_value = "admin")]
    username: String,

    /// Password presented to registry backends
    #[arg(long, env = "REGISTRY_PASSWORD", default_value = "admin", hide_env_values = true)]
    password: String,

    /// PEM CA bundle; enables TLS with certificate verification
    #[arg(long, env = "REGISTRY_CA_FILE")]
    ca_file: Option<std::path::PathBuf>,
}

impl DiscoveryArgs {
    fn into_config(self) -> anyhow::Result<DiscoveryConfig> {
        let tls = match self.ca_file {
            Some(path) => TlsPolicy::Verified {
                ca_pem: std::fs::read_to_string(&path).map_err(|e| {
                    anyhow::anyhow!("Failed to read CA bundle {}: {}", path.display(), e)
                })?,
                domain: None,
            },
            None => TlsPolicy::Insecure,
        };
        Ok(DiscoveryConfig {
            control_namespace: self.control_namespace,
            service_prefix: self.service_prefix,
            service_suffix: self.service_suffix,
            port: self.port,
            credentials: Credentials::new(self.username, self.password),
            tls,
        })
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    init_logging(cli.log_format)?;

    match cli.command {
        Some(Commands::Crd) => print_crds(),
        Some(Commands::Register(args)) => run_register(args).await,
        Some(Commands::Controller(args)) => run_controller(args).await,
        None => run_controller(ControllerArgs::default()).await,
    }
}

fn print_crds() -> anyhow::Result<()> {
    for crd in [Organization::crd(), Deployment::crd()] {
        let yaml = serde_yaml::to_string(&crd)
            .map_err(|e| anyhow::anyhow!("Failed to serialize CRD: {}", e))?;
        println!("---\n{yaml}");
    }
    Ok(())
}

async fn ensure_crds_installed(client: &Client) -> anyhow::Result<()> {
    let crds: Api<CustomResourceDefinition> = Api::all(client.clone());
    let params = PatchParams::apply(FIELD_MANAGER).force();

    for crd in [Organization::crd(), Deployment::crd()] {
        let name = crd.metadata.name.clone().unwrap_or_default();
        let patch = Patch::Apply(&crd);
        tracing::info!(crd = %name, "Installing CRD...");
        // 422 means the CRD itself is invalid, retrying cannot help
        retry_when(
            &RetryConfig::with_max_attempts(10),
            "install_crd",
            |e: &kube::Error| !matches!(e, kube::Error::Api(ae) if ae.code == 422),
            || crds.patch(&name, &params, &patch),
        )
        .await
        .map_err(|e| anyhow::anyhow!("Failed to install CRD {}: {}", name, e))?;
    }

    tracing::info!("All CRDs installed/updated");
    Ok(())
}

async fn run_controller(args: ControllerArgs) -> anyhow::Result<()> {
    tracing::info!("Org registry controller starting...");

    let timeout_policy = args.timeout_policy;
    let pass_deadline = args
        .pass_deadline_secs
        .map(Duration::from_secs)
        .unwrap_or(DEFAULT_PASS_DEADLINE);

    let client = Client::try_default()
        .await
        .map_err(|e| anyhow::anyhow!("Failed to create Kubernetes client: {}", e))?;

    if !args.skip_crd_install {
        ensure_crds_installed(&client).await?;
    }

    tracing::info!(?timeout_policy, ?pass_deadline, "Starting controllers:");
    let controllers = build_controllers(
        client,
        RunnerSettings {
            timeout_policy,
            pass_deadline,
        },
    );

    futures::future::join_all(controllers).await;

    tracing::info!("Org registry controller shutting down");
    Ok(())
}

async fn run_register(args: RegisterArgs) -> anyhow::Result<()> {
    let client = Client::try_default()
        .await
        .map_err(|e| anyhow::anyhow!("Failed to create Kubernetes client: {}", e))?;

    let locator = RegistryLocator::new(
        Arc::new(KubeStore::new(client.clone())),
        Arc::new(KubeServiceDiscovery::new(client)),
        Arc::new(TonicClientFactory::new(DEFAULT_CONNECT_TIMEOUT)),
        args.discovery.into_config()?,
    );

    let register = locator.get_register(&args.namespace, &args.name).await?;
    let strategy = locator
        .get_address_allocation_strategy(&args.namespace, &args.name)
        .await?;

    let output = serde_json::json!({
        "name": args.name,
        "register": register,
        "addressAllocationStrategy": strategy,
    });
    println!("{}", serde_yaml::to_string(&output)?);

    if let Some(kind) = args.backend {
        let kind: RegisterKind = kind.parse()?;
        let client = locator.get_registry_client(kind).await?;
        println!("backend: {}", client.endpoint());
    }

    Ok(())
}
