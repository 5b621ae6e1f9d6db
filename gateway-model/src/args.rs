use crate::{
    config::{FeatureGates, Tags},
    resolvers::{StaticSecrets, StaticSecurityGroups, StaticSubnets},
    routes, BuildInput, BuilderConfig, StackBuilder,
};
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use gateway_model_core::{
    addon::{AddonKind, AddonMetadata},
    elbv2::{IpAddressType, LoadBalancerType, Scheme, TargetType},
};
use gateway_model_k8s_api::{
    gateway::{Gateway, HttpRoute},
    LoadBalancerConfigurationSpec,
};
use serde::Deserialize;
use std::{
    io::Read,
    path::{Path, PathBuf},
    sync::Arc,
};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[clap(name = "gateway-model", about = "Builds load balancer models")]
pub struct Args {
    #[clap(
        long,
        default_value = "gateway_model=info,warn",
        env = "GATEWAY_MODEL_LOG"
    )]
    log_level: String,

    #[clap(long, default_value = "cluster", env = "GATEWAY_MODEL_CLUSTER_NAME")]
    cluster_name: String,

    #[clap(long, default_value = "", env = "GATEWAY_MODEL_VPC_ID")]
    vpc_id: String,

    #[clap(long, default_value = "application")]
    load_balancer_type: LoadBalancerType,

    #[clap(long, default_value = "internal")]
    default_scheme: Scheme,

    #[clap(long, default_value = "ipv4")]
    default_ip_address_type: IpAddressType,

    #[clap(long, default_value = "instance")]
    default_target_type: TargetType,

    #[clap(long, default_value = "ELBSecurityPolicy-2016-08")]
    default_ssl_policy: String,

    /// Tag keys that gateways may not set, separated by commas.
    #[clap(long, value_delimiter = ',')]
    external_managed_tags: Vec<String>,

    /// Tags applied to every resource, e.g. `team=edge,env=prod`.
    #[clap(long, default_value = "")]
    default_tags: Tags,

    /// Grants the backend security group access to targets.
    #[clap(long)]
    enable_backend_security_group: bool,

    /// The ID of the shared backend security group.
    #[clap(long)]
    backend_security_group: Option<String>,

    #[clap(long)]
    disable_restricted_sg_rules: bool,

    #[clap(long, value_delimiter = ',')]
    allowed_certificate_authority_arns: Vec<String>,

    /// Features to toggle, e.g. `WeightedTargetGroups=false`.
    #[clap(long, default_value = "")]
    feature_gates: FeatureGates,

    #[clap(long, value_delimiter = ',', default_value = "WAFv2,Shield")]
    supported_addons: Vec<AddonKind>,

    /// Subnets for load balancers whose configuration names none.
    #[clap(long, value_delimiter = ',')]
    subnets: Vec<String>,

    #[clap(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Builds the stack for the gateway described by a YAML document and
    /// prints it as JSON.
    Render {
        /// The document to read, or `-` for stdin.
        #[clap(default_value = "-")]
        input: PathBuf,
    },
}

/// The document read by `render`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RenderInput {
    gateway: Gateway,

    #[serde(default)]
    configuration: LoadBalancerConfigurationSpec,

    #[serde(default)]
    http_routes: Vec<HttpRoute>,

    /// The add-on state from a previous build.
    #[serde(default)]
    addons: Vec<AddonMetadata>,
}

impl Args {
    #[inline]
    pub async fn parse_and_run() -> Result<()> {
        Self::parse().run().await
    }

    pub async fn run(self) -> Result<()> {
        let Self {
            log_level,
            cluster_name,
            vpc_id,
            load_balancer_type,
            default_scheme,
            default_ip_address_type,
            default_target_type,
            default_ssl_policy,
            external_managed_tags,
            default_tags: Tags(default_tags),
            enable_backend_security_group,
            backend_security_group,
            disable_restricted_sg_rules,
            allowed_certificate_authority_arns,
            feature_gates,
            supported_addons,
            subnets,
            command: Command::Render { input },
        } = self;

        tracing_subscriber::fmt()
            .with_env_filter(EnvFilter::try_new(&log_level)?)
            .with_writer(std::io::stderr)
            .init();

        let config = BuilderConfig {
            cluster_name,
            vpc_id,
            load_balancer_type,
            default_scheme,
            default_ip_address_type,
            default_target_type,
            default_ssl_policy,
            external_managed_tags: external_managed_tags.into_iter().collect(),
            default_tags,
            enable_backend_security_group,
            disable_restricted_sg_rules,
            allowed_ca_arns: allowed_certificate_authority_arns,
            feature_gates,
            supported_addons,
        };

        let builder = StackBuilder::new(
            config,
            Arc::new(StaticSubnets::new(subnets)),
            Arc::new(StaticSecurityGroups::new(backend_security_group)),
        );

        let doc = read_input(&input)?;
        let RenderInput {
            gateway,
            configuration,
            http_routes,
            addons,
        } = serde_yaml::from_str::<RenderInput>(&doc)
            .with_context(|| format!("parsing {}", input.display()))?;
        let routes = routes::attach(&gateway, &http_routes)?;

        let cancel = CancellationToken::new();
        tokio::spawn({
            let cancel = cancel.clone();
            async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    warn!("Interrupted; cancelling build");
                    cancel.cancel();
                }
            }
        });

        let output = builder
            .build(
                BuildInput {
                    gateway: &gateway,
                    config: &configuration,
                    routes: &routes,
                    addons: &addons,
                    secrets: &StaticSecrets::default(),
                },
                &cancel,
            )
            .await?;
        info!(resources = output.stack.len(), "Rendered stack");

        let stdout = std::io::stdout();
        let mut out = stdout.lock();
        serde_json::to_writer_pretty(&mut out, &output)?;
        std::io::Write::write_all(&mut out, b"\n")?;
        Ok(())
    }
}

fn read_input(path: &Path) -> Result<String> {
    if path.as_os_str() == "-" {
        let mut doc = String::new();
        std::io::stdin()
            .read_to_string(&mut doc)
            .context("reading stdin")?;
        return Ok(doc);
    }
    std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))
}
