use crate::{
    aws::{self, DynamoStore, StsAssumer},
    core::{inject::Resources, Exchange, Injector, SessionDuration, Sidecar},
    k8s::{Cluster, DEFAULT_ROLE_ANNOTATION},
    metrics::Metrics,
    service::Broker,
};
use anyhow::{bail, Result};
use clap::Parser;
use prometheus_client::registry::Registry;
use std::num::NonZeroU16;
use tracing::info;

#[derive(Debug, Parser)]
#[clap(name = "iam-broker", about = "Brokers IAM role credentials to pods")]
pub struct Args {
    #[clap(long, default_value = "iam_broker=info,warn", env = "BROKER_LOG")]
    log_level: kubert::LogFilter,

    #[clap(long, default_value = "plain")]
    log_format: kubert::LogFormat,

    #[clap(flatten)]
    client: kubert::ClientArgs,

    #[clap(flatten)]
    server: kubert::ServerArgs,

    #[clap(flatten)]
    admin: kubert::AdminArgs,

    /// The table mapping service accounts to the roles they may assume.
    #[clap(long, default_value = "mapped_roles", env = "MAP_TABLE")]
    map_table: String,

    /// The table of issued tokens.
    #[clap(long, default_value = "role_perms", env = "AUTH_TABLE")]
    auth_table: String,

    /// The service account annotation naming the requested role.
    #[clap(long, default_value = DEFAULT_ROLE_ANNOTATION, env = "ARN_ANNOTATION")]
    role_annotation: String,

    #[clap(
        long,
        default_value = "image-registry.openshift-image-registry.svc:5000/ocp-iam-broker/ocp-broker-proxy",
        env = "PROXY_IMAGE"
    )]
    proxy_image: String,

    #[clap(long, default_value = "ocp-broker-proxy", env = "PROXY_NAME")]
    proxy_name: String,

    #[clap(long, default_value = "53080", env = "PROXY_PORT")]
    proxy_port: u16,

    #[clap(long, default_value = "1m", env = "PROXY_CPU_REQUESTS")]
    proxy_cpu_requests: String,

    #[clap(long, default_value = "15Mi", env = "PROXY_MEMORY_REQUESTS")]
    proxy_memory_requests: String,

    #[clap(long, default_value = "10m", env = "PROXY_CPU_LIMITS")]
    proxy_cpu_limits: String,

    #[clap(long, default_value = "32Mi", env = "PROXY_MEMORY_LIMITS")]
    proxy_memory_limits: String,

    /// How long assumed-role sessions last, in seconds.
    #[clap(long, default_value = "900", env = "DEFAULT_DURATION")]
    session_duration_secs: SessionDuration,

    /// How long issued tokens remain in the token table.
    #[clap(long, default_value = "14", env = "EXPIRES_IN_DAYS")]
    token_ttl_days: NonZeroU16,

    /// Overrides the region discovered from the environment.
    #[clap(long, env = "AWS_REGION")]
    aws_region: Option<String>,
}

impl Args {
    #[inline]
    pub async fn parse_and_run() -> Result<()> {
        Self::parse().run().await
    }

    pub async fn run(self) -> Result<()> {
        let Self {
            admin,
            client,
            log_level,
            log_format,
            server,
            map_table,
            auth_table,
            role_annotation,
            proxy_image,
            proxy_name,
            proxy_port,
            proxy_cpu_requests,
            proxy_memory_requests,
            proxy_cpu_limits,
            proxy_memory_limits,
            session_duration_secs,
            token_ttl_days,
            aws_region,
        } = self;

        let sidecar = Sidecar {
            name: proxy_name,
            image: proxy_image,
            port: proxy_port,
            requests: Resources {
                cpu: proxy_cpu_requests,
                memory: proxy_memory_requests,
            },
            limits: Resources {
                cpu: proxy_cpu_limits,
                memory: proxy_memory_limits,
            },
        };
        let token_ttl = chrono::Duration::days(token_ttl_days.get().into());

        let mut prom = <Registry>::default();
        let metrics = Metrics::register(prom.sub_registry_with_prefix("iam_broker"));
        let rt_metrics = kubert::RuntimeMetrics::register(prom.sub_registry_with_prefix("kube"));

        let runtime = kubert::Runtime::builder()
            .with_log(log_level, log_format)
            .with_metrics(rt_metrics)
            .with_admin(admin.into_builder().with_prometheus(prom))
            .with_client(client)
            .with_server(server)
            .build()
            .await?;

        let config = aws::load_config(aws_region).await;
        info!(region = ?config.region(), %map_table, %auth_table, "Loaded AWS configuration");
        let store = DynamoStore::new(&config, map_table, auth_table);
        let cluster = Cluster::new(runtime.client(), role_annotation);

        let broker = Broker::new(
            Injector::new(store.clone(), cluster, sidecar, token_ttl),
            Exchange::new(store, StsAssumer::new(&config), session_duration_secs),
            metrics,
        );

        let runtime = runtime.spawn_server(broker);

        // Block the main thread on the shutdown signal.
        if runtime.run().await.is_err() {
            bail!("Aborted");
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let args = Args::try_parse_from(["iam-broker"]).unwrap();
        assert_eq!(args.map_table, "mapped_roles");
        assert_eq!(args.auth_table, "role_perms");
        assert_eq!(args.role_annotation, "eks.amazonaws.com/role-arn");
        assert_eq!(args.proxy_name, "ocp-broker-proxy");
        assert_eq!(args.proxy_port, 53080);
        assert_eq!(args.session_duration_secs, SessionDuration::MIN);
        assert_eq!(args.token_ttl_days.get(), 14);
    }

    #[test]
    fn rejects_invalid_settings() {
        assert!(Args::try_parse_from(["iam-broker", "--session-duration-secs", "60"]).is_err());
        assert!(Args::try_parse_from(["iam-broker", "--session-duration-secs", "43201"]).is_err());
        assert!(Args::try_parse_from(["iam-broker", "--token-ttl-days", "0"]).is_err());
    }

    #[test]
    fn accepts_longer_sessions() {
        let args =
            Args::try_parse_from(["iam-broker", "--session-duration-secs", "3600"]).unwrap();
        assert_eq!(args.session_duration_secs.as_secs(), 3600);
    }

    #[test]
    fn proxy_resources_from_env() {
        // Only this test sets these variables, so `defaults` never observes them.
        std::env::set_var("PROXY_CPU_LIMITS", "50m");
        std::env::set_var("PROXY_MEMORY_REQUESTS", "20Mi");
        let args = Args::try_parse_from(["iam-broker"]);
        std::env::remove_var("PROXY_CPU_LIMITS");
        std::env::remove_var("PROXY_MEMORY_REQUESTS");

        let args = args.unwrap();
        assert_eq!(args.proxy_cpu_limits, "50m");
        assert_eq!(args.proxy_memory_requests, "20Mi");
        assert_eq!(args.proxy_cpu_requests, "1m");
        assert_eq!(args.proxy_memory_limits, "32Mi");

        let args = Args::try_parse_from(["iam-broker", "--proxy-cpu-limits", "100m"]).unwrap();
        assert_eq!(args.proxy_cpu_limits, "100m");
    }
}
