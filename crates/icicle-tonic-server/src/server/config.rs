use std::collections::HashSet;
use std::time::Duration;

use anyhow::bail;
use clap::Parser;
use icicle::{MAX_DATACENTER_ID, MAX_WORKER_ID};

/// Runtime configuration for the `icicle-tonic-server` binary.
///
/// All values are parsed from CLI arguments or environment variables, with
/// defaults suitable for a single-node development setup.
#[derive(Parser, Debug, Clone)]
#[command(
    name = "icicle-tonic-server",
    version,
    about = "A gRPC service handing out time-ordered snowflake ids"
)]
pub struct CliArgs {
    /// Worker ids owned by this process (comma separated).
    ///
    /// Each id is claimed through the coordination service at startup and
    /// gets its own generator. A claim held by another live process is
    /// retried three times, then fatal.
    ///
    /// Environment variable: `WORKER_IDS`
    ///
    /// Default: `0`
    #[arg(long, env = "WORKER_IDS", value_delimiter = ',', default_value = "0")]
    pub worker_ids: Vec<i64>,

    /// Datacenter id of the cluster this process belongs to.
    ///
    /// Every live peer must agree on it; the startup sanity check aborts on
    /// the first peer reporting a different value.
    ///
    /// Environment variable: `DATACENTER_ID`
    ///
    /// Default: `0`
    #[arg(long, env = "DATACENTER_ID", default_value_t = 0)]
    pub datacenter_id: i64,

    /// RPC listen addresses, `"host:port"` (comma separated).
    ///
    /// Each address gets its own listener; the joined list is advertised to
    /// peers and clients through the coordination service.
    ///
    /// Environment variable: `RPC_BIND`
    ///
    /// Default: `127.0.0.1:8080`
    #[arg(long, env = "RPC_BIND", value_delimiter = ',', default_value = "127.0.0.1:8080")]
    pub rpc_bind: Vec<String>,

    /// Parent path under which worker ids are claimed.
    ///
    /// Environment variable: `COORDINATION_PATH`
    ///
    /// Default: `/icicle-servers`
    #[arg(long, env = "COORDINATION_PATH", default_value = "/icicle-servers")]
    pub coordination_path: String,

    /// Coordination session timeout in seconds.
    ///
    /// Environment variable: `SESSION_TIMEOUT`
    ///
    /// Default: `30`
    #[arg(long, env = "SESSION_TIMEOUT", default_value_t = 30)]
    pub session_timeout_secs: u64,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub worker_ids: Vec<i64>,
    pub datacenter_id: i64,
    pub rpc_bind: Vec<String>,
    pub coordination_path: String,
    pub session_timeout: Duration,
}

impl TryFrom<CliArgs> for ServerConfig {
    type Error = anyhow::Error;

    fn try_from(args: CliArgs) -> Result<Self, Self::Error> {
        if args.worker_ids.is_empty() {
            bail!("at least one worker id must be configured");
        }
        let mut seen = HashSet::new();
        for &worker_id in &args.worker_ids {
            if !(0..=MAX_WORKER_ID).contains(&worker_id) {
                bail!("worker id {worker_id} outside 0..={MAX_WORKER_ID}");
            }
            if !seen.insert(worker_id) {
                bail!("worker id {worker_id} configured twice");
            }
        }

        if !(0..=MAX_DATACENTER_ID).contains(&args.datacenter_id) {
            bail!(
                "datacenter id {} outside 0..={MAX_DATACENTER_ID}",
                args.datacenter_id
            );
        }

        if args.rpc_bind.is_empty() {
            bail!("at least one rpc bind address must be configured");
        }

        if !args.coordination_path.starts_with('/') || args.coordination_path.len() < 2 {
            bail!(
                "coordination path {:?} must be absolute and non-root",
                args.coordination_path
            );
        }

        Ok(Self {
            worker_ids: args.worker_ids,
            datacenter_id: args.datacenter_id,
            rpc_bind: args.rpc_bind,
            coordination_path: args.coordination_path,
            session_timeout: Duration::from_secs(args.session_timeout_secs),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> anyhow::Result<ServerConfig> {
        let cli = CliArgs::try_parse_from(
            std::iter::once("icicle-tonic-server").chain(args.iter().copied()),
        )?;
        ServerConfig::try_from(cli)
    }

    #[test]
    fn defaults_are_valid() {
        let config = parse(&[]).unwrap();
        assert_eq!(config.worker_ids, vec![0]);
        assert_eq!(config.datacenter_id, 0);
        assert_eq!(config.rpc_bind, vec!["127.0.0.1:8080"]);
        assert_eq!(config.coordination_path, "/icicle-servers");
        assert_eq!(config.session_timeout, Duration::from_secs(30));
    }

    #[test]
    fn splits_comma_separated_lists() {
        let config = parse(&[
            "--worker-ids",
            "0,3,31",
            "--rpc-bind",
            "10.0.0.1:8080,10.0.0.1:8081",
        ])
        .unwrap();
        assert_eq!(config.worker_ids, vec![0, 3, 31]);
        assert_eq!(config.rpc_bind.len(), 2);
    }

    #[test]
    fn rejects_out_of_range_ids() {
        assert!(parse(&["--worker-ids", "32"]).is_err());
        assert!(parse(&["--worker-ids", "-1"]).is_err());
        assert!(parse(&["--datacenter-id", "32"]).is_err());
    }

    #[test]
    fn rejects_duplicate_worker_ids() {
        let err = parse(&["--worker-ids", "4,4"]).unwrap_err();
        assert!(err.to_string().contains("configured twice"));
    }

    #[test]
    fn rejects_a_relative_coordination_path() {
        assert!(parse(&["--coordination-path", "servers"]).is_err());
        assert!(parse(&["--coordination-path", "/"]).is_err());
    }
}
