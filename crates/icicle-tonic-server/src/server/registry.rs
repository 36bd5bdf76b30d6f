//! Cluster registration and the startup sanity check.
//!
//! Before a process serves ids it must (1) best-effort create the parent
//! path, (2) verify against every live peer that the cluster agrees on the
//! datacenter id and that the local clock sits within ten seconds of the
//! peer mean, and (3) claim each configured worker id with an ephemeral
//! node. The claim node carries the comma-joined bind addresses (which is
//! all the sanity check of later joiners needs), and a sequential member
//! child beneath it carries the JSON peer payload consumed by clients.

use std::time::Duration;

use icicle::{Clock, NANOS_PER_MILLI};
use icicle_coord::{Acl, Coordinator, CreateMode, Error as CoordError};
use icicle_tonic_core::{
    Peer, endpoint_uri,
    proto::{DatacenterIdRequest, TimestampRequest, snowflake_rpc_client::SnowflakeRpcClient},
};
use tokio::time::sleep;

use crate::server::config::ServerConfig;

pub const CLAIM_RETRY_ATTEMPTS: u32 = 3;
pub const CLAIM_RETRY_DELAY: Duration = Duration::from_secs(1);
pub const MAX_PEER_CLOCK_DRIFT: Duration = Duration::from_secs(10);

const MEMBER_PREFIX: &str = "member-";

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("peer worker {worker_id} reports datacenter {peer}, local is {local}")]
    DatacenterMismatch { worker_id: i64, peer: i64, local: i64 },

    #[error("local clock drifts {skew_ms} ms from the peer mean (limit {limit_ms} ms)")]
    ClockDrift { skew_ms: i64, limit_ms: i64 },

    #[error("worker id {worker_id} is already claimed by another process")]
    WorkerClaimConflict { worker_id: i64 },

    #[error("unexpected node {name:?} under {path}")]
    BadWorkerNode { name: String, path: String },

    #[error(transparent)]
    Coordination(#[from] CoordError),

    #[error("peer rpc transport: {0}")]
    PeerTransport(#[from] tonic::transport::Error),

    #[error("peer rpc: {0}")]
    PeerRpc(#[from] tonic::Status),

    #[error("peer payload: {0}")]
    PeerPayload(#[from] serde_json::Error),
}

/// Worker ids this process successfully claimed.
#[derive(Debug)]
pub struct Registration {
    pub claimed: Vec<i64>,
}

/// Runs the whole startup sequence against an open coordination session.
/// Any error is fatal to startup; nothing is rolled back here because the
/// caller exits and the session close reclaims partial claims.
pub async fn register<C>(
    coord: &dyn Coordinator,
    config: &ServerConfig,
    clock: &C,
) -> Result<Registration, Error>
where
    C: Clock,
{
    ensure_parent(coord, &config.coordination_path).await?;
    sanity_check_peers(coord, config, clock).await?;

    let mut claimed = Vec::with_capacity(config.worker_ids.len());
    for &worker_id in &config.worker_ids {
        claim_worker_id(coord, config, worker_id).await?;
        claimed.push(worker_id);
    }
    Ok(Registration { claimed })
}

async fn ensure_parent(coord: &dyn Coordinator, path: &str) -> Result<(), Error> {
    match coord.create(path, &[], CreateMode::Persistent, Acl::WorldAll).await {
        Ok(_) => Ok(()),
        Err(CoordError::NodeExists { .. }) => {
            tracing::debug!(path, "parent path already exists");
            Ok(())
        }
        Err(err) => Err(err.into()),
    }
}

/// Walks the worker-id children of the parent path, dialing the first
/// advertised address of each. Aborts on the first datacenter disagreement;
/// otherwise accumulates peer timestamps and applies the drift gate. With no
/// peers there is nothing to compare against and the check passes.
async fn sanity_check_peers<C>(
    coord: &dyn Coordinator,
    config: &ServerConfig,
    clock: &C,
) -> Result<(), Error>
where
    C: Clock,
{
    let parent = &config.coordination_path;
    let workers = coord.children(parent).await?;

    let mut sum_nanos: i128 = 0;
    let mut peers: i128 = 0;
    for name in workers {
        let worker_id: i64 = name.parse().map_err(|_| Error::BadWorkerNode {
            name: name.clone(),
            path: parent.clone(),
        })?;
        let data = coord.get(&format!("{parent}/{name}")).await?;
        let data = String::from_utf8_lossy(&data);
        let Some(addr) = data.split(',').find(|addr| !addr.is_empty()) else {
            tracing::warn!(worker_id, "peer advertises no rpc address, skipping");
            continue;
        };

        let mut client = SnowflakeRpcClient::connect(endpoint_uri(addr)).await?;

        let peer_datacenter = client
            .datacenter_id(DatacenterIdRequest {})
            .await?
            .into_inner()
            .datacenter_id;
        if peer_datacenter != config.datacenter_id {
            return Err(Error::DatacenterMismatch {
                worker_id,
                peer: peer_datacenter,
                local: config.datacenter_id,
            });
        }

        let peer_nanos = client
            .timestamp(TimestampRequest {})
            .await?
            .into_inner()
            .timestamp_nanos;
        sum_nanos += i128::from(peer_nanos);
        peers += 1;
    }

    if peers == 0 {
        tracing::info!("no live peers, skipping the clock drift check");
        return Ok(());
    }

    let mean_nanos = (sum_nanos / peers) as i64;
    let skew_nanos = (clock.now_nanos() - mean_nanos).abs();
    let limit_nanos = MAX_PEER_CLOCK_DRIFT.as_nanos() as i64;
    if skew_nanos > limit_nanos {
        return Err(Error::ClockDrift {
            skew_ms: skew_nanos / NANOS_PER_MILLI,
            limit_ms: limit_nanos / NANOS_PER_MILLI,
        });
    }

    tracing::info!(
        peers = peers as i64,
        skew_ms = skew_nanos / NANOS_PER_MILLI,
        "peer sanity check passed"
    );
    Ok(())
}

/// Claims one worker id with an ephemeral node. A conflicting claim is
/// retried with a fixed one-second delay, since the previous owner's session
/// may be about to lapse; anything else aborts immediately.
async fn claim_worker_id(
    coord: &dyn Coordinator,
    config: &ServerConfig,
    worker_id: i64,
) -> Result<(), Error> {
    let claim_path = format!("{}/{}", config.coordination_path, worker_id);
    let claim_data = config.rpc_bind.join(",");
    tracing::info!(worker_id, "trying to claim worker id");

    for attempt in 1..=CLAIM_RETRY_ATTEMPTS {
        match coord
            .create(&claim_path, claim_data.as_bytes(), CreateMode::Ephemeral, Acl::WorldAll)
            .await
        {
            Ok(_) => {
                publish_member(coord, &claim_path, config).await?;
                tracing::info!(worker_id, "worker id claimed");
                return Ok(());
            }
            Err(CoordError::NodeExists { .. }) => {
                tracing::warn!(worker_id, attempt, "worker id already claimed, retrying");
                sleep(CLAIM_RETRY_DELAY).await;
            }
            Err(err) => return Err(err.into()),
        }
    }
    Err(Error::WorkerClaimConflict { worker_id })
}

async fn publish_member(
    coord: &dyn Coordinator,
    claim_path: &str,
    config: &ServerConfig,
) -> Result<(), Error> {
    let peer = Peer {
        rpc: config.rpc_bind.clone(),
        thrift: Vec::new(),
    };
    let payload = serde_json::to_vec(&peer)?;
    let member = coord
        .create(
            &format!("{claim_path}/{MEMBER_PREFIX}"),
            &payload,
            CreateMode::EphemeralSequential,
            Acl::WorldAll,
        )
        .await?;
    tracing::debug!(member, "published member node");
    Ok(())
}
