//! The `SnowflakeRpc` service implementation.
//!
//! One generator per owned worker id, all sharing the injected clock.
//! `NextId` distinguishes a worker id that is out of range
//! (`InvalidArgument`) from one that is valid but not owned by this process
//! (`NotFound`); generator failures pass through as `FailedPrecondition`.

use std::collections::HashMap;
use std::sync::Arc;

use icicle::{Clock, IdGenerator, MAX_WORKER_ID, SystemClock};
use icicle_tonic_core::{
    Error, PING_STATUS_OK,
    proto::{
        DatacenterIdReply, DatacenterIdRequest, NextIdReply, NextIdRequest, PingReply,
        PingRequest, TimestampReply, TimestampRequest, snowflake_rpc_server::SnowflakeRpc,
    },
};
use tonic::{Request, Response, Status};

/// Serves ids for the worker ids this process claimed.
#[derive(Clone)]
pub struct SnowflakeService<C = SystemClock> {
    datacenter_id: i64,
    clock: C,
    workers: Arc<HashMap<i64, IdGenerator<C>>>,
}

impl<C> SnowflakeService<C>
where
    C: Clock + Clone,
{
    /// Builds one generator per worker id. Range errors from the generator
    /// constructor surface here; worker ids are assumed deduplicated by
    /// config validation.
    pub fn new(worker_ids: &[i64], datacenter_id: i64, clock: C) -> icicle::Result<Self> {
        let mut workers = HashMap::with_capacity(worker_ids.len());
        for &worker_id in worker_ids {
            workers.insert(
                worker_id,
                IdGenerator::new(worker_id, datacenter_id, clock.clone())?,
            );
        }
        Ok(Self {
            datacenter_id,
            clock,
            workers: Arc::new(workers),
        })
    }

}

#[tonic::async_trait]
impl<C> SnowflakeRpc for SnowflakeService<C>
where
    C: Clock + Clone + Send + Sync + 'static,
{
    async fn next_id(
        &self,
        request: Request<NextIdRequest>,
    ) -> Result<Response<NextIdReply>, Status> {
        let worker_id = request.get_ref().worker_id;
        if !(0..=MAX_WORKER_ID).contains(&worker_id) {
            return Err(Error::InvalidWorker { worker_id }.into());
        }
        let Some(worker) = self.workers.get(&worker_id) else {
            tracing::warn!(worker_id, "next id requested for an unregistered worker");
            return Err(Error::UnknownWorker { worker_id }.into());
        };
        let id = worker.next_id().map_err(Error::from)?;
        Ok(Response::new(NextIdReply { id: id.into_raw() }))
    }

    async fn datacenter_id(
        &self,
        _request: Request<DatacenterIdRequest>,
    ) -> Result<Response<DatacenterIdReply>, Status> {
        Ok(Response::new(DatacenterIdReply {
            datacenter_id: self.datacenter_id,
        }))
    }

    async fn timestamp(
        &self,
        _request: Request<TimestampRequest>,
    ) -> Result<Response<TimestampReply>, Status> {
        Ok(Response::new(TimestampReply {
            timestamp_nanos: self.clock.now_nanos(),
        }))
    }

    async fn ping(&self, _request: Request<PingRequest>) -> Result<Response<PingReply>, Status> {
        Ok(Response::new(PingReply {
            status: PING_STATUS_OK,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use icicle::SnowflakeId;
    use tonic::Code;

    fn service() -> SnowflakeService {
        SnowflakeService::new(&[0, 5], 3, SystemClock).unwrap()
    }

    #[tokio::test]
    async fn issues_ids_for_owned_workers() {
        let service = service();
        let reply = service
            .next_id(Request::new(NextIdRequest { worker_id: 5 }))
            .await
            .unwrap();
        let id = SnowflakeId::from_raw(reply.get_ref().id);
        assert_eq!(id.worker_id(), 5);
        assert_eq!(id.datacenter_id(), 3);
    }

    #[tokio::test]
    async fn unknown_worker_is_not_found() {
        let status = service()
            .next_id(Request::new(NextIdRequest { worker_id: 9 }))
            .await
            .unwrap_err();
        assert_eq!(status.code(), Code::NotFound);
    }

    #[tokio::test]
    async fn out_of_range_worker_is_invalid_argument() {
        let service = service();
        for worker_id in [-1, MAX_WORKER_ID + 1] {
            let status = service
                .next_id(Request::new(NextIdRequest { worker_id }))
                .await
                .unwrap_err();
            assert_eq!(status.code(), Code::InvalidArgument);
        }
    }

    #[tokio::test]
    async fn reports_datacenter_time_and_liveness() {
        let service = service();
        let reply = service
            .datacenter_id(Request::new(DatacenterIdRequest {}))
            .await
            .unwrap();
        assert_eq!(reply.get_ref().datacenter_id, 3);

        let before = SystemClock.now_nanos();
        let reply = service.timestamp(Request::new(TimestampRequest {})).await.unwrap();
        assert!(reply.get_ref().timestamp_nanos >= before);

        let reply = service.ping(Request::new(PingRequest {})).await.unwrap();
        assert_eq!(reply.get_ref().status, PING_STATUS_OK);
    }

    #[test]
    fn rejects_out_of_range_construction() {
        assert!(SnowflakeService::new(&[0], 32, SystemClock).is_err());
        assert!(SnowflakeService::new(&[32], 0, SystemClock).is_err());
    }
}
