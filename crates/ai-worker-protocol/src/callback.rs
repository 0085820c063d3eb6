//! Client side of the coordinator's `worker.WorkerCallback` service.
//!
//! Messages mirror `proto/worker.proto`; the client is the unary subset of
//! what `tonic-build` would emit for that file.

use crate::{ProtocolError, Result};
use ai_worker_core::TaskResult;
use std::time::Duration;
use tonic::codec::ProstCodec;
use tonic::codegen::http::uri::PathAndQuery;
use tonic::transport::{Channel, Endpoint};
use tonic::{IntoRequest, Response, Status};

const SEND_RESULT_PATH: &str = "/worker.WorkerCallback/SendResult";

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct TaskResultMessage {
    #[prost(string, tag = "1")]
    pub worker_id: String,
    #[prost(string, tag = "2")]
    pub session_id: String,
    #[prost(string, tag = "3")]
    pub original_query: String,
    #[prost(string, tag = "4")]
    pub ai_response: String,
    #[prost(string, tag = "5")]
    pub api_key: String,
    #[prost(int64, tag = "6")]
    pub processing_time_ms: i64,
    #[prost(int64, tag = "7")]
    pub query_timestamp: i64,
    #[prost(int64, tag = "8")]
    pub completion_timestamp: i64,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ResultAck {
    #[prost(bool, tag = "1")]
    pub success: bool,
    #[prost(string, tag = "2")]
    pub message: String,
}

impl From<TaskResult> for TaskResultMessage {
    fn from(result: TaskResult) -> Self {
        TaskResultMessage {
            worker_id: result.worker_id,
            session_id: result.session_id,
            original_query: result.original_query,
            ai_response: result.ai_response,
            api_key: result.api_key,
            processing_time_ms: result.processing_time_ms,
            query_timestamp: result.query_timestamp,
            completion_timestamp: result.completion_timestamp,
        }
    }
}

/// Turn a bare `host:port` into a plaintext HTTP/2 URI
pub fn endpoint_uri(endpoint: &str) -> String {
    if endpoint.contains("://") {
        endpoint.to_string()
    } else {
        format!("http://{}", endpoint)
    }
}

#[derive(Debug, Clone)]
pub struct WorkerCallbackClient {
    inner: tonic::client::Grpc<Channel>,
}

impl WorkerCallbackClient {
    pub fn new(channel: Channel) -> Self {
        WorkerCallbackClient {
            inner: tonic::client::Grpc::new(channel),
        }
    }

    /// Dial the callback service, bounding both connect and each call
    pub async fn connect(endpoint: &str, timeout: Duration) -> Result<Self> {
        let channel = Endpoint::from_shared(endpoint_uri(endpoint))
            .map_err(|e| ProtocolError::InvalidEndpoint(format!("{}: {}", endpoint, e)))?
            .connect_timeout(timeout)
            .timeout(timeout)
            .connect()
            .await?;

        Ok(Self::new(channel))
    }

    pub async fn send_result(
        &mut self,
        request: impl IntoRequest<TaskResultMessage>,
    ) -> std::result::Result<Response<ResultAck>, Status> {
        self.inner
            .ready()
            .await
            .map_err(|e| Status::unknown(format!("Service was not ready: {}", e)))?;

        let codec: ProstCodec<TaskResultMessage, ResultAck> = ProstCodec::default();
        let path = PathAndQuery::from_static(SEND_RESULT_PATH);
        self.inner.unary(request.into_request(), path, codec).await
    }
}
