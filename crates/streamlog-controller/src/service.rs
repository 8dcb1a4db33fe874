//! gRPC Controller Service
//!
//! Topic metadata RPCs plus leader lookup. Every partition's replica set and
//! leader is the single configured broker.

use std::sync::Arc;

use streamlog_proto::streamlog::controller_server::Controller as ControllerRpc;
use streamlog_proto::streamlog::{
    CreateTopicRequest, CreateTopicResponse, DescribeTopicRequest, DescribeTopicResponse,
    ErrorCode, FindLeaderRequest, FindLeaderResponse, ListTopicsRequest, ListTopicsResponse,
    PartitionMetadata,
};
use tonic::{Request, Response, Status};

use crate::error::Error;
use crate::topics::TopicManager;

/// Advertised location of the (single) broker
#[derive(Debug, Clone)]
pub struct BrokerLocation {
    pub broker_id: i32,
    pub host: String,
    pub port: u16,
}

/// tonic service wrapping the topic table
pub struct ControllerService {
    topics: Arc<TopicManager>,
    broker: BrokerLocation,
}

impl ControllerService {
    pub fn new(topics: Arc<TopicManager>, broker: BrokerLocation) -> Self {
        Self { topics, broker }
    }
}

#[tonic::async_trait]
impl ControllerRpc for ControllerService {
    async fn create_topic(
        &self,
        request: Request<CreateTopicRequest>,
    ) -> Result<Response<CreateTopicResponse>, Status> {
        let req = request.into_inner();
        let response = match self
            .topics
            .create_topic(&req.topic, req.partitions, req.replication_factor)
            .await
        {
            Ok(()) => CreateTopicResponse {
                success: true,
                error_code: ErrorCode::Ok as i32,
                error_message: String::new(),
            },
            Err(e) => CreateTopicResponse {
                success: false,
                error_code: code_for(&e) as i32,
                error_message: e.to_string(),
            },
        };
        Ok(Response::new(response))
    }

    async fn describe_topic(
        &self,
        request: Request<DescribeTopicRequest>,
    ) -> Result<Response<DescribeTopicResponse>, Status> {
        let req = request.into_inner();
        let response = match self.topics.get_topic(&req.topic).await {
            Ok(info) => DescribeTopicResponse {
                topic: info.name,
                partitions: (0..info.partitions)
                    .map(|partition| PartitionMetadata {
                        partition,
                        replicas: vec![self.broker.broker_id],
                        leader: self.broker.broker_id,
                    })
                    .collect(),
                error_code: ErrorCode::Ok as i32,
                error_message: String::new(),
            },
            Err(e) => DescribeTopicResponse {
                topic: req.topic,
                partitions: Vec::new(),
                error_code: code_for(&e) as i32,
                error_message: e.to_string(),
            },
        };
        Ok(Response::new(response))
    }

    async fn list_topics(
        &self,
        _request: Request<ListTopicsRequest>,
    ) -> Result<Response<ListTopicsResponse>, Status> {
        Ok(Response::new(ListTopicsResponse {
            topics: self.topics.list_topics().await,
        }))
    }

    async fn find_leader(
        &self,
        request: Request<FindLeaderRequest>,
    ) -> Result<Response<FindLeaderResponse>, Status> {
        let req = request.into_inner();
        let response = match self.topics.get_topic(&req.topic).await {
            Ok(info) if req.partition >= 0 && req.partition < info.partitions => {
                FindLeaderResponse {
                    leader_broker_id: self.broker.broker_id,
                    host: self.broker.host.clone(),
                    port: self.broker.port as u32,
                    error_code: ErrorCode::Ok as i32,
                    error_message: String::new(),
                }
            }
            Ok(info) => FindLeaderResponse {
                leader_broker_id: -1,
                host: String::new(),
                port: 0,
                error_code: ErrorCode::NotFound as i32,
                error_message: format!(
                    "partition {} out of range for topic {} ({} partitions)",
                    req.partition, info.name, info.partitions
                ),
            },
            Err(e) => FindLeaderResponse {
                leader_broker_id: -1,
                host: String::new(),
                port: 0,
                error_code: code_for(&e) as i32,
                error_message: e.to_string(),
            },
        };
        Ok(Response::new(response))
    }
}

fn code_for(error: &Error) -> ErrorCode {
    match error {
        Error::TopicAlreadyExists(_) => ErrorCode::AlreadyExists,
        Error::TopicNotFound(_) => ErrorCode::NotFound,
        Error::InvalidArgument(_) => ErrorCode::InvalidArgument,
    }
}
