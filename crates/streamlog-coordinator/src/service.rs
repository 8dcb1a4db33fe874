//! gRPC Coordinator Service
//!
//! `PollAssignment` is the consumer's single periodic call: it joins the
//! group (refreshing the heartbeat and subscriptions), triggers any due
//! rebalance, and returns the member's current assignments together with
//! the interval the client should poll at.

use std::sync::Arc;

use streamlog_proto::streamlog::coordinator_server::Coordinator as CoordinatorRpc;
use streamlog_proto::streamlog::{
    CommitOffsetRequest, CommitOffsetResponse, ErrorCode, GetCommittedOffsetRequest,
    GetCommittedOffsetResponse, PartitionAssignment as PbPartitionAssignment,
    PollAssignmentRequest, PollAssignmentResponse,
};
use tonic::{Request, Response, Status};
use tracing::debug;

use crate::error::Error;
use crate::group::GroupManager;

/// tonic service wrapping the group manager
pub struct CoordinatorService {
    groups: Arc<GroupManager>,
    heartbeat_interval_ms: i32,
}

impl CoordinatorService {
    pub fn new(groups: Arc<GroupManager>, heartbeat_interval_ms: i32) -> Self {
        Self {
            groups,
            heartbeat_interval_ms,
        }
    }
}

#[tonic::async_trait]
impl CoordinatorRpc for CoordinatorService {
    async fn poll_assignment(
        &self,
        request: Request<PollAssignmentRequest>,
    ) -> Result<Response<PollAssignmentResponse>, Status> {
        let req = request.into_inner();
        if req.group_id.is_empty() || req.member_id.is_empty() {
            return Ok(Response::new(PollAssignmentResponse {
                assignments: Vec::new(),
                heartbeat_interval_ms: self.heartbeat_interval_ms,
                error_code: ErrorCode::InvalidArgument as i32,
                error_message: "group_id and member_id are required".to_string(),
            }));
        }

        // Join doubles as heartbeat and rebalance trigger
        if let Err(e) = self
            .groups
            .join_group(&req.group_id, &req.member_id, req.topics)
            .await
        {
            return Ok(Response::new(PollAssignmentResponse {
                assignments: Vec::new(),
                heartbeat_interval_ms: self.heartbeat_interval_ms,
                error_code: code_for(&e) as i32,
                error_message: e.to_string(),
            }));
        }

        let assignments = match self
            .groups
            .get_assignments(&req.group_id, &req.member_id)
            .await
        {
            Ok(assignments) => assignments,
            Err(e) => {
                return Ok(Response::new(PollAssignmentResponse {
                    assignments: Vec::new(),
                    heartbeat_interval_ms: self.heartbeat_interval_ms,
                    error_code: code_for(&e) as i32,
                    error_message: e.to_string(),
                }));
            }
        };

        debug!(
            group_id = %req.group_id,
            member_id = %req.member_id,
            assignments = assignments.len(),
            "assignment polled"
        );

        Ok(Response::new(PollAssignmentResponse {
            assignments: assignments
                .into_iter()
                .map(|a| PbPartitionAssignment {
                    topic: a.topic,
                    partitions: a.partitions,
                })
                .collect(),
            heartbeat_interval_ms: self.heartbeat_interval_ms,
            error_code: ErrorCode::Ok as i32,
            error_message: String::new(),
        }))
    }

    async fn commit_offset(
        &self,
        request: Request<CommitOffsetRequest>,
    ) -> Result<Response<CommitOffsetResponse>, Status> {
        let req = request.into_inner();
        let response = match self
            .groups
            .commit_offset(&req.group_id, &req.topic, req.partition, req.offset)
            .await
        {
            Ok(()) => CommitOffsetResponse {
                error_code: ErrorCode::Ok as i32,
                error_message: String::new(),
            },
            Err(e) => CommitOffsetResponse {
                error_code: code_for(&e) as i32,
                error_message: e.to_string(),
            },
        };
        Ok(Response::new(response))
    }

    async fn get_committed_offset(
        &self,
        request: Request<GetCommittedOffsetRequest>,
    ) -> Result<Response<GetCommittedOffsetResponse>, Status> {
        let req = request.into_inner();
        let response = match self
            .groups
            .get_committed_offset(&req.group_id, &req.topic, req.partition)
            .await
        {
            Ok(offset) => GetCommittedOffsetResponse {
                offset,
                error_code: ErrorCode::Ok as i32,
                error_message: String::new(),
            },
            Err(e) => GetCommittedOffsetResponse {
                offset: 0,
                error_code: code_for(&e) as i32,
                error_message: e.to_string(),
            },
        };
        Ok(Response::new(response))
    }
}

fn code_for(error: &Error) -> ErrorCode {
    match error {
        Error::GroupNotFound(_) | Error::MemberNotFound(_) => ErrorCode::NotFound,
    }
}
