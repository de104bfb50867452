use serde::Serialize;

use crate::voting::{VoteOutcome, VoteRejection};

/// Body of every `/api/votes/submit` response. The HTTP status is always
/// 200; the outcome lives here.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VoteResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<VoteResponseData>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VoteResponseData {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_after: Option<u64>,
    /// `Some(None)` serializes as `null`: accepted, count unavailable.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub new_vote_count: Option<Option<i64>>,
}

impl From<VoteOutcome> for VoteResponse {
    fn from(outcome: VoteOutcome) -> Self {
        match outcome {
            VoteOutcome::Accepted { new_vote_count } => Self {
                success: true,
                error: None,
                message: Some("Thanks for voting!"),
                data: Some(VoteResponseData {
                    retry_after: None,
                    new_vote_count: Some(new_vote_count),
                }),
            },
            VoteOutcome::Rejected(rejection) => {
                let data = match rejection {
                    VoteRejection::RateLimited { retry_after_secs } => Some(VoteResponseData {
                        retry_after: Some(retry_after_secs),
                        new_vote_count: None,
                    }),
                    _ => None,
                };
                Self {
                    success: false,
                    error: Some(rejection.code()),
                    message: Some(rejection.message()),
                    data,
                }
            }
        }
    }
}
