use serde::{Deserialize, Serialize};

use crate::ids::RequestId;
use crate::types::RoutingResult;

/// POST /route request.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RouteRequest {
    pub input: String,
}

/// POST /route response — the routing decision plus a request id for
/// correlation in downstream logs.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RouteResponse {
    pub request_id: RequestId,
    #[serde(flatten)]
    pub result: RoutingResult,
}
