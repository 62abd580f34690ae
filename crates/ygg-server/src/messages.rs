use serde::{Deserialize, Serialize};
use ygg_types::{Errno, KeyValue, NodeId, Peer, Range, Region, RegionId, DATA_CF};

/// Error slot carried by every response; `None` means success.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorInfo {
    pub errcode: Errno,
    pub errmsg: String,
}

/// Addressing shared by all KV requests. An empty `cf_name` means the
/// default data partition.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RequestContext {
    pub region_id: RegionId,
    #[serde(default)]
    pub cf_name: String,
}

impl RequestContext {
    pub fn new(region_id: RegionId) -> Self {
        RequestContext { region_id, cf_name: String::new() }
    }

    pub fn with_cf_name(mut self, cf_name: impl Into<String>) -> Self {
        self.cf_name = cf_name.into();
        self
    }

    pub fn cf_name(&self) -> &str {
        if self.cf_name.is_empty() {
            DATA_CF
        } else {
            &self.cf_name
        }
    }
}

// ---------------------------------------------------------------------------
// Region control
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AddRegionRequest {
    pub region: Region,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AddRegionResponse {
    pub error: Option<ErrorInfo>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChangeRegionRequest {
    pub region_id: RegionId,
    pub peers: Vec<Peer>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChangeRegionResponse {
    pub error: Option<ErrorInfo>,
    pub region: Option<Region>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DestroyRegionRequest {
    pub region_id: RegionId,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DestroyRegionResponse {
    pub error: Option<ErrorInfo>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegionStatusRequest {
    pub region_id: RegionId,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RegionStatusResponse {
    pub error: Option<ErrorInfo>,
    pub region: Option<Region>,
    pub is_leader: bool,
    pub leader_id: Option<NodeId>,
    pub term: u64,
    pub last_error: Option<String>,
}

// ---------------------------------------------------------------------------
// Key-value
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KvGetRequest {
    pub context: RequestContext,
    pub key: Vec<u8>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct KvGetResponse {
    pub error: Option<ErrorInfo>,
    pub value: Option<Vec<u8>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KvBatchGetRequest {
    pub context: RequestContext,
    pub keys: Vec<Vec<u8>>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct KvBatchGetResponse {
    pub error: Option<ErrorInfo>,
    pub kvs: Vec<KeyValue>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KvScanRequest {
    pub context: RequestContext,
    pub range: Range,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct KvScanResponse {
    pub error: Option<ErrorInfo>,
    pub kvs: Vec<KeyValue>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KvPutRequest {
    pub context: RequestContext,
    pub kvs: Vec<KeyValue>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct KvPutResponse {
    pub error: Option<ErrorInfo>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KvPutIfAbsentRequest {
    pub context: RequestContext,
    pub kvs: Vec<KeyValue>,
    /// All keys or none.
    pub atomic: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct KvPutIfAbsentResponse {
    pub error: Option<ErrorInfo>,
    pub put_keys: Vec<Vec<u8>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KvDeleteRequest {
    pub context: RequestContext,
    pub keys: Vec<Vec<u8>>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct KvDeleteResponse {
    pub error: Option<ErrorInfo>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KvDeleteRangeRequest {
    pub context: RequestContext,
    pub range: Range,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct KvDeleteRangeResponse {
    pub error: Option<ErrorInfo>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KvCompareAndSetRequest {
    pub context: RequestContext,
    pub kv: KeyValue,
    /// Empty means the key must be absent.
    pub expect_value: Vec<u8>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct KvCompareAndSetResponse {
    pub error: Option<ErrorInfo>,
    pub success: bool,
}
