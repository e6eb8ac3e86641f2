use serde::{Deserialize, Serialize};
use std::net::IpAddr;

#[derive(Deserialize, Debug, Clone, Default, Ord, PartialOrd, Eq, PartialEq)]
pub(super) struct UpdateRecordRequest {
    pub token: String,
    pub hostname: String,
    pub ip: Option<IpAddr>,
}

#[derive(Serialize, Debug, Clone, Ord, PartialOrd, Eq, PartialEq)]
pub(super) struct UpdateRecordResult {
    pub hostname: String,
    pub ip: IpAddr,
}

#[derive(Serialize, Debug, Clone, Default, Ord, PartialOrd, Eq, PartialEq)]
pub(super) struct TokenResult {
    pub token: String,
}
