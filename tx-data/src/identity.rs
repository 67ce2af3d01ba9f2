use serde::{Deserialize, Serialize};

use crate::put_bytes;

/// Creator or endorser identity: membership service id plus the certificate bytes
/// issued for it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SerializedIdentity {
    pub msp_id: String,
    pub id_bytes: Vec<u8>,
}

impl SerializedIdentity {
    pub fn new(msp_id: impl Into<String>, id_bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            msp_id: msp_id.into(),
            id_bytes: id_bytes.into(),
        }
    }

    pub fn to_be_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(8 + self.msp_id.len() + self.id_bytes.len());
        put_bytes(&mut buf, self.msp_id.as_bytes());
        put_bytes(&mut buf, &self.id_bytes);
        buf
    }
}
