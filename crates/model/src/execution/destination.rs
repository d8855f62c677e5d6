use serde::{Deserialize, Serialize};
use std::fmt;

/// REST catalog endpoint plus its key/secret pair.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DestinationEndpoint {
    pub id: String,
    pub base_url: String,
    pub consumer_key: String,
    pub consumer_secret: String,
}

impl fmt::Debug for DestinationEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DestinationEndpoint")
            .field("id", &self.id)
            .field("base_url", &self.base_url)
            .field("consumer_key", &"<redacted>")
            .field("consumer_secret", &"<redacted>")
            .finish()
    }
}
