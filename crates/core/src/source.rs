use async_trait::async_trait;

use crate::dom::Element;
use crate::error::PollError;

/// Where table fragments come from. The poller only sees this trait;
/// the HTTP implementation lives in the client crate and tests use
/// in-memory sources.
#[async_trait]
pub trait FragmentSource: Send + Sync {
    /// Fetches the current fragment and returns its root table element.
    async fn fetch_fragment(&self) -> Result<Element, PollError>;
}
