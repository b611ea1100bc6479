//! Audience eligibility for origin-scoped events.

use es_common::OwnerId;

/// Decides whether a subscription owner may receive events raised by an origin
/// (for example, whether a user belongs to the group an event concerns).
pub trait AudienceResolver: Send + Sync {
    fn is_eligible(&self, origin_id: &str, owner: &OwnerId) -> bool;
}

/// Every owner is eligible for every origin
#[derive(Debug, Default, Clone, Copy)]
pub struct OpenAudience;

impl AudienceResolver for OpenAudience {
    fn is_eligible(&self, _origin_id: &str, _owner: &OwnerId) -> bool {
        true
    }
}
