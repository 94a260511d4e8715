//! Topic identifiers.
//!
//! Every identifier follows `<domain>.<entity>.<event>.v<version>`.

pub type TopicName = &'static str;

pub const PAYMENTS_HIGH_VALUE_TRANSFER_V1: TopicName = "payments.high_value_payment.transfer.v1";

/// All topics known to this crate.
pub const ALL: &[TopicName] = &[PAYMENTS_HIGH_VALUE_TRANSFER_V1];

/// Check that `name` has the `<domain>.<entity>.<event>.v<version>` shape.
pub fn is_valid(name: &str) -> bool {
    let parts: Vec<&str> = name.split('.').collect();
    let &[domain, entity, event, version] = parts.as_slice() else {
        return false;
    };

    let segment_ok = |s: &str| {
        !s.is_empty()
            && s.chars()
                .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
    };

    let version_ok = version
        .strip_prefix('v')
        .is_some_and(|n| !n.is_empty() && n.chars().all(|c| c.is_ascii_digit()));

    segment_ok(domain) && segment_ok(entity) && segment_ok(event) && version_ok
}
