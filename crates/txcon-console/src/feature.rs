//! The contract every application feature implements.

use std::sync::Arc;
use txcon_arena::Arena;

/// Return code of a feature, `0` when healthy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FeatureStatus {
    pub return_code: i32,
}

impl FeatureStatus {
    /// A feature that defined itself without error.
    pub const OK: FeatureStatus = FeatureStatus { return_code: 0 };

    pub const fn new(return_code: i32) -> Self {
        FeatureStatus { return_code }
    }

    pub fn is_ok(&self) -> bool {
        self.return_code == 0
    }
}

/// A unit of the application brought up at start-up.
///
/// Features are defined once, in table order, from the shared [`Arena`].
/// `define` follows a best-effort policy: failures are logged and recorded
/// for [`get_status`](Feature::get_status) rather than returned.
pub trait Feature: Send + Sync {
    /// Name shown in status listings.
    fn name(&self) -> &str;

    /// Bring the feature up using memory from `arena`.
    fn define(&self, arena: &Arc<Arena>);

    /// Current status of the feature.
    fn get_status(&self) -> FeatureStatus;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status() {
        assert!(FeatureStatus::OK.is_ok());
        assert!(!FeatureStatus::new(9).is_ok());
    }
}
