//! Application dispatch collaborator seam.
//!
//! When a tag is discovered the service hands a summary of it to the
//! dispatcher, which routes it to whatever application should receive it.
//! Dispatch internals (intent resolution, foreground registration payloads)
//! live outside this crate.

use chrono::{DateTime, Utc};
use nearfield_core::{TagHandle, TagTechnology};
use nearfield_driver::TargetInfo;
use tracing::info;

/// Summary of a discovered tag handed to the dispatcher.
#[derive(Debug, Clone)]
pub struct DiscoveredTag {
    /// Handle callers use for follow-up operations.
    pub handle: TagHandle,

    /// Target unique identifier.
    pub uid: Vec<u8>,

    /// Technologies the tag supports.
    pub tech_list: Vec<TagTechnology>,

    /// Technology-specific activation bytes from discovery.
    pub activation_bytes: Vec<u8>,

    /// When the tag was discovered.
    pub discovered_at: DateTime<Utc>,
}

impl DiscoveredTag {
    pub(crate) fn new(handle: TagHandle, target: &TargetInfo) -> Self {
        Self {
            handle,
            uid: target.uid.clone(),
            tech_list: vec![target.technology],
            activation_bytes: target.poll_bytes.clone(),
            discovered_at: Utc::now(),
        }
    }

    /// Get the UID as a hexadecimal string.
    pub fn uid_hex(&self) -> String {
        self.uid
            .iter()
            .map(|b| format!("{:02X}", b))
            .collect::<Vec<_>>()
            .join("")
    }
}

/// Application dispatch collaborator.
pub trait TagDispatcher: Send + Sync {
    /// Deliver a discovered tag to applications.
    ///
    /// Returns `true` when some application accepted the tag; on `false` the
    /// service unregisters the session again and signals an error cue.
    fn dispatch_tag(&self, tag: &DiscoveredTag) -> bool;

    /// Drop any foreground dispatch registration.
    ///
    /// Called on the disable path so a foreground application cannot keep a
    /// registration against a powered-down reader.
    fn clear_foreground_dispatch(&self) {}
}

/// Dispatcher that accepts every tag and logs it.
#[derive(Debug, Default)]
pub struct LogDispatcher;

impl TagDispatcher for LogDispatcher {
    fn dispatch_tag(&self, tag: &DiscoveredTag) -> bool {
        info!(handle = %tag.handle, uid = %tag.uid_hex(), "dispatching tag");
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_discovered_tag_uid_hex() {
        let target = TargetInfo::new(vec![0x01, 0x02], TagTechnology::NfcF, vec![]).unwrap();
        let tag = DiscoveredTag::new(TagHandle::new(1), &target);
        assert_eq!(tag.uid_hex(), "0102");
        assert_eq!(tag.tech_list, vec![TagTechnology::NfcF]);
    }
}
