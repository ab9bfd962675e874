//! Where the bytes behind a media element live.
//!
//! A resource starts out either local (a file or content URI the host can
//! open) or remote (a URL or a cloud-drive entry). Once both sides are known
//! the two are merged into [`ResourceInfo::Synced`].

use serde::{Deserialize, Serialize};

/// A locally reachable resource.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocalInfo {
    pub uri: String,
}

/// A resource reachable over the network.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "remote", rename_all = "snake_case")]
pub enum RemoteInfo {
    Url {
        url: String,
    },
    Drive {
        uuid: String,
        cloud_path: String,
        drive_type: i32,
    },
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ResourceInfo {
    #[default]
    Empty,
    Local(LocalInfo),
    Remote(RemoteInfo),
    Synced {
        local: LocalInfo,
        remote: RemoteInfo,
    },
}

impl ResourceInfo {
    pub fn local(uri: impl Into<String>) -> Self {
        Self::Local(LocalInfo { uri: uri.into() })
    }

    pub fn url(url: impl Into<String>) -> Self {
        Self::Remote(RemoteInfo::Url { url: url.into() })
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, Self::Empty)
    }

    /// The best locator for loading the resource: local first, then URL.
    ///
    /// Drive entries have no directly loadable locator.
    pub fn model(&self) -> Option<&str> {
        match self {
            Self::Empty => None,
            Self::Local(local) => Some(&local.uri),
            Self::Remote(remote) => remote.url(),
            Self::Synced { local, .. } => Some(&local.uri),
        }
    }

    /// Combine two views of the same resource.
    ///
    /// Returns `None` when the pair cannot describe one resource, e.g. two
    /// different local files.
    pub fn merge(self, other: ResourceInfo) -> Option<ResourceInfo> {
        use ResourceInfo::*;

        match (self, other) {
            (Empty, other) => Some(other),
            (Local(local), Remote(remote)) | (Remote(remote), Local(local)) => {
                Some(Synced { local, remote })
            },
            (Local(local), Synced { remote, .. }) => Some(Synced { local, remote }),
            (Remote(remote), Synced { local, .. }) => Some(Synced { local, remote }),
            (Synced { remote, .. }, Local(local)) => Some(Synced { local, remote }),
            (Synced { local, .. }, Remote(remote)) => Some(Synced { local, remote }),
            (Synced { .. }, other @ Synced { .. }) => Some(other),
            (synced @ Synced { .. }, Empty) => Some(synced),
            _ => None,
        }
    }
}

impl RemoteInfo {
    pub fn url(&self) -> Option<&str> {
        match self {
            Self::Url { url } => Some(url),
            Self::Drive { .. } => None,
        }
    }
}
