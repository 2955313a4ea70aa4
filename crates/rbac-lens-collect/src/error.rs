//! Error types for collection
//!
//! Any error here is fatal to the run: the graph can't be built without a
//! complete set of raw objects.

use std::path::PathBuf;

use thiserror::Error;

/// Collection errors
#[derive(Debug, Error)]
pub enum Error {
    /// Kubernetes API error
    #[error("kubernetes error: {source}")]
    Kube {
        /// The underlying kube-rs error
        #[from]
        source: kube::Error,
    },

    /// Listing one kind of object failed
    #[error("failed to list {kind}: {source}")]
    List {
        /// Plural kind being listed (e.g. "pods")
        kind: String,
        /// The underlying kube-rs error
        source: kube::Error,
    },

    /// No usable kubeconfig or in-cluster configuration
    #[error("kubeconfig error: {message}")]
    KubeConfig {
        /// Description of what failed
        message: String,
    },

    /// Reading a snapshot file or directory failed
    #[error("failed to read {path}: {source}")]
    Io {
        /// File or directory being read
        path: PathBuf,
        /// The underlying I/O error
        source: std::io::Error,
    },

    /// A snapshot file isn't a valid object list
    #[error("failed to decode {path}: {message}")]
    Decode {
        /// File being decoded
        path: PathBuf,
        /// Description of what's invalid
        message: String,
    },

    /// A snapshot list holds an object of a kind that isn't collected
    #[error("unexpected kind '{kind}' in {path} items[{index}]")]
    UnexpectedKind {
        /// File holding the object
        path: PathBuf,
        /// Position of the object in the list
        index: usize,
        /// The object's kind
        kind: String,
    },

    /// A snapshot directory holds no object lists
    #[error("no object lists (*.json, *.yaml) found in {path}")]
    NoInputFiles {
        /// Snapshot directory
        path: PathBuf,
    },
}

impl Error {
    /// Create a list error for `kind`
    pub fn list(kind: impl Into<String>, source: kube::Error) -> Self {
        Self::List {
            kind: kind.into(),
            source,
        }
    }

    /// Create a kubeconfig error with the given message
    pub fn kube_config(msg: impl Into<String>) -> Self {
        Self::KubeConfig {
            message: msg.into(),
        }
    }

    /// Create an I/O error for `path`
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Create a decode error for `path`
    pub fn decode(path: impl Into<PathBuf>, msg: impl Into<String>) -> Self {
        Self::Decode {
            path: path.into(),
            message: msg.into(),
        }
    }

    /// Create an unexpected kind error
    pub fn unexpected_kind(path: impl Into<PathBuf>, index: usize, kind: impl Into<String>) -> Self {
        Self::UnexpectedKind {
            path: path.into(),
            index,
            kind: kind.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = Error::unexpected_kind("/snap/pods.json", 3, "Deployment");
        assert_eq!(
            err.to_string(),
            "unexpected kind 'Deployment' in /snap/pods.json items[3]"
        );

        let err = Error::decode("/snap/nodes.yaml", "expected a List");
        assert!(err.to_string().contains("nodes.yaml"));
        assert!(err.to_string().contains("expected a List"));

        let err = Error::NoInputFiles {
            path: PathBuf::from("/snap"),
        };
        assert!(err.to_string().contains("/snap"));
    }
}
