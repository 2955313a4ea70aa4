//! Cluster metadata helpers

use rbac_lens_graph::ClusterVersion;

/// Managed platform a server git version belongs to: `eks`, `gke`, or empty
pub fn platform_from_version(git_version: &str) -> &'static str {
    if git_version.contains("-eks-") {
        "eks"
    } else if git_version.contains("-gke.") {
        "gke"
    } else {
        ""
    }
}

/// Whether `version` is at least `major.minor`.
///
/// Managed platforms report minors like `29+`; the suffix is ignored. An
/// unparsable version is never at least anything.
pub fn version_at_least(version: &ClusterVersion, major: u32, minor: u32) -> bool {
    let parse = |s: &str| -> Option<u32> {
        s.trim_end_matches(|c: char| !c.is_ascii_digit()).parse().ok()
    };
    match (parse(&version.major), parse(&version.minor)) {
        (Some(have_major), Some(have_minor)) => (have_major, have_minor) >= (major, minor),
        _ => false,
    }
}
