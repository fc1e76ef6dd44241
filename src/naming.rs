//! Deterministic names derived from content hashes.
//!
//! External tooling relies on these exact formats; do not change them.

use chrono::NaiveDate;
use md5::{Digest, Md5};

/// Prefix of chunkfile pool format containers.
pub const FORMAT_CONTAINER_PREFIX: &str = "curvebs-format-";

/// Lowercase hex MD5 of `input`.
pub fn md5_hex(input: &str) -> String {
    let mut hasher = Md5::new();
    hasher.update(input.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Name of the container that formats `device`.
///
/// Every submission for the same device resolves to the same name, which is
/// how a repeated or concurrent submission detects earlier work.
pub fn format_container_name(device: &str) -> String {
    format!("{}{}", FORMAT_CONTAINER_PREFIX, md5_hex(device))
}

/// Backing-store image string for a volume.
pub fn target_image(user: &str, volume: &str) -> String {
    format!("cbd:pool/{}_{}_", volume, user)
}

/// iSCSI target name registered for a volume in the month of `date`.
pub fn target_name(user: &str, volume: &str, date: NaiveDate) -> String {
    format!(
        "iqn.{}.com.opencurve:curve.{}",
        date.format("%Y-%m"),
        md5_hex(&target_image(user, volume))
    )
}
