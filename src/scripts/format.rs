//! Chunkfile pool format driver.

use crate::config::Layout;
use crate::script_traits::ScriptArgs;

/// Size of one preallocated chunkfile (16 MiB).
pub const DEFAULT_CHUNKFILE_SIZE: u64 = 16 * 1024 * 1024;

/// Usage: format.sh BINARY PERCENT CHUNKFILE_SIZE POOL_DIR POOL_META_PATH
pub const FORMAT: &str = r#"#!/usr/bin/env bash

g_binary_path=$1
g_percent=$2
g_chunkfile_size=$3
g_chunkfile_pool_dir=$4
g_chunkfile_pool_meta_path=$5

mkdir -p $g_chunkfile_pool_dir
$g_binary_path \
    -allocatePercent=$g_percent \
    -fileSize=$g_chunkfile_size \
    -filePoolDir=$g_chunkfile_pool_dir \
    -filePoolMetaPath=$g_chunkfile_pool_meta_path \
    -fileSystemPath=$g_chunkfile_pool_dir
"#;

/// Type-safe arguments for `format.sh`.
///
/// | Position | Field |
/// |----------|-------|
/// | `$1` | `binary_path` |
/// | `$2` | `usage_percent` |
/// | `$3` | `chunkfile_size` |
/// | `$4` | `pool_dir` |
/// | `$5` | `pool_meta_path` |
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormatArgs {
    pub binary_path: String,
    pub usage_percent: u8,
    pub chunkfile_size: u64,
    pub pool_dir: String,
    pub pool_meta_path: String,
}

impl FormatArgs {
    /// Arguments for formatting into the pool described by `layout`.
    pub fn new(layout: &Layout, usage_percent: u8) -> Self {
        Self {
            binary_path: layout.format_binary_path.clone(),
            usage_percent,
            chunkfile_size: DEFAULT_CHUNKFILE_SIZE,
            pool_dir: layout.chunkfile_pool_dir.clone(),
            pool_meta_path: layout.chunkfile_pool_meta_path.clone(),
        }
    }
}

impl ScriptArgs for FormatArgs {
    fn to_cli_args(&self) -> Vec<String> {
        vec![
            self.binary_path.clone(),
            self.usage_percent.to_string(),
            self.chunkfile_size.to_string(),
            self.pool_dir.clone(),
            self.pool_meta_path.clone(),
        ]
    }

    fn script_name(&self) -> &'static str {
        "format.sh"
    }

    fn script(&self) -> &'static str {
        FORMAT
    }
}
