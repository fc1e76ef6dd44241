//! iSCSI target registration script.

use crate::script_traits::ScriptArgs;

/// Usage: target.sh USER VOLUME CREATE SIZE
///
/// Creates the volume when CREATE is `true` (an existing volume is fine),
/// takes the first unused target id, registers the target, attaches the
/// volume as LUN 1, sets vendor metadata and binds it to all initiators.
pub const TARGET: &str = r#"#!/usr/bin/env bash

g_user=$1
g_volume=$2
g_create=$3
g_size=$4
g_tid=1
g_image=cbd:pool/${g_volume}_${g_user}_
g_image_md5=$(echo -n ${g_image} | md5sum | awk '{ print $1 }')
g_targetname=iqn.$(date +"%Y-%m").com.opencurve:curve.${g_image_md5}

mkdir -p /curvebs/nebd/data/lock
touch /etc/curve/curvetab

if [ $g_create == "true" ]; then
    output=$(curve_ops_tool create -userName=$g_user -fileName=$g_volume -fileLength=$g_size)
    if [ $? -ne 0 ]; then
        if [ "$output" != "CreateFile fail with errCode: 101" ]; then
            exit 1
        fi
    fi
fi

for ((i=1;;i++)); do
    tgtadm --lld iscsi --mode target --op show --tid $i 1>/dev/null 2>&1
    if [ $? -ne 0 ]; then
        g_tid=$i
        break
    fi
done

tgtadm --lld iscsi \
   --mode target \
   --op new \
   --tid ${g_tid} \
   --targetname ${g_targetname}

tgtadm --lld iscsi \
    --mode logicalunit \
    --op new \
    --tid ${g_tid} \
    --lun 1 \
    --bstype curve \
    --backing-store ${g_image}

tgtadm --lld iscsi \
    --mode logicalunit \
    --op update \
    --tid ${g_tid} \
    --lun 1 \
    --params vendor_id=NetEase,product_id=CurveVolume,product_rev=2.0

tgtadm --lld iscsi \
    --mode target \
    --op bind \
    --tid ${g_tid} \
    -I ALL
"#;

/// Type-safe arguments for `target.sh`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetArgs {
    pub user: String,
    pub volume: String,
    /// Create the volume before registering it.
    pub create: bool,
    /// Volume size in GiB, used only with `create`.
    pub size: u64,
}

impl ScriptArgs for TargetArgs {
    fn to_cli_args(&self) -> Vec<String> {
        vec![
            self.user.clone(),
            self.volume.clone(),
            self.create.to_string(),
            self.size.to_string(),
        ]
    }

    fn script_name(&self) -> &'static str {
        "target.sh"
    }

    fn script(&self) -> &'static str {
        TARGET
    }
}
