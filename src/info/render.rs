//! Human-readable rendering of snapshot records

use super::record::{BurstBufferInfo, BurstBufferInfoMsg, ReservationInfo};
use super::size::format_size;
use std::fmt::Write;

const NULL_FIELD: &str = "(null)";

fn separator(one_liner: bool) -> &'static str {
    if one_liner {
        " "
    } else {
        "\n  "
    }
}

/// Render every record of a decoded snapshot
pub fn render_msg(msg: &BurstBufferInfoMsg, one_liner: bool) -> String {
    if msg.records.is_empty() {
        return "No burst buffer information available\n".to_string();
    }
    msg.records
        .iter()
        .map(|record| render_record(record, one_liner))
        .collect()
}

/// Render one backend record followed by its reservations
pub fn render_record(info: &BurstBufferInfo, one_liner: bool) -> String {
    let sep = separator(one_liner);
    let field = |value: &Option<String>| value.clone().unwrap_or_else(|| NULL_FIELD.to_string());
    let mut out = String::new();

    let _ = write!(
        out,
        "Name={} StagedInPrioBoost={}{}",
        info.name, info.prio_boost, sep
    );
    let _ = write!(
        out,
        "TotalSpace={} JobSizeLimit={} UserSizeLimit={}{}",
        format_size(info.total_space),
        format_size(info.job_size_limit),
        format_size(info.user_size_limit),
        sep
    );

    if let Some(allow) = &info.allow_users {
        let _ = write!(out, "AllowUsers={}{}", allow, sep);
    } else if let Some(deny) = &info.deny_users {
        let _ = write!(out, "DenyUsers={}{}", deny, sep);
    }

    let _ = write!(out, "GetSysState={}{}", field(&info.get_sys_state), sep);
    let _ = write!(out, "StartStageIn={}{}", field(&info.start_stage_in), sep);
    let _ = write!(out, "StartStageOut={}{}", field(&info.start_stage_out), sep);
    let _ = write!(out, "StopStageIn={}{}", field(&info.stop_stage_in), sep);
    let _ = writeln!(out, "StopStageOut={}", field(&info.stop_stage_out));

    for resv in &info.reservations {
        out.push_str(&render_reservation(resv));
    }
    out
}

/// Render one reservation line
pub fn render_reservation(resv: &ReservationInfo) -> String {
    let mut out = String::new();
    match (&resv.name, resv.array_task_id) {
        (Some(name), _) => {
            let _ = write!(out, "    Name={} ", name);
        }
        (None, None) => {
            let _ = write!(out, "    JobID={} ", resv.job_id);
        }
        (None, Some(task)) => {
            let _ = write!(out, "    JobID={}.{}({}) ", resv.array_job_id, task, resv.job_id);
        }
    }
    let _ = writeln!(
        out,
        "Size={} State={} UserID={}",
        format_size(resv.size),
        resv.state,
        resv.user_id
    );
    out
}
