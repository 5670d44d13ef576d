//! Deterministic local rendering for degraded paths. The Formatter stage
//! owns real prose; this is the minimal readable fallback when it is
//! unreachable.

use decision_protocol::{DecisionRecord, GroupCount};

pub fn render_count(count: i64) -> String {
    format!("📊 נמצאו {count} החלטות")
}

pub fn render_rows(rows: &[DecisionRecord], brief: bool) -> String {
    if rows.is_empty() {
        return "לא נמצאו החלטות התואמות את החיפוש.".to_string();
    }

    let mut out = format!("נמצאו {} החלטות:\n", rows.len());
    for record in rows {
        out.push_str(&format!(
            "• {} (החלטה {}, {})\n",
            record.title, record.decision_number, record.decision_date
        ));
        if !brief {
            if let Some(summary) = record.summary.as_deref() {
                out.push_str(&format!("  {summary}\n"));
            }
            if let Some(url) = record.decision_url.as_deref() {
                out.push_str(&format!("  {url}\n"));
            }
        }
    }
    out.trim_end().to_string()
}

pub fn render_groups(groups: &[GroupCount]) -> String {
    if groups.is_empty() {
        return "לא נמצאו החלטות להשוואה.".to_string();
    }
    let mut out = "📊 התפלגות ההחלטות:\n".to_string();
    for group in groups {
        out.push_str(&format!("• {}: {}\n", group.key, group.count));
    }
    out.trim_end().to_string()
}
