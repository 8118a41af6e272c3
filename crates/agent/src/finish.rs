//! Classification of the free-text reason carried by the `finish` tool.
//!
//! The match is a loose prefix test on the trimmed, lower-cased reason.
//! Anything that does not start with the success or failure vocabulary
//! still ends the session, but leaves it unresolved.

use uipilot_core::{SessionStatus, Verdict};

const SUCCESS_PREFIXES: &[&str] = &["task success", "success"];
const FAILURE_PREFIXES: &[&str] = &["failure"];

pub fn classify_finish_reason(reason: &str) -> Verdict {
    let reason = reason.trim().to_lowercase();
    if SUCCESS_PREFIXES.iter().any(|p| reason.starts_with(p)) {
        Verdict::Success
    } else if FAILURE_PREFIXES.iter().any(|p| reason.starts_with(p)) {
        Verdict::Failure
    } else {
        Verdict::Unresolved
    }
}

/// The session status a finish reason resolves to. Unresolved reasons map
/// to `InProgress`, which `Session::resolve` ignores.
pub fn finish_status(reason: &str) -> SessionStatus {
    match classify_finish_reason(reason) {
        Verdict::Success => SessionStatus::Success,
        Verdict::Failure => SessionStatus::Failure,
        Verdict::Unresolved => SessionStatus::InProgress,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn success_vocabulary() {
        assert_eq!(classify_finish_reason("Task Success"), Verdict::Success);
        assert_eq!(classify_finish_reason("SUCCESS: order placed"), Verdict::Success);
        assert_eq!(classify_finish_reason("  success"), Verdict::Success);
        assert_eq!(classify_finish_reason("task successful"), Verdict::Success);
    }

    #[test]
    fn failure_vocabulary() {
        assert_eq!(classify_finish_reason("Failure"), Verdict::Failure);
        assert_eq!(classify_finish_reason("failure - button never enabled"), Verdict::Failure);
    }

    #[test]
    fn anything_else_is_unresolved() {
        assert_eq!(classify_finish_reason("done"), Verdict::Unresolved);
        assert_eq!(classify_finish_reason("the task was a success"), Verdict::Unresolved);
        assert_eq!(classify_finish_reason("task failure"), Verdict::Unresolved);
        assert_eq!(classify_finish_reason(""), Verdict::Unresolved);
    }

    #[test]
    fn status_mapping() {
        assert_eq!(finish_status("Task Success"), SessionStatus::Success);
        assert_eq!(finish_status("failure"), SessionStatus::Failure);
        assert_eq!(finish_status("gave up"), SessionStatus::InProgress);
    }
}
