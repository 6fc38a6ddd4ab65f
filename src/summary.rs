use std::fmt::Write;

use driftguard_domain::RetrainOutcome;

/// Fixed-width table of one cycle's outcomes, one row per parameter.
pub fn render(outcomes: &[RetrainOutcome]) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "{:<10} {:<18} {:>8}  {:<9} ERROR",
        "PARAMETER", "DECISION", "ATTEMPTS", "SUCCEEDED"
    );
    for outcome in outcomes {
        let _ = writeln!(
            out,
            "{:<10} {:<18} {:>8}  {:<9} {}",
            outcome.parameter.as_str(),
            outcome.decision.map_or("-", |d| d.as_str()),
            outcome.attempts_used,
            if outcome.succeeded { "yes" } else { "no" },
            outcome.error.as_deref().unwrap_or("")
        );
    }
    out
}
