use crate::advisor::{rulebook, FALLBACK_MESSAGE, TYPO_RULE};
use crate::pipeline::{AnalysisOutcome, Failure};
use colored::Colorize;

pub fn render_outcome(outcome: &AnalysisOutcome) -> String {
    match outcome {
        AnalysisOutcome::Success => format!("{}", "Code executed successfully!".green().bold()),
        AnalysisOutcome::Failure(failure) => render_failure(failure),
    }
}

pub fn render_failure(failure: &Failure) -> String {
    let mut out = String::new();
    out.push_str(&format!("{}\n\n", "Error Detected".red().bold()));
    for line in failure.diagnostic_text.lines() {
        out.push_str(&format!("    {}\n", line.dimmed()));
    }
    out.push_str(&format!(
        "\n{} {}\n",
        "Predicted Error Type:".bold(),
        failure.category.to_string().yellow()
    ));
    out.push_str(&format!(
        "{} {}",
        "Suggested Fix:".bold(),
        failure.remediation.cyan()
    ));
    out
}

/// Human-readable listing of the advisor table.
pub fn render_rules() -> String {
    let mut out = String::new();
    out.push_str(&format!("{}\n", "Checked first, for every category:".bold()));
    out.push_str(&format!(
        "  {} -> {}\n",
        TYPO_RULE.matcher,
        TYPO_RULE.template
    ));

    for entry in rulebook() {
        out.push_str(&format!("\n{}\n", entry.category.to_string().cyan().bold()));
        for rule in entry.rules {
            out.push_str(&format!("  {} -> {}\n", rule.matcher, rule.template));
        }
        out.push_str(&format!("  {} -> {}\n", "otherwise".dimmed(), entry.default));
    }

    out.push_str(&format!(
        "\n{}\n  {}\n",
        "Any other category:".bold(),
        FALLBACK_MESSAGE
    ));
    out
}
