use chrono::{DateTime, Utc};
use resume_fit_core::{BatchReport, QuestionOutcome, ScoreReading};
use std::fmt::Write;

fn section_title(key: &str) -> &str {
    match key {
        "q1" => "Skills Match",
        "q2" => "Fit Decision",
        "q3" => "Match Score",
        "q4" => "Selling Points",
        "q5" => "Areas to Improve",
        "q6" => "Red Flags",
        "q7" => "Cover Letter",
        "q8" => "How to Stand Out",
        "q9" => "Elevator Pitch",
        other => other,
    }
}

fn score_line(score: Option<ScoreReading>) -> String {
    match score {
        Some(ScoreReading {
            value,
            reliable: true,
        }) => format!("**{value}%**"),
        Some(ScoreReading { value, .. }) => {
            format!("**{value}%** (unreliable: the model did not return a number)")
        }
        None => "not available: the score question was not answered".to_string(),
    }
}

/// Markdown report for one analysed resume.
pub fn render_markdown(report: &BatchReport, generated_at: DateTime<Utc>) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "# Resume analysis: {}", report.document_id);
    let _ = writeln!(out);
    let _ = writeln!(
        out,
        "Generated {} with prompt set {}.",
        generated_at.to_rfc3339(),
        report.prompt_version
    );
    let _ = writeln!(out);
    let _ = writeln!(out, "Match score: {}", score_line(report.score()));

    for outcome in &report.outcomes {
        render_outcome(&mut out, outcome);
    }

    let failures: Vec<&QuestionOutcome> = report.failures().collect();
    if !failures.is_empty() {
        let _ = writeln!(out);
        let _ = writeln!(out, "## Failures");
        let _ = writeln!(out);
        for outcome in failures {
            if let Err(error) = &outcome.result {
                let _ = writeln!(out, "- {}: {error}", outcome.key);
            }
        }
    }

    if report.was_cancelled() {
        let _ = writeln!(out);
        let _ = writeln!(out, "## Not asked (cancelled)");
        let _ = writeln!(out);
        for key in &report.skipped {
            let _ = writeln!(out, "- {key}: {}", section_title(key));
        }
    }

    out
}

fn render_outcome(out: &mut String, outcome: &QuestionOutcome) {
    let _ = writeln!(out);
    let _ = writeln!(out, "## {} ({})", section_title(&outcome.key), outcome.key);
    let _ = writeln!(out);
    match &outcome.result {
        Ok(answer) => {
            let _ = writeln!(out, "{}", answer.text.trim());
        }
        Err(error) => {
            let _ = writeln!(out, "_No answer: {error}_");
        }
    }
}
