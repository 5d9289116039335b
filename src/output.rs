use crate::cli::OutputFormat;
use paygen::{JobDisposition, PaygenError, StageOutcome, StageRun};
use serde_json::json;

pub fn emit_output(output: OutputFormat, command: &str, status: &str, payload: &serde_json::Value) {
    match output {
        OutputFormat::Text => payload
            .get("message")
            .and_then(serde_json::Value::as_str)
            .map_or_else(|| println!("{payload}"), |msg| println!("{msg}")),
        OutputFormat::Json => println!(
            "{}",
            json!({
                "command": command,
                "status": status,
                "payload": payload,
            })
        ),
    }
}

pub fn emit_error(output: OutputFormat, command: &str, error: &PaygenError) {
    match output {
        OutputFormat::Text => eprintln!("error[{}]: {error}", error.code()),
        OutputFormat::Json => println!(
            "{}",
            json!({
                "command": command,
                "status": "error",
                "error": {
                    "code": error.code(),
                    "message": error.to_string(),
                    "exit_code": error.exit_code(),
                },
            })
        ),
    }
}

/// Process exit code for a finished stage: forgiven runs exit zero.
pub const fn stage_exit_code(outcome: &StageOutcome) -> i32 {
    match outcome {
        StageOutcome::Success | StageOutcome::Forgiven { .. } => 0,
        StageOutcome::Failed(err) => err.exit_code(),
    }
}

pub fn stage_payload(run: &StageRun) -> serde_json::Value {
    let mut payload = serde_json::to_value(&run.report).unwrap_or_else(|_| json!({}));
    if let Some(object) = payload.as_object_mut() {
        object.insert("message".to_string(), json!(render_stage_text(run)));
        object.insert("outcome".to_string(), json!(run.outcome.status()));
        if let Some(message) = run.outcome.message() {
            object.insert("detail".to_string(), json!(message));
        }
        if let StageOutcome::Failed(err) = &run.outcome {
            object.insert("code".to_string(), json!(err.code()));
        }
    }
    payload
}

fn render_stage_text(run: &StageRun) -> String {
    let report = &run.report;
    let mut lines = vec![format!(
        "paygen {} {} ({}): {}",
        report.board,
        report.version,
        report.mode,
        run.outcome.status()
    )];

    for (channel, phase) in &report.channels {
        lines.push(format!("  signing  {:<20} {phase}", channel.value()));
    }
    if !report.failed_results.is_empty() {
        lines.push(format!("  failed results: {}", report.failed_results.join(", ")));
    }
    for record in &report.jobs {
        let state = match &record.disposition {
            JobDisposition::Generated { suite: Some(suite) } => format!("generated, suite {suite}"),
            JobDisposition::Generated { suite: None } => "generated".to_string(),
            JobDisposition::AlreadyHandled(reason) => format!("skipped: {reason}"),
            JobDisposition::TestLabFailure(reason) => format!("tests not scheduled: {reason}"),
            JobDisposition::Failed(reason) => format!("failed: {reason}"),
        };
        lines.push(format!("  payload  {:<20} {state}", record.job.channel.value()));
    }
    if let Some(message) = run.outcome.message() {
        lines.push(format!("  {message}"));
    }
    lines.join("\n")
}
