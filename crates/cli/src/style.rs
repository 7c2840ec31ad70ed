//! Terminal styling for command output and run summaries.

use console::Style;

use forge_backup_core::models::MirrorOutcome;

fn marked(mark: &str, style: Style, msg: &str) -> String {
    format!("{} {}", style.apply_to(mark), msg)
}

/// Green check mark prefix.
pub fn success(msg: &str) -> String {
    marked("✓", Style::new().green(), msg)
}

/// Red cross prefix.
pub fn error(msg: &str) -> String {
    marked("✗", Style::new().red(), msg)
}

pub fn warn(msg: &str) -> String {
    marked("⚠", Style::new().yellow(), msg)
}

pub fn header(msg: &str) -> String {
    Style::new().bold().apply_to(msg).to_string()
}

pub fn dim(msg: &str) -> String {
    Style::new().dim().apply_to(msg).to_string()
}

/// Short tag for a repository outcome, coloured by severity.
pub fn outcome(outcome: &MirrorOutcome) -> String {
    let (tag, style) = match outcome {
        MirrorOutcome::Cloned => ("cloned", Style::new().green()),
        MirrorOutcome::Updated => ("updated", Style::new().cyan()),
        MirrorOutcome::NoContent { .. } => ("empty", Style::new().dim()),
        MirrorOutcome::Failed { .. } => ("failed", Style::new().red().bold()),
    };
    style.apply_to(tag).to_string()
}
