use crate::pipeline::StepOutcome;
use crate::storage::Table;
use crate::ui::{Icons, theme};
use owo_colors::OwoColorize;

pub fn header(text: &str) {
    println!("{} {}", Icons::ROCKET, text.style(theme().banner));
}

pub fn success(label: &str) {
    println!("{} {}", Icons::CHECK, label.style(theme().loaded));
}

pub fn error(label: &str) {
    eprintln!("{} {}", Icons::CROSS, label.style(theme().failed));
}

pub fn warn(label: &str) {
    eprintln!("{} {}", Icons::WARN, label.style(theme().attention));
}

pub fn info(label: &str, value: &str) {
    println!("{} {}: {}", Icons::INFO, label.style(theme().label), value);
}

pub fn section(title: &str) {
    println!();
    println!("━{}━", title.style(theme().banner));
}

pub fn dim(text: &str) -> String {
    text.style(theme().faint).to_string()
}

/// One line per load step, styled by its outcome
pub fn step(table: Table, outcome: &StepOutcome) {
    let name = format!("{:<14}", table.name());
    let name = name.style(theme().for_outcome(outcome));
    match outcome {
        StepOutcome::Loaded(load) => println!("  {} {} {} rows", Icons::CHECK, name, load.rows),
        StepOutcome::Failed { error } => eprintln!("  {} {} {}", Icons::CROSS, name, error),
        StepOutcome::Skipped => println!("  {} {} {}", Icons::SKIP, name, dim("skipped")),
    }
}

pub fn timing(elapsed: std::time::Duration) {
    println!("{} {}", Icons::CLOCK, dim(&format!("{:.2?}", elapsed)));
}

pub fn summary_row(label: &str, value: &str) {
    println!("  {} {}", label.style(theme().label), value);
}
