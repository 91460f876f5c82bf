use owo_colors::Style;
use std::sync::OnceLock;

use crate::pipeline::StepOutcome;

static THEME: OnceLock<Theme> = OnceLock::new();

/// Terminal styles, one per role in the load/transform output
#[derive(Debug, Clone)]
pub struct Theme {
    /// Command banners and section rules
    pub banner: Style,
    /// Loaded steps and final success lines
    pub loaded: Style,
    /// Failed steps and fatal errors
    pub failed: Style,
    /// Warnings such as orphaned rows
    pub attention: Style,
    /// Field labels in summaries
    pub label: Style,
    /// Skipped steps and timings
    pub faint: Style,
}

impl Theme {
    /// `console` decides from the terminal and `CLICOLOR`/`NO_COLOR`
    pub fn detect() -> Self {
        if console::colors_enabled() {
            Self::colored()
        } else {
            Self::plain()
        }
    }

    pub fn colored() -> Self {
        Self {
            banner: Style::new().bright_blue().bold(),
            loaded: Style::new().green(),
            failed: Style::new().bright_red().bold(),
            attention: Style::new().bright_yellow(),
            label: Style::new().blue(),
            faint: Style::new().bright_black().italic(),
        }
    }

    pub fn plain() -> Self {
        Self {
            banner: Style::new(),
            loaded: Style::new(),
            failed: Style::new(),
            attention: Style::new(),
            label: Style::new(),
            faint: Style::new(),
        }
    }

    pub fn for_outcome(&self, outcome: &StepOutcome) -> Style {
        match outcome {
            StepOutcome::Loaded(_) => self.loaded,
            StepOutcome::Failed { .. } => self.failed,
            StepOutcome::Skipped => self.faint,
        }
    }
}

pub fn theme() -> &'static Theme {
    THEME.get_or_init(Theme::detect)
}

#[cfg(test)]
mod tests {
    use super::*;
    use owo_colors::OwoColorize;

    #[test]
    fn test_plain_theme_emits_no_escapes() {
        let theme = Theme::plain();
        let rendered = "visits".style(theme.for_outcome(&StepOutcome::Skipped)).to_string();
        assert_eq!(rendered, "visits");
    }

    #[test]
    fn test_colored_theme_styles_failures() {
        let theme = Theme::colored();
        let outcome = StepOutcome::Failed { error: "x".into() };
        let rendered = "visits".style(theme.for_outcome(&outcome)).to_string();
        assert!(rendered.contains('\u{1b}'));
        assert!(rendered.contains("visits"));
    }
}
