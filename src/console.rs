//! The diagnostic console: an append-only, category-tagged text log shown in
//! the UI and mirrored to the tracing log file.

use std::fmt;

use chrono::{DateTime, Local};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Category {
    Serial,
    Debug,
    App,
    Api,
    Data,
    Info,
}

impl Category {
    pub fn tag(self) -> &'static str {
        match self {
            Category::Serial => "SERIAL",
            Category::Debug => "DEBUG",
            Category::App => "APP",
            Category::Api => "API",
            Category::Data => "DATA",
            Category::Info => "INFO",
        }
    }
}

/// How loudly a console line is mirrored to the log file.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Severity {
    Debug,
    Info,
    Warn,
}

impl Severity {
    fn for_category(category: Category) -> Self {
        match category {
            Category::Debug => Severity::Debug,
            _ => Severity::Info,
        }
    }
}

#[derive(Clone, Debug)]
pub struct ConsoleLine {
    pub at: DateTime<Local>,
    pub category: Category,
    pub severity: Severity,
    pub text: String,
}

impl fmt::Display for ConsoleLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} [{}] {}",
            self.at.format("%H:%M:%S"),
            self.category.tag(),
            self.text
        )
    }
}

#[derive(Default)]
pub struct Console {
    lines: Vec<ConsoleLine>,
    /// Lines scrolled back from the bottom.
    pub scroll: u16,
}

impl Console {
    pub fn push<S: Into<String>>(&mut self, category: Category, text: S) {
        self.push_at(Severity::for_category(category), category, text);
    }

    /// Failures: shown like any other line, logged at warn.
    pub fn warn<S: Into<String>>(&mut self, category: Category, text: S) {
        self.push_at(Severity::Warn, category, text);
    }

    fn push_at<S: Into<String>>(&mut self, severity: Severity, category: Category, text: S) {
        let text = text.into();
        let tag = category.tag();
        match severity {
            Severity::Debug => tracing::debug!(target: "console", "[{tag}] {text}"),
            Severity::Info => tracing::info!(target: "console", "[{tag}] {text}"),
            Severity::Warn => tracing::warn!(target: "console", "[{tag}] {text}"),
        }
        self.lines.push(ConsoleLine {
            at: Local::now(),
            category,
            severity,
            text,
        });
    }

    pub fn lines(&self) -> &[ConsoleLine] {
        &self.lines
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn clear(&mut self) {
        self.lines.clear();
        self.scroll = 0;
    }

    pub fn scroll_up(&mut self, by: u16) {
        let max = u16::try_from(self.lines.len()).unwrap_or(u16::MAX);
        self.scroll = self.scroll.saturating_add(by).min(max);
    }

    pub fn scroll_down(&mut self, by: u16) {
        self.scroll = self.scroll.saturating_sub(by);
    }

    pub fn scroll_to_top(&mut self) {
        self.scroll = u16::try_from(self.lines.len()).unwrap_or(u16::MAX);
    }

    pub fn scroll_to_bottom(&mut self) {
        self.scroll = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lines_keep_order_and_category() {
        let mut console = Console::default();
        console.push(Category::Serial, "69.78 -0.01 *90**** *90***");
        console.push(Category::Debug, "parsed");
        assert_eq!(console.len(), 2);
        assert_eq!(console.lines()[0].category, Category::Serial);
        assert!(console.lines()[1].to_string().ends_with("[DEBUG] parsed"));
    }

    #[test]
    fn clear_resets_scroll() {
        let mut console = Console::default();
        for i in 0..10 {
            console.push(Category::App, format!("line {i}"));
        }
        console.scroll_up(50);
        assert_eq!(console.scroll, 10);
        console.clear();
        assert_eq!(console.len(), 0);
        assert_eq!(console.scroll, 0);
    }

    #[test]
    fn severity_follows_category_unless_warned() {
        let mut console = Console::default();
        console.push(Category::Debug, "raw bytes");
        console.push(Category::Serial, "Connected to COM5");
        console.warn(Category::Serial, "Error: port unplugged");
        let severities: Vec<Severity> = console.lines().iter().map(|l| l.severity).collect();
        assert_eq!(severities, [Severity::Debug, Severity::Info, Severity::Warn]);
        assert!(console.lines()[2].to_string().ends_with("[SERIAL] Error: port unplugged"));
    }
}
