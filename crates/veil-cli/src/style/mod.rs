//! Terminal styling: semantic colors and tables.

use std::sync::atomic::{AtomicBool, Ordering};

use owo_colors::Style;

pub mod table;

pub use table::{print_rows, styled_table};

static NO_COLOR: AtomicBool = AtomicBool::new(false);

pub fn set_no_color(value: bool) {
    NO_COLOR.store(value, Ordering::SeqCst);
}

pub fn no_color() -> bool {
    NO_COLOR.load(Ordering::SeqCst)
}

/// Semantic styles for anything displayable.
pub trait SemanticStyle {
    /// Green bold.
    fn success(&self) -> String;
    /// Yellow.
    fn warning(&self) -> String;
    /// Red bold.
    fn error(&self) -> String;
    /// Dimmed.
    fn muted(&self) -> String;
    /// Bold.
    fn header(&self) -> String;
    /// Blue, for SQL and paths.
    fn code(&self) -> String;
}

fn paint<T: std::fmt::Display + ?Sized>(value: &T, style: Style) -> String {
    if no_color() {
        value.to_string()
    } else {
        style.style(value).to_string()
    }
}

impl<T: std::fmt::Display + ?Sized> SemanticStyle for T {
    fn success(&self) -> String {
        paint(self, Style::new().green().bold())
    }

    fn warning(&self) -> String {
        paint(self, Style::new().yellow())
    }

    fn error(&self) -> String {
        paint(self, Style::new().red().bold())
    }

    fn muted(&self) -> String {
        paint(self, Style::new().dimmed())
    }

    fn header(&self) -> String {
        paint(self, Style::new().bold())
    }

    fn code(&self) -> String {
        paint(self, Style::new().blue())
    }
}

pub fn print_success(msg: &str) {
    println!("{} {}", "✓".success(), msg);
}

pub fn print_warn(msg: &str) {
    println!("{} {}", "⚠".warning(), msg);
}

pub fn print_labeled(key: &str, value: &str) {
    println!("  {}: {}", key.muted(), value);
}
