//! User-facing output channel.
//!
//! Progress lines, banners and warnings are part of the tool's interface, not
//! diagnostics, so they bypass `tracing` and go through this trait.

/// Sink for human-readable progress output.
pub trait Console: Send + Sync {
    /// A normal progress line (stdout).
    fn line(&self, text: &str);

    /// A warning the operator should notice but that does not stop the operation (stderr).
    fn warn(&self, text: &str);

    /// A failure message (stderr).
    fn error(&self, text: &str);

    /// An empty separator line.
    fn blank(&self) {
        self.line("");
    }
}

/// Writes to the process stdout/stderr.
#[derive(Debug, Default, Clone, Copy)]
pub struct StdConsole;

impl Console for StdConsole {
    fn line(&self, text: &str) {
        println!("{text}");
    }

    fn warn(&self, text: &str) {
        eprintln!("warning: {text}");
    }

    fn error(&self, text: &str) {
        eprintln!("error: {text}");
    }
}

/// `=====` framed banner used for phase headings and final verdicts.
pub fn banner(console: &dyn Console, title: &str) {
    let rule = "=".repeat(40);
    console.line(&rule);
    console.line(&format!("  {title}"));
    console.line(&rule);
}
