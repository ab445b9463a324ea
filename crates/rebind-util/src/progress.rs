use std::io::Write;

use console::Style;

/// Print a status line to stderr: `   Generated 3 redirects`
///
/// The `label` is right-padded to 12 characters and printed in bold green.
pub fn status(label: &str, message: &str) {
    print_status(Style::new().green().bold(), label, message);
}

/// Like [`status`] but bold cyan, for informational lines.
pub fn status_info(label: &str, message: &str) {
    print_status(Style::new().cyan().bold(), label, message);
}

/// Bold yellow label.
pub fn status_warn(label: &str, message: &str) {
    print_status(Style::new().yellow().bold(), label, message);
}

fn print_status(style: Style, label: &str, message: &str) {
    let _ = writeln!(std::io::stderr(), "{:>12} {message}", style.apply_to(label));
}
