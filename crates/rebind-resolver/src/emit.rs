//! Selection and rendering of redirect directives.

use std::fmt::Write as _;

use crate::arbiter::RedirectDirective;

/// Directives a loader can use, sorted by module name.
///
/// Without a private probing path a redirect needs a public key token.
pub fn select<'d>(directives: &'d [RedirectDirective], probing_path: Option<&str>) -> Vec<&'d RedirectDirective> {
    let mut selected: Vec<&RedirectDirective> = directives
        .iter()
        .filter(|d| !d.public_key_token.is_empty() || probing_path.is_some())
        .collect();
    selected.sort_by(|a, b| a.name.cmp(&b.name));
    selected
}

/// One `<dependentAssembly>` block.
pub fn render(directive: &RedirectDirective, probing_path: Option<&str>) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "      <dependentAssembly>");
    let _ = writeln!(
        out,
        r#"        <assemblyIdentity name="{}" publicKeyToken="{}" culture="{}" />"#,
        directive.name, directive.public_key_token, directive.culture
    );
    let _ = write!(
        out,
        r#"        <bindingRedirect oldVersion="{}" newVersion="{}" />"#,
        directive.old_version_range(),
        directive.version
    );
    if let Some(probing) = probing_path {
        let _ = write!(
            out,
            "\n        <codeBase version=\"{}\" href=\"{}/{}\" />",
            directive.version,
            probing.trim_end_matches('/'),
            directive.file_name()
        );
    }
    out.push_str("\n      </dependentAssembly>");
    out
}

/// Select, sort and render `directives`, one block per line group.
pub fn render_all(directives: &[RedirectDirective], probing_path: Option<&str>) -> String {
    let probing_path = probing_path.map(|p| p.replace('\\', "/"));
    select(directives, probing_path.as_deref())
        .into_iter()
        .map(|d| render(d, probing_path.as_deref()))
        .collect::<Vec<_>>()
        .join("\n")
}
