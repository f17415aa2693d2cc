use std::fmt::Write;
use std::path::Path;

use difflint_core::Diagnostic;

use crate::pipeline::GateReport;

/// Render a gate report as pylint-style text.
///
/// Each file with diagnostics gets a `************* Module` header followed by
/// one line per diagnostic formatted with `template`. A summary line is added
/// when problems were reported and no analyzer run failed fatally.
///
/// # Examples
///
/// ```
/// use difflint_gate::pipeline::GateReport;
/// use difflint_gate::report::to_text;
/// use std::path::Path;
///
/// let text = to_text(&GateReport::default(), "{path}:{line}", Path::new("/repo"));
/// assert!(text.is_empty());
/// ```
pub fn to_text(report: &GateReport, template: &str, root: &Path) -> String {
    let mut out = String::new();
    for file in report.files.iter().filter(|f| !f.diagnostics.is_empty()) {
        let module = &file.diagnostics[0].module;
        if module.is_empty() {
            out.push_str("************* \n");
        } else {
            let _ = writeln!(out, "************* Module {module}");
        }
        for d in &file.diagnostics {
            out.push_str(&render_message(template, d, root));
            out.push('\n');
        }
    }

    let count = report.problem_count();
    if report.status & 1 == 0 && count > 0 {
        let plural = if count > 1 { "s" } else { "" };
        let _ = writeln!(out, "\n{count} problem{plural} reported\n");
    }
    out
}

/// Render a gate report as JSON.
///
/// # Examples
///
/// ```
/// use difflint_gate::pipeline::GateReport;
/// use difflint_gate::report::to_json;
///
/// let json = to_json(&GateReport::default());
/// assert_eq!(json["status"], 0);
/// assert_eq!(json["fatal"], false);
/// assert!(json["diagnostics"].as_array().unwrap().is_empty());
/// ```
pub fn to_json(report: &GateReport) -> serde_json::Value {
    let diagnostics: Vec<&Diagnostic> = report.diagnostics().collect();
    serde_json::json!({
        "diagnostics": diagnostics,
        "fatal": report.fatal,
        "status": report.status,
    })
}

/// Format one diagnostic through a `{placeholder}` template.
///
/// Known placeholders: `path`, `abspath`, `line`, `column`, `module`, `obj`,
/// `msg`, `msg_id`, `symbol`, `C` and `category`. A placeholder may carry a
/// format spec of the form `[[fill]align][width][type]`, as in `{line:3d}` or
/// `{symbol:<20}`. Numbers align right and text aligns left by default.
/// Unknown names and unsupported specs are copied through unchanged.
///
/// # Examples
///
/// ```
/// use difflint_core::{Diagnostic, Severity};
/// use difflint_gate::report::render_message;
/// use std::path::{Path, PathBuf};
///
/// let d = Diagnostic {
///     path: PathBuf::from("pkg/mod.py"),
///     line: 3,
///     column: 4,
///     rule_id: "W0612".into(),
///     severity: Severity::Warning,
///     message: "Unused variable 'x'".into(),
///     symbol: "unused-variable".into(),
///     obj: "main".into(),
///     module: "pkg.mod".into(),
/// };
/// let line = render_message("{C}:{line:3d} {path} {msg_id} {msg}", &d, Path::new("/repo"));
/// assert_eq!(line, "W:  3 pkg/mod.py W0612 Unused variable 'x'");
/// ```
pub fn render_message(template: &str, diagnostic: &Diagnostic, root: &Path) -> String {
    let mut out = String::with_capacity(template.len() + diagnostic.message.len());
    let mut rest = template;

    while let Some(open) = rest.find('{') {
        out.push_str(&rest[..open]);
        let after = &rest[open + 1..];
        let Some(close) = after.find('}') else {
            out.push_str(&rest[open..]);
            return out;
        };

        let field = &after[..close];
        let (name, spec) = field.split_once(':').unwrap_or((field, ""));
        let value = placeholder(name, diagnostic, root)
            .and_then(|value| apply_spec(&value, matches!(name, "line" | "column"), spec));
        match value {
            Some(value) => out.push_str(&value),
            None => {
                out.push('{');
                out.push_str(field);
                out.push('}');
            }
        }
        rest = &after[close + 1..];
    }
    out.push_str(rest);
    out
}

fn placeholder(name: &str, d: &Diagnostic, root: &Path) -> Option<String> {
    let value = match name {
        "path" => d.path.display().to_string(),
        "abspath" => root.join(&d.path).display().to_string(),
        "line" => d.line.to_string(),
        "column" => d.column.to_string(),
        "module" => d.module.clone(),
        "obj" => d.obj.clone(),
        "msg" => d.message.clone(),
        "msg_id" => d.rule_id.clone(),
        "symbol" => d.symbol.clone(),
        "C" => d.severity.code().to_string(),
        "category" => d.severity.to_string(),
        _ => return None,
    };
    Some(value)
}

/// Pad `value` according to a `[[fill]align][width][type]` spec.
fn apply_spec(value: &str, numeric: bool, spec: &str) -> Option<String> {
    if spec.is_empty() {
        return Some(value.to_string());
    }

    let mut chars = spec.chars().peekable();
    let is_align = |c: char| matches!(c, '<' | '>' | '^');
    let mut fill = ' ';
    let mut align = if numeric { '>' } else { '<' };
    let mut lookahead = spec.chars();
    match (lookahead.next(), lookahead.next()) {
        (Some(f), Some(a)) if is_align(a) => {
            fill = f;
            align = a;
            chars.next();
            chars.next();
        }
        (Some(a), _) if is_align(a) => {
            align = a;
            chars.next();
        }
        (Some('0'), _) => {
            fill = '0';
            align = '>';
        }
        _ => {}
    }

    let mut width = 0usize;
    while let Some(digit) = chars.peek().and_then(|c| c.to_digit(10)) {
        width = width.checked_mul(10)?.checked_add(digit as usize)?;
        chars.next();
    }

    match chars.next() {
        None => {}
        Some('d') if numeric => {}
        Some('s') if !numeric => {}
        Some(_) => return None,
    }
    if chars.next().is_some() {
        return None;
    }

    let pad = width.saturating_sub(value.chars().count());
    let (left, right) = match align {
        '<' => (0, pad),
        '>' => (pad, 0),
        _ => (pad / 2, pad - pad / 2),
    };
    let mut padded = String::with_capacity(value.len() + pad);
    padded.extend(std::iter::repeat(fill).take(left));
    padded.push_str(value);
    padded.extend(std::iter::repeat(fill).take(right));
    Some(padded)
}
