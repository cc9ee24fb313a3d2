//! Ariadne-based rendering for dispatch diagnostics.
//!
//! Diagnostics are data; this module is the convenience layer that turns
//! one into a formatted, labeled report for terminals and tests. Output
//! is colorless by default so tests can assert on it.

use std::ops::Range;

use ariadne::{Color, Config, Label, Report, ReportKind, Source};

use sable_types::{GlobalEnv, Loc};

use crate::diag::Diagnostic;

#[derive(Copy, Clone, Debug)]
pub struct RenderOptions {
    pub color: bool,
}

impl RenderOptions {
    pub fn colorless() -> RenderOptions {
        RenderOptions { color: false }
    }
}

impl Default for RenderOptions {
    fn default() -> Self {
        RenderOptions::colorless()
    }
}

fn loc_to_range(loc: Loc, source_len: usize) -> Range<usize> {
    let start: usize = loc.range.start().into();
    let end: usize = loc.range.end().into();
    let s = start.min(source_len);
    let e = end.min(source_len).max(s);
    // Ariadne needs a non-empty span.
    if s == e {
        s..e.saturating_add(1).min(source_len.max(1))
    } else {
        s..e
    }
}

/// Render one diagnostic against the file it points into.
pub fn render_diagnostic(env: &GlobalEnv, diag: &Diagnostic, opts: &RenderOptions) -> String {
    let file = env.file(diag.loc.file);
    let source = &file.text;
    let source_len = source.len();
    let config = Config::default().with_color(opts.color);

    let kind = if diag.code.is_informational() {
        ReportKind::Advice
    } else {
        ReportKind::Error
    };

    let primary = loc_to_range(diag.loc, source_len);
    let mut builder = Report::build(kind, primary.clone())
        .with_code(diag.code.as_str())
        .with_message(&diag.header)
        .with_config(config);

    builder.add_label(
        Label::new(primary)
            .with_message(&diag.header)
            .with_color(Color::Red),
    );

    for section in &diag.sections {
        for line in &section.lines {
            let Some(loc) = line.loc else { continue };
            if loc.file != diag.loc.file {
                continue;
            }
            let message = if line.message.is_empty() {
                section.header.clone()
            } else if section.header.is_empty() {
                line.message.clone()
            } else {
                format!("{} {}", section.header, line.message)
            };
            builder.add_label(
                Label::new(loc_to_range(loc, source_len))
                    .with_message(message)
                    .with_color(Color::Blue),
            );
        }
    }

    if !diag.notes.is_empty() {
        builder.set_note(diag.notes.join("\n"));
    }
    if let Some(fix) = diag.autocorrects.first() {
        builder.set_help(format!("{}: `{}`", fix.title, fix.replacement));
    }

    let report = builder.finish();
    let mut buf = Vec::new();
    report
        .write(Source::from(source.as_str()), &mut buf)
        .expect("failed to write diagnostic");
    String::from_utf8_lossy(&buf).into_owned()
}

/// Render a batch of diagnostics, one report per entry.
pub fn render_all(env: &GlobalEnv, diags: &[Diagnostic], opts: &RenderOptions) -> Vec<String> {
    diags
        .iter()
        .map(|d| render_diagnostic(env, d, opts))
        .collect()
}
