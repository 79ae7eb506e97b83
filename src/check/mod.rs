use std::ops::Range;

use ariadne::{Color, ColorGenerator, Label, Report, ReportKind};

use crate::driver::script::{ScriptError, StepErrorKind};
use crate::ir::builder::BuilderError;

#[derive(Debug, Clone)]
pub struct FileSpan {
    pub span: Range<usize>,
    pub path: String,
}

impl FileSpan {
    pub fn new(path: String, span: Range<usize>) -> Self {
        Self { path, span }
    }
}

impl ariadne::Span for FileSpan {
    type SourceId = String;

    fn source(&self) -> &Self::SourceId {
        &self.path
    }

    fn start(&self) -> usize {
        self.span.start
    }

    fn end(&self) -> usize {
        self.span.end
    }
}

fn report_kind(error: &BuilderError) -> ReportKind<'static> {
    if error.is_integrity() {
        ReportKind::Custom("Internal error", Color::Red)
    } else {
        ReportKind::Error
    }
}

/// Creates a report from a script error, pointing at the step that failed.
pub fn script_error_to_report(path: &str, error: &ScriptError) -> Report<'static, FileSpan> {
    let mut colors = ColorGenerator::new();
    colors.next();
    match error {
        ScriptError::Io(err) => {
            let filespan = FileSpan::new(path.to_string(), 0..0);
            Report::build(ReportKind::Error, filespan)
                .with_code("Io")
                .with_message(format!("Failed to read the script: {err}"))
                .finish()
        }
        ScriptError::Config(err) => {
            let filespan = FileSpan::new(path.to_string(), 0..0);
            Report::build(ReportKind::Error, filespan)
                .with_code("InvalidConfig")
                .with_message(err.to_string())
                .finish()
        }
        ScriptError::Parse(err) => {
            let filespan = FileSpan::new(path.to_string(), err.span().unwrap_or(0..0));
            Report::build(ReportKind::Error, filespan.clone())
                .with_code("InvalidScript")
                .with_message("Invalid script.")
                .with_label(
                    Label::new(filespan)
                        .with_message(err.message())
                        .with_color(colors.next()),
                )
                .finish()
        }
        ScriptError::Step { index, span, kind } => {
            let filespan = FileSpan::new(path.to_string(), span.clone());
            let (report_kind, code) = match kind {
                StepErrorKind::Builder(err) => (report_kind(err), "BuilderError"),
                StepErrorKind::UnknownVar(_) => (ReportKind::Error, "UnknownVar"),
                StepErrorKind::CloseMismatch { .. } => (ReportKind::Error, "CloseMismatch"),
            };
            Report::build(report_kind, filespan.clone())
                .with_code(code)
                .with_message(format!("Step {index} failed."))
                .with_label(
                    Label::new(filespan)
                        .with_message(kind.to_string())
                        .with_color(colors.next()),
                )
                .finish()
        }
        ScriptError::Finish(err) => {
            let filespan = FileSpan::new(path.to_string(), 0..0);
            Report::build(report_kind(err), filespan)
                .with_code("Unfinished")
                .with_message(format!("The script doesn't build anything: {err}"))
                .finish()
        }
    }
}
