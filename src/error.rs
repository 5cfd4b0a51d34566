use std::fmt;
use std::io::Write;

use crate::token::Span;

/// Maximum number of errors shown to the user before eliding the rest.
pub const MAX_ERR_LINES: usize = 5;

#[derive(Debug)]
pub enum GobletError {
    /// Syntactic issue from the relaxed parser.
    Parse { message: String, offset: usize },
    /// From either checker phase; position information preserved.
    Type { message: String, span: Span },
    /// Internal-consistency failure in the rewriter (e.g. a generated type
    /// expression fails to re-parse). Aborts the cell.
    Rewrite { message: String },
    /// The host build tool exited non-zero; its stderr was already streamed.
    Build { message: String },
    /// dlopen or symbol resolution failed. Fatal for the cell only.
    Load { message: String },
    /// User code panicked with a value other than the cancellation sentinel.
    Runtime { message: String },
    /// User code yielded to cancellation or the deadline elapsed.
    Canceled { message: String },
}

impl fmt::Display for GobletError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GobletError::Parse { message, offset } => {
                write!(f, "parse error at offset {}: {}", offset, message)
            }
            GobletError::Type { message, span } => {
                write!(f, "type error at {}..{}: {}", span.0, span.1, message)
            }
            GobletError::Rewrite { message } => write!(f, "rewrite error: {}", message),
            GobletError::Build { message } => write!(f, "build error: {}", message),
            GobletError::Load { message } => write!(f, "load error: {}", message),
            GobletError::Runtime { message } => f.write_str(message),
            GobletError::Canceled { message } => f.write_str(message),
        }
    }
}

impl std::error::Error for GobletError {}

impl GobletError {
    /// Byte offset the error anchors to, for source-context formatting.
    pub fn offset(&self) -> Option<usize> {
        match self {
            GobletError::Parse { offset, .. } => Some(*offset),
            GobletError::Type { span, .. } => Some(span.0),
            _ => None,
        }
    }
}

/// An ordered list of errors. The zero value is ready to use.
#[derive(Debug, Default)]
pub struct ErrorList(Vec<GobletError>);

impl ErrorList {
    pub fn new() -> ErrorList {
        ErrorList(Vec::new())
    }

    pub fn push(&mut self, err: GobletError) {
        self.0.push(err);
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn first(&self) -> Option<&GobletError> {
        self.0.first()
    }

    pub fn iter(&self) -> impl Iterator<Item = &GobletError> {
        self.0.iter()
    }

    pub fn take(&mut self) -> Vec<GobletError> {
        std::mem::take(&mut self.0)
    }

    /// Sort by source offset, keeping relative order of same-offset errors.
    pub fn sort(&mut self) {
        self.0.sort_by_key(|e| e.offset().unwrap_or(usize::MAX));
    }

    /// Collapse into a single error value: the first error (with the elided
    /// count appended when there are more), or `Ok` when empty.
    pub fn into_result(mut self) -> Result<(), GobletError> {
        if self.0.is_empty() {
            return Ok(());
        }
        if self.0.len() == 1 {
            return Err(self.0.remove(0));
        }
        let extra = self.0.len() - 1;
        let first = self.0.remove(0);
        let offset = first.offset().unwrap_or(0);
        Err(GobletError::Parse {
            offset,
            message: format!("{} (and {} more errors)", first, extra),
        })
    }
}

impl fmt::Display for ErrorList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0.len() {
            0 => f.write_str("no errors"),
            1 => write!(f, "{}", self.0[0]),
            n => write!(f, "{} (and {} more errors)", self.0[0], n - 1),
        }
    }
}

/// Print up to `MAX_ERR_LINES` errors to `w`, appending the elided count to
/// the last printed line.
pub fn print_errors(w: &mut dyn Write, errs: &[GobletError]) {
    for (i, err) in errs.iter().take(MAX_ERR_LINES).enumerate() {
        let mut msg = err.to_string();
        if i == MAX_ERR_LINES - 1 && i != errs.len() - 1 {
            msg.push_str(&format!(" (and {} more errors)", errs.len() - 1 - i));
        }
        let _ = writeln!(w, "{}", msg);
    }
}

/// Format an error with source context: the offending line and a caret.
pub fn format_error(source: &str, err: &GobletError) -> String {
    let offset = match err.offset() {
        Some(o) => o,
        None => return err.to_string(),
    };
    let (line_num, col, line_text) = offset_to_line_col(source, offset);
    format!(
        "{}\n  --> {}:{}\n   | {}\n   | {}^",
        err,
        line_num,
        col,
        line_text,
        " ".repeat(col.saturating_sub(1))
    )
}

fn offset_to_line_col(source: &str, offset: usize) -> (usize, usize, &str) {
    let mut line_start = 0;
    let mut line_num = 1;
    for (i, ch) in source.char_indices() {
        if i >= offset {
            break;
        }
        if ch == '\n' {
            line_start = i + 1;
            line_num += 1;
        }
    }
    let line_end = source[line_start..]
        .find('\n')
        .map(|i| line_start + i)
        .unwrap_or(source.len());
    let col = offset.min(line_end).saturating_sub(line_start) + 1;
    (line_num, col, &source[line_start..line_end])
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_err(n: usize) -> GobletError {
        GobletError::Parse {
            message: format!("err{}", n),
            offset: n,
        }
    }

    #[test]
    fn error_list_display_single() {
        let mut list = ErrorList::new();
        list.push(parse_err(0));
        assert_eq!(list.to_string(), "parse error at offset 0: err0");
    }

    #[test]
    fn error_list_display_many() {
        let mut list = ErrorList::new();
        for n in 0..3 {
            list.push(parse_err(n));
        }
        assert!(list.to_string().ends_with("(and 2 more errors)"));
    }

    #[test]
    fn print_errors_caps_at_five() {
        let errs: Vec<GobletError> = (0..8).map(parse_err).collect();
        let mut buf = Vec::new();
        print_errors(&mut buf, &errs);
        let text = String::from_utf8(buf).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 5);
        assert!(lines[4].ends_with("(and 3 more errors)"));
    }

    #[test]
    fn format_error_points_at_line() {
        let src = "x := 1\ny ==\n";
        let err = GobletError::Parse {
            message: "unexpected token".to_string(),
            offset: 9,
        };
        let formatted = format_error(src, &err);
        assert!(formatted.contains("--> 2:3"));
        assert!(formatted.contains("y =="));
    }
}
