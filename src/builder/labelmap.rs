//! Parsing for the source-loop labelmap block.
//!
//! The labelmap precedes the instruction stream and is delimited by literal
//! `%%%% LABEL MAP START %%%%` / `%%%% LABEL MAP END %%%%` markers. Each body
//! line names a loop label, the function declaring it, and its source line,
//! optionally followed by the callers the label was inlined into:
//!
//! ```text
//! function/label line_number [inline caller1 caller2 ...]
//! ```

use crate::error::ErrorKind;

pub(super) const LABELMAP_START: &str = "%%%% LABEL MAP START %%%%";
pub(super) const LABELMAP_END: &str = "%%%% LABEL MAP END %%%%";

/// One parsed labelmap body line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(super) struct LabelmapLine<'a> {
    pub function: &'a str,
    pub label: &'a str,
    pub line_number: u32,
    /// Functions this label was inlined into, in declaration order.
    pub inline_callers: Vec<&'a str>,
}

pub(super) fn parse_labelmap_line(line: &str) -> Result<LabelmapLine<'_>, ErrorKind> {
    let malformed = |reason: &str| ErrorKind::MalformedLine {
        tag: "labelmap",
        reason: reason.to_string(),
    };

    let (function, rest) = line
        .split_once('/')
        .ok_or_else(|| malformed("missing function/label separator"))?;
    let mut tokens = rest.split_whitespace();
    let label = tokens.next().ok_or_else(|| malformed("missing label"))?;
    let line_number = tokens
        .next()
        .and_then(|t| t.parse().ok())
        .ok_or_else(|| malformed("missing or non-numeric line number"))?;

    let inline_callers = match tokens.next() {
        Some("inline") => tokens.collect(),
        Some(other) => {
            return Err(malformed(&format!("unexpected token {other:?}")));
        }
        None => Vec::new(),
    };

    Ok(LabelmapLine {
        function,
        label,
        line_number,
        inline_callers,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_line() {
        let parsed = parse_labelmap_line("md_kernel/loop_i 14").unwrap();
        assert_eq!(parsed.function, "md_kernel");
        assert_eq!(parsed.label, "loop_i");
        assert_eq!(parsed.line_number, 14);
        assert!(parsed.inline_callers.is_empty());
    }

    #[test]
    fn test_inline_callers() {
        let parsed = parse_labelmap_line("helper/loop_j 27 inline caller_a caller_b").unwrap();
        assert_eq!(parsed.function, "helper");
        assert_eq!(parsed.inline_callers, vec!["caller_a", "caller_b"]);
    }

    #[test]
    fn test_malformed_lines() {
        assert!(parse_labelmap_line("no_separator 14").is_err());
        assert!(parse_labelmap_line("f/label").is_err());
        assert!(parse_labelmap_line("f/label notanumber").is_err());
        assert!(parse_labelmap_line("f/label 14 garbage").is_err());
    }
}
