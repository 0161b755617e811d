//! Parser for database client output using nom.
//!
//! `sqlcmd` prints query results as a fixed-width text table:
//!
//! ```text
//! ROUTINE_NAME                    <- header
//! ------------------------------  <- separator (column widths)
//! usp_GetUser                     <- rows
//! usp_SaveOrder
//!                                 <- blank
//! (2 rows affected)               <- trailing summary
//! ```
//!
//! Extraction happens in two steps: every line is first classified
//! ([`classify_lines`]), then the surviving rows are checked against a
//! name shape ([`NameValidator`]).

use nom::{
    bytes::complete::{tag, take_while1},
    character::complete::{char, digit1, space1},
    combinator::{all_consuming, opt},
    multi::separated_list1,
    IResult, Offset,
};
use regex::Regex;
use std::ops::Range;

use crate::error::{DbToolsError, DbToolsResult};
use crate::report::ProcedureName;

/// Default shape of a stored procedure or database name: up to 128 characters
/// (the SQL Server identifier limit), no control characters, no `:` and no
/// trailing `.`. Rows shaped like client messages (`Warning: ...`,
/// `Changed database context to 'x'.`) fail it; bracketed names containing
/// spaces pass.
pub const DEFAULT_NAME_PATTERN: &str = r"^[^\x00-\x1f:]{0,127}[^\x00-\x1f:.]$";

/// Role of one output line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineClass {
    Header,
    Blank,
    Footer,
    Row,
}

/// How the header and footer of the client output are recognised.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractPolicy {
    /// Number of leading lines that are never data (column header + separator).
    pub header_lines: usize,
    /// Treat the last non-blank line after the header as the row-count summary.
    pub drop_trailing_summary: bool,
}

impl Default for ExtractPolicy {
    fn default() -> Self {
        Self {
            header_lines: 2,
            drop_trailing_summary: true,
        }
    }
}

impl ExtractPolicy {
    pub fn with_header_lines(header_lines: usize) -> Self {
        Self {
            header_lines,
            ..Self::default()
        }
    }
}

/// Validates that a row looks like an identifier.
#[derive(Debug, Clone)]
pub struct NameValidator {
    pattern: Regex,
}

impl Default for NameValidator {
    fn default() -> Self {
        Self {
            pattern: Regex::new(DEFAULT_NAME_PATTERN)
                .expect("default name pattern compiles"),
        }
    }
}

impl NameValidator {
    /// Build a validator from a custom regex.
    pub fn new(pattern: &str) -> DbToolsResult<Self> {
        let pattern = Regex::new(pattern).map_err(|e| {
            DbToolsError::Config(format!("Invalid name pattern '{}': {}", pattern, e))
        })?;
        Ok(Self { pattern })
    }

    pub fn is_valid(&self, candidate: &str) -> bool {
        !candidate.is_empty() && self.pattern.is_match(candidate)
    }
}

/// Everything needed to turn a client's text output into names.
#[derive(Debug, Clone)]
pub struct OutputRules {
    pub policy: ExtractPolicy,
    pub validator: NameValidator,
    /// Databases hidden from database listings.
    pub system_databases: Vec<String>,
}

impl Default for OutputRules {
    fn default() -> Self {
        Self {
            policy: ExtractPolicy::default(),
            validator: NameValidator::default(),
            system_databases: ["master", "model", "tempdb", "msdb"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
        }
    }
}

impl OutputRules {
    pub fn procedures<S: AsRef<str>>(&self, lines: &[S]) -> Vec<ProcedureName> {
        extract_names(lines, &self.policy, &self.validator)
    }

    pub fn databases<S: AsRef<str>>(&self, lines: &[S]) -> Vec<String> {
        extract_databases(lines, &self.policy, &self.validator, &self.system_databases)
    }
}

/// Classify every line of client output.
pub fn classify_lines<S: AsRef<str>>(lines: &[S], policy: &ExtractPolicy) -> Vec<LineClass> {
    let mut classes: Vec<LineClass> = lines
        .iter()
        .enumerate()
        .map(|(i, line)| {
            let line = line.as_ref();
            if i < policy.header_lines {
                LineClass::Header
            } else if line.trim().is_empty() {
                LineClass::Blank
            } else if is_row_count_summary(line) {
                LineClass::Footer
            } else {
                LineClass::Row
            }
        })
        .collect();

    if policy.drop_trailing_summary
        && let Some(last) = classes
            .iter()
            .rposition(|c| matches!(c, LineClass::Row | LineClass::Footer))
    {
        classes[last] = LineClass::Footer;
    }

    classes
}

/// Extract stored procedure names from raw client output.
///
/// Duplicates are kept; the scanner collapses them.
pub fn extract_names<S: AsRef<str>>(
    lines: &[S],
    policy: &ExtractPolicy,
    validator: &NameValidator,
) -> Vec<ProcedureName> {
    let classes = classify_lines(lines, policy);
    lines
        .iter()
        .zip(classes)
        .filter(|(_, class)| *class == LineClass::Row)
        .filter_map(|(line, _)| {
            let candidate = line.as_ref().trim();
            if validator.is_valid(candidate) {
                Some(ProcedureName::from(candidate))
            } else {
                tracing::warn!(line = candidate, "skipping row that is not a name");
                None
            }
        })
        .collect()
}

/// Extract user database names from `sp_databases` output.
///
/// The first column is cut using the widths of the separator row. Names in
/// `excluded` are dropped (exact, case-insensitive).
pub fn extract_databases<S: AsRef<str>>(
    lines: &[S],
    policy: &ExtractPolicy,
    validator: &NameValidator,
    excluded: &[String],
) -> Vec<String> {
    let first_column = policy
        .header_lines
        .checked_sub(1)
        .and_then(|i| lines.get(i))
        .and_then(|sep| column_spans(sep.as_ref()))
        .and_then(|spans| spans.into_iter().next());

    let classes = classify_lines(lines, policy);
    lines
        .iter()
        .zip(classes)
        .filter(|(_, class)| *class == LineClass::Row)
        .filter_map(|(line, _)| {
            let line = line.as_ref();
            let cell = match &first_column {
                Some(span) => slice_chars(line, span.clone()),
                None => line.split("  ").next().unwrap_or(line).to_string(),
            };
            let name = cell.trim().to_string();
            if !validator.is_valid(&name) {
                tracing::warn!(line, "skipping row without a database name");
                return None;
            }
            if excluded.iter().any(|sys| sys.eq_ignore_ascii_case(&name)) {
                return None;
            }
            Some(name)
        })
        .collect()
}

/// Last meaningful line of client output, used as a status message.
pub fn status_line<S: AsRef<str>>(lines: &[S]) -> Option<String> {
    lines
        .iter()
        .map(|l| l.as_ref().trim())
        .rfind(|l| !l.is_empty())
        .map(str::to_string)
}

/// Parse `(N rows affected)` / `(1 row affected)`.
fn row_count_summary(input: &str) -> IResult<&str, u64> {
    let (input, _) = char('(')(input)?;
    let (input, n) = digit1(input)?;
    let (input, _) = space1(input)?;
    let (input, _) = tag("row")(input)?;
    let (input, _) = opt(char('s'))(input)?;
    let (input, _) = space1(input)?;
    let (input, _) = tag("affected")(input)?;
    let (input, _) = char(')')(input)?;

    Ok((input, n.parse().unwrap_or(0)))
}

/// Row count reported by a summary line, if `line` is one.
pub fn row_count(line: &str) -> Option<u64> {
    all_consuming(row_count_summary)(line.trim())
        .ok()
        .map(|(_, n)| n)
}

pub fn is_row_count_summary(line: &str) -> bool {
    row_count(line).is_some()
}

/// Parse a separator row: runs of dashes separated by spaces.
fn separator_row(input: &str) -> IResult<&str, Vec<&str>> {
    separated_list1(space1, take_while1(|c: char| c == '-'))(input)
}

/// Column character ranges described by a separator row such as
/// `------ ---- -----`.
pub fn column_spans(separator: &str) -> Option<Vec<Range<usize>>> {
    let trimmed = separator.trim_end();
    let (_, runs) = all_consuming(separator_row)(trimmed).ok()?;
    Some(
        runs.into_iter()
            .map(|run| {
                let start = trimmed.offset(run);
                start..start + run.len()
            })
            .collect(),
    )
}

fn slice_chars(line: &str, span: Range<usize>) -> String {
    line.chars().skip(span.start).take(span.len()).collect()
}
