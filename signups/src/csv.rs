//! Minimal CSV codec for the signup files.
//!
//! Writing quotes a field only when it contains a comma, a double quote, or a
//! line break. Reading honors quoted fields spanning lines and accepts both
//! `\n` and `\r\n`. A malformed record does not abort the parse: it is
//! reported as a [`ParseError`] and reading resumes on the next physical line.

use thiserror::Error;

/// Why a record could not be parsed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseErrorKind {
    #[error("unterminated quoted field")]
    UnterminatedQuote,

    #[error("unexpected character {0:?} after closing quote")]
    GarbageAfterQuote(char),
}

/// A skipped record, located by the physical line it started on.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("line {line}: {kind}")]
pub struct ParseError {
    pub line: usize,
    pub kind: ParseErrorKind,
}

/// One parsed record and the physical line it started on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    pub line: usize,
    pub fields: Vec<String>,
}

/// Result of parsing a whole document.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Parsed {
    /// Non-blank records in file order, header first.
    pub records: Vec<Record>,
    pub errors: Vec<ParseError>,
}

/// Escape a single field value.
pub fn escape_field(value: &str) -> String {
    if value.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

/// Serialize one record as a newline-terminated line.
pub fn format_record<S: AsRef<str>>(fields: &[S]) -> String {
    let mut line = fields
        .iter()
        .map(|f| escape_field(f.as_ref()))
        .collect::<Vec<_>>()
        .join(",");
    line.push('\n');
    line
}

/// Split `content` into its first line (without terminator) and the rest,
/// where the rest starts with the original line terminator.
pub fn split_first_line(content: &str) -> (&str, &str) {
    let end = content.find('\n').unwrap_or(content.len());
    let header_end = if content[..end].ends_with('\r') {
        end - 1
    } else {
        end
    };
    content.split_at(header_end)
}

/// Parse a header line into trimmed column names.
pub fn parse_header(line: &str) -> Vec<String> {
    let line = line.strip_prefix('\u{feff}').unwrap_or(line);
    let (outcome, _) = read_record(line, 0);
    match outcome {
        Ok(fields) => fields.into_iter().map(|f| f.trim().to_string()).collect(),
        Err(_) => line
            .split(',')
            .map(|f| f.trim().trim_matches('"').trim().to_string())
            .collect(),
    }
}

/// Parse a whole document.
pub fn parse(text: &str) -> Parsed {
    let text = text.strip_prefix('\u{feff}').unwrap_or(text);
    let mut parsed = Parsed::default();
    let mut pos = 0;
    let mut line = 1;

    while pos < text.len() {
        let (outcome, next) = read_record(text, pos);
        match outcome {
            Ok(fields) if is_blank(&fields) => {}
            Ok(fields) => parsed.records.push(Record { line, fields }),
            Err(kind) => parsed.errors.push(ParseError { line, kind }),
        }
        line += text[pos..next].matches('\n').count();
        pos = next;
    }

    parsed
}

/// Cut every well-formed record wider than `width` fields down to `width`.
/// Narrower records, blank lines and malformed spans are copied byte for byte.
pub fn truncate_records(text: &str, width: usize) -> String {
    let mut out = String::with_capacity(text.len());
    let mut pos = 0;

    while pos < text.len() {
        let (outcome, next) = read_record(text, pos);
        let raw = &text[pos..next];
        match outcome {
            Ok(fields) if fields.len() > width => {
                let line = format_record(&fields[..width]);
                let terminator = ["\r\n", "\n", "\r"]
                    .into_iter()
                    .find(|t| raw.ends_with(t))
                    .unwrap_or("");
                out.push_str(line.trim_end_matches('\n'));
                out.push_str(terminator);
            }
            _ => out.push_str(raw),
        }
        pos = next;
    }

    out
}

fn is_blank(fields: &[String]) -> bool {
    fields.len() == 1 && fields[0].trim().is_empty()
}

/// Byte offset just past the physical line containing `from`.
fn next_line(text: &str, from: usize) -> usize {
    text[from..]
        .find('\n')
        .map_or(text.len(), |offset| from + offset + 1)
}

#[derive(Clone, Copy)]
enum State {
    FieldStart,
    Unquoted,
    Quoted,
    AfterQuote,
}

/// Read one record starting at byte `start`. Returns the outcome and the byte
/// offset where the next record begins.
fn read_record(text: &str, start: usize) -> (Result<Vec<String>, ParseErrorKind>, usize) {
    let mut fields = Vec::new();
    let mut field = String::new();
    let mut state = State::FieldStart;
    let mut chars = text[start..].char_indices().peekable();

    while let Some((offset, c)) = chars.next() {
        let at = start + offset;
        match (state, c) {
            (State::Quoted, '"') => {
                if matches!(chars.peek(), Some((_, '"'))) {
                    chars.next();
                    field.push('"');
                } else {
                    state = State::AfterQuote;
                }
            }
            (State::Quoted, _) => field.push(c),
            (_, ',') => {
                fields.push(std::mem::take(&mut field));
                state = State::FieldStart;
            }
            (_, '\n') => {
                fields.push(field);
                return (Ok(fields), at + 1);
            }
            (_, '\r') => {
                fields.push(field);
                let next = if matches!(chars.peek(), Some((_, '\n'))) {
                    at + 2
                } else {
                    at + 1
                };
                return (Ok(fields), next);
            }
            (State::FieldStart, '"') => state = State::Quoted,
            (State::AfterQuote, ' ' | '\t') => {}
            (State::AfterQuote, _) => {
                return (Err(ParseErrorKind::GarbageAfterQuote(c)), next_line(text, at));
            }
            (State::FieldStart | State::Unquoted, _) => {
                field.push(c);
                state = State::Unquoted;
            }
        }
    }

    if matches!(state, State::Quoted) {
        return (
            Err(ParseErrorKind::UnterminatedQuote),
            next_line(text, start),
        );
    }
    fields.push(field);
    (Ok(fields), text.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn rows(parsed: &Parsed) -> Vec<Vec<&str>> {
        parsed
            .records
            .iter()
            .map(|r| r.fields.iter().map(String::as_str).collect())
            .collect()
    }

    #[test]
    fn escapes_only_when_needed() {
        assert_eq!(escape_field("plain"), "plain");
        assert_eq!(escape_field("a,b"), "\"a,b\"");
        assert_eq!(escape_field("Hi, \"friend\""), "\"Hi, \"\"friend\"\"\"");
        assert_eq!(escape_field("two\nlines"), "\"two\nlines\"");
        assert_eq!(escape_field(""), "");
    }

    #[test]
    fn format_record_terminates_line() {
        assert_eq!(format_record(&["a", "b,c", ""]), "a,\"b,c\",\n");
    }

    #[test]
    fn parses_quoted_commas_quotes_and_newlines() {
        let text = "h1,h2\n\"a,b\",\"say \"\"hi\"\"\"\n\"multi\nline\",x\n";
        let parsed = parse(text);
        assert!(parsed.errors.is_empty());
        assert_eq!(
            rows(&parsed),
            vec![
                vec!["h1", "h2"],
                vec!["a,b", "say \"hi\""],
                vec!["multi\nline", "x"],
            ]
        );
        assert_eq!(parsed.records[2].line, 3);
    }

    #[test]
    fn accepts_crlf_and_skips_blank_lines() {
        let parsed = parse("a,b\r\n\r\n1,2\r\n   \n3,4");
        assert_eq!(rows(&parsed), vec![vec!["a", "b"], vec!["1", "2"], vec!["3", "4"]]);
        assert_eq!(parsed.records[2].line, 5);
    }

    #[test]
    fn strips_byte_order_mark() {
        let parsed = parse("\u{feff}timestamp,name\n1,Jo\n");
        assert_eq!(parsed.records[0].fields[0], "timestamp");
    }

    #[test]
    fn unterminated_quote_skips_one_line_only() {
        let parsed = parse("a,b\n\"broken,1\n2,3\n");
        assert_eq!(rows(&parsed), vec![vec!["a", "b"], vec!["2", "3"]]);
        assert_eq!(
            parsed.errors,
            vec![ParseError {
                line: 2,
                kind: ParseErrorKind::UnterminatedQuote,
            }]
        );
    }

    #[test]
    fn garbage_after_quote_is_reported() {
        let parsed = parse("a,b\n\"x\"y,1\nok,2\n");
        assert_eq!(rows(&parsed), vec![vec!["a", "b"], vec!["ok", "2"]]);
        assert_eq!(parsed.errors[0].kind, ParseErrorKind::GarbageAfterQuote('y'));
    }

    #[test]
    fn stray_quote_inside_unquoted_field_is_literal() {
        let parsed = parse("a\n5'11\" tall\n");
        assert_eq!(rows(&parsed)[1], vec!["5'11\" tall"]);
    }

    #[test]
    fn split_first_line_keeps_terminator_in_rest() {
        assert_eq!(split_first_line("h1,h2\r\nrow\n"), ("h1,h2", "\r\nrow\n"));
        assert_eq!(split_first_line("h1,h2\nrow"), ("h1,h2", "\nrow"));
        assert_eq!(split_first_line("only"), ("only", ""));
    }

    #[test]
    fn truncate_records_cuts_only_wide_rows() {
        let text = "\na,b,c,d\r\nshort\n\"x,y\",\"multi\nline\",9\n\"bad\" z,1,2\n";
        assert_eq!(
            truncate_records(text, 2),
            "\na,b\r\nshort\n\"x,y\",\"multi\nline\"\n\"bad\" z,1,2\n"
        );
        assert_eq!(truncate_records("\nno,change\n", 2), "\nno,change\n");
    }

    #[test]
    fn parse_header_trims_names() {
        assert_eq!(
            parse_header(" timestamp , name,\"e,mail\""),
            vec!["timestamp", "name", "e,mail"]
        );
    }
}
