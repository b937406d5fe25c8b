use crate::pattern::Pattern;

const QUOTE: char = '\'';
const DELIMITER: char = ' ';

/// Split a statement into positional tokens
///
/// Spaces separate tokens outside single-quoted literals. The quote character toggles
/// literal mode and is never emitted. The last accumulated token is always appended, so
/// a trailing delimiter yields a trailing empty token.
pub fn tokenize(line: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut quoted = false;

    for c in line.chars() {
        match c {
            QUOTE => quoted = !quoted,
            DELIMITER if !quoted => tokens.push(std::mem::take(&mut current)),
            _ => current.push(c),
        }
    }

    tokens.push(current);
    tokens
}

/// Strip the log prefix (timestamp, session id, ...) in front of the statement
///
/// Returns the line from the first pattern include string found, minus one trailing
/// newline. Lines where no include string occurs are returned unchanged.
pub fn normalize<'a>(line: &'a str, patterns: &[Pattern]) -> &'a str {
    let Some(start) = patterns.iter().find_map(|p| line.find(p.include())) else {
        return line;
    };

    let statement = &line[start..];
    statement
        .strip_suffix("\r\n")
        .or_else(|| statement.strip_suffix('\n'))
        .unwrap_or(statement)
}
