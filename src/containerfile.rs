//! Structural parser for Containerfiles and Dockerfiles.
//!
//! This only splits the file into instructions, it does not interpret them.
//! Every instruction keeps its position in the source so callers can go
//! back to the original lines.

use crate::errors::*;

const DEFAULT_ESCAPE: char = '\\';
const HEREDOC_INSTRUCTIONS: &[&str] = &["run", "copy", "add"];

#[derive(Debug, Clone, PartialEq)]
pub struct ParseResult {
    pub ast: Ast,
    pub warnings: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Ast {
    pub children: Vec<Node>,
}

/// A single instruction
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Node {
    /// The instruction keyword, lowercased
    pub value: String,
    /// The instruction as written, with line continuations joined
    pub original: String,
    /// Leading `--name[=value]` arguments
    pub flags: Vec<String>,
    pub args: Vec<String>,
    /// 1-based, inclusive
    pub start_line: usize,
    /// 1-based, inclusive
    pub end_line: usize,
}

impl Node {
    pub fn is_from(&self) -> bool {
        self.value == "from"
    }

    /// The first argument of the instruction, for FROM this is the image.
    pub fn first_arg(&self) -> Option<&str> {
        self.args.first().map(String::as_str)
    }

    /// The `<name>` of a trailing `AS <name>` clause.
    pub fn stage_alias(&self) -> Option<&str> {
        let mut rest = self.args.iter().skip(1);
        rest.find(|arg| arg.eq_ignore_ascii_case("as"))?;
        rest.next().map(String::as_str)
    }
}

pub fn parse(text: &str) -> Result<ParseResult> {
    let text = text.strip_prefix('\u{feff}').unwrap_or(text);
    let lines = text.lines().collect::<Vec<_>>();
    let escape = parse_escape_directive(&lines)?;
    let mut warnings = Vec::new();
    let mut children = Vec::new();

    let mut i = 0;
    while i < lines.len() {
        if is_blank_or_comment(lines[i]) {
            i += 1;
            continue;
        }

        let start = i;
        let mut original = String::new();
        let mut empty_continuation = false;
        loop {
            let line = lines[i];
            match strip_continuation(line, escape) {
                Some(head) => {
                    original.push_str(head);
                    i += 1;
                    // comments and blank lines do not end a continuation
                    while i < lines.len() && is_blank_or_comment(lines[i]) {
                        if lines[i].trim().is_empty() {
                            empty_continuation = true;
                        }
                        i += 1;
                    }
                    if i >= lines.len() {
                        warnings.push(format!(
                            "Line {}: file ends with a line continuation",
                            start + 1
                        ));
                        break;
                    }
                }
                None => {
                    original.push_str(line);
                    i += 1;
                    break;
                }
            }
        }
        if empty_continuation {
            warnings.push(format!(
                "Line {}: empty continuation lines will become errors in a future release",
                start + 1
            ));
        }

        let mut node = split_instruction(original.trim(), start + 1, i);

        if HEREDOC_INSTRUCTIONS.contains(&node.value.as_str()) {
            for heredoc in heredocs(&node.args) {
                match find_heredoc_end(&lines, i, &heredoc) {
                    Some(end) => i = end + 1,
                    None => {
                        warnings.push(format!(
                            "Line {}: unterminated heredoc {:?}",
                            node.start_line, heredoc.name
                        ));
                        i = lines.len();
                    }
                }
            }
            node.end_line = i;
        }

        trace!("Parsed instruction: {node:?}");
        children.push(node);
    }

    if children.is_empty() {
        bail!("file with no instructions");
    }

    Ok(ParseResult {
        ast: Ast { children },
        warnings,
    })
}

fn is_blank_or_comment(line: &str) -> bool {
    let line = line.trim_start();
    line.is_empty() || line.starts_with('#')
}

/// Returns the line without its escape character if it continues on the next line.
fn strip_continuation(line: &str, escape: char) -> Option<&str> {
    line.trim_end().strip_suffix(escape)
}

/// Parser directives are only recognized in the leading comment block.
fn parse_escape_directive(lines: &[&str]) -> Result<char> {
    let mut escape = DEFAULT_ESCAPE;
    for line in lines {
        let Some(directive) = line.trim_start().strip_prefix('#') else {
            break;
        };
        let Some((key, value)) = directive.split_once('=') else {
            break;
        };
        let key = key.trim().to_ascii_lowercase();
        let value = value.trim();
        match key.as_str() {
            "escape" => {
                escape = match value {
                    "\\" => '\\',
                    "`" => '`',
                    _ => bail!("invalid escape token {value:?} does not match ` or \\"),
                };
            }
            "syntax" | "check" => (),
            _ => break,
        }
    }
    Ok(escape)
}

fn split_instruction(logical: &str, start_line: usize, end_line: usize) -> Node {
    let (keyword, rest) = logical
        .split_once(char::is_whitespace)
        .unwrap_or((logical, ""));

    let mut flags = Vec::new();
    let mut args = Vec::new();
    for token in rest.split_whitespace() {
        if args.is_empty() && token.starts_with("--") {
            flags.push(token.to_string());
        } else {
            args.push(token.to_string());
        }
    }

    Node {
        value: keyword.to_ascii_lowercase(),
        original: logical.to_string(),
        flags,
        args,
        start_line,
        end_line,
    }
}

#[derive(Debug, PartialEq)]
struct Heredoc {
    name: String,
    strip_tabs: bool,
}

fn heredocs(args: &[String]) -> Vec<Heredoc> {
    args.iter()
        .filter_map(|arg| {
            // an optional file descriptor may precede the operator, like `3<<EOF`
            let word = arg
                .trim_start_matches(|c: char| c.is_ascii_digit())
                .strip_prefix("<<")?;
            let (word, strip_tabs) = match word.strip_prefix('-') {
                Some(word) => (word, true),
                None => (word, false),
            };
            let name = word.trim_matches(|c| c == '"' || c == '\'');
            let mut chars = name.chars();
            if !chars
                .next()
                .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
                || !chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
            {
                return None;
            }
            Some(Heredoc {
                name: name.to_string(),
                strip_tabs,
            })
        })
        .collect()
}

/// Index of the line terminating the heredoc, searching from `from`.
fn find_heredoc_end(lines: &[&str], from: usize, heredoc: &Heredoc) -> Option<usize> {
    (from..lines.len()).find(|&idx| {
        let line = if heredoc.strip_tabs {
            lines[idx].trim_start_matches('\t')
        } else {
            lines[idx]
        };
        line == heredoc.name
    })
}
