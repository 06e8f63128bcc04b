//! Syntactic sugar over minijinja so user-facing templates can use a
//! Go-template-flavored surface (`{{ .Field }}`, `if(cond, a, b)`,
//! `{{ .Version | default "0.0.0" }}`) while the engine underneath is
//! plain minijinja.
//!
//! Three rewrites happen, in order, all scoped to `{{ ... }}` expression
//! blocks only (never inside `{% ... %}` statements, which this crate
//! doesn't expose to users):
//!
//! 1. A leading `.` before an identifier is the Go-template idiom for
//!    "look up this field on the current context" — minijinja's context is
//!    already the top-level namespace, so `.Field` is rewritten to `Field`.
//! 2. Go-template calls a filter or function with its arguments separated
//!    by whitespace (`default "0.0.0"`, `env "NOT_SET"`), but minijinja's
//!    filters and functions are plain Rust functions registered on the
//!    environment and only accept the parenthesized call form. `default
//!    "0.0.0"` is rewritten to `default("0.0.0")`, `env "NOT_SET"` to
//!    `env("NOT_SET")`, and so on for every such space-call.
//! 3. `if(cond, a, b)` is rewritten to minijinja's native conditional
//!    expression `(a) if (cond) else (b)`, because `if` is a statement
//!    keyword in minijinja's grammar and can't be registered as a callable
//!    function.

/// Rewrite one template source string before handing it to minijinja.
pub fn rewrite(source: &str) -> String {
    let mut out = String::with_capacity(source.len());
    let bytes = source.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'{' && bytes.get(i + 1) == Some(&b'{') {
            let Some(end) = find_block_end(source, i + 2) else {
                out.push_str(&source[i..]);
                break;
            };
            let inner = &source[i + 2..end];
            out.push_str("{{");
            out.push_str(&rewrite_expr(inner));
            out.push_str("}}");
            i = end + 2;
        } else {
            out.push(bytes[i] as char);
            i += 1;
        }
    }
    out
}

fn find_block_end(source: &str, from: usize) -> Option<usize> {
    source[from..].find("}}").map(|p| from + p)
}

fn rewrite_expr(expr: &str) -> String {
    let stripped = strip_leading_dots(expr);
    let paren_calls = rewrite_space_calls(&stripped);
    rewrite_if_calls(&paren_calls)
}

/// Replace a `.` immediately preceding an identifier-start character, where
/// the dot itself is at the start of the expression or preceded by
/// whitespace, `(`, `|`, `,` or `{` (i.e. it's in "atom" position, not part
/// of a float literal like `1.0` or a already-resolved `a.b` attribute
/// path, neither of which this template surface uses).
fn strip_leading_dots(expr: &str) -> String {
    let chars: Vec<char> = expr.chars().collect();
    let mut out = String::with_capacity(expr.len());
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        if c == '.' {
            let prev_ok = match out.chars().last() {
                None => true,
                Some(p) => p.is_whitespace() || matches!(p, '(' | '|' | ',' | '{'),
            };
            let next_is_ident_start = chars
                .get(i + 1)
                .is_some_and(|n| n.is_alphabetic() || *n == '_');
            if prev_ok && next_is_ident_start {
                i += 1;
                continue;
            }
        }
        out.push(c);
        i += 1;
    }
    out
}

/// A single lexical token of a minijinja expression, coarse enough to spot
/// Go-template space-calls without implementing the whole grammar.
#[derive(Debug, Clone, PartialEq)]
enum Token {
    Ident(String),
    Str(String),
    Num(String),
    Open,
    Close,
    Comma,
    Other(String),
}

impl Token {
    fn text(&self) -> &str {
        match self {
            Token::Ident(s) | Token::Str(s) | Token::Num(s) | Token::Other(s) => s,
            Token::Open => "(",
            Token::Close => ")",
            Token::Comma => ",",
        }
    }
}

/// Identifiers that can never start a space-call: minijinja keywords and
/// operators that happen to lex as words, plus the boolean/null literals.
const RESERVED_WORDS: &[&str] =
    &["if", "else", "elif", "and", "or", "not", "is", "in", "true", "false", "none"];

fn tokenize(expr: &str) -> Vec<Token> {
    let chars: Vec<char> = expr.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        if c.is_whitespace() {
            i += 1;
            continue;
        }
        if c == '"' || c == '\'' {
            let quote = c;
            let start = i;
            i += 1;
            while i < chars.len() && chars[i] != quote {
                i += 1;
            }
            if i < chars.len() {
                i += 1;
            }
            tokens.push(Token::Str(chars[start..i].iter().collect()));
            continue;
        }
        if c.is_ascii_digit() {
            let start = i;
            while i < chars.len() && (chars[i].is_ascii_digit() || chars[i] == '.') {
                i += 1;
            }
            tokens.push(Token::Num(chars[start..i].iter().collect()));
            continue;
        }
        if c.is_alphabetic() || c == '_' {
            let start = i;
            while i < chars.len() && (chars[i].is_alphanumeric() || chars[i] == '_') {
                i += 1;
            }
            tokens.push(Token::Ident(chars[start..i].iter().collect()));
            continue;
        }
        match c {
            '(' => tokens.push(Token::Open),
            ')' => tokens.push(Token::Close),
            ',' => tokens.push(Token::Comma),
            _ => {
                if i + 1 < chars.len() {
                    let two: String = chars[i..=i + 1].iter().collect();
                    if matches!(two.as_str(), "==" | "!=" | ">=" | "<=") {
                        tokens.push(Token::Other(two));
                        i += 2;
                        continue;
                    }
                }
                tokens.push(Token::Other(c.to_string()));
            }
        }
        i += 1;
    }
    tokens
}

/// Whether `token` can start (or continue) a space-separated argument list:
/// a string/number literal, or an identifier that isn't itself a keyword.
fn is_value_start(token: &Token) -> bool {
    match token {
        Token::Str(_) | Token::Num(_) => true,
        Token::Ident(name) => !RESERVED_WORDS.contains(&name.as_str()),
        Token::Open | Token::Close | Token::Comma | Token::Other(_) => false,
    }
}

/// Rewrite Go-template "space call" syntax — a bare filter/function name
/// followed by one or more whitespace-separated arguments with no
/// parentheses (`default "0.0.0"`, `env "NOT_SET"`, `replace "-" "_"`) —
/// into minijinja's own parenthesized call syntax (`default("0.0.0")`, ...).
/// Already-parenthesized calls, and unrelated constructs that merely look
/// similar (`x is defined`, `a and b`), are left untouched.
fn rewrite_space_calls(expr: &str) -> String {
    let tokens = tokenize(expr);
    let mut out: Vec<Token> = Vec::new();
    let mut i = 0;
    while i < tokens.len() {
        if let Token::Ident(name) = &tokens[i] {
            let callable = !RESERVED_WORDS.contains(&name.as_str());
            let starts_args = tokens.get(i + 1).is_some_and(is_value_start);
            if callable && starts_args {
                let mut args = Vec::new();
                let mut j = i + 1;
                while j < tokens.len() && is_value_start(&tokens[j]) {
                    args.push(tokens[j].text().to_owned());
                    j += 1;
                }
                out.push(Token::Other(format!("{name}({})", args.join(", "))));
                i = j;
                continue;
            }
        }
        out.push(tokens[i].clone());
        i += 1;
    }
    join_tokens(&out)
}

/// Re-assemble a token list, keeping parens and commas tight against their
/// neighbors (`if(cond, a, b)` not `if ( cond , a , b )`) and a single space
/// everywhere else.
fn join_tokens(tokens: &[Token]) -> String {
    let mut out = String::new();
    let mut prev: Option<&Token> = None;
    for token in tokens {
        let no_space_before = prev.is_none()
            || matches!(token, Token::Close | Token::Comma | Token::Open)
            || matches!(prev, Some(Token::Open));
        if !no_space_before {
            out.push(' ');
        }
        out.push_str(token.text());
        prev = Some(token);
    }
    out
}

/// Rewrite every top-level `if(cond, a, b)` call to a minijinja ternary,
/// recursing into each argument first so nested `if(...)` calls resolve
/// inside-out.
fn rewrite_if_calls(expr: &str) -> String {
    let chars: Vec<char> = expr.chars().collect();
    let mut out = String::new();
    let mut i = 0;
    while i < chars.len() {
        if is_if_call_start(&chars, i) {
            let open = i + 2; // past "if"
            if let Some(close) = matching_paren(&chars, open) {
                let args_src: String = chars[open + 1..close].iter().collect();
                if let Some([cond, a, b]) = split_top_level_args(&args_src) {
                    let cond = rewrite_if_calls(cond.trim());
                    let a = rewrite_if_calls(a.trim());
                    let b = rewrite_if_calls(b.trim());
                    out.push_str(&format!("({a}) if ({cond}) else ({b})"));
                    i = close + 1;
                    continue;
                }
            }
        }
        out.push(chars[i]);
        i += 1;
    }
    out
}

fn is_if_call_start(chars: &[char], i: usize) -> bool {
    if chars.get(i) != Some(&'i') || chars.get(i + 1) != Some(&'f') || chars.get(i + 2) != Some(&'(')
    {
        return false;
    }
    let prev_ok = i == 0
        || chars
            .get(i - 1)
            .is_some_and(|p| !(p.is_alphanumeric() || *p == '_'));
    prev_ok
}

fn matching_paren(chars: &[char], open: usize) -> Option<usize> {
    let mut depth = 0i32;
    let mut in_string: Option<char> = None;
    for (offset, &c) in chars.iter().enumerate().skip(open) {
        if let Some(q) = in_string {
            if c == q {
                in_string = None;
            }
            continue;
        }
        match c {
            '"' | '\'' => in_string = Some(c),
            '(' => depth += 1,
            ')' => {
                depth -= 1;
                if depth == 0 {
                    return Some(offset);
                }
            }
            _ => {}
        }
    }
    None
}

fn split_top_level_args(src: &str) -> Option<[&str; 3]> {
    let chars: Vec<char> = src.chars().collect();
    let mut depth = 0i32;
    let mut in_string: Option<char> = None;
    let mut splits = Vec::new();
    for (i, &c) in chars.iter().enumerate() {
        if let Some(q) = in_string {
            if c == q {
                in_string = None;
            }
            continue;
        }
        match c {
            '"' | '\'' => in_string = Some(c),
            '(' => depth += 1,
            ')' => depth -= 1,
            ',' if depth == 0 => splits.push(i),
            _ => {}
        }
    }
    if splits.len() != 2 {
        return None;
    }
    let byte_splits: Vec<usize> = splits
        .iter()
        .map(|&char_idx| src.char_indices().nth(char_idx).map(|(b, _)| b).unwrap())
        .collect();
    Some([
        &src[..byte_splits[0]],
        &src[byte_splits[0] + 1..byte_splits[1]],
        &src[byte_splits[1] + 1..],
    ])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_leading_dot_field_access() {
        assert_eq!(rewrite("{{ .Version }}"), "{{ Version }}");
        assert_eq!(
            rewrite("{{ .Version | default \"0.0.0\" }}-{{ .Os }}"),
            "{{ Version | default(\"0.0.0\") }}-{{ Os }}"
        );
    }

    #[test]
    fn leaves_plain_text_and_numeric_dots_alone() {
        assert_eq!(rewrite("plain text, no fields"), "plain text, no fields");
        assert_eq!(rewrite("{{ \"0.0.0\" }}"), "{{ \"0.0.0\" }}");
    }

    #[test]
    fn rewrites_if_calls_to_ternary() {
        assert_eq!(
            rewrite("{{ if(.IsPrerelease, \"pre\", \"stable\") }}"),
            "{{ (\"pre\") if (IsPrerelease) else (\"stable\") }}"
        );
    }

    #[test]
    fn rewrites_space_separated_filter_args_to_paren_calls() {
        assert_eq!(rewrite("{{ .Version | default \"0.0.0\" }}"), "{{ Version | default(\"0.0.0\") }}");
    }

    #[test]
    fn rewrites_space_called_functions_chained_with_a_filter() {
        assert_eq!(
            rewrite("{{ env \"NOT_SET\" | default \"x\" }}"),
            "{{ env(\"NOT_SET\") | default(\"x\") }}"
        );
    }

    #[test]
    fn rewrites_multi_argument_space_calls() {
        assert_eq!(rewrite("{{ .Os | replace \"darwin\" \"macos\" }}"), "{{ Os | replace(\"darwin\", \"macos\") }}");
    }

    #[test]
    fn leaves_already_parenthesized_calls_untouched() {
        assert_eq!(
            rewrite("{{ archReplace(.Arch, \"amd64\", \"x86_64\") }}"),
            "{{ archReplace(Arch, \"amd64\", \"x86_64\") }}"
        );
    }

    #[test]
    fn does_not_mistake_is_tests_or_boolean_operators_for_space_calls() {
        assert_eq!(rewrite("{{ .Tag is defined }}"), "{{ Tag is defined }}");
        assert_eq!(rewrite("{{ .A and .B }}"), "{{ A and B }}");
    }
}
