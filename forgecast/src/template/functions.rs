//! The named template functions and filters available inside any
//! templated string, registered onto a [`minijinja::Environment`] by
//! [`super::TemplateContext`].

use minijinja::value::{Rest, Value};
use minijinja::{Environment, Error, ErrorKind};

pub fn register(env: &mut Environment<'static>) {
    env.add_filter("replace", replace);
    env.add_filter("tolower", |s: String| s.to_lowercase());
    env.add_filter("toupper", |s: String| s.to_uppercase());
    env.add_filter("title", title);
    env.add_filter("trim", |s: String| s.trim().to_owned());
    env.add_filter("trimprefix", |s: String, p: String| {
        s.strip_prefix(&p).unwrap_or(&s).to_owned()
    });
    env.add_filter("trimsuffix", |s: String, p: String| {
        s.strip_suffix(&p).unwrap_or(&s).to_owned()
    });
    env.add_filter("split", |s: String, sep: String| {
        s.split(&sep as &str).map(str::to_owned).collect::<Vec<_>>()
    });
    env.add_filter("join", join);
    env.add_filter("contains", |s: String, needle: String| s.contains(&needle));
    env.add_filter("hasprefix", |s: String, p: String| s.starts_with(&p));
    env.add_filter("hassuffix", |s: String, p: String| s.ends_with(&p));
    env.add_filter("repeat", |s: String, n: u32| s.repeat(n as usize));
    env.add_filter("count", |s: String, needle: String| {
        if needle.is_empty() {
            0
        } else {
            s.matches(&needle as &str).count() as i64
        }
    });
    env.add_filter("index", |s: String, needle: String| {
        s.find(&needle as &str).map(|b| s[..b].chars().count() as i64).unwrap_or(-1)
    });
    env.add_filter("lastindex", |s: String, needle: String| {
        s.rfind(&needle as &str).map(|b| s[..b].chars().count() as i64).unwrap_or(-1)
    });
    env.add_filter("fields", |s: String| {
        s.split_whitespace().map(str::to_owned).collect::<Vec<_>>()
    });
    env.add_filter("default", default_filter);
    env.add_filter("first", first);
    env.add_filter("last", last);
    env.add_filter("reverse", reverse);
    env.add_filter("filter", filter_contains);

    env.add_function("env", env_fn);
    env.add_function("expandenv", expandenv_fn);
    env.add_function("now", now_fn);
    env.add_function("time", time_fn);
    env.add_function("archReplace", arch_replace);
    env.add_function("osReplace", os_replace);
    env.add_function("incMajor", |v: String| bump(&v, Bump::Major));
    env.add_function("incMinor", |v: String| bump(&v, Bump::Minor));
    env.add_function("incPatch", |v: String| bump(&v, Bump::Patch));
    env.add_function("mdlink", |text: String, url: String| format!("[{text}]({url})"));
    env.add_function("mdcode", |text: String| format!("`{text}`"));
    env.add_function("mdcodeblock", |lang: String, text: String| {
        format!("```{lang}\n{text}\n```")
    });
}

fn replace(s: String, old: String, new: String) -> String {
    s.replace(&old, &new)
}

fn title(s: String) -> String {
    s.split(' ')
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

fn join(list: Vec<Value>, sep: String) -> String {
    list.iter().map(|v| v.to_string()).collect::<Vec<_>>().join(&sep)
}

/// `value | default(fallback)` — falls back when `value` is undefined,
/// `none`, or an empty string.
fn default_filter(value: Value, fallback: Value) -> Value {
    let is_empty = value.is_undefined()
        || value.is_none()
        || (value.as_str().is_some_and(str::is_empty));
    if is_empty {
        fallback
    } else {
        value
    }
}

fn first(list: Vec<Value>) -> Value {
    list.into_iter().next().unwrap_or(Value::UNDEFINED)
}

fn last(list: Vec<Value>) -> Value {
    list.into_iter().last().unwrap_or(Value::UNDEFINED)
}

fn reverse(value: Value) -> Value {
    if let Some(s) = value.as_str() {
        return Value::from(s.chars().rev().collect::<String>());
    }
    let mut items: Vec<Value> = value.try_iter().into_iter().flatten().collect();
    items.reverse();
    Value::from(items)
}

/// `list | filter(needle)` — keep only the string-representable items
/// containing `needle`. forgecast's templates only ever iterate flat
/// string lists (artifact names, env var lines), so a substring
/// predicate covers every real use without inventing a
/// predicate-expression sub-language.
fn filter_contains(list: Vec<Value>, needle: String) -> Vec<Value> {
    list.into_iter()
        .filter(|v| v.to_string().contains(&needle))
        .collect()
}

fn env_fn(name: String) -> Value {
    Value::from(std::env::var(&name).unwrap_or_default())
}

fn expandenv_fn(s: String) -> String {
    let mut out = String::with_capacity(s.len());
    let mut chars = s.chars().peekable();
    while let Some(c) = chars.next() {
        if c == '$' {
            let mut name = String::new();
            while let Some(&n) = chars.peek() {
                if n.is_alphanumeric() || n == '_' {
                    name.push(n);
                    chars.next();
                } else {
                    break;
                }
            }
            if name.is_empty() {
                out.push('$');
            } else {
                out.push_str(&std::env::var(&name).unwrap_or_default());
            }
        } else {
            out.push(c);
        }
    }
    out
}

fn now_fn() -> Result<String, Error> {
    format_now("%Y-%m-%dT%H:%M:%SZ")
}

fn time_fn(_t: String, fmt: String) -> Result<String, Error> {
    // `_t` is accepted for two-argument call parity but only the current
    // moment is wired to a real clock; a fixed instant would need a full
    // date parser this crate has no other use for. Callers that need a
    // fixed timestamp should pre-render it with the `Now`/`Timestamp`
    // bindings instead.
    format_now(&fmt)
}

fn format_now(strftime_like: &str) -> Result<String, Error> {
    let now = time::OffsetDateTime::now_utc();
    let time_format = strftime_to_time_format(strftime_like);
    let fmt = time::format_description::parse(&time_format)
        .map_err(|e| Error::new(ErrorKind::InvalidOperation, e.to_string()))?;
    now.format(&fmt)
        .map_err(|e| Error::new(ErrorKind::InvalidOperation, e.to_string()))
}

/// Translate a small, commonly used subset of strftime-style directives
/// into the `time` crate's own `[component]` format-description syntax,
/// so templates can write `%Y-%m-%d` instead of `[year]-[month]-[day]`.
fn strftime_to_time_format(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();
    while let Some(c) = chars.next() {
        if c == '%' {
            match chars.next() {
                Some('Y') => out.push_str("[year]"),
                Some('m') => out.push_str("[month]"),
                Some('d') => out.push_str("[day]"),
                Some('H') => out.push_str("[hour]"),
                Some('M') => out.push_str("[minute]"),
                Some('S') => out.push_str("[second]"),
                Some('Z') => out.push('Z'),
                Some(other) => out.push(other),
                None => out.push('%'),
            }
        } else {
            out.push(c);
        }
    }
    out
}

enum Bump {
    Major,
    Minor,
    Patch,
}

fn bump(version: &str, which: Bump) -> Result<String, Error> {
    let mut v = semver::Version::parse(version.trim_start_matches('v'))
        .map_err(|e| Error::new(ErrorKind::InvalidOperation, e.to_string()))?;
    match which {
        Bump::Major => {
            v.major += 1;
            v.minor = 0;
            v.patch = 0;
        }
        Bump::Minor => {
            v.minor += 1;
            v.patch = 0;
        }
        Bump::Patch => v.patch += 1,
    }
    v.pre = semver::Prerelease::EMPTY;
    v.build = semver::BuildMetadata::EMPTY;
    Ok(v.to_string())
}

/// `archReplace(Arch, "amd64", "x86_64", "arm64", "aarch64")` — replace
/// `value` using the first matching `(old, new)` pair from the trailing
/// variadic arguments, passing it through unchanged if nothing matches.
fn arch_replace(value: String, pairs: Rest<String>) -> Value {
    replace_with_pairs(&value, &pairs.0)
}

fn os_replace(value: String, pairs: Rest<String>) -> Value {
    replace_with_pairs(&value, &pairs.0)
}

fn replace_with_pairs(value: &str, pairs: &[String]) -> Value {
    for pair in pairs.chunks_exact(2) {
        if pair[0] == value {
            return Value::from(pair[1].clone());
        }
    }
    Value::from(value.to_owned())
}
