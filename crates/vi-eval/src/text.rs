//! Text interpolation: `"Count: {count}"`, `"{user.name}"`, `"{{literal}}"`.

/// Replace `{path}` placeholders using `lookup`.
///
/// A path is one or more identifiers joined by dots. `{{path}}` is an
/// escape and produces `{path}`. Placeholders that `lookup` cannot resolve
/// are left as written. Braces that do not form a placeholder are copied
/// through.
pub fn interpolate(template: &str, mut lookup: impl FnMut(&str) -> Option<String>) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(open) = rest.find('{') {
        out.push_str(&rest[..open]);
        let tail = &rest[open..];

        if let Some(inner) = tail.strip_prefix("{{") {
            if let Some(path) = placeholder(inner, "}}") {
                out.push('{');
                out.push_str(path);
                out.push('}');
                rest = &inner[path.len() + 2..];
                continue;
            }
        }

        match placeholder(&tail[1..], "}") {
            Some(path) => {
                match lookup(path) {
                    Some(text) => out.push_str(&text),
                    None => {
                        out.push('{');
                        out.push_str(path);
                        out.push('}');
                    }
                }
                rest = &tail[path.len() + 2..];
            }
            None => {
                out.push('{');
                rest = &tail[1..];
            }
        }
    }
    out.push_str(rest);
    out
}

/// Placeholder paths referenced by `template`, in order of appearance.
pub fn placeholders(template: &str) -> Vec<String> {
    let mut found = Vec::new();
    interpolate(template, |path| {
        found.push(path.to_string());
        None
    });
    found
}

/// The identifier path at the start of `text` if it is followed by `close`.
fn placeholder<'a>(text: &'a str, close: &str) -> Option<&'a str> {
    let end = text.find(close)?;
    let path = &text[..end];
    is_path(path).then_some(path)
}

fn is_path(path: &str) -> bool {
    !path.is_empty() && path.split('.').all(is_ident)
}

fn is_ident(segment: &str) -> bool {
    let mut chars = segment.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

#[cfg(test)]
mod tests {
    use super::*;

    fn count(path: &str) -> Option<String> {
        match path {
            "count" => Some("5".to_string()),
            "user.name" => Some("Ada".to_string()),
            _ => None,
        }
    }

    #[test]
    fn replaces_names_and_paths() {
        assert_eq!(interpolate("Count: {count}", count), "Count: 5");
        assert_eq!(interpolate("Hi {user.name}!", count), "Hi Ada!");
    }

    #[test]
    fn double_braces_escape() {
        assert_eq!(interpolate("Use {{count}}", count), "Use {count}");
    }

    #[test]
    fn unknown_and_malformed_placeholders_are_kept() {
        assert_eq!(interpolate("{missing} and {not a name}", count), "{missing} and {not a name}");
        assert_eq!(interpolate("open { brace", count), "open { brace");
        assert_eq!(interpolate("{count", count), "{count");
    }

    #[test]
    fn lists_placeholders() {
        assert_eq!(placeholders("{a} {{b}} {c.d}"), vec!["a".to_string(), "c.d".to_string()]);
    }
}
