//! `${VAR}` and `${VAR:-fallback}` expansion over raw config text.

/// A `${...}` reference found in config text.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Placeholder<'a> {
    /// Byte range of the whole `${...}` token.
    start: usize,
    end: usize,
    name: &'a str,
    fallback: Option<&'a str>,
}

fn next_placeholder(input: &str, from: usize) -> Option<Placeholder<'_>> {
    let open = input[from..].find("${")? + from;
    let close = input[open + 2..].find('}')? + open + 2;
    let body = &input[open + 2..close];
    let (name, fallback) = match body.split_once(":-") {
        Some((name, fallback)) => (name, Some(fallback)),
        None => (body, None),
    };
    Some(Placeholder {
        start: open,
        end: close + 1,
        name,
        fallback,
    })
}

fn is_valid_name(name: &str) -> bool {
    !name.is_empty() && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Expand placeholders from the process environment. References that
/// cannot be resolved are kept verbatim.
pub fn substitute_env(input: &str) -> String {
    expand(input, |name| std::env::var(name).ok())
}

/// Names referenced in `input` that neither the environment nor a fallback
/// can satisfy.
pub fn unresolved_vars(input: &str) -> Vec<String> {
    unresolved_with(input, |name| std::env::var(name).ok())
}

fn expand(input: &str, lookup: impl Fn(&str) -> Option<String>) -> String {
    let mut out = String::with_capacity(input.len());
    let mut cursor = 0;
    while let Some(p) = next_placeholder(input, cursor) {
        out.push_str(&input[cursor..p.start]);
        let value = is_valid_name(p.name)
            .then(|| lookup(p.name))
            .flatten()
            .or_else(|| p.fallback.map(str::to_string));
        match value {
            Some(value) => out.push_str(&value),
            None => out.push_str(&input[p.start..p.end]),
        }
        cursor = p.end;
    }
    out.push_str(&input[cursor..]);
    out
}

fn unresolved_with(input: &str, lookup: impl Fn(&str) -> Option<String>) -> Vec<String> {
    let mut missing = Vec::new();
    let mut cursor = 0;
    while let Some(p) = next_placeholder(input, cursor) {
        if is_valid_name(p.name)
            && p.fallback.is_none()
            && lookup(p.name).is_none()
            && !missing.iter().any(|m| m == p.name)
        {
            missing.push(p.name.to_string());
        }
        cursor = p.end;
    }
    missing
}

#[cfg(test)]
mod tests {
    use super::*;

    fn env(name: &str) -> Option<String> {
        match name {
            "FERRY_TG_TOKEN" => Some("123:abc".into()),
            "FERRY_CHAT" => Some("-100500".into()),
            _ => None,
        }
    }

    #[test]
    fn expands_known_vars() {
        assert_eq!(
            expand("token = \"${FERRY_TG_TOKEN}\"\nsource_chat_id = ${FERRY_CHAT}", env),
            "token = \"123:abc\"\nsource_chat_id = -100500"
        );
    }

    #[test]
    fn fallback_used_only_when_unset() {
        assert_eq!(expand("${FERRY_CHAT:-1}", env), "-100500");
        assert_eq!(expand("${FERRY_DAYS:-30}", env), "30");
        assert_eq!(expand("${FERRY_EMPTY:-}", env), "");
    }

    #[test]
    fn unknown_and_malformed_refs_are_kept() {
        assert_eq!(expand("${FERRY_MISSING}", env), "${FERRY_MISSING}");
        assert_eq!(expand("a ${not a name} b", env), "a ${not a name} b");
        assert_eq!(expand("cost: $5 ${unterminated", env), "cost: $5 ${unterminated");
    }

    #[test]
    fn reports_unresolved_names_once() {
        let text = "${FERRY_TG_TOKEN} ${DISCORD_TOKEN} ${DISCORD_TOKEN} ${DAYS:-3}";
        assert_eq!(unresolved_with(text, env), vec!["DISCORD_TOKEN".to_string()]);
    }
}
