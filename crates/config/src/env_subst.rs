/// Replace `${ENV_VAR}` placeholders in raw config text.
///
/// Unresolvable variables are left as-is so the parser reports them verbatim.
pub fn substitute_env(input: &str) -> String {
    substitute_env_with(input, |name| std::env::var(name).ok())
}

fn substitute_env_with(input: &str, lookup: impl Fn(&str) -> Option<String>) -> String {
    let mut result = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch != '$' || chars.peek() != Some(&'{') {
            result.push(ch);
            continue;
        }
        chars.next();

        let mut name = String::new();
        let mut closed = false;
        for c in chars.by_ref() {
            if c == '}' {
                closed = true;
                break;
            }
            name.push(c);
        }

        match (closed, lookup(&name)) {
            (true, Some(value)) if !name.is_empty() => result.push_str(&value),
            (true, _) => {
                result.push_str("${");
                result.push_str(&name);
                result.push('}');
            },
            // Unterminated placeholder: emit literally.
            (false, _) => {
                result.push_str("${");
                result.push_str(&name);
            },
        }
    }

    result
}
