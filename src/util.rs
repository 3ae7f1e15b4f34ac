/// Writes `values` into `out` through `f`, inserting `separator` between
/// items that produced output.
pub fn separated_by<T, F>(
    out: &mut String,
    values: impl IntoIterator<Item = T>,
    mut f: F,
    separator: &str,
) where
    F: FnMut(&mut String, T),
{
    let mut len = out.len();
    for v in values {
        if out.len() > len {
            out.push_str(separator);
        }
        len = out.len();
        f(out, v);
    }
}

/// `camelCase` / `PascalCase` to `snake_case`. Already-snake input passes
/// through unchanged.
pub fn snake_case(value: &str) -> String {
    let mut out = String::with_capacity(value.len() + 4);
    for (i, c) in value.chars().enumerate() {
        if c.is_ascii_uppercase() {
            if i > 0 {
                out.push('_');
            }
            out.push(c.to_ascii_lowercase());
        } else {
            out.push(c);
        }
    }
    out
}

/// `snake_case` / `camelCase` to `PascalCase`.
pub fn pascal_case(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut upper_next = true;
    for c in value.chars() {
        if c == '_' {
            upper_next = true;
        } else if upper_next {
            out.push(c.to_ascii_uppercase());
            upper_next = false;
        } else {
            out.push(c);
        }
    }
    out
}

/// Naive English pluralization, enough for conventional table names.
pub fn pluralize(value: &str) -> String {
    if let Some(stem) = value.strip_suffix('y')
        && !stem.ends_with(|c| "aeiou".contains(c))
    {
        return format!("{stem}ies");
    }
    if value.ends_with('s')
        || value.ends_with('x')
        || value.ends_with('z')
        || value.ends_with("ch")
        || value.ends_with("sh")
    {
        return format!("{value}es");
    }
    format!("{value}s")
}

/// Inverse of [`pluralize`], used to derive a target entity name from a
/// relation name.
pub fn singularize(value: &str) -> String {
    if let Some(stem) = value.strip_suffix("ies") {
        return format!("{stem}y");
    }
    for suffix in ["ses", "xes", "zes", "ches", "shes"] {
        if let Some(stem) = value.strip_suffix(suffix) {
            return format!("{}{}", stem, &suffix[..suffix.len() - 2]);
        }
    }
    value.strip_suffix('s').unwrap_or(value).to_string()
}
