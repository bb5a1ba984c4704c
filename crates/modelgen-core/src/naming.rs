//! Name conversions between table names, model names and file names.

/// Words of a table-style name, split on `_` and `-`.
fn words(s: &str) -> impl Iterator<Item = &str> {
    s.split(['_', '-']).filter(|w| !w.is_empty())
}

fn capitalize(word: &str) -> String {
    let mut out = String::with_capacity(word.len());
    let mut rest = word.chars();
    if let Some(head) = rest.next() {
        out.extend(head.to_uppercase());
        out.push_str(rest.as_str());
    }
    out
}

/// `client_notes` -> `ClientNotes`.
pub fn to_pascal_case(s: &str) -> String {
    words(s).map(capitalize).collect()
}

/// `client_notes` -> `client-notes`.
pub fn to_kebab_case(s: &str) -> String {
    words(s).map(str::to_lowercase).collect::<Vec<_>>().join("-")
}

const IRREGULAR: &[(&str, &str)] = &[
    ("people", "person"),
    ("children", "child"),
    ("men", "man"),
    ("women", "woman"),
    ("data", "datum"),
];

/// Singular forms ending in `s` whose plural adds `es` (`statuses`, `buses`).
/// Listed explicitly so `houses` and `causes` still lose only the `s`.
const ES_PLURAL_STEMS: &[&str] = &["status", "alias", "bus", "virus", "campus"];

/// Singularizes the last word of a snake_case name.
pub fn singularize(s: &str) -> String {
    let (prefix, last) = match s.rfind('_') {
        Some(idx) => (&s[..=idx], &s[idx + 1..]),
        None => ("", s),
    };

    if let Some((_, singular)) = IRREGULAR.iter().find(|(plural, _)| *plural == last) {
        return format!("{}{}", prefix, singular);
    }

    let singular = if let Some(stem) = ES_PLURAL_STEMS
        .iter()
        .find_map(|stem| last.strip_suffix("es").filter(|s| s == stem))
    {
        stem.to_string()
    } else if let Some(stem) = last.strip_suffix("ies") {
        format!("{}y", stem)
    } else if last.ends_with("sses") || last.ends_with("xes") || last.ends_with("ches") || last.ends_with("shes") {
        last[..last.len() - 2].to_string()
    } else if last.ends_with("ss") || last.ends_with("us") || last.ends_with("is") {
        last.to_string()
    } else if let Some(stem) = last.strip_suffix('s') {
        stem.to_string()
    } else {
        last.to_string()
    };

    format!("{}{}", prefix, singular)
}

/// Model class name for a table (`client_notes` -> `ClientNote`).
pub fn model_name(table: &str) -> String {
    to_pascal_case(&singularize(table))
}

/// File stem for a table's generated files (`client_notes` -> `client-note`).
pub fn file_stem(table: &str) -> String {
    to_kebab_case(&singularize(table))
}

/// Polymorphic type key for a model name: lower-cased with underscores stripped.
pub fn polymorphic_type_key(model_name: &str) -> String {
    model_name.to_lowercase().replace('_', "")
}

/// Property name for a foreign key column (`client_id` -> `client`).
pub fn association_name(foreign_key: &str) -> String {
    foreign_key
        .strip_suffix("_id")
        .unwrap_or(foreign_key)
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pascal_and_kebab() {
        assert_eq!(to_pascal_case("job_assignment"), "JobAssignment");
        assert_eq!(to_pascal_case("scheduled__date_time"), "ScheduledDateTime");
        assert_eq!(to_kebab_case("client_note"), "client-note");
        assert_eq!(to_kebab_case("Job_Assignment"), "job-assignment");
    }

    #[test]
    fn test_singularize() {
        assert_eq!(singularize("users"), "user");
        assert_eq!(singularize("activities"), "activity");
        assert_eq!(singularize("addresses"), "address");
        assert_eq!(singularize("boxes"), "box");
        assert_eq!(singularize("people"), "person");
        assert_eq!(singularize("client_notes"), "client_note");
        assert_eq!(singularize("status"), "status");
        assert_eq!(singularize("statuses"), "status");
        assert_eq!(singularize("job_statuses"), "job_status");
        assert_eq!(singularize("buses"), "bus");
        assert_eq!(singularize("aliases"), "alias");
        assert_eq!(singularize("houses"), "house");
        assert_eq!(singularize("abuses"), "abuse");
        assert_eq!(model_name("statuses"), "Status");
    }

    #[test]
    fn test_model_and_file_names() {
        assert_eq!(model_name("client_notes"), "ClientNote");
        assert_eq!(file_stem("client_notes"), "client-note");
        assert_eq!(model_name("users"), "User");
    }

    #[test]
    fn test_polymorphic_type_key() {
        assert_eq!(polymorphic_type_key("ClientNote"), "clientnote");
        assert_eq!(polymorphic_type_key("client_note"), "clientnote");
    }

    #[test]
    fn test_association_name() {
        assert_eq!(association_name("client_id"), "client");
        assert_eq!(association_name("owner"), "owner");
    }
}
