//! The closed set of policy-area labels used by the categorize stage.

/// Label assigned when classification returns something outside the set.
pub const UNIDENTIFIED: &str = "Others/Unidentified";

/// EU policy areas, as published in the EUR-Lex summaries index.
pub const EU_DOMAINS: [&str; 34] = [
    "Agriculture",
    "Audiovisual and media",
    "Budget",
    "Banking",
    "Competition",
    "Consumers",
    "Culture",
    "Customs",
    "Development",
    "Digital single market",
    "Economic and monetary affairs",
    "Education, training, youth, sport",
    "Employment and social policy",
    "Energy",
    "Enlargement",
    "Enterprise",
    "Environment and climate change",
    "External relations",
    "External trade",
    "Food safety",
    "Foreign and security policy",
    "Fraud and corruption",
    "Humanitarian Aid and Civil Protection",
    "Human rights",
    "Institutional affairs",
    "Internal market",
    "Justice, freedom and security",
    "Oceans and fisheries",
    "Public health",
    "Regional policy",
    "Research and innovation",
    "Taxation",
    "Transport",
    UNIDENTIFIED,
];

/// Resolve a model-returned label against the closed set.
///
/// Exact matches win. This deliberately widens the plain fallback policy:
/// a reply that only differs from a label by case, surrounding quotes or a
/// trailing period is mapped to that label instead of `fallback`, since chat
/// models routinely decorate one-word answers that way. Anything else
/// resolves to `fallback`.
pub fn resolve_label(returned: &str, labels: &[String], fallback: &str) -> String {
    let trimmed = returned.trim().trim_matches(|c| c == '"' || c == '\'' || c == '.');
    if let Some(exact) = labels.iter().find(|l| l.as_str() == trimmed) {
        return exact.clone();
    }
    labels
        .iter()
        .find(|l| l.eq_ignore_ascii_case(trimmed))
        .cloned()
        .unwrap_or_else(|| fallback.to_string())
}

/// Directory name used for a label in the nested summary layout.
///
/// Labels may contain `/`, which would otherwise create a second level.
pub fn dir_name(label: &str) -> String {
    label.replace('/', "-")
}

/// Inverse of [`dir_name`] for labels in `labels`; unknown names pass through.
pub fn label_for_dir(dir: &str, labels: &[String]) -> String {
    labels
        .iter()
        .find(|l| dir_name(l) == dir)
        .cloned()
        .unwrap_or_else(|| dir.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn labels() -> Vec<String> {
        EU_DOMAINS.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn closed_set_has_34_entries_ending_with_fallback() {
        assert_eq!(EU_DOMAINS.len(), 34);
        assert_eq!(EU_DOMAINS[33], UNIDENTIFIED);
    }

    #[test]
    fn out_of_set_label_falls_back() {
        assert_eq!(
            resolve_label("Space exploration", &labels(), UNIDENTIFIED),
            "Others/Unidentified"
        );
    }

    #[test]
    fn in_set_label_is_kept() {
        assert_eq!(resolve_label(" Energy\n", &labels(), UNIDENTIFIED), "Energy");
        assert_eq!(resolve_label("public health", &labels(), UNIDENTIFIED), "Public health");
    }

    #[test]
    fn decorated_reply_maps_to_label_but_near_miss_falls_back() {
        assert_eq!(resolve_label("\"Taxation.\"", &labels(), UNIDENTIFIED), "Taxation");
        assert_eq!(resolve_label("'ENERGY'", &labels(), UNIDENTIFIED), "Energy");
        assert_eq!(resolve_label("Energy policy", &labels(), UNIDENTIFIED), UNIDENTIFIED);
        assert_eq!(resolve_label("", &labels(), UNIDENTIFIED), UNIDENTIFIED);
    }

    #[test]
    fn dir_names_round_trip() {
        let l = labels();
        assert_eq!(dir_name(UNIDENTIFIED), "Others-Unidentified");
        assert_eq!(label_for_dir("Others-Unidentified", &l), UNIDENTIFIED);
        assert_eq!(label_for_dir("Energy", &l), "Energy");
    }
}
