//! Geographic reference data, supplied as an immutable external asset (spec
//! §9 open questions: "the full tables are external reference data"). Scope
//! is limited to US state abbreviation expansion, the one table the spec's
//! tests exercise directly; broader scope detection is out of scope (§1).

/// `(two-letter postal code, full name)`, used to normalize a "state" column
/// before a geo pattern's `generateSpec` hands data to an external renderer.
pub const US_STATE_ABBREVIATIONS: &[(&str, &str)] = &[
    ("AL", "Alabama"), ("AK", "Alaska"), ("AZ", "Arizona"), ("AR", "Arkansas"),
    ("CA", "California"), ("CO", "Colorado"), ("CT", "Connecticut"), ("DE", "Delaware"),
    ("FL", "Florida"), ("GA", "Georgia"), ("HI", "Hawaii"), ("ID", "Idaho"),
    ("IL", "Illinois"), ("IN", "Indiana"), ("IA", "Iowa"), ("KS", "Kansas"),
    ("KY", "Kentucky"), ("LA", "Louisiana"), ("ME", "Maine"), ("MD", "Maryland"),
    ("MA", "Massachusetts"), ("MI", "Michigan"), ("MN", "Minnesota"), ("MS", "Mississippi"),
    ("MO", "Missouri"), ("MT", "Montana"), ("NE", "Nebraska"), ("NV", "Nevada"),
    ("NH", "New Hampshire"), ("NJ", "New Jersey"), ("NM", "New Mexico"), ("NY", "New York"),
    ("NC", "North Carolina"), ("ND", "North Dakota"), ("OH", "Ohio"), ("OK", "Oklahoma"),
    ("OR", "Oregon"), ("PA", "Pennsylvania"), ("RI", "Rhode Island"), ("SC", "South Carolina"),
    ("SD", "South Dakota"), ("TN", "Tennessee"), ("TX", "Texas"), ("UT", "Utah"),
    ("VT", "Vermont"), ("VA", "Virginia"), ("WA", "Washington"), ("WV", "West Virginia"),
    ("WI", "Wisconsin"), ("WY", "Wyoming"), ("DC", "District of Columbia"),
];

/// Expand a two-letter postal code (case-insensitive) to its full state name.
/// Returns the input unchanged if it is not a recognized code, so callers can
/// apply this to a column without first checking whether every value is a code.
pub fn expand_state_abbreviation(value: &str) -> String {
    let upper = value.trim().to_ascii_uppercase();
    US_STATE_ABBREVIATIONS
        .iter()
        .find(|(code, _)| *code == upper)
        .map(|(_, name)| name.to_string())
        .unwrap_or_else(|| value.to_string())
}

/// Whether `name` plausibly identifies a US-state field, for auto-detection
/// before a geo pattern normalizes it.
pub fn looks_like_state_field(name: &str) -> bool {
    let lower = name.to_ascii_lowercase();
    lower == "state" || lower.ends_with("_state") || lower == "region" || lower.ends_with("_region")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expands_known_code_case_insensitively() {
        assert_eq!(expand_state_abbreviation("ca"), "California");
        assert_eq!(expand_state_abbreviation("NY"), "New York");
    }

    #[test]
    fn leaves_unknown_value_unchanged() {
        assert_eq!(expand_state_abbreviation("California"), "California");
        assert_eq!(expand_state_abbreviation("XX"), "XX");
    }

    #[test]
    fn field_name_heuristic_matches_common_variants() {
        assert!(looks_like_state_field("state"));
        assert!(looks_like_state_field("customer_state"));
        assert!(!looks_like_state_field("status"));
    }
}
