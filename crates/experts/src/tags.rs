//! Controlled expertise vocabulary.

/// Tag categories and their members.
pub const EXPERTISE_CATEGORIES: &[(&str, &[&str])] = &[
    (
        "technology",
        &[
            "Web Development",
            "Mobile Development",
            "Machine Learning",
            "Data Science",
            "Cybersecurity",
            "DevOps",
            "Cloud Computing",
            "Blockchain",
            "UX/UI Design",
            "Game Development",
            "AR/VR",
            "IoT",
            "Database Administration",
            "Network Engineering",
        ],
    ),
    (
        "business",
        &[
            "Marketing",
            "Finance",
            "Entrepreneurship",
            "Project Management",
            "Human Resources",
            "Sales",
            "Product Management",
            "Business Strategy",
            "Supply Chain",
            "E-commerce",
            "Consulting",
        ],
    ),
    (
        "healthcare",
        &[
            "Medicine",
            "Nursing",
            "Pharmacy",
            "Public Health",
            "Mental Health",
            "Nutrition",
            "Physical Therapy",
            "Biotechnology",
            "Healthcare Administration",
        ],
    ),
    (
        "science",
        &[
            "Physics",
            "Chemistry",
            "Biology",
            "Astronomy",
            "Environmental Science",
            "Mathematics",
            "Statistics",
            "Research Methodology",
            "Neuroscience",
        ],
    ),
    (
        "creative",
        &[
            "Graphic Design",
            "Content Creation",
            "Video Production",
            "Photography",
            "Illustration",
            "Animation",
            "Creative Writing",
            "Music Production",
            "Filmmaking",
        ],
    ),
    (
        "education",
        &[
            "Teaching",
            "Curriculum Development",
            "Educational Technology",
            "E-learning",
            "Language Teaching",
            "Academic Research",
            "Special Education",
        ],
    ),
    (
        "legal",
        &[
            "Law",
            "Intellectual Property",
            "Contracts",
            "Corporate Law",
            "International Law",
            "Compliance",
        ],
    ),
    (
        "other",
        &[
            "Agriculture",
            "Architecture",
            "Construction",
            "Culinary Arts",
            "Fashion",
            "Journalism",
            "Languages",
            "Philosophy",
            "Psychology",
            "Social Work",
            "Sports & Fitness",
            "Translation",
            "Travel & Tourism",
        ],
    ),
];

/// Every tag in category order.
pub fn all_tags() -> impl Iterator<Item = &'static str> {
    EXPERTISE_CATEGORIES
        .iter()
        .flat_map(|(_, tags)| tags.iter().copied())
}

/// Tags whose name occurs in `input`, case-insensitively, in vocabulary order.
pub fn extract_expertise_tags(input: &str) -> Vec<String> {
    if input.trim().is_empty() {
        return Vec::new();
    }

    let lower = input.to_lowercase();
    all_tags()
        .filter(|tag| lower.contains(&tag.to_lowercase()))
        .map(str::to_string)
        .collect()
}

/// Map a tag onto its canonical vocabulary spelling.
pub fn canonical_tag(tag: &str) -> Option<&'static str> {
    let tag = tag.trim();
    all_tags().find(|known| known.eq_ignore_ascii_case(tag))
}

/// Keep only vocabulary tags, canonically spelled, without duplicates.
pub fn filter_to_vocabulary<S: AsRef<str>>(tags: &[S]) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for tag in tags {
        if let Some(known) = canonical_tag(tag.as_ref()) {
            if !out.iter().any(|t| t == known) {
                out.push(known.to_string());
            }
        }
    }
    out
}

/// Trim tags and drop blanks and case-insensitive duplicates, keeping order.
pub fn normalize_tags<S: AsRef<str>>(tags: &[S]) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for tag in tags {
        let tag = tag.as_ref().trim();
        if tag.is_empty() || out.iter().any(|t| t.eq_ignore_ascii_case(tag)) {
            continue;
        }
        out.push(tag.to_string());
    }
    out
}

/// Text embedded for a tag set.
pub fn tag_text<S: AsRef<str>>(tags: &[S]) -> String {
    tags.iter()
        .map(|t| t.as_ref())
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vocabulary_size() {
        assert_eq!(EXPERTISE_CATEGORIES.len(), 8);
        assert_eq!(all_tags().count(), 78);
    }

    #[test]
    fn test_extract_case_insensitive() {
        let tags = extract_expertise_tags("I do MACHINE learning and some data science on the side");
        assert_eq!(tags, vec!["Machine Learning", "Data Science"]);
        assert!(extract_expertise_tags("   ").is_empty());
    }

    #[test]
    fn test_extract_matches_substrings() {
        // "Law" is a substring of "Corporate Law".
        let tags = extract_expertise_tags("corporate law");
        assert!(tags.contains(&"Law".to_string()));
        assert!(tags.contains(&"Corporate Law".to_string()));
    }

    #[test]
    fn test_filter_to_vocabulary() {
        let tags = filter_to_vocabulary(&["machine learning", "Underwater Basket Weaving", "Machine Learning", " devops "]);
        assert_eq!(tags, vec!["Machine Learning", "DevOps"]);
    }

    #[test]
    fn test_normalize_tags() {
        let tags = normalize_tags(&[" Rust ", "rust", "", "Go"]);
        assert_eq!(tags, vec!["Rust", "Go"]);
    }

    #[test]
    fn test_tag_text_joins_with_comma() {
        assert_eq!(tag_text(&["Machine Learning", "Statistics"]), "Machine Learning, Statistics");
    }
}
