//! Library aliases, detection patterns and per-step hints

use regex::Regex;
use std::collections::BTreeSet;
use std::sync::LazyLock;

/// Known spellings mapped to canonical library names
pub const LIBRARY_MAPPINGS: &[(&str, &str)] = &[
    // Frontend
    ("react", "react"),
    ("reactjs", "react"),
    ("vue", "vue"),
    ("vuejs", "vue"),
    ("angular", "angular"),
    ("svelte", "svelte"),
    ("next", "nextjs"),
    ("nextjs", "nextjs"),
    ("next.js", "nextjs"),
    // Backend
    ("express", "express"),
    ("expressjs", "express"),
    ("fastapi", "fastapi"),
    ("django", "django"),
    ("flask", "flask"),
    ("rails", "rails"),
    ("ruby on rails", "rails"),
    // Databases
    ("postgres", "postgresql"),
    ("postgresql", "postgresql"),
    ("mysql", "mysql"),
    ("mongodb", "mongodb"),
    ("mongo", "mongodb"),
    ("redis", "redis"),
    // Testing
    ("jest", "jest"),
    ("pytest", "pytest"),
    ("mocha", "mocha"),
    ("vitest", "vitest"),
    ("cypress", "cypress"),
    // State management
    ("redux", "redux"),
    ("mobx", "mobx"),
    ("zustand", "zustand"),
    ("pinia", "pinia"),
    // Build tools
    ("webpack", "webpack"),
    ("vite", "vite"),
    ("rollup", "rollup"),
    ("parcel", "parcel"),
    // ORMs
    ("prisma", "prisma"),
    ("sqlalchemy", "sqlalchemy"),
    ("typeorm", "typeorm"),
    ("sequelize", "sequelize"),
];

const PHRASE_PATTERNS: &[&str] = &[
    r"using\s+(\w+)",
    r"built\s+with\s+(\w+)",
    r"based\s+on\s+(\w+)",
    r"framework[:\s]+(\w+)",
    r"library[:\s]+(\w+)",
    r"database[:\s]+(\w+)",
    r"leveraging\s+(\w+)",
];

static ALIAS_MATCHERS: LazyLock<Vec<(Regex, &'static str)>> = LazyLock::new(|| {
    LIBRARY_MAPPINGS
        .iter()
        .map(|(alias, canonical)| {
            let re = Regex::new(&format!(r"\b{}\b", regex::escape(alias))).expect("valid alias regex");
            (re, *canonical)
        })
        .collect()
});

static PHRASE_MATCHERS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    PHRASE_PATTERNS
        .iter()
        .map(|p| Regex::new(&format!("(?i){p}")).expect("valid phrase regex"))
        .collect()
});

/// Canonical name for a known alias
#[must_use]
pub fn canonical_name(alias: &str) -> Option<&'static str> {
    LIBRARY_MAPPINGS
        .iter()
        .find(|(known, _)| *known == alias)
        .map(|(_, canonical)| *canonical)
}

/// Detect libraries mentioned in free text.
///
/// Known aliases match on word boundaries; phrases such as "built with X"
/// contribute X when X is a known alias. Result is canonical, sorted, unique.
#[must_use]
pub fn detect_libraries(text: &str) -> Vec<String> {
    let lower = text.to_lowercase();
    let mut found: BTreeSet<&'static str> = BTreeSet::new();

    for (re, canonical) in ALIAS_MATCHERS.iter() {
        if re.is_match(&lower) {
            found.insert(*canonical);
        }
    }

    for re in PHRASE_MATCHERS.iter() {
        for caps in re.captures_iter(&lower) {
            if let Some(canonical) = caps.get(1).and_then(|m| canonical_name(m.as_str())) {
                found.insert(canonical);
            }
        }
    }

    found.into_iter().map(str::to_string).collect()
}

/// Step name without its numeric prefix: `03-system-template` -> `system-template`
#[must_use]
pub fn step_kind(step: &str) -> &str {
    match step.split_once('-') {
        Some((prefix, rest)) if !prefix.is_empty() && prefix.chars().all(|c| c.is_ascii_digit()) => rest,
        _ => step,
    }
}

/// Documentation topic hint for a workflow step
#[must_use]
pub fn topic_for_step(step: &str) -> &'static str {
    match step_kind(step) {
        "system-template" => "project structure, setup, configuration, getting started",
        "systems-patterns" => "design patterns, architecture, best practices, advanced features",
        "tasks" => "api reference, implementation, components, modules",
        "tasks-plus" => "advanced features, optimization, performance, edge cases",
        "tests" => "testing, test setup, mocking, test utilities",
        _ => "api reference, getting started, best practices",
    }
}

/// Libraries worth including for a workflow step when the text mentions them
#[must_use]
pub fn recommended_libraries(step: &str) -> &'static [&'static str] {
    match step_kind(step) {
        "system-template" => &["react", "vue", "angular", "fastapi", "django", "express"],
        "systems-patterns" => &["redux", "mobx", "sqlalchemy", "prisma"],
        "tests" => &["pytest", "jest", "vitest", "cypress", "mocha"],
        _ => &[],
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detects_aliases_on_word_boundaries() {
        let text = "We use ReactJS on the frontend, a Postgres database and Ruby on Rails.";
        assert_eq!(detect_libraries(text), vec!["postgresql", "rails", "react"]);

        // "reaction" and "expressive" are not library mentions
        assert!(detect_libraries("A strong reaction to expressive prose").is_empty());
    }

    #[test]
    fn test_detects_phrase_patterns() {
        assert_eq!(detect_libraries("The service is built with FastAPI."), vec!["fastapi"]);
        assert_eq!(detect_libraries("Database: mongo"), vec!["mongodb"]);
        assert!(detect_libraries("using something-unknown").is_empty());
    }

    #[test]
    fn test_next_js_alias() {
        assert_eq!(detect_libraries("Frontend in Next.js"), vec!["nextjs"]);
    }

    #[test]
    fn test_step_kind() {
        assert_eq!(step_kind("03-system-template"), "system-template");
        assert_eq!(step_kind("3-system-template"), "system-template");
        assert_eq!(step_kind("tests"), "tests");
        assert_eq!(step_kind("pre-tests"), "pre-tests");
    }

    #[test]
    fn test_step_hints() {
        assert_eq!(topic_for_step("07-tests"), "testing, test setup, mocking, test utilities");
        assert_eq!(topic_for_step("01-prd"), "api reference, getting started, best practices");
        assert_eq!(recommended_libraries("04-systems-patterns"), &["redux", "mobx", "sqlalchemy", "prisma"]);
        assert!(recommended_libraries("05-tasks").is_empty());
    }
}
