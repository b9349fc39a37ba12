//! File-level recall/precision against the ground truth, plus the judged
//! goal-equivalence score.

use std::collections::BTreeSet;

use regex::Regex;

/// Extensions treated as plausible source-file mentions when a bare path
/// appears in prose.
const SOURCE_EXTENSIONS: &str =
    "ts|tsx|js|jsx|py|json|md|yaml|yml|toml|txt|go|rs|rb|java|kt|c|h|cpp|css|html|sql|sh";

/// Strip a leading `./` and collapse doubled separators. Comparison stays
/// case-sensitive: repository paths are exact identifiers here.
pub fn normalize_path(path: &str) -> String {
    let mut p = path.trim();
    while let Some(rest) = p.strip_prefix("./") {
        p = rest;
    }
    let mut out = String::with_capacity(p.len());
    let mut prev_slash = false;
    for c in p.chars() {
        if c == '/' {
            if prev_slash {
                continue;
            }
            prev_slash = true;
        } else {
            prev_slash = false;
        }
        out.push(c);
    }
    out
}

/// Pull file paths the plan proposes to touch: backticked paths, fenced
/// code-block headers, `File to modify:`/`File to create:` markers, and
/// edit-verb phrases ("edit src/auth.ts").
pub fn extract_plan_files(plan_text: &str) -> BTreeSet<String> {
    let mut files = BTreeSet::new();

    let patterns = [
        // `src/foo/bar.ts`
        format!(r"`([^`\s]+\.(?:{SOURCE_EXTENSIONS}))`"),
        // ```ts title=src/foo.ts  /  ```python src/foo.py
        format!(r"```[a-z]*[ \t]+(?:title=)?([^\s`]+\.(?:{SOURCE_EXTENSIONS}))"),
        // File to modify: src/foo.ts  /  Files to create: ...
        format!(
            r"(?i)files? to (?:modify|create|edit|change|update)\s*:\s*`?([^\s`,]+\.(?:{SOURCE_EXTENSIONS}))"
        ),
        // Edit src/foo.ts / Modify src/auth/login.ts
        format!(
            r"(?i)\b(?:edit|modify|change|update|open|touch)\s+`?([A-Za-z0-9_./-]+\.(?:{SOURCE_EXTENSIONS}))"
        ),
        // Bare slash-containing paths in prose: src/auth/login.ts
        format!(r"([A-Za-z0-9_.-]+(?:/[A-Za-z0-9_.-]+)+\.(?:{SOURCE_EXTENSIONS}))\b"),
    ];

    for pattern in &patterns {
        let Ok(re) = Regex::new(pattern) else {
            continue;
        };
        for caps in re.captures_iter(plan_text) {
            if let Some(m) = caps.get(1) {
                let normalized = normalize_path(m.as_str());
                if !normalized.is_empty() {
                    files.insert(normalized);
                }
            }
        }
    }
    files
}

/// Recall and precision of the plan's file set against the truth set.
///
/// Empty truth means there was nothing to find, so recall is trivially 1.
/// Empty plan means the plan named no files and earns no precision credit;
/// precision is 0 even though recall may be vacuously 1.
pub fn recall_precision(
    plan_files: &BTreeSet<String>,
    truth_files: &BTreeSet<String>,
) -> (f64, f64) {
    let truth: BTreeSet<String> = truth_files.iter().map(|p| normalize_path(p)).collect();
    let plan: BTreeSet<String> = plan_files.iter().map(|p| normalize_path(p)).collect();
    let intersection = truth.intersection(&plan).count() as f64;

    let recall = if truth.is_empty() {
        1.0
    } else {
        intersection / truth.len() as f64
    };
    let precision = if plan.is_empty() {
        0.0
    } else {
        intersection / plan.len() as f64
    };
    (recall, precision)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set(paths: &[&str]) -> BTreeSet<String> {
        paths.iter().map(|p| p.to_string()).collect()
    }

    #[test]
    fn half_overlap_scores_half_both_ways() {
        let truth = set(&["a.py", "b.py"]);
        let plan = set(&["a.py", "c.py"]);
        let (recall, precision) = recall_precision(&plan, &truth);
        assert!((recall - 0.5).abs() < 1e-12);
        assert!((precision - 0.5).abs() < 1e-12);
    }

    #[test]
    fn empty_truth_means_trivial_recall() {
        let (recall, precision) = recall_precision(&set(&["a.py"]), &set(&[]));
        assert_eq!(recall, 1.0);
        assert_eq!(precision, 0.0);
    }

    #[test]
    fn plan_naming_no_files_earns_no_precision() {
        let (recall, precision) = recall_precision(&set(&[]), &set(&["a.py"]));
        assert_eq!(recall, 0.0);
        assert_eq!(precision, 0.0);

        // Even against an empty truth, an empty plan gets no precision credit
        let (recall, precision) = recall_precision(&set(&[]), &set(&[]));
        assert_eq!(recall, 1.0);
        assert_eq!(precision, 0.0);
    }

    #[test]
    fn normalization_strips_dot_slash_and_doubled_separators() {
        assert_eq!(normalize_path("./src//auth/login.ts"), "src/auth/login.ts");
        assert_eq!(normalize_path("src/auth/login.ts"), "src/auth/login.ts");
        // Case stays significant
        assert_ne!(normalize_path("SRC/a.ts"), normalize_path("src/a.ts"));
    }

    #[test]
    fn normalized_paths_match_across_sets() {
        let truth = set(&["src/auth/login.ts"]);
        let plan = set(&["./src//auth/login.ts"]);
        let (recall, precision) = recall_precision(&plan, &truth);
        assert_eq!((recall, precision), (1.0, 1.0));
    }

    #[test]
    fn backticked_and_verb_paths_are_extracted() {
        let plan = "\
First, edit `src/auth/login.ts` to add the retry wrapper.
Then modify src/auth/token.ts accordingly.
File to create: src/auth/refresh.ts
";
        let files = extract_plan_files(plan);
        assert!(files.contains("src/auth/login.ts"));
        assert!(files.contains("src/auth/token.ts"));
        assert!(files.contains("src/auth/refresh.ts"));
    }

    #[test]
    fn fenced_block_headers_are_extracted() {
        let plan = "```ts title=src/config.ts\nexport const x = 1;\n```";
        let files = extract_plan_files(plan);
        assert!(files.contains("src/config.ts"));
    }

    #[test]
    fn prose_without_paths_yields_nothing() {
        let files = extract_plan_files("Refactor the login flow to be cleaner.");
        assert!(files.is_empty());
    }
}
