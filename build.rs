use grep::regex::RegexMatcher;
use grep::searcher::{Searcher, Sink, SinkMatch};
use std::error::Error;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

// Directories that hold the crate's Rust sources.
const SOURCE_DIRS: [&str; 8] = [
    "align", "predict", "forecast", "overview", "shared", "cli", "tests", "benches",
];

// A line-level source rule. The regex selects candidate lines and
// `is_violation` decides whether a candidate actually breaks the rule.
struct Rule {
    description: &'static str,
    pattern: &'static str,
    is_violation: fn(&str) -> bool,
    advice: &'static str,
}

const RULES: [Rule; 5] = [
    Rule {
        description: "underscore-prefixed identifiers",
        pattern: r"\b(_[a-zA-Z0-9_]+)\b",
        is_violation: underscore_outside_comments_and_strings,
        advice: "Underscore-prefixed names are not allowed. Use the binding or remove it.",
    },
    Rule {
        description: "changelog-style comments",
        pattern: r"(//|/\*|///).*(?:FIXED|CORRECTED|FIX|FIXES|NEW|CHANGED|CHANGES|CHANGE|MODIFIED|MODIFIES|MODIFY|UPDATED|UPDATES|UPDATE)",
        is_violation: always,
        advice: "Comments describe the code as it is, not its history.",
    },
    Rule {
        description: "`**` emphasis in non-doc comments",
        pattern: r"(//|/\*).*\*\*",
        is_violation: not_doc_comment,
        advice: "Emphasis markers belong in doc comments only.",
    },
    Rule {
        description: "all-uppercase comments",
        pattern: r"(//|/\*|///).*",
        is_violation: comment_is_all_uppercase,
        advice: "Write comments in sentence case.",
    },
    Rule {
        description: "#[allow(dead_code)] attributes",
        pattern: r"#\s*\[\s*allow\s*\(\s*dead_code\s*\)\s*\]",
        is_violation: always,
        advice: "Either use the code or remove it.",
    },
];

// Collects every offending line of one file for one rule.
struct ViolationCollector<'r> {
    rule: &'r Rule,
    violations: Vec<String>,
}

impl Sink for ViolationCollector<'_> {
    type Error = std::io::Error;

    fn matched(&mut self, _: &Searcher, mat: &SinkMatch) -> Result<bool, Self::Error> {
        let line_number = mat.line_number().unwrap_or(0);
        let line_text = std::str::from_utf8(mat.bytes()).unwrap_or("").trim_end();
        if (self.rule.is_violation)(line_text) {
            self.violations.push(format!("{line_number}:{line_text}"));
        }
        Ok(true)
    }
}

fn always(_: &str) -> bool {
    true
}

fn is_doc_comment(line: &str) -> bool {
    line.trim_start().starts_with("///")
}

fn not_doc_comment(line: &str) -> bool {
    !is_doc_comment(line)
}

fn underscore_outside_comments_and_strings(line: &str) -> bool {
    let is_pure_comment = line.trim_start().starts_with("//") || line.contains("/*");
    // Odd segments between quotes are string contents.
    let is_in_string = line
        .split('"')
        .enumerate()
        .any(|(i, part)| i % 2 == 1 && part.contains('_'));
    !(is_pure_comment || is_in_string)
}

fn comment_is_all_uppercase(line: &str) -> bool {
    let trimmed = line.trim_start();
    let comment_text = if let Some(rest) = trimmed.strip_prefix("///") {
        rest
    } else if let Some(rest) = trimmed.strip_prefix("//") {
        rest
    } else if let Some(idx) = line.find("/*") {
        let rest = &line[idx + 2..];
        rest.find("*/").map_or(rest, |end| &rest[..end])
    } else {
        return false;
    };

    let mut letters = comment_text.chars().filter(|c| c.is_alphabetic()).peekable();
    letters.peek().is_some() && letters.all(|c| c.is_uppercase())
}

fn rust_sources() -> Vec<PathBuf> {
    SOURCE_DIRS
        .iter()
        .map(Path::new)
        .filter(|dir| dir.is_dir())
        .flat_map(|dir| {
            WalkDir::new(dir)
                .into_iter()
                .filter_map(|e| e.ok())
                .filter(|e| e.path().extension().is_some_and(|ext| ext == "rs"))
                .map(|e| e.into_path())
        })
        .collect()
}

fn check_sources() -> Result<(), Box<dyn Error>> {
    let sources = rust_sources();
    let mut searcher = Searcher::new();

    for rule in &RULES {
        let matcher = RegexMatcher::new_line_matcher(rule.pattern)?;
        for path in &sources {
            let mut collector = ViolationCollector {
                rule,
                violations: Vec::new(),
            };
            searcher.search_path(&matcher, path, &mut collector)?;

            if !collector.violations.is_empty() {
                let mut error_msg = format!(
                    "\n❌ ERROR: Found {} {} in {}:\n",
                    collector.violations.len(),
                    rule.description,
                    path.display()
                );
                for violation in &collector.violations {
                    error_msg.push_str(&format!("   {violation}\n"));
                }
                error_msg.push_str(&format!("\n⚠️ {}\n", rule.advice));
                return Err(error_msg.into());
            }
        }
    }
    Ok(())
}

fn main() {
    println!("cargo:rerun-if-changed=build.rs");
    for dir in SOURCE_DIRS {
        println!("cargo:rerun-if-changed={dir}");
    }

    if let Err(e) = check_sources() {
        eprintln!("{e}");
        std::process::exit(1);
    }
}
