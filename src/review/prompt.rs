//! Review prompt construction
//!
//! The prompt is the whole contract with the model: the response is written
//! straight back into the file, so the output rules come before anything else.

/// Marker the model must put on every line it changes.
pub const FIX_MARKER: &str = "KRITIQ FIX";

/// Default review mode label.
pub const DEFAULT_REVIEW_MODE: &str = "Standard";

/// Language family of a file, used to pick the checklist and comment syntax.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LanguageCategory {
    /// JavaScript and TypeScript, including JSX/TSX.
    Script,
    /// HTML and CSS.
    Markup,
    Python,
    /// C and C++ sources and headers.
    CFamily,
    Java,
    Other,
}

impl LanguageCategory {
    pub fn from_extension(extension: &str) -> Self {
        match extension.trim_start_matches('.') {
            "js" | "jsx" | "ts" | "tsx" | "mjs" | "cjs" => Self::Script,
            "html" | "htm" | "css" => Self::Markup,
            "py" => Self::Python,
            "c" | "cpp" | "cc" | "h" | "hpp" => Self::CFamily,
            "java" => Self::Java,
            _ => Self::Other,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Script => "JavaScript/TypeScript",
            Self::Markup => "HTML/CSS",
            Self::Python => "Python",
            Self::CFamily => "C/C++",
            Self::Java => "Java",
            Self::Other => "General",
        }
    }

    pub fn checklist(&self) -> &'static [&'static str] {
        match self {
            Self::Script => &[
                "Undefined or null property access (guard with optional chaining or explicit checks)",
                "Missing `await` on promises and unhandled promise rejections",
                "Loose equality (`==`) where strict equality is intended",
                "Event handlers or DOM lookups that reference missing elements",
                "Use of `eval`, `innerHTML` with untrusted input, or hardcoded secrets",
            ],
            Self::Markup => &[
                "Unclosed or mismatched tags and invalid nesting",
                "Deprecated elements and attributes (e.g. <center>, <font>)",
                "Misspelled CSS properties and values (e.g. backgroud)",
                "Broken selectors, ids or classes that the scripts depend on",
                "Inline scripts that evaluate untrusted input",
            ],
            Self::Python => &[
                "Indentation and syntax errors",
                "Access on values that may be None",
                "Mutable default arguments",
                "Bare `except:` clauses that swallow errors",
                "Use of `eval`/`exec`, shell injection, or hardcoded credentials",
            ],
            Self::CFamily => &[
                "Buffer overflows and out-of-bounds indexing",
                "Null pointer dereferences and use of uninitialized variables",
                "Memory leaks and double frees",
                "Unsafe functions such as `gets`, `strcpy` and unchecked `sprintf`",
                "Missing header guards or includes",
            ],
            Self::Java => &[
                "NullPointerException risks",
                "Resources not closed (prefer try-with-resources)",
                "String comparison with `==` instead of `.equals`",
                "Swallowed exceptions and overly broad catch blocks",
                "SQL built from string concatenation and hardcoded credentials",
            ],
            Self::Other => &[
                "Syntax errors",
                "Obvious runtime errors",
                "Security risks such as unsafe evaluation or hardcoded secrets",
            ],
        }
    }

    /// How the fix marker is written in this language.
    pub fn marker_example(&self, extension: &str) -> String {
        match (self, extension.trim_start_matches('.')) {
            (Self::Markup, "css") => format!("/* {}: <short reason> */", FIX_MARKER),
            (Self::Markup, _) => format!("<!-- {}: <short reason> -->", FIX_MARKER),
            (Self::Python, _) => format!("# {}: <short reason>", FIX_MARKER),
            _ => format!("// {}: <short reason>", FIX_MARKER),
        }
    }
}

/// Inputs for one file's review prompt.
#[derive(Debug, Clone, Copy)]
pub struct PromptInput<'a> {
    pub content: &'a str,
    pub file_name: &'a str,
    pub project_files: &'a [String],
    pub mode: &'a str,
}

const RULE: &str = "────────────────────────────────────────";

/// Build the full review prompt for one file.
pub fn build_review_prompt(input: PromptInput<'_>) -> String {
    let extension = std::path::Path::new(input.file_name)
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or_default();
    let language = LanguageCategory::from_extension(extension);
    let mode = if input.mode.trim().is_empty() {
        DEFAULT_REVIEW_MODE
    } else {
        input.mode
    };

    let mut prompt = String::new();

    prompt.push_str("SYSTEM ROLE:\n");
    prompt.push_str(
        "You are KRITIQ, a senior-level code reviewer whose output is written directly to files.\n\
         You are NOT a chatbot. Your priority order is: SAFETY > CORRECTNESS > MINIMAL CHANGE > CLARITY.\n\n",
    );
    prompt.push_str(&format!(
        "TASK:\nReview and fix bugs in the provided source file: {}\n\n",
        input.file_name
    ));

    section(&mut prompt, "CRITICAL OUTPUT CONTRACT (NON-NEGOTIABLE)");
    prompt.push_str(
        "1. OUTPUT ONLY VALID SOURCE CODE.\n\
         \x20  - Do NOT use markdown.\n\
         \x20  - Do NOT include explanations outside code.\n\
         \x20  - Do NOT wrap output in ``` blocks.\n\
         \x20  - Any extra text will BREAK the program.\n\
         2. RETURN THE FULL FILE CONTENT.\n\
         \x20  - Do NOT omit lines, summarize, or use placeholders like \"...rest of code\".\n\
         3. IF NO ISSUES ARE FOUND:\n\
         \x20  - Return the ORIGINAL CODE verbatim, byte-for-byte.\n\n",
    );

    section(&mut prompt, "CHANGE RULES (TRACEABILITY)");
    prompt.push_str(&format!(
        "4. MAKE ONLY NECESSARY CHANGES. Do NOT refactor for style, reformat, or rename public symbols.\n\
         5. EVERY CHANGE MUST BE TRACEABLE. On the SAME LINE as each fix, add:\n\
         \x20  {}\n\
         \x20  Do NOT add file-level or summary comments.\n\
         6. PRESERVE PUBLIC CONTRACTS. Do NOT change exported functions, classes, or APIs.\n\n",
        language.marker_example(extension)
    ));

    section(&mut prompt, "WHAT TO FIX (FOCUSED SCOPE)");
    prompt.push_str(
        "ONLY fix the following categories:\n\
         • Syntax errors (missing brackets, invalid tokens)\n\
         • Clear typos (e.g., backgroud → background)\n\
         • Runtime errors (null/undefined access, type errors)\n\
         • Security risks (eval, unsafe input handling, hardcoded secrets)\n\
         • Deprecated or invalid constructs (e.g., <center>)\n\
         • Broken logic that causes incorrect behavior\n\
         NEVER make stylistic refactors or rename public symbols.\n\n",
    );

    section(&mut prompt, "CONDITIONAL END-TO-END COMPLETION (STRICTLY GUARDED)");
    prompt.push_str(&format!(
        "You may complete an implementation END-TO-END across related HTML, CSS, and JavaScript files\n\
         ONLY IF ALL of the following conditions are true:\n\
         1. The files together clearly represent a single feature or mini-application\n\
         \x20  (e.g., a calculator, a coding-problem runner, a storefront UI clone).\n\
         2. The intent of the feature is obvious from the code structure, naming, and UI elements.\n\
         3. The implementation is clearly incomplete, broken, or non-functional\n\
         \x20  (e.g., missing event handlers, incomplete logic, disconnected UI).\n\
         4. The expected behavior is standard and unambiguous to any frontend developer.\n\
         5. UI/CSS HANDLING:\n\
         \x20  - If UI/CSS is complete and intentional, do NOT modify it.\n\
         \x20  - If partially implemented, complete it following the existing design direction.\n\
         \x20  - If missing or severely broken, you may create minimal, clean, user-friendly UI.\n\
         6. UI SAFETY:\n\
         \x20  - Do NOT redesign, rebrand, or add visual flair.\n\
         \x20  - Do NOT change structure, classes, or IDs unless clearly broken.\n\
         7. TRACEABILITY:\n\
         \x20  - Every UI/CSS change MUST include a {marker} comment.\n\
         WHEN these conditions are met:\n\
         • You MAY complete missing logic so the feature works correctly.\n\
         • You MUST preserve existing structure, layout, and naming.\n\
         • You MUST NOT introduce new features beyond the obvious intent.\n\
         • You MUST add \"{marker}\" comments on EVERY modified or newly added line.\n\
         IF ANY condition above is NOT met:\n\
         → DO NOT attempt end-to-end completion.\n\
         → Fall back to minimal bug fixing only.\n\
         → If uncertain, return the original code unchanged.\n\n",
        marker = FIX_MARKER
    ));

    section(&mut prompt, &format!("{} CHECKLIST", language.label().to_uppercase()));
    for item in language.checklist() {
        prompt.push_str("• ");
        prompt.push_str(item);
        prompt.push('\n');
    }
    prompt.push('\n');

    prompt.push_str(&format!("REVIEW MODE: {}\n\n", mode));

    section(&mut prompt, "PROJECT CONTEXT (READ-ONLY)");
    prompt.push_str("The following files exist in the same project:\n");
    for name in input.project_files {
        prompt.push_str("- ");
        prompt.push_str(name);
        prompt.push('\n');
    }
    prompt.push('\n');

    section(&mut prompt, "SOURCE CODE TO REVIEW");
    prompt.push_str(input.content);
    prompt.push('\n');

    prompt
}

fn section(prompt: &mut String, title: &str) {
    prompt.push_str(RULE);
    prompt.push('\n');
    prompt.push_str(title);
    prompt.push('\n');
    prompt.push_str(RULE);
    prompt.push('\n');
}

#[cfg(test)]
mod tests {
    use super::*;

    fn build(content: &str, file_name: &str, mode: &str) -> String {
        let files = vec!["a.py".to_string(), "b.js".to_string()];
        build_review_prompt(PromptInput {
            content,
            file_name,
            project_files: &files,
            mode,
        })
    }

    #[test]
    fn test_category_mapping_is_total() {
        assert_eq!(LanguageCategory::from_extension("tsx"), LanguageCategory::Script);
        assert_eq!(LanguageCategory::from_extension(".css"), LanguageCategory::Markup);
        assert_eq!(LanguageCategory::from_extension("py"), LanguageCategory::Python);
        assert_eq!(LanguageCategory::from_extension("h"), LanguageCategory::CFamily);
        assert_eq!(LanguageCategory::from_extension("java"), LanguageCategory::Java);
        assert_eq!(LanguageCategory::from_extension("zig"), LanguageCategory::Other);
        assert_eq!(LanguageCategory::from_extension(""), LanguageCategory::Other);
        assert!(!LanguageCategory::Other.checklist().is_empty());
    }

    #[test]
    fn test_marker_uses_language_comment_syntax() {
        assert!(LanguageCategory::Python.marker_example("py").starts_with("# KRITIQ FIX"));
        assert!(LanguageCategory::Markup.marker_example("html").starts_with("<!--"));
        assert!(LanguageCategory::Markup.marker_example("css").starts_with("/*"));
        assert!(LanguageCategory::Java.marker_example("java").starts_with("// KRITIQ FIX"));
    }

    #[test]
    fn test_prompt_sections_in_order() {
        let prompt = build("print('hi')", "a.py", "Strict");
        let positions: Vec<usize> = [
            "SYSTEM ROLE",
            "CRITICAL OUTPUT CONTRACT",
            "# KRITIQ FIX",
            "WHAT TO FIX",
            "CONDITIONAL END-TO-END COMPLETION",
            "ONLY IF ALL of the following conditions are true",
            "7. TRACEABILITY",
            "Fall back to minimal bug fixing only.",
            "If uncertain, return the original code unchanged.",
            "PYTHON CHECKLIST",
            "REVIEW MODE: Strict",
            "PROJECT CONTEXT",
            "SOURCE CODE TO REVIEW",
            "print('hi')",
        ]
        .iter()
        .map(|needle| prompt.find(needle).unwrap_or_else(|| panic!("missing {needle}")))
        .collect();

        let mut sorted = positions.clone();
        sorted.sort_unstable();
        assert_eq!(positions, sorted);
    }

    #[test]
    fn test_prompt_lists_project_files_and_file_name() {
        let prompt = build("x", "b.js", "Standard");
        assert!(prompt.contains("source file: b.js"));
        assert!(prompt.contains("- a.py\n- b.js\n"));
        assert!(prompt.contains("JAVASCRIPT/TYPESCRIPT CHECKLIST"));
    }

    #[test]
    fn test_blank_mode_falls_back_to_default() {
        let prompt = build("x", "b.js", "  ");
        assert!(prompt.contains("REVIEW MODE: Standard"));
    }

    #[test]
    fn test_source_is_last() {
        let prompt = build("int main() { return 0; }", "m.c", "Standard");
        assert!(prompt.trim_end().ends_with("int main() { return 0; }"));
    }
}
