//! Static classification of script source.

/// Decides how an execution must be managed before it starts.
///
/// The controller only consumes the verdict. Hosts whose mutations are not expressed as
/// tracing imports inject their own classifier through `Dependencies::classifier`.
pub trait ScriptClassifier: Send + Sync {
    /// True when running the script changes remote state (e.g. deploys a tracepoint).
    fn contains_mutation(&self, code: &str) -> bool;
    /// True when results arrive as an open-ended sequence of batches.
    fn is_streaming(&self, code: &str) -> bool;
}

/// Classifier for PxL source.
#[derive(Debug, Clone, Copy, Default)]
pub struct PxlClassifier;

impl ScriptClassifier for PxlClassifier {
    fn contains_mutation(&self, code: &str) -> bool {
        contains_mutation(code)
    }

    fn is_streaming(&self, code: &str) -> bool {
        is_streaming(code)
    }
}

/// Mutating scripts import the tracing module at top level.
///
/// DataFrame operations such as `drop` or exporting a table are not mutations on their own.
pub fn contains_mutation(code: &str) -> bool {
    code_lines(code).any(|line| {
        let mut words = line.split_whitespace();
        match (words.next(), words.next(), words.next()) {
            (Some("import"), Some(module), _) => module == "pxtrace" || module.starts_with("pxtrace,"),
            (Some("from"), Some("pxtrace"), Some("import")) => true,
            _ => false,
        }
    })
}

pub fn is_streaming(code: &str) -> bool {
    code_lines(code).any(|line| line.contains(".stream()"))
}

fn code_lines(code: &str) -> impl Iterator<Item = &str> {
    code.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_tracepoint_imports() {
        assert!(contains_mutation("import px\nimport pxtrace\n"));
        assert!(contains_mutation("from pxtrace import probe\n"));
        assert!(!contains_mutation("import px\ndf = px.DataFrame('http_events')\n"));
        assert!(!contains_mutation("# import pxtrace\nimport px\n"));
        assert!(!contains_mutation("import pxtrace_helpers\n"));
    }

    #[test]
    fn dataframe_operations_are_not_mutations() {
        assert!(!PxlClassifier.contains_mutation("df.drop(); export_table(df)"));
    }

    #[test]
    fn detects_streaming_calls() {
        assert!(is_streaming("df = px.DataFrame('t')\npx.display(df.stream())\n"));
        assert!(!is_streaming("px.display(df)\n# df.stream()\n"));
    }
}
