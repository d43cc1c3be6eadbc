use crate::error::{Result, ShellError};
use crate::lexer;
use std::path::PathBuf;

/// Token that sends a single command to the background when it ends the line.
pub const BACKGROUND: &str = "&";
/// Token that appends a stage's standard output to the file named after it.
pub const APPEND: &str = ">>";

/// One command of a line, backed by exactly one process (or one in-process built-in).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Stage {
    /// Command name followed by its arguments.
    pub argv: Vec<String>,
    /// File the stage's standard output is appended to, taken from a trailing `>> file`.
    pub append_to: Option<PathBuf>,
}

impl Stage {
    fn from_words(mut argv: Vec<String>) -> Self {
        let len = argv.len();
        if len >= 3 && argv[len - 2] == APPEND {
            let target = argv.pop().map(PathBuf::from);
            argv.pop();
            Stage {
                argv,
                append_to: target,
            }
        } else {
            Stage {
                argv,
                append_to: None,
            }
        }
    }

    /// Text shown for this stage in job listings.
    pub fn display(&self) -> String {
        self.argv.join(" ")
    }
}

/// A parsed input line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandLine {
    /// Stages in pipeline order; always at least one.
    pub stages: Vec<Stage>,
    /// The line ended in `&`.
    pub background: bool,
}

/// Builds a [`CommandLine`] from the words of a line.
///
/// Returns `Ok(None)` for a blank line.
pub fn parse(mut words: Vec<String>) -> Result<Option<CommandLine>> {
    if words.is_empty() {
        return Ok(None);
    }

    let background = words.last().is_some_and(|w| w == BACKGROUND);
    if background {
        words.pop();
        if words.is_empty() {
            return Err(ShellError::Syntax("unexpected token `&'".to_string()));
        }
    }

    let stages: Vec<Stage> = lexer::split_pipeline(words)?
        .into_iter()
        .map(Stage::from_words)
        .collect();

    if background && stages.len() > 1 {
        return Err(ShellError::Syntax(
            "background pipelines are not supported".to_string(),
        ));
    }

    Ok(Some(CommandLine { stages, background }))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn words(line: &str) -> Vec<String> {
        line.split_whitespace().map(String::from).collect()
    }

    #[test]
    fn test_blank_line() {
        assert_eq!(parse(Vec::new()).unwrap(), None);
    }

    #[test]
    fn test_single_command() {
        let line = parse(words("ls -la")).unwrap().unwrap();
        assert!(!line.background);
        assert_eq!(line.stages.len(), 1);
        assert_eq!(line.stages[0].argv, vec!["ls", "-la"]);
        assert_eq!(line.stages[0].append_to, None);
    }

    #[test]
    fn test_background_marker() {
        let line = parse(words("sleep 10 &")).unwrap().unwrap();
        assert!(line.background);
        assert_eq!(line.stages[0].argv, vec!["sleep", "10"]);
        assert_eq!(line.stages[0].display(), "sleep 10");

        assert!(parse(words("&")).is_err());
        assert!(parse(words("yes | head &")).is_err());
    }

    #[test]
    fn test_append_redirection() {
        let line = parse(words("echo hi >> out.txt")).unwrap().unwrap();
        let stage = &line.stages[0];
        assert_eq!(stage.argv, vec!["echo", "hi"]);
        assert_eq!(stage.append_to, Some(PathBuf::from("out.txt")));

        // Needs a command in front of the marker.
        let line = parse(words(">> out.txt")).unwrap().unwrap();
        assert_eq!(line.stages[0].argv, vec![">>", "out.txt"]);
        assert_eq!(line.stages[0].append_to, None);
    }

    #[test]
    fn test_pipeline_with_redirected_tail() {
        let line = parse(words("printf x | tr a-z A-Z >> log")).unwrap().unwrap();
        assert_eq!(line.stages.len(), 2);
        assert_eq!(line.stages[0].argv, vec!["printf", "x"]);
        assert_eq!(line.stages[1].argv, vec!["tr", "a-z", "A-Z"]);
        assert_eq!(line.stages[1].append_to, Some(PathBuf::from("log")));
    }
}
