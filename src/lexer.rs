//! Lexical analysis of a raw input line.
//!
//! The shell's grammar is deliberately flat: a line is a list of words separated by
//! spaces, tabs or newlines. Quotes are not interpreted here; the `echo` built-in
//! strips them itself.

use crate::config::ShellConfig;
use crate::error::{Result, ShellError};

/// The literal token separating two pipeline stages.
pub const PIPE: &str = "|";

const SEPARATORS: [char; 3] = [' ', '\t', '\n'];

/// Splits `line` into words.
///
/// # Errors
/// * [`ShellError::LineTooLong`] when the line exceeds `config.max_line_len` bytes.
/// * [`ShellError::TooManyArguments`] when it holds more than `config.max_args` words.
///   This one is fatal for the session.
pub fn tokenize(line: &str, config: &ShellConfig) -> Result<Vec<String>> {
    if line.len() > config.max_line_len {
        return Err(ShellError::LineTooLong {
            max: config.max_line_len,
        });
    }

    let mut words = Vec::new();
    for word in line.split(SEPARATORS).filter(|w| !w.is_empty()) {
        if words.len() == config.max_args {
            return Err(ShellError::TooManyArguments {
                max: config.max_args,
            });
        }
        words.push(word.to_string());
    }
    Ok(words)
}

/// Position of the first pipe token, if any.
pub fn find_pipe(words: &[String]) -> Option<usize> {
    words.iter().position(|w| w == PIPE)
}

/// Cuts `words` at every pipe token.
///
/// A line without pipes yields a single stage. Empty stages (leading, trailing or
/// doubled pipes) are rejected.
pub fn split_pipeline(mut words: Vec<String>) -> Result<Vec<Vec<String>>> {
    let mut stages = Vec::new();
    while let Some(pos) = find_pipe(&words) {
        let rest = words.split_off(pos + 1);
        words.pop();
        if words.is_empty() {
            return Err(ShellError::Syntax("unexpected token `|'".to_string()));
        }
        stages.push(words);
        words = rest;
    }
    if words.is_empty() {
        return Err(ShellError::Syntax("unexpected end of line after `|'".to_string()));
    }
    stages.push(words);
    Ok(stages)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn words(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_tokenize_splits_on_blanks() {
        let config = ShellConfig::default();
        let got = tokenize("  ls\t-la \n", &config).unwrap();
        assert_eq!(got, words(&["ls", "-la"]));

        assert!(tokenize("", &config).unwrap().is_empty());
        assert!(tokenize(" \t\n", &config).unwrap().is_empty());
    }

    #[test]
    fn test_tokenize_keeps_quotes() {
        let config = ShellConfig::default();
        let got = tokenize("echo \"a b\"", &config).unwrap();
        assert_eq!(got, words(&["echo", "\"a", "b\""]));
    }

    #[test]
    fn test_tokenize_argument_limit() {
        let config = ShellConfig::default().with_max_args(3);
        assert_eq!(tokenize("a b c", &config).unwrap().len(), 3);

        let err = tokenize("a b c d", &config).unwrap_err();
        assert!(matches!(err, ShellError::TooManyArguments { max: 3 }));
        assert!(err.is_fatal());
    }

    #[test]
    fn test_tokenize_line_limit() {
        let config = ShellConfig::default();
        let line = "x".repeat(config.max_line_len + 1);
        let err = tokenize(&line, &config).unwrap_err();
        assert!(matches!(err, ShellError::LineTooLong { .. }));
        assert!(!err.is_fatal());
    }

    #[test]
    fn test_find_pipe() {
        assert_eq!(find_pipe(&words(&["ls", "|", "wc", "|", "cat"])), Some(1));
        assert_eq!(find_pipe(&words(&["ls", "a|b"])), None);
        assert_eq!(find_pipe(&[]), None);
    }

    #[test]
    fn test_split_pipeline() {
        let stages = split_pipeline(words(&["ls", "-l", "|", "grep", "x", "|", "wc"])).unwrap();
        assert_eq!(
            stages,
            vec![words(&["ls", "-l"]), words(&["grep", "x"]), words(&["wc"])]
        );

        let single = split_pipeline(words(&["pwd"])).unwrap();
        assert_eq!(single, vec![words(&["pwd"])]);
    }

    #[test]
    fn test_split_pipeline_rejects_empty_stages() {
        assert!(split_pipeline(words(&["|", "wc"])).is_err());
        assert!(split_pipeline(words(&["ls", "|"])).is_err());
        assert!(split_pipeline(words(&["ls", "|", "|", "wc"])).is_err());
    }
}
