// Command builder: turns (language, source) into the argv run inside the sandbox

use crate::registry::{spec_for, Recipe};
use skyforge_common::types::Language;

/// Wrap `text` in a POSIX single-quoted literal.
///
/// Inside single quotes the shell interprets nothing, so the only character
/// that needs care is the quote itself: each `'` becomes `'\''` (close,
/// escaped quote, reopen).
pub fn single_quote(text: &str) -> String {
    let mut quoted = String::with_capacity(text.len() + 2);
    quoted.push('\'');
    for ch in text.chars() {
        if ch == '\'' {
            quoted.push_str("'\\''");
        } else {
            quoted.push(ch);
        }
    }
    quoted.push('\'');
    quoted
}

/// Shell step that writes `contents` verbatim to `file`
fn write_file_step(file: &str, contents: &str) -> String {
    format!("printf '%s' {} > {}", single_quote(contents), file)
}

/// Build the argument vector for running `source` as `language`
pub fn build(language: Language, source: &str) -> Vec<String> {
    match spec_for(language).recipe {
        Recipe::Inline { program, flag } => {
            vec![program.to_string(), flag.to_string(), source.to_string()]
        }
        Recipe::Script {
            file,
            support_files,
            command,
        } => {
            let mut steps = vec![write_file_step(file, source)];
            steps.extend(
                support_files
                    .iter()
                    .map(|support| write_file_step(support.name, support.contents)),
            );
            steps.push(command.to_string());
            vec!["sh".to_string(), "-c".to_string(), steps.join(" && ")]
        }
    }
}
