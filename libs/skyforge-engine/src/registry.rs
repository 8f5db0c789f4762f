// Language registry
// Static, read-only table: one entry per supported language.
// Adding a language is a data change here plus a `Language` variant.

use skyforge_common::types::Language;

/// How a language's toolchain is driven inside the sandbox
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Recipe {
    /// Interpreter has an "execute this string" flag: `[program, flag, source]`
    Inline {
        program: &'static str,
        flag: &'static str,
    },
    /// Write the source to `file`, write any support files, then run `command`
    /// in one `sh -c` pipeline joined with `&&`
    Script {
        file: &'static str,
        support_files: &'static [SupportFile],
        command: &'static str,
    },
}

/// Extra file synthesized next to the source before the toolchain runs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SupportFile {
    pub name: &'static str,
    pub contents: &'static str,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LanguageSpec {
    pub language: Language,
    /// Image for the primary sandbox
    pub image: &'static str,
    /// Runtime name on Fallback A (Piston)
    pub piston_runtime: Option<&'static str>,
    /// Numeric language id on Fallback B (Judge0)
    pub judge0_id: Option<u32>,
    pub recipe: Recipe,
    /// Extra environment for the sandbox container
    pub env: &'static [&'static str],
}

/// Lets `go run` work in module mode with the network disabled
const GO_MODULE: SupportFile = SupportFile {
    name: "go.mod",
    contents: "module sandbox\n\ngo 1.22\n",
};

const GO_ENV: &[&str] = &[
    "GOPROXY=off",
    "GONOSUMCHECK=*",
    "GONOSUMDB=*",
    "HOME=/home/coderunner",
    "GOPATH=/home/coderunner/go",
    "GOMODCACHE=/home/coderunner/go/pkg/mod",
];

pub static LANGUAGES: [LanguageSpec; 12] = [
    LanguageSpec {
        language: Language::Python,
        image: "skyforge-python:latest",
        piston_runtime: Some("python"),
        judge0_id: Some(71),
        recipe: Recipe::Inline { program: "python", flag: "-c" },
        env: &[],
    },
    LanguageSpec {
        language: Language::Node,
        image: "skyforge-node:latest",
        piston_runtime: Some("node"),
        judge0_id: Some(63),
        recipe: Recipe::Inline { program: "node", flag: "-e" },
        env: &[],
    },
    LanguageSpec {
        language: Language::Javascript,
        image: "skyforge-javascript:latest",
        piston_runtime: Some("node"),
        judge0_id: Some(63),
        recipe: Recipe::Inline { program: "node", flag: "-e" },
        env: &[],
    },
    LanguageSpec {
        language: Language::Typescript,
        image: "skyforge-typescript:latest",
        piston_runtime: Some("typescript"),
        judge0_id: Some(74),
        recipe: Recipe::Script {
            file: "main.ts",
            support_files: &[],
            command: r#"ts-node --transpile-only --compiler-options '{"module":"commonjs"}' main.ts"#,
        },
        env: &[],
    },
    LanguageSpec {
        language: Language::Java,
        image: "skyforge-java:latest",
        piston_runtime: Some("java"),
        judge0_id: Some(62),
        recipe: Recipe::Script {
            file: "Main.java",
            support_files: &[],
            command: "javac Main.java && java Main",
        },
        env: &[],
    },
    LanguageSpec {
        language: Language::C,
        image: "skyforge-c:latest",
        piston_runtime: Some("c"),
        judge0_id: Some(50),
        recipe: Recipe::Script {
            file: "main.c",
            support_files: &[],
            command: "gcc -o main main.c && ./main",
        },
        env: &[],
    },
    LanguageSpec {
        language: Language::Csharp,
        image: "skyforge-csharp:latest",
        piston_runtime: Some("csharp"),
        judge0_id: Some(51),
        recipe: Recipe::Script {
            file: "Main.cs",
            support_files: &[],
            command: "mcs Main.cs -out:Main.exe && mono Main.exe",
        },
        env: &[],
    },
    LanguageSpec {
        language: Language::Go,
        image: "skyforge-go:latest",
        piston_runtime: Some("go"),
        judge0_id: Some(60),
        recipe: Recipe::Script {
            file: "main.go",
            support_files: &[GO_MODULE],
            command: "go run main.go",
        },
        env: GO_ENV,
    },
    LanguageSpec {
        language: Language::Rust,
        image: "skyforge-rust:latest",
        piston_runtime: Some("rust"),
        judge0_id: Some(75),
        recipe: Recipe::Script {
            file: "main.rs",
            support_files: &[],
            command: "rustc main.rs -o main && ./main",
        },
        env: &[],
    },
    LanguageSpec {
        language: Language::Ruby,
        image: "skyforge-ruby:latest",
        piston_runtime: Some("ruby"),
        judge0_id: Some(72),
        recipe: Recipe::Script {
            file: "main.rb",
            support_files: &[],
            command: "ruby main.rb",
        },
        env: &[],
    },
    LanguageSpec {
        language: Language::Php,
        image: "skyforge-php:latest",
        piston_runtime: Some("php"),
        judge0_id: Some(68),
        recipe: Recipe::Script {
            file: "main.php",
            support_files: &[],
            command: "php main.php",
        },
        env: &[],
    },
    LanguageSpec {
        language: Language::Bash,
        image: "skyforge-bash:latest",
        piston_runtime: Some("bash"),
        judge0_id: Some(46),
        recipe: Recipe::Inline { program: "sh", flag: "-c" },
        env: &[],
    },
];

/// Look up the registry entry for a language
pub fn spec_for(language: Language) -> &'static LanguageSpec {
    // The table is ordered like `Language::ALL`
    let index = Language::ALL
        .iter()
        .position(|l| *l == language)
        .unwrap_or_default();
    &LANGUAGES[index]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registry_covers_every_language_in_order() {
        for (idx, lang) in Language::ALL.iter().enumerate() {
            assert_eq!(LANGUAGES[idx].language, *lang);
            assert_eq!(spec_for(*lang).language, *lang);
        }
    }

    #[test]
    fn test_image_names_follow_language() {
        for spec in LANGUAGES.iter() {
            assert_eq!(spec.image, format!("skyforge-{}:latest", spec.language));
        }
    }

    #[test]
    fn test_fallback_mappings() {
        assert_eq!(spec_for(Language::Javascript).piston_runtime, Some("node"));
        assert_eq!(spec_for(Language::Python).judge0_id, Some(71));
        assert_eq!(spec_for(Language::Bash).judge0_id, Some(46));
        assert_eq!(spec_for(Language::Typescript).judge0_id, Some(74));
    }

    #[test]
    fn test_only_go_needs_environment_and_support_files() {
        for spec in LANGUAGES.iter() {
            let has_support = matches!(
                spec.recipe,
                Recipe::Script { support_files, .. } if !support_files.is_empty()
            );
            assert_eq!(has_support, spec.language == Language::Go);
            assert_eq!(!spec.env.is_empty(), spec.language == Language::Go);
        }
        assert!(spec_for(Language::Go).env.contains(&"GOPROXY=off"));
    }
}
