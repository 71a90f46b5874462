// ============================
// crates/backend-lib/src/language.rs
// ============================
//! The fixed table of runnable languages: file extensions, compile
//! commands, and runtime commands.

use regex::Regex;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::LazyLock;
use uuid::Uuid;

/// Java requires the public class name to match the source file name.
static JAVA_CLASS_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"public\s+class\s+(\w+)").unwrap());

/// Languages the sandbox can run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Language {
    Javascript,
    Typescript,
    Python,
    Java,
    Csharp,
    Php,
    Cpp,
}

impl FromStr for Language {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "javascript" => Ok(Language::Javascript),
            "typescript" => Ok(Language::Typescript),
            "python" => Ok(Language::Python),
            "java" => Ok(Language::Java),
            "csharp" => Ok(Language::Csharp),
            "php" => Ok(Language::Php),
            "cpp" => Ok(Language::Cpp),
            _ => Err(()),
        }
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Language::Javascript => "javascript",
            Language::Typescript => "typescript",
            Language::Python => "python",
            Language::Java => "java",
            Language::Csharp => "csharp",
            Language::Php => "php",
            Language::Cpp => "cpp",
        })
    }
}

impl Language {
    pub fn extension(&self) -> &'static str {
        match self {
            Language::Javascript => "js",
            Language::Typescript => "ts",
            Language::Python => "py",
            Language::Java => "java",
            Language::Csharp => "cs",
            Language::Php => "php",
            Language::Cpp => "cpp",
        }
    }
}

/// A command line as (program, arguments)
pub type CommandSpec = (String, Vec<String>);

/// Everything needed to execute one run: where the source goes, the
/// optional compile step, the runtime command, and which paths to delete
/// afterwards.
#[derive(Debug, Clone)]
pub struct RunPlan {
    pub language: Language,
    pub source: PathBuf,
    pub compile: Option<CommandSpec>,
    pub run: CommandSpec,
    /// All artifacts of this run (source file, compiled binary or class
    /// file), removed best-effort after exit
    pub artifacts: Vec<PathBuf>,
}

impl RunPlan {
    /// Build the plan for one run. Temp paths are derived from the
    /// connection id so concurrent users never collide.
    pub fn build(language: Language, conn_id: Uuid, temp_dir: &Path, code: &str) -> RunPlan {
        let stem = format!("job_{conn_id}");

        match language {
            Language::Java => {
                let class_name = JAVA_CLASS_REGEX
                    .captures(code)
                    .and_then(|c| c.get(1))
                    .map_or("Main", |m| m.as_str());
                let source = temp_dir.join(format!("{class_name}.java"));
                let class_file = temp_dir.join(format!("{class_name}.class"));
                RunPlan {
                    language,
                    source: source.clone(),
                    compile: Some((
                        "javac".to_string(),
                        vec![
                            "-d".to_string(),
                            temp_dir.display().to_string(),
                            source.display().to_string(),
                        ],
                    )),
                    run: (
                        "java".to_string(),
                        vec![
                            "-cp".to_string(),
                            temp_dir.display().to_string(),
                            class_name.to_string(),
                        ],
                    ),
                    artifacts: vec![source, class_file],
                }
            },
            Language::Cpp => {
                let source = temp_dir.join(format!("{stem}.cpp"));
                let binary = temp_dir.join(format!("{stem}.out"));
                RunPlan {
                    language,
                    source: source.clone(),
                    compile: Some((
                        "g++".to_string(),
                        vec![
                            source.display().to_string(),
                            "-o".to_string(),
                            binary.display().to_string(),
                        ],
                    )),
                    run: (binary.display().to_string(), vec![]),
                    artifacts: vec![source, binary],
                }
            },
            Language::Csharp => {
                let source = temp_dir.join(format!("{stem}.cs"));
                let binary = temp_dir.join(format!("{stem}.exe"));
                RunPlan {
                    language,
                    source: source.clone(),
                    compile: Some((
                        "csc".to_string(),
                        vec![
                            format!("/out:{}", binary.display()),
                            source.display().to_string(),
                        ],
                    )),
                    run: (binary.display().to_string(), vec![]),
                    artifacts: vec![source, binary],
                }
            },
            Language::Javascript | Language::Typescript | Language::Python | Language::Php => {
                let source = temp_dir.join(format!("{stem}.{}", language.extension()));
                let source_arg = source.display().to_string();
                let run = match language {
                    Language::Javascript => ("node".to_string(), vec![source_arg]),
                    Language::Typescript => (
                        "npx".to_string(),
                        vec!["ts-node".to_string(), source_arg],
                    ),
                    Language::Python => (
                        "python3".to_string(),
                        vec!["-u".to_string(), source_arg],
                    ),
                    Language::Php => ("php".to_string(), vec![source_arg]),
                    _ => unreachable!(),
                };
                RunPlan {
                    language,
                    source: source.clone(),
                    compile: None,
                    run,
                    artifacts: vec![source],
                }
            },
        }
    }
}
