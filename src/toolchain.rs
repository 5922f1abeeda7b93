//! Immutable per-language toolchain descriptors.
//!
//! Adding a language means adding one descriptor here (plus, where the
//! compiler or runtime needs it, a preprocessing rule and an error-line
//! pattern). No other component branches on language identity.

use std::borrow::Cow;
use std::sync::LazyLock;

use regex::Regex;

use crate::error::Error;
use crate::Result;

/// How to stage, optionally compile, and run submitted source for one
/// language. Process-wide and immutable.
#[derive(Debug, Clone, Copy)]
pub struct ToolchainDescriptor {
    pub tag: &'static str,
    /// File name the run command expects inside the box
    pub source_file_name: &'static str,
    pub compile_command: Option<&'static str>,
    pub run_command: &'static str,
    /// Extra passthrough flags for the sandbox launcher, e.g. bind mounts
    /// for runtime dependencies
    pub sandbox_opts: &'static [&'static str],
}

static TOOLCHAINS: &[ToolchainDescriptor] = &[
    ToolchainDescriptor {
        tag: "py",
        source_file_name: "main.py",
        compile_command: None,
        run_command: "/usr/bin/python3 main.py",
        sandbox_opts: &[],
    },
    ToolchainDescriptor {
        tag: "js",
        source_file_name: "main.js",
        compile_command: None,
        run_command: "/usr/bin/node main.js",
        sandbox_opts: &[],
    },
    ToolchainDescriptor {
        tag: "java",
        source_file_name: "main.java",
        compile_command: Some("/usr/bin/javac main.java"),
        run_command: "/usr/bin/java main",
        sandbox_opts: &[
            "--dir=/etc/alternatives=/etc/alternatives",
            "--dir=/etc/java-21-openjdk/security=/etc/java-21-openjdk/security",
        ],
    },
    ToolchainDescriptor {
        tag: "cpp",
        source_file_name: "main.cpp",
        compile_command: Some("/usr/bin/g++ -o program main.cpp"),
        run_command: "./program",
        sandbox_opts: &[],
    },
];

/// Look up the descriptor for a language tag.
pub fn resolve(tag: &str) -> Result<&'static ToolchainDescriptor> {
    TOOLCHAINS
        .iter()
        .find(|tc| tc.tag == tag)
        .ok_or_else(|| Error::UnsupportedLanguage(tag.to_string()))
}

/// All registered language tags.
pub fn tags() -> impl Iterator<Item = &'static str> {
    TOOLCHAINS.iter().map(|tc| tc.tag)
}

static JAVA_CLASS_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"public\s+class\s+(\w+)").expect("valid regex"));

/// Language-specific source rewriting before staging.
///
/// Java source must expose its entry point under the fixed class name `main`
/// that the run command loads, so the declared public class is renamed.
pub fn preprocess<'a>(tag: &str, code: &'a str) -> Cow<'a, str> {
    if tag != "java" {
        return Cow::Borrowed(code);
    }
    JAVA_CLASS_RE.replace_all(code, |caps: &regex::Captures<'_>| {
        let class_name = &caps[1];
        if class_name == "main" {
            caps[0].to_string()
        } else {
            caps[0].replace(class_name, "main")
        }
    })
}

// Compiler / stack-trace formats per language family.
static JAVA_LINE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"([^:]+):(\d+)(?::\d+)?(?:\)|:)").expect("valid regex"));
static JS_LINE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"at .+\((.*\.js):(\d+):\d+\)").expect("valid regex"));
static PY_LINE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"File "([^"]+)", line (\d+)"#).expect("valid regex"));
static CPP_LINE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"([^:]+):(\d+):\d+:").expect("valid regex"));

/// Recover the source line a compiler diagnostic or stack trace points at.
/// Returns `None` on any miss; never fails.
pub fn error_line(tag: &str, stderr: &str) -> Option<u32> {
    let regex: &Regex = match tag {
        "java" => &JAVA_LINE_RE,
        "js" => &JS_LINE_RE,
        "py" => &PY_LINE_RE,
        "cpp" => &CPP_LINE_RE,
        _ => return None,
    };
    regex
        .captures(stderr)
        .and_then(|caps| caps.get(2))
        .and_then(|m| m.as_str().parse().ok())
}
