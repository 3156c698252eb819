//! Probing for optional, language-specific dependencies.
//!
//! Probing only reports availability. Deciding whether a missing dependency
//! is fatal, and telling the user about it, is up to the caller.

use std::process::{Command, Stdio};

/// An external dependency some languages need.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Dependency {
    /// Text normalization for a CJK language, identified by its espeak-ng
    /// voice (`ja`, `cmn`).
    CjkTextNormalizer(&'static str),
    /// The espeak-ng pronunciation fallback.
    Espeak,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Availability {
    Available,
    Missing(String),
}

impl Availability {
    pub fn is_available(&self) -> bool {
        matches!(self, Availability::Available)
    }
}

/// How badly a language needs its dependency.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// Synthesis cannot proceed without it.
    Fatal,
    /// Synthesis works, pronunciation may suffer.
    Advisory,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Requirement {
    pub dependency: Dependency,
    pub severity: Severity,
    pub language: &'static str,
}

/// Dependency required by a pipeline language code, if any.
pub fn requirement_for(lang_code: &str) -> Option<Requirement> {
    let (dependency, severity, language) = match lang_code {
        "j" => (Dependency::CjkTextNormalizer("ja"), Severity::Fatal, "Japanese"),
        "z" => (Dependency::CjkTextNormalizer("cmn"), Severity::Fatal, "Chinese"),
        "e" => (Dependency::Espeak, Severity::Advisory, "Spanish"),
        "f" => (Dependency::Espeak, Severity::Advisory, "French"),
        "h" => (Dependency::Espeak, Severity::Advisory, "Hindi"),
        "i" => (Dependency::Espeak, Severity::Advisory, "Italian"),
        "p" => (Dependency::Espeak, Severity::Advisory, "Portuguese"),
        _ => return None,
    };
    Some(Requirement {
        dependency,
        severity,
        language,
    })
}

/// Answers whether a dependency is usable on this machine.
pub trait CapabilityProbe {
    fn probe(&self, dependency: &Dependency) -> Availability;
}

/// Probes the local system by running `espeak-ng`.
#[derive(Debug, Clone)]
pub struct SystemProbe {
    espeak_bin: String,
}

impl Default for SystemProbe {
    fn default() -> Self {
        Self {
            espeak_bin: "espeak-ng".to_string(),
        }
    }
}

impl SystemProbe {
    pub fn with_binary(espeak_bin: impl Into<String>) -> Self {
        Self {
            espeak_bin: espeak_bin.into(),
        }
    }

    fn run(&self, args: &[&str]) -> Result<String, String> {
        let output = Command::new(&self.espeak_bin)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .map_err(|e| format!("{} could not be started: {e}", self.espeak_bin))?;
        if !output.status.success() {
            return Err(format!(
                "{} exited with code {:?}",
                self.espeak_bin,
                output.status.code()
            ));
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

impl CapabilityProbe for SystemProbe {
    fn probe(&self, dependency: &Dependency) -> Availability {
        match dependency {
            Dependency::Espeak => match self.run(&["--version"]) {
                Ok(_) => Availability::Available,
                Err(reason) => Availability::Missing(reason),
            },
            Dependency::CjkTextNormalizer(voice) => {
                let filter = format!("--voices={voice}");
                match self.run(&[filter.as_str()]) {
                    Ok(listing) if lists_voice(&listing, voice) => Availability::Available,
                    Ok(_) => Availability::Missing(format!("no '{voice}' language data installed")),
                    Err(reason) => Availability::Missing(reason),
                }
            }
        }
    }
}

/// `espeak-ng --voices=<lang>` prints a header line followed by one row per
/// voice; the second column is the language.
fn lists_voice(listing: &str, voice: &str) -> bool {
    listing
        .lines()
        .skip(1)
        .filter_map(|line| line.split_whitespace().nth(1))
        .any(|lang| lang == voice)
}
