//! # Inputs
//! Locating and loading the data document and the template, and writing the assembled prompt to the
//! debug file.
//!
//! Both inputs are looked up first under `inputs/` and then at the project root.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use log::debug;
use serde_json::Value;

use crate::inputs::errors::InputNotFound;
use crate::prompt::PromptPair;

pub const DADOS_FILE_NAME: &str = "dados.json";
pub const TEMPLATE_FILE_NAME: &str = "prompt_template.txt";
pub const INPUTS_DIR: &str = "inputs";
pub const OUTPUTS_DIR: &str = "outputs";
pub const DEBUG_FILE_NAME: &str = "prompt_montado_debug.txt";

/// Returns the first candidate that exists.
pub fn find_file<P: AsRef<Path>>(candidates: &[P]) -> Result<PathBuf, InputNotFound> {
    candidates
        .iter()
        .map(AsRef::as_ref)
        .find(|path| path.exists())
        .map(Path::to_path_buf)
        .ok_or_else(|| InputNotFound::new(candidates))
}

fn default_input(project_root: &Path, file_name: &str) -> Result<PathBuf, InputNotFound> {
    find_file(&[
        project_root.join(INPUTS_DIR).join(file_name),
        project_root.join(file_name),
    ])
}

pub fn default_dados_path(project_root: &Path) -> Result<PathBuf, InputNotFound> {
    default_input(project_root, DADOS_FILE_NAME)
}

pub fn default_template_path(project_root: &Path) -> Result<PathBuf, InputNotFound> {
    default_input(project_root, TEMPLATE_FILE_NAME)
}

pub fn default_outdir(project_root: &Path) -> PathBuf {
    project_root.join(OUTPUTS_DIR)
}

/// Reads and parses a JSON document.
pub fn load_json(path: &Path) -> Result<Value> {
    let text = load_text(path)?;
    let value = serde_json::from_str(&text)
        .with_context(|| format!("invalid JSON in {}", path.display()))?;
    debug!("Loaded data document from {}", path.display());
    Ok(value)
}

pub fn load_text(path: &Path) -> Result<String> {
    fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))
}

pub fn ensure_dir(path: &Path) -> Result<()> {
    fs::create_dir_all(path).with_context(|| format!("failed to create directory {}", path.display()))
}

/// Writes both prompt halves to [DEBUG_FILE_NAME] inside `outdir` and returns the file path.
pub fn write_debug_prompt(outdir: &Path, prompt: &PromptPair) -> Result<PathBuf> {
    ensure_dir(outdir)?;
    let debug_path = outdir.join(DEBUG_FILE_NAME);
    fs::write(&debug_path, prompt.debug_text())
        .with_context(|| format!("failed to write {}", debug_path.display()))?;
    Ok(debug_path)
}

pub mod errors {
    use std::error::Error;
    use std::fmt;
    use std::fmt::Formatter;
    use std::path::{Path, PathBuf};

    /// Error when none of the candidate paths of an input file exists.
    #[derive(Debug, Clone)]
    pub struct InputNotFound {
        pub candidates: Vec<PathBuf>,
    }

    impl InputNotFound {
        pub(crate) fn new<P: AsRef<Path>>(candidates: &[P]) -> Self {
            Self {
                candidates: candidates.iter().map(|p| p.as_ref().to_path_buf()).collect(),
            }
        }
    }

    impl fmt::Display for InputNotFound {
        fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
            let candidates: Vec<String> = self.candidates.iter().map(|p| p.display().to_string()).collect();
            write!(f, "no input file found: {}", candidates.join(", "))
        }
    }

    impl Error for InputNotFound {}
}
