use super::{Error, Stack};

use serde_json::{json, Map, Value};
use std::{
    fs,
    path::{Path, PathBuf},
};
use tracing::info;

const MANIFEST_FILE: &str = "manifest.json";
const ASSEMBLY_VERSION: &str = "1";

/// The synthesized stacks of one run.
#[derive(Debug, Clone, PartialEq)]
pub struct Assembly {
    stacks: Vec<Stack>,
}

impl Assembly {
    pub fn new(stacks: Vec<Stack>) -> Self {
        Self { stacks }
    }

    pub fn stacks(&self) -> &[Stack] {
        &self.stacks
    }

    pub fn stack(&self, name: &str) -> Option<&Stack> {
        self.stacks.iter().find(|stack| stack.name() == name)
    }

    /// Index of the stacks, pointing at their template files.
    pub fn manifest(&self) -> Value {
        let stacks = self
            .stacks
            .iter()
            .map(|stack| {
                let entry = json!({
                    "account": stack.env().account(),
                    "region": stack.env().region(),
                    "template": template_file_name(stack),
                });
                (stack.name().to_string(), entry)
            })
            .collect::<Map<String, Value>>();

        json!({
            "version": ASSEMBLY_VERSION,
            "stacks": stacks,
        })
    }

    /// Write every template and the manifest into `dir`, creating it if needed.
    ///
    /// All documents are rendered before the first file is written, so a
    /// rendering error leaves the directory untouched.
    pub fn write_to(&self, dir: impl AsRef<Path>) -> Result<Vec<PathBuf>, Error> {
        let dir = dir.as_ref();

        let mut documents = self
            .stacks
            .iter()
            .map(|stack| Ok((dir.join(template_file_name(stack)), stack.to_json()?)))
            .collect::<Result<Vec<(PathBuf, String)>, Error>>()?;
        documents.push((
            dir.join(MANIFEST_FILE),
            serde_json::to_string_pretty(&self.manifest())?,
        ));

        fs::create_dir_all(dir)?;

        let mut written = vec![];
        for (path, document) in documents {
            fs::write(&path, document)?;
            info!("Wrote {}", path.display());
            written.push(path);
        }

        Ok(written)
    }
}

fn template_file_name(stack: &Stack) -> String {
    format!("{}.template.json", stack.name())
}
