// shader.rs
use std::path::{Path, PathBuf};

use crate::error::ResourceLoadError;

/// Shader text ready to hand to `wgpu::ShaderSource::Wgsl`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShaderSource {
    pub label: String,
    pub text: String,
}

/// WGSL has no preprocessor, so capacity macros become module constants.
pub fn max_instances_definition(capacity: usize) -> String {
    format!("const MAX_INSTANCES: u32 = {}u;", capacity)
}

/// Inserts `definition` as line 2. Line 1 is reserved for the file header.
pub fn inject_definition(source: &str, definition: &str) -> String {
    let mut lines = source.lines();
    let mut out = String::with_capacity(source.len() + definition.len() + 2);
    out.push_str(lines.next().unwrap_or_default());
    out.push('\n');
    out.push_str(definition);
    out.push('\n');
    for line in lines {
        out.push_str(line);
        out.push('\n');
    }
    out
}

/// Reads shader files relative to a root directory.
#[derive(Debug, Clone)]
pub struct ShaderSourceLoader {
    root: PathBuf,
}

impl ShaderSourceLoader {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn load(&self, file_name: &str) -> Result<ShaderSource, ResourceLoadError> {
        self.load_with_definition(file_name, None)
    }

    pub fn load_with_definition(
        &self,
        file_name: &str,
        definition: Option<&str>,
    ) -> Result<ShaderSource, ResourceLoadError> {
        let path = self.root.join(file_name);
        log::debug!("Loading shader: {:?}", path);

        let text = std::fs::read_to_string(&path).map_err(|source| ResourceLoadError::Io {
            path: path.clone(),
            source,
        })?;
        if text.is_empty() {
            return Err(ResourceLoadError::Empty(path));
        }

        let text = match definition {
            Some(definition) => inject_definition(&text, definition),
            None => text,
        };

        Ok(ShaderSource {
            label: file_name.to_owned(),
            text,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn definition_lands_on_second_line() {
        let source = "// header\nstruct A { x: f32 };\nfn main() {}";
        let injected = inject_definition(source, &max_instances_definition(12));
        let lines: Vec<&str> = injected.lines().collect();
        assert_eq!(lines[0], "// header");
        assert_eq!(lines[1], "const MAX_INSTANCES: u32 = 12u;");
        assert_eq!(lines[2], "struct A { x: f32 };");
        assert_eq!(lines.len(), 4);
    }

    #[test]
    fn single_line_source_still_gets_definition() {
        let injected = inject_definition("// only", "const X: u32 = 1u;");
        assert_eq!(injected, "// only\nconst X: u32 = 1u;\n");
    }

    #[test]
    fn missing_file_is_a_load_error() {
        let loader = ShaderSourceLoader::new("no/such/dir");
        let err = loader.load("instancing.wgsl").unwrap_err();
        assert!(matches!(err, ResourceLoadError::Io { .. }));
    }

    #[test]
    fn loads_and_injects_from_disk() {
        let dir = std::env::temp_dir().join(format!("shader_loader_{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("test.wgsl"), "// test.wgsl\r\nfn f() {}\r\n").unwrap();

        let loader = ShaderSourceLoader::new(&dir);
        let source = loader
            .load_with_definition("test.wgsl", Some("const MAX_INSTANCES: u32 = 3u;"))
            .unwrap();
        assert_eq!(source.label, "test.wgsl");
        assert_eq!(
            source.text,
            "// test.wgsl\nconst MAX_INSTANCES: u32 = 3u;\nfn f() {}\n"
        );

        std::fs::remove_dir_all(&dir).ok();
    }
}
