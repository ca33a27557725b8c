//! `.esproj` project files and the on-disk build layout.
//!
//! The project format is a small XML dialect:
//!
//! ```xml
//! <Project>
//!   <PropertyGroup>
//!     <ProjectName>hello</ProjectName>
//!     <ProjectType>console</ProjectType>
//!     <Version>1.0.0</Version>
//!     <OutputType>exe</OutputType>
//!     <Description>...</Description>
//!   </PropertyGroup>
//!   <ItemGroup>
//!     <Compile Include="src/main.es"/>
//!     <PackageReference Include="corelib" Version="1.0"/>
//!   </ItemGroup>
//! </Project>
//! ```
//!
//! Only elements and double-quoted attributes occur, so parsing is a
//! purpose-built scan rather than a full XML reader. A missing
//! `<ProjectName>` derives the name from the file stem.

use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::PipelineError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ProjectType {
    #[default]
    Console,
    Library,
}

impl ProjectType {
    pub fn parse(text: &str) -> Self {
        match text {
            "library" | "Library" => ProjectType::Library,
            _ => ProjectType::Console,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ProjectType::Console => "console",
            ProjectType::Library => "library",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageReference {
    pub name: String,
    pub version: String,
}

#[derive(Debug, Clone, Default)]
pub struct Project {
    pub name: String,
    pub project_type: ProjectType,
    pub version: String,
    pub output_type: String,
    pub description: String,
    pub compile_items: Vec<PathBuf>,
    pub package_refs: Vec<PackageReference>,
    /// Directory the project file lives in; compile items are relative
    /// to it.
    pub root: PathBuf,
}

/// Extract the text of `<tag>...</tag>`, if present.
fn element_text(source: &str, tag: &str) -> Option<String> {
    let open = format!("<{tag}>");
    let close = format!("</{tag}>");
    let start = source.find(&open)? + open.len();
    let end = source[start..].find(&close)? + start;
    Some(source[start..end].trim().to_string())
}

/// Extract `attr="..."` from an element snippet.
fn attribute(snippet: &str, attr: &str) -> Option<String> {
    let needle = format!("{attr}=\"");
    let start = snippet.find(&needle)? + needle.len();
    let end = snippet[start..].find('"')? + start;
    Some(snippet[start..end].to_string())
}

/// All self-closed or open elements with the given name, as raw snippets.
fn elements<'a>(source: &'a str, tag: &str) -> Vec<&'a str> {
    let needle = format!("<{tag}");
    let mut found = Vec::new();
    let mut pos = 0usize;
    while let Some(offset) = source[pos..].find(&needle) {
        let start = pos + offset;
        let Some(end) = source[start..].find('>') else {
            break;
        };
        found.push(&source[start..start + end + 1]);
        pos = start + end + 1;
    }
    found
}

impl Project {
    /// Read and parse a project file.
    pub fn load(path: &Path) -> Result<Self, PipelineError> {
        let source = std::fs::read_to_string(path)?;
        if !source.contains("<Project") {
            return Err(PipelineError::Project(format!(
                "{} is not a project file (missing <Project> root)",
                path.display()
            )));
        }

        let name = element_text(&source, "ProjectName")
            .filter(|name| !name.is_empty())
            .unwrap_or_else(|| {
                path.file_stem()
                    .map(|stem| stem.to_string_lossy().to_string())
                    .unwrap_or_else(|| "project".to_string())
            });

        let compile_items: Vec<PathBuf> = elements(&source, "Compile")
            .iter()
            .filter_map(|snippet| attribute(snippet, "Include"))
            .map(PathBuf::from)
            .collect();
        if compile_items.is_empty() {
            return Err(PipelineError::Project(format!(
                "{} lists no <Compile> items",
                path.display()
            )));
        }

        let package_refs = elements(&source, "PackageReference")
            .iter()
            .filter_map(|snippet| {
                Some(PackageReference {
                    name: attribute(snippet, "Include")?,
                    version: attribute(snippet, "Version").unwrap_or_default(),
                })
            })
            .collect();

        let project = Self {
            name,
            project_type: ProjectType::parse(
                &element_text(&source, "ProjectType").unwrap_or_default(),
            ),
            version: element_text(&source, "Version").unwrap_or_else(|| "1.0.0".to_string()),
            output_type: element_text(&source, "OutputType").unwrap_or_else(|| "exe".to_string()),
            description: element_text(&source, "Description").unwrap_or_default(),
            compile_items,
            package_refs,
            root: path.parent().unwrap_or(Path::new(".")).to_path_buf(),
        };
        debug!(
            target: "driver.project",
            name = project.name.as_str(),
            items = project.compile_items.len(),
            "project loaded"
        );
        Ok(project)
    }

    /// Serialise back to the project XML dialect.
    pub fn to_xml(&self) -> String {
        let mut out = String::from("<Project>\n  <PropertyGroup>\n");
        out.push_str(&format!("    <ProjectName>{}</ProjectName>\n", self.name));
        out.push_str(&format!(
            "    <ProjectType>{}</ProjectType>\n",
            self.project_type.as_str()
        ));
        out.push_str(&format!("    <Version>{}</Version>\n", self.version));
        out.push_str(&format!("    <OutputType>{}</OutputType>\n", self.output_type));
        out.push_str(&format!(
            "    <Description>{}</Description>\n",
            self.description
        ));
        out.push_str("  </PropertyGroup>\n  <ItemGroup>\n");
        for item in &self.compile_items {
            out.push_str(&format!("    <Compile Include=\"{}\"/>\n", item.display()));
        }
        for package in &self.package_refs {
            out.push_str(&format!(
                "    <PackageReference Include=\"{}\" Version=\"{}\"/>\n",
                package.name, package.version
            ));
        }
        out.push_str("  </ItemGroup>\n</Project>\n");
        out
    }

    // ---------------------------------------------------------------------
    // Build layout
    // ---------------------------------------------------------------------

    pub fn obj_dir(&self) -> PathBuf {
        self.root.join("obj")
    }

    pub fn bin_dir(&self) -> PathBuf {
        self.root.join("bin")
    }

    /// Absolute source path of a compile item.
    pub fn source_path(&self, item: &Path) -> PathBuf {
        self.root.join(item)
    }

    /// Intermediate artefact path under `obj/` for one compile item.
    pub fn intermediate_path(&self, item: &Path, extension: &str) -> PathBuf {
        let stem = item
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_else(|| "out".to_string());
        self.obj_dir().join(format!("{stem}.{extension}"))
    }

    /// Final artefact path under `bin/`.
    pub fn final_output(&self) -> PathBuf {
        let name = if self.output_type == "exe" && cfg!(windows) {
            format!("{}.exe", self.name)
        } else {
            self.name.clone()
        };
        self.bin_dir().join(name)
    }

    pub fn prepare_dirs(&self) -> Result<(), PipelineError> {
        std::fs::create_dir_all(self.obj_dir())?;
        std::fs::create_dir_all(self.bin_dir())?;
        Ok(())
    }

    /// Remove the intermediate and output directories.
    pub fn clean(&self) -> Result<(), PipelineError> {
        for dir in [self.obj_dir(), self.bin_dir()] {
            if dir.exists() {
                std::fs::remove_dir_all(&dir)?;
            }
        }
        Ok(())
    }

    /// Scaffold a new project directory with a project file and a hello
    /// world source, for `esc new`.
    pub fn scaffold(parent: &Path, name: &str, project_type: ProjectType) -> Result<Self, PipelineError> {
        let root = parent.join(name);
        std::fs::create_dir_all(root.join("src"))?;
        let project = Self {
            name: name.to_string(),
            project_type,
            version: "1.0.0".to_string(),
            output_type: match project_type {
                ProjectType::Console => "exe".to_string(),
                ProjectType::Library => "lib".to_string(),
            },
            description: format!("The {name} project"),
            compile_items: vec![PathBuf::from("src/main.es")],
            package_refs: Vec::new(),
            root: root.clone(),
        };
        std::fs::write(root.join(format!("{name}.esproj")), project.to_xml())?;
        std::fs::write(
            root.join("src/main.es"),
            "int32 main() {\n    println(\"Hello, world!\");\n    return 0;\n}\n",
        )?;
        Ok(project)
    }
}

/// First `*.esproj` in a directory, in name order for determinism.
pub fn find_project_file(dir: &Path) -> Option<PathBuf> {
    let mut candidates: Vec<PathBuf> = std::fs::read_dir(dir)
        .ok()?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| path.extension().is_some_and(|ext| ext == "esproj"))
        .collect();
    candidates.sort();
    candidates.into_iter().next()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    const SAMPLE: &str = r#"<Project>
  <PropertyGroup>
    <ProjectName>demo</ProjectName>
    <ProjectType>console</ProjectType>
    <Version>2.1.0</Version>
    <OutputType>exe</OutputType>
    <Description>Sample</Description>
  </PropertyGroup>
  <ItemGroup>
    <Compile Include="src/main.es"/>
    <Compile Include="src/util.es"/>
    <PackageReference Include="corelib" Version="1.4"/>
  </ItemGroup>
</Project>
"#;

    #[test]
    fn parses_properties_and_items() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("demo.esproj");
        fs::write(&path, SAMPLE).unwrap();

        let project = Project::load(&path).unwrap();
        assert_eq!(project.name, "demo");
        assert_eq!(project.project_type, ProjectType::Console);
        assert_eq!(project.version, "2.1.0");
        assert_eq!(project.compile_items.len(), 2);
        assert_eq!(
            project.package_refs,
            vec![PackageReference {
                name: "corelib".to_string(),
                version: "1.4".to_string()
            }]
        );
    }

    #[test]
    fn missing_project_name_derives_from_filename() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("fallback.esproj");
        fs::write(
            &path,
            "<Project><ItemGroup><Compile Include=\"a.es\"/></ItemGroup></Project>",
        )
        .unwrap();
        let project = Project::load(&path).unwrap();
        assert_eq!(project.name, "fallback");
    }

    #[test]
    fn non_project_file_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("junk.esproj");
        fs::write(&path, "just text").unwrap();
        assert!(Project::load(&path).is_err());
    }

    #[test]
    fn xml_round_trip_preserves_content() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rt.esproj");
        fs::write(&path, SAMPLE).unwrap();
        let project = Project::load(&path).unwrap();

        let rewritten_path = dir.path().join("rt2.esproj");
        fs::write(&rewritten_path, project.to_xml()).unwrap();
        let reloaded = Project::load(&rewritten_path).unwrap();
        assert_eq!(reloaded.name, project.name);
        assert_eq!(reloaded.compile_items, project.compile_items);
        assert_eq!(reloaded.package_refs, project.package_refs);
    }

    #[test]
    fn scaffold_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let project = Project::scaffold(dir.path(), "hello", ProjectType::Console).unwrap();
        assert!(project.root.join("hello.esproj").exists());
        assert!(project.root.join("src/main.es").exists());

        let loaded = Project::load(&project.root.join("hello.esproj")).unwrap();
        assert_eq!(loaded.name, "hello");
        assert_eq!(loaded.compile_items, vec![PathBuf::from("src/main.es")]);
    }

    #[test]
    fn build_layout_and_clean() {
        let dir = tempfile::tempdir().unwrap();
        let project = Project::scaffold(dir.path(), "layout", ProjectType::Console).unwrap();
        project.prepare_dirs().unwrap();
        assert!(project.obj_dir().exists());
        assert!(project.bin_dir().exists());
        assert_eq!(
            project.intermediate_path(Path::new("src/main.es"), "ir"),
            project.obj_dir().join("main.ir")
        );
        project.clean().unwrap();
        assert!(!project.obj_dir().exists());
        assert!(!project.bin_dir().exists());
    }

    #[test]
    fn find_project_file_prefers_name_order() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("b.esproj"), "<Project/>").unwrap();
        fs::write(dir.path().join("a.esproj"), "<Project/>").unwrap();
        let found = find_project_file(dir.path()).unwrap();
        assert!(found.ends_with("a.esproj"));
    }
}
