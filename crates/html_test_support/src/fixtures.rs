use serde::Deserialize;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

/// One reconciler case: morph the children of `#scope` in `live` into the
/// children of the first top-level element of `target`.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MorphFixture {
    pub name: String,
    pub live: String,
    pub target: String,
    /// Expected markup of the scope element afterwards; defaults to `target`.
    #[serde(default)]
    pub expected: Option<String>,
    /// Ids whose live node must be the same object before and after.
    #[serde(default)]
    pub preserved_ids: Vec<String>,
    /// Id of the element holding focus before the morph.
    #[serde(default)]
    pub focus: Option<String>,
    /// Values typed into controls before the morph, as `[id, value]` pairs.
    #[serde(default)]
    pub typed: Vec<(String, String)>,
    /// Expected live values afterwards, as `[id, value]` pairs.
    #[serde(default)]
    pub expect_values: Vec<(String, String)>,
    #[serde(default)]
    pub max_created: Option<usize>,
}

impl MorphFixture {
    pub fn expected_markup(&self) -> &str {
        self.expected.as_deref().unwrap_or(&self.target)
    }
}

#[derive(Debug)]
pub enum FixtureError {
    Io { path: PathBuf, source: std::io::Error },
    Parse { path: PathBuf, source: toml::de::Error },
    Empty(PathBuf),
}

impl fmt::Display for FixtureError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FixtureError::Io { path, source } => write!(f, "reading {path:?}: {source}"),
            FixtureError::Parse { path, source } => write!(f, "parsing {path:?}: {source}"),
            FixtureError::Empty(path) => write!(f, "no fixtures found in {path:?}"),
        }
    }
}

impl std::error::Error for FixtureError {}

#[derive(Deserialize)]
struct FixtureFile {
    #[serde(rename = "case")]
    cases: Vec<MorphFixture>,
}

pub fn parse_morph_fixtures(content: &str, path: &Path) -> Result<Vec<MorphFixture>, FixtureError> {
    let file: FixtureFile = toml::from_str(content).map_err(|source| FixtureError::Parse {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(file.cases)
}

/// Load every `*.toml` file in `dir`, in file-name order.
pub fn load_morph_fixtures(dir: &Path) -> Result<Vec<MorphFixture>, FixtureError> {
    let io = |source| FixtureError::Io {
        path: dir.to_path_buf(),
        source,
    };
    let mut paths = fs::read_dir(dir)
        .map_err(io)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| p.extension().is_some_and(|ext| ext == "toml"))
        .collect::<Vec<_>>();
    paths.sort();

    let mut out = Vec::new();
    for path in paths {
        let content = fs::read_to_string(&path).map_err(|source| FixtureError::Io {
            path: path.clone(),
            source,
        })?;
        out.extend(parse_morph_fixtures(&content, &path)?);
    }
    if out.is_empty() {
        return Err(FixtureError::Empty(dir.to_path_buf()));
    }
    Ok(out)
}
