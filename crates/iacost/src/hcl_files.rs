//! collection of parsed hcl files ([Body] and path to source file)
//!
//! [HclFiles] tracks
//! - the source path
//! - the root blocks
//! - the root attributes
//! and defines a numeric index for each. Once added those indices are stable (removal is not possible)
//!
//! It is used for `.tf` files of a configuration root, `.tfvars` overlay files (which are bodies made of root
//! attributes only) and nested-tool configuration files.
use hcl_edit::structure::{Attribute, Block, Body, Structure};
use std::path::{Path, PathBuf};

/// Extension of imperative configuration files
pub const CONFIG_FILE_SUFFIX: &str = ".tf";

#[derive(Default, Debug)]
pub struct HclFiles {
    sources: Vec<Source>,
    root_attributes: Vec<(usize, Attribute)>,
    root_blocks: Vec<(usize, Block)>,
}

impl HclFiles {
    /// Inserts and indexes an hcl document
    pub fn insert(&mut self, document: Body, path: impl Into<Option<PathBuf>>) {
        let source_index = self.sources.len();
        self.sources.push(path.into());

        for structure in document.into_iter() {
            match structure {
                Structure::Block(block) => self.root_blocks.push((source_index, block)),
                Structure::Attribute(attribute) => {
                    self.root_attributes.push((source_index, attribute))
                }
            }
        }
    }

    pub fn attributes(&self) -> impl Iterator<Item = SourceAttribute> {
        self.root_attributes
            .iter()
            .enumerate()
            .map(|(index, (source_index, attribute))| {
                (index, &self.sources[*source_index], attribute)
            })
    }

    pub fn blocks(&self) -> impl Iterator<Item = SourceBlock> {
        self.root_blocks
            .iter()
            .enumerate()
            .map(|(index, (source_index, block))| (index, &self.sources[*source_index], block))
    }

    /// Root blocks with the given identifier, e.g. `resource` or `module`
    pub fn blocks_named<'a>(&'a self, ident: &'a str) -> impl Iterator<Item = &'a Block> + 'a {
        self.blocks()
            .map(|(_, _, block)| block)
            .filter(move |block| block.ident.value().as_str() == ident)
    }

    /// All root structures as one [hcl::Body] for evaluation (attributes first, then blocks)
    pub fn to_body(&self) -> hcl::Body {
        let attributes = self
            .attributes()
            .map(|(_, _, attribute)| hcl::Structure::Attribute(attribute.clone().into()));
        let blocks = self
            .blocks()
            .map(|(_, _, block)| hcl::Structure::Block(block.clone().into()));

        attributes.chain(blocks).collect()
    }
}

impl HclFiles {
    pub fn load_file(&mut self, file_path: &Path) -> Result<(), LoadError> {
        tracing::debug!(path=%file_path.display(), "loading hcl file");

        let file_contents = std::fs::read_to_string(file_path)?;
        let body = hcl_edit::parser::parse_body(&file_contents).map_err(|source| {
            LoadError::HclParseFailed {
                path: file_path.to_path_buf(),
                source,
            }
        })?;

        self.insert(body, Some(file_path.to_path_buf()));
        Ok(())
    }

    /// Load every `*.tf` file directly inside `dir_path` (in file name order)
    pub fn load_directory(&mut self, dir_path: &Path) -> Result<(), LoadError> {
        let files = config_files_in(dir_path)?;
        if files.is_empty() {
            return Err(LoadError::NoFilesFound(dir_path.to_path_buf()));
        }

        for file_path in files {
            self.load_file(&file_path)?;
        }

        Ok(())
    }
}

/// Paths of all `*.tf` files directly inside `dir_path`, sorted
pub fn config_files_in(dir_path: &Path) -> Result<Vec<PathBuf>, std::io::Error> {
    let mut files = vec![];

    for dir_entry in std::fs::read_dir(dir_path)? {
        let dir_entry = dir_entry?;
        if !dir_entry.file_type()?.is_file() {
            continue;
        }

        let is_config_file = dir_entry
            .file_name()
            .to_string_lossy()
            .ends_with(CONFIG_FILE_SUFFIX);
        if is_config_file {
            files.push(dir_entry.path());
        }
    }

    files.sort();
    Ok(files)
}

#[derive(thiserror::Error, Debug)]
pub enum LoadError {
    #[error("No configuration files found in directory {0}")]
    NoFilesFound(PathBuf),
    #[error("IO error")]
    IoError(#[from] std::io::Error),
    #[error("Unable to parse hcl file {path}")]
    HclParseFailed {
        path: PathBuf,
        #[source]
        source: hcl_edit::parser::Error,
    },
}

impl From<Body> for HclFiles {
    fn from(value: Body) -> Self {
        let mut files = HclFiles::default();
        files.insert(value, None);
        files
    }
}

/// Utility macro to create [HclFiles]
///
/// Create from a single document
/// ```
/// # use iacost::hcl_files;
/// hcl_files!(r#"resource "aws_instance" "web" {}"#);
/// ```
///
/// Create from multiple documents (path required)
/// ```
/// # use iacost::hcl_files;
/// hcl_files! {
///   "main.tf" => r#"variable "size" {}"#,
///   "vm.tf" => r#"resource "azurerm_linux_virtual_machine" "vm" {}"#
/// };
/// ```
///
/// # Panic
/// Panics on invalid input
///
/// ```should_panic
/// # use iacost::hcl_files;
/// hcl_files!("not = valid = hcl");
/// ```
#[macro_export]
macro_rules! hcl_files {
    // single document without source
    { $expr:expr } => {
        $crate::hcl_files::HclFiles::from(hcl_edit::parser::parse_body($expr).expect("body must parse"))
    };
    // multi document with sources
    { $($source:expr => $expr:expr),+ } => {{
        let mut files = $crate::hcl_files::HclFiles::default();
        $(
            files.insert(hcl_edit::parser::parse_body($expr).expect("body must parse"), Some(std::path::PathBuf::from($source)));
        )+

        files
    }};
}

pub type Source = Option<PathBuf>;
pub type SourceAttribute<'a> = (usize, &'a Source, &'a Attribute);
pub type SourceBlock<'a> = (usize, &'a Source, &'a Block);

#[cfg(test)]
pub(crate) mod test {
    #[test]
    fn iterators() {
        let hcl_files = hcl_files! {r#"
        region = "westeurope"
        resource "azurerm_linux_virtual_machine" "vm" {}
        module "network" { source = "./network" }
        size = "Standard_B2s"
        "#};

        assert_eq!(hcl_files.attributes().count(), 2);
        assert_eq!(hcl_files.blocks().count(), 2);
        assert_eq!(hcl_files.blocks_named("module").count(), 1);
    }

    #[test]
    fn body_keeps_source_order() {
        let hcl_files = hcl_files! {
            "a.tf" => r#"resource "azurerm_managed_disk" "a" {}"#,
            "b.tf" => r#"size = "large""#
        };

        let body = hcl_files.to_body();
        let keys: Vec<_> = body.attributes().map(|attribute| attribute.key()).collect();
        assert_eq!(keys, vec!["size"]);
        assert_eq!(body.blocks().count(), 1);
        assert_eq!(body.into_iter().count(), 2);
    }
}
