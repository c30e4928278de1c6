//! Notebook document model (nbformat v3).
//!
//! Only the fields execution touches are modelled; every other key is kept
//! in an `extra` map so a read-modify-write cycle preserves it.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{FormatError, FormatResult};
use crate::output::CellOutput;

/// The only major format version with worksheets.
pub const NBFORMAT: u32 = 3;

/// Text stored either as one string or as a list of lines.
///
/// The shape that was read is the shape written back.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MultilineString {
    Lines(Vec<String>),
    Text(String),
}

impl MultilineString {
    /// The full text, with lines joined back together.
    pub fn to_text(&self) -> String {
        match self {
            MultilineString::Lines(lines) => lines.concat(),
            MultilineString::Text(text) => text.clone(),
        }
    }
}

impl Default for MultilineString {
    fn default() -> Self {
        MultilineString::Text(String::new())
    }
}

impl From<String> for MultilineString {
    fn from(text: String) -> Self {
        MultilineString::Text(text)
    }
}

impl From<&str> for MultilineString {
    fn from(text: &str) -> Self {
        MultilineString::Text(text.to_string())
    }
}

/// A notebook document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notebook {
    /// Major format version (must be 3)
    pub nbformat: u32,

    /// Minor format version
    #[serde(default)]
    pub nbformat_minor: u32,

    /// Worksheets in document order
    #[serde(default)]
    pub worksheets: Vec<Worksheet>,

    /// Notebook metadata and any other top-level keys
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// A worksheet: an ordered list of cells.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Worksheet {
    #[serde(default)]
    pub cells: Vec<Cell>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// A notebook cell.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Cell {
    /// Cell type (`code`, `markdown`, `heading`, `raw`)
    pub cell_type: String,

    /// Code cell input
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input: Option<MultilineString>,

    /// Code cell outputs
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub outputs: Option<Vec<CellOutput>>,

    /// Execution counter of the last run
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prompt_number: Option<i64>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Position of a cell inside a notebook.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CellRef {
    pub worksheet: usize,
    pub cell: usize,
}

impl Cell {
    /// Create a code cell with the given input and no outputs.
    pub fn code(input: impl Into<MultilineString>) -> Self {
        Self {
            cell_type: "code".to_string(),
            input: Some(input.into()),
            outputs: Some(Vec::new()),
            prompt_number: None,
            extra: Map::new(),
        }
    }

    /// Create a markdown cell.
    pub fn markdown(source: &str) -> Self {
        let mut extra = Map::new();
        extra.insert("source".to_string(), Value::String(source.to_string()));
        Self {
            cell_type: "markdown".to_string(),
            input: None,
            outputs: None,
            prompt_number: None,
            extra,
        }
    }

    pub fn is_code(&self) -> bool {
        self.cell_type == "code"
    }

    /// Input text as submitted to the kernel.
    pub fn input_text(&self) -> String {
        self.input.as_ref().map(MultilineString::to_text).unwrap_or_default()
    }

    pub fn outputs(&self) -> &[CellOutput] {
        self.outputs.as_deref().unwrap_or_default()
    }

    /// Append an output after any existing ones.
    pub fn push_output(&mut self, output: CellOutput) {
        self.outputs.get_or_insert_with(Vec::new).push(output);
    }

    /// Drop all outputs and the execution counter.
    pub fn clear_outputs(&mut self) {
        self.outputs = Some(Vec::new());
        self.prompt_number = None;
    }
}

impl Notebook {
    /// Create an empty notebook with a single empty worksheet.
    pub fn new() -> Self {
        let mut extra = Map::new();
        extra.insert("metadata".to_string(), Value::Object(Map::new()));
        Self {
            nbformat: NBFORMAT,
            nbformat_minor: 0,
            worksheets: vec![Worksheet::default()],
            extra,
        }
    }

    /// Parse a notebook from JSON text.
    pub fn from_json_str(json: &str) -> FormatResult<Self> {
        let notebook: Self = serde_json::from_str(json)?;
        if notebook.nbformat != NBFORMAT {
            return Err(FormatError::InvalidNotebook(format!(
                "unsupported nbformat {} (expected {})",
                notebook.nbformat, NBFORMAT
            )));
        }
        Ok(notebook)
    }

    /// Serialize to pretty JSON with a trailing newline.
    pub fn to_json_string(&self) -> FormatResult<String> {
        let mut buf = Vec::new();
        let formatter = serde_json::ser::PrettyFormatter::with_indent(b" ");
        let mut serializer = serde_json::Serializer::with_formatter(&mut buf, formatter);
        self.serialize(&mut serializer)?;
        buf.push(b'\n');
        String::from_utf8(buf).map_err(|e| FormatError::InvalidNotebook(e.to_string()))
    }

    /// Read a notebook from a file.
    pub fn read_from_file(path: impl AsRef<Path>) -> FormatResult<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|e| FormatError::ReadError {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        Self::from_json_str(&content)
    }

    /// Write the notebook to a file, replacing its previous contents.
    pub fn write_to_file(&self, path: impl AsRef<Path>) -> FormatResult<()> {
        let path = path.as_ref();
        let json = self.to_json_string()?;
        fs::write(path, json).map_err(|e| FormatError::WriteError {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        Ok(())
    }

    /// Iterate over every cell in document order.
    pub fn cells(&self) -> impl Iterator<Item = &Cell> {
        self.worksheets.iter().flat_map(|ws| ws.cells.iter())
    }

    /// Iterate over code cells in document order.
    pub fn code_cells(&self) -> impl Iterator<Item = &Cell> {
        self.cells().filter(|cell| cell.is_code())
    }

    pub fn code_cells_mut(&mut self) -> impl Iterator<Item = &mut Cell> {
        self.worksheets
            .iter_mut()
            .flat_map(|ws| ws.cells.iter_mut())
            .filter(|cell| cell.is_code())
    }

    /// Positions of all code cells in document order.
    pub fn code_cell_refs(&self) -> Vec<CellRef> {
        self.worksheets
            .iter()
            .enumerate()
            .flat_map(|(worksheet, ws)| {
                ws.cells
                    .iter()
                    .enumerate()
                    .filter(|(_, cell)| cell.is_code())
                    .map(move |(cell, _)| CellRef { worksheet, cell })
            })
            .collect()
    }

    pub fn cell(&self, at: CellRef) -> Option<&Cell> {
        self.worksheets.get(at.worksheet)?.cells.get(at.cell)
    }

    pub fn cell_mut(&mut self, at: CellRef) -> Option<&mut Cell> {
        self.worksheets.get_mut(at.worksheet)?.cells.get_mut(at.cell)
    }

    /// Clear outputs and execution counters of every code cell.
    pub fn clear_outputs(&mut self) {
        for cell in self.code_cells_mut() {
            cell.clear_outputs();
        }
    }
}

impl Default for Notebook {
    fn default() -> Self {
        Self::new()
    }
}
