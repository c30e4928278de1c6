//! Cell output records.
//!
//! Outputs are stored the way nbformat v3 lays them out: the rich
//! representations of a display payload are flat attributes named by their
//! short label (`png`, `html`, ...) rather than keyed by media type.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::notebook::MultilineString;

/// A single output attached to a code cell.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "output_type")]
pub enum CellOutput {
    /// Text written to a named stream (stdout/stderr).
    #[serde(rename = "stream")]
    Stream(StreamOutput),

    /// Rich data published while the cell ran.
    #[serde(rename = "display_data")]
    DisplayData(DisplayOutput),

    /// The value of the cell's final expression.
    #[serde(rename = "pyout")]
    Pyout(DisplayOutput),

    /// An uncaught error raised by the cell.
    #[serde(rename = "pyerr")]
    Pyerr(ErrorOutput),
}

impl CellOutput {
    /// The `output_type` tag used on disk.
    pub fn output_type(&self) -> &'static str {
        match self {
            CellOutput::Stream(_) => "stream",
            CellOutput::DisplayData(_) => "display_data",
            CellOutput::Pyout(_) => "pyout",
            CellOutput::Pyerr(_) => "pyerr",
        }
    }

    /// Execution counter recorded on the output, if any.
    pub fn prompt_number(&self) -> Option<i64> {
        match self {
            CellOutput::Stream(out) => out.prompt_number,
            CellOutput::DisplayData(out) | CellOutput::Pyout(out) => out.prompt_number,
            CellOutput::Pyerr(out) => out.prompt_number,
        }
    }

    /// Record an execution counter on the output.
    pub fn set_prompt_number(&mut self, prompt_number: i64) {
        let slot = match self {
            CellOutput::Stream(out) => &mut out.prompt_number,
            CellOutput::DisplayData(out) | CellOutput::Pyout(out) => &mut out.prompt_number,
            CellOutput::Pyerr(out) => &mut out.prompt_number,
        };
        *slot = Some(prompt_number);
    }
}

/// Stream output (`output_type: "stream"`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamOutput {
    /// Stream name, e.g. `stdout` or `stderr`.
    pub stream: String,

    /// Text chunk written to the stream.
    pub text: MultilineString,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prompt_number: Option<i64>,
}

/// The attribute a display payload is stored under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DisplayField {
    Png,
    Jpeg,
    Text,
    Html,
    Latex,
}

/// Display or execution-result output.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DisplayOutput {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prompt_number: Option<i64>,

    /// Base64 PNG image
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub png: Option<MultilineString>,

    /// Base64 JPEG image
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jpeg: Option<MultilineString>,

    /// Plain text
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<MultilineString>,

    /// HTML (also used for javascript payloads)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub html: Option<MultilineString>,

    /// LaTeX
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub latex: Option<MultilineString>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Map<String, Value>>,
}

impl DisplayOutput {
    /// Set a representation, replacing any value already stored in that field.
    pub fn set(&mut self, field: DisplayField, value: MultilineString) {
        let slot = match field {
            DisplayField::Png => &mut self.png,
            DisplayField::Jpeg => &mut self.jpeg,
            DisplayField::Text => &mut self.text,
            DisplayField::Html => &mut self.html,
            DisplayField::Latex => &mut self.latex,
        };
        *slot = Some(value);
    }

    /// Get a representation by field.
    pub fn get(&self, field: DisplayField) -> Option<&MultilineString> {
        match field {
            DisplayField::Png => self.png.as_ref(),
            DisplayField::Jpeg => self.jpeg.as_ref(),
            DisplayField::Text => self.text.as_ref(),
            DisplayField::Html => self.html.as_ref(),
            DisplayField::Latex => self.latex.as_ref(),
        }
    }
}

/// Error output (`output_type: "pyerr"`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorOutput {
    pub ename: String,
    pub evalue: String,
    #[serde(default)]
    pub traceback: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prompt_number: Option<i64>,
}
