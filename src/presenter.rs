//! Narrow boundary between the resolution core and whatever renders it.
//!
//! The core never formats text. It emits message keys with positional arguments
//! and a colour hint, and asks for a line of input when a human player has to
//! choose something.

use std::collections::VecDeque;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Positional argument of a message.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(untagged)]
pub enum Arg {
    Int(i64),
    Text(String),
}

impl fmt::Display for Arg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Arg::Int(value) => write!(f, "{value}"),
            Arg::Text(value) => f.write_str(value),
        }
    }
}

impl From<i32> for Arg {
    fn from(value: i32) -> Self {
        Arg::Int(value.into())
    }
}

impl From<u32> for Arg {
    fn from(value: u32) -> Self {
        Arg::Int(value.into())
    }
}

impl From<usize> for Arg {
    fn from(value: usize) -> Self {
        Arg::Int(value as i64)
    }
}

impl From<&str> for Arg {
    fn from(value: &str) -> Self {
        Arg::Text(value.to_owned())
    }
}

impl From<String> for Arg {
    fn from(value: String) -> Self {
        Arg::Text(value)
    }
}

/// Colour hint. Renderers are free to ignore it.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum Style {
    #[default]
    Plain,
    Red,
    Cyan,
    Yellow,
    Green,
    Magenta,
    White,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Message {
    pub key: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub args: Vec<Arg>,
    #[serde(default)]
    pub style: Style,
}

impl Message {
    pub fn new(key: impl Into<String>, args: Vec<Arg>) -> Self {
        Self {
            key: key.into(),
            args,
            style: Style::Plain,
        }
    }

    pub fn styled(mut self, style: Style) -> Self {
        self.style = style;
        self
    }

    pub fn emit_to(&self, presenter: &mut dyn Presenter) {
        presenter.emit(&self.key, &self.args, self.style);
    }
}

pub trait Presenter {
    /// Fire-and-forget output.
    fn emit(&mut self, key: &str, args: &[Arg], style: Style);

    /// Blocking line input for human players. The returned line has its trailing
    /// newline stripped but is otherwise raw.
    fn read_line(&mut self, key: &str, args: &[Arg]) -> String;
}

/// In-memory presenter: keeps a transcript and answers prompts from a queue.
///
/// Once the queue runs dry every prompt is answered with an empty line, which the
/// selection handlers treat as "accept the suggestion" or "cancel".
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct RecordingPresenter {
    pub messages: Vec<Message>,
    pub prompts: Vec<Message>,
    #[serde(default)]
    inputs: VecDeque<String>,
}

impl RecordingPresenter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_inputs<I, S>(inputs: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            inputs: inputs.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }

    pub fn push_input(&mut self, line: impl Into<String>) {
        self.inputs.push_back(line.into());
    }

    pub fn pending_inputs(&self) -> usize {
        self.inputs.len()
    }

    pub fn drain_messages(&mut self) -> Vec<Message> {
        std::mem::take(&mut self.messages)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.messages.iter().map(|message| message.key.as_str())
    }

    pub fn contains(&self, key: &str) -> bool {
        self.keys().any(|candidate| candidate == key)
    }

    pub fn count(&self, key: &str) -> usize {
        self.keys().filter(|candidate| *candidate == key).count()
    }
}

impl Presenter for RecordingPresenter {
    fn emit(&mut self, key: &str, args: &[Arg], style: Style) {
        self.messages.push(Message {
            key: key.to_owned(),
            args: args.to_vec(),
            style,
        });
    }

    fn read_line(&mut self, key: &str, args: &[Arg]) -> String {
        self.prompts.push(Message::new(key, args.to_vec()));
        self.inputs.pop_front().unwrap_or_default()
    }
}
