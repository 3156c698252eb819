//! Node definitions as seen by the graph host.
//!
//! Each node publishes a [`NodeSchema`] describing its input sockets and
//! outputs, and is executed with a set of named [`NodeValue`]s. Missing
//! optional inputs are filled from the schema defaults before execution.

pub mod save;
pub mod tts;

use std::collections::{BTreeMap, HashMap};

use serde::Serialize;
use serde_json::Value;

use crate::audio::AudioBuffer;
use crate::config::TtsConfig;
use crate::error::TtsError;
use crate::pipeline::PipelineBuilder;

pub use save::{OutputDescriptor, Quality, SaveAudioNode, SavedAudio};
pub use tts::{TextToSpeechNode, TtsState};

/// Menu category both nodes are listed under.
pub const CATEGORY: &str = "🧪AILab/🔊Audio";

/// A value carried by a socket.
#[derive(Debug, Clone, PartialEq)]
pub enum NodeValue {
    Text(String),
    Float(f64),
    Bool(bool),
    Audio(AudioBuffer),
}

impl NodeValue {
    fn from_default(value: &Value) -> Option<Self> {
        match value {
            Value::String(s) => Some(NodeValue::Text(s.clone())),
            Value::Bool(b) => Some(NodeValue::Bool(*b)),
            Value::Number(n) => n.as_f64().map(NodeValue::Float),
            _ => None,
        }
    }
}

/// Socket types, named the way the host names them.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SocketKind {
    String,
    Float,
    Boolean,
    Audio,
    /// Dropdown of fixed options; carried as text.
    Choice(Vec<String>),
}

#[derive(Debug, Clone, Serialize)]
pub struct InputSpec {
    pub name: String,
    pub kind: SocketKind,
    pub required: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub step: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tooltip: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub placeholder: Option<String>,
    pub multiline: bool,
}

impl InputSpec {
    fn new(name: &str, kind: SocketKind) -> Self {
        Self {
            name: name.to_string(),
            kind,
            required: true,
            default: None,
            min: None,
            max: None,
            step: None,
            tooltip: None,
            placeholder: None,
            multiline: false,
        }
    }

    pub fn text(name: &str, default: &str) -> Self {
        let mut spec = Self::new(name, SocketKind::String);
        spec.default = Some(Value::from(default));
        spec
    }

    pub fn float(name: &str, default: f64, min: f64, max: f64, step: f64) -> Self {
        let mut spec = Self::new(name, SocketKind::Float);
        spec.default = Some(Value::from(default));
        spec.min = Some(min);
        spec.max = Some(max);
        spec.step = Some(step);
        spec
    }

    pub fn boolean(name: &str, default: bool) -> Self {
        let mut spec = Self::new(name, SocketKind::Boolean);
        spec.default = Some(Value::from(default));
        spec
    }

    pub fn audio(name: &str) -> Self {
        Self::new(name, SocketKind::Audio)
    }

    pub fn choice(name: &str, options: Vec<String>, default: &str) -> Self {
        let mut spec = Self::new(name, SocketKind::Choice(options));
        spec.default = Some(Value::from(default));
        spec
    }

    pub fn optional(mut self) -> Self {
        self.required = false;
        self
    }

    pub fn multiline(mut self) -> Self {
        self.multiline = true;
        self
    }

    pub fn tooltip(mut self, tooltip: &str) -> Self {
        self.tooltip = Some(tooltip.to_string());
        self
    }

    pub fn placeholder(mut self, placeholder: &str) -> Self {
        self.placeholder = Some(placeholder.to_string());
        self
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct NodeSchema {
    pub class_name: String,
    pub display_name: String,
    pub category: String,
    pub inputs: Vec<InputSpec>,
    pub return_types: Vec<SocketKind>,
    pub return_names: Vec<String>,
    /// Output nodes are executed even when nothing consumes their results.
    pub output_node: bool,
}

/// Named input values for one execution.
#[derive(Debug, Clone, Default)]
pub struct NodeInputs {
    values: HashMap<String, NodeValue>,
}

impl NodeInputs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: &str, value: NodeValue) -> Self {
        self.values.insert(name.to_string(), value);
        self
    }

    /// Fill absent inputs from the schema defaults.
    pub fn resolve(mut self, schema: &NodeSchema) -> Self {
        for input in &schema.inputs {
            if self.values.contains_key(&input.name) {
                continue;
            }
            if let Some(value) = input.default.as_ref().and_then(NodeValue::from_default) {
                self.values.insert(input.name.clone(), value);
            }
        }
        self
    }

    fn get(&self, name: &str) -> Result<&NodeValue, TtsError> {
        self.values
            .get(name)
            .ok_or_else(|| TtsError::InvalidInput(format!("missing input '{name}'")))
    }

    pub fn text(&self, name: &str) -> Result<&str, TtsError> {
        match self.get(name)? {
            NodeValue::Text(s) => Ok(s),
            other => Err(type_mismatch(name, "STRING", other)),
        }
    }

    pub fn float(&self, name: &str) -> Result<f64, TtsError> {
        match self.get(name)? {
            NodeValue::Float(f) => Ok(*f),
            other => Err(type_mismatch(name, "FLOAT", other)),
        }
    }

    pub fn boolean(&self, name: &str) -> Result<bool, TtsError> {
        match self.get(name)? {
            NodeValue::Bool(b) => Ok(*b),
            other => Err(type_mismatch(name, "BOOLEAN", other)),
        }
    }

    pub fn audio(&self, name: &str) -> Result<&AudioBuffer, TtsError> {
        match self.get(name)? {
            NodeValue::Audio(a) => Ok(a),
            other => Err(type_mismatch(name, "AUDIO", other)),
        }
    }
}

fn type_mismatch(name: &str, expected: &str, got: &NodeValue) -> TtsError {
    let got = match got {
        NodeValue::Text(_) => "STRING",
        NodeValue::Float(_) => "FLOAT",
        NodeValue::Bool(_) => "BOOLEAN",
        NodeValue::Audio(_) => "AUDIO",
    };
    TtsError::InvalidInput(format!("input '{name}' expects {expected}, got {got}"))
}

/// A node the host can instantiate and execute.
pub trait Node {
    fn schema(&self) -> NodeSchema;

    /// Run the node once. `inputs` have already been resolved against the
    /// schema defaults.
    fn execute(&mut self, inputs: &NodeInputs) -> Result<Vec<NodeValue>, TtsError>;

    /// Payload for the host's UI channel after the last execution.
    fn ui_output(&self) -> Option<Value> {
        None
    }
}

pub type NodeFactory = Box<dyn Fn() -> Result<Box<dyn Node>, TtsError>>;

struct Registration {
    display_name: String,
    factory: NodeFactory,
}

/// Class name → node factory, in the shape the host registers plugins.
#[derive(Default)]
pub struct NodeRegistry {
    nodes: BTreeMap<String, Registration>,
}

impl NodeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<F>(&mut self, class_name: &str, display_name: &str, factory: F)
    where
        F: Fn() -> Result<Box<dyn Node>, TtsError> + 'static,
    {
        if self.nodes.contains_key(class_name) {
            log::warn!("Replacing node registration for '{class_name}'");
        }
        self.nodes.insert(
            class_name.to_string(),
            Registration {
                display_name: display_name.to_string(),
                factory: Box::new(factory),
            },
        );
    }

    pub fn class_names(&self) -> Vec<&str> {
        self.nodes.keys().map(String::as_str).collect()
    }

    pub fn display_name(&self, class_name: &str) -> Option<&str> {
        self.nodes.get(class_name).map(|r| r.display_name.as_str())
    }

    pub fn create(&self, class_name: &str) -> Result<Box<dyn Node>, TtsError> {
        let registration = self
            .nodes
            .get(class_name)
            .ok_or_else(|| TtsError::InvalidInput(format!("unknown node class '{class_name}'")))?;
        (registration.factory)()
    }

    /// Create, resolve defaults and execute in one call.
    pub fn execute(
        &self,
        class_name: &str,
        inputs: NodeInputs,
    ) -> Result<Vec<NodeValue>, TtsError> {
        let mut node = self.create(class_name)?;
        let inputs = inputs.resolve(&node.schema());
        node.execute(&inputs)
    }
}

/// Register both nodes, building pipelines with `make_builder`.
pub fn register_nodes_with_backend<F>(registry: &mut NodeRegistry, config: &TtsConfig, make_builder: F)
where
    F: Fn(&TtsConfig) -> Box<dyn PipelineBuilder> + 'static,
{
    let tts_config = config.clone();
    registry.register(
        TextToSpeechNode::CLASS_NAME,
        TextToSpeechNode::DISPLAY_NAME,
        move || {
            let builder = make_builder(&tts_config);
            Ok(Box::new(TextToSpeechNode::from_config(&tts_config, builder)) as Box<dyn Node>)
        },
    );

    let save_config = config.clone();
    registry.register(
        SaveAudioNode::CLASS_NAME,
        SaveAudioNode::DISPLAY_NAME,
        move || Ok(Box::new(SaveAudioNode::new(save_config.output_root.clone())) as Box<dyn Node>),
    );
}

/// Register both nodes backed by the ONNX Kokoro engine. The ONNX export is
/// added to the model files unless `config` already lists one.
#[cfg(feature = "kokoro")]
pub fn register_nodes(registry: &mut NodeRegistry, config: &TtsConfig) {
    let config = crate::engines::kokoro::with_onnx_export(config);
    register_nodes_with_backend(registry, &config, |config| {
        Box::new(crate::engines::kokoro::KokoroPipelineBuilder::from_config(config))
    });
}
