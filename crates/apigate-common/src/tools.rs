//! Tool calling types for chat completion requests.

use serde::{Deserialize, Serialize};
use typed_builder::TypedBuilder;

/// A function the model may call, described with a JSON Schema.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Function {
    /// Function name, as the model will reference it.
    pub name: String,
    /// Human-readable description shown to the model.
    pub description: String,
    /// JSON Schema of the function parameters.
    pub parameters: serde_json::Value,
}

/// A tool definition in the chat-completions format.
///
/// Currently only `"function"` tools exist; the `r#type` field defaults
/// accordingly.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, TypedBuilder)]
pub struct Tool {
    /// The tool type, always `"function"` today.
    #[builder(default = "function".to_string())]
    #[serde(rename = "type", default = "default_tool_type")]
    pub r#type: String,
    /// The function definition.
    pub function: Function,
}

fn default_tool_type() -> String {
    "function".to_string()
}

impl From<Function> for Tool {
    fn from(function: Function) -> Self {
        Self {
            r#type: "function".to_string(),
            function,
        }
    }
}

/// A concrete function invocation requested by the model.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FunctionCall {
    /// Name of the function to call.
    pub name: String,
    /// Arguments as a JSON-serialized string, exactly as the API sent them.
    ///
    /// Not validated here; parse and validate at execution time.
    pub arguments: String,
}

/// A tool call requested by an assistant message.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ToolCall {
    /// Unique identifier for this call, echoed back by tool messages.
    pub id: String,
    /// Call type, `"function"` today.
    #[serde(rename = "type", default = "default_tool_type")]
    pub call_type: String,
    /// The function and its arguments.
    pub function: FunctionCall,
}

impl ToolCall {
    /// Creates a function tool call with a generated-looking id left to the
    /// caller; mostly useful in tests and examples.
    pub fn new(name: impl Into<String>, arguments: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            id: format!("call_{name}"),
            call_type: "function".to_string(),
            function: FunctionCall {
                name,
                arguments: arguments.into(),
            },
        }
    }

    /// Merges streaming tool-call deltas into the accumulated calls.
    ///
    /// Streamed tool calls arrive split across chunks: the first delta for a
    /// call carries its id and name, later deltas append argument fragments.
    #[must_use]
    pub fn merge_deltas(mut accumulated: Vec<Self>, deltas: &[Self]) -> Vec<Self> {
        for delta in deltas {
            if let Some(existing) = accumulated.iter_mut().find(|tc| tc.id == delta.id) {
                existing
                    .function
                    .arguments
                    .push_str(&delta.function.arguments);
            } else {
                accumulated.push(delta.clone());
            }
        }

        accumulated
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    #![allow(clippy::expect_used)]

    use super::*;

    #[test]
    fn test_tool_from_function() {
        let tool = Tool::from(Function {
            name: "get_weather".to_string(),
            description: "Get the weather".to_string(),
            parameters: serde_json::json!({"type": "object", "properties": {}}),
        });
        assert_eq!(tool.r#type, "function");
        assert_eq!(tool.function.name, "get_weather");
    }

    #[test]
    fn test_tool_type_defaults_on_deserialize() {
        let json = r#"{"function":{"name":"f","description":"d","parameters":{}}}"#;
        let tool: Tool = serde_json::from_str(json).unwrap();
        assert_eq!(tool.r#type, "function");
    }

    #[test]
    fn test_merge_deltas_appends_arguments() {
        let deltas = [
            ToolCall {
                id: "call_123".to_string(),
                call_type: "function".to_string(),
                function: FunctionCall {
                    name: "search".to_string(),
                    arguments: r#"{"query":"#.to_string(),
                },
            },
            ToolCall {
                id: "call_123".to_string(),
                call_type: "function".to_string(),
                function: FunctionCall {
                    name: String::new(),
                    arguments: r#""rust"}"#.to_string(),
                },
            },
        ];

        let mut calls = Vec::new();
        for delta in &deltas {
            calls = ToolCall::merge_deltas(calls, std::slice::from_ref(delta));
        }

        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].function.arguments, r#"{"query":"rust"}"#);
        let parsed: serde_json::Value = serde_json::from_str(&calls[0].function.arguments)
            .expect("merged arguments should be valid JSON");
        assert_eq!(parsed["query"], "rust");
    }

    #[test]
    fn test_merge_deltas_distinct_ids() {
        let a = ToolCall::new("first", "{}");
        let b = ToolCall::new("second", "{}");
        let merged = ToolCall::merge_deltas(vec![a], &[b]);
        assert_eq!(merged.len(), 2);
    }
}
