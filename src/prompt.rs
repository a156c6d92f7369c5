use std::fmt::Write as _;

use crate::registry::ToolSpec;

/// Assemble the system prompt sent with every model invocation: the caller's
/// base text followed by a tool listing and a parameter digest extracted from
/// each tool's JSON Schema. Prompt content itself is caller-supplied; this
/// only renders structure.
pub fn build_system_prompt(base: &str, tools: &[ToolSpec]) -> String {
    let mut out = String::new();
    let base = base.trim();
    if !base.is_empty() {
        out.push_str(base);
    }
    if tools.is_empty() {
        return out;
    }

    if !out.is_empty() {
        out.push_str("\n\n");
    }
    out.push_str("AVAILABLE TOOLS:\n");
    for tool in tools {
        let _ = writeln!(out, "- {}: {}", tool.name, tool.description);
    }

    let mut details = String::new();
    for tool in tools {
        let Some(props) = tool
            .parameters
            .get("properties")
            .and_then(|p| p.as_object())
        else {
            continue;
        };
        if props.is_empty() {
            continue;
        }
        let required: Vec<&str> = tool
            .parameters
            .get("required")
            .and_then(|r| r.as_array())
            .map(|arr| arr.iter().filter_map(|v| v.as_str()).collect())
            .unwrap_or_default();

        let _ = writeln!(details, "\nTool: {}\nParameters:", tool.name);
        for (name, prop) in props {
            let type_info = prop.get("type").and_then(|t| t.as_str()).unwrap_or("any");
            let desc = prop
                .get("description")
                .and_then(|d| d.as_str())
                .unwrap_or("");
            let mark = if required.contains(&name.as_str()) {
                "required"
            } else {
                "optional"
            };
            let _ = writeln!(details, "  - {name} ({type_info}, {mark}): {desc}");
        }
    }
    if !details.is_empty() {
        out.push_str("\nTOOL DETAILS:\n");
        out.push_str(&details);
    }
    out
}
