//! Builtin skill catalogue.
//!
//! Every builtin is a definition plus a declarative step graph; nothing
//! here executes by itself.

use serde_json::json;

use crate::graph::{SkillGraph, SkillStep};
use crate::types::{ParamType, RiskLevel, SkillDefinition, SkillParam};

fn param(
    name: &str,
    param_type: ParamType,
    description: &str,
    required: bool,
    default: Option<serde_json::Value>,
) -> SkillParam {
    SkillParam {
        name: name.into(),
        param_type,
        description: description.into(),
        required,
        default,
    }
}

fn definition(
    id: &str,
    name: &str,
    description: &str,
    category: &str,
    parameters: Vec<SkillParam>,
    output_schema: serde_json::Value,
    required_tools: Vec<&str>,
    risk_level: RiskLevel,
    max_execution_time_seconds: u64,
) -> SkillDefinition {
    SkillDefinition {
        id: id.into(),
        name: name.into(),
        version: "1.0.0".into(),
        description: description.into(),
        category: category.into(),
        parameters,
        output_schema,
        required_tools: required_tools.into_iter().map(String::from).collect(),
        risk_level,
        max_execution_time_seconds,
        max_iterations: 10,
        enabled: true,
        is_builtin: true,
        author: "hyperagent".into(),
    }
}

/// All builtin skills with their graphs.
pub fn builtin_skills() -> Vec<(SkillDefinition, SkillGraph)> {
    vec![
        web_research(),
        code_generation(),
        data_viz(),
        image_generation(),
        simple_writing(),
    ]
}

/// Search the web, then synthesize a sourced summary.
fn web_research() -> (SkillDefinition, SkillGraph) {
    let def = definition(
        "web_research",
        "Web Research",
        "Search the web for a topic and synthesize findings with sources.",
        "research",
        vec![
            param("query", ParamType::String, "Research question", true, None),
            param(
                "max_results",
                ParamType::Number,
                "Maximum search results to read",
                false,
                Some(json!(5)),
            ),
        ],
        json!({
            "type": "object",
            "properties": {
                "summary": {"type": "string"},
                "sources": {"type": "array"}
            }
        }),
        vec!["web_search"],
        RiskLevel::Low,
        180,
    );

    let graph = SkillGraph {
        steps: vec![
            SkillStep::ToolCall {
                id: "search".into(),
                tool: "web_search".into(),
                args: json!({
                    "query": "{params.query}",
                    "max_results": "{params.max_results}",
                    "search_depth": "advanced"
                }),
                save_as: "search".into(),
            },
            SkillStep::ModelCall {
                id: "synthesize".into(),
                prompt: "Synthesize the following search results into a concise, \
                         well-sourced summary of: {params.query}\n\nRESULTS:\n{steps.search}"
                    .into(),
                system: Some(
                    "You are a research assistant. Cite sources inline as [n].".into(),
                ),
                stream: true,
                save_as: "summary".into(),
            },
        ],
        output: json!({
            "summary": "{steps.summary}",
            "sources": "{steps.search.results}"
        }),
    };

    (def, graph)
}

/// Generate code, run it in the sandbox, return code plus output.
fn code_generation() -> (SkillDefinition, SkillGraph) {
    let def = definition(
        "code_generation",
        "Code Generation",
        "Write a program for the given task, execute it in a sandbox, and return code with its output.",
        "code",
        vec![
            param("task", ParamType::String, "What the code should do", true, None),
            param(
                "language",
                ParamType::String,
                "Target language",
                false,
                Some(json!("python")),
            ),
        ],
        json!({
            "type": "object",
            "properties": {
                "code": {"type": "string"},
                "stdout": {"type": "string"}
            }
        }),
        vec!["execute_code"],
        RiskLevel::High,
        300,
    );

    let graph = SkillGraph {
        steps: vec![
            SkillStep::ModelCall {
                id: "write_code".into(),
                prompt: "Write a {params.language} program that does the following. \
                         Respond with code only, no fences, no commentary.\n\nTASK: {params.task}"
                    .into(),
                system: None,
                stream: false,
                save_as: "code".into(),
            },
            SkillStep::ToolCall {
                id: "run".into(),
                tool: "execute_code".into(),
                args: json!({
                    "code": "{steps.code}",
                    "language": "{params.language}",
                    "capture_visualizations": false,
                    "timeout": 120
                }),
                save_as: "run".into(),
            },
        ],
        output: json!({
            "code": "{steps.code}",
            "stdout": "{steps.run.stdout}"
        }),
    };

    (def, graph)
}

/// Produce a chart from inline data via sandboxed plotting code.
fn data_viz() -> (SkillDefinition, SkillGraph) {
    let def = definition(
        "data_viz",
        "Data Visualization",
        "Generate a chart for the given data and return it as a base64 image.",
        "data",
        vec![
            param("data", ParamType::String, "Data to plot (CSV or JSON)", true, None),
            param(
                "chart_type",
                ParamType::String,
                "bar, line, scatter or pie",
                false,
                Some(json!("bar")),
            ),
            param("title", ParamType::String, "Chart title", false, Some(json!(""))),
        ],
        json!({
            "type": "object",
            "properties": {
                "code": {"type": "string"},
                "visualizations": {"type": "array"}
            }
        }),
        vec!["execute_code"],
        RiskLevel::High,
        240,
    );

    let graph = SkillGraph {
        steps: vec![
            SkillStep::ModelCall {
                id: "write_plot".into(),
                prompt: "Write python (matplotlib) that renders a {params.chart_type} chart \
                         titled '{params.title}' for this data, saving nothing to disk and \
                         calling plt.show() last. Respond with code only.\n\nDATA:\n{params.data}"
                    .into(),
                system: None,
                stream: false,
                save_as: "code".into(),
            },
            SkillStep::ToolCall {
                id: "render".into(),
                tool: "execute_code".into(),
                args: json!({
                    "code": "{steps.code}",
                    "language": "python",
                    "capture_visualizations": true,
                    "timeout": 120
                }),
                save_as: "render".into(),
            },
        ],
        output: json!({
            "code": "{steps.code}",
            "visualizations": "{steps.render.visualizations}"
        }),
    };

    (def, graph)
}

/// Refine a prompt, then call the image tool.
fn image_generation() -> (SkillDefinition, SkillGraph) {
    let def = definition(
        "image_generation",
        "Image Generation",
        "Refine an image prompt and generate images from it.",
        "creative",
        vec![
            param("prompt", ParamType::String, "What to draw", true, None),
            param(
                "size",
                ParamType::String,
                "Image size (e.g. 1024x1024)",
                false,
                Some(json!("1024x1024")),
            ),
            param("n", ParamType::Number, "Number of images", false, Some(json!(1))),
        ],
        json!({
            "type": "object",
            "properties": {
                "refined_prompt": {"type": "string"},
                "images": {"type": "array"}
            }
        }),
        vec!["generate_image"],
        RiskLevel::Low,
        180,
    );

    let graph = SkillGraph {
        steps: vec![
            SkillStep::ModelCall {
                id: "refine".into(),
                prompt: "Rewrite this image request as one vivid, concrete prompt for an \
                         image model. Respond with the prompt only.\n\nREQUEST: {params.prompt}"
                    .into(),
                system: None,
                stream: false,
                save_as: "refined".into(),
            },
            SkillStep::ToolCall {
                id: "generate".into(),
                tool: "generate_image".into(),
                args: json!({
                    "prompt": "{steps.refined}",
                    "size": "{params.size}",
                    "n": "{params.n}",
                    "quality": "standard"
                }),
                save_as: "images".into(),
            },
        ],
        output: json!({
            "refined_prompt": "{steps.refined}",
            "images": "{steps.images.images}"
        }),
    };

    (def, graph)
}

/// Outline then draft a piece of writing, streaming the draft.
fn simple_writing() -> (SkillDefinition, SkillGraph) {
    let def = definition(
        "simple_writing",
        "Simple Writing",
        "Produce a structured piece of writing on a topic.",
        "creative",
        vec![
            param("topic", ParamType::String, "What to write about", true, None),
            param(
                "style",
                ParamType::String,
                "Writing style",
                false,
                Some(json!("clear and concise")),
            ),
            param(
                "word_count",
                ParamType::Number,
                "Approximate length",
                false,
                Some(json!(500)),
            ),
        ],
        json!({
            "type": "object",
            "properties": {
                "outline": {"type": "string"},
                "text": {"type": "string"}
            }
        }),
        vec![],
        RiskLevel::Low,
        120,
    );

    let graph = SkillGraph {
        steps: vec![
            SkillStep::ModelCall {
                id: "outline".into(),
                prompt: "Write a short outline (4-6 bullets) for a {params.word_count}-word \
                         piece about: {params.topic}"
                    .into(),
                system: None,
                stream: false,
                save_as: "outline".into(),
            },
            SkillStep::ModelCall {
                id: "draft".into(),
                prompt: "Write the piece following this outline, in a {params.style} style, \
                         about {params.word_count} words.\n\nOUTLINE:\n{steps.outline}"
                    .into(),
                system: None,
                stream: true,
                save_as: "text".into(),
            },
        ],
        output: json!({
            "outline": "{steps.outline}",
            "text": "{steps.text}"
        }),
    };

    (def, graph)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn all_builtins_enabled_and_flagged() {
        let skills = builtin_skills();
        assert_eq!(skills.len(), 5);
        for (def, graph) in &skills {
            assert!(def.is_builtin, "{}", def.id);
            assert!(def.enabled, "{}", def.id);
            assert!(!graph.steps.is_empty(), "{}", def.id);
        }
    }

    #[test]
    fn builtin_ids_unique() {
        let skills = builtin_skills();
        let mut ids: Vec<_> = skills.iter().map(|(d, _)| d.id.clone()).collect();
        ids.sort();
        ids.dedup();
        assert_eq!(ids.len(), skills.len());
    }

    #[test]
    fn code_skills_are_high_risk() {
        let skills = builtin_skills();
        for (def, _) in &skills {
            if def.required_tools.iter().any(|t| t == "execute_code") {
                assert_eq!(def.risk_level, RiskLevel::High, "{}", def.id);
            }
        }
    }

    #[test]
    fn step_save_keys_are_referenced_consistently() {
        for (def, graph) in builtin_skills() {
            let keys: Vec<&str> = graph.steps.iter().map(|s| s.save_as()).collect();
            let rendered = serde_json::to_string(&graph.output).unwrap();
            // Every output reference points at a real step key.
            for piece in rendered.split("{steps.").skip(1) {
                let key = piece
                    .split(['.', '}'])
                    .next()
                    .unwrap_or_default();
                assert!(keys.contains(&key), "{}: dangling step ref '{key}'", def.id);
            }
        }
    }
}
