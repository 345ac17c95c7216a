// Prompt templates — one per (diagram kind, agent) plus one per judge dimension
//
// Templates ship inside the binary. A prompt directory in the config may
// override any of them with `<dir>/<kind>/<agent>.txt` or
// `<dir>/evaluation/<dimension>.txt`.

use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use std::collections::HashMap;
use std::path::Path;

use crate::evaluation::Dimension;
use crate::pipeline::DiagramKind;

/// Pipeline role a template belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Agent {
    Retriever,
    Planner,
    Stylist,
    Visualizer,
    Critic,
}

impl Agent {
    pub const ALL: [Agent; 5] = [
        Agent::Retriever,
        Agent::Planner,
        Agent::Stylist,
        Agent::Visualizer,
        Agent::Critic,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Agent::Retriever => "retriever",
            Agent::Planner => "planner",
            Agent::Stylist => "stylist",
            Agent::Visualizer => "visualizer",
            Agent::Critic => "critic",
        }
    }
}

fn embedded(kind: DiagramKind, agent: Agent) -> &'static str {
    use Agent::*;
    use DiagramKind::*;
    match (kind, agent) {
        (Methodology, Retriever) => include_str!("diagram/retriever.txt"),
        (Methodology, Planner) => include_str!("diagram/planner.txt"),
        (Methodology, Stylist) => include_str!("diagram/stylist.txt"),
        (Methodology, Visualizer) => include_str!("diagram/visualizer.txt"),
        (Methodology, Critic) => include_str!("diagram/critic.txt"),
        (StatisticalPlot, Retriever) => include_str!("plot/retriever.txt"),
        (StatisticalPlot, Planner) => include_str!("plot/planner.txt"),
        (StatisticalPlot, Stylist) => include_str!("plot/stylist.txt"),
        (StatisticalPlot, Visualizer) => include_str!("plot/visualizer.txt"),
        (StatisticalPlot, Critic) => include_str!("plot/critic.txt"),
    }
}

fn embedded_evaluation(dimension: Dimension) -> &'static str {
    match dimension {
        Dimension::Faithfulness => include_str!("evaluation/faithfulness.txt"),
        Dimension::Conciseness => include_str!("evaluation/conciseness.txt"),
        Dimension::Readability => include_str!("evaluation/readability.txt"),
        Dimension::Aesthetics => include_str!("evaluation/aesthetics.txt"),
    }
}

fn kind_dir(kind: DiagramKind) -> &'static str {
    match kind {
        DiagramKind::Methodology => "diagram",
        DiagramKind::StatisticalPlot => "plot",
    }
}

/// Template lookup with optional on-disk overrides, resolved once at load.
#[derive(Debug, Clone, Default)]
pub struct PromptLibrary {
    overrides: HashMap<String, String>,
}

impl PromptLibrary {
    /// Built-in templates only
    pub fn embedded() -> Self {
        Self::default()
    }

    /// Built-in templates, with any files found under `dir` taking precedence.
    pub fn load(dir: Option<&Path>) -> Self {
        let Some(dir) = dir else {
            return Self::default();
        };

        let mut keys: Vec<String> = Vec::new();
        for kind in [DiagramKind::Methodology, DiagramKind::StatisticalPlot] {
            for agent in Agent::ALL {
                keys.push(format!("{}/{}", kind_dir(kind), agent.as_str()));
            }
        }
        for dimension in Dimension::ALL {
            keys.push(format!("evaluation/{}", dimension.as_str()));
        }

        let mut overrides = HashMap::new();
        for key in keys {
            let path = dir.join(format!("{}.txt", key));
            match std::fs::read_to_string(&path) {
                Ok(text) if !text.trim().is_empty() => {
                    tracing::debug!(path = %path.display(), "Prompt override loaded");
                    overrides.insert(key, text);
                }
                Ok(_) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "Failed to read prompt override");
                }
            }
        }

        if !overrides.is_empty() {
            tracing::info!(count = overrides.len(), dir = %dir.display(), "Using prompt overrides");
        }
        Self { overrides }
    }

    pub fn template(&self, kind: DiagramKind, agent: Agent) -> &str {
        let key = format!("{}/{}", kind_dir(kind), agent.as_str());
        self.overrides
            .get(&key)
            .map(String::as_str)
            .unwrap_or_else(|| embedded(kind, agent))
    }

    pub fn evaluation(&self, dimension: Dimension) -> &str {
        let key = format!("evaluation/{}", dimension.as_str());
        self.overrides
            .get(&key)
            .map(String::as_str)
            .unwrap_or_else(|| embedded_evaluation(dimension))
    }

    /// Look up and fill a template in one step.
    pub fn render(&self, kind: DiagramKind, agent: Agent, vars: &[(&str, &str)]) -> String {
        render(self.template(kind, agent), vars)
    }
}

static PLACEHOLDER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\{([a-z_]+)\}").expect("placeholder regex is valid"));

/// Substitute `{name}` placeholders in a single pass.
///
/// Unknown placeholders and literal braces (JSON examples in templates) are
/// left as written, and substituted values are never rescanned.
pub fn render(template: &str, vars: &[(&str, &str)]) -> String {
    PLACEHOLDER
        .replace_all(template, |caps: &Captures| {
            let name = &caps[1];
            vars.iter()
                .find(|(key, _)| *key == name)
                .map(|(_, value)| value.to_string())
                .unwrap_or_else(|| caps[0].to_string())
        })
        .into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_fills_known_and_keeps_unknown() {
        let out = render(
            "Hello {name}, {unknown} stays. {\"k\": 1}",
            &[("name", "world")],
        );
        assert_eq!(out, "Hello world, {unknown} stays. {\"k\": 1}");
    }

    #[test]
    fn test_render_does_not_rescan_values() {
        let out = render("{a} {b}", &[("a", "{b}"), ("b", "x")]);
        assert_eq!(out, "{b} x");
    }

    #[test]
    fn test_every_embedded_template_has_its_placeholders() {
        let lib = PromptLibrary::embedded();
        for kind in [DiagramKind::Methodology, DiagramKind::StatisticalPlot] {
            let retriever = lib.template(kind, Agent::Retriever);
            for p in ["{source_context}", "{caption}", "{candidates}", "{num_examples}"] {
                assert!(retriever.contains(p), "{:?} retriever missing {}", kind, p);
            }
            let planner = lib.template(kind, Agent::Planner);
            assert!(planner.contains("{examples}"));
            let stylist = lib.template(kind, Agent::Stylist);
            assert!(stylist.contains("{guidelines}") && stylist.contains("{description}"));
            assert!(lib.template(kind, Agent::Visualizer).contains("{description}"));
            let critic = lib.template(kind, Agent::Critic);
            assert!(critic.contains("critic_suggestions") && critic.contains("{description}"));
        }
        for dimension in Dimension::ALL {
            let prompt = lib.evaluation(dimension);
            assert!(prompt.contains("{source_context}") && prompt.contains("{caption}"));
        }
    }

    #[test]
    fn test_override_dir_replaces_single_template() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("plot")).unwrap();
        std::fs::write(dir.path().join("plot/critic.txt"), "custom {description}").unwrap();

        let lib = PromptLibrary::load(Some(dir.path()));
        assert_eq!(
            lib.template(DiagramKind::StatisticalPlot, Agent::Critic),
            "custom {description}"
        );
        assert_ne!(
            lib.template(DiagramKind::Methodology, Agent::Critic),
            "custom {description}"
        );
        assert_eq!(
            lib.render(DiagramKind::StatisticalPlot, Agent::Critic, &[("description", "d")]),
            "custom d"
        );
    }
}
