// Retriever — pick the K most relevant reference examples for a request

use serde_json::Value;

use crate::error::{Outcome, PipelineError, PipelineResult};
use crate::pipeline::GenerationRequest;
use crate::prompts::{Agent, PromptLibrary};
use crate::providers::{VisionModel, VisionRequest};
use crate::reference::ReferenceRecord;

use super::json::{parse_json_object, value_to_string};
use super::prefix_chars;

/// Response keys that may carry the selected ids, in priority order.
const ID_KEYS: [&str; 3] = ["selected_ids", "top_10_papers", "top_10_plots"];

const CONTEXT_PREVIEW_CHARS: usize = 300;

/// Select up to `k` candidates, most relevant first.
///
/// With `k` or fewer candidates no model call is made and every candidate is
/// returned as is.
pub async fn retrieve(
    vlm: &dyn VisionModel,
    prompts: &PromptLibrary,
    request: &GenerationRequest,
    candidates: &[ReferenceRecord],
    k: usize,
) -> PipelineResult<Outcome<Vec<ReferenceRecord>>> {
    if candidates.is_empty() {
        tracing::warn!("No reference candidates available; planning without examples");
        return Ok(Outcome::Clean(Vec::new()));
    }

    if candidates.len() <= k {
        tracing::info!(
            candidates = candidates.len(),
            requested = k,
            "Fewer candidates than requested; using all"
        );
        return Ok(Outcome::Clean(candidates.to_vec()));
    }

    let k_text = k.to_string();
    let candidates_text = format_candidates(candidates);
    let prompt = prompts.render(
        request.diagram_kind,
        Agent::Retriever,
        &[
            ("source_context", request.source_context.as_str()),
            ("caption", request.communicative_intent.as_str()),
            ("candidates", candidates_text.as_str()),
            ("num_examples", k_text.as_str()),
        ],
    );

    tracing::debug!(candidates = candidates.len(), requested = k, "Running retriever");
    let response = vlm
        .generate(&VisionRequest::new(prompt).with_temperature(0.3).json())
        .await
        .map_err(|e| PipelineError::provider("retrieve", e))?;

    let selection = parse_selection(&response, candidates, k);
    tracing::info!(
        selected = selection.value().len(),
        fallback = selection.is_recovered(),
        "Retriever selected examples"
    );
    Ok(selection)
}

pub fn format_candidates(candidates: &[ReferenceRecord]) -> String {
    candidates
        .iter()
        .enumerate()
        .map(|(i, c)| {
            format!(
                "Candidate Paper {}:\n- **Paper ID:** {}\n- **Caption:** {}\n- **Methodology section:** {}...\n",
                i + 1,
                c.id,
                c.caption,
                prefix_chars(&c.source_context, CONTEXT_PREVIEW_CHARS)
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Map the ids in a retriever response back to catalog records.
///
/// Unknown ids are dropped, repeats are ignored, and the result is cut to `k`.
/// A response with no recognisable id list falls back to the first `k`
/// candidates in catalog order.
pub fn parse_selection(
    response: &str,
    candidates: &[ReferenceRecord],
    k: usize,
) -> Outcome<Vec<ReferenceRecord>> {
    let fallback = || candidates.iter().take(k).cloned().collect::<Vec<_>>();

    let Some(map) = parse_json_object(response) else {
        return Outcome::recovered(fallback(), "retriever response is not valid JSON");
    };

    let present: Vec<&Vec<Value>> = ID_KEYS
        .iter()
        .filter_map(|key| map.get(*key).and_then(Value::as_array))
        .collect();
    if present.is_empty() {
        return Outcome::recovered(fallback(), "retriever response has no id list");
    }
    let ids = present
        .iter()
        .find(|ids| !ids.is_empty())
        .copied()
        .or_else(|| present.first().copied())
        .map(|ids| ids.iter().map(value_to_string).collect::<Vec<_>>())
        .unwrap_or_default();

    let mut selected: Vec<ReferenceRecord> = Vec::with_capacity(k);
    for id in ids {
        if selected.iter().any(|r| r.id == id) {
            continue;
        }
        match candidates.iter().find(|c| c.id == id) {
            Some(record) => selected.push(record.clone()),
            None => tracing::warn!(id = %id, "Retriever selected unknown id"),
        }
        if selected.len() == k {
            break;
        }
    }
    Outcome::Clean(selected)
}
