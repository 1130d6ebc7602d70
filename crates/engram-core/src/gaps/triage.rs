//! Gap triage - Stage 2
//!
//! One language call over all Stage-1 signals, annotated with the
//! user's proactiveness dial and smoothed emotion. The prompt carries
//! the explicit rule "when in doubt mark NOT actionable", and any
//! failure degrades to exactly that: every signal not actionable with
//! zero confidence.

use serde::{Deserialize, Serialize};
use tokio::time::{timeout, Duration};

use crate::gaps::signals::{GapSignal, Severity};
use crate::memory::ProactivenessDial;
use crate::providers::{extract_json, CompletionRequest, LanguageProvider};

/// One triage verdict, index-aligned with the input signals
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TriageDiagnosis {
    pub index: usize,
    pub actionable: bool,
    pub confidence: f64,
    pub diagnosis: String,
    pub suggested_action: String,
}

impl TriageDiagnosis {
    fn not_actionable(index: usize) -> Self {
        Self {
            index,
            actionable: false,
            confidence: 0.0,
            diagnosis: String::new(),
            suggested_action: String::new(),
        }
    }
}

/// The fail-safe verdict: same length as the input, nothing actionable.
pub fn fail_safe(signal_count: usize) -> Vec<TriageDiagnosis> {
    (0..signal_count).map(TriageDiagnosis::not_actionable).collect()
}

/// Build the single triage prompt over all signals.
pub fn build_triage_prompt(
    signals: &[GapSignal],
    dial: ProactivenessDial,
    emotion: &str,
) -> (String, String) {
    let system = "You triage signals about gaps in a personal assistant's behavior. \
        For each numbered signal decide whether proactively following up would help the user. \
        When in doubt mark NOT actionable. \
        Reply with a JSON array of objects: {\"index\": n, \"actionable\": bool, \
        \"confidence\": 0.0-1.0, \"diagnosis\": \"...\", \"suggestedAction\": \"...\"}."
        .to_string();

    let mut user = format!(
        "User proactiveness dial: {dial}\nUser's current emotion: {emotion}\n\nSignals:\n"
    );
    for (index, signal) in signals.iter().enumerate() {
        user.push_str(&format!(
            "{index}. [{} / {}] {} (context: {})\n",
            signal.kind.as_str(),
            signal.severity.as_str(),
            signal.description,
            signal.context,
        ));
    }
    (system, user)
}

/// Parse the triage reply, index-aligned with the signals. Out-of-range
/// indices are skipped; anything unparseable yields the fail-safe.
pub fn parse_triage(text: &str, signal_count: usize) -> Vec<TriageDiagnosis> {
    let Some(value) = extract_json(text) else {
        return fail_safe(signal_count);
    };
    let Some(array) = value.as_array() else {
        return fail_safe(signal_count);
    };

    let mut diagnoses = fail_safe(signal_count);
    for entry in array {
        let Some(index) = entry.get("index").and_then(|v| v.as_u64()).map(|v| v as usize)
        else {
            continue;
        };
        if index >= signal_count {
            continue;
        }
        diagnoses[index] = TriageDiagnosis {
            index,
            actionable: entry
                .get("actionable")
                .and_then(|v| v.as_bool())
                .unwrap_or(false),
            confidence: entry
                .get("confidence")
                .and_then(|v| v.as_f64())
                .unwrap_or(0.0)
                .clamp(0.0, 1.0),
            diagnosis: entry
                .get("diagnosis")
                .and_then(|v| v.as_str())
                .unwrap_or("")
                .to_string(),
            suggested_action: entry
                .get("suggestedAction")
                .and_then(|v| v.as_str())
                .unwrap_or("")
                .to_string(),
        };
    }
    diagnoses
}

/// Run the triage call. Every failure path returns the fail-safe.
pub async fn triage(
    language: &dyn LanguageProvider,
    signals: &[GapSignal],
    dial: ProactivenessDial,
    emotion: &str,
    timeout_ms: u64,
) -> Vec<TriageDiagnosis> {
    if signals.is_empty() {
        return Vec::new();
    }
    let (system, user) = build_triage_prompt(signals, dial, emotion);
    let request = CompletionRequest::single_turn(system, user).with_max_tokens(1024);

    let completion = match timeout(
        Duration::from_millis(timeout_ms),
        language.complete(request),
    )
    .await
    {
        Ok(Ok(completion)) => completion,
        Ok(Err(error)) => {
            tracing::warn!("gap triage failed, marking all not actionable: {error}");
            return fail_safe(signals.len());
        }
        Err(_) => {
            tracing::warn!("gap triage timed out, marking all not actionable");
            return fail_safe(signals.len());
        }
    };
    parse_triage(&completion.text(), signals.len())
}

/// Keep actionable diagnoses, applying the dial filter: a conservative
/// dial additionally requires high severity.
pub fn filter_actionable<'a>(
    diagnoses: &'a [TriageDiagnosis],
    signals: &[GapSignal],
    dial: ProactivenessDial,
) -> Vec<&'a TriageDiagnosis> {
    diagnoses
        .iter()
        .filter(|diagnosis| diagnosis.actionable)
        .filter(|diagnosis| {
            dial != ProactivenessDial::Conservative
                || signals
                    .get(diagnosis.index)
                    .map(|signal| signal.severity == Severity::High)
                    .unwrap_or(false)
        })
        .collect()
}

// ============================================================================
// TESTS
// ============================================================================
