//! Response normalization for the diagnosis flow.
//!
//! The flow's output shape depends on how the remote pipeline is wired, so
//! nothing here assumes a schema. Report text comes from an ordered chain of
//! JSON-pointer extractors; urgency comes from the first nested output that
//! carries a recognisable `results.urgency` node.

use serde_json::Value;

use super::types::{DiagnosisResult, RawResponse, TriageLevel, UrgencyRecord};
use super::GatewayError;

/// Substituted when no report text is found anywhere it is expected.
pub const NO_REPORT: &str = "No report generated";

/// Report text locations under `outputs[0].outputs[0]`, tried in order.
const REPORT_TEXT_POINTERS: &[&str] = &[
    "/results/message/data/text",
    "/results/message/text",
    "/messages/0/text",
    "/text",
];

/// Turn a raw flow response into a diagnosis result.
///
/// Fails only when the response has no `outputs` at all. Everything else
/// degrades to fallbacks.
pub fn normalize(raw: RawResponse) -> Result<DiagnosisResult, GatewayError> {
    let outputs = top_level_outputs(&raw)?;

    let report_text = outputs
        .first()
        .and_then(|first| nested_outputs(first).first())
        .and_then(extract_report_text)
        .unwrap_or_else(|| {
            tracing::warn!("No report text in diagnosis response, using fallback");
            NO_REPORT.to_string()
        });

    let urgency = find_urgency(outputs).unwrap_or_else(|| {
        tracing::debug!("No urgency in diagnosis response, using default");
        UrgencyRecord::default()
    });

    Ok(DiagnosisResult {
        report_text,
        urgency,
        raw_response: raw,
    })
}

fn top_level_outputs(raw: &Value) -> Result<&[Value], GatewayError> {
    match raw.get("outputs") {
        Some(Value::Array(outputs)) if !outputs.is_empty() => Ok(outputs),
        Some(Value::Array(_)) => Err(GatewayError::Parse("response has an empty outputs list".into())),
        Some(_) => Err(GatewayError::Parse("response outputs is not a list".into())),
        None => Err(GatewayError::Parse("response has no outputs".into())),
    }
}

fn nested_outputs(output: &Value) -> &[Value] {
    output
        .get("outputs")
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or_default()
}

/// First non-empty string found along the report pointer chain.
fn extract_report_text(node: &Value) -> Option<String> {
    REPORT_TEXT_POINTERS
        .iter()
        .find_map(|pointer| {
            node.pointer(pointer)
                .and_then(Value::as_str)
                .filter(|text| !text.is_empty())
        })
        .map(str::to_string)
}

/// Urgency from the first present `results.urgency` in declared order: top-level
/// outputs, then their nested outputs.
///
/// Only empty nodes (`null`, `false`, `""`, `0`) are passed over. A present
/// node that does not parse yields the default; later nodes never override it.
fn find_urgency(outputs: &[Value]) -> Option<UrgencyRecord> {
    let node = outputs
        .iter()
        .flat_map(nested_outputs)
        .filter_map(|nested| nested.pointer("/results/urgency"))
        .find(|node| is_present(node))?;

    let parsed = parse_urgency(node);
    if parsed.is_none() {
        tracing::warn!("Unrecognised urgency in diagnosis response, using default");
    }
    parsed
}

fn is_present(node: &Value) -> bool {
    match node {
        Value::Null | Value::Bool(false) => false,
        Value::String(s) => !s.is_empty(),
        Value::Number(n) => n.as_f64().is_some_and(|v| v != 0.0),
        _ => true,
    }
}

/// Lenient urgency parsing.
///
/// Accepts an object or a JSON-encoded string. Keys may be snake_case or
/// camelCase. A triage level is required; a missing timeframe or score falls
/// back to the default record's value. Scores are clamped to 0–100.
pub fn parse_urgency(node: &Value) -> Option<UrgencyRecord> {
    if let Value::String(encoded) = node {
        let decoded: Value = serde_json::from_str(encoded).ok()?;
        return match decoded {
            Value::Object(_) => parse_urgency(&decoded),
            _ => None,
        };
    }

    let object = node.as_object()?;
    let field = |snake: &str, camel: &str| object.get(snake).or_else(|| object.get(camel));

    let triage_level: TriageLevel = field("triage_level", "triageLevel")?
        .as_str()?
        .parse()
        .ok()?;

    let defaults = UrgencyRecord::default();

    let recommended_timeframe = field("recommended_timeframe", "recommendedTimeframe")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .unwrap_or(defaults.recommended_timeframe);

    let urgency_score = field("urgency_score", "urgencyScore")
        .and_then(score_from_value)
        .unwrap_or(defaults.urgency_score);

    Some(UrgencyRecord {
        triage_level,
        recommended_timeframe,
        urgency_score,
    })
}

fn score_from_value(value: &Value) -> Option<u8> {
    let raw = match value {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => s.trim().parse::<f64>().ok()?,
        _ => return None,
    };
    if raw.is_nan() {
        return None;
    }
    Some(raw.round().clamp(0.0, 100.0) as u8)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn wrap(node: Value) -> Value {
        json!({ "outputs": [ { "outputs": [ node ] } ] })
    }

    #[test]
    fn message_text_with_default_urgency() {
        let raw = json!({"outputs":[{"outputs":[{"results":{"message":{"text":"Likely viral rash"}}}]}]});
        let result = normalize(raw.clone()).unwrap();
        assert_eq!(result.report_text, "Likely viral rash");
        assert_eq!(result.urgency, UrgencyRecord::default());
        assert_eq!(result.raw_response, raw);
    }

    #[test]
    fn recovers_text_from_each_location() {
        let cases = [
            json!({"results": {"message": {"data": {"text": "from data"}}}}),
            json!({"results": {"message": {"text": "from message"}}}),
            json!({"messages": [{"text": "from messages"}]}),
            json!({"text": "from text"}),
        ];
        let expected = ["from data", "from message", "from messages", "from text"];
        for (node, want) in cases.into_iter().zip(expected) {
            assert_eq!(normalize(wrap(node)).unwrap().report_text, want);
        }
    }

    #[test]
    fn earlier_location_wins() {
        let node = json!({
            "results": {"message": {"data": {"text": "primary"}, "text": "secondary"}},
            "messages": [{"text": "tertiary"}],
            "text": "last"
        });
        assert_eq!(normalize(wrap(node)).unwrap().report_text, "primary");
    }

    #[test]
    fn empty_text_falls_through_to_next_location() {
        let node = json!({
            "results": {"message": {"data": {"text": ""}, "text": ""}},
            "text": "fallback text"
        });
        assert_eq!(normalize(wrap(node)).unwrap().report_text, "fallback text");
    }

    #[test]
    fn non_string_text_is_ignored() {
        let node = json!({"results": {"message": {"text": 42}}, "text": "string wins"});
        assert_eq!(normalize(wrap(node)).unwrap().report_text, "string wins");
    }

    #[test]
    fn missing_text_uses_fallback_literal() {
        let result = normalize(wrap(json!({"results": {}}))).unwrap();
        assert_eq!(result.report_text, NO_REPORT);
    }

    #[test]
    fn output_without_nested_outputs_uses_fallback_literal() {
        let result = normalize(json!({"outputs": [{"inputs": {}}]})).unwrap();
        assert_eq!(result.report_text, NO_REPORT);
        assert_eq!(result.urgency, UrgencyRecord::default());
    }

    #[test]
    fn absent_outputs_is_parse_failure() {
        assert!(matches!(normalize(json!({})), Err(GatewayError::Parse(_))));
        assert!(matches!(normalize(json!({"session_id": "x"})), Err(GatewayError::Parse(_))));
    }

    #[test]
    fn empty_outputs_is_parse_failure() {
        assert!(matches!(normalize(json!({"outputs": []})), Err(GatewayError::Parse(_))));
    }

    #[test]
    fn non_array_outputs_is_parse_failure() {
        assert!(matches!(normalize(json!({"outputs": {"a": 1}})), Err(GatewayError::Parse(_))));
        assert!(matches!(normalize(json!(null)), Err(GatewayError::Parse(_))));
    }

    #[test]
    fn urgency_found_in_later_output() {
        let raw = json!({"outputs": [
            {"outputs": [{"results": {"message": {"text": "Report"}}}]},
            {"outputs": [
                {"results": {"other": true}},
                {"results": {"urgency": {
                    "triage_level": "RED",
                    "recommended_timeframe": "immediately",
                    "urgency_score": 92
                }}}
            ]}
        ]});
        let result = normalize(raw).unwrap();
        assert_eq!(result.report_text, "Report");
        assert_eq!(
            result.urgency,
            UrgencyRecord {
                triage_level: TriageLevel::Red,
                recommended_timeframe: "immediately".into(),
                urgency_score: 92,
            }
        );
    }

    #[test]
    fn first_urgency_in_declared_order_wins() {
        let raw = json!({"outputs": [
            {"outputs": [{"results": {"urgency": {"triage_level": "GREEN", "recommended_timeframe": "routine", "urgency_score": 10}}}]},
            {"outputs": [{"results": {"urgency": {"triage_level": "RED", "recommended_timeframe": "now", "urgency_score": 95}}}]}
        ]});
        assert_eq!(normalize(raw).unwrap().urgency.triage_level, TriageLevel::Green);
    }

    #[test]
    fn unrecognised_first_urgency_falls_back_to_default() {
        let raw = json!({"outputs": [
            {"outputs": [{"results": {"urgency": {"level": "???"}}}]},
            {"outputs": [{"results": {"urgency": {"triage_level": "green"}}}]}
        ]});
        assert_eq!(normalize(raw).unwrap().urgency, UrgencyRecord::default());
    }

    #[test]
    fn empty_urgency_nodes_are_passed_over() {
        let raw = json!({"outputs": [
            {"outputs": [
                {"results": {"urgency": null}},
                {"results": {"urgency": false}},
                {"results": {"urgency": ""}}
            ]},
            {"outputs": [{"results": {"urgency": {"triage_level": "green"}}}]}
        ]});
        let urgency = normalize(raw).unwrap().urgency;
        assert_eq!(urgency.triage_level, TriageLevel::Green);
        assert_eq!(urgency.recommended_timeframe, "within 24-48 hours");
        assert_eq!(urgency.urgency_score, 50);
    }

    #[test]
    fn parses_json_encoded_urgency_string() {
        let node = json!(r#"{"triageLevel":"Red","recommendedTimeframe":"within 1 hour","urgencyScore":"88"}"#);
        let urgency = parse_urgency(&node).unwrap();
        assert_eq!(urgency.triage_level, TriageLevel::Red);
        assert_eq!(urgency.recommended_timeframe, "within 1 hour");
        assert_eq!(urgency.urgency_score, 88);
    }

    #[test]
    fn urgency_score_is_clamped() {
        let high = parse_urgency(&json!({"triage_level": "RED", "urgency_score": 250})).unwrap();
        assert_eq!(high.urgency_score, 100);
        let low = parse_urgency(&json!({"triage_level": "GREEN", "urgency_score": -4})).unwrap();
        assert_eq!(low.urgency_score, 0);
        let fractional = parse_urgency(&json!({"triage_level": "GREEN", "urgency_score": 12.6})).unwrap();
        assert_eq!(fractional.urgency_score, 13);
    }

    #[test]
    fn non_object_urgency_is_rejected() {
        assert!(parse_urgency(&json!(true)).is_none());
        assert!(parse_urgency(&json!("RED")).is_none());
        assert!(parse_urgency(&json!([1, 2])).is_none());
    }

    #[test]
    fn raw_response_is_retained_untouched() {
        let raw = json!({"outputs": [{"outputs": [{"text": "t", "extra": {"deep": [1, 2, 3]}}]}], "session_id": "abc"});
        let result = normalize(raw.clone()).unwrap();
        assert_eq!(result.raw_response, raw);
    }
}
