//! Response recovery from raw server stdout.
//!
//! Servers answer without framing and often interleave log lines, reprint
//! responses, or pretty-print across several lines. The parser tries, in
//! order, and stops at the first stage that finds a response:
//!
//! 1. **Line**: each line parsed on its own; the last response with an id wins.
//! 2. **Document**: the whole output parsed as one JSON document.
//! 3. **Brace scan**: balanced `{...}` blocks, the first response wins.
//!
//! Within a stage, a response whose id equals the call id is preferred over
//! any other. The handshake response is never accepted, and neither are
//! messages the server sends on its own (anything carrying `method`).

use super::errors::{truncate_detail, BridgeError};
use super::types::{error_codes, JsonRpcError, INIT_ID_PREFIX};

/// Which fallback stage produced the response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseStrategy {
    Line,
    Document,
    BraceScan,
}

// ─── Acceptance ──────────────────────────────────────────────────────────────

/// Whether the id marks the handshake response.
fn is_handshake(value: &serde_json::Value) -> bool {
    value
        .get("id")
        .and_then(|id| id.as_str())
        .is_some_and(|id| id.starts_with(INIT_ID_PREFIX))
}

/// Any object that is neither the handshake response nor a server-initiated
/// request or notification.
fn is_candidate(value: &serde_json::Value) -> bool {
    let Some(obj) = value.as_object() else {
        return false;
    };
    !obj.contains_key("method") && !is_handshake(value)
}

/// Stricter check used per line: a candidate that also carries an id.
fn has_call_id(value: &serde_json::Value) -> bool {
    is_candidate(value) && value.get("id").is_some_and(|id| !id.is_null())
}

/// Whether the response id is the call id. Numeric ids compare by text.
fn id_matches(value: &serde_json::Value, call_id: &str) -> bool {
    match value.get("id") {
        Some(serde_json::Value::String(id)) => id == call_id,
        Some(serde_json::Value::Number(id)) => id.to_string() == call_id,
        _ => false,
    }
}

/// Flatten a parsed value (object, or batch array) into accepted candidates.
fn collect(
    value: serde_json::Value,
    accept: fn(&serde_json::Value) -> bool,
    out: &mut Vec<serde_json::Value>,
) {
    match value {
        serde_json::Value::Array(items) => out.extend(items.into_iter().filter(|v| accept(v))),
        other if accept(&other) => out.push(other),
        _ => {}
    }
}

/// Choose among a stage's candidates, preferring an exact call-id match.
fn pick(
    candidates: Vec<serde_json::Value>,
    call_id: Option<&str>,
    prefer_last: bool,
) -> Option<serde_json::Value> {
    let exact = call_id.and_then(|id| {
        let mut matching = candidates.iter().filter(|v| id_matches(v, id));
        if prefer_last {
            matching.last().cloned()
        } else {
            matching.next().cloned()
        }
    });
    exact.or_else(|| {
        if prefer_last {
            candidates.into_iter().last()
        } else {
            candidates.into_iter().next()
        }
    })
}

// ─── Strategies ──────────────────────────────────────────────────────────────

fn parse_lines(stdout: &str, call_id: Option<&str>) -> Option<serde_json::Value> {
    let mut candidates = Vec::new();
    for line in stdout.lines() {
        let trimmed = line.trim();
        if !(trimmed.starts_with('{') || trimmed.starts_with('[')) {
            continue;
        }
        let Ok(value) = serde_json::from_str::<serde_json::Value>(trimmed) else {
            continue;
        };
        collect(value, has_call_id, &mut candidates);
    }
    // Servers may reprint a response: the last one wins.
    pick(candidates, call_id, true)
}

fn parse_document(stdout: &str, call_id: Option<&str>) -> Option<serde_json::Value> {
    let value = serde_json::from_str::<serde_json::Value>(stdout.trim()).ok()?;
    let mut candidates = Vec::new();
    collect(value, is_candidate, &mut candidates);
    pick(candidates, call_id, true)
}

fn parse_brace_blocks(stdout: &str, call_id: Option<&str>) -> Option<serde_json::Value> {
    let bytes = stdout.as_bytes();
    let mut candidates = Vec::new();
    let mut start = 0;

    while let Some(offset) = stdout[start..].find('{') {
        let open = start + offset;
        let Some(close) = find_matching_brace(bytes, open) else {
            start = open + 1;
            continue;
        };

        match serde_json::from_str::<serde_json::Value>(&stdout[open..=close]) {
            Ok(value) => {
                if is_candidate(&value) {
                    candidates.push(value);
                }
                start = close + 1;
            }
            // A response may still sit inside an unparsable span.
            Err(_) => start = open + 1,
        }
    }
    pick(candidates, call_id, false)
}

/// Find the `}` that closes the `{` at `open`.
///
/// Braces inside JSON strings are ignored; `\"` does not end a string.
fn find_matching_brace(bytes: &[u8], open: usize) -> Option<usize> {
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (i, &b) in bytes.iter().enumerate().skip(open) {
        if in_string {
            match b {
                _ if escaped => escaped = false,
                b'\\' => escaped = true,
                b'"' => in_string = false,
                _ => {}
            }
            continue;
        }

        match b {
            b'"' => in_string = true,
            b'{' => depth += 1,
            b'}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(i);
                }
            }
            _ => {}
        }
    }
    None
}

// ─── Public API ──────────────────────────────────────────────────────────────

/// Recover the call response from raw stdout, if any stage finds one.
///
/// `call_id` is the id sent with the real call; when given, a response
/// echoing it wins over other candidates of the same stage.
pub fn recover_response(
    stdout: &str,
    call_id: Option<&str>,
) -> Option<(serde_json::Value, ParseStrategy)> {
    if let Some(value) = parse_lines(stdout, call_id) {
        return Some((value, ParseStrategy::Line));
    }
    if let Some(value) = parse_document(stdout, call_id) {
        return Some((value, ParseStrategy::Document));
    }
    parse_brace_blocks(stdout, call_id).map(|value| (value, ParseStrategy::BraceScan))
}

/// Recover the call response and classify protocol-level errors.
///
/// Returns the whole response object on success.
pub fn parse_response(
    server: &str,
    stdout: &str,
    call_id: Option<&str>,
) -> Result<serde_json::Value, BridgeError> {
    let (response, strategy) =
        recover_response(stdout, call_id).ok_or_else(|| BridgeError::ResponseParseError {
            name: server.to_string(),
            raw_output: truncate_detail(stdout),
        })?;

    tracing::debug!(
        server,
        strategy = ?strategy,
        exact_id = call_id.is_some_and(|id| id_matches(&response, id)),
        "recovered server response"
    );

    match response.get("error") {
        None | Some(serde_json::Value::Null) => Ok(response),
        Some(error) => {
            let error: JsonRpcError =
                serde_json::from_value(error.clone()).unwrap_or_else(|_| JsonRpcError {
                    code: error_codes::INTERNAL_ERROR,
                    message: error
                        .as_str()
                        .map(String::from)
                        .unwrap_or_else(|| error.to_string()),
                    data: None,
                });
            Err(BridgeError::RpcError {
                code: error.code,
                message: error.message,
                data: error.data,
            })
        }
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    const CALL: &str = r#"{"jsonrpc":"2.0","id":"42","result":{"content":[{"text":"hello"}]}}"#;
    const INIT: &str = r#"{"jsonrpc":"2.0","id":"init-42","result":{"protocolVersion":"2024-11-05"}}"#;

    fn recover(stdout: &str) -> Option<(serde_json::Value, ParseStrategy)> {
        recover_response(stdout, None)
    }

    #[test]
    fn test_clean_single_line() {
        let (value, strategy) = recover(CALL).unwrap();
        assert_eq!(value["id"], "42");
        assert_eq!(strategy, ParseStrategy::Line);
    }

    #[test]
    fn test_noise_lines_around_response() {
        for n in [0, 1, 5, 50] {
            let noise: Vec<String> = (0..n).map(|i| format!("[info] starting worker {i}")).collect();
            let before = format!("{}\n{CALL}", noise.join("\n"));
            let after = format!("{CALL}\n{}", noise.join("\n"));
            let middle = format!("{}\n{CALL}\n{}", noise.join("\n"), noise.join("\n"));
            for stdout in [before, after, middle] {
                let (value, _) = recover(&stdout).unwrap();
                assert_eq!(value["result"]["content"][0]["text"], "hello");
            }
        }
    }

    #[test]
    fn test_handshake_then_call() {
        let stdout = format!("{INIT}\n{CALL}\n");
        let (value, _) = recover(&stdout).unwrap();
        assert_eq!(value["id"], "42");
    }

    #[test]
    fn test_handshake_alone_is_rejected() {
        assert!(recover(INIT).is_none());
        assert!(recover(&format!("log line\n{INIT}\nbye")).is_none());

        let err = parse_response("fs", INIT, None).unwrap_err();
        match err {
            BridgeError::ResponseParseError { raw_output, .. } => {
                assert!(raw_output.contains("init-42"));
            }
            other => panic!("expected ResponseParseError, got {other:?}"),
        }
    }

    #[test]
    fn test_last_reprinted_response_wins() {
        let first = r#"{"jsonrpc":"2.0","id":"42","result":{"n":1}}"#;
        let second = r#"{"jsonrpc":"2.0","id":"42","result":{"n":2}}"#;
        let (value, _) = recover(&format!("{first}\n{second}")).unwrap();
        assert_eq!(value["result"]["n"], 2);
    }

    #[test]
    fn test_batch_array_line() {
        let stdout = format!("[{INIT},{CALL}]");
        let (value, strategy) = recover(&stdout).unwrap();
        assert_eq!(value["id"], "42");
        assert_eq!(strategy, ParseStrategy::Line);
    }

    #[test]
    fn test_notification_lines_are_skipped() {
        let note = r#"{"jsonrpc":"2.0","method":"notifications/message","params":{"level":"info"}}"#;
        let (value, _) = recover(&format!("{CALL}\n{note}")).unwrap();
        assert_eq!(value["id"], "42");
    }

    #[test]
    fn test_numeric_id_is_accepted() {
        let (value, _) = recover(r#"{"jsonrpc":"2.0","id":7,"result":{}}"#).unwrap();
        assert_eq!(value["id"], 7);
    }

    #[test]
    fn test_pretty_printed_document() {
        let stdout = "{\n  \"jsonrpc\": \"2.0\",\n  \"id\": \"42\",\n  \"result\": {\"ok\": true}\n}\n";
        let (value, strategy) = recover(stdout).unwrap();
        assert_eq!(value["result"]["ok"], true);
        assert_eq!(strategy, ParseStrategy::Document);
    }

    #[test]
    fn test_pretty_printed_pair_skips_handshake() {
        let stdout = "{\n  \"jsonrpc\": \"2.0\",\n  \"id\": \"init-1\",\n  \"result\": {}\n}\n\
                      {\n  \"jsonrpc\": \"2.0\",\n  \"id\": \"1\",\n  \"result\": {\"v\": 3}\n}\n";
        let (value, strategy) = recover(stdout).unwrap();
        assert_eq!(value["result"]["v"], 3);
        assert_eq!(strategy, ParseStrategy::BraceScan);
    }

    #[test]
    fn test_response_embedded_in_log_line() {
        let stdout = format!("2024-01-01 INFO sending response: {CALL} (took 3ms)");
        let (value, strategy) = recover(&stdout).unwrap();
        assert_eq!(value["id"], "42");
        assert_eq!(strategy, ParseStrategy::BraceScan);
    }

    #[test]
    fn test_braces_inside_strings() {
        let stdout = "noise {\n\"id\": \"9\", \"result\": {\"text\": \"a } b \\\" { c\"}\n} trailing";
        let (value, _) = recover(stdout).unwrap();
        assert_eq!(value["result"]["text"], "a } b \" { c");
    }

    #[test]
    fn test_unbalanced_garbage_is_parse_error() {
        assert!(recover("").is_none());
        assert!(recover("{ never closed").is_none());
        assert!(recover("plain text only\nno json here").is_none());
    }

    #[test]
    fn test_rpc_error_classification() {
        let stdout = r#"{"jsonrpc":"2.0","id":"5","error":{"code":-32601,"message":"Method not found"}}"#;
        match parse_response("fs", stdout, None).unwrap_err() {
            BridgeError::RpcError { code, message, .. } => {
                assert_eq!(code, -32601);
                assert_eq!(message, "Method not found");
            }
            other => panic!("expected RpcError, got {other:?}"),
        }
    }

    #[test]
    fn test_string_error_maps_to_internal_error() {
        let stdout = r#"{"jsonrpc":"2.0","id":"5","error":"server exploded"}"#;
        match parse_response("fs", stdout, None).unwrap_err() {
            BridgeError::RpcError { code, message, .. } => {
                assert_eq!(code, error_codes::INTERNAL_ERROR);
                assert_eq!(message, "server exploded");
            }
            other => panic!("expected RpcError, got {other:?}"),
        }
    }

    #[test]
    fn test_null_error_is_success() {
        let stdout = r#"{"jsonrpc":"2.0","id":"5","result":{"a":1},"error":null}"#;
        let value = parse_response("fs", stdout, None).unwrap();
        assert_eq!(value["result"]["a"], 1);
    }

    #[test]
    fn test_server_requests_are_not_responses() {
        let roots = r#"{"jsonrpc":"2.0","id":0,"method":"roots/list"}"#;
        let (value, strategy) = recover(&format!("{INIT}\n{CALL}\n{roots}")).unwrap();
        assert_eq!(value["id"], "42");
        assert_eq!(strategy, ParseStrategy::Line);

        assert!(recover(roots).is_none());
        assert!(recover(&format!("log: {roots} done")).is_none());
    }

    #[test]
    fn test_call_id_match_preferred() {
        let other = r#"{"jsonrpc":"2.0","id":"7","result":{"n":7}}"#;
        let stdout = format!("{CALL}\n{other}");

        let (value, _) = recover_response(&stdout, Some("42")).unwrap();
        assert_eq!(value["id"], "42");
        // Without a match the last response still wins.
        let (value, _) = recover_response(&stdout, Some("99")).unwrap();
        assert_eq!(value["id"], "7");

        let numeric = r#"{"jsonrpc":"2.0","id":42,"result":{"n":42}}"#;
        let (value, _) = recover_response(&format!("{numeric}\n{other}"), Some("42")).unwrap();
        assert_eq!(value["result"]["n"], 42);
    }

    #[test]
    fn test_call_id_match_preferred_in_brace_scan() {
        let other = r#"{"jsonrpc":"2.0","id":"7","result":{}}"#;
        let stdout = format!("sent {other} then {CALL} end");
        let (value, strategy) = recover_response(&stdout, Some("42")).unwrap();
        assert_eq!(value["id"], "42");
        assert_eq!(strategy, ParseStrategy::BraceScan);
    }

    #[test]
    fn test_response_inside_unparsable_span() {
        let stdout = format!("trace {{frame=3 payload={CALL} }} ok");
        let (value, strategy) = recover(&stdout).unwrap();
        assert_eq!(value["id"], "42");
        assert_eq!(strategy, ParseStrategy::BraceScan);
    }

    #[test]
    fn test_find_matching_brace_nested() {
        let text = br#"{"a":{"b":"}"},"c":1} tail"#;
        assert_eq!(find_matching_brace(text, 0), Some(20));
    }
}
