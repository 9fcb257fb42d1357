use crate::result::ReplayResult;

pub const START_MARKER: &str = "---RESULTS_JSON---";
pub const END_MARKER: &str = "---END_RESULTS---";

/// JSON escape for the leading `-` of a marker that appears inside a string
/// value. Decoders see the original text; scanners never see the marker.
const ESCAPED_DASH: &str = "\\u002d";

/// Encode `result` as `START_MARKER + json + END_MARKER`.
///
/// Marker text that happens to occur inside string values (for example a
/// replayed log line that contains it) is escaped so the payload never
/// carries a literal marker.
pub fn frame_result(result: &ReplayResult) -> serde_json::Result<String> {
    let json = serde_json::to_string(result)?;
    let json = escape_marker(&json, START_MARKER);
    let json = escape_marker(&json, END_MARKER);
    Ok(format!("{START_MARKER}{json}{END_MARKER}"))
}

pub(crate) fn decode_payload(payload: &str) -> serde_json::Result<ReplayResult> {
    serde_json::from_str(payload.trim())
}

fn escape_marker(json: &str, marker: &str) -> String {
    let replacement = format!("{ESCAPED_DASH}{}", &marker[1..]);
    json.replace(marker, &replacement)
}
