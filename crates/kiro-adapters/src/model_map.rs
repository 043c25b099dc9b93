//! Static client-model-id -> upstream-model-id table (§4.7 "Model-name
//! mapping"). A pure function; unknown ids pass through unchanged.

const TABLE: &[(&str, &str)] = &[
    ("claude-sonnet-4-5", "CLAUDE_SONNET_4_5_20250929_V1_0"),
    ("claude-sonnet-4-5-20250929", "CLAUDE_SONNET_4_5_20250929_V1_0"),
    ("claude-sonnet-4-20250514", "CLAUDE_SONNET_4_20250514_V1_0"),
    ("claude-3-7-sonnet-20250219", "CLAUDE_3_7_SONNET_20250219_V1_0"),
    ("claude-3-5-haiku-20241022", "CLAUDE_3_5_HAIKU_20241022_V1_0"),
    ("gpt-4o", "CLAUDE_SONNET_4_5_20250929_V1_0"),
    ("gpt-4o-mini", "CLAUDE_3_5_HAIKU_20241022_V1_0"),
    ("gemini-2.5-pro", "CLAUDE_SONNET_4_5_20250929_V1_0"),
    ("gemini-2.5-flash", "CLAUDE_3_5_HAIKU_20241022_V1_0"),
];

pub fn to_upstream_model(client_model: &str) -> String {
    TABLE
        .iter()
        .find(|(client, _)| *client == client_model)
        .map(|(_, upstream)| upstream.to_string())
        .unwrap_or_else(|| client_model.to_string())
}

/// Client-facing model ids this proxy knows how to map, in table order
/// (used by `GET /v1/models`).
pub fn known_models() -> impl Iterator<Item = &'static str> {
    TABLE.iter().map(|(client, _)| *client)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_alias_maps_to_upstream_id() {
        assert_eq!(to_upstream_model("claude-sonnet-4-5"), "CLAUDE_SONNET_4_5_20250929_V1_0");
    }

    #[test]
    fn unknown_id_passes_through() {
        assert_eq!(to_upstream_model("some-future-model"), "some-future-model");
    }
}
