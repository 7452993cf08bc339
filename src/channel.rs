/// Prefix the platform uses for channel ids in its peer-id convention
const CHANNEL_ID_PREFIX: &str = "-100";

/// A channel to monitor.
///
/// The configured identifier doubles as the watermark key and is never
/// rewritten; only `platform_id` goes through normalization.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ChannelTarget {
    configured: String,
    platform_id: String,
}

impl ChannelTarget {
    pub fn new(configured: impl Into<String>) -> Self {
        let configured = configured.into().trim().to_string();
        let platform_id = normalize_channel_id(&configured);
        Self {
            configured,
            platform_id,
        }
    }

    /// Identifier exactly as the operator configured it
    pub fn configured(&self) -> &str {
        &self.configured
    }

    /// Identifier passed to remote calls
    pub fn platform_id(&self) -> &str {
        &self.platform_id
    }

    /// Key under which the watermark for this channel is stored
    pub fn watermark_key(&self) -> &str {
        &self.configured
    }
}

impl std::fmt::Display for ChannelTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.configured)
    }
}

/// Map a configured identifier to the platform form.
///
/// Positive integers become marked channel ids; every other form (usernames,
/// already-marked negative ids, invite links) passes through unchanged.
pub fn normalize_channel_id(configured: &str) -> String {
    match configured.parse::<u64>() {
        Ok(id) if id > 0 => format!("{CHANNEL_ID_PREFIX}{id}"),
        _ => configured.to_string(),
    }
}
