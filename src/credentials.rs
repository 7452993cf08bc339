use anyhow::{Context, Result};
use std::fmt;
use std::fs;
use std::path::Path;
use tracing::{info, warn};

/// Above this many accounts the operator is advised to spread traffic over proxies
const PROXY_ADVISORY_THRESHOLD: usize = 20;

/// Raw credentials for one platform account
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    /// Phone number identifying the account
    pub phone: String,
    pub api_id: i64,
    pub api_hash: String,
    /// Serialized session token
    pub session: String,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("phone", &self.phone)
            .field("api_id", &self.api_id)
            .field("api_hash", &"<redacted>")
            .field("session", &"<redacted>")
            .finish()
    }
}

/// Parse one data row; `None` when any of the four fields is missing or invalid
fn parse_row(line: &str) -> Option<Credentials> {
    let fields: Vec<&str> = line.split(',').map(str::trim).collect();
    if fields.len() < 4 || fields[..4].iter().any(|f| f.is_empty()) {
        return None;
    }

    let api_id = fields[1].parse::<i64>().ok()?;

    Some(Credentials {
        phone: fields[0].to_string(),
        api_id,
        api_hash: fields[2].to_string(),
        session: fields[3].to_string(),
    })
}

/// Parse the tabular credential source: one header row, then
/// `phone,api_id,api_hash,session` rows. Malformed rows are skipped.
pub fn parse_credentials(content: &str) -> Vec<Credentials> {
    let mut accounts = Vec::new();

    for (index, line) in content.lines().enumerate().skip(1) {
        if line.trim().is_empty() {
            continue;
        }
        match parse_row(line) {
            Some(credentials) => accounts.push(credentials),
            None => warn!(
                "Skipping malformed credential row {row}",
                row = index + 1
            ),
        }
    }

    accounts
}

/// Load credentials from a CSV file
pub fn load_credentials(path: &Path) -> Result<Vec<Credentials>> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read credentials from {}", path.display()))?;

    let accounts = parse_credentials(&content);
    info!(
        "Loaded {count} sessions from {path}",
        count = accounts.len(),
        path = path.display()
    );
    if accounts.len() > PROXY_ADVISORY_THRESHOLD {
        warn!(
            "Consider using proxies for more than {PROXY_ADVISORY_THRESHOLD} sessions"
        );
    }

    Ok(accounts)
}
