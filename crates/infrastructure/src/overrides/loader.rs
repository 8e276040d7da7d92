use super::table::OverrideTable;
use std::io::{BufRead, BufReader, Read};
use std::net::IpAddr;
use std::path::Path;
use tracing::{info, warn};

/// Outcome of an override file load.
#[derive(Debug, Clone, Copy, Default)]
pub struct LoadSummary {
    pub loaded: usize,
    pub skipped: usize,
}

impl OverrideTable {
    /// Load `<ip> <domain>` lines from a file.
    ///
    /// Blank lines and `#` comments are ignored; malformed lines are skipped
    /// with a warning. An unreadable file is an error for the caller to log —
    /// load failures are not fatal to the relay.
    pub fn load_file(&self, path: impl AsRef<Path>) -> std::io::Result<LoadSummary> {
        let path = path.as_ref();
        let file = std::fs::File::open(path)?;
        let summary = self.load_from(file)?;
        info!(
            path = %path.display(),
            loaded = summary.loaded,
            skipped = summary.skipped,
            "Loaded override table"
        );
        Ok(summary)
    }

    /// Parse override lines from any reader. Used directly by tests.
    pub fn load_from(&self, reader: impl Read) -> std::io::Result<LoadSummary> {
        let mut summary = LoadSummary::default();

        for line in BufReader::new(reader).lines() {
            let line = line?;
            let trimmed = line.trim();
            if trimmed.is_empty() || trimmed.starts_with('#') {
                continue;
            }

            let mut fields = trimmed.split_whitespace();
            let (Some(ip_field), Some(domain)) = (fields.next(), fields.next()) else {
                warn!(line = trimmed, "Skipping malformed override line");
                summary.skipped += 1;
                continue;
            };

            let address: IpAddr = match ip_field.parse() {
                Ok(address) => address,
                Err(_) => {
                    warn!(line = trimmed, "Skipping override line with invalid IP");
                    summary.skipped += 1;
                    continue;
                }
            };

            self.add(domain, address);
            summary.loaded += 1;
        }

        Ok(summary)
    }
}
