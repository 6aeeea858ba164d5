//! Squid access-log parser: classifies each request line as
//! allowed or denied by domain, for the firewall section of per-run
//! metrics.
//!
//! Squid's native log format is whitespace-delimited:
//! `timestamp elapsed client result/code bytes method url ...`. Only the
//! fields this system needs (result code, url) are extracted; everything
//! else is ignored.

use aw_types::metrics::FirewallMetrics;

/// Parse a Squid access log and fold allow/deny tallies by domain into
/// `metrics`. Lines that don't parse as a Squid record are skipped.
pub fn extract(log: &str, metrics: &mut FirewallMetrics) {
    for line in log.lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        let Some(record) = parse_line(trimmed) else {
            continue;
        };
        let tally = metrics.by_domain.entry(record.domain).or_default();
        if record.denied {
            tally.denied += 1;
        } else {
            tally.allowed += 1;
        }
    }
}

struct SquidRecord {
    domain: String,
    denied: bool,
}

fn parse_line(line: &str) -> Option<SquidRecord> {
    let fields: Vec<&str> = line.split_whitespace().collect();
    // Fields: 0 timestamp, 1 elapsed, 2 client, 3 result/code, 4 bytes,
    // 5 method, 6 url, ...
    let result_code = fields.get(3)?;
    let url = fields.get(6)?;

    let denied = result_code.starts_with("error:") || result_code.starts_with("NONE_NONE");
    let domain = extract_domain(url)?;

    Some(SquidRecord { domain, denied })
}

fn extract_domain(url: &str) -> Option<String> {
    let without_scheme = url.split("://").last().unwrap_or(url);
    let host_and_port = without_scheme.split('/').next()?;
    let host = host_and_port.split(':').next()?;
    if host.is_empty() {
        None
    } else {
        Some(host.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tallies_allowed_and_denied_by_domain() {
        let log = "\
1700000000.123    15 10.0.0.1 TCP_MISS/200 512 GET http://api.example.com/repo - HOP_DIRECT/1.2.3.4 application/json
1700000001.456    10 10.0.0.1 NONE_NONE/403 0 GET http://evil.example.com/ - HIER_NONE/- -
";
        let mut metrics = FirewallMetrics::default();
        extract(log, &mut metrics);

        assert_eq!(metrics.by_domain["api.example.com"].allowed, 1);
        assert_eq!(metrics.by_domain["evil.example.com"].denied, 1);
        assert_eq!(metrics.total_allowed(), 1);
        assert_eq!(metrics.total_denied(), 1);
    }

    #[test]
    fn error_result_code_is_denied() {
        let log = "1700000002.0 5 10.0.0.1 error:dns-fail 0 GET http://blocked.example.com/ - - -\n";
        let mut metrics = FirewallMetrics::default();
        extract(log, &mut metrics);
        assert_eq!(metrics.by_domain["blocked.example.com"].denied, 1);
    }

    #[test]
    fn extracts_domain_strips_scheme_and_port() {
        assert_eq!(
            extract_domain("https://example.com:443/path").as_deref(),
            Some("example.com")
        );
    }

    #[test]
    fn skips_unparseable_lines() {
        let mut metrics = FirewallMetrics::default();
        extract("garbage\n\n", &mut metrics);
        assert!(metrics.by_domain.is_empty());
    }
}
