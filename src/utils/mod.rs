pub mod diff;

use chrono::{DateTime, NaiveDateTime, Utc};

use crate::models::{Action, ServiceType};

/// strftime layout of deployment identifiers (fixed width, sorts chronologically)
pub const DEPLOYMENT_ID_FORMAT: &str = "%Y%m%d_%H%M%S";

/// Format a UTC instant as a deployment identifier, e.g. "20240131_235959"
pub fn format_deployment_id(at: DateTime<Utc>) -> String {
    at.format(DEPLOYMENT_ID_FORMAT).to_string()
}

/// Parse a deployment identifier back into its UTC instant
pub fn parse_deployment_id(id: &str) -> Option<NaiveDateTime> {
    if id.len() != 15 {
        return None;
    }
    NaiveDateTime::parse_from_str(id, DEPLOYMENT_ID_FORMAT).ok()
}

/// Validate a customer or device name before it is used in a filename.
/// Allows alphanumeric, hyphens, dots, and underscores. No path separators or shell metacharacters.
pub fn is_valid_name(name: &str) -> bool {
    if name.is_empty() || name.len() > 253 || name.starts_with('.') {
        return false;
    }
    name.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '.' || c == '_')
}

/// Generated artifact filename, e.g. "ACME_pe-01_p2p_config_remove.txt"
pub fn generated_config_filename(
    customer: &str,
    device: &str,
    service: ServiceType,
    action: Action,
) -> String {
    let suffix = match action {
        Action::Activate => "",
        Action::Remove => "_remove",
        Action::Deactivate => "_deactivate",
    };
    format!("{}_{}_{}_config{}.txt", customer, device, service, suffix)
}

/// Deployed artifact filename for the flat-file backend
pub fn deployed_config_filename(customer: &str, device: &str, deployment_id: &str) -> String {
    format!("{}_{}_{}.txt", customer, device, deployment_id)
}

/// Extract the deployment identifier from a deployed artifact filename
/// belonging to the given customer and device
pub fn deployment_id_from_filename<'a>(
    filename: &'a str,
    customer: &str,
    device: &str,
) -> Option<&'a str> {
    let id = filename
        .strip_prefix(customer)?
        .strip_prefix('_')?
        .strip_prefix(device)?
        .strip_prefix('_')?
        .strip_suffix(".txt")?;
    parse_deployment_id(id).map(|_| id)
}

/// Human-readable audit log filename for one deployment run
pub fn audit_log_filename(customer: &str, deployment_id: &str) -> String {
    format!("{}_config_deploy_{}_audit.txt", customer, deployment_id)
}

/// Error latch filename for a customer
pub fn error_latch_filename(customer: &str) -> String {
    format!("{}_error.json", customer)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_deployment_id_format() {
        let at = Utc.with_ymd_and_hms(2024, 1, 31, 23, 59, 58).unwrap();
        let id = format_deployment_id(at);
        assert_eq!(id, "20240131_235958");
        assert_eq!(parse_deployment_id(&id), Some(at.naive_utc()));
        assert_eq!(parse_deployment_id("2024013_235958"), None);
        assert_eq!(parse_deployment_id("not-an-id-at-al"), None);
    }

    #[test]
    fn test_is_valid_name() {
        assert!(is_valid_name("ACME"));
        assert!(is_valid_name("access-01.lab"));
        assert!(is_valid_name("cust_42"));
        assert!(!is_valid_name(""));
        assert!(!is_valid_name("a b"));
        assert!(!is_valid_name("../etc/passwd"));
        assert!(!is_valid_name(".hidden"));
        assert!(!is_valid_name("x;rm"));
    }

    #[test]
    fn test_generated_config_filename() {
        assert_eq!(
            generated_config_filename("ACME", "pe-01", ServiceType::P2p, Action::Activate),
            "ACME_pe-01_p2p_config.txt"
        );
        assert_eq!(
            generated_config_filename("ACME", "pe-01", ServiceType::P2mp, Action::Remove),
            "ACME_pe-01_p2mp_config_remove.txt"
        );
        assert_eq!(
            generated_config_filename("ACME", "pe-01", ServiceType::P2p, Action::Deactivate),
            "ACME_pe-01_p2p_config_deactivate.txt"
        );
    }

    #[test]
    fn test_deployment_id_from_filename() {
        let name = deployed_config_filename("ACME", "pe-01", "20240101_101010");
        assert_eq!(deployment_id_from_filename(&name, "ACME", "pe-01"), Some("20240101_101010"));
        assert_eq!(deployment_id_from_filename(&name, "ACME", "pe-02"), None);
        assert_eq!(deployment_id_from_filename("ACME_pe-01_latest.txt", "ACME", "pe-01"), None);
    }
}
