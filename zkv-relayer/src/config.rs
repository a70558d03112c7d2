//! Relayer configuration.

use std::{env, path::PathBuf, str::FromStr, time::Duration};

use url::Url;

use crate::{
    error::RelayerError,
    session::{Credential, SessionConfig},
    submitter::{RetryPolicy, SubmissionSettings, DEFAULT_MAX_ATTEMPTS},
};

pub const DEFAULT_WS_URL: &str = "wss://zkverify-volta-rpc.zkverify.io";
pub const DEFAULT_RPC_URL: &str = "https://zkverify-volta-rpc.zkverify.io";
pub const DEFAULT_NETWORK: &str = "Volta";
pub const DEFAULT_ARTIFACT_DIR: &str = "circuits/secret-proof";

/// Relayer configuration.
#[derive(Clone, Debug)]
pub struct RelayerConfig {
    /// Seed used to authenticate every session.
    pub credential: Credential,
    /// Endpoint and deadlines of the network node.
    pub session: SessionConfig,
    /// Domain, proof system, retry and aggregation parameters.
    pub submission: SubmissionSettings,
    /// Directory holding the input and output artifacts.
    pub artifact_dir: PathBuf,
    /// Verifier contract printed with the verify arguments.
    pub test_contract: Option<String>,
}

impl RelayerConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, RelayerError> {
        Self::from_lookup(env_var)
    }

    /// Load configuration from any key lookup. Empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, RelayerError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let lookup = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let credential = lookup("ZKVERIFY_SEED_PHRASE")
            .map(Credential::new)
            .ok_or_else(|| RelayerError::Config("ZKVERIFY_SEED_PHRASE must be set".into()))?;

        let ws_url = parse_url(
            "ZKVERIFY_WS_URL",
            lookup("ZKVERIFY_WS_URL").as_deref().unwrap_or(DEFAULT_WS_URL),
            &["ws", "wss"],
        )?;
        let rpc_url = parse_url(
            "ZKVERIFY_RPC_URL",
            lookup("ZKVERIFY_RPC_URL").as_deref().unwrap_or(DEFAULT_RPC_URL),
            &["http", "https"],
        )?;
        let network = lookup("ZKVERIFY_NETWORK").unwrap_or_else(|| DEFAULT_NETWORK.to_string());

        let domain_id: u32 = parse_or(&lookup, "ZKVERIFY_DOMAIN_ID", 0)?;
        let max_retries: u32 = parse_or(&lookup, "MAX_RETRIES", DEFAULT_MAX_ATTEMPTS)?;
        if max_retries == 0 {
            return Err(RelayerError::Config("MAX_RETRIES must be at least 1".into()));
        }
        let backoff_secs: u64 = parse_or(&lookup, "RETRY_BACKOFF_SECS", 5)?;
        let aggregation_timeout_ms: u64 = parse_or(&lookup, "AGGREGATION_TIMEOUT_MS", 900_000)?;
        let inclusion_timeout_secs: u64 = parse_or(&lookup, "INCLUSION_TIMEOUT_SECS", 300)?;
        let request_timeout_secs: u64 = parse_or(&lookup, "REQUEST_TIMEOUT_SECS", 60)?;

        Ok(Self {
            credential,
            session: SessionConfig {
                ws_url,
                rpc_url,
                network,
                request_timeout: Duration::from_secs(request_timeout_secs),
                inclusion_timeout: Duration::from_secs(inclusion_timeout_secs),
            },
            submission: SubmissionSettings {
                domain_id,
                retry: RetryPolicy::new(max_retries, Duration::from_secs(backoff_secs)),
                aggregation_timeout: Duration::from_millis(aggregation_timeout_ms),
                ..SubmissionSettings::default()
            },
            artifact_dir: artifact_dir(&lookup),
            test_contract: test_contract(&lookup),
        })
    }
}

/// Environment lookup that treats empty values as unset.
pub fn env_var(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.trim().is_empty())
}

/// Artifact directory, which commands without network access also need.
pub fn artifact_dir<F: Fn(&str) -> Option<String>>(lookup: &F) -> PathBuf {
    lookup("ARTIFACT_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_ARTIFACT_DIR))
}

pub fn test_contract<F: Fn(&str) -> Option<String>>(lookup: &F) -> Option<String> {
    lookup("ZKVERIFY_TEST_CONTRACT").map(|v| v.trim().to_string())
}

fn parse_or<T, F>(lookup: &F, key: &str, default: T) -> Result<T, RelayerError>
where
    T: FromStr,
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        Some(raw) => raw.trim().parse().map_err(|_| {
            RelayerError::Config(format!("{} must be a non-negative integer, got '{}'", key, raw))
        }),
        None => Ok(default),
    }
}

fn parse_url(key: &str, raw: &str, schemes: &[&str]) -> Result<Url, RelayerError> {
    let url = Url::parse(raw.trim())
        .map_err(|e| RelayerError::Config(format!("{} is not a valid url: {}", key, e)))?;
    if !schemes.contains(&url.scheme()) {
        return Err(RelayerError::Config(format!(
            "{} must use one of {:?}, got '{}'",
            key,
            schemes,
            url.scheme()
        )));
    }
    Ok(url)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn defaults_apply_when_only_seed_is_set() {
        let config =
            RelayerConfig::from_lookup(lookup_from(&[("ZKVERIFY_SEED_PHRASE", "seed words")]))
                .unwrap();

        assert_eq!(config.session.ws_url.as_str(), "wss://zkverify-volta-rpc.zkverify.io/");
        assert_eq!(config.session.network, "Volta");
        assert_eq!(config.session.request_timeout, Duration::from_secs(60));
        assert_eq!(config.session.inclusion_timeout, Duration::from_secs(300));
        assert_eq!(config.submission.domain_id, 0);
        assert_eq!(config.submission.retry.max_attempts, 3);
        assert_eq!(config.submission.retry.backoff, Duration::from_secs(5));
        assert_eq!(config.submission.aggregation_timeout, Duration::from_secs(900));
        assert_eq!(config.artifact_dir, PathBuf::from("circuits/secret-proof"));
        assert!(config.test_contract.is_none());
    }

    #[test]
    fn missing_seed_is_config_error() {
        let err = RelayerConfig::from_lookup(lookup_from(&[])).unwrap_err();
        assert_eq!(err.error_code(), "CONFIG_ERROR");

        let err =
            RelayerConfig::from_lookup(lookup_from(&[("ZKVERIFY_SEED_PHRASE", "  ")])).unwrap_err();
        assert!(err.to_string().contains("ZKVERIFY_SEED_PHRASE"));
    }

    #[test]
    fn overrides_are_parsed() {
        let config = RelayerConfig::from_lookup(lookup_from(&[
            ("ZKVERIFY_SEED_PHRASE", "seed"),
            ("ZKVERIFY_WS_URL", "ws://127.0.0.1:9944"),
            ("ZKVERIFY_DOMAIN_ID", "2"),
            ("MAX_RETRIES", "5"),
            ("RETRY_BACKOFF_SECS", "1"),
            ("AGGREGATION_TIMEOUT_MS", "1500"),
            ("ARTIFACT_DIR", "/tmp/proofs"),
            ("ZKVERIFY_TEST_CONTRACT", "0xabc"),
        ]))
        .unwrap();

        assert_eq!(config.session.ws_url.port(), Some(9944));
        assert_eq!(config.submission.domain_id, 2);
        assert_eq!(config.submission.retry.max_attempts, 5);
        assert_eq!(config.submission.aggregation_timeout, Duration::from_millis(1500));
        assert_eq!(config.artifact_dir, PathBuf::from("/tmp/proofs"));
        assert_eq!(config.test_contract.as_deref(), Some("0xabc"));
    }

    #[test]
    fn malformed_values_are_rejected() {
        for (key, value) in [
            ("MAX_RETRIES", "three"),
            ("MAX_RETRIES", "0"),
            ("ZKVERIFY_DOMAIN_ID", "-1"),
            ("AGGREGATION_TIMEOUT_MS", "15m"),
            ("ZKVERIFY_WS_URL", "https://zkverify-volta-rpc.zkverify.io"),
            ("ZKVERIFY_RPC_URL", "not a url"),
        ] {
            let result = RelayerConfig::from_lookup(lookup_from(&[
                ("ZKVERIFY_SEED_PHRASE", "seed"),
                (key, value),
            ]));
            assert!(
                matches!(result, Err(RelayerError::Config(_))),
                "{}={} should be rejected",
                key,
                value
            );
        }
    }
}
