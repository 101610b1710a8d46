//! Resolution of check/benchmark ids against the predefined (built-in,
//! lazily memoised) tables and the user-defined configuration store.
//! User-defined entries override predefined ones by id; predefined
//! benchmarks can never be deleted or updated.

use std::collections::BTreeMap;
use std::sync::OnceLock;

use crate::check::model::{Benchmark, CheckCollection, Detect, Remediation, ReportCheck, Severity};
use crate::config_store::ConfigStore;
use crate::error::{InspectorError, Result};

fn predefined_checks() -> &'static BTreeMap<String, ReportCheck> {
    static CHECKS: OnceLock<BTreeMap<String, ReportCheck>> = OnceLock::new();
    CHECKS.get_or_init(|| {
        let mut m = BTreeMap::new();
        m.insert(
            "aws_ec2_public_ip".to_string(),
            ReportCheck {
                id: "aws_ec2_public_ip".into(),
                provider: "aws".into(),
                service: "ec2".into(),
                categories: ["exposure".to_string()].into_iter().collect(),
                result_kinds: vec!["aws_instance".into()],
                severity: Severity::High,
                risk: "Instances with public IPs are reachable from the internet".into(),
                remediation: Remediation {
                    text: "Remove the public IP or move the instance behind a load balancer".into(),
                    url: "https://example.com/remediation/aws_ec2_public_ip".into(),
                },
                detect: Detect::Resoto("is(aws_instance) and reported.public_ip_address != null".into()),
                default_values: BTreeMap::new(),
            },
        );
        m
    })
}

fn predefined_benchmarks() -> &'static BTreeMap<String, Benchmark> {
    static BENCHMARKS: OnceLock<BTreeMap<String, Benchmark>> = OnceLock::new();
    BENCHMARKS.get_or_init(|| {
        let mut m = BTreeMap::new();
        m.insert(
            "aws-foundations".to_string(),
            Benchmark {
                id: "aws-foundations".into(),
                framework: "cis".into(),
                version: "1.0".into(),
                clouds: vec!["aws".into()],
                collection: CheckCollection {
                    title: "AWS Foundations".into(),
                    description: "Baseline exposure checks".into(),
                    documentation: None,
                    checks: vec!["aws_ec2_public_ip".into()],
                    children: vec![],
                },
            },
        );
        m
    })
}

/// Resolves `id` to a check, user-defined entries winning over predefined.
pub async fn resolve_check(id: &str, store: &dyn ConfigStore) -> Result<ReportCheck> {
    let config_id = format!("checks.{id}");
    if let Some(raw) = store.get_config(&config_id).await? {
        return serde_json::from_value(raw).map_err(|e| InspectorError::Internal(e.to_string()));
    }
    predefined_checks()
        .get(id)
        .cloned()
        .ok_or_else(|| InspectorError::UnknownCheck(id.to_string()))
}

/// Resolves `id` to a benchmark, user-defined entries winning over predefined.
pub async fn resolve_benchmark(id: &str, store: &dyn ConfigStore) -> Result<Benchmark> {
    let config_id = format!("benchmarks.{id}");
    if let Some(raw) = store.get_config(&config_id).await? {
        return serde_json::from_value(raw).map_err(|e| InspectorError::Internal(e.to_string()));
    }
    predefined_benchmarks()
        .get(id)
        .cloned()
        .ok_or_else(|| InspectorError::UnknownBenchmark(id.to_string()))
}

/// Stores a user-defined benchmark, failing if `id` names a predefined one.
pub async fn update_benchmark(id: &str, benchmark: &Benchmark, store: &dyn ConfigStore) -> Result<()> {
    if predefined_benchmarks().contains_key(id) {
        return Err(InspectorError::PredefinedImmutable(id.to_string()));
    }
    let value = serde_json::to_value(benchmark).map_err(|e| InspectorError::Internal(e.to_string()))?;
    store.update(&format!("benchmarks.{id}"), value).await
}

/// Deletes a user-defined benchmark, failing if `id` names a predefined one.
pub async fn delete_benchmark(id: &str, store: &dyn ConfigStore) -> Result<()> {
    if predefined_benchmarks().contains_key(id) {
        return Err(InspectorError::PredefinedImmutable(id.to_string()));
    }
    store.delete(&format!("benchmarks.{id}")).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config_store::InMemoryConfigStore;

    #[tokio::test]
    async fn test_resolves_predefined_check() {
        let store = InMemoryConfigStore::new();
        let check = resolve_check("aws_ec2_public_ip", &store).await.unwrap();
        assert_eq!(check.id, "aws_ec2_public_ip");
    }

    #[tokio::test]
    async fn test_unknown_check_errors() {
        let store = InMemoryConfigStore::new();
        assert!(resolve_check("nonexistent", &store).await.is_err());
    }

    #[tokio::test]
    async fn test_user_defined_overrides_predefined() {
        let store = InMemoryConfigStore::new();
        let mut overridden = predefined_benchmarks().get("aws-foundations").unwrap().clone();
        overridden.version = "2.0".into();
        store
            .update("benchmarks.aws-foundations", serde_json::to_value(&overridden).unwrap())
            .await
            .unwrap();
        let resolved = resolve_benchmark("aws-foundations", &store).await.unwrap();
        assert_eq!(resolved.version, "2.0");
    }

    #[tokio::test]
    async fn test_delete_predefined_benchmark_is_denied() {
        let store = InMemoryConfigStore::new();
        let result = delete_benchmark("aws-foundations", &store).await;
        assert!(matches!(result, Err(InspectorError::PredefinedImmutable(_))));
    }

    #[tokio::test]
    async fn test_update_predefined_benchmark_is_denied() {
        let store = InMemoryConfigStore::new();
        let benchmark = predefined_benchmarks().get("aws-foundations").unwrap().clone();
        let result = update_benchmark("aws-foundations", &benchmark, &store).await;
        assert!(matches!(result, Err(InspectorError::PredefinedImmutable(_))));
    }

    #[tokio::test]
    async fn test_delete_user_defined_benchmark_succeeds() {
        let store = InMemoryConfigStore::new();
        let benchmark = predefined_benchmarks().get("aws-foundations").unwrap().clone();
        store
            .update("benchmarks.custom", serde_json::to_value(&benchmark).unwrap())
            .await
            .unwrap();
        assert!(delete_benchmark("custom", &store).await.is_ok());
    }
}
