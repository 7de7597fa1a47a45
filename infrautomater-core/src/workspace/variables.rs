//! Per-resource-type variable resolution with documented defaults

use super::hcl::HclValue;
use super::RenderError;
use crate::models::ResourceType;
use rand::distributions::Alphanumeric;
use rand::rngs::OsRng;
use rand::Rng;
use serde_json::{Map, Value};
use std::path::Path;

/// Length of generated secrets
pub const SECRET_LENGTH: usize = 16;

pub const DEFAULT_ENGINE: &str = "postgres";
pub const DEFAULT_SIZE: &str = "small";
pub const DEFAULT_DB_USERNAME: &str = "dbadmin";
pub const DEFAULT_QUOTA_TIER: &str = "standard";
pub const DEFAULT_CLUSTER: &str = "default";

/// Database size to instance class
pub const INSTANCE_CLASSES: &[(&str, &str)] = &[
    ("small", "db.t3.micro"),
    ("medium", "db.t3.small"),
    ("large", "db.t3.medium"),
    ("xlarge", "db.t3.large"),
];

/// Engine to default engine version
pub const ENGINE_VERSIONS: &[(&str, &str)] =
    &[("postgres", "15"), ("mysql", "8.0"), ("mariadb", "10.11")];

/// Namespace quota tier
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuotaTier {
    pub name: &'static str,
    pub cpu_requests: &'static str,
    pub memory_requests: &'static str,
    pub pods: i64,
}

pub const QUOTA_TIERS: &[QuotaTier] = &[
    QuotaTier {
        name: "small",
        cpu_requests: "1",
        memory_requests: "2Gi",
        pods: 10,
    },
    QuotaTier {
        name: "standard",
        cpu_requests: "2",
        memory_requests: "4Gi",
        pods: 20,
    },
    QuotaTier {
        name: "large",
        cpu_requests: "4",
        memory_requests: "8Gi",
        pods: 50,
    },
];

/// Deployment defaults that requests may override
#[derive(Debug, Clone)]
pub struct VariableDefaults<'a> {
    pub region: &'a str,
    pub kubeconfig_path: &'a Path,
}

/// Ordered variable values for one workspace plus a one-line description
#[derive(Debug, Clone)]
pub struct ResolvedVariables {
    pub values: Vec<(&'static str, HclValue)>,
    pub summary: String,
}

impl ResolvedVariables {
    pub fn get(&self, key: &str) -> Option<&HclValue> {
        self.values.iter().find(|(k, _)| *k == key).map(|(_, v)| v)
    }
}

/// Generate a random alphanumeric secret from the OS generator
pub fn generate_secret() -> String {
    OsRng
        .sample_iter(&Alphanumeric)
        .take(SECRET_LENGTH)
        .map(char::from)
        .collect()
}

/// Resolve every variable of `kind` from the request config
pub fn resolve(
    kind: ResourceType,
    request_id: i64,
    name: &str,
    config: &Map<String, Value>,
    team_id: i64,
    defaults: &VariableDefaults<'_>,
) -> Result<ResolvedVariables, RenderError> {
    match kind {
        ResourceType::Database => database(request_id, name, config, team_id, defaults),
        ResourceType::ObjectStorage => object_storage(request_id, name, config, team_id, defaults),
        ResourceType::NamespaceQuota => namespace_quota(request_id, name, config, team_id, defaults),
    }
}

fn database(
    request_id: i64,
    name: &str,
    config: &Map<String, Value>,
    team_id: i64,
    defaults: &VariableDefaults<'_>,
) -> Result<ResolvedVariables, RenderError> {
    let engine = config_str(config, "engine")?.unwrap_or_else(|| DEFAULT_ENGINE.to_string());

    let engine_version = match config_str(config, "engine_version")? {
        Some(version) => version,
        None => lookup(ENGINE_VERSIONS, &engine)
            .map(str::to_string)
            .ok_or_else(|| RenderError::MissingField {
                resource_type: ResourceType::Database,
                field: "engine_version",
                reason: format!("no default version for engine '{}'", engine),
            })?,
    };

    let instance_class = match config_str(config, "instance_class")? {
        Some(class) => class,
        None => {
            let size = config_str(config, "size")?.unwrap_or_else(|| DEFAULT_SIZE.to_string());
            lookup(INSTANCE_CLASSES, &size)
                .map(str::to_string)
                .ok_or_else(|| RenderError::InvalidValue {
                    field: "size",
                    reason: format!(
                        "'{}' is not one of {}",
                        size,
                        keys(INSTANCE_CLASSES).join(", ")
                    ),
                })?
        }
    };

    let db_name = match config_str(config, "db_name")? {
        Some(db_name) => db_name,
        None => database_identifier(name),
    };
    let username =
        config_str(config, "username")?.unwrap_or_else(|| DEFAULT_DB_USERNAME.to_string());
    let password = config_str(config, "password")?.unwrap_or_else(generate_secret);
    let region = region(config, defaults)?;

    let summary = format!(
        "Database {} ({} {}, {}) in {}",
        name, engine, engine_version, instance_class, region
    );

    Ok(ResolvedVariables {
        values: vec![
            ("name", name.into()),
            ("engine", engine.into()),
            ("engine_version", engine_version.into()),
            ("instance_class", instance_class.into()),
            ("db_name", db_name.into()),
            ("username", username.into()),
            ("password", password.into()),
            ("request_id", request_id.into()),
            ("team_id", team_id.into()),
            ("aws_region", region.into()),
        ],
        summary,
    })
}

fn object_storage(
    request_id: i64,
    name: &str,
    config: &Map<String, Value>,
    team_id: i64,
    defaults: &VariableDefaults<'_>,
) -> Result<ResolvedVariables, RenderError> {
    let public = config_bool(config, "public")?.unwrap_or(false);
    let region = region(config, defaults)?;

    let summary = format!(
        "S3 bucket {} in {}{}",
        name,
        region,
        if public { " (public)" } else { "" }
    );

    Ok(ResolvedVariables {
        values: vec![
            ("name", name.into()),
            ("public", public.into()),
            ("request_id", request_id.into()),
            ("team_id", team_id.into()),
            ("aws_region", region.into()),
        ],
        summary,
    })
}

fn namespace_quota(
    request_id: i64,
    name: &str,
    config: &Map<String, Value>,
    team_id: i64,
    defaults: &VariableDefaults<'_>,
) -> Result<ResolvedVariables, RenderError> {
    let quota_enabled = config_bool(config, "quota_enabled")?.unwrap_or(true);

    let tier_name = config_str(config, "quota")?.unwrap_or_else(|| DEFAULT_QUOTA_TIER.to_string());
    let tier = QUOTA_TIERS
        .iter()
        .find(|t| t.name == tier_name)
        .ok_or_else(|| RenderError::InvalidValue {
            field: "quota",
            reason: format!(
                "'{}' is not one of {}",
                tier_name,
                QUOTA_TIERS
                    .iter()
                    .map(|t| t.name)
                    .collect::<Vec<_>>()
                    .join(", ")
            ),
        })?;

    let cpu = config_str(config, "quota_cpu_requests")?
        .unwrap_or_else(|| tier.cpu_requests.to_string());
    let memory = config_str(config, "quota_memory_requests")?
        .unwrap_or_else(|| tier.memory_requests.to_string());
    let pods = config_int(config, "quota_pods")?.unwrap_or(tier.pods);

    let kubeconfig_path = config_str(config, "kubeconfig_path")?
        .unwrap_or_else(|| defaults.kubeconfig_path.display().to_string());
    let cluster = config_str(config, "cluster")?.unwrap_or_else(|| DEFAULT_CLUSTER.to_string());

    let summary = format!(
        "K8s namespace {} in cluster {} (quota {})",
        name, cluster, tier.name
    );

    Ok(ResolvedVariables {
        values: vec![
            ("name", name.into()),
            ("quota_enabled", quota_enabled.into()),
            ("quota_cpu_requests", cpu.into()),
            ("quota_memory_requests", memory.into()),
            ("quota_pods", pods.into()),
            ("request_id", request_id.into()),
            ("team_id", team_id.into()),
            ("kubeconfig_path", kubeconfig_path.into()),
        ],
        summary,
    })
}

fn region(config: &Map<String, Value>, defaults: &VariableDefaults<'_>) -> Result<String, RenderError> {
    if let Some(region) = config_str(config, "region")? {
        return Ok(region);
    }
    Ok(config_str(config, "aws_region")?.unwrap_or_else(|| defaults.region.to_string()))
}

fn lookup(table: &[(&'static str, &'static str)], key: &str) -> Option<&'static str> {
    table.iter().find(|(k, _)| *k == key).map(|(_, v)| *v)
}

fn keys(table: &[(&'static str, &str)]) -> Vec<&'static str> {
    table.iter().map(|(k, _)| *k).collect()
}

/// Lowercase identifier safe for a database name
fn database_identifier(name: &str) -> String {
    let mut ident: String = name
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                c.to_ascii_lowercase()
            } else {
                '_'
            }
        })
        .collect();

    if !ident.starts_with(|c: char| c.is_ascii_alphabetic()) {
        ident.insert_str(0, "db_");
    }
    ident.truncate(63);
    ident
}

fn config_str(config: &Map<String, Value>, key: &'static str) -> Result<Option<String>, RenderError> {
    match config.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) if s.trim().is_empty() => Ok(None),
        Some(Value::String(s)) => Ok(Some(s.clone())),
        Some(Value::Number(n)) => Ok(Some(n.to_string())),
        Some(Value::Bool(b)) => Ok(Some(b.to_string())),
        Some(_) => Err(RenderError::InvalidValue {
            field: key,
            reason: "expected a string".to_string(),
        }),
    }
}

fn config_bool(config: &Map<String, Value>, key: &'static str) -> Result<Option<bool>, RenderError> {
    let invalid = || RenderError::InvalidValue {
        field: key,
        reason: "expected a boolean".to_string(),
    };

    match config.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Bool(b)) => Ok(Some(*b)),
        Some(Value::String(s)) => match s.trim().to_ascii_lowercase().as_str() {
            "true" | "yes" | "1" => Ok(Some(true)),
            "false" | "no" | "0" => Ok(Some(false)),
            _ => Err(invalid()),
        },
        Some(Value::Number(n)) => match n.as_i64() {
            Some(1) => Ok(Some(true)),
            Some(0) => Ok(Some(false)),
            _ => Err(invalid()),
        },
        Some(_) => Err(invalid()),
    }
}

fn config_int(config: &Map<String, Value>, key: &'static str) -> Result<Option<i64>, RenderError> {
    let invalid = || RenderError::InvalidValue {
        field: key,
        reason: "expected a non-negative integer".to_string(),
    };

    let value = match config.get(key) {
        None | Some(Value::Null) => return Ok(None),
        Some(Value::Number(n)) => n.as_i64().ok_or_else(|| invalid())?,
        Some(Value::String(s)) => s.trim().parse::<i64>().map_err(|_| invalid())?,
        Some(_) => return Err(invalid()),
    };

    if value < 0 {
        return Err(invalid());
    }
    Ok(Some(value))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::path::PathBuf;

    fn config(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap_or_default()
    }

    fn resolve_with(kind: ResourceType, config: Map<String, Value>) -> Result<ResolvedVariables, RenderError> {
        let kubeconfig = PathBuf::from("/etc/kube/config");
        let defaults = VariableDefaults {
            region: "us-east-1",
            kubeconfig_path: &kubeconfig,
        };
        resolve(kind, 42, "orders", &config, 7, &defaults)
    }

    #[test]
    fn test_database_defaults() {
        let vars = resolve_with(ResourceType::Database, Map::new()).unwrap();

        let keys: Vec<_> = vars.values.iter().map(|(k, _)| *k).collect();
        assert_eq!(
            keys,
            vec![
                "name",
                "engine",
                "engine_version",
                "instance_class",
                "db_name",
                "username",
                "password",
                "request_id",
                "team_id",
                "aws_region",
            ]
        );

        assert_eq!(vars.get("engine"), Some(&HclValue::from("postgres")));
        assert_eq!(vars.get("engine_version"), Some(&HclValue::from("15")));
        assert_eq!(vars.get("instance_class"), Some(&HclValue::from("db.t3.micro")));
        assert_eq!(vars.get("db_name"), Some(&HclValue::from("orders")));
        assert_eq!(vars.get("username"), Some(&HclValue::from("dbadmin")));
        assert_eq!(vars.get("aws_region"), Some(&HclValue::from("us-east-1")));
        assert_eq!(vars.get("request_id"), Some(&HclValue::Int(42)));
        assert_eq!(vars.get("team_id"), Some(&HclValue::Int(7)));

        let password = vars.get("password").and_then(HclValue::as_str).unwrap();
        assert_eq!(password.len(), SECRET_LENGTH);
        assert!(password.chars().all(|c| c.is_ascii_alphanumeric()));
    }

    #[test]
    fn test_database_size_table() {
        for (size, class) in INSTANCE_CLASSES {
            let vars = resolve_with(ResourceType::Database, config(json!({ "size": size }))).unwrap();
            assert_eq!(vars.get("instance_class"), Some(&HclValue::from(*class)));
        }

        let err = resolve_with(ResourceType::Database, config(json!({ "size": "huge" }))).unwrap_err();
        assert!(matches!(err, RenderError::InvalidValue { field: "size", .. }));
    }

    #[test]
    fn test_database_unknown_engine_needs_explicit_version() {
        let err =
            resolve_with(ResourceType::Database, config(json!({ "engine": "oracle" }))).unwrap_err();
        assert!(matches!(
            err,
            RenderError::MissingField {
                field: "engine_version",
                ..
            }
        ));

        let vars = resolve_with(
            ResourceType::Database,
            config(json!({ "engine": "oracle", "engine_version": "19c" })),
        )
        .unwrap();
        assert_eq!(vars.get("engine_version"), Some(&HclValue::from("19c")));
    }

    #[test]
    fn test_explicit_password_is_kept() {
        let vars = resolve_with(ResourceType::Database, config(json!({ "password": "s3cret" }))).unwrap();
        assert_eq!(vars.get("password"), Some(&HclValue::from("s3cret")));
    }

    #[test]
    fn test_generated_secrets_differ() {
        assert_ne!(generate_secret(), generate_secret());
    }

    #[test]
    fn test_object_storage_variables() {
        let vars = resolve_with(
            ResourceType::ObjectStorage,
            config(json!({ "region": "eu-west-1", "public": "true" })),
        )
        .unwrap();

        let keys: Vec<_> = vars.values.iter().map(|(k, _)| *k).collect();
        assert_eq!(keys, vec!["name", "public", "request_id", "team_id", "aws_region"]);
        assert_eq!(vars.get("public"), Some(&HclValue::Bool(true)));
        assert_eq!(vars.summary, "S3 bucket orders in eu-west-1 (public)");
    }

    #[test]
    fn test_namespace_quota_tiers() {
        let vars = resolve_with(ResourceType::NamespaceQuota, Map::new()).unwrap();
        let keys: Vec<_> = vars.values.iter().map(|(k, _)| *k).collect();
        assert_eq!(
            keys,
            vec![
                "name",
                "quota_enabled",
                "quota_cpu_requests",
                "quota_memory_requests",
                "quota_pods",
                "request_id",
                "team_id",
                "kubeconfig_path",
            ]
        );
        assert_eq!(vars.get("quota_cpu_requests"), Some(&HclValue::from("2")));
        assert_eq!(vars.get("quota_memory_requests"), Some(&HclValue::from("4Gi")));
        assert_eq!(vars.get("quota_pods"), Some(&HclValue::Int(20)));
        assert_eq!(vars.get("quota_enabled"), Some(&HclValue::Bool(true)));
        assert_eq!(
            vars.get("kubeconfig_path"),
            Some(&HclValue::from("/etc/kube/config"))
        );

        let vars = resolve_with(
            ResourceType::NamespaceQuota,
            config(json!({ "quota": "large", "quota_pods": 75 })),
        )
        .unwrap();
        assert_eq!(vars.get("quota_cpu_requests"), Some(&HclValue::from("4")));
        assert_eq!(vars.get("quota_pods"), Some(&HclValue::Int(75)));

        let err = resolve_with(ResourceType::NamespaceQuota, config(json!({ "quota": "mega" })))
            .unwrap_err();
        assert!(matches!(err, RenderError::InvalidValue { field: "quota", .. }));
    }

    #[test]
    fn test_invalid_value_types() {
        let err =
            resolve_with(ResourceType::ObjectStorage, config(json!({ "public": "maybe" }))).unwrap_err();
        assert!(matches!(err, RenderError::InvalidValue { field: "public", .. }));

        let err =
            resolve_with(ResourceType::Database, config(json!({ "engine": ["a"] }))).unwrap_err();
        assert!(matches!(err, RenderError::InvalidValue { field: "engine", .. }));
    }

    #[test]
    fn test_database_identifier() {
        assert_eq!(database_identifier("Orders-DB"), "orders_db");
        assert_eq!(database_identifier("1st"), "db_1st");
        assert_eq!(database_identifier(&"x".repeat(80)).len(), 63);
    }
}
