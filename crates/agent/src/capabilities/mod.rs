//! Capability registry.
//!
//! Every capability is a named, described, parameterised operation that the
//! conversation engine may invoke. Capabilities are registered once at
//! startup; the set exposed to a conversation is derived from a
//! [`Permissions`] snapshot on every call to [`CapabilityRegistry::active`].

use std::collections::{BTreeMap, HashSet};
use std::sync::{Arc, OnceLock};

use async_trait::async_trait;
use regex::Regex;
use serde::Serialize;
use serde_json::{json, Map, Value};
use thiserror::Error;

use helmsman_core::domain::capability::{CapabilityGroup, Permissions};

use crate::cluster::ClusterError;
use crate::context::ExecutionContext;

pub mod kubernetes;
pub mod utility;
pub mod web;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ParameterKind {
    String,
    Integer,
    Boolean,
    /// Kubernetes object or namespace name; see [`is_resource_name`].
    ResourceName,
}

impl ParameterKind {
    fn json_type(self) -> &'static str {
        match self {
            Self::String | Self::ResourceName => "string",
            Self::Integer => "integer",
            Self::Boolean => "boolean",
        }
    }

    fn requirement(self) -> String {
        match self {
            Self::ResourceName => "a valid object name".to_string(),
            kind => format!("of type {}", kind.json_type()),
        }
    }

    /// Integers are also accepted as numeric strings.
    fn accepts(self, value: &Value) -> bool {
        match self {
            Self::String => value.is_string(),
            Self::Integer => {
                value.is_i64()
                    || value.is_u64()
                    || value.as_str().is_some_and(|raw| raw.trim().parse::<i64>().is_ok())
            }
            Self::Boolean => value.is_boolean(),
            Self::ResourceName => value.as_str().is_some_and(is_resource_name),
        }
    }
}

static RESOURCE_NAME: OnceLock<Option<Regex>> = OnceLock::new();

/// Object and namespace names become API path segments, so only name
/// characters are allowed: no `/`, `%`, `?`, `#` and no `..`.
pub fn is_resource_name(value: &str) -> bool {
    let Some(pattern) = RESOURCE_NAME
        .get_or_init(|| Regex::new(r"^[A-Za-z0-9](?:[A-Za-z0-9._:-]{0,251}[A-Za-z0-9])?$").ok())
        .as_ref()
    else {
        return false;
    };
    pattern.is_match(value) && !value.contains("..")
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ParameterSpec {
    pub name: &'static str,
    pub kind: ParameterKind,
    pub required: bool,
    pub description: &'static str,
}

impl ParameterSpec {
    pub const fn required(name: &'static str, kind: ParameterKind, description: &'static str) -> Self {
        Self { name, kind, required: true, description }
    }

    pub const fn optional(name: &'static str, kind: ParameterKind, description: &'static str) -> Self {
        Self { name, kind, required: false, description }
    }
}

#[derive(Debug, Error)]
pub enum CapabilityError {
    #[error("invalid arguments: {0}")]
    InvalidArguments(String),
    #[error(transparent)]
    Cluster(#[from] ClusterError),
    #[error("http request failed: {0}")]
    Http(String),
    #[error("operation was cancelled")]
    Cancelled,
    #[error("operation exceeded its deadline")]
    DeadlineExceeded,
}

/// Arguments decoded from the engine's JSON text, already checked against the
/// capability's declared parameters.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct CapabilityArgs {
    values: Map<String, Value>,
}

impl CapabilityArgs {
    pub fn new(values: Map<String, Value>) -> Self {
        Self { values }
    }

    pub fn str(&self, name: &str) -> Result<&str, CapabilityError> {
        self.optional_str(name)
            .ok_or_else(|| CapabilityError::InvalidArguments(format!("`{name}` is required")))
    }

    pub fn optional_str(&self, name: &str) -> Option<&str> {
        self.values.get(name).and_then(Value::as_str).filter(|value| !value.trim().is_empty())
    }

    /// A required name that is safe to place in an API path.
    pub fn resource_name(&self, name: &str) -> Result<&str, CapabilityError> {
        let value = self.str(name)?;
        checked_name(name, value)
    }

    pub fn optional_resource_name(&self, name: &str) -> Result<Option<&str>, CapabilityError> {
        self.optional_str(name).map(|value| checked_name(name, value)).transpose()
    }

    pub fn integer(&self, name: &str) -> Result<i64, CapabilityError> {
        let value = self
            .values
            .get(name)
            .ok_or_else(|| CapabilityError::InvalidArguments(format!("`{name}` is required")))?;
        value
            .as_i64()
            .or_else(|| value.as_str().and_then(|raw| raw.trim().parse().ok()))
            .ok_or_else(|| {
                CapabilityError::InvalidArguments(format!("`{name}` must be an integer"))
            })
    }
}

fn checked_name<'a>(name: &str, value: &'a str) -> Result<&'a str, CapabilityError> {
    if is_resource_name(value) {
        Ok(value)
    } else {
        Err(CapabilityError::InvalidArguments(format!("`{name}` is not a valid object name")))
    }
}

#[async_trait]
pub trait Capability: Send + Sync {
    fn name(&self) -> &str;
    fn description(&self) -> &str;
    fn group(&self) -> CapabilityGroup;
    fn parameters(&self) -> &[ParameterSpec];
    async fn execute(
        &self,
        ctx: &ExecutionContext,
        args: &CapabilityArgs,
    ) -> Result<String, CapabilityError>;
}

/// Checks a decoded argument object against declared parameters. Unknown
/// keys are ignored.
pub fn validate_arguments(
    parameters: &[ParameterSpec],
    values: &Map<String, Value>,
) -> Result<(), CapabilityError> {
    for parameter in parameters {
        match values.get(parameter.name) {
            None | Some(Value::Null) if parameter.required => {
                return Err(CapabilityError::InvalidArguments(format!(
                    "missing required parameter `{}`",
                    parameter.name
                )));
            }
            None | Some(Value::Null) => {}
            Some(value) if !parameter.kind.accepts(value) => {
                return Err(CapabilityError::InvalidArguments(format!(
                    "parameter `{}` must be {}",
                    parameter.name,
                    parameter.kind.requirement()
                )));
            }
            Some(_) => {}
        }
    }
    Ok(())
}

/// JSON Schema object describing a parameter list.
pub fn parameters_schema(parameters: &[ParameterSpec]) -> Value {
    let mut properties = Map::new();
    for parameter in parameters {
        properties.insert(
            parameter.name.to_string(),
            json!({ "type": parameter.kind.json_type(), "description": parameter.description }),
        );
    }
    let required: Vec<&str> =
        parameters.iter().filter(|parameter| parameter.required).map(|p| p.name).collect();

    json!({ "type": "object", "properties": properties, "required": required })
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("capability name must not be empty")]
    EmptyName,
    #[error("capability `{0}` is already registered")]
    DuplicateName(String),
    #[error("capability `{capability}` declares parameter `{parameter}` more than once")]
    DuplicateParameter { capability: String, parameter: String },
}

#[derive(Default)]
pub struct CapabilityRegistry {
    capabilities: BTreeMap<String, Arc<dyn Capability>>,
}

impl CapabilityRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// The full built-in catalogue across all four permission groups.
    pub fn builtin() -> Result<Self, RegistryError> {
        let mut registry = Self::new();
        for capability in kubernetes::catalogue() {
            registry.register_arc(capability)?;
        }
        registry.register(web::GetUrl)?;
        registry.register(utility::Wait)?;
        Ok(registry)
    }

    pub fn register<C>(&mut self, capability: C) -> Result<(), RegistryError>
    where
        C: Capability + 'static,
    {
        self.register_arc(Arc::new(capability))
    }

    pub fn register_arc(&mut self, capability: Arc<dyn Capability>) -> Result<(), RegistryError> {
        let name = capability.name().trim();
        if name.is_empty() {
            return Err(RegistryError::EmptyName);
        }
        if self.capabilities.contains_key(name) {
            return Err(RegistryError::DuplicateName(name.to_string()));
        }

        let mut seen = HashSet::new();
        for parameter in capability.parameters() {
            if !seen.insert(parameter.name) {
                return Err(RegistryError::DuplicateParameter {
                    capability: name.to_string(),
                    parameter: parameter.name.to_string(),
                });
            }
        }

        self.capabilities.insert(name.to_string(), capability);
        Ok(())
    }

    /// Capabilities whose group is enabled in `permissions`.
    pub fn active(&self, permissions: &Permissions) -> ActiveCapabilities {
        let capabilities = self
            .capabilities
            .iter()
            .filter(|(_, capability)| permissions.allows(capability.group()))
            .map(|(name, capability)| (name.clone(), Arc::clone(capability)))
            .collect();
        ActiveCapabilities { capabilities }
    }

    pub fn names(&self) -> Vec<&str> {
        self.capabilities.keys().map(String::as_str).collect()
    }

    pub fn len(&self) -> usize {
        self.capabilities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.capabilities.is_empty()
    }
}

/// Immutable snapshot of the capabilities a conversation may invoke.
#[derive(Clone, Default)]
pub struct ActiveCapabilities {
    capabilities: BTreeMap<String, Arc<dyn Capability>>,
}

impl ActiveCapabilities {
    pub fn get(&self, name: &str) -> Option<Arc<dyn Capability>> {
        self.capabilities.get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.capabilities.contains_key(name)
    }

    pub fn names(&self) -> Vec<&str> {
        self.capabilities.keys().map(String::as_str).collect()
    }

    pub fn len(&self) -> usize {
        self.capabilities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.capabilities.is_empty()
    }

    pub fn tool_definitions(&self) -> Vec<ToolDefinition> {
        self.capabilities
            .values()
            .map(|capability| ToolDefinition {
                name: capability.name().to_string(),
                description: capability.description().to_string(),
                parameters: parameters_schema(capability.parameters()),
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use serde_json::{json, Map, Value};

    use helmsman_core::domain::capability::{CapabilityGroup, Permissions};

    use super::{
        is_resource_name, parameters_schema, validate_arguments, Capability, CapabilityArgs,
        CapabilityError, CapabilityRegistry, ParameterKind, ParameterSpec, RegistryError,
    };
    use crate::context::ExecutionContext;

    struct Named {
        name: &'static str,
        group: CapabilityGroup,
        parameters: Vec<ParameterSpec>,
    }

    #[async_trait]
    impl Capability for Named {
        fn name(&self) -> &str {
            self.name
        }

        fn description(&self) -> &str {
            "test capability"
        }

        fn group(&self) -> CapabilityGroup {
            self.group
        }

        fn parameters(&self) -> &[ParameterSpec] {
            &self.parameters
        }

        async fn execute(
            &self,
            _ctx: &ExecutionContext,
            _args: &CapabilityArgs,
        ) -> Result<String, CapabilityError> {
            Ok("ok".to_string())
        }
    }

    fn named(name: &'static str, group: CapabilityGroup) -> Named {
        Named { name, group, parameters: Vec::new() }
    }

    fn object(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => Map::new(),
        }
    }

    #[test]
    fn registration_rejects_duplicates_and_empty_names() {
        let mut registry = CapabilityRegistry::new();
        registry.register(named("getPod", CapabilityGroup::InfraRead)).expect("first");

        assert_eq!(
            registry.register(named("getPod", CapabilityGroup::InfraRead)),
            Err(RegistryError::DuplicateName("getPod".to_string()))
        );
        assert_eq!(
            registry.register(named("  ", CapabilityGroup::Utility)),
            Err(RegistryError::EmptyName)
        );

        let repeated = Named {
            name: "repeat",
            group: CapabilityGroup::Utility,
            parameters: vec![
                ParameterSpec::required("a", ParameterKind::String, ""),
                ParameterSpec::optional("a", ParameterKind::Integer, ""),
            ],
        };
        assert!(matches!(
            registry.register(repeated),
            Err(RegistryError::DuplicateParameter { .. })
        ));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn active_set_follows_permission_groups() {
        let mut registry = CapabilityRegistry::new();
        registry.register(named("listPods", CapabilityGroup::InfraRead)).expect("read");
        registry.register(named("deletePod", CapabilityGroup::InfraWrite)).expect("write");
        registry.register(named("getUrl", CapabilityGroup::NetworkProbe)).expect("probe");
        registry.register(named("wait", CapabilityGroup::Utility)).expect("utility");

        assert_eq!(registry.active(&Permissions::read_only()).names(), vec!["listPods"]);
        assert_eq!(registry.active(&Permissions::all()).len(), 4);
        assert!(registry.active(&Permissions::none()).is_empty());

        let no_write = Permissions { infra_write: false, ..Permissions::all() };
        assert!(!registry.active(&no_write).contains("deletePod"));
    }

    #[test]
    fn read_only_builtin_catalogue_never_exposes_mutations() {
        let registry = CapabilityRegistry::builtin().expect("builtin catalogue");
        let active = registry.active(&Permissions::read_only());

        assert!(active.contains("getPod"));
        assert!(active.contains("podLogs"));
        for name in active.names() {
            assert!(!name.starts_with("delete"), "{name} should not be active");
            assert!(!name.starts_with("rollout"), "{name} should not be active");
        }
        assert!(!active.contains("getUrl"));
        assert!(!active.contains("wait"));

        let all = registry.active(&Permissions::all());
        assert!(all.contains("deletePod"));
        assert!(all.contains("rolloutDeployment"));
        assert!(all.contains("getUrl"));
        assert!(all.contains("wait"));
    }

    #[test]
    fn tool_definitions_render_json_schema() {
        let schema = parameters_schema(&[
            ParameterSpec::required("podName", ParameterKind::String, "Pod name"),
            ParameterSpec::optional("tail", ParameterKind::Integer, "Lines"),
        ]);

        assert_eq!(schema["type"], "object");
        assert_eq!(schema["properties"]["podName"]["type"], "string");
        assert_eq!(schema["properties"]["tail"]["type"], "integer");
        assert_eq!(schema["required"], json!(["podName"]));
    }

    #[test]
    fn argument_validation_reports_missing_and_mistyped_parameters() {
        let parameters = [
            ParameterSpec::required("podName", ParameterKind::String, ""),
            ParameterSpec::optional("time", ParameterKind::Integer, ""),
        ];

        assert!(validate_arguments(&parameters, &object(json!({"podName": "api-0"}))).is_ok());
        assert!(validate_arguments(
            &parameters,
            &object(json!({"podName": "api-0", "time": "30"}))
        )
        .is_ok());

        let missing = validate_arguments(&parameters, &object(json!({})));
        assert!(matches!(missing, Err(CapabilityError::InvalidArguments(ref m)) if m.contains("podName")));

        let mistyped = validate_arguments(&parameters, &object(json!({"podName": 3})));
        assert!(matches!(mistyped, Err(CapabilityError::InvalidArguments(ref m)) if m.contains("string")));

        let bad_integer =
            validate_arguments(&parameters, &object(json!({"podName": "a", "time": "soon"})));
        assert!(bad_integer.is_err());
    }

    #[test]
    fn resource_names_reject_path_syntax() {
        for valid in ["api-0", "prod", "kube-root-ca.crt", "system:controller:job-controller", "a"] {
            assert!(is_resource_name(valid), "{valid} should be accepted");
        }
        for invalid in [
            "",
            ".",
            "..",
            "x/../../secrets/db",
            "../../../namespaces/prod",
            "a..b",
            "api-0?watch=true",
            "api-0#frag",
            "api%2F0",
            "-api",
            "api ",
        ] {
            assert!(!is_resource_name(invalid), "{invalid} should be rejected");
        }
        assert!(!is_resource_name(&"a".repeat(254)));
    }

    #[test]
    fn argument_validation_rejects_unsafe_resource_names() {
        let parameters = [ParameterSpec::required("podName", ParameterKind::ResourceName, "")];

        assert!(validate_arguments(&parameters, &object(json!({"podName": "api-0"}))).is_ok());
        let traversal =
            validate_arguments(&parameters, &object(json!({"podName": "../namespaces/prod"})));
        assert!(matches!(
            traversal,
            Err(CapabilityError::InvalidArguments(ref m)) if m.contains("valid object name")
        ));
        assert_eq!(parameters_schema(&parameters)["properties"]["podName"]["type"], "string");
    }

    #[test]
    fn capability_args_accessors() {
        let args = CapabilityArgs::new(object(json!({"name": "api", "time": "5", "blank": " "})));
        assert_eq!(args.str("name").ok(), Some("api"));
        assert_eq!(args.integer("time").ok(), Some(5));
        assert_eq!(args.optional_str("blank"), None);
        assert!(args.str("missing").is_err());

        let names = CapabilityArgs::new(object(json!({"pod": "api-0", "bad": "a/b"})));
        assert_eq!(names.resource_name("pod").ok(), Some("api-0"));
        assert!(names.resource_name("bad").is_err());
        assert!(matches!(names.optional_resource_name("missing"), Ok(None)));
        assert!(names.optional_resource_name("bad").is_err());
    }
}
