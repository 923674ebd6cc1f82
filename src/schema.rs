//! API description loading and the operation/event tables derived from it.
//!
//! Asterisk publishes a Swagger 1.2-style description of its REST surface at
//! `/ari/api-docs/resources.json`, with one document per resource class. The
//! client fetches the whole set once at connect time and synthesizes every
//! callable operation from it — no operation table in this crate is written
//! by hand.

use std::collections::HashMap;

use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;
use url::Url;

use crate::constants::API_DOCS_PREFIX;
use crate::error::{AriError, AriResult};
use crate::resource::ResourceType;

// ── Raw document shapes ──────────────────────────────────────────────

/// Root listing at `/ari/api-docs/resources.json`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ResourceListing {
    #[serde(default)]
    pub(crate) api_version: Option<String>,
    pub(crate) apis: Vec<ApiRef>,
}

/// One entry of the root listing, e.g. `{"path": "/api-docs/channels.{format}"}`.
#[derive(Debug, Deserialize)]
pub(crate) struct ApiRef {
    pub(crate) path: String,
}

/// A per-resource document such as `channels.json`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ApiDeclaration {
    #[serde(default)]
    pub(crate) apis: Vec<ApiEndpoint>,
    #[serde(default)]
    pub(crate) models: serde_json::Map<String, Value>,
}

/// One URL template and the operations under it.
#[derive(Debug, Deserialize)]
pub(crate) struct ApiEndpoint {
    pub(crate) path: String,
    #[serde(default)]
    pub(crate) operations: Vec<OperationDoc>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct OperationDoc {
    pub(crate) http_method: String,
    pub(crate) nickname: String,
    #[serde(default)]
    pub(crate) response_class: Option<String>,
    #[serde(default)]
    pub(crate) parameters: Vec<ParameterDoc>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ParameterDoc {
    pub(crate) name: String,
    pub(crate) param_type: String,
    #[serde(default)]
    pub(crate) required: bool,
    #[serde(default)]
    pub(crate) data_type: Option<String>,
    #[serde(default)]
    pub(crate) description: Option<String>,
}

// ── Derived operation tables ─────────────────────────────────────────

/// Where an operation parameter is bound on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum ParamLocation {
    /// Substituted into a `{placeholder}` of the path template.
    Path,
    /// Appended to the query string.
    Query,
    /// Collected into the JSON request body.
    Body,
    /// Sent as an HTTP header.
    Header,
}

impl ParamLocation {
    fn parse(s: &str) -> Option<Self> {
        match s {
            "path" => Some(ParamLocation::Path),
            "query" => Some(ParamLocation::Query),
            "body" => Some(ParamLocation::Body),
            "header" => Some(ParamLocation::Header),
            _ => None,
        }
    }
}

/// One parameter of an operation, as declared by the description.
#[derive(Debug, Clone)]
pub struct ParamSpec {
    /// Wire name of the parameter.
    pub name: String,
    /// Where the parameter is bound.
    pub location: ParamLocation,
    /// Whether the invocation fails when the parameter is absent.
    pub required: bool,
    /// Declared datatype — a primitive name or a model name.
    pub data_type: String,
    /// Human-readable description from the document.
    pub description: Option<String>,
}

/// What an operation returns, per the description.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResponseKind {
    /// No body expected.
    Void,
    /// A primitive value (`string`, `boolean`, `binary`, …).
    Primitive(String),
    /// A single named model.
    Model(String),
    /// `List[X]` — an ordered sequence of model `X`.
    ListOf(String),
}

impl ResponseKind {
    fn parse(response_class: Option<&str>) -> Self {
        match response_class {
            None | Some("void") => ResponseKind::Void,
            Some(s) => {
                if let Some(inner) = s
                    .strip_prefix("List[")
                    .and_then(|rest| rest.strip_suffix(']'))
                {
                    return ResponseKind::ListOf(inner.to_string());
                }
                // Model names are capitalized; everything else is a primitive.
                if s.chars()
                    .next()
                    .is_some_and(|c| c.is_ascii_uppercase())
                {
                    ResponseKind::Model(s.to_string())
                } else {
                    ResponseKind::Primitive(s.to_string())
                }
            }
        }
    }
}

/// One REST operation synthesized from the description.
#[derive(Debug, Clone)]
pub struct OperationSpec {
    /// Operation nickname, e.g. `originate`.
    pub name: String,
    /// HTTP method.
    pub method: reqwest::Method,
    /// Path template with `{placeholders}`, e.g. `/channels/{channelId}/play`.
    pub path: String,
    /// Parameters in declaration order.
    pub parameters: Vec<ParamSpec>,
    /// Response typing.
    pub response: ResponseKind,
}

impl OperationSpec {
    /// Whether the operation declares a parameter with this name (any location).
    pub fn has_parameter(&self, name: &str) -> bool {
        self.parameters
            .iter()
            .any(|p| p.name == name)
    }
}

/// All operations of one resource class.
#[derive(Debug, Clone)]
pub struct ResourceSchema {
    name: String,
    operations: Vec<OperationSpec>,
}

impl ResourceSchema {
    /// Resource name, e.g. `channels`.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Look up an operation by nickname.
    pub fn operation(&self, name: &str) -> Option<&OperationSpec> {
        self.operations
            .iter()
            .find(|op| op.name == name)
    }

    /// Operation nicknames in declaration order.
    pub fn operation_names(&self) -> Vec<&str> {
        self.operations
            .iter()
            .map(|op| op.name.as_str())
            .collect()
    }
}

/// One property of an event model.
#[derive(Debug, Clone)]
pub struct EventProperty {
    /// Property name on the event frame.
    pub name: String,
    /// Declared datatype.
    pub data_type: String,
}

impl EventProperty {
    /// The resource type this property promotes to, if its datatype names
    /// a known resource model.
    pub fn promotes_to(&self) -> Option<ResourceType> {
        ResourceType::from_model_name(&self.data_type)
    }
}

/// One event model from the events document.
#[derive(Debug, Clone)]
pub struct EventModel {
    /// Event name, matching the `type` field of frames.
    pub name: String,
    /// Properties in declaration order.
    pub properties: Vec<EventProperty>,
}

/// The fully loaded API description.
#[derive(Debug, Clone)]
pub struct ApiSchema {
    api_version: Option<String>,
    resources: HashMap<String, ResourceSchema>,
    events: HashMap<String, EventModel>,
}

impl ApiSchema {
    /// Server-reported API version, when present in the root listing.
    pub fn api_version(&self) -> Option<&str> {
        self.api_version
            .as_deref()
    }

    /// Look up a resource class by name (`channels`, `bridges`, …).
    pub fn resource(&self, name: &str) -> Option<&ResourceSchema> {
        self.resources
            .get(name)
    }

    /// All resource names, sorted.
    pub fn resource_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self
            .resources
            .keys()
            .map(|s| s.as_str())
            .collect();
        names.sort_unstable();
        names
    }

    /// Look up an event model by event name.
    pub fn event_model(&self, name: &str) -> Option<&EventModel> {
        self.events
            .get(name)
    }

    /// Fetch the root listing and every referenced per-resource document,
    /// then derive the operation and event tables.
    pub(crate) async fn load(
        http: &reqwest::Client,
        base: &Url,
        username: &str,
        password: &str,
    ) -> AriResult<ApiSchema> {
        let root = api_docs_url(base, "resources.json")?;
        let listing: ResourceListing = fetch_json(http, root, username, password).await?;

        let mut documents = Vec::with_capacity(listing.apis.len());
        for api in &listing.apis {
            let file = api
                .path
                .rsplit('/')
                .next()
                .unwrap_or(api.path.as_str())
                .replace("{format}", "json");
            let name = file
                .trim_end_matches(".json")
                .to_string();
            let url = api_docs_url(base, &file)?;
            let doc: ApiDeclaration = fetch_json(http, url, username, password).await?;
            documents.push((name, doc));
        }

        Self::from_documents(listing.api_version, documents)
    }

    /// Build the schema from already-parsed documents. Split out so tests
    /// can construct a schema without a server.
    pub(crate) fn from_documents(
        api_version: Option<String>,
        documents: Vec<(String, ApiDeclaration)>,
    ) -> AriResult<ApiSchema> {
        let mut resources = HashMap::new();
        let mut events = HashMap::new();

        for (name, doc) in documents {
            if name == "events" {
                for (model_name, model) in &doc.models {
                    events.insert(model_name.clone(), event_model(model_name, model));
                }
            }

            let mut operations = Vec::new();
            for endpoint in &doc.apis {
                for op in &endpoint.operations {
                    operations.push(operation_spec(&name, endpoint, op)?);
                }
            }
            debug!(
                resource = name.as_str(),
                operations = operations.len(),
                "loaded resource description"
            );
            resources.insert(
                name.clone(),
                ResourceSchema { name, operations },
            );
        }

        Ok(ApiSchema {
            api_version,
            resources,
            events,
        })
    }
}

fn operation_spec(
    resource: &str,
    endpoint: &ApiEndpoint,
    op: &OperationDoc,
) -> AriResult<OperationSpec> {
    let method = reqwest::Method::from_bytes(op.http_method.as_bytes()).map_err(|_| {
        AriError::api_load(format!(
            "operation {}.{} has invalid HTTP method {:?}",
            resource, op.nickname, op.http_method
        ))
    })?;

    let mut parameters = Vec::with_capacity(op.parameters.len());
    for param in &op.parameters {
        let Some(location) = ParamLocation::parse(&param.param_type) else {
            // Unknown binding location: the operation cannot be built safely.
            return Err(AriError::api_load(format!(
                "operation {}.{} parameter {:?} has unknown paramType {:?}",
                resource, op.nickname, param.name, param.param_type
            )));
        };
        parameters.push(ParamSpec {
            name: param.name.clone(),
            location,
            required: param.required,
            data_type: param
                .data_type
                .clone()
                .unwrap_or_else(|| "string".to_string()),
            description: param.description.clone(),
        });
    }

    Ok(OperationSpec {
        name: op.nickname.clone(),
        method,
        path: endpoint.path.clone(),
        parameters,
        response: ResponseKind::parse(op.response_class.as_deref()),
    })
}

fn event_model(name: &str, model: &Value) -> EventModel {
    let mut properties = Vec::new();
    if let Some(props) = model
        .get("properties")
        .and_then(Value::as_object)
    {
        for (prop_name, prop) in props {
            let data_type = prop
                .get("type")
                .and_then(Value::as_str)
                .unwrap_or("object")
                .to_string();
            properties.push(EventProperty {
                name: prop_name.clone(),
                data_type,
            });
        }
    }
    EventModel {
        name: name.to_string(),
        properties,
    }
}

fn api_docs_url(base: &Url, file: &str) -> AriResult<Url> {
    base.join(&format!("{}/{}", API_DOCS_PREFIX, file))
        .map_err(AriError::from)
}

async fn fetch_json<T: DeserializeOwned>(
    http: &reqwest::Client,
    url: Url,
    username: &str,
    password: &str,
) -> AriResult<T> {
    debug!("GET {}", url);

    let resp = http
        .get(url.clone())
        .basic_auth(username, Some(password))
        .send()
        .await
        .map_err(AriError::transport)?;

    let status = resp.status();
    if !status.is_success() {
        return Err(AriError::api_load(format!(
            "{} returned HTTP {}",
            url, status
        )));
    }

    resp.json::<T>()
        .await
        .map_err(|e| AriError::api_load(format!("invalid API description at {}: {}", url, e)))
}

// ── Test fixture ─────────────────────────────────────────────────────

/// A reduced but structurally faithful description set, shared by unit
/// tests across the crate.
#[cfg(test)]
pub(crate) mod fixture {
    use super::*;

    pub(crate) const CHANNELS_JSON: &str = r#"{
        "apis": [
            {
                "path": "/channels",
                "operations": [
                    {
                        "httpMethod": "GET",
                        "nickname": "list",
                        "responseClass": "List[Channel]",
                        "parameters": []
                    },
                    {
                        "httpMethod": "POST",
                        "nickname": "originate",
                        "responseClass": "Channel",
                        "parameters": [
                            {"name": "endpoint", "paramType": "query", "required": true, "dataType": "string"},
                            {"name": "app", "paramType": "query", "required": false, "dataType": "string"},
                            {"name": "appArgs", "paramType": "query", "required": false, "dataType": "string"},
                            {"name": "channelId", "paramType": "query", "required": false, "dataType": "string"},
                            {"name": "variables", "paramType": "body", "required": false, "dataType": "containers"}
                        ]
                    }
                ]
            },
            {
                "path": "/channels/{channelId}",
                "operations": [
                    {
                        "httpMethod": "GET",
                        "nickname": "get",
                        "responseClass": "Channel",
                        "parameters": [
                            {"name": "channelId", "paramType": "path", "required": true, "dataType": "string"}
                        ]
                    },
                    {
                        "httpMethod": "DELETE",
                        "nickname": "hangup",
                        "responseClass": "void",
                        "parameters": [
                            {"name": "channelId", "paramType": "path", "required": true, "dataType": "string"},
                            {"name": "reason", "paramType": "query", "required": false, "dataType": "string"}
                        ]
                    }
                ]
            },
            {
                "path": "/channels/{channelId}/answer",
                "operations": [
                    {
                        "httpMethod": "POST",
                        "nickname": "answer",
                        "responseClass": "void",
                        "parameters": [
                            {"name": "channelId", "paramType": "path", "required": true, "dataType": "string"}
                        ]
                    }
                ]
            },
            {
                "path": "/channels/{channelId}/play",
                "operations": [
                    {
                        "httpMethod": "POST",
                        "nickname": "play",
                        "responseClass": "Playback",
                        "parameters": [
                            {"name": "channelId", "paramType": "path", "required": true, "dataType": "string"},
                            {"name": "media", "paramType": "query", "required": true, "dataType": "string"},
                            {"name": "playbackId", "paramType": "query", "required": false, "dataType": "string"}
                        ]
                    }
                ]
            }
        ],
        "models": {
            "Channel": {
                "id": "Channel",
                "properties": {
                    "id": {"type": "string"},
                    "name": {"type": "string"},
                    "state": {"type": "string"}
                }
            }
        }
    }"#;

    pub(crate) const BRIDGES_JSON: &str = r#"{
        "apis": [
            {
                "path": "/bridges",
                "operations": [
                    {
                        "httpMethod": "GET",
                        "nickname": "list",
                        "responseClass": "List[Bridge]",
                        "parameters": []
                    },
                    {
                        "httpMethod": "POST",
                        "nickname": "create",
                        "responseClass": "Bridge",
                        "parameters": [
                            {"name": "type", "paramType": "query", "required": false, "dataType": "string"},
                            {"name": "bridgeId", "paramType": "query", "required": false, "dataType": "string"},
                            {"name": "name", "paramType": "query", "required": false, "dataType": "string"}
                        ]
                    }
                ]
            },
            {
                "path": "/bridges/{bridgeId}",
                "operations": [
                    {
                        "httpMethod": "GET",
                        "nickname": "get",
                        "responseClass": "Bridge",
                        "parameters": [
                            {"name": "bridgeId", "paramType": "path", "required": true, "dataType": "string"}
                        ]
                    }
                ]
            },
            {
                "path": "/bridges/{bridgeId}/addChannel",
                "operations": [
                    {
                        "httpMethod": "POST",
                        "nickname": "addChannel",
                        "responseClass": "void",
                        "parameters": [
                            {"name": "bridgeId", "paramType": "path", "required": true, "dataType": "string"},
                            {"name": "channel", "paramType": "query", "required": true, "dataType": "string"}
                        ]
                    }
                ]
            }
        ],
        "models": {
            "Bridge": {
                "id": "Bridge",
                "properties": {
                    "id": {"type": "string"},
                    "technology": {"type": "string"},
                    "bridge_type": {"type": "string"}
                }
            }
        }
    }"#;

    pub(crate) const EVENTS_JSON: &str = r#"{
        "apis": [
            {
                "path": "/events",
                "operations": [
                    {
                        "httpMethod": "GET",
                        "nickname": "eventWebsocket",
                        "responseClass": "Message",
                        "parameters": [
                            {"name": "app", "paramType": "query", "required": true, "dataType": "string"}
                        ]
                    }
                ]
            }
        ],
        "models": {
            "StasisStart": {
                "id": "StasisStart",
                "properties": {
                    "args": {"type": "List[string]"},
                    "channel": {"type": "Channel"},
                    "replace_channel": {"type": "Channel"}
                }
            },
            "StasisEnd": {
                "id": "StasisEnd",
                "properties": {
                    "channel": {"type": "Channel"}
                }
            },
            "ChannelDtmfReceived": {
                "id": "ChannelDtmfReceived",
                "properties": {
                    "digit": {"type": "string"},
                    "duration_ms": {"type": "int"},
                    "channel": {"type": "Channel"}
                }
            },
            "ChannelEnteredBridge": {
                "id": "ChannelEnteredBridge",
                "properties": {
                    "bridge": {"type": "Bridge"},
                    "channel": {"type": "Channel"}
                }
            },
            "BridgeDestroyed": {
                "id": "BridgeDestroyed",
                "properties": {
                    "bridge": {"type": "Bridge"}
                }
            },
            "PlaybackFinished": {
                "id": "PlaybackFinished",
                "properties": {
                    "playback": {"type": "Playback"}
                }
            },
            "RecordingFinished": {
                "id": "RecordingFinished",
                "properties": {
                    "recording": {"type": "LiveRecording"}
                }
            },
            "RecordingFailed": {
                "id": "RecordingFailed",
                "properties": {
                    "recording": {"type": "LiveRecording"}
                }
            }
        }
    }"#;

    pub(crate) fn schema() -> ApiSchema {
        let docs = vec![
            (
                "channels".to_string(),
                serde_json::from_str::<ApiDeclaration>(CHANNELS_JSON).unwrap(),
            ),
            (
                "bridges".to_string(),
                serde_json::from_str::<ApiDeclaration>(BRIDGES_JSON).unwrap(),
            ),
            (
                "events".to_string(),
                serde_json::from_str::<ApiDeclaration>(EVENTS_JSON).unwrap(),
            ),
        ];
        ApiSchema::from_documents(Some("2.0.0".to_string()), docs).unwrap()
    }
}
