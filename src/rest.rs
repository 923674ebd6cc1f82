//! HTTP operation engine: request preparation, dispatch, response typing.
//!
//! Request preparation is pure — given an [`OperationSpec`] and the caller's
//! options it produces the method, URL, and body without touching the
//! network, so every binding rule is unit-testable. [`invoke_bound`] adds
//! the instance identity injection used by [`ResourceHandle`].

use std::sync::Arc;

use percent_encoding::{utf8_percent_encode, AsciiSet, CONTROLS};
use serde_json::Value;
use tracing::debug;
use url::Url;

use crate::client::ClientInner;
use crate::constants::REST_PREFIX;
use crate::error::{AriError, AriResult};
use crate::resource::{ResourceHandle, ResourceType};
use crate::schema::{OperationSpec, ParamLocation, ResponseKind};

/// Characters escaped when substituting a value into a path segment.
const PATH_SEGMENT: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'#')
    .add(b'<')
    .add(b'>')
    .add(b'?')
    .add(b'`')
    .add(b'{')
    .add(b'}')
    .add(b'/')
    .add(b'%')
    .add(b'\\');

/// The result of a REST operation, typed per the API description.
#[derive(Debug, Clone)]
pub enum OperationOutcome {
    /// The operation returns nothing (or an empty body).
    Empty,
    /// A primitive or unmodeled JSON value.
    Json(Value),
    /// A single instance of a known resource model.
    Instance(ResourceHandle),
    /// An ordered sequence of instances of a known resource model.
    Instances(Vec<ResourceHandle>),
}

impl OperationOutcome {
    /// `true` when the operation produced no value.
    pub fn is_empty(&self) -> bool {
        matches!(self, OperationOutcome::Empty)
    }

    /// The raw JSON value, when the response was not a known model.
    pub fn json(&self) -> Option<&Value> {
        match self {
            OperationOutcome::Json(value) => Some(value),
            _ => None,
        }
    }

    /// The single promoted instance, if any.
    pub fn instance(&self) -> Option<&ResourceHandle> {
        match self {
            OperationOutcome::Instance(handle) => Some(handle),
            _ => None,
        }
    }

    /// Consume into the single promoted instance, if any.
    pub fn into_instance(self) -> Option<ResourceHandle> {
        match self {
            OperationOutcome::Instance(handle) => Some(handle),
            _ => None,
        }
    }

    /// The promoted instance list, if any.
    pub fn instances(&self) -> Option<&[ResourceHandle]> {
        match self {
            OperationOutcome::Instances(handles) => Some(handles),
            _ => None,
        }
    }

    /// Consume into the promoted instance list, if any.
    pub fn into_instances(self) -> Option<Vec<ResourceHandle>> {
        match self {
            OperationOutcome::Instances(handles) => Some(handles),
            _ => None,
        }
    }
}

/// A fully built request, ready to send.
#[derive(Debug)]
pub(crate) struct PreparedRequest {
    pub(crate) method: reqwest::Method,
    pub(crate) url: Url,
    pub(crate) headers: Vec<(String, String)>,
    pub(crate) body: Option<Value>,
}

/// Reduce the caller's options to a parameter map.
///
/// Anything that is not a JSON object — absent, null, a sequence, a scalar —
/// counts as an empty option map. The caller's value is cloned, never
/// mutated.
pub(crate) fn normalize_options(options: &Value) -> serde_json::Map<String, Value> {
    match options.as_object() {
        Some(map) => map.clone(),
        None => serde_json::Map::new(),
    }
}

/// Copy the caller's options and bind the instance identity.
///
/// The bound parameter is injected only when the operation declares it, and
/// always after the copy — a caller-supplied value for it is overwritten.
pub(crate) fn bind_options(
    spec: &OperationSpec,
    options: &Value,
    bind: Option<(&str, &str)>,
) -> serde_json::Map<String, Value> {
    let mut opts = normalize_options(options);
    if let Some((param, value)) = bind {
        if spec.has_parameter(param) {
            opts.insert(param.to_string(), Value::String(value.to_string()));
        }
    }
    opts
}

/// Build the request for one operation invocation.
pub(crate) fn prepare(
    base: &Url,
    spec: &OperationSpec,
    options: &serde_json::Map<String, Value>,
) -> AriResult<PreparedRequest> {
    for param in &spec.parameters {
        let structurally_required = param.required || param.location == ParamLocation::Path;
        if structurally_required && !options.contains_key(&param.name) {
            return Err(AriError::MissingParam {
                name: param.name.clone(),
            });
        }
    }

    let mut path = format!("{}{}", REST_PREFIX, spec.path);
    for param in &spec.parameters {
        if param.location != ParamLocation::Path {
            continue;
        }
        if let Some(value) = options.get(&param.name) {
            let encoded =
                utf8_percent_encode(&stringify(value), PATH_SEGMENT).to_string();
            path = path.replace(&format!("{{{}}}", param.name), &encoded);
        }
    }
    if path.contains('{') {
        return Err(AriError::protocol(format!(
            "unresolved placeholder in path template {:?}",
            spec.path
        )));
    }

    let mut url = base.join(&path)?;
    {
        let mut query = url.query_pairs_mut();
        for param in &spec.parameters {
            if param.location != ParamLocation::Query {
                continue;
            }
            if let Some(value) = options.get(&param.name) {
                query.append_pair(&param.name, &stringify(value));
            }
        }
    }
    // An empty query string would otherwise leave a trailing '?'.
    if url.query() == Some("") {
        url.set_query(None);
    }

    let mut headers = Vec::new();
    let mut body = serde_json::Map::new();
    for param in &spec.parameters {
        let Some(value) = options.get(&param.name) else {
            continue;
        };
        match param.location {
            ParamLocation::Header => {
                headers.push((param.name.clone(), stringify(value)));
            }
            // Body parameters keep their JSON shape under their own name;
            // this is what turns a variables container into
            // `{"variables": {...}}` on the wire.
            ParamLocation::Body => {
                body.insert(param.name.clone(), value.clone());
            }
            ParamLocation::Path | ParamLocation::Query => {}
        }
    }

    Ok(PreparedRequest {
        method: spec.method.clone(),
        url,
        headers,
        body: if body.is_empty() {
            None
        } else {
            Some(Value::Object(body))
        },
    })
}

/// Render a parameter value the way the query string expects it.
///
/// Strings pass through, scalars use their JSON rendering, and arrays of
/// scalars are comma-joined (the description's list syntax).
fn stringify(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Array(items) => items
            .iter()
            .map(|item| match item {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            })
            .collect::<Vec<_>>()
            .join(","),
        other => other.to_string(),
    }
}

/// Invoke an operation on a resource namespace.
pub(crate) async fn invoke(
    client: &Arc<ClientInner>,
    resource: &str,
    operation: &str,
    options: &Value,
) -> AriResult<OperationOutcome> {
    invoke_with(client, resource, operation, options, None).await
}

/// Invoke an operation with an instance identity bound in.
pub(crate) async fn invoke_bound(
    client: &Arc<ClientInner>,
    kind: ResourceType,
    key: &str,
    operation: &str,
    options: &Value,
) -> AriResult<OperationOutcome> {
    let bind = kind
        .bound_parameter()
        .map(|param| (param, key));
    invoke_with(client, kind.resource_name(), operation, options, bind).await
}

async fn invoke_with(
    client: &Arc<ClientInner>,
    resource: &str,
    operation: &str,
    options: &Value,
    bind: Option<(&str, &str)>,
) -> AriResult<OperationOutcome> {
    let spec = client
        .schema
        .resource(resource)
        .ok_or_else(|| AriError::protocol(format!("unknown resource: {}", resource)))?
        .operation(operation)
        .ok_or_else(|| {
            AriError::protocol(format!("unknown operation: {}.{}", resource, operation))
        })?
        .clone();

    let options = bind_options(&spec, options, bind);
    let prepared = prepare(&client.conn.base_url, &spec, &options)?;
    debug!("{} {}", prepared.method, prepared.url);

    let mut request = client
        .http
        .request(prepared.method, prepared.url)
        .basic_auth(&client.conn.username, Some(&client.conn.password));
    for (name, value) in &prepared.headers {
        request = request.header(name.as_str(), value.as_str());
    }
    if let Some(body) = &prepared.body {
        request = request.json(body);
    }

    let response = request
        .send()
        .await
        .map_err(AriError::transport)?;

    let status = response.status();
    let text = response
        .text()
        .await
        .map_err(|e| AriError::protocol(format!("failed to read response body: {}", e)))?;

    if !status.is_success() {
        return Err(AriError::Operation {
            status: status.as_u16(),
            message: error_message(&text),
        });
    }

    decode(client, &spec.response, &text)
}

/// The server's cause string: the `message` field of the JSON error
/// envelope when present, otherwise the raw body verbatim.
fn error_message(body: &str) -> String {
    serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|value| {
            value
                .get("message")?
                .as_str()
                .map(String::from)
        })
        .unwrap_or_else(|| body.to_string())
}

/// Type a successful response body per the operation's declared response.
fn decode(
    client: &Arc<ClientInner>,
    response: &ResponseKind,
    body: &str,
) -> AriResult<OperationOutcome> {
    if body
        .trim()
        .is_empty()
    {
        return Ok(OperationOutcome::Empty);
    }

    match response {
        ResponseKind::Void => Ok(OperationOutcome::Empty),
        ResponseKind::Primitive(_) => {
            // Primitive bodies are usually JSON, but `binary` responses
            // (e.g. stored recording files) are passed through as a string.
            Ok(match serde_json::from_str(body) {
                Ok(value) => OperationOutcome::Json(value),
                Err(_) => OperationOutcome::Json(Value::String(body.to_string())),
            })
        }
        ResponseKind::Model(name) => {
            let value: Value = parse_body(body)?;
            Ok(match ResourceType::from_model_name(name) {
                Some(kind) => OperationOutcome::Instance(ResourceHandle::from_value(
                    client.clone(),
                    kind,
                    &value,
                )),
                None => OperationOutcome::Json(value),
            })
        }
        ResponseKind::ListOf(name) => {
            let value: Value = parse_body(body)?;
            let Some(kind) = ResourceType::from_model_name(name) else {
                return Ok(OperationOutcome::Json(value));
            };
            let items = value
                .as_array()
                .ok_or_else(|| {
                    AriError::protocol(format!("expected a List[{}] response array", name))
                })?;
            Ok(OperationOutcome::Instances(
                items
                    .iter()
                    .map(|item| ResourceHandle::from_value(client.clone(), kind, item))
                    .collect(),
            ))
        }
    }
}

fn parse_body(body: &str) -> AriResult<Value> {
    serde_json::from_str(body)
        .map_err(|e| AriError::protocol(format!("unparseable response body: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::fixture;
    use serde_json::json;

    fn base() -> Url {
        Url::parse("http://ari.local:8088").unwrap()
    }

    fn op(resource: &str, name: &str) -> OperationSpec {
        fixture::schema()
            .resource(resource)
            .unwrap()
            .operation(name)
            .unwrap()
            .clone()
    }

    fn query_pairs(url: &Url) -> Vec<(String, String)> {
        url.query_pairs()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn path_parameters_are_substituted_and_encoded() {
        let spec = op("channels", "get");
        let options = normalize_options(&json!({"channelId": "abc/def x"}));
        let prepared = prepare(&base(), &spec, &options).unwrap();

        assert_eq!(prepared.method, reqwest::Method::GET);
        assert_eq!(
            prepared.url.as_str(),
            "http://ari.local:8088/ari/channels/abc%2Fdef%20x"
        );
        assert!(prepared.body.is_none());
    }

    #[test]
    fn query_parameters_are_appended() {
        let spec = op("channels", "hangup");
        let options = normalize_options(&json!({"channelId": "c1", "reason": "busy"}));
        let prepared = prepare(&base(), &spec, &options).unwrap();

        assert_eq!(prepared.method, reqwest::Method::DELETE);
        assert_eq!(prepared.url.path(), "/ari/channels/c1");
        assert_eq!(
            query_pairs(&prepared.url),
            vec![("reason".to_string(), "busy".to_string())]
        );
    }

    #[test]
    fn bound_identity_lands_in_the_query() {
        // bridges.create declares bridgeId as a query parameter; binding an
        // instance identity must inject it there.
        let spec = op("bridges", "create");
        let options = bind_options(&spec, &json!({"type": "holding"}), Some(("bridgeId", "b-77")));
        let prepared = prepare(&base(), &spec, &options).unwrap();

        let pairs = query_pairs(&prepared.url);
        assert!(pairs.contains(&("type".to_string(), "holding".to_string())));
        assert!(pairs.contains(&("bridgeId".to_string(), "b-77".to_string())));
    }

    #[test]
    fn bound_identity_cannot_be_overridden_by_the_caller() {
        let spec = op("bridges", "create");
        let options = bind_options(
            &spec,
            &json!({"bridgeId": "spoofed"}),
            Some(("bridgeId", "b-77")),
        );
        assert_eq!(
            options
                .get("bridgeId")
                .and_then(Value::as_str),
            Some("b-77")
        );
    }

    #[test]
    fn binding_skips_operations_without_the_parameter() {
        // channels.answer has no channelId in the query, only in the path;
        // a bridge binding against it must not invent parameters.
        let spec = op("channels", "answer");
        let options = bind_options(&spec, &json!({"channelId": "c1"}), Some(("bridgeId", "b-1")));
        assert!(!options.contains_key("bridgeId"));
    }

    #[test]
    fn variables_container_keeps_its_json_shape_in_the_body() {
        let spec = op("channels", "originate");
        let options = normalize_options(&json!({
            "endpoint": "PJSIP/softphone",
            "app": "u",
            "variables": {"CALLERID(name)": "Alice"}
        }));
        let prepared = prepare(&base(), &spec, &options).unwrap();

        assert_eq!(
            prepared.body,
            Some(json!({"variables": {"CALLERID(name)": "Alice"}}))
        );
        let pairs = query_pairs(&prepared.url);
        assert!(pairs.contains(&("endpoint".to_string(), "PJSIP/softphone".to_string())));
        assert!(pairs.contains(&("app".to_string(), "u".to_string())));
    }

    #[test]
    fn missing_required_parameter_is_an_error() {
        let spec = op("channels", "originate");
        let options = normalize_options(&json!({"app": "u"}));
        let err = prepare(&base(), &spec, &options).unwrap_err();
        assert!(matches!(err, AriError::MissingParam { ref name } if name == "endpoint"));
    }

    #[test]
    fn missing_path_parameter_is_an_error_even_when_not_flagged_required() {
        let spec = op("channels", "get");
        let err = prepare(&base(), &spec, &serde_json::Map::new()).unwrap_err();
        assert!(matches!(err, AriError::MissingParam { ref name } if name == "channelId"));
    }

    #[test]
    fn non_object_options_count_as_empty() {
        assert!(normalize_options(&Value::Null).is_empty());
        assert!(normalize_options(&json!(["a", "b"])).is_empty());
        assert!(normalize_options(&json!("scalar")).is_empty());
        assert!(normalize_options(&json!(42)).is_empty());
    }

    #[test]
    fn caller_options_are_not_mutated_by_binding() {
        let spec = op("bridges", "create");
        let caller = json!({"type": "holding", "name": "lobby"});
        let before = caller.clone();
        let _ = bind_options(&spec, &caller, Some(("bridgeId", "b-1")));
        assert_eq!(caller, before);
    }

    #[test]
    fn scalar_and_array_values_stringify_for_the_query() {
        assert_eq!(stringify(&json!("s")), "s");
        assert_eq!(stringify(&json!(30)), "30");
        assert_eq!(stringify(&json!(true)), "true");
        assert_eq!(stringify(&json!(["a", "b", "c"])), "a,b,c");
        assert_eq!(stringify(&json!([1, 2])), "1,2");
    }

    #[test]
    fn error_message_prefers_the_json_envelope() {
        assert_eq!(
            error_message(r#"{"message":"Bridge not found"}"#),
            "Bridge not found"
        );
        assert_eq!(error_message("plain failure text"), "plain failure text");
        assert_eq!(error_message(r#"{"detail":"other"}"#), r#"{"detail":"other"}"#);
    }

    #[test]
    fn operations_without_query_values_leave_a_clean_url() {
        let spec = op("channels", "list");
        let prepared = prepare(&base(), &spec, &serde_json::Map::new()).unwrap();
        assert_eq!(prepared.url.as_str(), "http://ari.local:8088/ari/channels");
    }
}
