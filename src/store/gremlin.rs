//! Remote graph store speaking Gremlin over HTTP.
//!
//! Scripts are posted as `{"gremlin": "..."}` to a Gremlin Server (or Neptune)
//! HTTP endpoint. Every traversal runs with `ReadOnlyStrategy` and a server
//! side evaluation timeout; closure expansion is sent as a single
//! `repeat/simplePath/emit` traversal.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use url::Url;

use crate::graph::{GraphStore, Vertex, VertexKey};
use crate::{RelmapError, Result};

/// Slack added to the HTTP timeout on top of the server evaluation timeout.
const HTTP_TIMEOUT_SLACK: Duration = Duration::from_secs(30);

/// Request body for the Gremlin HTTP endpoint
#[derive(Serialize)]
struct GremlinRequest<'a> {
    gremlin: &'a str,
}

/// Response envelope returned by the Gremlin HTTP endpoint
#[derive(Deserialize)]
struct GremlinResponse {
    status: GremlinStatus,
    #[serde(default)]
    result: Option<GremlinResult>,
}

#[derive(Deserialize)]
struct GremlinStatus {
    code: u16,
    #[serde(default)]
    message: String,
}

#[derive(Deserialize)]
struct GremlinResult {
    #[serde(default)]
    data: Value,
}

/// Gremlin HTTP client implementing [`GraphStore`].
pub struct GremlinHttpStore {
    client: Client,
    url: Url,
    eval_timeout: Duration,
}

impl GremlinHttpStore {
    /// Create a client for `url` with a per-query evaluation timeout.
    pub fn new(url: Url, eval_timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(eval_timeout + HTTP_TIMEOUT_SLACK)
            .build()?;

        Ok(Self::with_client(client, url, eval_timeout))
    }

    /// Use a preconfigured HTTP client (proxy, TLS or timeout settings).
    pub fn with_client(client: Client, url: Url, eval_timeout: Duration) -> Self {
        Self {
            client,
            url,
            eval_timeout,
        }
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    /// Round trip a trivial script to prove the endpoint is reachable.
    pub async fn ping(&self) -> Result<()> {
        self.submit("g.inject(1)").await.map(|_| ())
    }

    /// Traversal source shared by every query.
    fn source(&self) -> String {
        traversal_source(self.eval_timeout)
    }

    async fn submit(&self, script: &str) -> Result<Value> {
        log::trace!("Gremlin script: {}", script);

        let response = self
            .client
            .post(self.url.clone())
            .json(&GremlinRequest { gremlin: script })
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            return Err(RelmapError::Store(format!(
                "Gremlin endpoint returned HTTP {}: {}",
                status,
                preview(&body)
            )));
        }

        interpret_response(&body)
    }
}

#[async_trait]
impl GraphStore for GremlinHttpStore {
    async fn vertex(&self, key: &VertexKey) -> Result<Option<Vertex>> {
        let data = self.submit(&vertex_script(&self.source(), key)).await?;
        Ok(decode_vertices(data)?.into_iter().next())
    }

    async fn in_neighbors(&self, key: &VertexKey, kinds: &[&str]) -> Result<Vec<Vertex>> {
        if kinds.is_empty() {
            return Ok(Vec::new());
        }
        let data = self
            .submit(&in_neighbors_script(&self.source(), key, kinds))
            .await?;
        decode_vertices(data)
    }

    async fn expand(
        &self,
        root: &VertexKey,
        kinds: &[&str],
        target_label: &str,
    ) -> Result<Vec<VertexKey>> {
        if kinds.is_empty() {
            return Ok(Vec::new());
        }
        let data = self
            .submit(&expand_script(&self.source(), root, kinds, target_label))
            .await?;
        decode_keys(data)
    }
}

fn traversal_source(eval_timeout: Duration) -> String {
    format!(
        "g.withStrategies(ReadOnlyStrategy.instance())\
         .with('evaluationTimeout', {}L)\
         .withSideEffect('Neptune#repeatMode', 'CHUNKED_DFS')",
        eval_timeout.as_millis()
    )
}

/// Quote a value as a single-quoted Groovy string literal.
fn quote(value: &str) -> String {
    let mut out = String::with_capacity(value.len() + 2);
    out.push('\'');
    for c in value.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\'' => out.push_str("\\'"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            other => out.push(other),
        }
    }
    out.push('\'');
    out
}

fn quote_all(values: &[&str]) -> String {
    values.iter().map(|v| quote(v)).collect::<Vec<_>>().join(", ")
}

fn vertex_script(source: &str, key: &VertexKey) -> String {
    format!(
        "{}.V({}).project('id', 'label').by(T.id).by(T.label)",
        source,
        quote(key.as_str())
    )
}

fn in_neighbors_script(source: &str, key: &VertexKey, kinds: &[&str]) -> String {
    format!(
        "{}.V({}).in({}).project('id', 'label').by(T.id).by(T.label)",
        source,
        quote(key.as_str()),
        quote_all(kinds)
    )
}

fn expand_script(source: &str, root: &VertexKey, kinds: &[&str], target_label: &str) -> String {
    format!(
        "{}.V({}).repeat(__.in({}).simplePath()).emit(__.hasLabel({})).id()",
        source,
        quote(root.as_str()),
        quote_all(kinds),
        quote(target_label)
    )
}

fn preview(body: &str) -> String {
    const MAX: usize = 300;
    if body.chars().count() <= MAX {
        body.to_string()
    } else {
        let head: String = body.chars().take(MAX).collect();
        format!("{}...", head)
    }
}

/// Check the Gremlin status envelope and return the decoded result data.
fn interpret_response(body: &str) -> Result<Value> {
    let response: GremlinResponse = serde_json::from_str(body)
        .map_err(|e| RelmapError::Store(format!("Invalid Gremlin response: {}", e)))?;

    match response.status.code {
        200 => Ok(response
            .result
            .map(|r| decode_graphson(r.data))
            .unwrap_or(Value::Array(Vec::new()))),
        204 => Ok(Value::Array(Vec::new())),
        code => Err(RelmapError::Store(format!(
            "Gremlin evaluation failed ({}): {}",
            code, response.status.message
        ))),
    }
}

/// Strip GraphSON type wrappers, turning lists, sets and maps into plain JSON.
fn decode_graphson(value: Value) -> Value {
    match value {
        Value::Object(mut map) if map.contains_key("@type") && map.contains_key("@value") => {
            let type_name = map
                .remove("@type")
                .and_then(|t| t.as_str().map(str::to_string))
                .unwrap_or_default();
            let inner = map.remove("@value").unwrap_or(Value::Null);
            match (type_name.as_str(), inner) {
                ("g:List" | "g:Set", Value::Array(items)) => {
                    Value::Array(items.into_iter().map(decode_graphson).collect())
                }
                ("g:BulkSet", Value::Array(items)) => {
                    let mut out = Vec::new();
                    let mut pairs = items.into_iter();
                    while let (Some(item), Some(bulk)) = (pairs.next(), pairs.next()) {
                        let item = decode_graphson(item);
                        let bulk = decode_graphson(bulk).as_u64().unwrap_or(1);
                        for _ in 0..bulk {
                            out.push(item.clone());
                        }
                    }
                    Value::Array(out)
                }
                ("g:Map", Value::Array(items)) => {
                    let mut out = Map::new();
                    let mut pairs = items.into_iter();
                    while let (Some(k), Some(v)) = (pairs.next(), pairs.next()) {
                        let k = match decode_graphson(k) {
                            Value::String(s) => s,
                            other => other.to_string(),
                        };
                        out.insert(k, decode_graphson(v));
                    }
                    Value::Object(out)
                }
                (_, inner) => decode_graphson(inner),
            }
        }
        Value::Object(map) => Value::Object(
            map.into_iter()
                .map(|(k, v)| (k, decode_graphson(v)))
                .collect(),
        ),
        Value::Array(items) => Value::Array(items.into_iter().map(decode_graphson).collect()),
        other => other,
    }
}

fn scalar_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn as_list(data: Value) -> Result<Vec<Value>> {
    match data {
        Value::Array(items) => Ok(items),
        Value::Null => Ok(Vec::new()),
        other => Err(RelmapError::Store(format!(
            "Expected a list result, got: {}",
            preview(&other.to_string())
        ))),
    }
}

fn decode_keys(data: Value) -> Result<Vec<VertexKey>> {
    as_list(data)?
        .iter()
        .map(|item| {
            scalar_string(item).map(VertexKey::from_raw).ok_or_else(|| {
                RelmapError::Store(format!("Unexpected vertex id in result: {}", item))
            })
        })
        .collect()
}

fn decode_vertices(data: Value) -> Result<Vec<Vertex>> {
    as_list(data)?
        .iter()
        .map(|item| {
            let id = item.get("id").and_then(scalar_string);
            let label = item.get("label").and_then(scalar_string);
            match (id, label) {
                (Some(id), Some(label)) => Ok(Vertex {
                    key: VertexKey::from_raw(id),
                    label,
                }),
                _ => Err(RelmapError::Store(format!(
                    "Unexpected vertex projection in result: {}",
                    item
                ))),
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    #[test]
    fn test_quote_escapes_groovy_string() {
        assert_eq!(quote("plain"), "'plain'");
        assert_eq!(quote("it's"), "'it\\'s'");
        assert_eq!(quote("a\\b"), "'a\\\\b'");
        // `$` needs no escaping inside single-quoted Groovy strings
        assert_eq!(quote("aws__account$$1"), "'aws__account$$1'");
    }

    #[test]
    fn test_expand_script_shape() {
        let source = traversal_source(Duration::from_secs(60));
        assert!(source.contains("ReadOnlyStrategy"));
        assert!(source.contains("'evaluationTimeout', 60000L"));

        let root = VertexKey::new("cwb__aws__customer", "c_x");
        let script = expand_script(
            "g",
            &root,
            &["aws__has_sfid", "cwb__aws__has_customer"],
            "aws__account",
        );
        assert_eq!(
            script,
            "g.V('cwb__aws__customer$$c_x')\
             .repeat(__.in('aws__has_sfid', 'cwb__aws__has_customer').simplePath())\
             .emit(__.hasLabel('aws__account')).id()"
        );
    }

    #[test]
    fn test_neighbor_scripts_project_id_and_label() {
        let key = VertexKey::new("aws__sfid", "sf_1");
        assert_eq!(
            vertex_script("g", &key),
            "g.V('aws__sfid$$sf_1').project('id', 'label').by(T.id).by(T.label)"
        );
        assert!(in_neighbors_script("g", &key, &["aws__has_sfid"])
            .contains(".in('aws__has_sfid').project("));
    }

    #[test]
    fn test_decode_graphson_typed_list_and_map() {
        let data = json!({
            "@type": "g:List",
            "@value": [
                {"@type": "g:Map", "@value": ["id", "aws__account$$a1", "label", "aws__account"]},
                {"@type": "g:Map", "@value": ["id", "aws__account$$a2", "label", "aws__account"]}
            ]
        });
        let vertices = decode_vertices(decode_graphson(data)).unwrap();
        assert_eq!(vertices.len(), 2);
        assert_eq!(vertices[1].key.as_str(), "aws__account$$a2");
        assert_eq!(vertices[1].label, "aws__account");
    }

    #[test]
    fn test_decode_graphson_bulkset_expands_bulk() {
        let data = json!({
            "@type": "g:BulkSet",
            "@value": ["aws__account$$a1", {"@type": "g:Int64", "@value": 2}, "aws__account$$a2", {"@type": "g:Int64", "@value": 1}]
        });
        let keys = decode_keys(decode_graphson(data)).unwrap();
        let keys: Vec<&str> = keys.iter().map(|k| k.as_str()).collect();
        assert_eq!(keys, vec!["aws__account$$a1", "aws__account$$a1", "aws__account$$a2"]);
    }

    #[test]
    fn test_decode_plain_json_list() {
        let keys = decode_keys(json!(["aws__account$$a1", 42])).unwrap();
        assert_eq!(keys[0].as_str(), "aws__account$$a1");
        assert_eq!(keys[1].as_str(), "42");
        assert!(decode_keys(json!({"not": "a list"})).is_err());
        assert!(decode_keys(json!([{"nested": true}])).is_err());
    }

    #[test]
    fn test_interpret_response_statuses() {
        let ok = r#"{"requestId":"x","status":{"code":200,"message":""},"result":{"data":{"@type":"g:List","@value":["a$$b"]},"meta":{}}}"#;
        assert_eq!(interpret_response(ok).unwrap(), json!(["a$$b"]));

        let empty = r#"{"status":{"code":204,"message":""},"result":{"data":null}}"#;
        assert_eq!(interpret_response(empty).unwrap(), json!([]));

        let failed = r#"{"status":{"code":598,"message":"A timeout occurred"}}"#;
        let err = interpret_response(failed).unwrap_err();
        assert!(matches!(err, RelmapError::Store(ref m) if m.contains("timeout")));

        assert!(interpret_response("not json").is_err());
    }

    /// Client that never routes loopback test traffic through an environment proxy.
    fn direct_client() -> Client {
        Client::builder()
            .no_proxy()
            .timeout(Duration::from_secs(10))
            .build()
            .unwrap()
    }

    #[test]
    fn test_new_builds_client() {
        let url = Url::parse("https://neptune.example:8182/gremlin").unwrap();
        let store = GremlinHttpStore::new(url, Duration::from_secs(60)).unwrap();
        assert_eq!(store.url().port(), Some(8182));
    }

    /// Serve exactly one HTTP request with `body`, returning the request body received.
    async fn serve_once(body: &'static str) -> (Url, tokio::task::JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let handle = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = Vec::new();
            let mut chunk = [0u8; 4096];
            let (header_end, content_length) = loop {
                let n = socket.read(&mut chunk).await.unwrap();
                assert!(n > 0, "client closed before sending headers");
                buf.extend_from_slice(&chunk[..n]);
                if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
                    let headers = String::from_utf8_lossy(&buf[..pos]).to_lowercase();
                    let length = headers
                        .lines()
                        .find_map(|l| l.strip_prefix("content-length:"))
                        .map(|v| v.trim().parse::<usize>().unwrap())
                        .unwrap_or(0);
                    break (pos + 4, length);
                }
            };
            while buf.len() < header_end + content_length {
                let n = socket.read(&mut chunk).await.unwrap();
                if n == 0 {
                    break;
                }
                buf.extend_from_slice(&chunk[..n]);
            }
            let response = format!(
                "HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                body.len(),
                body
            );
            socket.write_all(response.as_bytes()).await.unwrap();
            socket.shutdown().await.unwrap();
            String::from_utf8_lossy(&buf[header_end..]).to_string()
        });
        let url = Url::parse(&format!("http://{}/gremlin", addr)).unwrap();
        (url, handle)
    }

    #[tokio::test]
    async fn test_expand_round_trip_against_fake_server() {
        let (url, handle) = serve_once(
            r#"{"status":{"code":200,"message":""},"result":{"data":{"@type":"g:List","@value":["aws__account$$a3","aws__account$$a4"]}}}"#,
        )
        .await;
        let store = GremlinHttpStore::with_client(direct_client(), url, Duration::from_secs(5));

        let keys = store
            .expand(
                &VertexKey::new("aws__sfid", "sf_a"),
                &["aws__has_sfid"],
                "aws__account",
            )
            .await
            .unwrap();
        assert_eq!(keys.len(), 2);
        assert_eq!(keys[0].local_id().unwrap(), "a3");

        let request: Value = serde_json::from_str(&handle.await.unwrap()).unwrap();
        let script = request["gremlin"].as_str().unwrap();
        assert!(script.contains(".V('aws__sfid$$sf_a').repeat(__.in('aws__has_sfid').simplePath())"));
        assert!(script.contains("'evaluationTimeout', 5000L"));
    }

    #[tokio::test]
    async fn test_ping_unreachable_endpoint_fails() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let url = Url::parse(&format!("http://{}/gremlin", addr)).unwrap();
        let store = GremlinHttpStore::with_client(direct_client(), url, Duration::from_secs(1));
        let err = store.ping().await.unwrap_err();
        assert!(matches!(err, RelmapError::Http(_)));
    }
}
