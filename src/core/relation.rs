//! OSM relation download and parsing
//!
//! Fetches `/relation/{id}/full` from the OSM API and decodes the document
//! into route-geometry ways (members with the empty role) and stop nodes
//! (members with `stop*`/`platform*` roles), preserving document order.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use futures_util::TryStreamExt;
use once_cell::sync::Lazy;
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use reqwest::{Client, ClientBuilder};

use crate::core::error::{Error, Result};
use crate::core::geo::Coord;
use crate::core::stops::{Stop, StopRole};
use crate::core::wayset::Way;

/// Maximum number of retry attempts for network errors
const MAX_RETRY_ATTEMPTS: u32 = 3;

/// Base delay for exponential backoff (in milliseconds)
const BASE_RETRY_DELAY_MS: u64 = 1000;

/// Progress callback function type
pub type ProgressCallback = Arc<dyn Fn(u64, u64) + Send + Sync>;

/// Global HTTP client with keepalive tuned for the OSM API
static GLOBAL_CLIENT: Lazy<Client> = Lazy::new(|| {
    ClientBuilder::new()
        .tcp_keepalive(Duration::from_secs(60))
        .timeout(Duration::from_secs(30))
        .connect_timeout(Duration::from_secs(10))
        .user_agent(format!("linetrack/{}", env!("LINETRACK_VERSION")))
        .build()
        .unwrap_or_default()
});

/// Execute an operation with retry logic for network errors
async fn retry_on_network_error<F, Fut, T>(operation: F) -> Result<T>
where
    F: Fn() -> Fut,
    Fut: std::future::Future<Output = Result<T>>,
{
    let mut attempt = 0;

    loop {
        match operation().await {
            Ok(result) => return Ok(result),
            Err(Error::NetworkError(msg)) if attempt < MAX_RETRY_ATTEMPTS => {
                attempt += 1;
                let delay = BASE_RETRY_DELAY_MS * (1 << (attempt - 1));
                log::warn!(
                    "network error (attempt {}): {}. Retrying in {}ms...",
                    attempt,
                    msg,
                    delay
                );
                tokio::time::sleep(Duration::from_millis(delay)).await;
            }
            Err(e) => return Err(e),
        }
    }
}

/// Configuration for the relation source
#[derive(Debug, Clone)]
pub struct RelationConfig {
    /// Base URL of the OSM API
    pub api_base_url: String,
}

impl Default for RelationConfig {
    fn default() -> Self {
        RelationConfig {
            api_base_url: "https://api.openstreetmap.org/api/0.6".to_string(),
        }
    }
}

/// Downloads relation documents from the OSM API.
#[derive(Debug, Clone, Default)]
pub struct RelationSource {
    config: RelationConfig,
}

impl RelationSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: RelationConfig) -> Self {
        RelationSource { config }
    }

    /// Fetches the full relation document as XML text.
    pub async fn fetch(&self, relation_id: &str) -> Result<String> {
        self.fetch_with_progress(relation_id, None).await
    }

    /// Fetches the relation, reporting `(downloaded, total)` byte counts.
    pub async fn fetch_with_progress(
        &self,
        relation_id: &str,
        progress: Option<ProgressCallback>,
    ) -> Result<String> {
        let url = format!("{}/relation/{}/full", self.config.api_base_url, relation_id);
        log::info!("fetching relation {} from {}", relation_id, url);

        retry_on_network_error(|| async {
            let response = GLOBAL_CLIENT.get(&url).send().await?;
            let status = response.status();
            if !status.is_success() {
                if status == reqwest::StatusCode::NOT_FOUND {
                    return Err(Error::HttpError(format!(
                        "relation {} not found",
                        relation_id
                    )));
                }
                return Err(Error::HttpError(format!(
                    "failed to fetch relation {}: {}",
                    relation_id, status
                )));
            }

            let total = response.content_length().unwrap_or(0);
            let mut body: Vec<u8> = Vec::new();
            let mut stream = response.bytes_stream();
            while let Some(chunk) = stream.try_next().await? {
                body.extend_from_slice(&chunk);
                if let Some(ref progress) = progress {
                    progress(body.len() as u64, total.max(body.len() as u64));
                }
            }

            String::from_utf8(body)
                .map_err(|e| Error::ParseError(format!("relation document is not UTF-8: {}", e)))
        })
        .await
    }
}

/// Header tags of the relation, used for the artifact directory layout.
#[derive(Debug, Clone, Default)]
pub struct RelationMeta {
    pub relation_id: String,
    pub network: String,
    pub line_ref: String,
    pub from: String,
    pub to: String,
}

/// Everything extracted from one relation document.
#[derive(Debug, Clone)]
pub struct ParsedRelation {
    pub meta: RelationMeta,
    /// Route-geometry ways (empty member role), in document order
    pub ways: Vec<Way>,
    /// Stop nodes in relation member order
    pub stops: Vec<Stop>,
}

fn attr(element: &BytesStart<'_>, name: &[u8]) -> Result<Option<String>> {
    for attribute in element.attributes() {
        let attribute = attribute.map_err(|e| Error::ParseError(e.to_string()))?;
        if attribute.key.as_ref() == name {
            let value = attribute
                .unescape_value()
                .map_err(|e| Error::ParseError(e.to_string()))?;
            return Ok(Some(value.into_owned()));
        }
    }
    Ok(None)
}

#[derive(Debug)]
enum Context {
    None,
    Node(String),
    Way { id: String, refs: Vec<String> },
    Relation,
}

/// Parses a relation document.
///
/// Nodes with unparseable coordinates are skipped with a warning; a way is
/// kept only when at least two of its node refs resolve. Only `way` members
/// with the empty role contribute geometry; `node` members with stop roles
/// become stops.
pub fn parse_relation(xml: &str) -> Result<ParsedRelation> {
    let mut reader = Reader::from_str(xml);

    let mut nodes: HashMap<String, Coord> = HashMap::new();
    let mut node_names: HashMap<String, String> = HashMap::new();
    let mut way_defs: Vec<(String, Vec<String>)> = Vec::new();
    let mut way_roles: HashMap<String, String> = HashMap::new();
    let mut stop_members: Vec<(String, StopRole)> = Vec::new();
    let mut meta = RelationMeta::default();

    let mut context = Context::None;

    loop {
        let event = reader.read_event()?;
        let is_empty = matches!(&event, Event::Empty(_));
        match event {
            Event::Start(ref element) | Event::Empty(ref element) => {
                match element.name().as_ref() {
                    b"node" => {
                        let id = attr(element, b"id")?.unwrap_or_default();
                        let lat = attr(element, b"lat")?.and_then(|v| v.parse::<f64>().ok());
                        let lon = attr(element, b"lon")?.and_then(|v| v.parse::<f64>().ok());
                        match (lat, lon) {
                            (Some(lat), Some(lon)) => {
                                nodes.insert(id.clone(), Coord(lon, lat));
                            }
                            _ => {
                                log::warn!("node {} has unparseable coordinates, skipped", id);
                            }
                        }
                        if !is_empty {
                            context = Context::Node(id);
                        }
                    }
                    b"way" => {
                        let id = attr(element, b"id")?.unwrap_or_default();
                        if is_empty {
                            way_defs.push((id, Vec::new()));
                        } else {
                            context = Context::Way {
                                id,
                                refs: Vec::new(),
                            };
                        }
                    }
                    b"relation" => {
                        meta.relation_id = attr(element, b"id")?.unwrap_or_default();
                        if !is_empty {
                            context = Context::Relation;
                        }
                    }
                    b"nd" => {
                        if let Context::Way { refs, .. } = &mut context {
                            if let Some(node_ref) = attr(element, b"ref")? {
                                refs.push(node_ref);
                            }
                        }
                    }
                    b"tag" => {
                        let key = attr(element, b"k")?.unwrap_or_default();
                        let value = attr(element, b"v")?.unwrap_or_default();
                        match &context {
                            Context::Node(id) if key == "name" => {
                                node_names.insert(id.clone(), value);
                            }
                            Context::Relation => match key.as_str() {
                                "network" => meta.network = value,
                                "ref" => meta.line_ref = value,
                                "from" => meta.from = value,
                                "to" => meta.to = value,
                                _ => {}
                            },
                            _ => {}
                        }
                    }
                    b"member" => {
                        if matches!(context, Context::Relation) {
                            let member_type = attr(element, b"type")?.unwrap_or_default();
                            let member_ref = attr(element, b"ref")?.unwrap_or_default();
                            let role = attr(element, b"role")?.unwrap_or_default();
                            match member_type.as_str() {
                                "way" => {
                                    way_roles.insert(member_ref, role);
                                }
                                "node" => {
                                    if let Some(stop_role) = StopRole::from_osm(&role) {
                                        stop_members.push((member_ref, stop_role));
                                    }
                                }
                                _ => {}
                            }
                        }
                    }
                    _ => {}
                }
            }
            Event::End(ref element) => match element.name().as_ref() {
                b"node" | b"relation" => context = Context::None,
                b"way" => {
                    if let Context::Way { id, refs } =
                        std::mem::replace(&mut context, Context::None)
                    {
                        way_defs.push((id, refs));
                    }
                }
                _ => {}
            },
            Event::Eof => break,
            _ => {}
        }
    }

    // Geometry: document-order ways whose member role is the empty string
    let mut ways = Vec::new();
    for (id, refs) in way_defs {
        if way_roles.get(&id).map(String::as_str) != Some("") {
            continue;
        }
        let mut node_ids = Vec::with_capacity(refs.len());
        let mut coords = Vec::with_capacity(refs.len());
        for node_ref in refs {
            if let Some(&coord) = nodes.get(&node_ref) {
                node_ids.push(node_ref);
                coords.push(coord);
            }
        }
        if coords.len() >= 2 {
            ways.push(Way::new(id, node_ids, coords));
        } else {
            log::warn!("way {} resolves to fewer than 2 nodes, skipped", id);
        }
    }

    // Stops, in member order
    let mut stops = Vec::new();
    for (node_ref, role) in stop_members {
        if let Some(&position) = nodes.get(&node_ref) {
            let mut stop = Stop::new(node_ref.clone(), role, position);
            stop.name = node_names.get(&node_ref).cloned();
            stops.push(stop);
        }
    }

    if ways.is_empty() {
        log::warn!(
            "relation {} has no way members with the empty role",
            meta.relation_id
        );
    }

    Ok(ParsedRelation { meta, ways, stops })
}
