//! Application core: route decoded requests against the catalog and stream
//! replies.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, warn};

use bananas_index::{ContentEntry, VersionTuple, parse_version_tuple};
use bananas_protocol::{
    ClientRequest, ContentType, MAX_CONTENT_CHUNK, VersionInfo, encode_content_chunk,
    encode_content_header, encode_content_terminator,
};

use crate::connection::{Peer, ReplySink};
use crate::error::ConnectionError;
use crate::server::AppState;

/// Handle one decoded request; replies go through the sink in order.
pub(crate) async fn handle_request(
    state: &AppState,
    peer: Peer,
    request: ClientRequest,
    sink: &ReplySink,
) -> Result<(), ConnectionError> {
    match request {
        ClientRequest::InfoList {
            content_type,
            version,
        } => handle_info_list(state, peer, content_type, &version, sink).await,
        ClientRequest::InfoId { content_ids } => {
            let catalog = state.catalog();
            for content_id in content_ids {
                if let Some(entry) = catalog.by_content_id(content_id) {
                    send_entry(state, sink, entry).await?;
                }
            }
            Ok(())
        }
        ClientRequest::InfoExtid { entries } => {
            let catalog = state.catalog();
            for requested in entries {
                if let Some(entry) =
                    catalog.by_unique_id(requested.content_type, requested.unique_id)
                {
                    send_entry(state, sink, entry).await?;
                }
            }
            Ok(())
        }
        ClientRequest::InfoExtidMd5 { entries } => {
            let catalog = state.catalog();
            for requested in entries {
                if let Some(entry) = catalog.by_unique_id_and_md5sum(
                    requested.content_type,
                    requested.unique_id,
                    requested.md5sum,
                ) {
                    send_entry(state, sink, entry).await?;
                }
            }
            Ok(())
        }
        ClientRequest::Content { content_ids } => handle_content(state, content_ids, sink).await,
    }
}

async fn handle_info_list(
    state: &AppState,
    peer: Peer,
    content_type: ContentType,
    version: &VersionInfo,
    sink: &ReplySink,
) -> Result<(), ConnectionError> {
    let Some(branch_versions) = decode_branch_versions(version) else {
        warn!("Refusing listing for {peer}: non-numeric branch version in {version:?}");
        return Ok(());
    };

    let label = version_label(&branch_versions);
    if state.version_stats().record(peer.ip, &label) {
        state
            .metrics()
            .listing_clients
            .with_label_values(&[label.as_str()])
            .inc();
    }

    let catalog = state.catalog();

    // During the client's bootstrap the configured base graphics entry is
    // served first so a bare client can render anything at all.
    let mut bootstrap_sent = None;
    if content_type == ContentType::BaseGraphics
        && let Some(bootstrap_id) = state.bootstrap_unique_id()
        && let Some(entry) = catalog.by_unique_id(content_type, bootstrap_id)
    {
        send_entry(state, sink, entry).await?;
        bootstrap_sent = Some(entry.content_id);
    }

    for entry in catalog.by_content_type(content_type) {
        if bootstrap_sent == Some(entry.content_id) {
            continue;
        }
        if entry.matches_versions(&branch_versions) {
            send_entry(state, sink, entry).await?;
        }
    }
    Ok(())
}

async fn handle_content(
    state: &AppState,
    content_ids: Vec<u32>,
    sink: &ReplySink,
) -> Result<(), ConnectionError> {
    let catalog = state.catalog();
    for content_id in content_ids {
        let Some(entry) = catalog.by_content_id(content_id) else {
            debug!("Download request for unknown content id {content_id}");
            continue;
        };

        state.metrics().downloads.inc();
        if let Err(err) = stream_entry(state, entry, sink).await {
            state.metrics().download_failures.inc();
            return Err(err);
        }
    }
    Ok(())
}

/// Send the header frame, the file data in MTU-sized frames, then the
/// empty terminator.
async fn stream_entry(
    state: &AppState,
    entry: &Arc<ContentEntry>,
    sink: &ReplySink,
) -> Result<(), ConnectionError> {
    let mut stream = state
        .storage()
        .get_stream(entry.content_type, entry.unique_id, entry.md5sum)
        .await?;

    let filename = format!("{} - {}", entry.name, entry.version);
    let header = encode_content_header(
        entry.content_type,
        entry.content_id,
        entry.filesize,
        &filename,
    )?;
    sink.send(header).await?;

    while !stream.eof() {
        let chunk = stream.read(MAX_CONTENT_CHUNK).await?;
        sink.send(encode_content_chunk(&chunk)?).await?;
    }

    sink.send(encode_content_terminator()?).await
}

async fn send_entry(
    state: &AppState,
    sink: &ReplySink,
    entry: &Arc<ContentEntry>,
) -> Result<(), ConnectionError> {
    let frame = entry.server_info().encode()?;
    sink.send(frame).await?;
    state.metrics().server_info_sent.inc();
    Ok(())
}

/// Decode the client's version information into a branch map.
///
/// `None` refuses the whole listing: the client sent something we cannot
/// reason about, and guessing would leak entries to incompatible clients.
fn decode_branch_versions(version: &VersionInfo) -> Option<HashMap<String, VersionTuple>> {
    match version {
        VersionInfo::Branches(branches) => {
            let mut map = HashMap::with_capacity(branches.len());
            for branch_version in branches {
                let tuple = parse_version_tuple(&branch_version.version).ok()?;
                map.insert(branch_version.branch.clone(), tuple);
            }
            Some(map)
        }
        VersionInfo::Word(word) => Some(HashMap::from([(
            "vanilla".to_string(),
            decode_version_word(*word),
        )])),
    }
}

/// Unpack a 32-bit version word.
///
/// Releases from 12.0 on use `{major+16:8, minor:4}` in the top bits;
/// older clients packed three nibbles `{major:4, minor:4, patch:4}`.
fn decode_version_word(word: u32) -> VersionTuple {
    let top = word >> 24;
    if top > 27 {
        vec![top - 16, (word >> 20) & 0xF]
    } else {
        vec![(word >> 28) & 0xF, (word >> 24) & 0xF, (word >> 20) & 0xF]
    }
}

/// Stable label of a branch map, for stats and logging.
fn version_label(branch_versions: &HashMap<String, VersionTuple>) -> String {
    let mut parts: Vec<String> = branch_versions
        .iter()
        .map(|(branch, version)| {
            let dotted: Vec<String> = version.iter().map(u32::to_string).collect();
            format!("{branch}={}", dotted.join("."))
        })
        .collect();
    parts.sort();
    parts.join(";")
}
