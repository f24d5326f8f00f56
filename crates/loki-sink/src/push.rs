// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Loki push API payloads.
//!
//! # Output Format
//!
//! ```json
//! {"streams":[
//!   {"stream":{"env":"prod"},"values":[["1700000000000000000","line 1"],["1700000000000000001","line 2"]]}
//! ]}
//! ```
//!
//! Timestamps are nanoseconds since the epoch, encoded as strings. Entries
//! sharing a label set form one stream; streams appear in the order their
//! first entry was appended and values keep append order.

use crate::entry::Batch;
use crate::errors::DeliveryError;
use crate::labels::LabelSet;
use flate2::write::GzEncoder;
use flate2::Compression;
use serde::Serialize;
use std::collections::BTreeMap;
use std::io::Write;
use std::sync::Arc;

pub const CONTENT_TYPE: &str = "application/json";
pub const GZIP_ENCODING: &str = "gzip";

#[derive(Debug, Serialize)]
pub struct PushRequest<'a> {
    pub streams: Vec<Stream<'a>>,
}

#[derive(Debug, Serialize)]
pub struct Stream<'a> {
    pub stream: BTreeMap<&'a str, String>,
    pub values: Vec<(String, &'a str)>,
}

impl<'a> PushRequest<'a> {
    #[must_use]
    pub fn from_batch(batch: &'a Batch) -> Self {
        let mut groups: Vec<(&'a Arc<LabelSet>, Stream<'a>)> = Vec::new();

        for entry in batch.entries() {
            let labels = entry.labels();
            let position = groups
                .iter()
                .position(|(known, _)| Arc::ptr_eq(*known, labels) || *known == labels);
            let index = match position {
                Some(index) => index,
                None => {
                    groups.push((
                        labels,
                        Stream {
                            stream: labels.to_stream(),
                            values: Vec::new(),
                        },
                    ));
                    groups.len() - 1
                }
            };
            groups[index]
                .1
                .values
                .push((entry.timestamp_nanos().to_string(), entry.line()));
        }

        PushRequest {
            streams: groups.into_iter().map(|(_, stream)| stream).collect(),
        }
    }
}

/// Request body ready to send.
#[derive(Debug, Clone)]
pub struct Payload {
    pub body: Vec<u8>,
    pub gzipped: bool,
}

pub fn encode(batch: &Batch, gzip: bool) -> Result<Payload, DeliveryError> {
    let json = serde_json::to_vec(&PushRequest::from_batch(batch))?;
    if !gzip {
        return Ok(Payload {
            body: json,
            gzipped: false,
        });
    }
    Ok(Payload {
        body: compress(&json)?,
        gzipped: true,
    })
}

fn compress(data: &[u8]) -> std::io::Result<Vec<u8>> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(data)?;
    encoder.finish()
}
