//! `http` remote dataset: a thin client
//! over another arkimet server's dataset, used so a local configuration
//! can name a remote collection the same way it names a local one. The
//! transport itself stays deliberately small — three endpoints, JSON
//! metadata, raw bytes for data — since the wire protocol's own
//! evolution is out of this crate's scope.
//!
//! The rest of the crate is synchronous; `reqwest`'s async client is
//! bridged across that boundary with one `tokio` current-thread runtime
//! per dataset, built once at `open` and driven with `block_on`, the same
//! "own small runtime at the edge" shape used to call back into async
//! Rust from a synchronous host.

use std::any::Any;
use std::io::Write;

use serde::Deserialize;
use tokio::runtime::Runtime;

use crate::config::DatasetConfig;
use crate::dispatch::DatasetAcceptor;
use crate::error::{ArkError, Result};
use crate::index::InsertOutcome;
use crate::matcher::Matcher;
use crate::metadata::{Metadata, Summary};
use crate::query::{QueryResult, SortInterval};

use super::Dataset;

#[derive(Deserialize)]
struct RemoteRow {
    relpath: String,
    metadata: Vec<u8>,
}

pub struct HttpDataset {
    cfg: DatasetConfig,
    filter: Option<Matcher>,
    base_url: String,
    client: reqwest::Client,
    runtime: Runtime,
}

impl HttpDataset {
    pub fn open(cfg: DatasetConfig) -> Result<Self> {
        let filter = cfg.filter.as_deref().map(Matcher::parse).transpose()?;
        let base_url = cfg
            .extra
            .get("url")
            .cloned()
            .ok_or_else(|| ArkError::Config(format!("dataset '{}' is type `http` but has no `url` key", cfg.name)))?;
        let runtime = Runtime::new().map_err(|e| ArkError::Config(format!("failed to start http runtime: {e}")))?;
        Ok(Self {
            cfg,
            filter,
            base_url,
            client: reqwest::Client::new(),
            runtime,
        })
    }

    fn endpoint(&self, suffix: &str) -> String {
        format!("{}/dataset/{}/{suffix}", self.base_url.trim_end_matches('/'), self.cfg.name)
    }

    /// Coarse reftime bounds go over the wire as query params; the
    /// remaining clauses (product, level, area, ...) are re-applied
    /// locally against the decoded metadata, the same
    /// over-fetch-then-filter split [`crate::index::segment_index::SegmentIndex::lookup`]
    /// uses between its candidate index and `Matcher::accepts`.
    async fn fetch_rows(&self, matcher: &Matcher) -> Result<Vec<(std::path::PathBuf, Metadata)>> {
        let mut req = self.client.post(self.endpoint("query/metadata"));
        if let Some(span) = matcher.reftime_interval() {
            req = req.query(&[("ge", span.start.to_iso8601()), ("lt", span.end.to_iso8601())]);
        }
        let resp = req
            .send()
            .await
            .map_err(|e| ArkError::Query(format!("http query failed: {e}")))?
            .error_for_status()
            .map_err(|e| ArkError::Query(format!("remote dataset returned an error: {e}")))?;
        let rows: Vec<RemoteRow> = resp
            .json()
            .await
            .map_err(|e| ArkError::Query(format!("malformed metadata response: {e}")))?;
        rows.into_iter()
            .map(|r| Metadata::decode_body(&r.metadata).map(|md| (std::path::PathBuf::from(r.relpath), md)))
            .collect::<Result<Vec<_>>>()
            .map(|rows| rows.into_iter().filter(|(_, md)| matcher.accepts(md)).collect())
    }
}

impl Dataset for HttpDataset {
    fn name(&self) -> &str {
        &self.cfg.name
    }

    fn config(&self) -> &DatasetConfig {
        &self.cfg
    }

    fn acquire(&mut self, _md: Metadata) -> Result<InsertOutcome> {
        Err(ArkError::Consistency(format!(
            "dataset '{}' is a remote `http` dataset; it is read-only",
            self.cfg.name
        )))
    }

    fn query_metadata(&self, matcher: &Matcher, sort: Option<SortInterval>) -> Result<Vec<QueryResult>> {
        let rows = self.runtime.block_on(self.fetch_rows(matcher))?;
        let mut results: Vec<QueryResult> = rows
            .into_iter()
            .enumerate()
            .map(|(row_id, (relpath, metadata))| QueryResult {
                relpath,
                row: crate::index::Row { row_id, metadata },
            })
            .collect();
        match sort {
            Some(interval) => crate::query::sort::sort_results(&mut results, interval),
            // Default order is segment-name ascending then segment-order,
            // not a global reftime sort — see src/query/mod.rs.
            None => results.sort_by(|a, b| a.relpath.cmp(&b.relpath).then_with(|| a.row.row_id.cmp(&b.row.row_id))),
        }
        Ok(results)
    }

    fn query_bytes(
        &self,
        matcher: &Matcher,
        sort: Option<SortInterval>,
        sink: &mut dyn Write,
        postprocess: &dyn Fn(&[u8]) -> Result<Vec<u8>>,
    ) -> Result<u64> {
        let results = self.query_metadata(matcher, sort)?;
        let mut written = 0u64;
        for result in results {
            let (offset, size) = result
                .row
                .metadata
                .source
                .location()
                .ok_or_else(|| ArkError::Query("matched remote record has no stored location".into()))?;
            let bytes = self.runtime.block_on(async {
                let resp = self
                    .client
                    .get(self.endpoint("query/data"))
                    .query(&[("relpath", result.relpath.to_string_lossy().as_ref()), ("offset", &offset.to_string()), ("size", &size.to_string())])
                    .send()
                    .await
                    .map_err(|e| ArkError::Query(format!("http data fetch failed: {e}")))?
                    .error_for_status()
                    .map_err(|e| ArkError::Query(format!("remote dataset returned an error: {e}")))?;
                resp.bytes().await.map_err(|e| ArkError::Query(format!("failed reading response body: {e}")))
            })?;
            let out = postprocess(&bytes)?;
            sink.write_all(&out)?;
            written += out.len() as u64;
        }
        Ok(written)
    }

    fn query_summary(&self, matcher: &Matcher) -> Result<Summary> {
        let rows = self.runtime.block_on(self.fetch_rows(matcher))?;
        let mut s = Summary::new();
        for (_, md) in rows {
            s.add(&md);
        }
        Ok(s)
    }

    fn flush(&mut self) -> Result<()> {
        Ok(())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

impl DatasetAcceptor for HttpDataset {
    fn name(&self) -> &str {
        &self.cfg.name
    }

    fn filter(&self) -> Option<&Matcher> {
        self.filter.as_ref()
    }

    fn acquire(&mut self, md: Metadata) -> Result<InsertOutcome> {
        Dataset::acquire(self, md)
    }
}
