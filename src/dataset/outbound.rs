//! `outbound` ("Format variants"): a one-way sink that never stores a
//! byte locally. Each acquired record's inline payload is piped through
//! the dataset's configured `postprocess` command (config key,
//! reused here rather than invented fresh — the collaborator that would
//! otherwise transform query output transforms acquisition input
//! instead) and the command's exit status decides the outcome. With no
//! `postprocess` configured, acquisition is a pure no-op success, same as
//! [`super::discard::DiscardDataset`].

use std::any::Any;
use std::io::Write;
use std::process::{Command, Stdio};

use crate::config::DatasetConfig;
use crate::dispatch::DatasetAcceptor;
use crate::error::{ArkError, Result};
use crate::index::InsertOutcome;
use crate::matcher::Matcher;
use crate::metadata::{Metadata, Source, Summary};
use crate::query::{QueryResult, SortInterval};

use super::Dataset;

pub struct OutboundDataset {
    cfg: DatasetConfig,
    filter: Option<Matcher>,
}

impl OutboundDataset {
    pub fn open(cfg: DatasetConfig) -> Result<Self> {
        let filter = cfg.filter.as_deref().map(Matcher::parse).transpose()?;
        Ok(Self { cfg, filter })
    }

    fn forward(&self, payload: &[u8]) -> Result<()> {
        let Some(command) = self.cfg.postprocess.first() else {
            return Ok(());
        };
        let mut child = Command::new(command)
            .args(&self.cfg.postprocess[1..])
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| ArkError::Postproc(format!("failed to launch '{command}': {e}")))?;
        child
            .stdin
            .take()
            .expect("piped stdin")
            .write_all(payload)
            .map_err(|e| ArkError::Postproc(format!("'{command}' stdin write failed: {e}")))?;
        let output = child
            .wait_with_output()
            .map_err(|e| ArkError::Postproc(format!("'{command}' wait failed: {e}")))?;
        if !output.status.success() {
            return Err(ArkError::Postproc(format!(
                "'{command}' exited with {}: {}",
                output.status,
                String::from_utf8_lossy(&output.stderr)
            )));
        }
        Ok(())
    }
}

impl Dataset for OutboundDataset {
    fn name(&self) -> &str {
        &self.cfg.name
    }

    fn config(&self) -> &DatasetConfig {
        &self.cfg
    }

    fn acquire(&mut self, md: Metadata) -> Result<InsertOutcome> {
        let payload = match &md.source {
            Source::Inline(bytes) => bytes.clone(),
            other => {
                return Err(ArkError::Consistency(format!(
                    "acquire expects an inline-sourced record, got {other:?}"
                )))
            }
        };
        self.forward(&payload)?;
        Ok(InsertOutcome::Inserted)
    }

    fn query_metadata(&self, _matcher: &Matcher, _sort: Option<SortInterval>) -> Result<Vec<QueryResult>> {
        Ok(Vec::new())
    }

    fn query_bytes(
        &self,
        _matcher: &Matcher,
        _sort: Option<SortInterval>,
        _sink: &mut dyn Write,
        _postprocess: &dyn Fn(&[u8]) -> Result<Vec<u8>>,
    ) -> Result<u64> {
        Ok(0)
    }

    fn query_summary(&self, _matcher: &Matcher) -> Result<Summary> {
        Ok(Summary::new())
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

impl DatasetAcceptor for OutboundDataset {
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{DatasetConfigBuilder, DatasetType};

    #[test]
    fn acquire_without_postprocess_is_a_noop_success() {
        let dir = tempfile::tempdir().unwrap();
        let mut ds = OutboundDataset::open(DatasetConfigBuilder::new("relay", dir.path(), DatasetType::Outbound).build()).unwrap();
        let md = Metadata::with_source(Source::Inline(b"payload".to_vec()));
        assert_eq!(Dataset::acquire(&mut ds, md).unwrap(), InsertOutcome::Inserted);
    }

    #[test]
    fn acquire_runs_the_configured_command_against_the_payload() {
        let dir = tempfile::tempdir().unwrap();
        let out_file = dir.path().join("forwarded.bin");
        let mut cfg = DatasetConfigBuilder::new("relay", dir.path(), DatasetType::Outbound).build();
        cfg.postprocess = vec!["tee".into(), out_file.to_string_lossy().into_owned()];
        let mut ds = OutboundDataset::open(cfg).unwrap();
        let md = Metadata::with_source(Source::Inline(b"hello".to_vec()));
        Dataset::acquire(&mut ds, md).unwrap();
        assert_eq!(std::fs::read(&out_file).unwrap(), b"hello");
    }

    #[test]
    fn a_failing_command_surfaces_as_a_postproc_error() {
        let dir = tempfile::tempdir().unwrap();
        let mut cfg = DatasetConfigBuilder::new("relay", dir.path(), DatasetType::Outbound).build();
        cfg.postprocess = vec!["false".into()];
        let mut ds = OutboundDataset::open(cfg).unwrap();
        let md = Metadata::with_source(Source::Inline(b"hello".to_vec()));
        assert!(Dataset::acquire(&mut ds, md).is_err());
    }
}
