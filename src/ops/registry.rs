use super::types::{OperationInfo, OperationKind, Outcome, PathParam};
use crate::{
    config::Config,
    errors::{AppError, AppResult},
    sandbox::{PathGuard, ValidatedPath},
};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;

pub type DynHandler = Arc<dyn OperationHandler + Send + Sync + 'static>;

/// Arguments handed to a handler once every path parameter has been validated.
#[derive(Debug, Default)]
pub struct Args {
    paths: HashMap<&'static str, ValidatedPath>,
    params: HashMap<String, String>,
}

impl Args {
    pub(crate) fn new(paths: HashMap<&'static str, ValidatedPath>, params: HashMap<String, String>) -> Self {
        Self { paths, params }
    }

    pub fn path(&self, name: &str) -> AppResult<&ValidatedPath> {
        self.paths
            .get(name)
            .ok_or_else(|| AppError::Internal(format!("path parameter {name} was not validated")))
    }

    pub fn param(&self, name: &str) -> AppResult<&str> {
        self.optional(name).ok_or_else(|| AppError::InvalidArgument(format!("missing {name}")))
    }

    pub fn optional(&self, name: &str) -> Option<&str> { self.params.get(name).map(String::as_str) }
}

#[async_trait]
pub trait OperationHandler {
    fn kind(&self) -> OperationKind;
    /// Parameters the dispatcher must pass through the path guard.
    fn path_params(&self) -> &'static [PathParam];
    /// Plain (non-path) parameters, for capability listing.
    fn params(&self) -> &'static [&'static str] { &[] }
    async fn execute(&self, guard: &PathGuard, args: Args) -> AppResult<Outcome>;
}

#[derive(Clone)]
pub struct Registry {
    handlers: Vec<(OperationKind, DynHandler)>,
}

impl Registry {
    pub fn new(cfg: &Config) -> anyhow::Result<Self> {
        let handlers = OperationKind::ALL
            .into_iter()
            .map(|kind| Ok((kind, build(kind, cfg)?)))
            .collect::<anyhow::Result<Vec<_>>>()?;
        Ok(Self { handlers })
    }

    pub fn get(&self, kind: OperationKind) -> Option<DynHandler> {
        self.handlers.iter().find(|(k, _)| *k == kind).map(|(_, h)| h.clone())
    }

    pub fn list_names(&self) -> Vec<&'static str> { self.handlers.iter().map(|(k, _)| k.name()).collect() }

    pub fn describe(&self) -> Vec<OperationInfo> {
        self.handlers
            .iter()
            .map(|(k, h)| OperationInfo { name: k.name(), path_params: h.path_params(), params: h.params() })
            .collect()
    }
}

fn build(kind: OperationKind, cfg: &Config) -> anyhow::Result<DynHandler> {
    use crate::handlers::{
        csv_filter::CsvFilter, fetch::RemoteFetcher, markdown::MarkdownRenderer, resize::ImageResizer,
    };
    Ok(match kind {
        OperationKind::ConvertMarkdown => Arc::new(MarkdownRenderer),
        OperationKind::FetchApiData => Arc::new(RemoteFetcher::new(cfg)?),
        OperationKind::ResizeImage => Arc::new(ImageResizer::new(cfg)),
        OperationKind::FilterCsv => Arc::new(CsvFilter),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tests::test_config;

    #[test]
    fn every_kind_is_registered_with_its_own_handler() {
        let tmp = tempfile::tempdir().unwrap();
        let registry = Registry::new(&test_config(tmp.path())).unwrap();
        for kind in OperationKind::ALL {
            assert_eq!(registry.get(kind).unwrap().kind(), kind);
        }
        assert_eq!(registry.list_names(), vec!["convert-markdown", "fetch-api-data", "resize-image", "filter-csv"]);
    }

    #[test]
    fn every_handler_declares_a_path_parameter() {
        let tmp = tempfile::tempdir().unwrap();
        let registry = Registry::new(&test_config(tmp.path())).unwrap();
        for info in registry.describe() {
            assert!(!info.path_params.is_empty(), "{} has no path params", info.name);
        }
    }
}
