use super::{
    registry::{Args, Registry},
    types::{OperationKind, OperationRequest, Outcome},
};
use crate::{errors::AppError, sandbox::PathGuard};
use std::collections::HashMap;
use std::sync::Arc;

/// Where in the validate → execute pipeline a request failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Validation,
    Handler,
}

#[derive(Debug)]
pub struct DispatchFailure {
    pub stage: Stage,
    pub error: AppError,
}

impl DispatchFailure {
    fn validation(error: AppError) -> Self { Self { stage: Stage::Validation, error } }
    fn handler(error: AppError) -> Self { Self { stage: Stage::Handler, error } }
}

/// Resolves a request to its handler and runs it against validated paths.
/// Holds no per-request state; clones share the same guard and registry.
#[derive(Clone)]
pub struct Dispatcher {
    guard: Arc<PathGuard>,
    registry: Arc<Registry>,
}

impl Dispatcher {
    pub fn new(guard: PathGuard, registry: Registry) -> Self {
        Self { guard: Arc::new(guard), registry: Arc::new(registry) }
    }

    pub fn registry(&self) -> &Registry { &self.registry }

    pub async fn handle(&self, request: OperationRequest) -> Result<Outcome, DispatchFailure> {
        let OperationRequest { operation, mut args } = request;
        let handler = OperationKind::from_name(&operation)
            .and_then(|kind| self.registry.get(kind))
            .ok_or_else(|| DispatchFailure::validation(AppError::UnknownOperation(operation.clone())))?;

        let mut paths = HashMap::new();
        for param in handler.path_params() {
            let raw = args.remove(param.name).ok_or_else(|| {
                DispatchFailure::validation(AppError::InvalidArgument(format!("missing {}", param.name)))
            })?;
            let validated = self.guard.validate(&raw, param.intent).map_err(DispatchFailure::validation)?;
            paths.insert(param.name, validated);
        }

        handler
            .execute(&self.guard, Args::new(paths, args))
            .await
            .map_err(DispatchFailure::handler)
    }
}
