// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use anyhow::{Context, Result};
use ktovet_app::{AddressDirectory, FetchFailure, FetchRequest, FieldKind, SearchResponse};
use ktovet_tui::{InternalEvent, SearchRuntime};
use std::collections::HashMap;
use std::sync::mpsc::Sender;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread;

type RequestKey = (FieldKind, u64);

/// Runs each search on its own worker thread against a shared directory.
/// Canceled requests still run to completion; their results come back as
/// [`FetchFailure::Canceled`].
pub struct DirectoryRuntime {
    directory: Arc<dyn AddressDirectory + Send + Sync>,
    // In-flight requests mapped to their canceled flag.
    pending: Arc<Mutex<HashMap<RequestKey, bool>>>,
}

impl DirectoryRuntime {
    pub fn new(directory: Arc<dyn AddressDirectory + Send + Sync>) -> Self {
        Self {
            directory,
            pending: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    #[cfg(test)]
    fn pending_len(&self) -> usize {
        lock(&self.pending).len()
    }
}

fn lock(pending: &Mutex<HashMap<RequestKey, bool>>) -> MutexGuard<'_, HashMap<RequestKey, bool>> {
    pending.lock().unwrap_or_else(PoisonError::into_inner)
}

impl SearchRuntime for DirectoryRuntime {
    fn run_search(&mut self, request: &FetchRequest) -> Result<SearchResponse> {
        self.directory.run(request)
    }

    fn spawn_search(&mut self, request: FetchRequest, tx: Sender<InternalEvent>) -> Result<()> {
        let key = (request.field, request.request_id);
        lock(&self.pending).insert(key, false);

        let directory = Arc::clone(&self.directory);
        let pending = Arc::clone(&self.pending);
        let spawned = thread::Builder::new()
            .name(format!("ktovet-{}-search", request.field.as_str()))
            .spawn(move || {
                let result = directory.run(&request);
                let canceled = lock(&pending).remove(&key).unwrap_or(false);
                let outcome = match result {
                    _ if canceled => Err(FetchFailure::Canceled),
                    Ok(response) => Ok(response),
                    Err(error) => Err(FetchFailure::Failed(format!("{error:#}"))),
                };
                let _ = tx.send(InternalEvent::SearchCompleted {
                    field: request.field,
                    request_id: request.request_id,
                    outcome,
                });
            });

        if let Err(error) = spawned {
            lock(&self.pending).remove(&key);
            return Err(error).context("spawn search worker");
        }
        Ok(())
    }

    fn cancel_search(&mut self, field: FieldKind, request_id: u64) -> Result<()> {
        if let Some(canceled) = lock(&self.pending).get_mut(&(field, request_id)) {
            *canceled = true;
        }
        Ok(())
    }
}
