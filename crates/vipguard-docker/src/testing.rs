//! In-memory container runtime for tests.
//!
//! Enabled with the `testing` feature. The fake holds at most one proxy
//! container and answers health inspections from a script: each inspect
//! pops the next scripted status and the last one repeats forever.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;

use crate::error::{ContainerError, ContainerResult};
use crate::runtime::{ContainerDetails, ContainerRuntime, ContainerSummary};

pub struct FakeRuntime {
    container: Option<ContainerSummary>,
    health: Mutex<VecDeque<Option<String>>>,
    restart_error: Option<u16>,
    restarts: AtomicUsize,
    inspections: AtomicUsize,
}

impl FakeRuntime {
    /// A runtime with a single `traefik:v3` container, id `proxy-1`.
    pub fn with_proxy() -> Self {
        Self {
            container: Some(ContainerSummary {
                id: "proxy-1".to_string(),
                image: "traefik:v3".to_string(),
                state: "running".to_string(),
            }),
            health: Mutex::new(VecDeque::from([Some("healthy".to_string())])),
            restart_error: None,
            restarts: AtomicUsize::new(0),
            inspections: AtomicUsize::new(0),
        }
    }

    /// A runtime with no containers at all.
    pub fn empty() -> Self {
        Self {
            container: None,
            ..Self::with_proxy()
        }
    }

    /// Script the health statuses returned by successive inspections.
    pub fn health_sequence<I, S>(self, statuses: I) -> Self
    where
        I: IntoIterator<Item = Option<S>>,
        S: Into<String>,
    {
        let script = statuses.into_iter().map(|s| s.map(Into::into)).collect();
        *self.health.lock().unwrap() = script;
        self
    }

    /// Always report the same health status.
    pub fn always(self, status: &str) -> Self {
        self.health_sequence([Some(status)])
    }

    /// Make every restart fail with the given HTTP status.
    pub fn failing_restart(mut self, status: u16) -> Self {
        self.restart_error = Some(status);
        self
    }

    pub fn restarts(&self) -> usize {
        self.restarts.load(Ordering::SeqCst)
    }

    pub fn inspections(&self) -> usize {
        self.inspections.load(Ordering::SeqCst)
    }

    fn next_health(&self) -> Option<String> {
        let mut script = self.health.lock().unwrap();
        if script.len() > 1 {
            script.pop_front().flatten()
        } else {
            script.front().cloned().flatten()
        }
    }
}

#[async_trait]
impl ContainerRuntime for FakeRuntime {
    async fn list_containers(&self) -> ContainerResult<Vec<ContainerSummary>> {
        Ok(self.container.iter().cloned().collect())
    }

    async fn inspect(&self, id: &str) -> ContainerResult<ContainerDetails> {
        let container = self
            .container
            .as_ref()
            .filter(|c| c.id == id)
            .ok_or_else(|| ContainerError::NotFound(id.to_string()))?;
        self.inspections.fetch_add(1, Ordering::SeqCst);
        Ok(ContainerDetails {
            id: container.id.clone(),
            image: container.image.clone(),
            health: self.next_health(),
        })
    }

    async fn restart(&self, id: &str) -> ContainerResult<()> {
        if !self.container.as_ref().is_some_and(|c| c.id == id) {
            return Err(ContainerError::NotFound(id.to_string()));
        }
        if let Some(status) = self.restart_error {
            return Err(ContainerError::Api {
                operation: "restart container",
                status,
                message: "restart rejected".to_string(),
            });
        }
        self.restarts.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
