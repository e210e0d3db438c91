//! Progress events emitted while a scan runs.
//!
//! A scan yields a finite stream of [`ProgressEvent`]s ending in exactly one
//! terminal `DONE` or `ERROR` event. Dropping the [`ProgressStream`] detaches
//! the consumer; the scan then stops submitting new queries.

use std::pin::Pin;
use std::task::{Context, Poll};

use futures::Stream;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::error::ScanError;
use crate::model::ScanResult;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Phase {
    Discovering,
    Parsing,
    Querying,
    Done,
    Error,
}

impl Phase {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Phase::Done | Phase::Error)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressEvent {
    pub phase: Phase,
    pub current_package: Option<String>,
    pub processed: usize,
    pub total: usize,
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Box<ScanResult>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ScanError>,
}

impl ProgressEvent {
    fn new(phase: Phase, processed: usize, total: usize) -> Self {
        Self {
            phase,
            current_package: None,
            processed,
            total,
            message: None,
            result: None,
            error: None,
        }
    }

    pub fn discovering(path: &str, processed: usize, total: usize) -> Self {
        Self {
            message: Some(format!("Found {path}")),
            ..Self::new(Phase::Discovering, processed, total)
        }
    }

    pub fn parsing(path: &str, processed: usize, total: usize) -> Self {
        Self {
            message: Some(format!("Parsing {path}")),
            ..Self::new(Phase::Parsing, processed, total)
        }
    }

    pub fn querying(package: String, processed: usize, total: usize) -> Self {
        Self {
            current_package: Some(package),
            ..Self::new(Phase::Querying, processed, total)
        }
    }

    pub fn done(result: ScanResult) -> Self {
        let total = result.summary.total_packages;
        Self {
            message: Some(format!(
                "Found {} vulnerabilities in {} packages",
                result.summary.total_vulnerabilities, total
            )),
            result: Some(Box::new(result)),
            ..Self::new(Phase::Done, total, total)
        }
    }

    pub fn failed(error: ScanError) -> Self {
        Self {
            message: Some(error.to_string()),
            error: Some(error),
            ..Self::new(Phase::Error, 0, 0)
        }
    }

    /// Formats the event as a server-sent-events `data:` frame.
    pub fn to_sse(&self) -> Result<String, serde_json::Error> {
        Ok(format!("data: {}\n\n", serde_json::to_string(self)?))
    }
}

/// Receiving half of a running scan.
///
/// Implements [`Stream`]; the stream ends after the terminal event.
pub struct ProgressStream {
    rx: mpsc::Receiver<ProgressEvent>,
}

impl ProgressStream {
    pub(crate) fn new(rx: mpsc::Receiver<ProgressEvent>) -> Self {
        Self { rx }
    }

    pub async fn next(&mut self) -> Option<ProgressEvent> {
        self.rx.recv().await
    }

    /// Drains the stream and returns the final result, ignoring
    /// intermediate events.
    pub async fn wait(mut self) -> Result<ScanResult, ScanError> {
        while let Some(event) = self.rx.recv().await {
            match event.phase {
                Phase::Done => {
                    if let Some(result) = event.result {
                        return Ok(*result);
                    }
                }
                Phase::Error => {
                    return Err(event
                        .error
                        .unwrap_or_else(|| ScanError::Source("scan aborted".to_string())));
                }
                _ => {}
            }
        }
        Err(ScanError::Source("scan ended without a result".to_string()))
    }
}

impl Stream for ProgressStream {
    type Item = ProgressEvent;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.rx.poll_recv(cx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;

    #[test]
    fn test_phase_serializes_uppercase() {
        let json = serde_json::to_string(&Phase::Querying).unwrap();
        assert_eq!(json, "\"QUERYING\"");
        assert!(Phase::Done.is_terminal());
        assert!(!Phase::Parsing.is_terminal());
    }

    #[test]
    fn test_querying_event_json_shape() {
        let event = ProgressEvent::querying("lodash@4.17.15".into(), 3, 10);
        let value = serde_json::to_value(&event).unwrap();

        assert_eq!(value["phase"], "QUERYING");
        assert_eq!(value["currentPackage"], "lodash@4.17.15");
        assert_eq!(value["processed"], 3);
        assert_eq!(value["total"], 10);
        assert!(value["message"].is_null());
        assert!(value.get("result").is_none());
    }

    #[test]
    fn test_to_sse_frame() {
        let event = ProgressEvent::failed(ScanError::RepositoryNotFound("acme/x".into()));
        let frame = event.to_sse().unwrap();

        assert!(frame.starts_with("data: {"));
        assert!(frame.ends_with("\n\n"));
        assert!(frame.contains("\"ERROR\""));
        assert!(frame.contains("repository_not_found"));
    }

    #[tokio::test]
    async fn test_wait_returns_done_result() {
        let (tx, rx) = mpsc::channel(4);
        tx.send(ProgressEvent::parsing("package.json", 1, 1)).await.unwrap();
        tx.send(ProgressEvent::done(ScanResult::empty("repo"))).await.unwrap();
        drop(tx);

        let result = ProgressStream::new(rx).wait().await.unwrap();
        assert_eq!(result.repository, "repo");
    }

    #[tokio::test]
    async fn test_wait_surfaces_error() {
        let (tx, rx) = mpsc::channel(4);
        tx.send(ProgressEvent::failed(ScanError::RateLimited)).await.unwrap();
        drop(tx);

        let err = ProgressStream::new(rx).wait().await.unwrap_err();
        assert_eq!(err, ScanError::RateLimited);
    }

    #[tokio::test]
    async fn test_stream_ends_when_sender_dropped() {
        let (tx, rx) = mpsc::channel(4);
        tx.send(ProgressEvent::discovering("go.mod", 1, 1)).await.unwrap();
        drop(tx);

        let events: Vec<_> = ProgressStream::new(rx).collect().await;
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].phase, Phase::Discovering);
    }
}
