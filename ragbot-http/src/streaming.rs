use axum::body::Bytes;
use futures::stream::{BoxStream, StreamExt};
use ragbot_core::agent::{Agent, AgentFactory, FragmentResult, FragmentSink};
use ragbot_core::AgentError;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error};

use crate::apis::chat::ChatChunk;
use crate::lifecycle::StreamLifecycle;

/// NDJSON byte records of one reply, ending with the terminal record
pub type ChunkStream = BoxStream<'static, Result<Bytes, AgentError>>;

/// Build an agent for `session_id`, run it on a background worker and
/// expose its fragments as NDJSON records.
///
/// Waits for the first fragment (or the end of the run) before returning,
/// so failures that happen before anything could be sent come back as
/// `Err` and can still be reported with a proper status code. After that
/// the stream forwards fragments as the worker produces them, in order.
pub async fn stream_response(
    factory: &dyn AgentFactory,
    prompt: String,
    session_id: Option<&str>,
    buffer: usize,
    request_id: &str,
) -> Result<ChunkStream, AgentError> {
    let agent = factory.create_agent(session_id).await?;
    let session_id = agent.session_id().to_string();

    let (tx, rx) = mpsc::channel(buffer.max(1));
    let cancel = CancellationToken::new();
    let lifecycle = StreamLifecycle::new(cancel.clone(), request_id.to_string(), session_id);
    let worker = spawn_worker(agent, prompt, tx, cancel, request_id.to_string());

    let mut rx = ReceiverStream::new(rx);
    let first = rx.next().await;
    let worker = match first {
        Some(Err(e)) => return Err(e),
        Some(Ok(_)) => Some(worker),
        None => {
            join_worker(worker).await?;
            None
        }
    };

    Ok(chunk_stream(first, rx, worker, lifecycle))
}

/// Run the agent to completion (or cancellation) on its own task
fn spawn_worker(
    agent: Arc<dyn Agent>,
    prompt: String,
    tx: mpsc::Sender<FragmentResult>,
    cancel: CancellationToken,
    request_id: String,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let session_id = agent.session_id().to_string();
        let sink = FragmentSink::new(tx.clone());

        let result = tokio::select! {
            _ = cancel.cancelled() => Err(AgentError::Cancelled),
            result = agent.run(&prompt, sink, cancel.clone()) => result,
        };

        match result {
            Ok(()) => {
                debug!("[{}] - [{}] Agent run completed", request_id, session_id);
            }
            Err(AgentError::Cancelled) => {
                debug!("[{}] - [{}] Agent run cancelled", request_id, session_id);
            }
            Err(e) => {
                error!("[{}] - [{}] Agent execution error: {}", request_id, session_id, e);
                let _ = tx.send(Err(e)).await;
            }
        }
    })
}

async fn join_worker(worker: JoinHandle<()>) -> Result<(), AgentError> {
    worker
        .await
        .map_err(|e| AgentError::Internal(format!("Agent worker failed: {}", e)))
}

struct StreamState {
    pending: Option<FragmentResult>,
    rx: ReceiverStream<FragmentResult>,
    worker: Option<JoinHandle<()>>,
    done: bool,
    lifecycle: StreamLifecycle,
}

fn chunk_stream(
    first: Option<FragmentResult>,
    rx: ReceiverStream<FragmentResult>,
    worker: Option<JoinHandle<()>>,
    lifecycle: StreamLifecycle,
) -> ChunkStream {
    let state = StreamState {
        pending: first,
        rx,
        worker,
        done: false,
        lifecycle,
    };

    futures::stream::unfold(state, |mut state| async move {
        if state.done {
            return None;
        }

        loop {
            let next = match state.pending.take() {
                Some(item) => Some(item),
                None => state.rx.next().await,
            };

            match next {
                Some(Ok(fragment)) => match ChatChunk::content(fragment.into_text()).to_ndjson() {
                    Ok(line) => return Some((Ok(line), state)),
                    Err(e) => {
                        error!(
                            "[{}] - [{}] Failed to serialize chunk: {}",
                            state.lifecycle.request_id(),
                            state.lifecycle.session_id(),
                            e
                        );
                        continue;
                    }
                },
                Some(Err(e)) => {
                    error!(
                        "[{}] - [{}] Aborting stream after agent failure: {}",
                        state.lifecycle.request_id(),
                        state.lifecycle.session_id(),
                        e
                    );
                    state.done = true;
                    return Some((Err(e), state));
                }
                None => {
                    state.done = true;
                    if let Some(worker) = state.worker.take() {
                        if let Err(e) = join_worker(worker).await {
                            return Some((Err(e), state));
                        }
                    }
                    return match ChatChunk::terminal().to_ndjson() {
                        Ok(line) => Some((Ok(line), state)),
                        Err(e) => {
                            error!(
                                "[{}] - [{}] Failed to serialize terminal chunk: {}",
                                state.lifecycle.request_id(),
                                state.lifecycle.session_id(),
                                e
                            );
                            None
                        }
                    };
                }
            }
        }
    })
    .boxed()
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use ragbot_core::agent::Fragment;
    use ragbot_core::EchoAgentFactory;
    use std::sync::Mutex;
    use std::time::Duration;
    use tokio::sync::oneshot;

    /// Sends its script, then fails or finishes
    struct ScriptedAgent {
        fragments: Vec<&'static str>,
        failure: Option<&'static str>,
    }

    #[async_trait]
    impl Agent for ScriptedAgent {
        fn name(&self) -> &str {
            "scripted"
        }

        fn session_id(&self) -> &str {
            "default"
        }

        async fn run(
            &self,
            _prompt: &str,
            sink: FragmentSink,
            _cancel: CancellationToken,
        ) -> Result<(), AgentError> {
            for text in &self.fragments {
                if let Some(fragment) = Fragment::content(*text) {
                    sink.send(fragment).await;
                }
            }
            match self.failure {
                Some(reason) => Err(AgentError::Upstream(reason.to_string())),
                None => Ok(()),
            }
        }
    }

    /// Sends one fragment then never finishes; reports when its run is dropped
    struct StallingAgent {
        dropped: Mutex<Option<oneshot::Sender<()>>>,
    }

    struct NotifyOnDrop(Option<oneshot::Sender<()>>);

    impl Drop for NotifyOnDrop {
        fn drop(&mut self) {
            if let Some(tx) = self.0.take() {
                let _ = tx.send(());
            }
        }
    }

    #[async_trait]
    impl Agent for StallingAgent {
        fn name(&self) -> &str {
            "stalling"
        }

        fn session_id(&self) -> &str {
            "default"
        }

        async fn run(
            &self,
            _prompt: &str,
            sink: FragmentSink,
            _cancel: CancellationToken,
        ) -> Result<(), AgentError> {
            let _notify = NotifyOnDrop(self.dropped.lock().unwrap().take());
            sink.send(Fragment::content("partial").unwrap()).await;
            futures::future::pending::<()>().await;
            Ok(())
        }
    }

    struct PanickingAgent;

    #[async_trait]
    impl Agent for PanickingAgent {
        fn name(&self) -> &str {
            "panicking"
        }

        fn session_id(&self) -> &str {
            "default"
        }

        async fn run(
            &self,
            _prompt: &str,
            _sink: FragmentSink,
            _cancel: CancellationToken,
        ) -> Result<(), AgentError> {
            panic!("agent exploded");
        }
    }

    /// Hands out one prepared agent
    struct SingleAgentFactory(Mutex<Option<Arc<dyn Agent>>>);

    impl SingleAgentFactory {
        fn new(agent: impl Agent + 'static) -> Self {
            let agent: Arc<dyn Agent> = Arc::new(agent);
            Self(Mutex::new(Some(agent)))
        }
    }

    #[async_trait]
    impl AgentFactory for SingleAgentFactory {
        async fn create_agent(&self, _session_id: Option<&str>) -> Result<Arc<dyn Agent>, AgentError> {
            self.0
                .lock()
                .unwrap()
                .take()
                .ok_or_else(|| AgentError::Config("agent already used".to_string()))
        }
    }

    fn decode(line: &Bytes) -> ChatChunk {
        assert!(line.ends_with(b"\n"));
        serde_json::from_slice(&line[..line.len() - 1]).unwrap()
    }

    async fn collect_chunks(stream: ChunkStream) -> Vec<ChatChunk> {
        stream
            .map(|item| decode(&item.unwrap()))
            .collect::<Vec<_>>()
            .await
    }

    #[tokio::test]
    async fn fragments_arrive_in_order_then_terminal() {
        let factory = EchoAgentFactory::with_delay(Duration::ZERO);
        let stream = stream_response(&factory, "Hello big world".into(), None, 4, "req")
            .await
            .unwrap();

        let chunks = collect_chunks(stream).await;
        assert_eq!(
            chunks,
            vec![
                ChatChunk::content("Hello "),
                ChatChunk::content("big "),
                ChatChunk::content("world "),
                ChatChunk::terminal(),
            ]
        );
    }

    #[tokio::test]
    async fn empty_prompt_yields_only_terminal() {
        let factory = EchoAgentFactory::with_delay(Duration::ZERO);
        let stream = stream_response(&factory, String::new(), None, 4, "req")
            .await
            .unwrap();

        assert_eq!(collect_chunks(stream).await, vec![ChatChunk::terminal()]);
    }

    #[tokio::test]
    async fn small_buffer_still_delivers_everything() {
        let factory = EchoAgentFactory::with_delay(Duration::ZERO);
        let prompt = (0..50).map(|n| n.to_string()).collect::<Vec<_>>().join(" ");
        let stream = stream_response(&factory, prompt, None, 1, "req").await.unwrap();

        let chunks = collect_chunks(stream).await;
        assert_eq!(chunks.len(), 51);
        assert_eq!(chunks[0], ChatChunk::content("0 "));
        assert_eq!(chunks[49], ChatChunk::content("49 "));
        assert!(chunks[50].is_final);
    }

    #[tokio::test]
    async fn failure_before_first_fragment_is_returned_as_error() {
        let factory = SingleAgentFactory::new(ScriptedAgent {
            fragments: vec![],
            failure: Some("connection refused"),
        });

        let result = stream_response(&factory, "hi".into(), None, 4, "req").await;
        assert!(matches!(result, Err(AgentError::Upstream(_))));
    }

    #[tokio::test]
    async fn factory_failure_is_returned_as_error() {
        let factory = SingleAgentFactory(Mutex::new(None));
        let result = stream_response(&factory, "hi".into(), None, 4, "req").await;
        assert!(matches!(result, Err(AgentError::Config(_))));
    }

    #[tokio::test]
    async fn failure_after_first_fragment_ends_stream_without_terminal() {
        let factory = SingleAgentFactory::new(ScriptedAgent {
            fragments: vec!["partial"],
            failure: Some("stream reset"),
        });

        let items: Vec<_> = stream_response(&factory, "hi".into(), None, 4, "req")
            .await
            .unwrap()
            .collect()
            .await;

        assert_eq!(items.len(), 2);
        assert_eq!(decode(items[0].as_ref().unwrap()), ChatChunk::content("partial"));
        assert!(matches!(items[1], Err(AgentError::Upstream(_))));
    }

    #[tokio::test]
    async fn panicking_agent_is_reported_before_commit() {
        let factory = SingleAgentFactory::new(PanickingAgent);
        let result = stream_response(&factory, "hi".into(), None, 4, "req").await;
        assert!(matches!(result, Err(AgentError::Internal(_))));
    }

    #[tokio::test]
    async fn dropping_the_stream_cancels_the_worker() {
        let (dropped_tx, dropped_rx) = oneshot::channel();
        let factory = SingleAgentFactory::new(StallingAgent {
            dropped: Mutex::new(Some(dropped_tx)),
        });

        let mut stream = stream_response(&factory, "hi".into(), None, 4, "req")
            .await
            .unwrap();
        let first = stream.next().await.unwrap().unwrap();
        assert_eq!(decode(&first), ChatChunk::content("partial"));

        drop(stream);

        tokio::time::timeout(Duration::from_secs(1), dropped_rx)
            .await
            .expect("worker was not cancelled")
            .unwrap();
    }
}
