use tokio_util::sync::{CancellationToken, DropGuard};
use tracing::debug;

/// Ties an agent worker to the response body consuming its output.
///
/// Owned by the chunk stream. When the stream is dropped, either because it
/// finished or because the client went away and the server stopped polling
/// the body, the worker's token is cancelled so the upstream call is
/// abandoned instead of running to completion.
pub struct StreamLifecycle {
    _cancel_guard: DropGuard,
    request_id: String,
    session_id: String,
}

impl StreamLifecycle {
    pub fn new(cancel: CancellationToken, request_id: String, session_id: String) -> Self {
        Self {
            _cancel_guard: cancel.drop_guard(),
            request_id,
            session_id,
        }
    }

    pub fn request_id(&self) -> &str {
        &self.request_id
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }
}

impl Drop for StreamLifecycle {
    fn drop(&mut self) {
        debug!(
            "[{}] - [{}] Stream closed, releasing agent worker",
            self.request_id, self.session_id
        );
    }
}
