use crate::workspace::OutputArtifact;
use axum::body::Bytes;
use futures::Stream;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::fs::File;
use tokio_util::io::ReaderStream;

/// Response body stream that owns the artifact it reads from.
///
/// The video and its request directory are deleted when the body is
/// dropped, whether it was sent completely or the client went away.
pub struct ArtifactStream {
    reader: ReaderStream<File>,
    artifact: OutputArtifact,
}

impl ArtifactStream {
    #[must_use]
    pub fn new(file: File, artifact: OutputArtifact) -> Self {
        Self {
            reader: ReaderStream::new(file),
            artifact,
        }
    }
}

impl Stream for ArtifactStream {
    type Item = std::io::Result<Bytes>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.reader).poll_next(cx)
    }
}

impl Drop for ArtifactStream {
    fn drop(&mut self) {
        tracing::debug!(path = %self.artifact.path().display(), "Releasing delivered video");
    }
}
