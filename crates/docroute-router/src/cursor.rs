//! Result cursor returned by `find`
//!
//! Lazy, forward-only and single-pass. The caller owns it; it closes the
//! underlying driver cursor on `close()` or, failing that, on drop.

use docroute_core::{RouterError, RouterResult};
use docroute_types::{Document, FindOptions, Selector};
use futures::stream::{self, Stream};
use tracing::debug;

use crate::connection::RawCursor;
use crate::node::NodeRole;

pub struct ResultCursor {
    raw: Box<dyn RawCursor>,
    served_by: NodeRole,
    selector: Selector,
    options: FindOptions,
    closed: bool,
}

impl ResultCursor {
    pub(crate) fn new(
        raw: Box<dyn RawCursor>,
        served_by: NodeRole,
        selector: Selector,
        options: FindOptions,
    ) -> Self {
        Self {
            raw,
            served_by,
            selector,
            options,
            closed: false,
        }
    }

    /// Node that served the query
    pub fn served_by(&self) -> NodeRole {
        self.served_by
    }

    pub fn selector(&self) -> &Selector {
        &self.selector
    }

    pub fn options(&self) -> &FindOptions {
        &self.options
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Next document, `None` when exhausted or closed
    pub async fn next(&mut self) -> RouterResult<Option<Document>> {
        if self.closed {
            return Ok(None);
        }
        self.raw.next_document().await
    }

    /// Drain the remaining documents and close the cursor
    pub async fn collect_all(mut self) -> RouterResult<Vec<Document>> {
        let mut documents = Vec::new();
        while let Some(document) = self.next().await? {
            documents.push(document);
        }
        self.close();
        Ok(documents)
    }

    /// Consume the cursor as a stream; it is closed when the stream is dropped
    pub fn into_stream(self) -> impl Stream<Item = RouterResult<Document>> {
        stream::try_unfold(self, |mut cursor| async move {
            let next = cursor.next().await?;
            Ok::<_, RouterError>(next.map(|document| (document, cursor)))
        })
    }

    /// Release the underlying cursor; idempotent
    pub fn close(&mut self) {
        if !self.closed {
            self.raw.close();
            self.closed = true;
            debug!(served_by = %self.served_by, "Cursor closed");
        }
    }
}

impl Drop for ResultCursor {
    fn drop(&mut self) {
        self.close();
    }
}

impl std::fmt::Debug for ResultCursor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResultCursor")
            .field("served_by", &self.served_by)
            .field("selector", &self.selector)
            .field("closed", &self.closed)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use futures::TryStreamExt;
    use serde_json::json;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct VecCursor {
        documents: VecDeque<Document>,
        closes: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl RawCursor for VecCursor {
        async fn next_document(&mut self) -> RouterResult<Option<Document>> {
            Ok(self.documents.pop_front())
        }

        fn close(&mut self) {
            self.closes.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn create_cursor(count: usize) -> (ResultCursor, Arc<AtomicUsize>) {
        let closes = Arc::new(AtomicUsize::new(0));
        let documents = (0..count)
            .map(|i| docroute_types::doc(json!({ "n": i })))
            .collect();
        let raw = VecCursor { documents, closes: closes.clone() };
        let cursor = ResultCursor::new(
            Box::new(raw),
            NodeRole::Master,
            Selector::new(),
            FindOptions::default(),
        );
        (cursor, closes)
    }

    #[tokio::test]
    async fn test_cursor_is_lazy_and_single_pass() {
        let (mut cursor, _) = create_cursor(2);
        assert!(!cursor.is_closed());

        assert_eq!(cursor.next().await.unwrap().unwrap()["n"], json!(0));
        assert_eq!(cursor.next().await.unwrap().unwrap()["n"], json!(1));
        assert!(cursor.next().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_close_is_idempotent() {
        let (mut cursor, closes) = create_cursor(3);
        cursor.close();
        cursor.close();
        assert!(cursor.next().await.unwrap().is_none());

        drop(cursor);
        assert_eq!(closes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_drop_closes() {
        let (cursor, closes) = create_cursor(3);
        drop(cursor);
        assert_eq!(closes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_collect_all_closes() {
        let (cursor, closes) = create_cursor(4);
        let documents = cursor.collect_all().await.unwrap();
        assert_eq!(documents.len(), 4);
        assert_eq!(closes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_stream() {
        let (cursor, closes) = create_cursor(3);
        let documents: Vec<Document> = cursor.into_stream().try_collect().await.unwrap();
        assert_eq!(documents.len(), 3);
        assert_eq!(closes.load(Ordering::SeqCst), 1);
    }
}
