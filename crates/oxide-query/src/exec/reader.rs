//! Row readers.

use std::marker::PhantomData;
use std::sync::Arc;

use futures::stream::BoxStream;
use futures::StreamExt;

use crate::entity::{materialize, Entity, EntityDescriptor};
use crate::error::{ExecError, Result};
use crate::row::Row;

enum Rows<'a> {
    Buffered(std::vec::IntoIter<Row>),
    Streaming(BoxStream<'a, std::result::Result<Row, ExecError>>),
}

/// Reads the rows of one statement, materializing each as `E`.
pub struct RowReader<'a, E> {
    rows: Rows<'a>,
    descriptor: Arc<EntityDescriptor>,
    _marker: PhantomData<fn() -> E>,
}

impl<'a, E: Entity> RowReader<'a, E> {
    pub(super) fn buffered(rows: Vec<Row>, descriptor: Arc<EntityDescriptor>) -> Self {
        Self {
            rows: Rows::Buffered(rows.into_iter()),
            descriptor,
            _marker: PhantomData,
        }
    }

    pub(super) fn streaming(
        stream: BoxStream<'a, std::result::Result<Row, ExecError>>,
        descriptor: Arc<EntityDescriptor>,
    ) -> Self {
        Self {
            rows: Rows::Streaming(stream),
            descriptor,
            _marker: PhantomData,
        }
    }

    /// Whether every row was read before the reader was handed out.
    #[must_use]
    pub const fn is_buffered(&self) -> bool {
        matches!(self.rows, Rows::Buffered(_))
    }

    /// The next raw row.
    pub async fn next_row(&mut self) -> Option<Result<Row>> {
        match &mut self.rows {
            Rows::Buffered(rows) => rows.next().map(Ok),
            Rows::Streaming(stream) => stream.next().await.map(|row| row.map_err(Into::into)),
        }
    }

    /// The next row as `E`.
    pub async fn next(&mut self) -> Option<Result<E>> {
        let row = match self.next_row().await? {
            Ok(row) => row,
            Err(e) => return Some(Err(e)),
        };
        Some(materialize(row, &self.descriptor).map_err(Into::into))
    }

    /// Reads every remaining row.
    ///
    /// # Errors
    ///
    /// Returns the first read or materialization error.
    pub async fn collect(mut self) -> Result<Vec<E>> {
        let mut out = Vec::new();
        while let Some(item) = self.next().await {
            out.push(item?);
        }
        Ok(out)
    }
}
