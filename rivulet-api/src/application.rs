use std::cell::RefCell;
use std::marker::PhantomData;
use std::rc::Rc;

use anyhow::Result;
use rivulet_core::codec::KvSerde;
use rivulet_core::error::GraphError;
use rivulet_core::spec::{OperatorLogic, OperatorSpecGraph};
use rivulet_core::types::{OpId, StreamData, StreamId};

use crate::stream::MessageStream;

/// Graph under construction, shared by every stream handle of one application.
pub(crate) struct AppInner {
    pub name: String,
    pub graph: OperatorSpecGraph,
    /// First wiring error raised by a fluent operator, reported by `build`.
    pub error: Option<GraphError>,
    pub intermediate_streams: u32,
}

impl AppInner {
    /// Add `logic` downstream of `from`, returning the new operator id.
    pub fn chain(&mut self, from: OpId, logic: OperatorLogic) -> OpId {
        match self.graph.add_operator(logic) {
            Ok(id) => {
                self.connect(from, id);
                id
            }
            Err(err) => {
                self.record(err);
                from
            }
        }
    }

    pub fn connect(&mut self, from: OpId, to: OpId) {
        if let Err(err) = self.graph.connect(from, to) {
            self.record(err);
        }
    }

    pub fn record(&mut self, err: GraphError) {
        if self.error.is_none() {
            tracing::warn!("application {}: {}", self.name, err);
            self.error = Some(err);
        }
    }
}

/// Entry point for describing a stream application.
///
/// Open inputs and outputs here, chain operators on the returned
/// [`MessageStream`]s, then hand the application to an
/// [`ApplicationRunner`](crate::runner::ApplicationRunner).
pub struct StreamApplication {
    pub(crate) inner: Rc<RefCell<AppInner>>,
}

impl StreamApplication {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            inner: Rc::new(RefCell::new(AppInner {
                name: name.into(),
                graph: OperatorSpecGraph::new(),
                error: None,
                intermediate_streams: 0,
            })),
        }
    }

    pub fn name(&self) -> String {
        self.inner.borrow().name.clone()
    }

    /// Read `stream`, decoding messages of type `M` with `serde`.
    pub fn open_input<M: StreamData>(
        &self,
        stream: impl Into<StreamId>,
        serde: KvSerde,
    ) -> Result<MessageStream<M>, GraphError> {
        let op_id = self.inner.borrow_mut().graph.add_input(stream, Some(serde))?;
        Ok(MessageStream::new(Rc::clone(&self.inner), op_id))
    }

    /// Register an output stream for [`MessageStream::send_to`].
    pub fn open_output<M: StreamData>(
        &self,
        stream: impl Into<StreamId>,
        serde: KvSerde,
    ) -> Result<OutputStream<M>, GraphError> {
        let stream = stream.into();
        self.inner
            .borrow_mut()
            .graph
            .add_output(stream.clone(), Some(serde))?;
        Ok(OutputStream {
            stream,
            _phantom: PhantomData,
        })
    }

    /// Validate the graph and return an independent copy of it.
    pub fn build(&self) -> Result<OperatorSpecGraph, GraphError> {
        let inner = self.inner.borrow();
        if let Some(err) = &inner.error {
            return Err(err.clone());
        }
        let graph = inner.graph.try_clone()?;
        tracing::info!(
            "application {} built with {} operators",
            inner.name,
            graph.len()
        );
        Ok(graph)
    }
}

/// Handle to a registered output stream carrying messages of type `M`.
pub struct OutputStream<M> {
    pub(crate) stream: StreamId,
    _phantom: PhantomData<fn(M)>,
}

impl<M> OutputStream<M> {
    pub fn stream(&self) -> &StreamId {
        &self.stream
    }
}

impl<M> Clone for OutputStream<M> {
    fn clone(&self) -> Self {
        Self {
            stream: self.stream.clone(),
            _phantom: PhantomData,
        }
    }
}
