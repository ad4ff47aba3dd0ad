//! Block-based processing graph - owns nodes and their message queues

use alloc::boxed::Box;

use dasp_graph::{Buffer, Input, NodeData, Processor};
use hashbrown::HashMap;
use petgraph::graph::NodeIndex;
use rtrb::{Consumer, Producer, RingBuffer};
use tracing::debug;

use crate::node::{AudioNode, NodeId, ProcessContext};

/// Default capacity of a node's message queue.
pub const DEFAULT_QUEUE_SIZE: usize = 64;

/// Sends messages to one node of a [`MixGraph`].
///
/// Returned by [`MixGraph::add`]. Also identifies the node for
/// [`MixGraph::connect`] and [`MixGraph::output`].
///
/// Messages are buffered in a lock-free ring buffer and applied at the start
/// of the node's next block.
pub struct Handle<M: Send + 'static> {
    id: NodeId,
    sender: Producer<M>,
}

impl<M: Send + 'static> Handle<M> {
    /// Queue a message for the node.
    ///
    /// Lock-free; safe to call from any thread the handle is moved to.
    /// Returns `Err(msg)` if the queue is full.
    pub fn send(&mut self, msg: M) -> Result<(), M> {
        self.sender.push(msg).map_err(|rtrb::PushError::Full(m)| m)
    }

    #[inline]
    pub fn id(&self) -> NodeId {
        self.id
    }

    /// Free slots left in the message queue.
    #[inline]
    pub fn capacity_left(&self) -> usize {
        self.sender.slots()
    }
}

// Type-erased wrapper so we can store heterogeneous nodes
trait ErasedNode: Send {
    fn process_erased(&mut self, ctx: &ProcessContext, inputs: &[Input], outputs: &mut [Buffer]);
}

struct NodeWrapper<N: AudioNode> {
    node: N,
    receiver: Consumer<N::Message>,
}

impl<N: AudioNode> ErasedNode for NodeWrapper<N> {
    fn process_erased(&mut self, ctx: &ProcessContext, inputs: &[Input], outputs: &mut [Buffer]) {
        let receiver = &mut self.receiver;
        let node = &mut self.node;

        let messages = core::iter::from_fn(|| receiver.pop().ok());
        node.process(ctx, messages, inputs, outputs);
    }
}

struct DaspAdapter {
    node: Box<dyn ErasedNode>,
    ctx: ProcessContext,
}

impl dasp_graph::Node for DaspAdapter {
    fn process(&mut self, inputs: &[Input], outputs: &mut [Buffer]) {
        self.node.process_erased(&self.ctx, inputs, outputs);
    }
}

type InnerGraph = petgraph::graph::Graph<NodeData<DaspAdapter>, ()>;

/// A processing graph at a fixed sample rate.
///
/// Nodes are processed in dependency order up to the node chosen with
/// [`output`](Self::output), one block of [`Buffer::LEN`] samples per call to
/// [`process`](Self::process).
///
/// ```
/// use raumklang::MixGraph;
/// use raumklang::nodes::{Capture, Clip};
///
/// let mut graph = MixGraph::new(48000);
/// let (producer, mut consumer) = rtrb::RingBuffer::new(1024);
///
/// let clip = graph.add(Clip::new(vec![0.5; 64]));
/// let capture = graph.add(Capture::mono(producer));
/// graph.connect(&clip, &capture);
/// graph.output(&capture);
///
/// graph.process();
/// assert_eq!(consumer.pop(), Ok(0.5));
/// ```
pub struct MixGraph {
    graph: InnerGraph,
    processor: Processor<InnerGraph>,
    ctx: ProcessContext,

    node_indices: HashMap<NodeId, NodeIndex>,
    next_node_id: u32,

    terminal: Option<NodeIndex>,
}

impl MixGraph {
    pub fn new(sample_rate: u32) -> Self {
        Self {
            graph: InnerGraph::with_capacity(64, 64),
            processor: Processor::with_capacity(64),
            ctx: ProcessContext {
                sample_rate,
                buffer_size: Buffer::LEN,
            },
            node_indices: HashMap::new(),
            next_node_id: 0,
            terminal: None,
        }
    }

    #[inline]
    pub fn sample_rate(&self) -> u32 {
        self.ctx.sample_rate
    }

    /// Samples produced per [`process`](Self::process) call.
    #[inline]
    pub fn block_size(&self) -> usize {
        self.ctx.buffer_size
    }

    /// Add a node, returns a handle for connecting it and sending messages.
    pub fn add<N: AudioNode>(&mut self, node: N) -> Handle<N::Message> {
        self.add_with_queue_size(node, DEFAULT_QUEUE_SIZE)
    }

    /// Add a node with a custom message queue size.
    pub fn add_with_queue_size<N: AudioNode>(&mut self, node: N, queue_size: usize) -> Handle<N::Message> {
        let id = NodeId(self.next_node_id);
        self.next_node_id += 1;

        let (producer, consumer) = RingBuffer::new(queue_size);

        // Sinks still get one buffer so dasp_graph has somewhere to write
        let num_outputs = node.num_outputs().max(1);
        let wrapper = NodeWrapper { node, receiver: consumer };
        let adapter = DaspAdapter {
            node: Box::new(wrapper),
            ctx: self.ctx,
        };

        let idx = self
            .graph
            .add_node(NodeData::new(adapter, vec![Buffer::SILENT; num_outputs]));
        self.node_indices.insert(id, idx);
        debug!(?id, num_outputs, queue_size, "node added");

        Handle { id, sender: producer }
    }

    /// Route the output of `from` into `to`.
    ///
    /// # Panics
    ///
    /// Panics if either node was never added to this graph.
    pub fn connect<M1, M2>(&mut self, from: &Handle<M1>, to: &Handle<M2>)
    where
        M1: Send + 'static,
        M2: Send + 'static,
    {
        let from_idx = self.node_indices[&from.id];
        let to_idx = self.node_indices[&to.id];
        self.graph.add_edge(from_idx, to_idx, ());
        debug!(from = ?from.id, to = ?to.id, "nodes connected");
    }

    /// Choose the node each block is processed up to, typically a sink.
    ///
    /// # Panics
    ///
    /// Panics if the node was never added to this graph.
    pub fn output<M: Send + 'static>(&mut self, handle: &Handle<M>) {
        self.terminal = Some(self.node_indices[&handle.id]);
    }

    /// Process one block. Does nothing until an output node is chosen.
    pub fn process(&mut self) {
        if let Some(terminal) = self.terminal {
            self.processor.process(&mut self.graph, terminal);
        }
    }
}
